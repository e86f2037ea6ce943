//! Momentum (Learning Coach): habit streaks backed by a small sqlite store,
//! checked against completed Nextcloud VTODOs, plus WebDAV practice
//! material, Deck card moves, and Telegram nudges.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rand::seq::SliceRandom;
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::caldav::{self, NextcloudConfig};
use crate::config::TelegramToolConfig;
use crate::skill::{decode_command, init_workspace, Skill, ToolResult};

const IDENTITY: &str = "# Learning Coach - Identity\n\n- **Name:** Momentum\n- **Creature:** Energetic coach with a whistle and stopwatch 🏃\n- **Vibe:** \"You got this!\", celebrates wins, gentle with setbacks\n- **Emoji:** 📚\n- **Catchphrase:** \"Streak alive! 🔥\"\n";

/// Tracked habits, matched by summary substring.
const HABITS: [&str; 2] = ["IELTS", "Exercise"];

pub(crate) struct CoachSkill {
    workspace: PathBuf,
    nextcloud: NextcloudConfig,
    telegram: TelegramToolConfig,
    db: Mutex<Option<Connection>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum CoachCommand {
    CheckHabits,
    GeneratePractice {
        #[serde(default)]
        practice_type: Option<String>,
    },
    UpdateDeck {
        card_id: String,
        column_id: String,
    },
    NudgeTelegram {
        message: String,
    },
}

fn open_streak_db(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("open streak db: {e}"))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS streaks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT UNIQUE NOT NULL,
            current_streak INTEGER DEFAULT 0,
            last_completed_date TEXT
        )",
    )
    .map_err(|e| format!("create streaks table: {e}"))?;
    Ok(conn)
}

/// Streak transition per habit: extend when the previous completion was
/// yesterday, restart after a gap, idle otherwise.
pub(crate) fn update_streaks(
    conn: &Connection,
    completed: &HashMap<String, bool>,
    today: NaiveDate,
) -> String {
    let today_str = today.format("%Y-%m-%d").to_string();
    let yesterday_str = (today - chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();

    let mut out = String::from("Habit Check Results:\n");
    for category in HABITS {
        let did_complete = completed.get(category).copied().unwrap_or(false);
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT current_streak, last_completed_date FROM streaks WHERE category = ?1",
                params![category],
                |row| Ok((row.get(0)?, row.get::<_, Option<String>>(1)?.unwrap_or_default())),
            )
            .ok();

        match row {
            None => {
                if did_complete {
                    let _ = conn.execute(
                        "INSERT INTO streaks (category, current_streak, last_completed_date) VALUES (?1, 1, ?2)",
                        params![category, today_str],
                    );
                    out.push_str(&format!("- {category}: Started new streak! 🔥 (1 day)\n"));
                } else {
                    let _ = conn.execute(
                        "INSERT INTO streaks (category, current_streak, last_completed_date) VALUES (?1, 0, '')",
                        params![category],
                    );
                    out.push_str(&format!("- {category}: Not started yet.\n"));
                }
            }
            Some((mut streak, last_completed)) => {
                if did_complete {
                    if last_completed == today_str {
                        out.push_str(&format!(
                            "- {category}: Already logged today. Active streak: {streak} days 🔥\n"
                        ));
                    } else if last_completed == yesterday_str {
                        streak += 1;
                        let _ = conn.execute(
                            "UPDATE streaks SET current_streak = ?1, last_completed_date = ?2 WHERE category = ?3",
                            params![streak, today_str, category],
                        );
                        out.push_str(&format!(
                            "- {category}: Streak extended! Active streak: {streak} days 🔥\n"
                        ));
                    } else {
                        let _ = conn.execute(
                            "UPDATE streaks SET current_streak = 1, last_completed_date = ?1 WHERE category = ?2",
                            params![today_str, category],
                        );
                        out.push_str(&format!("- {category}: Streak restarted! (1 day) 🌱\n"));
                    }
                } else if last_completed == today_str {
                    out.push_str(&format!(
                        "- {category}: Completed for today! 🔥 ({streak} days)\n"
                    ));
                } else if last_completed == yesterday_str {
                    out.push_str(&format!(
                        "- {category}: Pending for today. Don't lose your {streak} day streak!\n"
                    ));
                } else {
                    if streak > 0 {
                        let _ = conn.execute(
                            "UPDATE streaks SET current_streak = 0 WHERE category = ?1",
                            params![category],
                        );
                    }
                    out.push_str(&format!(
                        "- {category}: No active streak. Ready to jump back in? 🌱\n"
                    ));
                }
            }
        }
    }
    out
}

/// Was this VTODO completed today? COMPLETED/LAST-MODIFIED timestamps in
/// basic ICS format are prefix-matched on the compact date.
pub(crate) fn completed_today(fields: &HashMap<String, String>, today_compact: &str) -> bool {
    let status = fields.get("STATUS").map(String::as_str).unwrap_or("");
    let pct = fields
        .get("PERCENT-COMPLETE")
        .map(String::as_str)
        .unwrap_or("");
    if status != "COMPLETED" && pct != "100" {
        return false;
    }
    let completed_ts = fields.get("COMPLETED").map(String::as_str).unwrap_or("");
    let last_modified = fields.get("LAST-MODIFIED").map(String::as_str).unwrap_or("");
    if !completed_ts.is_empty() {
        return completed_ts.starts_with(today_compact);
    }
    if !last_modified.is_empty() {
        return last_modified.starts_with(today_compact);
    }
    // Completed with no timestamp at all: give the benefit of the doubt.
    true
}

impl CoachSkill {
    pub(crate) fn new(nextcloud: NextcloudConfig, telegram: TelegramToolConfig) -> Self {
        CoachSkill {
            workspace: PathBuf::new(),
            nextcloud,
            telegram,
            db: Mutex::new(None),
        }
    }

    fn check_habits(&self) -> ToolResult {
        if !self.nextcloud.is_configured() {
            return ToolResult::error("Nextcloud host not configured under tools.nextcloud");
        }
        let tasks_url = self.nextcloud.tasks_url();
        let hrefs = match caldav::propfind_hrefs(&self.nextcloud, &tasks_url) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("Failed to list tasks: {e}")),
        };

        let today_compact = Local::now().format("%Y%m%d").to_string();
        let mut habit_completed: HashMap<String, bool> =
            HABITS.iter().map(|h| (h.to_string(), false)).collect();

        for href in &hrefs {
            let fields = match caldav::get_item_fields(&self.nextcloud, &tasks_url, href) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if !completed_today(&fields, &today_compact) {
                continue;
            }
            let summary = fields
                .get("SUMMARY")
                .map(|s| s.to_lowercase())
                .unwrap_or_default();
            for habit in HABITS {
                if summary.contains(&habit.to_lowercase()) {
                    habit_completed.insert(habit.to_string(), true);
                }
            }
        }

        let guard = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let Some(conn) = guard.as_ref() else {
            return ToolResult::error("streak store not initialized");
        };
        ToolResult::text(update_streaks(conn, &habit_completed, Local::now().date_naive()))
    }

    fn generate_practice(&self, _practice_type: Option<String>) -> ToolResult {
        if !self.nextcloud.is_configured() {
            return ToolResult::error("Nextcloud host not configured under tools.nextcloud");
        }
        let files_url = format!("{}IELTS_Materials/", self.nextcloud.files_url());
        let resp = self
            .nextcloud
            .agent()
            .request("PROPFIND", &files_url)
            .set("Depth", "1")
            .set("Content-Type", "application/xml")
            .set("Authorization", &self.nextcloud.auth_header())
            .send_string(r#"<?xml version="1.0"?><d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/></d:prop></d:propfind>"#);
        let body = match resp {
            Ok(r) => match r.into_string() {
                Ok(b) => b,
                Err(e) => return ToolResult::error(format!("WebDAV response read: {e}")),
            },
            Err(e) => return ToolResult::error(format!("WebDAV PROPFIND failed: {e}")),
        };

        // First href is the directory itself; keep only plain files.
        let mut base_path: Option<String> = None;
        let mut files = Vec::new();
        for chunk in body.split('<') {
            let lower = chunk.to_lowercase();
            if lower.starts_with("d:href>") || lower.starts_with("href>") {
                if let Some((_, val)) = chunk.split_once('>') {
                    let href = val.trim().to_string();
                    match &base_path {
                        None => base_path = Some(href),
                        Some(base) if &href != base && !href.ends_with('/') => files.push(href),
                        _ => {}
                    }
                }
            }
        }

        if files.is_empty() {
            return ToolResult::error(
                "The IELTS_Materials directory is empty. Please upload some PDFs, text files, or images to this folder in Nextcloud.",
            );
        }

        let chosen = files
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default();
        let full = caldav::full_url(&files_url, &chosen);
        ToolResult::text(format!(
            "Found practice material: {full}\n\nPrompt the user to review this file."
        ))
    }

    fn update_deck(&self, card_id: &str, column_id: &str) -> ToolResult {
        if !self.nextcloud.is_configured() || card_id.is_empty() || column_id.is_empty() {
            return ToolResult::error("nextcloud host, card_id, or column_id missing");
        }
        let url = format!(
            "{}/cards/{card_id}",
            self.nextcloud.deck_url().trim_end_matches('/')
        );
        let resp = self
            .nextcloud
            .agent()
            .put(&url)
            .set("Content-Type", "application/json")
            .set("OCS-APIRequest", "true")
            .set("Authorization", &self.nextcloud.auth_header())
            .send_string(&format!("{{\"stackId\": {column_id}}}"));
        match resp {
            Ok(_) => ToolResult::text(format!(
                "Card {card_id} moved to column {column_id} successfully."
            )),
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                ToolResult::error(format!("Deck returned {code}: {snippet}"))
            }
            Err(e) => ToolResult::error(format!("Deck API error: {e}")),
        }
    }

    fn nudge_telegram(&self, message: &str) -> ToolResult {
        if self.telegram.bot_token.is_empty() || self.telegram.chat_id.is_empty() || message.is_empty()
        {
            return ToolResult::error("Telegram token, chat ID, or message missing");
        }
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.telegram.bot_token
        );
        let timeout = Duration::from_secs(self.telegram.timeout_seconds.unwrap_or(10));
        let agent = caldav::http_agent(timeout);
        let payload = json!({
            "chat_id": self.telegram.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });
        match agent
            .post(&url)
            .set("content-type", "application/json")
            .send_json(payload)
        {
            Ok(_) => ToolResult::text("Telegram nudge sent successfully 🚀"),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                ToolResult::error(format!("Telegram API returned {code}: {snippet}"))
            }
            Err(e) => ToolResult::error(format!("Failed to send Telegram message: {e}")),
        }
    }
}

impl Skill for CoachSkill {
    fn name(&self) -> &'static str {
        "coach"
    }

    fn description(&self) -> String {
        "Momentum (Learning Coach) - Tracks study habits (IELTS, Exercise) via Nextcloud CalDAV, generates practice materials via WebDAV, and sends nudges via Telegram.\n\nCommands:\n- check_habits: Connects to Nextcloud CalDAV to check if daily VTODOs are checked off, then updates local streaks.\n- generate_practice: Pulls random IELTS practice materials from Nextcloud WebDAV to provide an active study prompt.\n- update_deck: Moves Kanban cards on Nextcloud Deck (e.g., To Do -> Done).\n- nudge_telegram: Sends a personalized, energetic encouragement message to the user's phone.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute",
                    "enum": ["check_habits", "generate_practice", "update_deck", "nudge_telegram"]
                },
                "practice_type": {
                    "type": "string",
                    "description": "Type of IELTS material to pull (only for generate_practice)",
                    "enum": ["speaking_part_2", "speaking_part_3", "reading"]
                },
                "card_id": {
                    "type": "string",
                    "description": "Deck card ID to move (only for update_deck)"
                },
                "column_id": {
                    "type": "string",
                    "description": "Deck target column ID (only for update_deck)"
                },
                "message": {
                    "type": "string",
                    "description": "Text to send via Telegram (only for nudge_telegram)"
                }
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&mut self, workspace: &Path) {
        self.workspace = workspace.to_path_buf();
        init_workspace(workspace, IDENTITY);
        let db_path = workspace.join("memory").join("momentum.db");
        match open_streak_db(&db_path) {
            Ok(conn) => {
                let mut guard = self.db.lock().unwrap_or_else(|e| e.into_inner());
                if guard.is_none() {
                    *guard = Some(conn);
                }
            }
            Err(e) => eprintln!("[coach] {e}"),
        }
    }

    fn execute(&self, args: &Value) -> ToolResult {
        let command: CoachCommand = match decode_command(args) {
            Ok(c) => c,
            Err(result) => return result,
        };
        match command {
            CoachCommand::CheckHabits => self.check_habits(),
            CoachCommand::GeneratePractice { practice_type } => {
                self.generate_practice(practice_type)
            }
            CoachCommand::UpdateDeck { card_id, column_id } => {
                self.update_deck(&card_id, &column_id)
            }
            CoachCommand::NudgeTelegram { message } => self.nudge_telegram(&message),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
