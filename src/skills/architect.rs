//! Life Architect (Sage): recurring life admin over Nextcloud CalDAV.
//! Sweeps VTODOs and VEVENTs into a deadline dashboard plus a sidecar list
//! of ISO instants, creates recurring/one-time items, and deletes by UUID
//! or summary.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::caldav::{self, NextcloudConfig};
use crate::heartbeat::{DeadlineInstant, DeadlineSidecar};
use crate::skill::{decode_command, init_workspace, Skill, ToolResult};

const IDENTITY: &str = "# Life Architect - Identity\n\n- **Name:** Sage\n- **Creature:** Organized planner with clipboard and calendar 📋\n- **Vibe:** \"Heads up, this is due soon\" (proactive, never pushy)\n- **Emoji:** 🏗️\n- **Catchphrase:** \"Keeping track so you don't have to...\"\n";

pub(crate) struct ArchitectSkill {
    workspace: PathBuf,
    nextcloud: NextcloudConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ArchitectCommand {
    SyncDeadlines,
    CreateTask {
        title: String,
        task_type: String,
        #[serde(default)]
        interval_days: Option<i64>,
        target_date: String,
    },
    DeleteTask {
        #[serde(default)]
        uuid: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
}

impl ArchitectSkill {
    pub(crate) fn new(nextcloud: NextcloudConfig) -> Self {
        ArchitectSkill {
            workspace: PathBuf::new(),
            nextcloud,
        }
    }
}

/// One classified dashboard entry.
enum DeadlineClass {
    Urgent { line: String, instant: DeadlineInstant },
    Upcoming(String),
    Completed(String),
    Skip,
}

/// Classify one fetched item by due-date-vs-today. Overdue entries embed a
/// T00:00 instant, due-today entries a T09:00 instant, so the urgent check
/// can work from the sidecar instead of rescanning prose.
fn classify_item(uuid: &str, fields: &HashMap<String, String>, today: NaiveDate) -> DeadlineClass {
    let summary = match fields.get("SUMMARY") {
        Some(s) if !s.is_empty() => s.clone(),
        _ => return DeadlineClass::Skip,
    };
    let status = fields.get("STATUS").map(String::as_str).unwrap_or("");
    let pct = fields
        .get("PERCENT-COMPLETE")
        .map(String::as_str)
        .unwrap_or("");

    if status == "COMPLETED" || pct == "100" {
        return DeadlineClass::Completed(format!(
            "- [task_id: {uuid}] {summary}: Marked completed on CalDAV. *Action: Log to MEMORY.md and celebrate.*"
        ));
    }

    let due_str = fields
        .get("DUE")
        .filter(|d| !d.is_empty())
        .or_else(|| fields.get("DTSTART"))
        .cloned()
        .unwrap_or_default();
    if due_str.len() < 8 {
        return DeadlineClass::Skip;
    }
    let compact: String = due_str.chars().filter(|c| c.is_ascii_digit()).collect();
    if compact.len() < 8 {
        return DeadlineClass::Skip;
    }
    let Ok(due_date) = NaiveDate::parse_from_str(&compact[..8], "%Y%m%d") else {
        return DeadlineClass::Skip;
    };

    let days_diff = (due_date - today).num_days();
    let iso_date = due_date.format("%Y-%m-%d");
    if days_diff < 0 {
        let instant = format!("{iso_date}T00:00");
        DeadlineClass::Urgent {
            line: format!(
                "- [task_id: {uuid}] {summary}: OVERDUE by {} days {instant}. *Action: Flag as overdue.*",
                -days_diff
            ),
            instant: DeadlineInstant {
                instant,
                summary,
            },
        }
    } else if days_diff == 0 {
        let instant = format!("{iso_date}T09:00");
        DeadlineClass::Urgent {
            line: format!(
                "- [task_id: {uuid}] {summary}: DUE TODAY {instant}. *Action: Send urgent reminder.*"
            ),
            instant: DeadlineInstant {
                instant,
                summary,
            },
        }
    } else if days_diff <= 7 {
        DeadlineClass::Upcoming(format!(
            "- [task_id: {uuid}] {summary}: Due in {days_diff} days ({}). *Action: Monitor, no reminder needed yet.*",
            due_date.format("%b %d")
        ))
    } else {
        DeadlineClass::Skip
    }
}

fn render_dashboard(
    urgent: &[String],
    upcoming: &[String],
    completed: &[String],
    today: NaiveDate,
) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Life Admin Status - {today}\n\n"));

    md.push_str("## 🚨 URGENT (Due Today / Overdue)\n");
    if urgent.is_empty() {
        md.push_str("- *No urgent tasks*\n");
    } else {
        for line in urgent {
            md.push_str(line);
            md.push('\n');
        }
    }
    md.push('\n');

    md.push_str("## ⏳ UPCOMING (Next 7 Days)\n");
    if upcoming.is_empty() {
        md.push_str("- *No upcoming tasks*\n");
    } else {
        for line in upcoming {
            md.push_str(line);
            md.push('\n');
        }
    }
    md.push('\n');

    md.push_str("## 📋 RECENTLY COMPLETED (Feedback Loop)\n");
    if completed.is_empty() {
        md.push_str("- *No recent completions*\n");
    } else {
        for line in completed {
            md.push_str(line);
            md.push('\n');
        }
    }
    md
}

/// Build the ICS payload for `create_task`. Recurring tasks become VTODOs
/// with `RRULE:FREQ=DAILY;INTERVAL=<n>`; one-time deadlines become
/// transparent all-day VEVENTs with an exclusive DTEND.
fn build_create_ics(
    uid: &str,
    title: &str,
    task_type: &str,
    interval_days: Option<i64>,
    target_date: NaiveDate,
) -> Result<(String, &'static str), String> {
    let date_only = target_date.format("%Y%m%d").to_string();
    match task_type {
        "recurring" => {
            let interval =
                interval_days.ok_or("Missing 'interval_days' for recurring task".to_string())?;
            let props = vec![
                ("SUMMARY".to_string(), title.to_string()),
                ("STATUS".to_string(), "NEEDS-ACTION".to_string()),
                ("DTSTART;VALUE=DATE".to_string(), date_only.clone()),
                ("DUE;VALUE=DATE".to_string(), date_only),
                (
                    "RRULE".to_string(),
                    format!("FREQ=DAILY;INTERVAL={interval}"),
                ),
            ];
            Ok((caldav::build_ics("VTODO", uid, &props), "tasks"))
        }
        "onetime" => {
            let next_day = (target_date + chrono::Duration::days(1))
                .format("%Y%m%d")
                .to_string();
            let props = vec![
                ("SUMMARY".to_string(), title.to_string()),
                ("DTSTART;VALUE=DATE".to_string(), date_only),
                ("DTEND;VALUE=DATE".to_string(), next_day),
                ("TRANSP".to_string(), "TRANSPARENT".to_string()),
            ];
            Ok((caldav::build_ics("VEVENT", uid, &props), "calendar"))
        }
        other => Err(format!("Unknown task_type '{other}' (must be recurring or onetime)")),
    }
}

impl ArchitectSkill {
    fn sync_deadlines(&self) -> ToolResult {
        if !self.nextcloud.is_configured() {
            return ToolResult::error("Nextcloud host not configured under tools.nextcloud");
        }
        let now = Local::now();
        let today = now.date_naive();
        let tasks_url = self.nextcloud.tasks_url();
        let calendar_url = self.nextcloud.calendar_url();

        let mut hrefs = Vec::new();
        match caldav::propfind_hrefs(&self.nextcloud, &tasks_url) {
            Ok(h) => hrefs.extend(h),
            Err(e) => eprintln!("[architect] tasks PROPFIND: {e}"),
        }
        match caldav::propfind_hrefs(&self.nextcloud, &calendar_url) {
            Ok(h) => hrefs.extend(h),
            Err(e) => eprintln!("[architect] calendar PROPFIND: {e}"),
        }

        let mut urgent = Vec::new();
        let mut upcoming = Vec::new();
        let mut completed = Vec::new();
        let mut instants = Vec::new();

        for href in &hrefs {
            let uuid = href
                .rsplit('/')
                .next()
                .unwrap_or("")
                .trim_end_matches(".ics")
                .to_string();
            let fields = match caldav::get_item_fields(&self.nextcloud, &tasks_url, href) {
                Ok(f) => f,
                Err(_) => continue,
            };
            match classify_item(&uuid, &fields, today) {
                DeadlineClass::Urgent { line, instant } => {
                    urgent.push(line);
                    instants.push(instant);
                }
                DeadlineClass::Upcoming(line) => upcoming.push(line),
                DeadlineClass::Completed(line) => completed.push(line),
                DeadlineClass::Skip => {}
            }
        }

        let md = render_dashboard(&urgent, &upcoming, &completed, today);

        let mem_dir = self.workspace.join("memory");
        if let Err(e) = fs::create_dir_all(&mem_dir) {
            return ToolResult::error(format!("Failed to create memory dir: {e}"));
        }
        let final_file = mem_dir.join("deadlines-today.md");
        let tmp_file = mem_dir.join("deadlines-today.md.tmp");
        if let Err(e) = fs::write(&tmp_file, &md) {
            return ToolResult::error(format!("Failed to write temporary markdown: {e}"));
        }
        if let Err(e) = fs::rename(&tmp_file, &final_file) {
            return ToolResult::error(format!("Atomic rename failed for deadlines-today.md: {e}"));
        }

        let sidecar = DeadlineSidecar {
            generated_at: now.to_rfc3339(),
            instants,
        };
        let sidecar_tmp = mem_dir.join("deadlines-today.json.tmp");
        let sidecar_file = mem_dir.join("deadlines-today.json");
        match serde_json::to_string_pretty(&sidecar) {
            Ok(body) => {
                if fs::write(&sidecar_tmp, body)
                    .and_then(|_| fs::rename(&sidecar_tmp, &sidecar_file))
                    .is_err()
                {
                    eprintln!("[architect] sidecar write failed");
                }
            }
            Err(e) => eprintln!("[architect] sidecar serialize: {e}"),
        }

        ToolResult::split(
            md,
            "✅ Synced deadlines. Dashboard updated at memory/deadlines-today.md",
        )
    }

    fn create_task(
        &self,
        title: &str,
        task_type: &str,
        interval_days: Option<i64>,
        target_date: &str,
    ) -> ToolResult {
        let date = match NaiveDate::parse_from_str(target_date, "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => return ToolResult::error(format!("Invalid target_date format: {e}")),
        };
        let uid = uuid::Uuid::new_v4().to_string();
        let (ics, collection) = match build_create_ics(&uid, title, task_type, interval_days, date) {
            Ok(pair) => pair,
            Err(e) => return ToolResult::error(e),
        };
        let collection_url = if collection == "tasks" {
            self.nextcloud.tasks_url()
        } else {
            self.nextcloud.calendar_url()
        };
        match caldav::put_item(&self.nextcloud, &collection_url, &uid, &ics) {
            Ok(()) => ToolResult::text(format!(
                "Successfully pushed {task_type} '{title}' to Nextcloud CalDAV (UUID: {uid})"
            )),
            Err(e) => ToolResult::error(format!("Nextcloud rejected CalDAV push: {e}")),
        }
    }

    fn delete_task(&self, uuid_arg: Option<String>, title: Option<String>) -> ToolResult {
        let tasks_url = self.nextcloud.tasks_url();

        if let Some(uuid) = uuid_arg.filter(|u| u.contains('-') && u.len() > 30) {
            let href = format!("{tasks_url}{uuid}.ics");
            return match caldav::delete_item(&self.nextcloud, &tasks_url, &href) {
                Ok(()) => ToolResult::text(format!("✅ Task {uuid} deleted from Nextcloud CalDAV.")),
                Err(e) => ToolResult::error(format!("Nextcloud rejected DELETE: {e}")),
            };
        }

        let Some(title) = title.filter(|t| !t.is_empty()) else {
            return ToolResult::error(
                "Provide either 'uuid' (exact task ID) or 'title' (task name) to delete.",
            );
        };

        let hrefs = match caldav::propfind_hrefs(&self.nextcloud, &tasks_url) {
            Ok(h) => h,
            Err(e) => return ToolResult::error(format!("PROPFIND failed: {e}")),
        };
        let mut deleted = 0usize;
        let mut errors = Vec::new();
        for href in &hrefs {
            let fields = match caldav::get_item_fields(&self.nextcloud, &tasks_url, href) {
                Ok(f) => f,
                Err(_) => continue,
            };
            let summary = fields.get("SUMMARY").map(String::as_str).unwrap_or("");
            if summary.eq_ignore_ascii_case(&title) {
                match caldav::delete_item(&self.nextcloud, &tasks_url, href) {
                    Ok(()) => deleted += 1,
                    Err(e) => errors.push(e),
                }
            }
        }
        if !errors.is_empty() {
            return ToolResult::error(format!(
                "Deleted {deleted}, but {} errors: {}",
                errors.len(),
                errors.join("; ")
            ));
        }
        if deleted == 0 {
            return ToolResult::error(format!(
                "No tasks named '{title}' found in Nextcloud Tasks calendar."
            ));
        }
        ToolResult::text(format!(
            "✅ Deleted {deleted} task(s) named '{title}' from Nextcloud CalDAV."
        ))
    }
}

impl Skill for ArchitectSkill {
    fn name(&self) -> &'static str {
        "architect"
    }

    fn description(&self) -> String {
        "Life Architect (Sage): Manages your recurring life admin (rent, medicine) via Nextcloud. Can sync deadlines, and natively create complex recurring CalDAV VTODOs.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute",
                    "enum": ["sync_deadlines", "create_task", "delete_task"]
                },
                "uuid": {
                    "type": "string",
                    "description": "UUID of the task to delete (from [task_id: ...] in the dashboard). Provide either uuid OR title, not both."
                },
                "title": {
                    "type": "string",
                    "description": "Title of the task. For delete_task: deletes ALL tasks matching this name. Also used in create_task."
                },
                "task_type": {
                    "type": "string",
                    "enum": ["recurring", "onetime"],
                    "description": "Whether this is 'recurring' (VTODO) or 'onetime' (VEVENT). Used in create_task."
                },
                "interval_days": {
                    "type": "integer",
                    "description": "If recurring: how often in days (e.g. 30). Auto-generates the RRULE. Used in create_task."
                },
                "target_date": {
                    "type": "string",
                    "description": "If recurring: FIRST due date. If onetime: deadline block date. Format: YYYY-MM-DD. Used in create_task."
                }
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&mut self, workspace: &Path) {
        self.workspace = workspace.to_path_buf();
        init_workspace(workspace, IDENTITY);
    }

    fn execute(&self, args: &Value) -> ToolResult {
        let command: ArchitectCommand = match decode_command(args) {
            Ok(c) => c,
            Err(result) => return result,
        };
        match command {
            ArchitectCommand::SyncDeadlines => self.sync_deadlines(),
            ArchitectCommand::CreateTask {
                title,
                task_type,
                interval_days,
                target_date,
            } => self.create_task(&title, &task_type, interval_days, &target_date),
            ArchitectCommand::DeleteTask { uuid, title } => self.delete_task(uuid, title),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
