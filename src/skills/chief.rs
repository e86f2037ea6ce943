//! Chief of Staff: pure aggregator over the other skills' outputs — the
//! task mirror, the deadline dashboard and sidecar, and the news/research
//! RFC caches — composed into morning briefs, evening reviews and urgent
//! alerts. No network I/O of its own.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::heartbeat::DeadlineSidecar;
use crate::parser;
use crate::rfc;
use crate::skill::{decode_command, init_workspace, Skill, ToolResult};

const IDENTITY: &str = "# Chief of Staff - Identity\n\n- **Name:** Chief\n- **Creature:** Strategic commander with clipboard\n- **Vibe:** \"I've got the big picture\"\n- **Emoji:** 🎯\n- **Catchphrase:** \"Here's the plan...\"\n\n## Role\nChief of Staff who coordinates specialist agents, synthesizes their outputs, and delivers morning briefs + evening reviews.\n";

const NEWS_CAP: usize = 20;
const RESEARCH_CAP: usize = 15;

pub(crate) struct ChiefSkill {
    workspace: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ChiefCommand {
    MorningBrief,
    EveningReview,
    UrgentDeadlines,
    Delegate {
        task: String,
        #[serde(default)]
        agent: Option<String>,
    },
    Status,
}

/// Keyword routing for `delegate` when no explicit agent is given.
pub(crate) fn detect_agent(task: &str) -> &'static str {
    let task = task.to_lowercase();
    if task.contains("paper") || task.contains("research") || task.contains("arxiv") {
        return "research";
    }
    if task.contains("news") || task.contains("monitor") || task.contains("bangladesh") {
        return "monitor";
    }
    if task.contains("task") || task.contains("priority") || task.contains("calendar") {
        return "atc";
    }
    if task.contains("learn") || task.contains("ielts") || task.contains("study") {
        return "coach";
    }
    if task.contains("bill") || task.contains("deadline") || task.contains("medicine") {
        return "architect";
    }
    "atc"
}

impl ChiefSkill {
    pub(crate) fn new() -> Self {
        ChiefSkill {
            workspace: PathBuf::new(),
        }
    }

    fn memory_dir(&self) -> PathBuf {
        self.workspace.join("memory")
    }

    /// Read a memory file from the chief workspace, falling back to the
    /// sibling workspaces that canonically own some of these files.
    fn read_memory_file(&self, name: &str, fallback: &str) -> String {
        let candidates = [
            self.memory_dir().join(name),
            self.sibling("architect").join("memory").join(name),
            self.sibling("coach").join("memory").join(name),
        ];
        for path in candidates {
            if let Ok(data) = fs::read_to_string(&path) {
                let trimmed = data.trim();
                if !trimmed.is_empty() {
                    return format!("{trimmed}\n");
                }
            }
        }
        fallback.to_string()
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.workspace
            .parent()
            .map(|p| p.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    fn todays_focus(&self) -> String {
        let tasks_path = self.sibling("atc").join("memory").join("tasks.xml");
        let data = match fs::read_to_string(&tasks_path) {
            Ok(d) => d,
            Err(_) => return "- ⚠️ ATC tasks.xml not found. Run `atc analyze_tasks` first.\n".to_string(),
        };
        let cal = match parser::parse_xcal(&data) {
            Ok(c) => c,
            Err(e) => return format!("- ⚠️ Failed to parse tasks.xml: {e}\n"),
        };
        let mut out = String::new();
        for todo in &cal.vtodos {
            if todo.categories.to_lowercase().contains("today") && todo.status != "COMPLETED" {
                out.push_str(&format!("- {}\n", todo.summary));
            }
        }
        if out.is_empty() {
            "- No active tasks for today in tasks.xml.\n".to_string()
        } else {
            out
        }
    }

    fn completed_tasks(&self) -> String {
        let tasks_path = self.sibling("atc").join("memory").join("tasks.xml");
        let data = match fs::read_to_string(&tasks_path) {
            Ok(d) => d,
            Err(_) => return "- ⚠️ ATC tasks.xml not found.\n".to_string(),
        };
        let cal = match parser::parse_xcal(&data) {
            Ok(c) => c,
            Err(e) => return format!("- ⚠️ Failed to parse tasks.xml: {e}\n"),
        };
        let mut out = String::new();
        for todo in &cal.vtodos {
            if todo.status == "COMPLETED" {
                out.push_str(&format!("- ✅ {}\n", todo.summary));
            }
        }
        if out.is_empty() {
            "- No completed tasks yet today.\n".to_string()
        } else {
            out
        }
    }

    /// Today's (or yesterday's) RFC cache lines, capped per file. Expired
    /// caches are GC'd by the codec on read.
    fn cache_highlights(&self, prefix: &str, cap: usize, fallback: &str) -> String {
        let now = Utc::now();
        let dates = [
            now.format("%Y%m%d").to_string(),
            (now - chrono::Duration::days(1)).format("%Y%m%d").to_string(),
        ];
        for date in dates {
            let path = self.memory_dir().join(format!("{prefix}-{date}.md"));
            if let Ok(lines) = rfc::parse_file(&path, cap) {
                if !lines.is_empty() {
                    return format!("{}\n", lines.join("\n"));
                }
            }
        }
        fallback.to_string()
    }

    fn morning_brief(&self) -> ToolResult {
        let now = Local::now();
        let mut brief = String::new();
        brief.push_str(&format!(
            "# 🎯 Morning Brief — {}\n\n",
            now.format("%A, %B %-d, %Y")
        ));

        brief.push_str("## ✈️ Today's Tasks (ATC)\n");
        brief.push_str(&self.todays_focus());
        brief.push_str("\n\n");

        brief.push_str("## 📋 Urgent Deadlines (Architect)\n");
        brief.push_str(&self.read_memory_file(
            "deadlines-today.md",
            "- No deadlines file found. Architect hasn't written one yet.\n",
        ));
        brief.push_str("\n\n");

        brief.push_str("## 🌍 News (Monitor)\n");
        brief.push_str(&self.cache_highlights(
            "news",
            NEWS_CAP,
            "- No news cache found. Run 'fetch news' to populate.\n",
        ));
        brief.push_str("\n\n");

        brief.push_str("## 🔬 Research (Research)\n");
        brief.push_str(&self.cache_highlights(
            "research",
            RESEARCH_CAP,
            "- No research cache found. Run 'search papers' to populate.\n",
        ));
        brief.push_str("\n\n");

        brief.push_str("## 📚 Learning (Coach)\n");
        brief.push_str(&self.read_memory_file(
            "learning-today.md",
            "- No learning data (Coach not yet configured).\n",
        ));
        brief.push_str("\n\n");

        brief.push_str("---\n**Ready to roll? 🚀**\n");

        self.save_brief(&brief, "morning-brief");
        ToolResult::text(brief)
    }

    fn evening_review(&self) -> ToolResult {
        let now = Local::now();
        let mut review = String::new();
        review.push_str(&format!(
            "# 🌙 Evening Review — {}\n\n",
            now.format("%A, %B %-d, %Y")
        ));

        review.push_str("## ✅ Completed Tasks (ATC)\n");
        review.push_str(&self.completed_tasks());
        review.push_str("\n\n");

        review.push_str("## 📚 Learning (Coach)\n");
        review.push_str(&self.read_memory_file(
            "learning-today.md",
            "- No learning data (Coach not yet configured).\n",
        ));
        review.push_str("\n\n");

        review.push_str("## 📊 Productivity Stats (ATC)\n");
        review.push_str(&self.read_memory_file(
            "stats-today.md",
            "- No stats yet. ATC will write during evening roll-over.\n",
        ));
        review.push_str("\n\n");

        review.push_str("## 🔬 Tomorrow's Research\n");
        review.push_str(&self.read_memory_file("tomorrow/research.md", "- Not pre-fetched yet.\n"));
        review.push_str("\n\n");

        review.push_str("## 🌍 Tomorrow's News\n");
        review.push_str(&self.read_memory_file("tomorrow/news.md", "- Not pre-fetched yet.\n"));
        review.push_str("\n\n");

        review.push_str("---\n**Good work today. Rest well. 🌙**\n");

        self.save_brief(&review, "evening-review");
        ToolResult::text(review)
    }

    /// Alert iff the sidecar carries an instant within [now, now + 2h);
    /// everything else is a calm OK.
    fn urgent_deadlines(&self, now: DateTime<Local>) -> ToolResult {
        let sidecar_paths = [
            self.memory_dir().join("deadlines-today.json"),
            self.sibling("architect").join("memory").join("deadlines-today.json"),
        ];
        let mut sidecar: Option<DeadlineSidecar> = None;
        for path in sidecar_paths {
            if let Ok(data) = fs::read_to_string(&path) {
                if let Ok(parsed) = serde_json::from_str(&data) {
                    sidecar = Some(parsed);
                    break;
                }
            }
        }
        let Some(sidecar) = sidecar else {
            return ToolResult::text("✅ No deadlines file found. Silent OK.");
        };

        let mut urgent = Vec::new();
        for entry in &sidecar.instants {
            let Ok(naive) = NaiveDateTime::parse_from_str(&entry.instant, "%Y-%m-%dT%H:%M") else {
                continue;
            };
            let Some(t) = Local.from_local_datetime(&naive).single() else {
                continue;
            };
            let minutes_left = t.signed_duration_since(now).num_minutes();
            if (0..120).contains(&minutes_left) {
                urgent.push(format!(
                    "  • {} — due in {minutes_left} min ({})",
                    entry.summary, entry.instant
                ));
            }
        }

        if urgent.is_empty() {
            return ToolResult::text("✅ No urgent deadlines (all ≥ 2h away). Silent OK.");
        }
        ToolResult::text(format!(
            "⚠️ URGENT DEADLINES:\n{}\n\nTime to focus! 🎯",
            urgent.join("\n")
        ))
    }

    fn delegate(&self, task: &str, agent: Option<String>) -> ToolResult {
        if task.is_empty() {
            return ToolResult::error("task is required for delegate command");
        }
        let agent = agent
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| detect_agent(task).to_string());
        ToolResult::text(format!(
            "**Delegating to {agent}:** {task}\n\nUse the subagent tool to spawn `{agent}` with this task message."
        ))
    }

    fn status(&self) -> ToolResult {
        let mut out = String::from("# 🎯 System Status\n\n");
        for agent in ["architect", "atc", "chief", "coach", "monitor", "research"] {
            let workspace = if agent == "chief" {
                self.workspace.clone()
            } else {
                self.sibling(agent)
            };
            if workspace.exists() {
                let memory_files = WalkDir::new(workspace.join("memory"))
                    .max_depth(1)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .count();
                out.push_str(&format!("- ✅ **{agent}**: active ({memory_files} memory files)\n"));
            } else {
                out.push_str(&format!("- ⏳ **{agent}**: workspace not found\n"));
            }
        }
        ToolResult::text(out)
    }

    fn save_brief(&self, content: &str, brief_type: &str) {
        let memory_dir = self.memory_dir();
        if fs::create_dir_all(&memory_dir).is_err() {
            return;
        }
        let filename = format!("{brief_type}-{}.md", Local::now().format("%Y-%m-%d"));
        if let Err(e) = fs::write(memory_dir.join(&filename), content) {
            eprintln!("[chief] failed to save {filename}: {e}");
        }
    }
}

impl Skill for ChiefSkill {
    fn name(&self) -> &'static str {
        "chief"
    }

    fn description(&self) -> String {
        "Chief of Staff - Strategic orchestrator who aggregates all agent outputs into briefings.\n\nCommands:\n- morning_brief: Compile today's tasks (ATC), news (Monitor), research (Research), deadlines (Architect) into a single morning brief and save it.\n- evening_review: Compile completed tasks (ATC), learning (Coach), productivity stats, and tomorrow's prep into an evening review.\n- urgent_deadlines: Check the deadline instants for items due within 2 hours and return an alert or silent OK.\n- delegate: Route a task to the appropriate specialist agent (returns guidance for the subagent tool).\n- status: Show which agent workspaces are active.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute",
                    "enum": ["morning_brief", "evening_review", "urgent_deadlines", "delegate", "status"]
                },
                "task": {
                    "type": "string",
                    "description": "Task to delegate (for delegate command)"
                },
                "agent": {
                    "type": "string",
                    "description": "Target agent (for delegate command)",
                    "enum": ["architect", "atc", "coach", "monitor", "research"]
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
        let command: ChiefCommand = match decode_command(args) {
            Ok(c) => c,
            Err(result) => return result,
        };
        match command {
            ChiefCommand::MorningBrief => self.morning_brief(),
            ChiefCommand::EveningReview => self.evening_review(),
            ChiefCommand::UrgentDeadlines => self.urgent_deadlines(Local::now()),
            ChiefCommand::Delegate { task, agent } => self.delegate(&task, agent),
            ChiefCommand::Status => self.status(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::DeadlineInstant;
    use crate::parser::{ICalendar, VTodo};

    fn skill_in(dir: &tempfile::TempDir) -> ChiefSkill {
        let mut skill = ChiefSkill::new();
        skill.set_workspace(&dir.path().join("chief"));
        skill
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_morning_brief_composition() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let date_key = Utc::now().format("%Y%m%d").to_string();

        // News cache: 3 records, TTL 6h.
        let news_lines: Vec<String> = (0..3)
            .map(|i| {
                rfc::encode_record(
                    "news",
                    &format!("https://n.example/{i}"),
                    &format!("News story {i}"),
                    "world",
                    &date_key,
                )
            })
            .collect();
        rfc::write_file(
            &dir.path().join("chief").join("memory").join(format!("news-{date_key}.md")),
            "monitor",
            "6h",
            &news_lines,
        )
        .unwrap();

        // Research cache: 2 records, TTL 24h.
        let research_lines: Vec<String> = (0..2)
            .map(|i| {
                rfc::encode_record(
                    "paper",
                    &format!("https://arxiv.org/abs/240{i}.0000{i}"),
                    &format!("Paper {i}"),
                    "ml",
                    &date_key,
                )
            })
            .collect();
        rfc::write_file(
            &dir.path()
                .join("chief")
                .join("memory")
                .join(format!("research-{date_key}.md")),
            "research",
            "24h",
            &research_lines,
        )
        .unwrap();

        // Deadline dashboard with one urgent line.
        write(
            &dir.path().join("architect").join("memory").join("deadlines-today.md"),
            "- [task_id: u1] Rent: DUE TODAY 2026-02-23T09:00. *Action: Send urgent reminder.*",
        );

        // One open Today task in the atc mirror.
        let cal = ICalendar {
            vtodos: vec![VTodo {
                uid: "t1".to_string(),
                summary: "Finish quarterly report".to_string(),
                status: "NEEDS-ACTION".to_string(),
                categories: "Today".to_string(),
                ..Default::default()
            }],
            vevents: vec![],
        };
        write(
            &dir.path().join("atc").join("memory").join("tasks.xml"),
            &parser::emit_xcal(&cal),
        );

        let result = skill.morning_brief();
        let brief = &result.for_llm;
        for heading in ["Today's Tasks", "Urgent Deadlines", "News", "Research", "Learning"] {
            assert!(brief.contains(heading), "missing heading {heading}");
        }
        assert!(brief.contains("Finish quarterly report"));
        assert!(brief.contains("Rent: DUE TODAY"));
        assert!(brief.contains("News story 0"));
        assert!(brief.contains("Paper 1"));

        // Saved copy carries the same content.
        let saved_path = dir
            .path()
            .join("chief")
            .join("memory")
            .join(format!("morning-brief-{}.md", Local::now().format("%Y-%m-%d")));
        let saved = fs::read_to_string(saved_path).unwrap();
        assert_eq!(&saved, brief);
    }

    #[test]
    fn test_urgent_deadlines_alert_within_two_hours() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let now = Local::now();
        let sidecar = DeadlineSidecar {
            generated_at: now.to_rfc3339(),
            instants: vec![
                DeadlineInstant {
                    instant: (now + chrono::Duration::minutes(45))
                        .format("%Y-%m-%dT%H:%M")
                        .to_string(),
                    summary: "Submit visa form".to_string(),
                },
                DeadlineInstant {
                    instant: (now + chrono::Duration::hours(6))
                        .format("%Y-%m-%dT%H:%M")
                        .to_string(),
                    summary: "Way later".to_string(),
                },
            ],
        };
        write(
            &dir.path().join("chief").join("memory").join("deadlines-today.json"),
            &serde_json::to_string(&sidecar).unwrap(),
        );

        let result = skill.urgent_deadlines(now);
        assert!(result.for_llm.contains("URGENT DEADLINES"));
        assert!(result.for_llm.contains("Submit visa form"));
        assert!(!result.for_llm.contains("Way later"));
    }

    #[test]
    fn test_urgent_deadlines_silent_ok() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let now = Local::now();

        // No sidecar at all.
        let missing = skill.urgent_deadlines(now);
        assert!(missing.for_llm.contains("Silent OK"));

        // Sidecar with only far-future instants.
        let sidecar = DeadlineSidecar {
            generated_at: now.to_rfc3339(),
            instants: vec![DeadlineInstant {
                instant: (now + chrono::Duration::hours(6))
                    .format("%Y-%m-%dT%H:%M")
                    .to_string(),
                summary: "Later".to_string(),
            }],
        };
        write(
            &dir.path().join("chief").join("memory").join("deadlines-today.json"),
            &serde_json::to_string(&sidecar).unwrap(),
        );
        let calm = skill.urgent_deadlines(now);
        assert!(calm.for_llm.contains("all ≥ 2h away"));
        assert!(!calm.is_error);
    }

    #[test]
    fn test_delegate_keyword_routing() {
        assert_eq!(detect_agent("find papers on quantization"), "research");
        assert_eq!(detect_agent("any bangladesh news today?"), "monitor");
        assert_eq!(detect_agent("reprioritize my tasks"), "atc");
        assert_eq!(detect_agent("ielts speaking drill"), "coach");
        assert_eq!(detect_agent("pay the electricity bill"), "architect");
        assert_eq!(detect_agent("something unrelated"), "atc");
    }

    #[test]
    fn test_status_lists_workspaces() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        fs::create_dir_all(dir.path().join("atc").join("memory")).unwrap();
        let result = skill.status();
        assert!(result.for_llm.contains("**chief**: active"));
        assert!(result.for_llm.contains("**atc**: active"));
        assert!(result.for_llm.contains("**monitor**: workspace not found"));
    }

    #[test]
    fn test_evening_review_sections() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let cal = ICalendar {
            vtodos: vec![VTodo {
                uid: "t1".to_string(),
                summary: "Shipped it".to_string(),
                status: "COMPLETED".to_string(),
                categories: "Today".to_string(),
                ..Default::default()
            }],
            vevents: vec![],
        };
        write(
            &dir.path().join("atc").join("memory").join("tasks.xml"),
            &parser::emit_xcal(&cal),
        );
        let result = skill.evening_review();
        assert!(result.for_llm.contains("Completed Tasks"));
        assert!(result.for_llm.contains("✅ Shipped it"));
        assert!(result.for_llm.contains("Tomorrow's Research"));
    }
}
