//! Air Traffic Controller (Atlas): task management over a local xCal
//! mirror (`memory/tasks.xml`, `memory/events.xml`) plus live Nextcloud
//! CalDAV round trips.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::caldav::{self, NextcloudConfig, TaskUpdate};
use crate::parser::{self, ICalendar, VTodo};
use crate::skill::{decode_command, init_workspace, Skill, ToolResult};

const IDENTITY: &str = "# Air Traffic Controller - Identity\n\n- **Name:** Atlas\n- **Creature:** Calm air traffic controller with headset and coffee ☕\n- **Vibe:** \"I've got your back, here's what matters today\"\n- **Emoji:** ✈️\n- **Catchphrase:** \"Let's land this smoothly...\"\n";

pub(crate) struct AtcSkill {
    workspace: PathBuf,
    nextcloud: NextcloudConfig,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum AtcCommand {
    AnalyzeTasks,
    ReadCalendar,
    ExtractKeywords,
    UpdateTask {
        task_uid: String,
        status: String,
    },
    RollOverTasks,
    SyncCalendar,
    PushTask {
        summary: String,
        #[serde(default)]
        due: Option<String>,
        #[serde(default)]
        start: Option<String>,
        #[serde(default)]
        priority: Option<i64>,
        #[serde(default)]
        notes: Option<String>,
    },
    ListNextcloudTasks,
    GetTask {
        task_href: String,
    },
    MergeTask {
        task_href: String,
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        due: Option<String>,
        #[serde(default)]
        start: Option<String>,
        #[serde(default)]
        priority: Option<i64>,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        location: Option<String>,
    },
    DeleteTask {
        task_href: String,
    },
}

/// Weigh the xCal properties to prioritize the workload without an LM.
/// RFC 5545 priority: 1 highest, 9 lowest, 0 undefined.
fn calculate_urgency(todo: &VTodo) -> i64 {
    let mut urgency = 50;
    match todo.priority {
        1 | 2 => urgency += 40,
        3..=5 => urgency += 20,
        p if p > 5 => urgency += 5,
        _ => {}
    }
    if !todo.due.is_empty() || !todo.due_date.is_empty() {
        urgency += 10;
    }
    urgency.min(100)
}

/// Words of five or more characters from "Tomorrow" items, lowercased —
/// pre-fetch hints for the news/research skills.
fn extract_keywords(cal: &ICalendar) -> Vec<String> {
    let mut keywords = Vec::new();
    for todo in &cal.vtodos {
        if !todo.categories.to_lowercase().contains("tomorrow") {
            continue;
        }
        let clean: String = todo
            .summary
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == ' ' { c } else { ' ' })
            .collect();
        for word in clean.split_whitespace() {
            if word.len() > 4 {
                keywords.push(word.to_lowercase());
            }
        }
    }
    keywords
}

impl AtcSkill {
    pub(crate) fn new(nextcloud: NextcloudConfig) -> Self {
        AtcSkill {
            workspace: PathBuf::new(),
            nextcloud,
        }
    }

    fn tasks_path(&self) -> PathBuf {
        self.workspace.join("memory").join("tasks.xml")
    }

    fn events_path(&self) -> PathBuf {
        self.workspace.join("memory").join("events.xml")
    }

    fn load_mirror(&self, path: &Path) -> Result<ICalendar, ToolResult> {
        let data = fs::read_to_string(path).map_err(|_| {
            ToolResult::error(format!(
                "{} not found in ATC memory workspace.",
                path.file_name().and_then(|n| n.to_str()).unwrap_or("mirror")
            ))
        })?;
        parser::parse_xcal(&data)
            .map_err(|e| ToolResult::error(format!("Failed to parse {}: {e}", path.display())))
    }

    fn save_mirror(&self, path: &Path, cal: &ICalendar) -> Result<(), ToolResult> {
        fs::write(path, parser::emit_xcal(cal))
            .map_err(|e| ToolResult::error(format!("Failed to write {}: {e}", path.display())))
    }

    fn analyze_tasks(&self) -> ToolResult {
        let cal = match self.load_mirror(&self.tasks_path()) {
            Ok(c) => c,
            Err(r) => return r,
        };
        let mut out = String::new();
        for todo in &cal.vtodos {
            if todo.categories.to_lowercase().contains("today") && todo.status != "COMPLETED" {
                out.push_str(&format!(
                    "- [ ] {} [Urgency: {}] (UID: {})\n",
                    todo.summary,
                    calculate_urgency(todo),
                    todo.uid
                ));
            }
        }
        if out.is_empty() {
            out = "No pending tasks found for 'Today' in tasks.xml".to_string();
        }
        ToolResult::text(out)
    }

    fn read_calendar(&self) -> ToolResult {
        let cal = match self.load_mirror(&self.events_path()) {
            Ok(c) => c,
            Err(r) => return r,
        };
        let now = Local::now();
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|n| Local.from_local_datetime(&n).single())
            .unwrap_or(now);
        let end_of_day = start_of_day + chrono::Duration::hours(24);

        let mut out = String::new();
        for event in &cal.vevents {
            let dt_local = if !event.dtstart.is_empty() {
                match DateTime::parse_from_rfc3339(&event.dtstart) {
                    Ok(t) => t.with_timezone(&Local),
                    Err(_) => continue,
                }
            } else if !event.dtstart_date.is_empty() {
                match NaiveDate::parse_from_str(&event.dtstart_date, "%Y-%m-%d") {
                    Ok(d) => match d
                        .and_hms_opt(0, 0, 0)
                        .and_then(|n| Local.from_local_datetime(&n).single())
                    {
                        Some(t) => t,
                        None => continue,
                    },
                    Err(_) => continue,
                }
            } else {
                continue;
            };
            if dt_local >= start_of_day && dt_local < end_of_day {
                out.push_str(&format!(
                    "• {} - {}\n",
                    dt_local.format("%H:%M"),
                    event.summary
                ));
            }
        }
        if out.is_empty() {
            out = "No calendar events found for today.".to_string();
        }
        ToolResult::text(out)
    }

    fn extract_keywords_cmd(&self) -> ToolResult {
        let cal = match self.load_mirror(&self.tasks_path()) {
            Ok(c) => c,
            Err(r) => return r,
        };
        let keywords = extract_keywords(&cal);
        if keywords.is_empty() {
            ToolResult::text("No keywords extractable.")
        } else {
            ToolResult::text(keywords.join(", "))
        }
    }

    fn update_task(&self, task_uid: &str, status: &str) -> ToolResult {
        if task_uid.is_empty() || status.is_empty() {
            return ToolResult::error("task_uid and status are required for update_task");
        }
        let path = self.tasks_path();
        let mut cal = match self.load_mirror(&path) {
            Ok(c) => c,
            Err(r) => return r,
        };
        let Some(todo) = cal.vtodos.iter_mut().find(|t| t.uid == task_uid) else {
            return ToolResult::error(format!("Task UID {task_uid} not found in tasks.xml."));
        };
        todo.status = status.to_uppercase();
        if let Err(r) = self.save_mirror(&path, &cal) {
            return r;
        }
        ToolResult::text(format!(
            "Successfully updated task {task_uid} to status {}.",
            status.to_uppercase()
        ))
    }

    fn roll_over_tasks(&self) -> ToolResult {
        let path = self.tasks_path();
        let mut cal = match self.load_mirror(&path) {
            Ok(c) => c,
            Err(r) => return r,
        };
        let mut rolled = 0usize;
        for todo in cal.vtodos.iter_mut() {
            let category = todo.categories.to_lowercase();
            if category.contains("today")
                && todo.status != "COMPLETED"
                && todo.status != "CANCELLED"
            {
                let replaced = category.replace("today", "tomorrow");
                todo.categories = if replaced == category {
                    "tomorrow".to_string()
                } else {
                    replaced
                };
                rolled += 1;
            }
        }
        if rolled > 0 {
            if let Err(r) = self.save_mirror(&path, &cal) {
                return r;
            }
        }
        ToolResult::text(format!(
            "Successfully rolled over {rolled} pending 'Today' tasks into 'Tomorrow'."
        ))
    }

    fn sync_calendar(&self) -> ToolResult {
        if !self.nextcloud.is_configured() {
            return ToolResult::error(
                "No host configured. Set host in config.json under tools.nextcloud.",
            );
        }
        let url = self.nextcloud.calendar_url();
        let resp = self
            .nextcloud
            .agent()
            .get(&url)
            .set("Authorization", &self.nextcloud.auth_header())
            .call();
        let body = match resp {
            Ok(r) => match r.into_string() {
                Ok(b) => b,
                Err(e) => return ToolResult::error(format!("Failed to read calendar body: {e}")),
            },
            Err(e) => return ToolResult::error(format!("Failed to fetch external calendar: {e}")),
        };

        let cal = parser::parse_ics(&body);
        if cal.vevents.is_empty() {
            return ToolResult::error("Failed to parse external iCal data or no events found.");
        }
        let count = cal.vevents.len();
        if let Err(r) = self.save_mirror(&self.events_path(), &cal) {
            return r;
        }
        ToolResult::text(format!(
            "Successfully synced {count} events from Nextcloud ({url}). Saved to events.xml."
        ))
    }

    fn push_task(
        &self,
        summary: &str,
        due: Option<String>,
        start: Option<String>,
        priority: Option<i64>,
        notes: Option<String>,
    ) -> ToolResult {
        if summary.is_empty() {
            return ToolResult::error("summary parameter is required for push_task");
        }
        if !self.nextcloud.is_configured() {
            return ToolResult::error("host not configured in config.json tools.nextcloud");
        }
        let uid = format!(
            "atc-task-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let mut props = vec![
            ("SUMMARY".to_string(), summary.to_string()),
            ("STATUS".to_string(), "NEEDS-ACTION".to_string()),
        ];
        if let Some(start) = start.filter(|s| !s.is_empty()) {
            props.push(("DTSTART".to_string(), caldav::format_rfc3339_to_ics(&start)));
        }
        if let Some(due) = due.filter(|s| !s.is_empty()) {
            props.push(("DUE".to_string(), caldav::format_rfc3339_to_ics(&due)));
        }
        if let Some(p) = priority.filter(|p| *p > 0) {
            props.push(("PRIORITY".to_string(), p.to_string()));
        }
        if let Some(notes) = notes.filter(|s| !s.is_empty()) {
            props.push(("DESCRIPTION".to_string(), notes.replace('\n', "\\n")));
        }
        let ics = caldav::build_ics("VTODO", &uid, &props);
        match caldav::put_item(&self.nextcloud, &self.nextcloud.tasks_url(), &uid, &ics) {
            Ok(()) => ToolResult::text(format!(
                "✅ Task '{summary}' successfully pushed to your Nextcloud Tasks (UID: {uid})."
            )),
            Err(e) => ToolResult::error(format!("Failed to push task to Nextcloud: {e}")),
        }
    }

    fn list_nextcloud_tasks(&self) -> ToolResult {
        if !self.nextcloud.is_configured() {
            return ToolResult::error("host not configured in config.json tools.nextcloud");
        }
        match caldav::propfind_hrefs(&self.nextcloud, &self.nextcloud.tasks_url()) {
            Ok(hrefs) if hrefs.is_empty() => {
                ToolResult::text("No tasks found in your Nextcloud Tasks collection.")
            }
            Ok(hrefs) => {
                let mut out = format!("Found {} tasks:\n", hrefs.len());
                for href in hrefs {
                    out.push_str(&format!("  - {href}\n"));
                }
                ToolResult::text(out)
            }
            Err(e) => ToolResult::error(format!("Failed to list Nextcloud tasks: {e}")),
        }
    }

    fn get_task(&self, task_href: &str) -> ToolResult {
        if task_href.is_empty() {
            return ToolResult::error(
                "task_href is required. Use list_nextcloud_tasks to get the href paths.",
            );
        }
        match caldav::get_item_fields(&self.nextcloud, &self.nextcloud.tasks_url(), task_href) {
            Ok(fields) => {
                let mut out = String::from("Task details:\n");
                for key in [
                    "SUMMARY",
                    "UID",
                    "STATUS",
                    "PRIORITY",
                    "DUE",
                    "DTSTART",
                    "DESCRIPTION",
                    "LOCATION",
                    "URL",
                    "PERCENT-COMPLETE",
                ] {
                    if let Some(v) = fields.get(key) {
                        if !v.is_empty() {
                            out.push_str(&format!("  {key}: {v}\n"));
                        }
                    }
                }
                ToolResult::text(out)
            }
            Err(e) => ToolResult::error(format!("Failed to get task: {e}")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_task(
        &self,
        task_href: &str,
        summary: Option<String>,
        due: Option<String>,
        start: Option<String>,
        priority: Option<i64>,
        notes: Option<String>,
        location: Option<String>,
    ) -> ToolResult {
        if task_href.is_empty() {
            return ToolResult::error(
                "task_href is required. Use list_nextcloud_tasks to get the href paths.",
            );
        }
        let updates = TaskUpdate {
            summary: summary.filter(|s| !s.is_empty()),
            due: due.filter(|s| !s.is_empty()),
            start: start.filter(|s| !s.is_empty()),
            priority: priority.filter(|p| *p > 0),
            notes: notes.filter(|s| !s.is_empty()),
            location: location.filter(|s| !s.is_empty()),
            ..Default::default()
        };
        match caldav::merge_task(&self.nextcloud, &self.nextcloud.tasks_url(), task_href, &updates)
        {
            Ok(()) => ToolResult::text(format!("✏️ Task updated: {task_href}")),
            Err(e) => ToolResult::error(format!("Failed to merge task: {e}")),
        }
    }

    fn delete_task(&self, task_href: &str) -> ToolResult {
        if task_href.is_empty() {
            return ToolResult::error(
                "task_href is required. Use list_nextcloud_tasks first to get the href paths.",
            );
        }
        match caldav::delete_item(&self.nextcloud, &self.nextcloud.tasks_url(), task_href) {
            Ok(()) => ToolResult::text(format!("🗑️ Task deleted: {task_href}")),
            Err(e) => ToolResult::error(format!("Failed to delete task: {e}")),
        }
    }
}

impl Skill for AtcSkill {
    fn name(&self) -> &'static str {
        "atc"
    }

    fn description(&self) -> String {
        "Air Traffic Controller (ATC) - Task management and calendar integration.\n\nLocal task commands (operate on tasks.xml and events.xml in workspace memory):\n- analyze_tasks: Parse tasks.xml and return urgency-scored active tasks for today.\n- read_calendar: Parse events.xml for today's events using local timezone.\n- extract_keywords: Extract keywords from 'Tomorrow' tasks for pre-fetching.\n- update_task: Change the status of a task in tasks.xml by UID (e.g. COMPLETED).\n- roll_over_tasks: Move all pending 'Today' tasks to 'Tomorrow' in tasks.xml.\n\nNextcloud CalDAV commands (operate live on Nextcloud via network):\n- sync_calendar: Fetch the external .ics calendar from Nextcloud and overwrite events.xml.\n- push_task: Create a new task in Nextcloud with summary, due, start, priority, notes.\n- list_nextcloud_tasks: List all task hrefs in your Nextcloud tasks/ collection.\n- get_task: Fetch a single task's full details from Nextcloud by href.\n- merge_task: Update fields of an existing Nextcloud task by href.\n- delete_task: Delete a specific Nextcloud task by href.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute",
                    "enum": ["analyze_tasks", "read_calendar", "extract_keywords", "update_task", "roll_over_tasks", "sync_calendar", "push_task", "list_nextcloud_tasks", "get_task", "merge_task", "delete_task"]
                },
                "task_uid": {
                    "type": "string",
                    "description": "The UID of the task to update (only for update_task)."
                },
                "status": {
                    "type": "string",
                    "description": "The new status, e.g. COMPLETED, IN-PROCESS (only for update_task)."
                },
                "summary": {
                    "type": "string",
                    "description": "Task title/summary (push_task, merge_task)."
                },
                "due": {
                    "type": "string",
                    "description": "Optional due date in RFC3339 format, e.g. 2026-02-21T17:00:00Z (push_task, merge_task)."
                },
                "start": {
                    "type": "string",
                    "description": "Optional start date in RFC3339 format (push_task, merge_task)."
                },
                "priority": {
                    "type": "integer",
                    "description": "Priority: 1=High, 5=Medium, 9=Low (push_task, merge_task)."
                },
                "notes": {
                    "type": "string",
                    "description": "Optional description/notes for the task (push_task, merge_task)."
                },
                "location": {
                    "type": "string",
                    "description": "Optional location (merge_task)."
                },
                "task_href": {
                    "type": "string",
                    "description": "The CalDAV href path of the task, e.g. /remote.php/dav/calendars/user/tasks/uid.ics (get_task, merge_task, delete_task)."
                }
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&mut self, workspace: &Path) {
        self.workspace = workspace.to_path_buf();
        init_workspace(workspace, IDENTITY);

        // Seed the local mirrors so first reads don't error.
        let mem = workspace.join("memory");
        for name in ["tasks.xml", "events.xml"] {
            let path = mem.join(name);
            if !path.exists() {
                let _ = fs::write(&path, parser::empty_xcal());
            }
        }
    }

    fn execute(&self, args: &Value) -> ToolResult {
        let command: AtcCommand = match decode_command(args) {
            Ok(c) => c,
            Err(result) => return result,
        };
        match command {
            AtcCommand::AnalyzeTasks => self.analyze_tasks(),
            AtcCommand::ReadCalendar => self.read_calendar(),
            AtcCommand::ExtractKeywords => self.extract_keywords_cmd(),
            AtcCommand::UpdateTask { task_uid, status } => self.update_task(&task_uid, &status),
            AtcCommand::RollOverTasks => self.roll_over_tasks(),
            AtcCommand::SyncCalendar => self.sync_calendar(),
            AtcCommand::PushTask {
                summary,
                due,
                start,
                priority,
                notes,
            } => self.push_task(&summary, due, start, priority, notes),
            AtcCommand::ListNextcloudTasks => self.list_nextcloud_tasks(),
            AtcCommand::GetTask { task_href } => self.get_task(&task_href),
            AtcCommand::MergeTask {
                task_href,
                summary,
                due,
                start,
                priority,
                notes,
                location,
            } => self.merge_task(&task_href, summary, due, start, priority, notes, location),
            AtcCommand::DeleteTask { task_href } => self.delete_task(&task_href),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn skill_in(dir: &tempfile::TempDir) -> AtcSkill {
        let mut skill = AtcSkill::new(NextcloudConfig::default());
        skill.set_workspace(&dir.path().join("atc"));
        skill
    }

    fn todo(uid: &str, summary: &str, status: &str, priority: i64, categories: &str) -> VTodo {
        VTodo {
            uid: uid.to_string(),
            summary: summary.to_string(),
            status: status.to_string(),
            priority,
            categories: categories.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_urgency_scoring() {
        let mut t = todo("u", "x", "NEEDS-ACTION", 1, "Today");
        assert_eq!(calculate_urgency(&t), 90);
        t.priority = 4;
        assert_eq!(calculate_urgency(&t), 70);
        t.priority = 9;
        assert_eq!(calculate_urgency(&t), 55);
        t.priority = 0;
        assert_eq!(calculate_urgency(&t), 50);
        t.due_date = "2026-03-01".to_string();
        assert_eq!(calculate_urgency(&t), 60);
        t.priority = 1;
        assert_eq!(calculate_urgency(&t), 100);
    }

    #[test]
    fn test_analyze_tasks_filters_today_open() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let cal = ICalendar {
            vtodos: vec![
                todo("u1", "Ship release", "NEEDS-ACTION", 1, "Today"),
                todo("u2", "Done thing", "COMPLETED", 1, "Today"),
                todo("u3", "Later thing", "NEEDS-ACTION", 5, "Tomorrow"),
            ],
            vevents: vec![],
        };
        fs::write(skill.tasks_path(), parser::emit_xcal(&cal)).unwrap();

        let result = skill.analyze_tasks();
        assert!(result.for_llm.contains("Ship release"));
        assert!(result.for_llm.contains("(UID: u1)"));
        assert!(!result.for_llm.contains("Done thing"));
        assert!(!result.for_llm.contains("Later thing"));
    }

    #[test]
    fn test_extract_keywords_from_tomorrow() {
        let cal = ICalendar {
            vtodos: vec![
                todo("u1", "Review transformer quantization paper", "NEEDS-ACTION", 0, "Tomorrow"),
                todo("u2", "Buy milk now", "NEEDS-ACTION", 0, "Today"),
            ],
            vevents: vec![],
        };
        let words = extract_keywords(&cal);
        assert_eq!(words, vec!["review", "transformer", "quantization", "paper"]);
    }

    #[test]
    fn test_update_task_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let cal = ICalendar {
            vtodos: vec![todo("u1", "Ship release", "NEEDS-ACTION", 1, "Today")],
            vevents: vec![],
        };
        fs::write(skill.tasks_path(), parser::emit_xcal(&cal)).unwrap();

        let result = skill.update_task("u1", "in-process");
        assert!(!result.is_error);
        let reloaded = skill.load_mirror(&skill.tasks_path()).unwrap();
        assert_eq!(reloaded.vtodos[0].status, "IN-PROCESS", "stored upper-case");

        let missing = skill.update_task("nope", "COMPLETED");
        assert!(missing.is_error);
    }

    #[test]
    fn test_roll_over_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let cal = ICalendar {
            vtodos: vec![
                todo("u1", "Unfinished", "NEEDS-ACTION", 0, "Today"),
                todo("u2", "Finished", "COMPLETED", 0, "Today"),
                todo("u3", "Dropped", "CANCELLED", 0, "Today"),
            ],
            vevents: vec![],
        };
        fs::write(skill.tasks_path(), parser::emit_xcal(&cal)).unwrap();

        let result = skill.roll_over_tasks();
        assert!(result.for_llm.contains("rolled over 1"));
        let reloaded = skill.load_mirror(&skill.tasks_path()).unwrap();
        assert_eq!(reloaded.vtodos[0].categories, "tomorrow");
        assert_eq!(reloaded.vtodos[1].categories, "Today");
    }

    #[test]
    fn test_read_calendar_today_window() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        let today_evt = crate::parser::VEvent {
            uid: "e1".to_string(),
            summary: "Standup".to_string(),
            dtstart: (Local::now() + chrono::Duration::minutes(5)).to_rfc3339(),
            ..Default::default()
        };
        let tomorrow_evt = crate::parser::VEvent {
            uid: "e2".to_string(),
            summary: "Future".to_string(),
            dtstart: (Local::now() + chrono::Duration::days(2)).to_rfc3339(),
            ..Default::default()
        };
        let cal = ICalendar {
            vtodos: vec![],
            vevents: vec![today_evt, tomorrow_evt],
        };
        fs::write(skill.events_path(), parser::emit_xcal(&cal)).unwrap();

        let result = skill.read_calendar();
        assert!(result.for_llm.contains("Standup"));
        assert!(!result.for_llm.contains("Future"));
    }

    #[test]
    fn test_set_workspace_seeds_mirrors_once() {
        let dir = tempfile::tempdir().unwrap();
        let skill = skill_in(&dir);
        fs::write(skill.tasks_path(), "customized").unwrap();
        // Second set_workspace must not clobber.
        let mut skill2 = AtcSkill::new(NextcloudConfig::default());
        skill2.set_workspace(&dir.path().join("atc"));
        assert_eq!(fs::read_to_string(skill.tasks_path()).unwrap(), "customized");
    }
}
