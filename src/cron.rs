//! Cron service: a JSON-backed job list evaluated at one-minute
//! granularity. A job fires at most once per scheduled minute even across
//! restarts, because the fired minute is persisted as the job's last run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Datelike, Local, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::skill::{Skill, ToolResult};

// ── Cron expressions ─────────────────────────────────────────────────────

/// Five-field matcher: minute hour day-of-month month day-of-week
/// (0=Sun..6=Sat). Supports `*`, values, ranges, `*/step` and lists.
pub(crate) struct CronExpr {
    minute: CronField,
    hour: CronField,
    dom: CronField,
    month: CronField,
    dow: CronField,
}

pub(crate) enum CronField {
    Any,
    Values(Vec<u32>),
}

impl CronExpr {
    pub(crate) fn parse(expr: &str) -> Result<Self, String> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(format!("cron: expected 5 fields, got {}", parts.len()));
        }
        Ok(CronExpr {
            minute: Self::parse_field(parts[0], 0, 59)?,
            hour: Self::parse_field(parts[1], 0, 23)?,
            dom: Self::parse_field(parts[2], 1, 31)?,
            month: Self::parse_field(parts[3], 1, 12)?,
            dow: Self::parse_field(parts[4], 0, 6)?,
        })
    }

    fn parse_field(field: &str, min: u32, max: u32) -> Result<CronField, String> {
        if field == "*" {
            return Ok(CronField::Any);
        }
        let mut values = Vec::new();
        for part in field.split(',') {
            if let Some((start_s, end_s)) = part.split_once('-') {
                let start: u32 = start_s
                    .parse()
                    .map_err(|_| format!("cron: bad value '{start_s}'"))?;
                let end: u32 = end_s
                    .parse()
                    .map_err(|_| format!("cron: bad value '{end_s}'"))?;
                if start < min || end > max || start > end {
                    return Err(format!("cron: range {start}-{end} out of bounds [{min}-{max}]"));
                }
                values.extend(start..=end);
            } else if let Some(step_s) = part.strip_prefix("*/") {
                let step: u32 = step_s
                    .parse()
                    .map_err(|_| format!("cron: bad step '{step_s}'"))?;
                if step == 0 {
                    return Err("cron: step cannot be 0".to_string());
                }
                let mut v = min;
                while v <= max {
                    values.push(v);
                    v += step;
                }
            } else {
                let val: u32 = part
                    .parse()
                    .map_err(|_| format!("cron: bad value '{part}'"))?;
                if val < min || val > max {
                    return Err(format!("cron: value {val} out of bounds [{min}-{max}]"));
                }
                values.push(val);
            }
        }
        Ok(CronField::Values(values))
    }

    pub(crate) fn matches(&self, minute: u32, hour: u32, dom: u32, month: u32, dow: u32) -> bool {
        Self::field_matches(&self.minute, minute)
            && Self::field_matches(&self.hour, hour)
            && Self::field_matches(&self.dom, dom)
            && Self::field_matches(&self.month, month)
            && Self::field_matches(&self.dow, dow)
    }

    fn field_matches(field: &CronField, value: u32) -> bool {
        match field {
            CronField::Any => true,
            CronField::Values(vals) => vals.contains(&value),
        }
    }
}

fn weekday_to_cron(weekday: Weekday) -> u32 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

// ── Job store ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CronJob {
    pub(crate) id: String,
    pub(crate) cron: String,
    pub(crate) payload: String,
    pub(crate) channel: String,
    pub(crate) chat_id: String,
    /// Minute stamp of the last firing, `YYYY-MM-DDTHH:MM`.
    #[serde(default)]
    pub(crate) last_run: Option<String>,
}

pub(crate) struct CronService {
    store_path: PathBuf,
    jobs: Mutex<Vec<CronJob>>,
}

fn minute_stamp(now: &chrono::DateTime<Local>) -> String {
    format!(
        "{}-{:02}-{:02}T{:02}:{:02}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute()
    )
}

impl CronService {
    pub(crate) fn open(store_path: PathBuf) -> Self {
        let jobs = match fs::read_to_string(&store_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        CronService {
            store_path,
            jobs: Mutex::new(jobs),
        }
    }

    fn save_locked(&self, jobs: &[CronJob]) {
        if let Some(parent) = self.store_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(jobs) {
            Ok(json) => {
                let tmp = self.store_path.with_extension("json.tmp");
                if fs::write(&tmp, &json).is_ok() {
                    let _ = fs::rename(&tmp, &self.store_path);
                }
            }
            Err(e) => eprintln!("[cron] serialize jobs: {e}"),
        }
    }

    pub(crate) fn add_job(
        &self,
        cron: &str,
        payload: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<String, String> {
        CronExpr::parse(cron)?;
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let next = jobs
            .iter()
            .filter_map(|j| j.id.strip_prefix("job-").and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("job-{next}");
        jobs.push(CronJob {
            id: id.clone(),
            cron: cron.to_string(),
            payload: payload.to_string(),
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            last_run: None,
        });
        self.save_locked(&jobs);
        Ok(id)
    }

    pub(crate) fn remove_job(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() != before;
        if removed {
            self.save_locked(&jobs);
        }
        removed
    }

    pub(crate) fn list_jobs(&self) -> Vec<CronJob> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Jobs due at `now` that have not already fired this minute. Marks
    /// them fired and persists before returning, so a crash between here
    /// and the dispatch cannot double-fire after restart.
    pub(crate) fn due_jobs(&self, now: chrono::DateTime<Local>) -> Vec<CronJob> {
        let stamp = minute_stamp(&now);
        let mut due = Vec::new();
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut changed = false;
        for job in jobs.iter_mut() {
            let expr = match CronExpr::parse(&job.cron) {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("[cron] job '{}' bad expression: {e}", job.id);
                    continue;
                }
            };
            if !expr.matches(
                now.minute(),
                now.hour(),
                now.day(),
                now.month(),
                weekday_to_cron(now.weekday()),
            ) {
                continue;
            }
            if job.last_run.as_deref() == Some(stamp.as_str()) {
                continue;
            }
            job.last_run = Some(stamp.clone());
            changed = true;
            due.push(job.clone());
        }
        if changed {
            self.save_locked(&jobs);
        }
        due
    }

    /// Evaluation thread at one-minute granularity.
    pub(crate) fn spawn(
        self: Arc<Self>,
        shutdown: Arc<AtomicBool>,
        on_due: impl Fn(CronJob) + Send + 'static,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            eprintln!("[cron] service started ({} jobs)", self.list_jobs().len());
            let mut last_checked = String::new();
            while !shutdown.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(1));
                let now = Local::now();
                let stamp = minute_stamp(&now);
                if stamp == last_checked {
                    continue;
                }
                last_checked = stamp;
                for job in self.due_jobs(now) {
                    eprintln!("[cron] job '{}' due, dispatching", job.id);
                    on_due(job);
                }
            }
        })
    }
}

// ── Cron tool ────────────────────────────────────────────────────────────

/// Skill-shaped wrapper so the LM can manage schedules. Jobs added here
/// fire back into the loop on the configured origin.
pub(crate) struct CronTool {
    service: Arc<CronService>,
    origin_channel: String,
    origin_chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum CronCommand {
    Add {
        cron: String,
        message: String,
    },
    Remove {
        id: String,
    },
    List,
}

impl CronTool {
    pub(crate) fn new(service: Arc<CronService>, origin_channel: &str, origin_chat_id: &str) -> Self {
        CronTool {
            service,
            origin_channel: origin_channel.to_string(),
            origin_chat_id: origin_chat_id.to_string(),
        }
    }
}

impl Skill for CronTool {
    fn name(&self) -> &'static str {
        "cron"
    }

    fn description(&self) -> String {
        "Scheduler - Manage recurring prompts evaluated every minute.\n\nCommands:\n- add: Schedule a message (5-field cron expression: minute hour day-of-month month day-of-week)\n- remove: Delete a job by id\n- list: Show all scheduled jobs".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command to execute",
                    "enum": ["add", "remove", "list"]
                },
                "cron": {
                    "type": "string",
                    "description": "Cron expression, e.g. '0 8 * * 1-5' (only for add)"
                },
                "message": {
                    "type": "string",
                    "description": "Prompt injected into the agent when the job fires (only for add)"
                },
                "id": {
                    "type": "string",
                    "description": "Job id to remove (only for remove)"
                }
            },
            "required": ["command"]
        })
    }

    fn set_workspace(&mut self, _workspace: &Path) {}

    fn execute(&self, args: &Value) -> ToolResult {
        let command: CronCommand = match crate::skill::decode_command(args) {
            Ok(c) => c,
            Err(result) => return result,
        };
        match command {
            CronCommand::Add { cron, message } => {
                match self
                    .service
                    .add_job(&cron, &message, &self.origin_channel, &self.origin_chat_id)
                {
                    Ok(id) => ToolResult::text(format!("Scheduled job {id}: '{cron}' → {message}")),
                    Err(e) => ToolResult::error(e),
                }
            }
            CronCommand::Remove { id } => {
                if self.service.remove_job(&id) {
                    ToolResult::text(format!("Removed job {id}."))
                } else {
                    ToolResult::error(format!("No job with id {id}."))
                }
            }
            CronCommand::List => {
                let jobs = self.service.list_jobs();
                if jobs.is_empty() {
                    return ToolResult::text("No scheduled jobs.");
                }
                let mut lines = vec![format!("{} scheduled job(s):", jobs.len())];
                for job in jobs {
                    lines.push(format!(
                        "  - {} '{}' → {} (last run: {})",
                        job.id,
                        job.cron,
                        job.payload,
                        job.last_run.as_deref().unwrap_or("never")
                    ));
                }
                ToolResult::text(lines.join("\n"))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expr_parse_and_match() {
        let expr = CronExpr::parse("30 8 * * 1-5").unwrap();
        assert!(expr.matches(30, 8, 15, 6, 3));
        assert!(!expr.matches(31, 8, 15, 6, 3));
        assert!(!expr.matches(30, 8, 15, 6, 0), "weekend excluded");

        let steps = CronExpr::parse("*/15 * * * *").unwrap();
        assert!(steps.matches(0, 3, 1, 1, 0));
        assert!(steps.matches(45, 3, 1, 1, 0));
        assert!(!steps.matches(20, 3, 1, 1, 0));
    }

    #[test]
    fn test_cron_expr_rejects_garbage() {
        assert!(CronExpr::parse("* * *").is_err());
        assert!(CronExpr::parse("61 * * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
    }

    #[test]
    fn test_due_jobs_fire_once_per_minute() {
        let dir = tempfile::tempdir().unwrap();
        let service = CronService::open(dir.path().join("jobs.json"));
        service
            .add_job("* * * * *", "tick", "telegram", "42")
            .unwrap();

        let now = Local::now();
        assert_eq!(service.due_jobs(now).len(), 1);
        assert_eq!(service.due_jobs(now).len(), 0, "same minute must not re-fire");
    }

    #[test]
    fn test_last_run_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("jobs.json");
        let now = Local::now();
        {
            let service = CronService::open(store.clone());
            service.add_job("* * * * *", "tick", "cli", "direct").unwrap();
            assert_eq!(service.due_jobs(now).len(), 1);
        }
        // New service over the same store, same minute: still skipped.
        let service2 = CronService::open(store);
        assert_eq!(service2.due_jobs(now).len(), 0);
    }

    #[test]
    fn test_remove_job() {
        let dir = tempfile::tempdir().unwrap();
        let service = CronService::open(dir.path().join("jobs.json"));
        let id = service.add_job("0 9 * * *", "brief", "cli", "d").unwrap();
        assert!(service.remove_job(&id));
        assert!(!service.remove_job(&id));
        assert!(service.list_jobs().is_empty());
    }

    #[test]
    fn test_cron_tool_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(CronService::open(dir.path().join("jobs.json")));
        let tool = CronTool::new(Arc::clone(&service), "cli", "direct");

        let added = tool.execute(&json!({"command": "add", "cron": "0 9 * * *", "message": "brief"}));
        assert!(!added.is_error);
        let listed = tool.execute(&json!({"command": "list"}));
        assert!(listed.for_llm.contains("0 9 * * *"));

        let bad = tool.execute(&json!({"command": "add", "cron": "nope", "message": "x"}));
        assert!(bad.is_error);
    }
}
