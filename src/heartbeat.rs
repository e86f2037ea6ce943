//! Heartbeat ticker: a cheap local check decides whether anything urgent is
//! pending before any LM call is made. Calm ticks stay silent; urgent ones
//! drive the tool-call loop with the canned prompt from the orchestrator's
//! HEARTBEAT.md, and a reply of exactly `HEARTBEAT_OK` is swallowed.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::agent::{run_tool_loop, LoopConfig};
use crate::bus::{BusMessage, MessageBus};
use crate::parser::parse_xcal;
use crate::provider::ChatMessage;

pub(crate) const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Instants sidecar written by the deadline skill next to its dashboard,
/// replacing substring scans over the markdown.
#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
pub(crate) struct DeadlineSidecar {
    pub(crate) generated_at: String,
    #[serde(default)]
    pub(crate) instants: Vec<DeadlineInstant>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct DeadlineInstant {
    /// Local-time `YYYY-MM-DDTHH:MM`.
    pub(crate) instant: String,
    pub(crate) summary: String,
}

/// True when `instant` lies within [now, now + 2h), or is already past
/// (overdue entries are emitted at T00:00 of their due day).
pub(crate) fn instant_is_imminent(instant: &str, now: chrono::DateTime<Local>) -> bool {
    let Ok(naive) = NaiveDateTime::parse_from_str(instant, "%Y-%m-%dT%H:%M") else {
        return false;
    };
    let Some(t) = Local.from_local_datetime(&naive).single() else {
        return false;
    };
    let delta = t.signed_duration_since(now);
    delta.num_minutes() < 120 && delta.num_hours() > -24
}

/// Open P0/P1 items in the tasks mirror. The priority tag must be present
/// explicitly — a missing tag is "undefined", not high priority.
pub(crate) fn tasks_have_priority_open(raw: &str) -> bool {
    let tagged_high = raw.contains("<priority><integer>0</integer>")
        || raw.contains("<priority><integer>1</integer>");
    if !tagged_high {
        return false;
    }
    match parse_xcal(raw) {
        Ok(cal) => cal.vtodos.iter().any(|t| {
            t.status != "COMPLETED" && t.status != "CANCELLED" && t.priority <= 1
        }),
        Err(_) => true,
    }
}

/// The cheap pre-check: dashboard priority markers, sidecar instants, and
/// the tasks mirror. No network I/O.
pub(crate) fn heartbeat_is_urgent(workspace_root: &Path, now: chrono::DateTime<Local>) -> bool {
    let dashboard = workspace_root
        .join("architect")
        .join("memory")
        .join("deadlines-today.md");
    if let Ok(content) = fs::read_to_string(&dashboard) {
        if content.contains("[P0]") || content.contains("[P1]") {
            return true;
        }
    }

    let sidecar_path = workspace_root
        .join("architect")
        .join("memory")
        .join("deadlines-today.json");
    if let Ok(data) = fs::read_to_string(&sidecar_path) {
        if let Ok(sidecar) = serde_json::from_str::<DeadlineSidecar>(&data) {
            if sidecar
                .instants
                .iter()
                .any(|i| instant_is_imminent(&i.instant, now))
            {
                return true;
            }
        }
    }

    let tasks_path = workspace_root.join("atc").join("memory").join("tasks.xml");
    if let Ok(raw) = fs::read_to_string(&tasks_path) {
        if tasks_have_priority_open(&raw) {
            return true;
        }
    }

    false
}

/// Canned heartbeat prompt from the orchestrator's HEARTBEAT.md. Comment
/// lines are stripped; an effectively empty file skips the API call.
pub(crate) fn heartbeat_prompt(workspace_root: &Path) -> Option<String> {
    let raw = fs::read_to_string(workspace_root.join("HEARTBEAT.md")).ok()?;
    let meaningful: Vec<&str> = raw
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .collect();
    if meaningful.is_empty() {
        None
    } else {
        Some(meaningful.join("\n"))
    }
}

pub(crate) struct HeartbeatService {
    pub(crate) interval_minutes: u64,
    pub(crate) enabled: bool,
    pub(crate) origin_channel: String,
    pub(crate) origin_chat_id: String,
}

impl HeartbeatService {
    /// Spawn the ticker thread. Returns None when disabled or the interval
    /// is 0.
    pub(crate) fn spawn(
        self,
        workspace_root: std::path::PathBuf,
        bus: Arc<MessageBus>,
        loop_config: Arc<LoopConfig>,
        shutdown: Arc<AtomicBool>,
    ) -> Option<JoinHandle<()>> {
        if !self.enabled || self.interval_minutes == 0 {
            return None;
        }
        let interval = Duration::from_secs(self.interval_minutes * 60);
        let handle = thread::spawn(move || {
            let mut last_tick = Instant::now();
            eprintln!("[heartbeat] started, interval {}m", self.interval_minutes);
            while !shutdown.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(1));
                if last_tick.elapsed() < interval {
                    continue;
                }
                last_tick = Instant::now();
                self.tick(&workspace_root, &bus, &loop_config);
            }
        });
        Some(handle)
    }

    fn tick(&self, workspace_root: &Path, bus: &MessageBus, loop_config: &LoopConfig) {
        if !heartbeat_is_urgent(workspace_root, Local::now()) {
            eprintln!("[heartbeat] OK (nothing urgent)");
            return;
        }
        let Some(prompt) = heartbeat_prompt(workspace_root) else {
            eprintln!("[heartbeat] urgent state but HEARTBEAT.md is empty, skipping");
            return;
        };

        let messages = vec![
            ChatMessage::system(crate::agent::orchestrator_system_prompt(workspace_root)),
            ChatMessage::user(prompt),
        ];
        match run_tool_loop(loop_config, messages) {
            Ok(result) => {
                let reply = result.content.trim();
                if reply.is_empty() || reply == HEARTBEAT_OK {
                    eprintln!("[heartbeat] OK (agent confirmed)");
                    return;
                }
                bus.publish_outbound(BusMessage::new(
                    self.origin_channel.clone(),
                    "scheduler",
                    self.origin_chat_id.clone(),
                    reply.to_string(),
                ));
            }
            Err(e) => eprintln!("[heartbeat] loop error: {e}"),
        }
    }
}

/// Default HEARTBEAT.md content for the orchestrator workspace.
pub(crate) fn default_heartbeat_instructions() -> &'static str {
    "# Heartbeat Instruction\nThe scheduler has woken you up because something is urgently pending.\nCheck the urgent_deadlines tool to review deadlines, or analyze_tasks for open tasks.\nIf there are items that are P0 or expiring soon which the user needs to know about, notify them.\nIf nothing is urgent, just reply: HEARTBEAT_OK\n"
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_instant_is_imminent() {
        let now = Local::now();
        let soon = (now + ChronoDuration::minutes(90))
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        let later = (now + ChronoDuration::hours(5))
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        let overdue = (now - ChronoDuration::hours(3))
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        assert!(instant_is_imminent(&soon, now));
        assert!(!instant_is_imminent(&later, now));
        assert!(instant_is_imminent(&overdue, now));
        assert!(!instant_is_imminent("garbage", now));
    }

    #[test]
    fn test_silent_path_when_calm() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        // Dashboard present but free of urgent markers.
        write(
            &root.join("architect").join("memory").join("deadlines-today.md"),
            "# Life Admin Status\n\n## URGENT\n- *No urgent tasks*\n",
        );
        write(
            &root.join("architect").join("memory").join("deadlines-today.json"),
            r#"{"generated_at": "2026-02-23T08:00:00Z", "instants": []}"#,
        );
        // Tasks mirror without P0/P1 open items.
        write(
            &root.join("atc").join("memory").join("tasks.xml"),
            &crate::parser::emit_xcal(&crate::parser::ICalendar {
                vtodos: vec![crate::parser::VTodo {
                    uid: "t1".to_string(),
                    summary: "Low priority thing".to_string(),
                    priority: 5,
                    status: "NEEDS-ACTION".to_string(),
                    categories: "Today".to_string(),
                    ..Default::default()
                }],
                vevents: vec![],
            }),
        );
        assert!(!heartbeat_is_urgent(root, Local::now()));
    }

    #[test]
    fn test_urgent_on_imminent_sidecar_instant() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let soon = (Local::now() + ChronoDuration::minutes(30))
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        write(
            &root.join("architect").join("memory").join("deadlines-today.json"),
            &serde_json::to_string(&DeadlineSidecar {
                generated_at: "now".to_string(),
                instants: vec![DeadlineInstant {
                    instant: soon,
                    summary: "Rent".to_string(),
                }],
            })
            .unwrap(),
        );
        assert!(heartbeat_is_urgent(root, Local::now()));
    }

    #[test]
    fn test_urgent_on_open_p1_task() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let cal = crate::parser::ICalendar {
            vtodos: vec![crate::parser::VTodo {
                uid: "t1".to_string(),
                summary: "Critical".to_string(),
                priority: 1,
                status: "NEEDS-ACTION".to_string(),
                ..Default::default()
            }],
            vevents: vec![],
        };
        write(
            &root.join("atc").join("memory").join("tasks.xml"),
            &crate::parser::emit_xcal(&cal),
        );
        assert!(heartbeat_is_urgent(root, Local::now()));

        // Completed P1 is not urgent.
        let done = crate::parser::ICalendar {
            vtodos: vec![crate::parser::VTodo {
                uid: "t1".to_string(),
                summary: "Critical".to_string(),
                priority: 1,
                status: "COMPLETED".to_string(),
                ..Default::default()
            }],
            vevents: vec![],
        };
        write(
            &root.join("atc").join("memory").join("tasks.xml"),
            &crate::parser::emit_xcal(&done),
        );
        assert!(!heartbeat_is_urgent(root, Local::now()));
    }

    #[test]
    fn test_heartbeat_prompt_comment_only_skips() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("HEARTBEAT.md"),
            "# HEARTBEAT.md\n\n# only comments here\n",
        );
        assert!(heartbeat_prompt(dir.path()).is_none());

        write(
            &dir.path().join("HEARTBEAT.md"),
            "# header\nCheck urgent_deadlines now.\n",
        );
        assert_eq!(
            heartbeat_prompt(dir.path()).unwrap(),
            "Check urgent_deadlines now."
        );
    }
}
