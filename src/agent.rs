//! The tool-call loop: bounded iterative dialogue between the LM endpoint
//! and the skill registry, plus the gateway-side pump that feeds inbound
//! bus messages through the loop and publishes replies outbound.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::bus::{BusMessage, MessageBus};
use crate::provider::{ChatMessage, ChatOptions, LlmProvider};
use crate::skill::SkillRegistry;

pub(crate) const SUBAGENT_MAX_ITERATIONS: usize = 10;

pub(crate) struct LoopConfig {
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) model: String,
    pub(crate) registry: SkillRegistry,
    pub(crate) max_iterations: usize,
    pub(crate) options: ChatOptions,
}

pub(crate) struct LoopResult {
    pub(crate) content: String,
    pub(crate) iterations: usize,
}

/// Drive the LM until it answers without tool calls or the iteration cap is
/// reached. Tool calls within one reply are dispatched sequentially, in
/// order; silent results are not appended to the transcript. Hitting the
/// cap is not an error — the last assistant content is returned as-is, and
/// no further LM call is made.
pub(crate) fn run_tool_loop(
    config: &LoopConfig,
    mut messages: Vec<ChatMessage>,
) -> Result<LoopResult, String> {
    let tool_defs = config.registry.tool_definitions();
    let mut response = config
        .provider
        .chat(&messages, &tool_defs, &config.model, &config.options)?;
    let mut iterations = 0usize;

    while !response.tool_calls.is_empty() && iterations < config.max_iterations {
        iterations += 1;
        messages.push(ChatMessage::assistant(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            if call.name.trim().is_empty() {
                continue;
            }
            let result = config.registry.execute(&call.name, &call.args);
            eprintln!(
                "[agent] tool {} returned {} chars{}",
                call.name,
                result.for_llm.len(),
                if result.is_error { " (error)" } else { "" }
            );
            if result.silent {
                continue;
            }
            let content = if result.for_llm.is_empty() {
                result.for_user.clone()
            } else {
                result.for_llm.clone()
            };
            if content.is_empty() {
                continue;
            }
            messages.push(ChatMessage::tool(content, call.id.clone()));
        }

        if iterations >= config.max_iterations {
            break;
        }
        response = config
            .provider
            .chat(&messages, &tool_defs, &config.model, &config.options)?;
    }

    Ok(LoopResult {
        content: response.content,
        iterations,
    })
}

/// System prompt for the orchestrator loop: the workspace IDENTITY.md when
/// present, otherwise the built-in skill briefing.
pub(crate) fn orchestrator_system_prompt(workspace_root: &Path) -> String {
    let identity_path = workspace_root.join("IDENTITY.md");
    if let Ok(text) = fs::read_to_string(&identity_path) {
        if !text.trim().is_empty() {
            return text;
        }
    }
    default_system_prompt()
}

pub(crate) fn default_system_prompt() -> String {
    [
        "You are picoclaw, a personal multi-agent AI assistant.",
        "",
        "Available tools (call as needed, including multiple times in one session):",
        "- architect: Life admin; CalDAV sync/create/delete tasks on Nextcloud. Commands: sync_deadlines, create_task, delete_task",
        "- chief: Strategic commander; daily briefs, urgent deadlines, morning/evening summaries. Commands: morning_brief, evening_review, urgent_deadlines, status, delegate",
        "- atc: Task management; reads/writes tasks.xml, daily priorities. Commands: analyze_tasks, read_calendar, extract_keywords, update_task, roll_over_tasks, sync_calendar, push_task, list_nextcloud_tasks, get_task, merge_task, delete_task",
        "- coach: Learning coach; IELTS prep, habit tracking, Nextcloud integration. Commands: check_habits, generate_practice, update_deck, nudge_telegram",
        "- monitor: News curation; Bangladesh + Tech RSS feeds. Commands: fetch, status, feeds",
        "- research: Academic paper discovery from arXiv and HuggingFace. Commands: fetch, download, memory",
        "- subagent: Spawn any of the above as a dedicated subagent with deeper context",
        "- cron: Schedule recurring prompts. Commands: add, remove, list",
        "",
        "IMPORTANT RENDERING RULES:",
        "- For morning_brief, evening_review, fetch news, search papers: reproduce the full tool output verbatim. Do NOT summarize.",
        "- For create/delete/sync actions: a short confirmation is fine.",
        "- When the user asks for a multi-step task, call tools sequentially as needed.",
    ]
    .join("\n")
}

/// Consume inbound bus messages and answer each on its own thread. User
/// flow errors come back as a single `❌`-prefixed outbound message;
/// scheduler-originated errors are only logged.
pub(crate) fn run_message_pump(
    bus: Arc<MessageBus>,
    config: Arc<LoopConfig>,
    system_prompt: String,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let Some(msg) = bus.next_inbound(Duration::from_millis(500)) else {
            continue;
        };
        let bus = Arc::clone(&bus);
        let config = Arc::clone(&config);
        let system_prompt = system_prompt.clone();
        let _ = thread::spawn(move || {
            let messages = vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(msg.content.clone()),
            ];
            match run_tool_loop(&config, messages) {
                Ok(result) => {
                    if !result.content.trim().is_empty() {
                        bus.publish_outbound(BusMessage::new(
                            msg.channel,
                            "agent",
                            msg.chat_id,
                            result.content,
                        ));
                    }
                }
                Err(e) => {
                    eprintln!("[agent] loop failed for {}:{}: {e}", msg.channel, msg.chat_id);
                    if msg.sender_id != "scheduler" {
                        bus.publish_outbound(BusMessage::new(
                            msg.channel,
                            "agent",
                            msg.chat_id,
                            format!("❌ {e}"),
                        ));
                    }
                }
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
