//! Subagent manager: isolated nested tool-call loops spawned by the parent
//! loop. Each subagent runs on its own process-rooted thread — it survives
//! the request that spawned it — and publishes its final text on the bus
//! keyed to the origin so the parent can observe completion. The task
//! table lives only in memory and dies with the process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::{run_tool_loop, LoopConfig, SUBAGENT_MAX_ITERATIONS};
use crate::bus::{BusMessage, MessageBus};
use crate::provider::{ChatMessage, ChatOptions, LlmProvider};
use crate::skill::{Skill, SkillRegistry, ToolResult};

pub(crate) const VALID_AGENTS: [(&str, &str); 6] = [
    ("chief", "Strategic commander, orchestrates other agents"),
    ("architect", "Life admin, bills, medicine tracking"),
    ("coach", "Learning coach, IELTS prep, habit tracking"),
    ("monitor", "News curation, Bangladesh + Tech"),
    ("research", "ArXiv/HuggingFace paper discovery"),
    ("atc", "Task management, daily priorities"),
];

#[derive(Debug, Clone)]
pub(crate) struct SubagentTask {
    pub(crate) id: String,
    pub(crate) task: String,
    pub(crate) label: String,
    pub(crate) agent_type: String,
    pub(crate) origin_channel: String,
    pub(crate) origin_chat_id: String,
    /// running → completed | failed (terminal).
    pub(crate) status: String,
    pub(crate) result: String,
    pub(crate) iterations: usize,
}

pub(crate) struct SubagentManager {
    tasks: Mutex<HashMap<String, SubagentTask>>,
    next_id: Mutex<u64>,
    provider: Arc<dyn LlmProvider>,
    registry: SkillRegistry,
    workspace_root: PathBuf,
    bus: Option<Arc<MessageBus>>,
    model: String,
    options: ChatOptions,
}

impl SubagentManager {
    pub(crate) fn new(
        provider: Arc<dyn LlmProvider>,
        registry: SkillRegistry,
        workspace_root: PathBuf,
        bus: Option<Arc<MessageBus>>,
        model: String,
        options: ChatOptions,
    ) -> Self {
        SubagentManager {
            tasks: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
            provider,
            registry,
            workspace_root,
            bus,
            model,
            options,
        }
    }

    /// System prompt assembled from the per-agent workspace: personality,
    /// instructions, tool manifest, user context, long-term memory.
    pub(crate) fn build_system_prompt(&self, agent_type: &str) -> String {
        let workspace = self.workspace_root.join(agent_type);
        let mut prompt = String::from(
            "You are a subagent. Complete the given task independently and report the result.\nYou have access to tools - use them as needed to complete your task.\nAfter completing the task, provide a clear summary of what was done.\n\n",
        );
        let sections: [(&str, PathBuf); 5] = [
            ("## Your SOUL (Personality)", workspace.join("SOUL.md")),
            ("## Your Instructions", workspace.join("AGENTS.md")),
            ("## Available Tools", workspace.join("TOOLS.md")),
            ("## User Context", workspace.join("USER.md")),
            ("## Long-term Memory", workspace.join("memory").join("MEMORY.md")),
        ];
        for (heading, path) in sections {
            if let Ok(content) = fs::read_to_string(&path) {
                if !content.trim().is_empty() {
                    prompt.push_str(heading);
                    prompt.push_str("\n\n");
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
            }
        }
        prompt
    }

    pub(crate) fn spawn(
        self: Arc<Self>,
        task: &str,
        label: &str,
        agent_type: &str,
        origin_channel: &str,
        origin_chat_id: &str,
    ) -> String {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            let id = format!("subagent-{next}");
            *next += 1;
            id
        };
        let record = SubagentTask {
            id: id.clone(),
            task: task.to_string(),
            label: label.to_string(),
            agent_type: agent_type.to_string(),
            origin_channel: origin_channel.to_string(),
            origin_chat_id: origin_chat_id.to_string(),
            status: "running".to_string(),
            result: String::new(),
            iterations: 0,
        };
        {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.insert(id.clone(), record.clone());
        }

        let _ = thread::spawn(move || self.run_task(record));

        if label.is_empty() {
            format!("Spawned subagent ({agent_type}) for task: {task}")
        } else {
            format!("Spawned subagent '{label}' ({agent_type}) for task: {task}")
        }
    }

    fn run_task(&self, task: SubagentTask) {
        let system_prompt = self.build_system_prompt(&task.agent_type);
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(task.task.clone()),
        ];
        let config = LoopConfig {
            provider: Arc::clone(&self.provider),
            model: self.model.clone(),
            registry: self.registry.clone(),
            max_iterations: SUBAGENT_MAX_ITERATIONS,
            options: self.options.clone(),
        };
        let outcome = run_tool_loop(&config, messages);

        let announce = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            let entry = tasks.get_mut(&task.id);
            let Some(entry) = entry else { return };
            match outcome {
                Ok(result) => {
                    entry.status = "completed".to_string();
                    entry.result = result.content;
                    entry.iterations = result.iterations;
                }
                Err(e) => {
                    entry.status = "failed".to_string();
                    entry.result = format!("Error: {e}");
                }
            }
            format!(
                "Task '{}' ({}) {}.\n\nResult:\n{}",
                entry.label, entry.agent_type, entry.status, entry.result
            )
        };
        eprintln!("[subagent] {} finished", task.id);

        if let Some(bus) = &self.bus {
            bus.publish_inbound(BusMessage::new(
                "system",
                format!("subagent:{}", task.id),
                format!("{}:{}", task.origin_channel, task.origin_chat_id),
                announce,
            ));
        }
    }

    #[allow(dead_code)]
    pub(crate) fn get_task(&self, id: &str) -> Option<SubagentTask> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.get(id).cloned()
    }
}

// ── Subagent tool ────────────────────────────────────────────────────────

pub(crate) struct SubagentTool {
    manager: Arc<SubagentManager>,
    origin_channel: String,
    origin_chat_id: String,
}

#[derive(Debug, Deserialize)]
struct SubagentArgs {
    task: String,
    agent_type: String,
    #[serde(default)]
    label: String,
}

impl SubagentTool {
    pub(crate) fn new(manager: Arc<SubagentManager>) -> Self {
        SubagentTool {
            manager,
            origin_channel: "cli".to_string(),
            origin_chat_id: "direct".to_string(),
        }
    }
}

impl Skill for SubagentTool {
    fn name(&self) -> &'static str {
        "subagent"
    }

    fn description(&self) -> String {
        let mut lines = vec![
            "Execute a subagent task with agent-specific context. Available agent types:".to_string(),
        ];
        for (agent, desc) in VALID_AGENTS {
            lines.push(format!("- {agent}: {desc}"));
        }
        lines.push(String::new());
        lines.push(
            "Each agent loads its own SOUL.md, AGENTS.md, TOOLS.md, and memory from its workspace."
                .to_string(),
        );
        lines.join("\n")
    }

    fn parameters(&self) -> Value {
        let agent_options: Vec<&str> = VALID_AGENTS.iter().map(|(name, _)| *name).collect();
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the subagent to complete"
                },
                "agent_type": {
                    "type": "string",
                    "description": "Agent type to use",
                    "enum": agent_options
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for the task (for tracking)"
                }
            },
            "required": ["task", "agent_type"]
        })
    }

    fn set_workspace(&mut self, _workspace: &Path) {}

    fn execute(&self, args: &Value) -> ToolResult {
        let parsed: SubagentArgs = match serde_json::from_value(args.clone()) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        if !VALID_AGENTS.iter().any(|(name, _)| *name == parsed.agent_type) {
            return ToolResult::error(format!("invalid agent_type: {}", parsed.agent_type));
        }

        let message = Arc::clone(&self.manager).spawn(
            &parsed.task,
            &parsed.label,
            &parsed.agent_type,
            &self.origin_channel,
            &self.origin_chat_id,
        );

        let user_content: String = message.chars().take(500).collect();
        let llm_content = format!(
            "Subagent spawned:\nAgent Type: {}\nLabel: {}\nTask: {}\n\n{}",
            parsed.agent_type, parsed.label, parsed.task, message
        );
        ToolResult::split(llm_content, user_content)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatResponse;
    use std::time::Duration;

    struct StaticProvider;

    impl LlmProvider for StaticProvider {
        fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[Value],
            _model: &str,
            _options: &ChatOptions,
        ) -> Result<ChatResponse, String> {
            Ok(ChatResponse {
                content: "subtask done".to_string(),
                tool_calls: Vec::new(),
            })
        }
        fn default_model(&self) -> String {
            "mock".to_string()
        }
    }

    fn manager_with_bus(dir: &tempfile::TempDir) -> (Arc<SubagentManager>, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new());
        let manager = Arc::new(SubagentManager::new(
            Arc::new(StaticProvider),
            SkillRegistry::new(),
            dir.path().to_path_buf(),
            Some(Arc::clone(&bus)),
            "mock".to_string(),
            ChatOptions::default(),
        ));
        (manager, bus)
    }

    #[test]
    fn test_spawn_completes_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, bus) = manager_with_bus(&dir);
        Arc::clone(&manager).spawn("summarize the news", "news-digest", "monitor", "telegram", "42");

        let announce = bus.next_inbound(Duration::from_secs(5)).expect("bus announce");
        assert_eq!(announce.channel, "system");
        assert!(announce.sender_id.starts_with("subagent:"));
        assert_eq!(announce.chat_id, "telegram:42");
        assert!(announce.content.contains("subtask done"));

        let task = manager.get_task("subagent-1").unwrap();
        assert_eq!(task.status, "completed");
        assert_eq!(task.result, "subtask done");
    }

    #[test]
    fn test_system_prompt_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("research");
        fs::create_dir_all(ws.join("memory")).unwrap();
        fs::write(ws.join("SOUL.md"), "Nerdy enthusiasm.").unwrap();
        fs::write(ws.join("memory").join("MEMORY.md"), "Prefers PDF links.").unwrap();

        let (manager, _) = manager_with_bus(&dir);
        let prompt = manager.build_system_prompt("research");
        assert!(prompt.contains("## Your SOUL (Personality)"));
        assert!(prompt.contains("Nerdy enthusiasm."));
        assert!(prompt.contains("## Long-term Memory"));
        assert!(prompt.contains("Prefers PDF links."));
        assert!(!prompt.contains("## Your Instructions"), "absent files are skipped");
    }

    #[test]
    fn test_tool_rejects_unknown_agent() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_with_bus(&dir);
        let tool = SubagentTool::new(manager);
        let result = tool.execute(&json!({"task": "x", "agent_type": "warlock"}));
        assert!(result.is_error);
    }
}
