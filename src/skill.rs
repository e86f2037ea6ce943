//! Uniform capability surface for skills: name, description, parameter
//! schema, workspace, execute. The registry dispatches LM tool calls and
//! advertises the wire-shaped tool catalog.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

/// Uniform return value of every skill invocation. `for_llm` feeds the
/// transcript and drives continuation; `for_user` is rendered to the human.
/// At least one of them is non-empty unless `silent`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ToolResult {
    pub(crate) for_llm: String,
    pub(crate) for_user: String,
    pub(crate) silent: bool,
    pub(crate) is_error: bool,
    pub(crate) is_async: bool,
}

impl ToolResult {
    /// Same text on both channels.
    pub(crate) fn text(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        ToolResult {
            for_llm: msg.clone(),
            for_user: msg,
            ..Default::default()
        }
    }

    pub(crate) fn split(for_llm: impl Into<String>, for_user: impl Into<String>) -> Self {
        ToolResult {
            for_llm: for_llm.into(),
            for_user: for_user.into(),
            ..Default::default()
        }
    }

    pub(crate) fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        ToolResult {
            for_llm: msg.clone(),
            for_user: msg,
            is_error: true,
            ..Default::default()
        }
    }

    /// Carries text for the transcript but suppresses the user channel.
    pub(crate) fn silent(msg: impl Into<String>) -> Self {
        ToolResult {
            for_llm: msg.into(),
            silent: true,
            ..Default::default()
        }
    }
}

/// A registered capability. The name advertised in `parameters()` is the
/// registry key; `set_workspace` is idempotent and bootstraps the skill's
/// marker files on first call.
pub(crate) trait Skill: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> String;
    fn parameters(&self) -> Value;
    fn set_workspace(&mut self, workspace: &Path);
    fn execute(&self, args: &Value) -> ToolResult;
}

/// Write the identity/heartbeat marker files if missing and create the
/// `memory/` subtree. Existing files are never clobbered, which is what
/// makes a second `set_workspace` a no-op.
pub(crate) fn init_workspace(workspace: &Path, identity: &str) {
    if let Err(e) = fs::create_dir_all(workspace.join("memory")) {
        eprintln!("[skill] workspace mkdir {}: {e}", workspace.display());
        return;
    }

    let identity_path = workspace.join("IDENTITY.md");
    if !identity_path.exists() {
        let _ = fs::write(&identity_path, identity);
    }

    let heartbeat_path = workspace.join("HEARTBEAT.md");
    if !heartbeat_path.exists() {
        let _ = fs::write(
            &heartbeat_path,
            "# HEARTBEAT.md\n\n# Keep this file empty (or with only comments) to skip heartbeat API calls.\n",
        );
    }
}

/// Registry keyed by skill name.
#[derive(Default, Clone)]
pub(crate) struct SkillRegistry {
    skills: BTreeMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub(crate) fn new() -> Self {
        SkillRegistry {
            skills: BTreeMap::new(),
        }
    }

    pub(crate) fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    pub(crate) fn len(&self) -> usize {
        self.skills.len()
    }

    /// LM-shaped tool specs, one per registered skill.
    pub(crate) fn tool_definitions(&self) -> Vec<Value> {
        self.skills
            .values()
            .map(|skill| {
                json!({
                    "type": "function",
                    "function": {
                        "name": skill.name(),
                        "description": skill.description(),
                        "parameters": skill.parameters(),
                    }
                })
            })
            .collect()
    }

    /// Dispatch by name. Unknown names come back as error results so the
    /// LM can recover.
    pub(crate) fn execute(&self, name: &str, args: &Value) -> ToolResult {
        match self.skills.get(name) {
            Some(skill) => skill.execute(args),
            None => ToolResult::error(format!("unknown tool: {name}")),
        }
    }
}

/// Decode `{command: ...}` arguments into a skill's typed command enum,
/// shaping decode failures into the uniform error result.
pub(crate) fn decode_command<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolResult> {
    serde_json::from_value(args.clone())
        .map_err(|e| ToolResult::error(format!("invalid arguments: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSkill;

    impl Skill for EchoSkill {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> String {
            "Echo test skill".to_string()
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "enum": ["say"]}
                },
                "required": ["command"]
            })
        }
        fn set_workspace(&mut self, _workspace: &Path) {}
        fn execute(&self, args: &Value) -> ToolResult {
            ToolResult::text(format!("echo: {args}"))
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let mut reg = SkillRegistry::new();
        reg.register(Arc::new(EchoSkill));
        let result = reg.execute("echo", &json!({"command": "say"}));
        assert!(!result.is_error);
        assert!(result.for_llm.contains("say"));
    }

    #[test]
    fn test_registry_unknown_tool() {
        let reg = SkillRegistry::new();
        let result = reg.execute("nope", &json!({}));
        assert!(result.is_error);
        assert!(result.for_llm.contains("unknown tool"));
    }

    #[test]
    fn test_tool_definitions_shape() {
        let mut reg = SkillRegistry::new();
        reg.register(Arc::new(EchoSkill));
        let defs = reg.tool_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0]["type"], "function");
        assert_eq!(defs[0]["function"]["name"], "echo");
        assert_eq!(
            defs[0]["function"]["parameters"]["properties"]["command"]["enum"][0],
            "say"
        );
    }

    #[test]
    fn test_init_workspace_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("echo");
        init_workspace(&ws, "# Echo\n");
        fs::write(ws.join("IDENTITY.md"), "edited by hand").unwrap();
        init_workspace(&ws, "# Echo\n");
        let content = fs::read_to_string(ws.join("IDENTITY.md")).unwrap();
        assert_eq!(content, "edited by hand", "second init must not clobber");
        assert!(ws.join("memory").is_dir());
        assert!(ws.join("HEARTBEAT.md").exists());
    }
}
