//! LM endpoint client. The loop depends only on the `LlmProvider` trait;
//! the shipped implementation speaks the OpenAI-compatible chat-completions
//! wire shape, which is what the configured gateways expose. Tool calls in
//! responses are accepted with the name/arguments either top-level or
//! nested under `function`, and arguments either as a JSON object or a
//! JSON-encoded string.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::Config;

#[derive(Debug, Clone)]
pub(crate) struct ChatMessage {
    pub(crate) role: String,
    pub(crate) content: String,
    pub(crate) tool_calls: Vec<ToolCall>,
    pub(crate) tool_call_id: Option<String>,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub(crate) fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub(crate) fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        ChatMessage {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ToolCall {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) args: Value,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ChatResponse {
    pub(crate) content: String,
    pub(crate) tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone)]
pub(crate) struct ChatOptions {
    pub(crate) max_tokens: u64,
    pub(crate) temperature: Option<f64>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        ChatOptions {
            max_tokens: 8192,
            temperature: None,
        }
    }
}

pub(crate) trait LlmProvider: Send + Sync {
    fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, String>;

    fn default_model(&self) -> String;
}

pub(crate) struct OpenAiProvider {
    api_key: String,
    api_base: String,
    default_model: String,
    timeout: Duration,
}

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const MAX_RETRIES: u32 = 2;

/// Build the provider from config: `agents.defaults.provider` selects a
/// `providers.<name>` entry, with `model_list` as the fallback source.
pub(crate) fn create_provider(config: &Config) -> Result<Arc<dyn LlmProvider>, String> {
    let defaults = &config.agents.defaults;

    if !defaults.provider.is_empty() {
        if let Some(provider_cfg) = config.providers.get(&defaults.provider) {
            if provider_cfg.api_key.is_empty() {
                return Err(format!("provider '{}' has no api_key", defaults.provider));
            }
            return Ok(Arc::new(OpenAiProvider {
                api_key: provider_cfg.api_key.clone(),
                api_base: provider_cfg
                    .api_base
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                default_model: defaults.model.clone(),
                timeout: Duration::from_secs(120),
            }));
        }
        return Err(format!(
            "provider '{}' not found under providers.*",
            defaults.provider
        ));
    }

    if let Some(entry) = config.model_list.first() {
        if entry.api_key.is_empty() {
            return Err("model_list entry has no api_key".to_string());
        }
        let model = if defaults.model.is_empty() {
            entry.model.clone()
        } else {
            defaults.model.clone()
        };
        return Ok(Arc::new(OpenAiProvider {
            api_key: entry.api_key.clone(),
            api_base: entry
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            default_model: model,
            timeout: Duration::from_secs(120),
        }));
    }

    Err("no LLM provider configured (set agents.defaults.provider or model_list)".to_string())
}

pub(crate) fn build_request_payload(
    messages: &[ChatMessage],
    tools: &[Value],
    model: &str,
    options: &ChatOptions,
) -> Value {
    let wire_messages: Vec<Value> = messages
        .iter()
        .map(|m| match m.role.as_str() {
            "assistant" if !m.tool_calls.is_empty() => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.args.to_string(),
                            }
                        })
                    })
                    .collect();
                json!({"role": "assistant", "content": m.content, "tool_calls": calls})
            }
            "tool" => json!({
                "role": "tool",
                "content": m.content,
                "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
            }),
            _ => json!({"role": m.role, "content": m.content}),
        })
        .collect();

    let mut payload = json!({
        "model": model,
        "messages": wire_messages,
        "max_tokens": options.max_tokens,
    });
    if !tools.is_empty() {
        payload["tools"] = json!(tools);
    }
    if let Some(temp) = options.temperature {
        payload["temperature"] = json!(temp);
    }
    payload
}

/// Decode one response tool-call entry, tolerating both nesting styles and
/// both argument encodings.
fn parse_tool_call(entry: &Value, index: usize) -> Option<ToolCall> {
    let function = entry.get("function");
    let name = entry
        .get("name")
        .and_then(|v| v.as_str())
        .or_else(|| function.and_then(|f| f.get("name")).and_then(|v| v.as_str()))?
        .to_string();
    if name.is_empty() {
        return None;
    }

    let raw_args = entry
        .get("arguments")
        .or_else(|| function.and_then(|f| f.get("arguments")));
    let args = match raw_args {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            serde_json::from_str(s).unwrap_or_else(|_| json!({}))
        }
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    };

    let id = entry
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("call-{index}"));

    Some(ToolCall { id, name, args })
}

pub(crate) fn parse_chat_response(payload: &Value) -> Result<ChatResponse, String> {
    let message = payload
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .ok_or("response missing choices[0].message")?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(i, entry)| parse_tool_call(entry, i))
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        tool_calls,
    })
}

impl LlmProvider for OpenAiProvider {
    fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ChatResponse, String> {
        let model = if model.is_empty() {
            self.default_model.clone()
        } else {
            model.to_string()
        };
        let payload = build_request_payload(messages, tools, &model, options);
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.timeout)
            .timeout_read(self.timeout)
            .timeout_write(self.timeout)
            .build();

        let retryable = |status: u16| matches!(status, 429 | 500 | 502 | 503 | 504 | 529);
        let mut last_err = String::new();

        for attempt in 0..=MAX_RETRIES {
            let response = agent
                .post(&url)
                .set("content-type", "application/json")
                .set("authorization", &format!("Bearer {}", self.api_key))
                .send_json(payload.clone());

            match response {
                Ok(resp) => {
                    let body = resp
                        .into_string()
                        .map_err(|e| format!("LLM response read: {e}"))?;
                    let parsed: Value = serde_json::from_str(&body)
                        .map_err(|e| format!("LLM response parse: {e}"))?;
                    return parse_chat_response(&parsed);
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let body = resp.into_string().unwrap_or_default();
                    let snippet: String = body.chars().take(300).collect();
                    last_err = format!("LLM returned {code}: {snippet}");
                    if attempt < MAX_RETRIES && retryable(code) {
                        let delay = 0.5 * 2.0_f64.powi(attempt as i32);
                        thread::sleep(Duration::from_secs_f64(delay.min(4.0)));
                        continue;
                    }
                    break;
                }
                Err(ureq::Error::Transport(t)) => {
                    last_err = format!("LLM transport error: {t}");
                    if attempt < MAX_RETRIES {
                        let delay = 0.5 * 2.0_f64.powi(attempt as i32);
                        thread::sleep(Duration::from_secs_f64(delay.min(4.0)));
                        continue;
                    }
                    break;
                }
            }
        }
        Err(last_err)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_nested_function_string_args() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "monitor",
                            "arguments": "{\"command\": \"fetch\", \"limit\": 5}"
                        }
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&payload).unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "monitor");
        assert_eq!(resp.tool_calls[0].args["limit"], 5);
    }

    #[test]
    fn test_parse_response_top_level_map_args() {
        let payload = json!({
            "choices": [{
                "message": {
                    "content": "ok",
                    "tool_calls": [{
                        "name": "chief",
                        "arguments": {"command": "morning_brief"}
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&payload).unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(resp.tool_calls[0].id, "call-0", "missing id is synthesized");
        assert_eq!(resp.tool_calls[0].args["command"], "morning_brief");
    }

    #[test]
    fn test_parse_response_no_tools() {
        let payload = json!({
            "choices": [{"message": {"content": "All done."}}]
        });
        let resp = parse_chat_response(&payload).unwrap();
        assert_eq!(resp.content, "All done.");
        assert!(resp.tool_calls.is_empty());
    }

    #[test]
    fn test_build_request_payload_shapes() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("hi"),
            ChatMessage::assistant(
                "",
                vec![ToolCall {
                    id: "c1".to_string(),
                    name: "atc".to_string(),
                    args: json!({"command": "analyze_tasks"}),
                }],
            ),
            ChatMessage::tool("result text", "c1"),
        ];
        let tools = vec![json!({"type": "function", "function": {"name": "atc"}})];
        let payload = build_request_payload(&messages, &tools, "m1", &ChatOptions::default());

        assert_eq!(payload["model"], "m1");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(
            payload["messages"][2]["tool_calls"][0]["function"]["name"],
            "atc"
        );
        assert_eq!(payload["messages"][3]["tool_call_id"], "c1");
        assert_eq!(payload["tools"][0]["function"]["name"], "atc");
    }

    #[test]
    fn test_create_provider_requires_config() {
        let config = Config::default();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_from_model_list() {
        let raw = r#"{
            "model_list": [{"provider": "openrouter", "model": "meta/llama-3.1-8b-instruct",
                            "model_name": "llama", "api_key": "k",
                            "api_base": "https://openrouter.ai/api/v1"}]
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.default_model(), "meta/llama-3.1-8b-instruct");
    }
}
