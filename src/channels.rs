//! Channel adapters: the boundary between the bus and the outside world.
//! Adapters publish inbound messages and drain the outbound topic; the core
//! never talks to a messenger directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::bus::{BusMessage, MessageBus};
use crate::config::Config;

pub(crate) trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    /// Start the inbound side, if the adapter has one.
    fn start(&self, bus: Arc<MessageBus>, shutdown: Arc<AtomicBool>) -> Option<JoinHandle<()>>;
    fn send(&self, chat_id: &str, text: &str) -> Result<(), String>;
}

pub(crate) struct ChannelManager {
    channels: Vec<Arc<dyn Channel>>,
}

impl ChannelManager {
    pub(crate) fn from_config(config: &Config, debug: bool) -> Self {
        let mut channels: Vec<Arc<dyn Channel>> = vec![Arc::new(ConsoleChannel)];
        let tg = &config.channels.telegram;
        if tg.enabled && !tg.token.is_empty() {
            channels.push(Arc::new(TelegramChannel {
                token: tg.token.clone(),
                allow_from: tg.allow_from.clone(),
                debug,
            }));
        }
        ChannelManager { channels }
    }

    pub(crate) fn enabled_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Spawn every adapter's inbound poller plus one outbound dispatcher
    /// that routes bus messages to the owning adapter.
    pub(crate) fn start_all(
        &self,
        bus: Arc<MessageBus>,
        shutdown: Arc<AtomicBool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for channel in &self.channels {
            if let Some(handle) = channel.start(Arc::clone(&bus), Arc::clone(&shutdown)) {
                handles.push(handle);
            }
        }

        let channels = self.channels.clone();
        let dispatcher = thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                let Some(msg) = bus.next_outbound(Duration::from_millis(500)) else {
                    continue;
                };
                match channels.iter().find(|c| c.name() == msg.channel) {
                    Some(channel) => {
                        if let Err(e) = channel.send(&msg.chat_id, &msg.content) {
                            eprintln!("[channels] {} send failed: {e}", msg.channel);
                        }
                    }
                    None => eprintln!("[channels] no adapter for '{}', dropped", msg.channel),
                }
            }
        });
        handles.push(dispatcher);
        handles
    }
}

// ── Console ──────────────────────────────────────────────────────────────

/// Prints outbound traffic; inbound console interaction lives in the
/// `agent` subcommand, not the daemon.
pub(crate) struct ConsoleChannel;

impl Channel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    fn start(&self, _bus: Arc<MessageBus>, _shutdown: Arc<AtomicBool>) -> Option<JoinHandle<()>> {
        None
    }

    fn send(&self, _chat_id: &str, text: &str) -> Result<(), String> {
        println!("🎯 {text}");
        Ok(())
    }
}

// ── Telegram ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramUpdateResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

pub(crate) struct TelegramChannel {
    token: String,
    allow_from: Vec<String>,
    debug: bool,
}

fn telegram_api_base(token: &str) -> String {
    match std::env::var("TELEGRAM_API_BASE") {
        Ok(base) => format!("{base}/bot{token}"),
        Err(_) => format!("https://api.telegram.org/bot{token}"),
    }
}

impl TelegramChannel {
    fn poll_once(&self, agent: &ureq::Agent, base_url: &str, offset: i64, bus: &MessageBus) -> i64 {
        let url = format!("{base_url}/getUpdates?timeout=25&offset={offset}");
        let response = match agent.get(&url).call() {
            Ok(resp) => resp,
            Err(e) => {
                eprintln!("[telegram] getUpdates failed: {e}");
                thread::sleep(Duration::from_secs(3));
                return offset;
            }
        };
        let payload: TelegramUpdateResponse = match response.into_json() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("[telegram] getUpdates parse: {e}");
                return offset;
            }
        };
        if !payload.ok {
            return offset;
        }

        let mut next_offset = offset;
        for update in payload.result {
            next_offset = next_offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            let chat_id = message.chat.id.to_string();
            if !self.allow_from.is_empty() && !self.allow_from.contains(&chat_id) {
                if self.debug {
                    eprintln!("[telegram] dropped message from unlisted chat {chat_id}");
                }
                continue;
            }
            let sender = message
                .from
                .map(|u| u.id.to_string())
                .unwrap_or_else(|| chat_id.clone());
            bus.publish_inbound(BusMessage::new("telegram", sender, chat_id, text));
        }
        next_offset
    }
}

impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn start(&self, bus: Arc<MessageBus>, shutdown: Arc<AtomicBool>) -> Option<JoinHandle<()>> {
        let channel = TelegramChannel {
            token: self.token.clone(),
            allow_from: self.allow_from.clone(),
            debug: self.debug,
        };
        Some(thread::spawn(move || {
            let base_url = telegram_api_base(&channel.token);
            let agent = ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .timeout_read(Duration::from_secs(35))
                .build();
            let mut offset = 0i64;
            eprintln!("[telegram] long-poll started");
            while !shutdown.load(Ordering::SeqCst) {
                offset = channel.poll_once(&agent, &base_url, offset, &bus);
            }
        }))
    }

    fn send(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let base_url = telegram_api_base(&self.token);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(10))
            .build();
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        match agent
            .post(&format!("{base_url}/sendMessage"))
            .set("content-type", "application/json")
            .send_json(payload)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                Err(format!("sendMessage returned {code}: {snippet}"))
            }
            Err(ureq::Error::Transport(t)) => Err(format!("sendMessage transport: {t}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_always_has_console() {
        let manager = ChannelManager::from_config(&Config::default(), false);
        assert_eq!(manager.enabled_names(), vec!["console"]);
    }

    #[test]
    fn test_manager_enables_telegram() {
        let raw = r#"{"channels": {"telegram": {"enabled": true, "token": "t", "allow_from": ["42"]}}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        let manager = ChannelManager::from_config(&config, false);
        assert!(manager.enabled_names().contains(&"telegram"));
    }

    #[test]
    fn test_update_parsing() {
        let raw = r#"{"ok": true, "result": [
            {"update_id": 7, "message": {"chat": {"id": 42}, "from": {"id": 9}, "text": "hello"}},
            {"update_id": 8, "message": {"chat": {"id": 42}}}
        ]}"#;
        let parsed: TelegramUpdateResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.result.len(), 2);
        assert_eq!(parsed.result[0].message.as_ref().unwrap().text.as_deref(), Some("hello"));
        assert!(parsed.result[1].message.as_ref().unwrap().text.is_none());
    }
}
