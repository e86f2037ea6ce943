mod agent;
mod bus;
mod caldav;
mod channels;
mod cli;
mod config;
mod cron;
mod dedup;
mod heartbeat;
mod parser;
mod provider;
mod rfc;
mod skill;
mod skills;
mod subagent;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use crate::agent::{orchestrator_system_prompt, run_tool_loop, LoopConfig};
use crate::bus::{BusMessage, MessageBus};
use crate::channels::ChannelManager;
use crate::cli::{Cli, Command};
use crate::config::{config_path, load_config, workspace_root, Config};
use crate::cron::{CronService, CronTool};
use crate::heartbeat::HeartbeatService;
use crate::provider::{create_provider, ChatMessage, ChatOptions, LlmProvider};
use crate::skill::{Skill, SkillRegistry};
use crate::subagent::{SubagentManager, SubagentTool};

const LOGO: &str = "🎯";
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help requests exit 0; anything else is a usage error.
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                let _ = err.print();
                std::process::exit(0);
            }
            let _ = err.print();
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Agent { message } => agent_cmd(message),
        Command::Gateway { debug } => gateway_cmd(debug),
        Command::Setup => setup_cmd(),
        Command::Version => println!("{LOGO} picoclaw v{VERSION}"),
    }
}

fn load_config_or_exit() -> Config {
    let path = config_path();
    match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    }
}

fn provider_or_exit(config: &Config) -> Arc<dyn LlmProvider> {
    match create_provider(config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("Error creating provider: {e}");
            std::process::exit(1);
        }
    }
}

/// Seed the orchestrator workspace root with its identity and heartbeat
/// marker files; per-skill workspaces bootstrap themselves.
fn ensure_workspace_root(root: &Path) {
    if let Err(e) = fs::create_dir_all(root) {
        eprintln!("Error creating workspace {}: {e}", root.display());
        std::process::exit(1);
    }
    let identity = root.join("IDENTITY.md");
    if !identity.exists() {
        let _ = fs::write(&identity, agent::default_system_prompt());
    }
    let heartbeat_md = root.join("HEARTBEAT.md");
    if !heartbeat_md.exists() {
        let _ = fs::write(&heartbeat_md, heartbeat::default_heartbeat_instructions());
    }
}

fn chat_options(config: &Config) -> ChatOptions {
    ChatOptions {
        max_tokens: config.agents.defaults.max_tokens,
        temperature: config.agents.defaults.temperature,
    }
}

/// Construct the six skills, bind each to its workspace, and register.
fn build_skill_registry(config: &Config, root: &Path) -> SkillRegistry {
    let mut registry = SkillRegistry::new();

    let mut research = skills::research::ResearchSkill::new();
    research.set_workspace(&root.join("research"));
    registry.register(Arc::new(research));

    let mut chief = skills::chief::ChiefSkill::new();
    chief.set_workspace(&root.join("chief"));
    registry.register(Arc::new(chief));

    let mut atc = skills::atc::AtcSkill::new(config.tools.nextcloud.clone());
    atc.set_workspace(&root.join("atc"));
    registry.register(Arc::new(atc));

    let mut monitor = skills::monitor::MonitorSkill::new(config.monitor.feeds.clone());
    monitor.set_workspace(&root.join("monitor"));
    registry.register(Arc::new(monitor));

    let mut coach =
        skills::coach::CoachSkill::new(config.tools.nextcloud.clone(), config.tools.telegram.clone());
    coach.set_workspace(&root.join("coach"));
    registry.register(Arc::new(coach));

    let mut architect = skills::architect::ArchitectSkill::new(config.tools.nextcloud.clone());
    architect.set_workspace(&root.join("architect"));
    registry.register(Arc::new(architect));

    registry
}

fn agent_cmd(message: Option<String>) {
    let config = load_config_or_exit();
    let provider = provider_or_exit(&config);
    let root = workspace_root();
    ensure_workspace_root(&root);

    let base_registry = build_skill_registry(&config, &root);
    let manager = Arc::new(SubagentManager::new(
        Arc::clone(&provider),
        base_registry.clone(),
        root.clone(),
        None,
        config.agents.defaults.model.clone(),
        chat_options(&config),
    ));
    let mut registry = base_registry;
    registry.register(Arc::new(SubagentTool::new(manager)));
    let cron_service = Arc::new(CronService::open(root.join("cron").join("jobs.json")));
    registry.register(Arc::new(CronTool::new(cron_service, "console", "direct")));

    let loop_config = LoopConfig {
        provider,
        model: config.agents.defaults.model.clone(),
        registry,
        max_iterations: config.agents.defaults.max_tool_iterations,
        options: chat_options(&config),
    };
    let system_prompt = orchestrator_system_prompt(&root);

    if let Some(message) = message {
        let response = process_message(&loop_config, &system_prompt, &message);
        println!("\n{LOGO} {response}\n");
        return;
    }

    println!("{LOGO} Interactive mode (Ctrl+C to exit)");
    println!("Type your message...");
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }
        let response = process_message(&loop_config, &system_prompt, input);
        println!("\n{response}\n");
    }
}

fn process_message(loop_config: &LoopConfig, system_prompt: &str, user_message: &str) -> String {
    let messages = vec![
        ChatMessage::system(system_prompt.to_string()),
        ChatMessage::user(user_message.to_string()),
    ];
    match run_tool_loop(loop_config, messages) {
        Ok(result) => result.content,
        Err(e) => format!("Error: {e}"),
    }
}

fn gateway_cmd(debug: bool) {
    if debug {
        println!("🔍 Debug mode enabled");
    }
    let config = load_config_or_exit();
    let provider = provider_or_exit(&config);
    let root = workspace_root();
    ensure_workspace_root(&root);

    let bus = Arc::new(MessageBus::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            eprintln!("\nShutting down...");
            shutdown.store(true, Ordering::SeqCst);
        }) {
            eprintln!("Error installing signal handler: {e}");
            std::process::exit(1);
        }
    }

    let base_registry = build_skill_registry(&config, &root);
    let manager = Arc::new(SubagentManager::new(
        Arc::clone(&provider),
        base_registry.clone(),
        root.clone(),
        Some(Arc::clone(&bus)),
        config.agents.defaults.model.clone(),
        chat_options(&config),
    ));

    // Scheduler output lands on Telegram when configured, console otherwise.
    let (origin_channel, origin_chat_id) = if config.channels.telegram.enabled {
        ("telegram".to_string(), config.tools.telegram.chat_id.clone())
    } else {
        ("console".to_string(), "direct".to_string())
    };

    let mut registry = base_registry;
    registry.register(Arc::new(SubagentTool::new(manager)));
    let cron_service = Arc::new(CronService::open(root.join("cron").join("jobs.json")));
    registry.register(Arc::new(CronTool::new(
        Arc::clone(&cron_service),
        &origin_channel,
        &origin_chat_id,
    )));

    println!("\n📦 Agent Status:");
    println!("  • Tools: {} loaded", registry.len());

    let loop_config = Arc::new(LoopConfig {
        provider,
        model: config.agents.defaults.model.clone(),
        registry,
        max_iterations: config.agents.defaults.max_tool_iterations,
        options: chat_options(&config),
    });

    // Cron jobs replay their payload through the loop; the reply goes back
    // on the job's origin unless it is empty.
    {
        let bus = Arc::clone(&bus);
        let loop_config = Arc::clone(&loop_config);
        let root = root.clone();
        let _ = cron_service.spawn(Arc::clone(&shutdown), move |job| {
            let bus = Arc::clone(&bus);
            let loop_config = Arc::clone(&loop_config);
            let system_prompt = orchestrator_system_prompt(&root);
            let _ = thread::spawn(move || {
                let messages = vec![
                    ChatMessage::system(system_prompt),
                    ChatMessage::user(job.payload.clone()),
                ];
                match run_tool_loop(&loop_config, messages) {
                    Ok(result) if !result.content.trim().is_empty() => {
                        bus.publish_outbound(BusMessage::new(
                            job.channel.clone(),
                            "scheduler",
                            job.chat_id.clone(),
                            result.content,
                        ));
                    }
                    Ok(_) => {}
                    Err(e) => eprintln!("[cron] job '{}' loop failed: {e}", job.id),
                }
            });
        });
        println!("✓ Cron service started");
    }

    let heartbeat_handle = HeartbeatService {
        interval_minutes: config.heartbeat.interval,
        enabled: config.heartbeat.enabled,
        origin_channel: origin_channel.clone(),
        origin_chat_id: origin_chat_id.clone(),
    }
    .spawn(
        root.clone(),
        Arc::clone(&bus),
        Arc::clone(&loop_config),
        Arc::clone(&shutdown),
    );
    if heartbeat_handle.is_some() {
        println!("✓ Heartbeat service started");
    }

    let channel_manager = ChannelManager::from_config(&config, debug);
    let enabled = channel_manager.enabled_names();
    if enabled.len() > 1 {
        println!("✓ Channels enabled: {enabled:?}");
    } else {
        println!("⚠ Warning: no external channels enabled");
    }
    channel_manager.start_all(Arc::clone(&bus), Arc::clone(&shutdown));

    spawn_health_server(&config, Arc::clone(&shutdown));
    println!("✓ Gateway started on {}:{}", config.gateway.host, config.gateway.port);
    println!("Press Ctrl+C to stop");

    let system_prompt = orchestrator_system_prompt(&root);
    agent::run_message_pump(bus, loop_config, system_prompt, shutdown);
    println!("✓ Gateway stopped");
}

/// Liveness endpoint: 200 on any request.
fn spawn_health_server(config: &Config, shutdown: Arc<AtomicBool>) {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let server = match tiny_http::Server::http(&addr) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[gateway] health server bind {addr}: {e}");
            return;
        }
    };
    let _ = thread::spawn(move || {
        while !shutdown.load(Ordering::SeqCst) {
            match server.recv_timeout(Duration::from_millis(500)) {
                Ok(Some(request)) => {
                    let response = tiny_http::Response::from_string("{\"status\":\"ok\"}")
                        .with_status_code(200);
                    let _ = request.respond(response);
                }
                Ok(None) => {}
                Err(e) => {
                    eprintln!("[gateway] health server: {e}");
                    break;
                }
            }
        }
    });
}

fn setup_cmd() {
    let path = config_path();
    println!("{LOGO} picoclaw setup");
    println!();
    println!("The interactive wizard ships separately. To configure by hand, edit:");
    println!("  {}", path.display());
    println!();
    println!("Minimum keys: agents.defaults.{{provider, model}} and providers.<name>.api_key.");
    println!("Optional: tools.nextcloud, tools.telegram, channels.telegram, heartbeat, monitor.feeds.");
    if !path.exists() {
        match load_config(&path) {
            Ok(_) => println!("\nWrote a starter config to {}.", path.display()),
            Err(e) => {
                eprintln!("\nError creating starter config: {e}");
                std::process::exit(1);
            }
        }
    }
}
