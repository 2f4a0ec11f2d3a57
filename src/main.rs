//! AgentDesk - multi-persona agent desk
//!
//! This is the main entry point for the `agentdesk` binary.
//! Messages are routed to one of a fixed set of LLM personas; the
//! coordinator persona can answer with a plan that the desk executes
//! step by step.

mod agent;
mod archive;
mod cli;
mod config;
mod context;
mod conversation;
mod desk;
mod error;
mod extract;
mod llm;
mod logging;
mod mention;
mod persona;
mod plan;
mod research;
mod router;
#[cfg(test)]
mod testing;
mod tools;
mod version;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::archive::{Archive, QaRecord};
use crate::cli::{
    AgentsSubcommand, Cli, Commands, ConfigSubcommand, HistorySubcommand, ToolsSubcommand,
};
use crate::config::{expand_path, DeskConfig};
use crate::desk::{ChatInput, Desk, DeskReply};
use crate::error::{Error, Result};
use crate::persona::{CatalogSource, Persona, PersonaRegistry};
use crate::router::{Router, Scenario};
use crate::tools::{extract_tool_text, prepare_args, McpClient, ToolInvoker};

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    // Commands that need no configuration
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let config = DeskConfig::load(cli.config.as_deref())?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    debug!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting AgentDesk"
    );

    match cli.command {
        Commands::Chat {
            message,
            document,
            scenario,
            feedback,
            session,
            json,
        } => {
            let mut input = ChatInput::new(message.join(" "));
            input.document = document.as_deref().map(read_document).transpose()?;
            input.scenario = scenario;
            input.feedback = feedback;
            runtime()?.block_on(run_chat(&config, input, session.as_deref(), json))
        }
        Commands::Shell {
            document,
            scenario,
            resume,
        } => {
            let document = document.as_deref().map(read_document).transpose()?;
            runtime()?.block_on(run_shell(&config, document, scenario, resume.as_deref()))
        }
        Commands::Research { topic, deep, json } => {
            runtime()?.block_on(run_research(&config, &topic.join(" "), deep, json))
        }
        Commands::History { subcommand } => handle_history_command(&config, subcommand),
        Commands::Route {
            message,
            scenario,
            json,
        } => handle_route(&config, &message.join(" "), scenario, json),
        Commands::Agents { subcommand } => handle_agents_command(&config, subcommand),
        Commands::Tools { subcommand } => handle_tools_command(&config, subcommand),
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

fn read_document(path: &str) -> Result<String> {
    let path = std::path::PathBuf::from(expand_path(path));
    std::fs::read_to_string(&path).map_err(|e| Error::IoRead { path, source: e })
}

fn load_registry(config: &DeskConfig) -> Result<Arc<PersonaRegistry>> {
    let source = CatalogSource::from_settings(&config.personas);
    Ok(Arc::new(PersonaRegistry::load(source)?))
}

// ─────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────

async fn run_chat(
    config: &DeskConfig,
    input: ChatInput,
    session: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut desk = Desk::from_config(config)?;
    if let Some(session) = session {
        desk.resume(session)?;
    }
    let reply = desk.chat(input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
    }
    Ok(())
}

async fn run_shell(
    config: &DeskConfig,
    document: Option<String>,
    scenario: Option<Scenario>,
    resume: Option<&str>,
) -> Result<()> {
    let mut desk = Desk::from_config(config)?;
    if let Some(document) = document {
        desk.set_document(document);
    }

    println!(
        "AgentDesk session {} ({} personas). Type /quit to exit.",
        desk.session_id(),
        desk.agents().len()
    );
    if let Some(id) = resume {
        let replayed = desk.resume(id)?;
        println!("Resumed session {} ({} archived turns).", desk.session_id(), replayed);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));

            match name {
                "quit" | "exit" => break,
                "agents" => print_agents(&desk.agents()),
                "history" => {
                    for turn in desk.history(None) {
                        let who = turn.persona.as_deref().unwrap_or("you");
                        println!("{}: {}", who, turn.content);
                    }
                }
                "clear" => {
                    desk.clear();
                    println!("Conversation cleared.");
                }
                "reload" => match desk.reload() {
                    Ok(()) => println!("Reloaded {} personas.", desk.agents().len()),
                    Err(e) => eprint!("{}", e.format_for_terminal()),
                },
                "document" if !arg.is_empty() => match read_document(arg) {
                    Ok(text) => {
                        println!("Document loaded ({} characters).", text.chars().count());
                        desk.set_document(text);
                    }
                    Err(e) => eprint!("{}", e.format_for_terminal()),
                },
                "research" if !arg.is_empty() => {
                    let reply = desk.research(arg, false).await?;
                    print_reply(&reply);
                }
                _ => println!(
                    "Commands: /agents, /history, /clear, /reload, /document <file>, /research <topic>, /quit"
                ),
            }
            continue;
        }

        let mut input = ChatInput::new(line);
        input.scenario = scenario;
        let reply = desk.chat(input).await?;
        print_reply(&reply);
    }

    info!(session = %desk.session_id(), "Shell session ended");
    Ok(())
}

fn print_reply(reply: &DeskReply) {
    println!("[{}] {}", reply.persona, reply.role);
    println!("{}", reply.text);

    if let Some(ref plan) = reply.plan {
        for skipped in &plan.skipped {
            println!(
                "(step {} skipped: unknown persona {})",
                skipped.step,
                skipped.agent.as_deref().unwrap_or("<none>")
            );
        }
    }

    if !reply.citations.is_empty() {
        println!("\nSources:");
        for (i, citation) in reply.citations.iter().enumerate() {
            println!("  [{}] {} - {}", i + 1, citation.title, citation.url);
        }
    }

    if let Some(ref risk) = reply.risk {
        let verdict = if risk.approved { "APPROVED" } else { "REJECTED" };
        println!("\nRisk verdict: {} (score {}/100)", verdict, risk.score);
        if !risk.critique.is_empty() {
            println!("  {}", risk.critique);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Research / history
// ─────────────────────────────────────────────────────────────────

async fn run_research(config: &DeskConfig, topic: &str, deep: bool, json: bool) -> Result<()> {
    let mut desk = Desk::from_config(config)?;
    let reply = desk.research(topic, deep).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
        if reply.success && reply.risk.is_none() {
            println!("\nRisk verdict: unavailable (no readable verdict from the risk officer)");
        }
    }
    Ok(())
}

fn handle_history_command(config: &DeskConfig, subcommand: HistorySubcommand) -> Result<()> {
    let archive = Archive::require(&config.archive)?;
    debug!(path = %archive.path().display(), "Using session archive");

    match subcommand {
        HistorySubcommand::List { limit } => {
            let sessions = archive.sessions()?;
            if sessions.is_empty() {
                println!("No archived sessions.");
            }
            for session in sessions.iter().take(limit) {
                println!(
                    "{}  {}  {:>3}  {}",
                    session.session_id,
                    session.updated.format("%Y-%m-%d %H:%M"),
                    session.records,
                    session.title
                );
            }
        }
        HistorySubcommand::Show { session, json } => {
            let session_id = archive.resolve(&session)?;
            let records = archive.session(session_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("Session {}", session_id);
                for record in &records {
                    print_record(record);
                }
            }
        }
        HistorySubcommand::Search { keyword, limit } => {
            let hits = archive.search(&keyword, limit)?;
            if hits.is_empty() {
                println!("No records match '{}'.", keyword);
            }
            for record in &hits {
                println!("session {}", record.session_id);
                print_record(record);
            }
        }
        HistorySubcommand::Stats { json } => {
            let stats = archive.statistics()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Archive:  {}", archive.path().display());
                println!("Records:  {} ({} today)", stats.total, stats.today);
                println!("Sessions: {}", stats.sessions);
                for entry in &stats.top_personas {
                    println!("  {:<12} {}", entry.persona, entry.count);
                }
            }
        }
    }

    Ok(())
}

fn print_record(record: &QaRecord) {
    println!(
        "\n[{}] {} ({}, {})",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.persona,
        record.role,
        record.routing
    );
    println!("Q: {}", record.question);
    println!("A: {}", record.answer);
}

// ─────────────────────────────────────────────────────────────────
// Route / agents
// ─────────────────────────────────────────────────────────────────

fn handle_route(
    config: &DeskConfig,
    message: &str,
    scenario: Option<Scenario>,
    as_json: bool,
) -> Result<()> {
    let router = Router::new(load_registry(config)?)?;
    let decision = router.route(message, scenario)?;

    if as_json {
        let value = json!({
            "persona": decision.persona.name,
            "role": decision.persona.role,
            "type": decision.routing_type,
            "message": decision.message,
            "reason": decision.reason,
            "mentions": decision.mentions,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("persona:  {} ({})", decision.persona.name, decision.persona.role);
    println!("routing:  {}", decision.routing_type);
    println!("message:  {}", decision.message);
    println!("reason:   {}", decision.reason);
    if !decision.mentions.is_empty() {
        println!("mentions: {}", decision.mentions.join(", "));
    }
    Ok(())
}

fn handle_agents_command(config: &DeskConfig, subcommand: AgentsSubcommand) -> Result<()> {
    let registry = load_registry(config)?;

    match subcommand {
        AgentsSubcommand::List => print_agents(&registry.list()),
        AgentsSubcommand::Show { name } => {
            let persona = registry.require(name.trim())?;
            println!("Name:        {}", persona.name);
            println!("Role:        {}", persona.role);
            println!("Mention:     {}", persona.mention());
            println!("Capability:  {}", persona.capability);
            println!("Temperature: {}", persona.temperature);
            if !persona.aliases.is_empty() {
                println!("Aliases:     {}", persona.aliases.join(", "));
            }
            if persona.coordinator {
                println!("Coordinator: yes");
            }
            if persona.fallback {
                println!("Default:     yes");
            }
            println!("\n{}", persona.preamble);
        }
        AgentsSubcommand::Rules => {
            let router = Router::new(registry)?;
            println!("Keyword rules (first match wins):");
            for (i, rule) in router.rules().iter().enumerate() {
                println!(
                    "  {:>2}. {:<13} -> {}: {}",
                    i + 1,
                    rule.label,
                    rule.persona,
                    rule.keywords.join(", ")
                );
            }
            println!("  Default: {}", router.fallback().name);

            let shadowed = router.shadowed_keywords();
            if shadowed.is_empty() {
                println!("\nNo shadowed keywords.");
            } else {
                println!("\nShadowed keywords:");
                for entry in &shadowed {
                    println!("  {}", entry);
                }
            }
        }
    }

    Ok(())
}

fn print_agents(personas: &[Arc<Persona>]) {
    for persona in personas {
        let mut marks = Vec::new();
        if persona.coordinator {
            marks.push("coordinator");
        }
        if persona.fallback {
            marks.push("default");
        }
        let marks = if marks.is_empty() {
            String::new()
        } else {
            format!(" [{}]", marks.join(", "))
        };

        println!(
            "{:<12} {:<7} {:<20} {}{}",
            persona.mention(),
            persona.capability,
            persona.role,
            persona.aliases.join(", "),
            marks
        );
    }
}

// ─────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────

fn parse_tool_args(tool: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(_) => Err(Error::tool_args(tool, "arguments must be a JSON object")),
        Err(e) => Err(Error::tool_args(tool, format!("invalid JSON: {}", e))),
    }
}

fn handle_tools_command(config: &DeskConfig, subcommand: ToolsSubcommand) -> Result<()> {
    match subcommand {
        ToolsSubcommand::Check { tool, args } => {
            let args = prepare_args(&tool, &parse_tool_args(&tool, &args)?)?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(args))?);
            Ok(())
        }
        ToolsSubcommand::Call { tool, args } => {
            let args = prepare_args(&tool, &parse_tool_args(&tool, &args)?)?;
            let client = mcp_client(config)?;
            let result = runtime()?.block_on(client.call(&tool, args))?;
            println!("{}", extract_tool_text(&result));
            Ok(())
        }
        ToolsSubcommand::List => {
            let client = mcp_client(config)?;
            for name in runtime()?.block_on(client.list_tools())? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn mcp_client(config: &DeskConfig) -> Result<McpClient> {
    let client = McpClient::new(&config.tools)?;
    if !client.has_servers() {
        warn!("No MCP servers configured under [[tools.servers]]");
    }
    Ok(client)
}

// ─────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = DeskConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate => {
            let cfg = DeskConfig::load(config_path)?;
            println!(
                "Configuration is valid (provider: {}, model: {}).",
                cfg.llm.provider, cfg.llm.model
            );
        }
    }

    Ok(())
}
