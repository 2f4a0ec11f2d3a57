//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the agent desk.

use clap::{Parser, Subcommand};

use crate::router::Scenario;

/// AgentDesk - multi-persona agent desk
///
/// Routes each request to one of a fixed set of LLM personas, by explicit
/// @mention, scenario tag or keyword, and lets the coordinator persona
/// split work into multi-step plans.
#[derive(Parser, Debug)]
#[command(name = "agentdesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "AGENTDESK_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the desk
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message through a fresh desk session and print the reply
    Chat {
        /// Message text; may start with an @mention
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Document file made available to the persona
        #[arg(short, long)]
        document: Option<String>,

        /// Scenario tag (compliance, investment)
        #[arg(short, long)]
        scenario: Option<Scenario>,

        /// Feedback on an earlier answer
        #[arg(long)]
        feedback: Option<String>,

        /// Continue an archived session (full id or unique prefix)
        #[arg(long)]
        session: Option<String>,

        /// Print the full reply record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session reading messages from stdin
    Shell {
        /// Document file made available to every turn
        #[arg(short, long)]
        document: Option<String>,

        /// Scenario tag applied to every message
        #[arg(short, long)]
        scenario: Option<Scenario>,

        /// Continue an archived session (full id or unique prefix)
        #[arg(long)]
        resume: Option<String>,
    },

    /// Run the investment committee on a topic
    Research {
        #[arg(required = true, num_args = 1..)]
        topic: Vec<String>,

        /// Start with a deep strategic research step
        #[arg(long)]
        deep: bool,

        /// Print the full reply record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Archived question/answer history
    History {
        #[command(subcommand)]
        subcommand: HistorySubcommand,
    },

    /// Show which persona would handle a message, without calling a model
    Route {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Scenario tag (compliance, investment)
        #[arg(short, long)]
        scenario: Option<Scenario>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Persona catalog inspection
    Agents {
        #[command(subcommand)]
        subcommand: AgentsSubcommand,
    },

    /// Tool argument checks and direct MCP tool calls
    Tools {
        #[command(subcommand)]
        subcommand: ToolsSubcommand,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Persona subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AgentsSubcommand {
    /// List every persona in registration order
    List,

    /// Show one persona, resolved by name or alias
    Show {
        /// Persona name, alias or @mention
        name: String,
    },

    /// Print the keyword routing table and shadowed keywords
    Rules,
}

/// Tool subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ToolsSubcommand {
    /// Normalize and validate tool arguments offline
    Check {
        /// Tool name (e.g. stock_info)
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Call a tool on the configured MCP servers
    Call {
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// List tools offered by the configured MCP servers
    List,
}

/// History subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistorySubcommand {
    /// List archived sessions, most recent first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show every record of one session
    Show {
        /// Session id or unique prefix
        session: String,

        #[arg(long)]
        json: bool,
    },

    /// Search questions and answers for a keyword
    Search {
        keyword: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Record counts and most consulted personas
    Stats {
        #[arg(long)]
        json: bool,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}
