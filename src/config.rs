//! Configuration system for AgentDesk
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (AGENTDESK_* prefix, plus the conventional LLM_* / GEMINI_* names)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::llm::ProviderKind;

/// Main desk configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Model provider settings
    pub llm: LlmSettings,

    /// Conversation history settings
    pub conversation: ConversationSettings,

    /// Side-context settings
    pub context: ContextSettings,

    /// Persona catalog source
    pub personas: PersonaSettings,

    /// External tool (MCP) settings
    pub tools: ToolSettings,

    /// Question/answer archive
    pub archive: ArchiveSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider: gemini, openai (aliases: deepseek, local) or mock
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Endpoint override (e.g., "http://localhost:11434/v1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    pub max_retries: u32,

    /// Client-side rate limit (0 = unlimited)
    pub requests_per_minute: u32,

    /// Fixed reply for the mock provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<String>,
}

/// Conversation history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    /// Number of prior turns included in each model call
    pub history_window: usize,

    /// Number of turns shown by the history command
    pub recent_limit: usize,
}

/// Side-context settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Maximum characters of the document excerpt passed to a persona
    pub document_char_budget: usize,
}

/// Persona catalog settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    /// Catalog file replacing the bundled personas (re-read on reload)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// External tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Maximum iterations of the tool-calling loop
    pub max_steps: usize,

    /// Timeout for a single tool server request in seconds
    pub timeout_secs: u64,

    /// MCP servers reachable over streamable HTTP
    pub servers: Vec<McpServerSettings>,
}

/// One MCP server endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerSettings {
    /// Server name, used in logs
    pub name: String,

    /// Streamable HTTP endpoint
    pub url: String,

    /// Value sent as the Authorization header (include the scheme)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Question/answer archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Record answered turns across runs
    pub enabled: bool,

    /// Archive directory (default: <data_dir>/agentdesk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
            api_key: String::new(),
            timeout_secs: 120,
            max_retries: 2,
            requests_per_minute: 350,
            mock_response: None,
        }
    }
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            history_window: 5,
            recent_limit: 10,
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            document_char_budget: 1000,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            max_steps: 5,
            timeout_secs: 60,
            servers: vec![],
        }
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl ArchiveSettings {
    /// Directory holding the archive, or `None` when archiving is off.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        match self.dir {
            Some(ref dir) => Some(PathBuf::from(dir)),
            None => dirs::data_dir().map(|d| d.join("agentdesk")),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl LlmSettings {
    /// Resolved provider kind (validated at load time)
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        ProviderKind::from_str(&self.provider)
            .map_err(|e| Error::config_field_invalid("llm.provider", e))
    }
}

impl DeskConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("agentdesk.toml"),
            dirs::config_dir()
                .map(|p| p.join("agentdesk").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".agentdesk").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/agentdesk/config.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // LLM settings
        if let Ok(val) = std::env::var("AGENTDESK_LLM_PROVIDER") {
            self.llm.provider = val;
        }
        if let Some(val) = first_env(&["AGENTDESK_LLM_MODEL", "LLM_MODEL_NAME", "GEMINI_MODEL"]) {
            self.llm.model = val;
        }
        if let Some(val) = first_env(&["AGENTDESK_LLM_BASE_URL", "LLM_BASE_URL"]) {
            self.llm.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("AGENTDESK_LLM_API_KEY") {
            self.llm.api_key = val;
        } else if self.llm.api_key.is_empty() {
            if let Some(val) = first_env(&["LLM_API_KEY", "GEMINI_API_KEY"]) {
                self.llm.api_key = val;
            }
        }
        if let Some(n) = parsed_env("AGENTDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = n;
        }
        if let Some(n) = parsed_env("AGENTDESK_LLM_MAX_RETRIES") {
            self.llm.max_retries = n;
        }
        if let Some(n) = parsed_env("AGENTDESK_LLM_REQUESTS_PER_MINUTE") {
            self.llm.requests_per_minute = n;
        }

        // Conversation and context settings
        if let Some(n) = parsed_env("AGENTDESK_HISTORY_WINDOW") {
            self.conversation.history_window = n;
        }
        if let Some(n) = parsed_env("AGENTDESK_DOCUMENT_CHAR_BUDGET") {
            self.context.document_char_budget = n;
        }

        // Personas and tools
        if let Ok(val) = std::env::var("AGENTDESK_PERSONA_FILE") {
            self.personas.file = Some(val);
        }
        if let Some(n) = parsed_env("AGENTDESK_TOOL_MAX_STEPS") {
            self.tools.max_steps = n;
        }

        // Archive settings
        if let Ok(val) = std::env::var("AGENTDESK_ARCHIVE_DIR") {
            self.archive.dir = Some(val);
        }
        if let Ok(val) = std::env::var("AGENTDESK_ARCHIVE_ENABLED") {
            self.archive.enabled = val.to_lowercase() == "true" || val == "1";
        }

        // Logging settings
        if let Ok(val) = std::env::var("AGENTDESK_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("AGENTDESK_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("AGENTDESK_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
        if let Some(ref file) = self.personas.file {
            self.personas.file = Some(expand_path(file));
        }
        if let Some(ref dir) = self.archive.dir {
            self.archive.dir = Some(expand_path(dir));
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.llm.provider_kind()?;

        if let Some(ref base_url) = self.llm.base_url {
            url::Url::parse(base_url).map_err(|e| {
                Error::config_field_invalid(
                    "llm.base_url",
                    format!("Invalid base URL '{}': {}", base_url, e),
                )
            })?;
        }

        if self.llm.timeout_secs == 0 {
            return Err(Error::config_field_invalid(
                "llm.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if self.context.document_char_budget == 0 {
            return Err(Error::config_field_invalid(
                "context.document_char_budget",
                "document_char_budget must be greater than 0",
            ));
        }

        if self.tools.max_steps == 0 {
            return Err(Error::config_field_invalid(
                "tools.max_steps",
                "max_steps must be at least 1",
            ));
        }

        let mut names = HashSet::new();
        for server in &self.tools.servers {
            if !names.insert(server.name.as_str()) {
                return Err(Error::config_field_invalid(
                    "tools.servers",
                    format!("Duplicate tool server name '{}'", server.name),
                ));
            }
            url::Url::parse(&server.url).map_err(|e| {
                Error::config_field_invalid(
                    "tools.servers",
                    format!("Invalid URL for tool server '{}': {}", server.name, e),
                )
            })?;
        }

        if self.archive.dir.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(Error::config_field_invalid(
                "archive.dir",
                "archive.dir must not be empty",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|val| !val.is_empty())
}

fn parsed_env<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

/// Expand ~ and environment variables in paths
pub fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".agentdesk")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# AgentDesk Configuration

[llm]
# Provider: gemini, openai (also: deepseek, local) or mock
provider = "gemini"

# Model identifier
model = "gemini-1.5-flash"

# Endpoint override, e.g. "http://localhost:11434/v1" for a local OpenAI-compatible server
# base_url = "https://api.deepseek.com/v1"

# API key (or export AGENTDESK_LLM_API_KEY / GEMINI_API_KEY)
api_key = ""

# Request timeout in seconds
timeout_secs = 120

# Maximum retries on transient failures (429, 5xx, timeouts)
max_retries = 2

# Client-side rate limit per minute (0 = unlimited)
requests_per_minute = 350

[conversation]
# Prior turns included in each model call
history_window = 5

# Turns shown by /history
recent_limit = 10

[context]
# Maximum characters of an attached document passed to a persona
document_char_budget = 1000

[personas]
# Catalog file replacing the bundled personas
# file = "~/.agentdesk/personas.toml"

[tools]
# Maximum iterations of the tool-calling loop
max_steps = 5

# Timeout for one tool server request in seconds
timeout_secs = 60

# MCP servers reachable over streamable HTTP
# [[tools.servers]]
# name = "aktools"
# url = "https://server.example.com/mcp"
# auth_token = "Bearer <token>"

[archive]
# Keep answered questions across runs (see 'agentdesk history')
enabled = true

# Archive directory (defaults to the platform data directory)
# dir = "~/.agentdesk/archive"

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log file path (comment out to disable file logging)
# file = "~/.agentdesk/logs/agentdesk.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
