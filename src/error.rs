//! Error types for AgentDesk
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-facing warnings for degraded chat replies
//! - Suggestions and exit codes for the CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for desk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    Serialization = 204,

    // Model errors (3xx)
    ModelUnavailable = 300,
    ModelCallFailed = 301,
    ModelTimeout = 302,
    ModelResponse = 303,

    // Persona errors (4xx)
    PersonaNotFound = 400,
    PersonaConflict = 401,
    PersonaCatalog = 402,

    // Plan errors (5xx)
    PlanStepFailed = 500,

    // Tool errors (6xx)
    ToolNotFound = 600,
    ToolArgs = 601,
    ToolCallFailed = 602,

    // Archive errors (7xx)
    ArchiveUnavailable = 700,
    SessionNotFound = 701,
    SessionAmbiguous = 702,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Model errors
            400..=499 => 40, // Persona errors
            500..=599 => 50, // Plan errors
            600..=699 => 60, // Tool errors
            700..=799 => 70, // Archive errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the desk
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Model Errors
    // ─────────────────────────────────────────────────────────────

    /// Model provider cannot be used (usually a missing credential)
    #[error("{provider} model unavailable: {message}")]
    ModelUnavailable { provider: String, message: String },

    /// Transport failure or non-2xx response from the model provider
    #[error("{provider} call failed{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    ModelCallFailed {
        provider: String,
        status: Option<u16>,
        detail: String,
    },

    /// Model call exceeded the configured timeout
    #[error("{provider} call timed out after {timeout_secs}s")]
    ModelTimeout { provider: String, timeout_secs: u64 },

    /// 2xx response whose body could not be understood
    #[error("Unexpected {provider} response: {message}")]
    ModelResponse { provider: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Persona Errors
    // ─────────────────────────────────────────────────────────────

    /// No persona registered under the given name or alias
    #[error("Persona not found: {name}")]
    PersonaNotFound { name: String },

    /// A name or alias is already owned by another persona
    #[error("Persona name '{name}' is already registered to {existing}")]
    PersonaConflict { name: String, existing: String },

    /// Persona catalog is malformed
    #[error("Invalid persona catalog: {message}")]
    PersonaCatalog { message: String },

    // ─────────────────────────────────────────────────────────────
    // Plan Errors
    // ─────────────────────────────────────────────────────────────

    /// A plan step's persona invocation failed; the rest of the plan was aborted
    #[error("Plan step {step} ({persona}) failed: {source}")]
    PlanStepFailed {
        step: usize,
        persona: String,
        #[source]
        source: Box<Error>,
    },

    // ─────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────

    /// Tool name not offered by any configured tool server
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// Tool arguments rejected by validation
    #[error("Invalid arguments for tool {tool}: {message}")]
    ToolArgs { tool: String, message: String },

    /// Tool server returned an error or could not be reached
    #[error("Tool {tool} failed: {message}")]
    ToolCallFailed { tool: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Archive Errors
    // ─────────────────────────────────────────────────────────────

    /// The question/answer archive is disabled or has no location
    #[error("Session archive unavailable: {message}")]
    ArchiveUnavailable { message: String },

    /// No archived session matches the given id or prefix
    #[error("Archived session not found: {id}")]
    SessionNotFound { id: String },

    /// A session id prefix matches more than one archived session
    #[error("Session id '{id}' matches {matches} archived sessions")]
    SessionAmbiguous { id: String, matches: usize },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) | Error::Json(_) => ErrorCode::Serialization,

            Error::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            Error::ModelCallFailed { .. } => ErrorCode::ModelCallFailed,
            Error::ModelTimeout { .. } => ErrorCode::ModelTimeout,
            Error::ModelResponse { .. } => ErrorCode::ModelResponse,

            Error::PersonaNotFound { .. } => ErrorCode::PersonaNotFound,
            Error::PersonaConflict { .. } => ErrorCode::PersonaConflict,
            Error::PersonaCatalog { .. } => ErrorCode::PersonaCatalog,

            Error::PlanStepFailed { .. } => ErrorCode::PlanStepFailed,

            Error::ToolNotFound { .. } => ErrorCode::ToolNotFound,
            Error::ToolArgs { .. } => ErrorCode::ToolArgs,
            Error::ToolCallFailed { .. } => ErrorCode::ToolCallFailed,

            Error::ArchiveUnavailable { .. } => ErrorCode::ArchiveUnavailable,
            Error::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Error::SessionAmbiguous { .. } => ErrorCode::SessionAmbiguous,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if a model call that failed this way may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ModelTimeout { .. } => true,
            Error::ModelCallFailed { status: None, .. } => true,
            Error::ModelCallFailed { status: Some(s), .. } => *s == 429 || *s >= 500,
            Error::PlanStepFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'agentdesk config init' to create a default configuration file.",
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'agentdesk config validate' to see details.",
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values.",
            ),

            Error::ModelUnavailable { .. } => Some(
                "Set [llm].api_key in the config file or export AGENTDESK_LLM_API_KEY.",
            ),
            Error::ModelCallFailed { .. } => Some(
                "Check the provider endpoint, model name and network connectivity.",
            ),
            Error::ModelTimeout { .. } => Some(
                "The provider is slow or unreachable. Raise [llm].timeout_secs or retry later.",
            ),

            Error::PersonaNotFound { .. } => Some(
                "Run 'agentdesk agents list' to see the registered personas.",
            ),
            Error::PersonaConflict { .. } | Error::PersonaCatalog { .. } => Some(
                "Fix the persona catalog: names and aliases must be unique, with one default and one coordinator persona.",
            ),

            Error::ToolNotFound { .. } => Some(
                "Configure an MCP server offering this tool under [[tools.servers]].",
            ),
            Error::ToolArgs { .. } => Some(
                "Run 'agentdesk tools check <tool> --args <json>' to see the normalized arguments.",
            ),

            Error::ArchiveUnavailable { .. } => Some(
                "Enable [archive] in the config file or set AGENTDESK_ARCHIVE_DIR.",
            ),
            Error::SessionNotFound { .. } | Error::SessionAmbiguous { .. } => Some(
                "Run 'agentdesk history list' to see archived session ids.",
            ),

            _ => None,
        }
    }

    /// Short user-visible warning used in place of a reply when a call degrades
    pub fn user_warning(&self) -> String {
        let headline = match self {
            Error::ModelUnavailable { .. } => "Model not configured",
            Error::ModelCallFailed { .. } | Error::ModelResponse { .. } => "Model request failed",
            Error::ModelTimeout { .. } => "Model request timed out",
            Error::PlanStepFailed { .. } => "Plan aborted",
            Error::ToolNotFound { .. } | Error::ToolArgs { .. } | Error::ToolCallFailed { .. } => {
                "Tool call failed"
            }
            _ => "Request failed",
        };
        format!("⚠️ {}: {}", headline, self)
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code().as_str(), self);

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn model_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ModelUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn model_call_failed(
        provider: impl Into<String>,
        status: Option<u16>,
        detail: impl Into<String>,
    ) -> Self {
        Error::ModelCallFailed {
            provider: provider.into(),
            status,
            detail: detail.into(),
        }
    }

    pub fn model_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ModelResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn persona_not_found(name: impl Into<String>) -> Self {
        Error::PersonaNotFound { name: name.into() }
    }

    pub fn persona_catalog(message: impl Into<String>) -> Self {
        Error::PersonaCatalog {
            message: message.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Error::ToolNotFound { name: name.into() }
    }

    pub fn tool_args(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolArgs {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn tool_call_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolCallFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn archive_unavailable(message: impl Into<String>) -> Self {
        Error::ArchiveUnavailable {
            message: message.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Error::SessionNotFound { id: id.into() }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::ModelUnavailable.as_str(), "E300");
        assert_eq!(ErrorCode::PlanStepFailed.as_str(), "E500");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::ModelCallFailed.exit_code(), 30);
        assert_eq!(ErrorCode::PersonaNotFound.exit_code(), 40);
        assert_eq!(ErrorCode::ToolNotFound.exit_code(), 60);
        assert_eq!(ErrorCode::SessionNotFound.exit_code(), 70);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_model_call_failed_display() {
        let err = Error::model_call_failed("gemini", Some(503), "overloaded");
        assert_eq!(err.to_string(), "gemini call failed (HTTP 503): overloaded");

        let err = Error::model_call_failed("openai", None, "connection reset");
        assert_eq!(err.to_string(), "openai call failed: connection reset");
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::model_call_failed("gemini", Some(429), "slow down").is_retryable());
        assert!(Error::model_call_failed("gemini", Some(500), "boom").is_retryable());
        assert!(Error::model_call_failed("gemini", None, "reset").is_retryable());
        assert!(Error::ModelTimeout { provider: "gemini".into(), timeout_secs: 5 }.is_retryable());
        assert!(!Error::model_call_failed("gemini", Some(400), "bad request").is_retryable());
        assert!(!Error::model_unavailable("gemini", "no key").is_retryable());
    }

    #[test]
    fn test_plan_step_failure_keeps_source() {
        let err = Error::PlanStepFailed {
            step: 2,
            persona: "数据专家".into(),
            source: Box::new(Error::model_call_failed("gemini", Some(502), "bad gateway")),
        };
        assert_eq!(err.code(), ErrorCode::PlanStepFailed);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Plan step 2 (数据专家)"));
        assert!(err.to_string().contains("HTTP 502"));
    }

    #[test]
    fn test_user_warning() {
        let warning = Error::model_unavailable("gemini", "API key is not set").user_warning();
        assert!(warning.starts_with("⚠️ Model not configured"));
        assert!(warning.contains("API key is not set"));

        let warning = Error::tool_not_found("stock_info").user_warning();
        assert!(warning.starts_with("⚠️ Tool call failed"));
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_not_found("/test");
        assert!(err.suggestion().unwrap().contains("config init"));

        let err = Error::model_unavailable("gemini", "no key");
        assert!(err.suggestion().unwrap().contains("AGENTDESK_LLM_API_KEY"));
    }

    #[test]
    fn test_format_for_terminal() {
        let formatted = Error::config_not_found("/test/config.toml").format_for_terminal();
        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let formatted = Error::config_not_found("/test/config.toml").format_for_log();
        assert!(formatted.contains("[E100]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
