//! Common test utilities and fixtures
//!
//! Every fixture writes its own config file into a temp dir and passes it
//! with `--config`, so tests never pick up a config from the host.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Environment variables that would leak host settings into a test run
const HOST_ENV: &[&str] = &[
    "AGENTDESK_CONFIG",
    "AGENTDESK_LLM_PROVIDER",
    "AGENTDESK_LLM_MODEL",
    "AGENTDESK_LLM_BASE_URL",
    "AGENTDESK_LLM_API_KEY",
    "AGENTDESK_PERSONA_FILE",
    "AGENTDESK_ARCHIVE_DIR",
    "AGENTDESK_ARCHIVE_ENABLED",
    "AGENTDESK_LOG_LEVEL",
    "AGENTDESK_LOG_FILE",
    "LLM_API_KEY",
    "GEMINI_API_KEY",
    "LLM_MODEL_NAME",
    "GEMINI_MODEL",
    "LLM_BASE_URL",
    "RUST_LOG",
];

pub struct DeskFixture {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl DeskFixture {
    /// Fixture with an arbitrary config file body
    pub fn with_config(content: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("agentdesk.toml");
        fs::write(&config_path, content).unwrap();
        Self { temp_dir, config_path }
    }

    /// Mock provider echoing the user's message
    pub fn mock() -> Self {
        Self::with_config("[llm]\nprovider = \"mock\"\n")
    }

    /// Mock provider answering every call with `reply`
    pub fn mock_reply(reply: &str) -> Self {
        Self::with_config(&format!(
            "[llm]\nprovider = \"mock\"\nmock_response = '''{}'''\n",
            reply
        ))
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    pub fn dir(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Write a file next to the config and return its path
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Session archive directory inside the fixture
    pub fn archive_dir(&self) -> PathBuf {
        self.temp_dir.path().join("archive")
    }

    /// `agentdesk --config <fixture>` with host settings removed and the
    /// archive kept inside the fixture
    pub fn cmd(&self) -> Command {
        let mut cmd = agentdesk();
        cmd.env("AGENTDESK_ARCHIVE_ENABLED", "true")
            .env("AGENTDESK_ARCHIVE_DIR", self.archive_dir())
            .arg("--config")
            .arg(self.path());
        cmd
    }

    /// Id of the most recently updated archived session
    pub fn latest_session(&self) -> String {
        let output = self.cmd().args(["history", "list"]).output().unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        stdout
            .split_whitespace()
            .next()
            .expect("no archived session")
            .to_string()
    }
}

/// The binary with host settings removed, archiving off and no config argument
pub fn agentdesk() -> Command {
    let mut cmd = Command::cargo_bin("agentdesk").unwrap();
    for name in HOST_ENV {
        cmd.env_remove(name);
    }
    cmd.env("AGENTDESK_ARCHIVE_ENABLED", "false");
    cmd
}
