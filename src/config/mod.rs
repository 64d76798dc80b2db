use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cli::Args;
use crate::errors::ConfigError;

pub const API_KEY_ENV: &str = "OPENUI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    pub program: String,
    /// Arguments placed before the input file, e.g. `["babel"]` for npx.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Transformed output at or below this many bytes counts as empty.
    pub min_output_len: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "npx".into(),
            args: vec!["babel".into()],
            timeout_secs: 10,
            probe_timeout_secs: 5,
            min_output_len: 10,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub cookie_file: PathBuf,
    #[serde(skip)]
    pub cookies: BTreeMap<String, String>,
    pub oracle: OracleConfig,
    pub runs_dir: PathBuf,
    pub save_transcript: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7878".into(),
            model: "gpt-3.5-turbo".into(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
            api_key: None,
            cookie_file: "openui_cookies.json".into(),
            cookies: BTreeMap::new(),
            oracle: OracleConfig::default(),
            runs_dir: ".openui/runs".into(),
            save_transcript: true,
        }
    }
}

impl Config {
    /// Reads a TOML config when a path is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Overlays command-line flags on top of file/default values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(m) = &args.model { self.model = m.clone(); }
        if let Some(u) = &args.base_url { self.base_url = u.clone(); }
        if let Some(t) = args.max_tokens { self.max_tokens = t; }
        if let Some(r) = args.max_retries { self.max_retries = r; }
        if let Some(t) = args.temperature { self.temperature = t; }
        if let Some(t) = args.timeout_secs { self.timeout_secs = t; }
        if let Some(c) = &args.cookie_file { self.cookie_file = c.clone(); }
        if args.no_oracle { self.oracle.enabled = false; }
        if args.no_transcript { self.save_transcript = false; }
    }

    /// Takes the bearer token from the given lookup unless one is configured.
    /// Called once at startup; nothing else reads the environment.
    pub fn with_api_key_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty());
        }
        self
    }

    /// Loads session cookies; a missing file leaves the jar empty.
    pub fn load_cookies(&mut self) -> Result<(), ConfigError> {
        let path = &self.cookie_file;
        if !path.exists() {
            warn!(path = %path.display(), "cookie file not found, continuing without cookies");
            return Ok(());
        }
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        self.cookies = serde_json::from_str(&raw).map_err(|e| ConfigError::Cookie {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(count = self.cookies.len(), "loaded cookies");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
