use anyhow::Context;
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::controller::{AttemptObserver, AttemptRecord, GenerationOutcome};
use crate::wire::{ChatRequest, Completion, Conversation};

/// Installs the global fmt subscriber. `RUST_LOG` wins over the flag.
pub fn init_tracing(debug: bool) {
    let filter = if debug { "openui_codegen=debug" } else { "openui_codegen=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_dir(root: &Path, run: Uuid) -> PathBuf {
    root.join(run.to_string())
}

#[derive(Serialize)]
struct AttemptResponse<'a> {
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    record: &'a AttemptRecord,
}

/// Per-run artifact directory: one request/response JSON pair per attempt.
pub struct Transcript {
    dir: PathBuf,
    model: String,
    max_tokens: u32,
    temperature: f32,
    enabled: bool,
}

impl Transcript {
    pub fn new(cfg: &Config, run: Uuid) -> Self {
        Self {
            dir: run_dir(&cfg.runs_dir, run),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            enabled: cfg.save_transcript,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let p = self.dir.join(name);
        fs::write(&p, to_string_pretty(value)?)?;
        Ok(p)
    }

    pub fn save_request(&self, index: u32, conversation: &Conversation) -> anyhow::Result<PathBuf> {
        let req = ChatRequest::streaming(&self.model, conversation, self.max_tokens, self.temperature);
        self.write_json(&format!("attempt-{index}.request.json"), &req)
    }

    pub fn save_response(&self, record: &AttemptRecord, received: Option<&Completion>) -> anyhow::Result<PathBuf> {
        let body = AttemptResponse {
            timestamp: Utc::now(),
            content: received.map(|c| c.content.as_str()),
            record,
        };
        self.write_json(&format!("attempt-{}.response.json", record.index), &body)
    }

    pub fn save_final(&self, code: &str) -> anyhow::Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;
        let p = self.dir.join("final.tsx");
        fs::write(&p, code)?;
        Ok(Some(p))
    }
}

impl AttemptObserver for Transcript {
    fn on_request(&mut self, index: u32, conversation: &Conversation) {
        if !self.enabled {
            return;
        }
        match self.save_request(index, conversation) {
            Ok(p) => debug!(path = %p.display(), "request saved"),
            Err(e) => warn!(error = %e, "could not save request"),
        }
    }

    fn on_attempt(&mut self, record: &AttemptRecord, received: Option<&Completion>) {
        if !self.enabled {
            return;
        }
        match self.save_response(record, received) {
            Ok(p) => debug!(path = %p.display(), "response saved"),
            Err(e) => warn!(error = %e, "could not save response"),
        }
    }
}

/// Summary written by `--result-json`.
#[derive(Serialize)]
pub struct RunSummary<'a> {
    pub run_id: Uuid,
    pub model: &'a str,
    pub prompt: &'a str,
    pub attempts: usize,
    pub final_status: &'a str,
    pub component_code: &'a str,
    pub elapsed_ms: u64,
    pub history: &'a [AttemptRecord],
}

impl<'a> RunSummary<'a> {
    pub fn new(run_id: Uuid, model: &'a str, prompt: &'a str, outcome: &'a GenerationOutcome, elapsed_ms: u64) -> Self {
        Self {
            run_id,
            model,
            prompt,
            attempts: outcome.attempts.len(),
            final_status: outcome.status(),
            component_code: &outcome.code,
            elapsed_ms,
            history: &outcome.attempts,
        }
    }
}

pub fn save_summary(path: &Path, summary: &RunSummary<'_>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_string_pretty(summary)?).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
