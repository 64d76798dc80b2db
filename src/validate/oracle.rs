use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::OracleConfig;
use crate::errors::OracleError;

const PRESETS: &str = "@babel/preset-typescript,@babel/preset-react";

/// Diagnostics that describe the toolchain, not the source.
const SETUP_FAILURES: [&str; 3] = ["cannot find package", "cannot find module", "unknown preset"];

fn setup_failure(diagnostic: &str) -> Option<String> {
    diagnostic
        .lines()
        .find(|l| {
            let l = l.to_lowercase();
            SETUP_FAILURES.iter().any(|m| l.contains(m))
        })
        .map(|l| l.trim().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    /// Parsed; carries the transformed output.
    Accepted { output: String },
    /// Rejected; carries the parser's diagnostic text.
    Rejected { diagnostic: String },
}

/// External parser consulted only for a parse / no-parse answer.
/// An `Err` means "no verdict this time", never "bad code".
#[async_trait]
pub trait SyntaxOracle: Send + Sync {
    async fn check(&self, filename_hint: &str, source: &str) -> Result<OracleOutcome, OracleError>;
}

/// Babel CLI run through npx (or any compatible launcher).
#[derive(Debug, Clone)]
pub struct BabelOracle {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl BabelOracle {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout }
    }

    /// Returns an oracle only if the launcher exists and answers `--version`
    /// within the probe timeout.
    pub async fn detect(cfg: &OracleConfig) -> Option<Self> {
        if !cfg.enabled {
            debug!("syntax oracle disabled by config");
            return None;
        }
        let program = match which::which(&cfg.program) {
            Ok(p) => p,
            Err(e) => {
                info!(program = %cfg.program, error = %e, "syntax oracle launcher not found, using heuristics");
                return None;
            }
        };

        let mut cmd = Command::new(&program);
        cmd.args(&cfg.args)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(cfg.probe_timeout(), cmd.output()).await {
            Ok(Ok(out)) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
                info!(version = %version, "syntax oracle available");
                Some(Self::new(program, cfg.args.clone(), cfg.timeout()))
            }
            Ok(Ok(out)) => {
                info!(status = ?out.status.code(), "syntax oracle probe failed, using heuristics");
                None
            }
            Ok(Err(e)) => {
                info!(error = %e, "syntax oracle could not start, using heuristics");
                None
            }
            Err(_) => {
                info!(timeout_secs = cfg.probe_timeout_secs, "syntax oracle probe timed out, using heuristics");
                None
            }
        }
    }
}

#[async_trait]
impl SyntaxOracle for BabelOracle {
    async fn check(&self, filename_hint: &str, source: &str) -> Result<OracleOutcome, OracleError> {
        let mut input = tempfile::Builder::new()
            .prefix("openui-component-")
            .suffix(".tsx")
            .tempfile()?;
        input.write_all(source.as_bytes())?;
        input.flush()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(input.path())
            .args(["--presets", PRESETS, "--no-babelrc", "--filename", filename_hint])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(res) => res?,
            Err(_) => return Err(OracleError::Timeout(self.timeout.as_secs())),
        };

        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if out.status.success() {
            Ok(OracleOutcome::Accepted { output: stdout })
        } else {
            let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
            if let Some(problem) = setup_failure(&diagnostic) {
                return Err(OracleError::Unavailable(problem));
            }
            Ok(OracleOutcome::Rejected { diagnostic })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use fs_err as fs;

    // Runs `sh <script> <file> --presets ...`, so $1 is the input file.
    fn scripted(dir: &tempfile::TempDir, body: &str, timeout: Duration) -> BabelOracle {
        let script = dir.path().join("fake-babel.sh");
        fs::write(&script, body).unwrap();
        BabelOracle::new("sh", vec![script.display().to_string()], timeout)
    }

    #[tokio::test]
    async fn accepted_output_is_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = scripted(&dir, "cat \"$1\"\n", Duration::from_secs(5));
        let out = oracle.check("component.tsx", "const A = 1;").await.unwrap();
        assert_eq!(out, OracleOutcome::Accepted { output: "const A = 1;".into() });
    }

    #[tokio::test]
    async fn passes_filename_hint() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = scripted(&dir, "echo \"$6\"\n", Duration::from_secs(5));
        let out = oracle.check("component.tsx", "x").await.unwrap();
        assert_eq!(out, OracleOutcome::Accepted { output: "component.tsx\n".into() });
    }

    #[tokio::test]
    async fn nonzero_exit_is_rejected_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = scripted(
            &dir,
            "echo 'SyntaxError: Unexpected token (12:5)' >&2\nexit 1\n",
            Duration::from_secs(5),
        );
        match oracle.check("component.tsx", "x").await.unwrap() {
            OracleOutcome::Rejected { diagnostic } => assert!(diagnostic.contains("(12:5)")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_preset_is_unavailable_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = scripted(
            &dir,
            "echo \"Error: Cannot find package '@babel/preset-typescript' imported from /work\" >&2\nexit 1\n",
            Duration::from_secs(5),
        );
        match oracle.check("component.tsx", "x").await {
            Err(OracleError::Unavailable(msg)) => assert!(msg.contains("@babel/preset-typescript")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_oracle_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = scripted(&dir, "sleep 5\n", Duration::from_millis(200));
        let err = oracle.check("component.tsx", "x").await.unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_program_is_an_error_not_a_verdict() {
        let oracle = BabelOracle::new("/nonexistent/npx", vec![], Duration::from_secs(1));
        assert!(matches!(oracle.check("component.tsx", "x").await, Err(OracleError::Io(_))));
    }

    #[tokio::test]
    async fn detect_respects_disabled_flag_and_missing_launcher() {
        let cfg = OracleConfig { enabled: false, ..OracleConfig::default() };
        assert!(BabelOracle::detect(&cfg).await.is_none());

        let cfg = OracleConfig { program: "definitely-not-a-real-launcher-xyz".into(), ..OracleConfig::default() };
        assert!(BabelOracle::detect(&cfg).await.is_none());
    }
}
