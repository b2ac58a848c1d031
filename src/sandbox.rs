//! Sandboxed Execution
//!
//! Runs vetted plotting scripts in a fresh child interpreter process and locates the image
//! they produce. Each run gets a private scratch directory, a cleared environment, isolated
//! interpreter mode (`-I`), and on Unix its own process group plus `setrlimit` limits. The
//! wall-clock timeout is enforced by killing the process group.
//!
//! Only [`VettedCode`] is accepted, so nothing reaches the interpreter without passing the
//! safety gate.

use crate::error::StorageError;
use crate::safety::VettedCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub mod artifacts;
pub mod limits;
pub mod preamble;

pub use artifacts::ArtifactInfo;
pub use limits::ResourceLimits;

const SCRIPT_NAME: &str = "chart_script.py";
const MAX_CAPTURE_BYTES: u64 = 1024 * 1024;
const STDERR_TAIL_LINES: usize = 20;
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Sandbox configuration (`[sandbox]` section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter used for scripts and dependency probes
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Wall-clock limit per execution
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Artifact directory; defaults to `<user data dir>/chartgate/charts`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Rendering backend exported as `MPLBACKEND`
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_max_cpu_secs")]
    pub max_cpu_secs: Option<u64>,

    #[serde(default)]
    pub max_memory_mb: Option<u64>,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: Option<u64>,

    /// Artifacts older than this are removed by cleanup
    #[serde(default = "default_cleanup_max_age_secs")]
    pub cleanup_max_age_secs: u64,

    /// Cleanup keeps at most this many artifacts
    #[serde(default = "default_cleanup_max_files")]
    pub cleanup_max_files: usize,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backend() -> String {
    "Agg".to_string()
}

fn default_max_cpu_secs() -> Option<u64> {
    Some(60)
}

fn default_max_file_size_mb() -> Option<u64> {
    Some(64)
}

fn default_cleanup_max_age_secs() -> u64 {
    3600
}

fn default_cleanup_max_files() -> usize {
    100
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_timeout_secs(),
            output_dir: None,
            backend: default_backend(),
            max_cpu_secs: default_max_cpu_secs(),
            max_memory_mb: None,
            max_file_size_mb: default_max_file_size_mb(),
            cleanup_max_age_secs: default_cleanup_max_age_secs(),
            cleanup_max_files: default_cleanup_max_files(),
        }
    }
}

/// Default artifact directory
pub fn default_output_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "chartgate")
        .map(|dirs| dirs.data_dir().join("charts"))
        .unwrap_or_else(|| PathBuf::from(".chartgate/charts"))
}

impl SandboxConfig {
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            cpu_secs: self.max_cpu_secs,
            memory_mb: self.max_memory_mb,
            file_size_mb: self.max_file_size_mb,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interpreter.trim().is_empty() {
            return Err("Interpreter cannot be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        if self.backend.trim().is_empty() {
            return Err("Backend cannot be empty".to_string());
        }
        if self.max_cpu_secs == Some(0)
            || self.max_memory_mb == Some(0)
            || self.max_file_size_mb == Some(0)
        {
            return Err("Resource limits must be greater than zero when set".to_string());
        }
        Ok(())
    }
}

/// Why an execution did not yield an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ExecutionFailure {
    Timeout { limit_ms: u64 },
    Syntax { message: String },
    Runtime { message: String },
    ArtifactMissing,
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionFailure::Timeout { limit_ms } => {
                write!(f, "execution timed out after {} ms", limit_ms)
            }
            ExecutionFailure::Syntax { message } => write!(f, "syntax error: {}", message),
            ExecutionFailure::Runtime { message } => write!(f, "runtime error: {}", message),
            ExecutionFailure::ArtifactMissing => write!(f, "completed without artifact"),
        }
    }
}

/// Outcome of one sandboxed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub artifact_path: Option<PathBuf>,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<ExecutionFailure>,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    fn succeeded(artifact_path: PathBuf, stdout: String, stderr: String, started: Instant) -> Self {
        Self {
            success: true,
            artifact_path: Some(artifact_path),
            stdout,
            stderr,
            failure: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failed(failure: ExecutionFailure, stdout: String, stderr: String, started: Instant) -> Self {
        Self {
            success: false,
            artifact_path: None,
            stdout,
            stderr,
            failure: Some(failure),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

pub struct SandboxedExecutor {
    config: SandboxConfig,
    output_dir: PathBuf,
}

impl SandboxedExecutor {
    /// Create the executor, creating the artifact directory if needed
    pub fn new(config: SandboxConfig) -> Result<Self, StorageError> {
        let output_dir = config.resolved_output_dir();
        std::fs::create_dir_all(&output_dir)?;
        let output_dir = dunce::canonicalize(&output_dir)?;
        std::fs::create_dir_all(output_dir.join(".mplconfig"))?;
        Ok(Self { config, output_dir })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Run with the configured timeout
    pub async fn execute(&self, code: &VettedCode) -> ExecutionResult {
        self.execute_with_timeout(code).await
    }

    /// Run with the configured timeout; the child is killed when it expires
    pub async fn execute_with_timeout(&self, code: &VettedCode) -> ExecutionResult {
        self.execute_with_limit(code, self.timeout()).await
    }

    /// Run with an explicit wall-clock limit
    pub async fn execute_with_limit(&self, code: &VettedCode, limit: Duration) -> ExecutionResult {
        let started = Instant::now();
        let output_path = artifacts::new_artifact_path(&self.output_dir);

        let launch_failure = |message: String| {
            warn!(error = %message, "Failed to launch chart script");
            ExecutionResult::failed(
                ExecutionFailure::Runtime { message },
                String::new(),
                String::new(),
                started,
            )
        };

        let script = match preamble::compose(&output_path, code) {
            Ok(script) => script,
            Err(e) => return launch_failure(e.to_string()),
        };

        // Removed on drop, after the child has exited or been killed.
        let scratch = match tempfile::Builder::new().prefix("chartgate-run-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return launch_failure(format!("Failed to create scratch directory: {}", e)),
        };
        let script_path = scratch.path().join(SCRIPT_NAME);
        if let Err(e) = tokio::fs::write(&script_path, script).await {
            return launch_failure(format!("Failed to write script: {}", e));
        }

        let mut command = self.command(&script_path, scratch.path());
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return launch_failure(format!(
                    "Failed to start interpreter '{}': {}",
                    self.config.interpreter, e
                ))
            }
        };
        let pid = child.id();
        debug!(pid = ?pid, output = %output_path.display(), "Chart script started");

        let stdout_task = tokio::spawn(read_capped(child.stdout.take()));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let (stdout, stderr) = drain(stdout_task, stderr_task).await;
                return ExecutionResult::failed(
                    ExecutionFailure::Runtime {
                        message: format!("Failed to wait for interpreter: {}", e),
                    },
                    stdout,
                    stderr,
                    started,
                );
            }
            Err(_) => {
                if let Some(pid) = pid {
                    limits::kill_group(pid);
                }
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Child already gone after group kill");
                }
                let (stdout, stderr) = drain(stdout_task, stderr_task).await;
                warn!(limit_ms = limit.as_millis() as u64, "Chart script timed out and was killed");
                return ExecutionResult::failed(
                    ExecutionFailure::Timeout {
                        limit_ms: limit.as_millis() as u64,
                    },
                    stdout,
                    stderr,
                    started,
                );
            }
        };

        let (stdout, stderr) = drain(stdout_task, stderr_task).await;

        if !status.success() {
            let failure = classify_exit(status, &stderr);
            warn!(failure = %failure, "Chart script failed");
            return ExecutionResult::failed(failure, stdout, stderr, started);
        }

        if !stderr.trim().is_empty() {
            debug!(stderr = %tail(&stderr), "Chart script wrote to stderr");
        }

        if output_path.is_file() {
            info!(
                artifact = %output_path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Chart rendered"
            );
            return ExecutionResult::succeeded(output_path, stdout, stderr, started);
        }

        if let Some(reported) = preamble::find_sentinel(&stdout) {
            match self.managed_artifact(&reported) {
                Some(artifact) => {
                    info!(artifact = %artifact.display(), "Chart rendered at reported location");
                    return ExecutionResult::succeeded(artifact, stdout, stderr, started);
                }
                None => {
                    debug!(reported = %reported.display(), "Reported artifact is missing or outside the output directory");
                }
            }
        }

        warn!("Chart script completed without producing an artifact");
        ExecutionResult::failed(ExecutionFailure::ArtifactMissing, stdout, stderr, started)
    }

    /// Resolve a reported path to an existing file inside the output directory
    fn managed_artifact(&self, reported: &Path) -> Option<PathBuf> {
        let resolved = dunce::canonicalize(reported).ok()?;
        (resolved.starts_with(&self.output_dir) && resolved.is_file()).then_some(resolved)
    }

    fn command(&self, script_path: &Path, scratch: &Path) -> Command {
        let mut command = Command::new(&self.config.interpreter);
        command
            .arg("-I")
            .arg(script_path)
            .current_dir(scratch)
            .env_clear()
            .env("HOME", scratch)
            .env("MPLBACKEND", &self.config.backend)
            .env("MPLCONFIGDIR", self.output_dir.join(".mplconfig"))
            .env("OPENBLAS_NUM_THREADS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Needed to resolve a bare interpreter name.
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        #[cfg(windows)]
        if let Some(root) = std::env::var_os("SYSTEMROOT") {
            command.env("SYSTEMROOT", root);
        }

        self.config.limits().apply(&mut command);
        command
    }

    /// Delete artifacts older than `max_age` or beyond the newest `max_files`
    pub fn cleanup_stale(&self, max_age: Duration, max_files: usize) -> Result<usize, StorageError> {
        artifacts::cleanup_stale(&self.output_dir, max_age, max_files)
    }

    /// Cleanup using the configured age and count limits
    pub fn cleanup_configured(&self) -> Result<usize, StorageError> {
        self.cleanup_stale(
            Duration::from_secs(self.config.cleanup_max_age_secs),
            self.config.cleanup_max_files,
        )
    }

    /// Retained artifacts, newest first
    pub fn list_artifacts(&self) -> Result<Vec<ArtifactInfo>, StorageError> {
        artifacts::list_artifacts(&self.output_dir)
    }
}

async fn read_capped<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    let mut capped = reader.take(MAX_CAPTURE_BYTES);
    let _ = capped.read_to_end(&mut buf).await;
    // Keep draining so the child never blocks on a full pipe.
    let mut rest = capped.into_inner();
    let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn drain(
    stdout: tokio::task::JoinHandle<String>,
    stderr: tokio::task::JoinHandle<String>,
) -> (String, String) {
    let collect = |handle: tokio::task::JoinHandle<String>| async move {
        match tokio::time::timeout(DRAIN_GRACE, handle).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        }
    };
    tokio::join!(collect(stdout), collect(stderr))
}

fn classify_exit(status: ExitStatus, stderr: &str) -> ExecutionFailure {
    let message = if stderr.trim().is_empty() {
        format!("interpreter exited with {}", status)
    } else {
        tail(stderr)
    };

    if stderr.contains("SyntaxError") || stderr.contains("IndentationError") {
        ExecutionFailure::Syntax { message }
    } else {
        ExecutionFailure::Runtime { message }
    }
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
