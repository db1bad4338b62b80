use std::{
    fs,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use tokio::{process::Command, time::timeout};
use uuid::Uuid;

use crate::{
    adapters::{ConventionAdapter, MarkerPair},
    config::SandboxConfig,
    detector::Candidate,
};

pub mod error;
pub mod types;

use error::{SandboxError, interpreter_unavailable, scratch_failure, spawn_failure, wait_failure};
pub use types::{ExecutionOutcome, ExecutionResult, SandboxPhase};

const HARNESS_FILE_NAME: &str = "harness.py";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Out-of-process execution of harness programs. Isolation is timeout +
/// own process group + proxy-scrubbed environment + disposable scratch
/// cwd; this is containment for accidental misbehavior, not a defense
/// against adversarial code.
pub struct Sandbox {
    interpreter: String,
    timeout: Duration,
    stderr_cap: usize,
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            stderr_cap: config.stderr_cap_bytes,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Startup probe: a missing interpreter is fatal to the whole run, so
    /// surface it before any candidate is processed. The probe runs the
    /// empty program (null stdin, no arguments), which every supported
    /// interpreter exits cleanly from.
    pub async fn probe(&self) -> Result<(), SandboxError> {
        let mut command = Command::new(&self.interpreter);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let spawned = command.spawn().map_err(|err| {
            interpreter_unavailable(format!(
                "interpreter '{}' cannot be spawned: {err}",
                self.interpreter
            ))
        })?;
        match timeout(PROBE_TIMEOUT, spawned.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(interpreter_unavailable(format!(
                "interpreter '{}' probe exited with {}",
                self.interpreter, output.status
            ))),
            Ok(Err(err)) => Err(interpreter_unavailable(format!(
                "interpreter '{}' probe failed: {err}",
                self.interpreter
            ))),
            Err(_) => Err(interpreter_unavailable(format!(
                "interpreter '{}' probe timed out",
                self.interpreter
            ))),
        }
    }

    /// Runs one candidate through its adapter's harness. Errors are
    /// infrastructure-only; timeouts, crashes, and marker problems come
    /// back as outcomes.
    pub async fn run(
        &self,
        candidate: &Candidate,
        adapter: &dyn ConventionAdapter,
    ) -> Result<ExecutionResult, SandboxError> {
        let started = Instant::now();

        // Launching
        let scratch = ScratchDir::create()?;
        let markers = MarkerPair::salted();
        let harness = adapter.build_harness(&candidate.excerpt, &markers);
        let harness_path = scratch.path().join(HARNESS_FILE_NAME);
        fs::write(&harness_path, &harness).map_err(|err| {
            scratch_failure(format!(
                "failed to write harness {}: {err}",
                harness_path.display()
            ))
        })?;

        let mut command = Command::new(&self.interpreter);
        command
            .arg(&harness_path)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        scrub_network_env(&mut command);

        let child = command.spawn().map_err(|err| {
            spawn_failure(format!(
                "failed to spawn '{}' for {}: {err}",
                self.interpreter,
                candidate.path.display()
            ))
        })?;
        let group_id = child.id();

        // Running
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Err(_elapsed) => {
                // The child future is dropped; kill the whole group so
                // forked grandchildren do not outlive the timeout.
                if let Some(group_id) = group_id {
                    kill_process_group(group_id);
                }
                tracing::warn!(
                    target: "sandbox",
                    path = %candidate.path.display(),
                    line = candidate.span.start_line,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "sandbox_timeout"
                );
                return Ok(ExecutionResult {
                    outcome: ExecutionOutcome::Timeout,
                    phase: SandboxPhase::TimedOut,
                    duration: started.elapsed(),
                });
            }
            Ok(Err(err)) => {
                return Err(wait_failure(format!(
                    "failed to collect sandbox output for {}: {err}",
                    candidate.path.display()
                )));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let message = truncate_lossy(&output.stderr, self.stderr_cap);
            tracing::debug!(
                target: "sandbox",
                path = %candidate.path.display(),
                line = candidate.span.start_line,
                exit = ?output.status.code(),
                "sandbox_runtime_failure"
            );
            return Ok(ExecutionResult {
                outcome: ExecutionOutcome::RuntimeFailure { message },
                phase: SandboxPhase::Crashed,
                duration: started.elapsed(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let outcome = match extract_between_markers(&stdout, &markers) {
            Some(artifact) => ExecutionOutcome::Success { artifact },
            None => ExecutionOutcome::MalformedOutput,
        };
        Ok(ExecutionResult {
            outcome,
            phase: SandboxPhase::Completed,
            duration: started.elapsed(),
        })
    }
}

/// Artifact text between the salted markers. A missing end marker means the
/// output was truncated or the harness died mid-print; both are malformed.
fn extract_between_markers(stdout: &str, markers: &MarkerPair) -> Option<String> {
    let mut inside = false;
    let mut lines: Vec<&str> = Vec::new();
    for line in stdout.lines() {
        if !inside {
            if line == markers.begin {
                inside = true;
            }
        } else if line == markers.end {
            return Some(lines.join("\n"));
        } else {
            lines.push(line);
        }
    }
    None
}

fn truncate_lossy(bytes: &[u8], cap: usize) -> String {
    if bytes.len() <= cap {
        return String::from_utf8_lossy(bytes).to_string();
    }
    String::from_utf8_lossy(&bytes[..cap]).to_string()
}

/// Network access is disabled by convention: proxies are cleared and
/// `no_proxy` is forced. OS-level sandboxing (seccomp, namespaces) is a
/// declared non-goal.
fn scrub_network_env(command: &mut Command) {
    for variable in [
        "http_proxy",
        "https_proxy",
        "all_proxy",
        "HTTP_PROXY",
        "HTTPS_PROXY",
        "ALL_PROXY",
    ] {
        command.env_remove(variable);
    }
    command.env("no_proxy", "*");
    command.env("NO_PROXY", "*");
    command.env("PYTHONDONTWRITEBYTECODE", "1");
}

fn kill_process_group(group_id: u32) {
    unsafe {
        libc::killpg(group_id as libc::pid_t, libc::SIGKILL);
    }
}

/// Disposable working directory for one execution; removed on drop
/// regardless of outcome.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create() -> Result<Self, SandboxError> {
        let path = std::env::temp_dir().join(format!("dotharvest-sandbox-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|err| {
            scratch_failure(format!(
                "failed to create scratch directory {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
