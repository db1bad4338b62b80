use std::{
    process::Stdio,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use sha2::{Digest, Sha256};
use tokio::{io::AsyncWriteExt, process::Command, time::timeout};

use crate::config::ValidatorConfig;

pub mod cache;
pub mod error;
pub mod types;

use cache::LruCache;
use error::{ValidatorError, checker_unavailable};
pub use types::{CacheSnapshot, ValidationResult};

const NULL_DEVICE: &str = "/dev/null";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

/// Syntax gate over candidate artifacts: every artifact goes through the
/// external checker once per distinct content hash, valid or not.
#[derive(Debug)]
pub struct DotValidator {
    checker: String,
    format: String,
    timeout: Duration,
    strict: bool,
    checker_version: Option<String>,
    cache: Mutex<LruCache<String, ValidationResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DotValidator {
    /// Probes the checker binary; a binary that cannot even spawn is fatal
    /// to the whole run.
    pub async fn new(config: &ValidatorConfig) -> Result<Self, ValidatorError> {
        let checker_version = probe_version(&config.checker_bin).await?;
        Ok(Self {
            checker: config.checker_bin.clone(),
            format: config.format.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            strict: config.strict,
            checker_version,
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn checker_version(&self) -> Option<&str> {
        self.checker_version.as_deref()
    }

    pub async fn validate(&self, artifact: &str) -> ValidationResult {
        let content_hash = content_hash(artifact);

        if artifact.trim().is_empty() {
            return self.guard_result(content_hash, "empty artifact");
        }
        if artifact.len() > MAX_ARTIFACT_BYTES {
            return self.guard_result(content_hash, "artifact exceeds 10MiB size limit");
        }

        if let Some(cached) = self
            .cache
            .lock()
            .expect("lock poisoned")
            .get(&content_hash)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = self.run_checker(artifact, content_hash).await;
        self.cache
            .lock()
            .expect("lock poisoned")
            .put(result.content_hash.clone(), result.clone());
        result
    }

    pub fn cache_stats(&self) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.lock().expect("lock poisoned").len(),
        }
    }

    fn guard_result(&self, content_hash: String, diagnostic: &str) -> ValidationResult {
        ValidationResult {
            content_hash,
            is_valid: false,
            diagnostic: Some(diagnostic.to_string()),
            checker_version: self.checker_version.clone(),
            duration_ms: 0,
        }
    }

    async fn run_checker(&self, artifact: &str, content_hash: String) -> ValidationResult {
        let started = Instant::now();

        let mut command = Command::new(&self.checker);
        command
            .arg(format!("-T{}", self.format))
            .arg("-o")
            .arg(NULL_DEVICE)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ValidationResult {
                    content_hash,
                    is_valid: false,
                    diagnostic: Some(format!("checker '{}' failed to spawn: {err}", self.checker)),
                    checker_version: self.checker_version.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        let stdin = child.stdin.take();
        let interaction = async {
            if let Some(mut stdin) = stdin {
                // A checker that rejects early may close stdin first; its
                // exit status carries the verdict either way.
                let _ = stdin.write_all(artifact.as_bytes()).await;
            }
            child.wait_with_output().await
        };

        let output = match timeout(self.timeout, interaction).await {
            Err(_elapsed) => {
                return ValidationResult {
                    content_hash,
                    is_valid: false,
                    diagnostic: Some(format!(
                        "checker timed out after {}ms",
                        self.timeout.as_millis()
                    )),
                    checker_version: self.checker_version.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            Ok(Err(err)) => {
                return ValidationResult {
                    content_hash,
                    is_valid: false,
                    diagnostic: Some(format!("failed to collect checker output: {err}")),
                    checker_version: self.checker_version.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            Ok(Ok(output)) => output,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        let (is_valid, diagnostic) = if !output.status.success() {
            let diagnostic = if stderr.is_empty() {
                format!("checker exited with {}", output.status)
            } else {
                stderr
            };
            (false, Some(diagnostic))
        } else if self.strict && !stderr.is_empty() {
            (
                false,
                Some(format!("warnings treated as errors (strict mode): {stderr}")),
            )
        } else {
            (true, None)
        };

        ValidationResult {
            content_hash,
            is_valid,
            diagnostic,
            checker_version: self.checker_version.clone(),
            duration_ms,
        }
    }
}

pub fn content_hash(artifact: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(artifact.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `dot -V` prints its version line on stderr. A probe that cannot spawn
/// at all means the checker is absent, which aborts the run.
async fn probe_version(checker: &str) -> Result<Option<String>, ValidatorError> {
    let mut command = Command::new(checker);
    command
        .arg("-V")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|err| {
        checker_unavailable(format!("checker '{checker}' cannot be spawned: {err}"))
    })?;
    match timeout(PROBE_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Ok((!version.is_empty()).then_some(version))
        }
        Ok(Ok(_)) => Ok(None),
        Ok(Err(err)) => Err(checker_unavailable(format!(
            "checker '{checker}' probe failed: {err}"
        ))),
        Err(_) => Err(checker_unavailable(format!(
            "checker '{checker}' probe timed out"
        ))),
    }
}
