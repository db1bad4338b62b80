use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use futures_util::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::{
    adapters::{ConventionAdapter, ConventionKind, registry},
    config::Config,
    context,
    detector::{Candidate, Detector},
    record::{PairRecord, TaskType, VerificationStatus, generate_pair_id, now_timestamp},
    registry::DedupRegistry,
    sandbox::{ExecutionOutcome, Sandbox, error::SandboxError},
    sink::{JsonlSink, SinkError, scan_sink_ids},
    validator::{CacheSnapshot, DotValidator, error::ValidatorError},
};

pub mod stats;
pub mod walk;

use stats::{RunStats, RunStatsSnapshot, add, bump};
use walk::walk_python_files;

/// Fatal failures only: a candidate-local problem never becomes one of
/// these. If a `PipelineError` surfaces, no candidate could ever succeed
/// and the run aborts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sandbox infrastructure failure: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("checker unavailable: {0}")]
    Validator(#[from] ValidatorError),
    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone)]
struct Provenance {
    repo: String,
    url: String,
    license: String,
    id_prefix: String,
}

/// Drives detect -> context -> sandbox -> validate -> dedup -> append for
/// every candidate, isolating per-candidate failures. Owns the registry
/// and the sink for the run's lifetime; workers share them through
/// `&self`.
pub struct Pipeline {
    detector: Detector,
    adapters_by_kind: HashMap<ConventionKind, Arc<dyn ConventionAdapter>>,
    context_max_bytes: usize,
    sandbox: Sandbox,
    sandbox_permits: Semaphore,
    validator: DotValidator,
    registry: DedupRegistry,
    sink: JsonlSink,
    provenance: Provenance,
    roots: Vec<PathBuf>,
    detect_concurrency: usize,
    primed_ids: usize,
    stats: RunStats,
}

impl Pipeline {
    pub async fn new(config: &Config) -> Result<Self, PipelineError> {
        Self::with_adapters(config, registry()).await
    }

    /// Construction runs the fatal-startup probes (interpreter, checker)
    /// and primes the dedup registry from any pre-existing sink, so a
    /// resumed run rejects all previously accepted ids.
    pub async fn with_adapters(
        config: &Config,
        adapters: Vec<Arc<dyn ConventionAdapter>>,
    ) -> Result<Self, PipelineError> {
        let sandbox = Sandbox::new(&config.sandbox);
        sandbox.probe().await?;
        let validator = DotValidator::new(&config.validator).await?;

        if config.validator.timeout_ms > config.sandbox.timeout_ms {
            tracing::warn!(
                target: "pipeline",
                validator_timeout_ms = config.validator.timeout_ms,
                sandbox_timeout_ms = config.sandbox.timeout_ms,
                "validator_timeout_exceeds_sandbox_timeout"
            );
        }

        let registry = DedupRegistry::new();
        let primed_ids = registry.prime(scan_sink_ids(&config.sink.path)?);
        let sink = JsonlSink::open(&config.sink.path)?;

        let adapters_by_kind = adapters
            .iter()
            .map(|adapter| (adapter.kind(), Arc::clone(adapter)))
            .collect();
        let detector = Detector::new(adapters, config.detector.confidence_floor);

        let detect_concurrency = if config.pipeline.detect_concurrency > 0 {
            config.pipeline.detect_concurrency
        } else {
            std::thread::available_parallelism()
                .map(|cores| cores.get())
                .unwrap_or(4)
        };

        Ok(Self {
            detector,
            adapters_by_kind,
            context_max_bytes: config.context.max_bytes,
            sandbox,
            sandbox_permits: Semaphore::new(config.sandbox.max_concurrency),
            validator,
            registry,
            sink,
            provenance: Provenance {
                repo: config.source.repo.clone(),
                url: config.source.url.clone(),
                license: config.source.license.clone(),
                id_prefix: config.sink.id_prefix.clone(),
            },
            roots: config.source.roots.clone(),
            detect_concurrency,
            primed_ids,
            stats: RunStats::default(),
        })
    }

    pub fn primed_ids(&self) -> usize {
        self.primed_ids
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let started_at = now_timestamp();

        let files = walk_python_files(&self.roots);
        tracing::info!(
            target: "pipeline",
            files = files.len(),
            primed_ids = self.primed_ids,
            sink = %self.sink.path().display(),
            "pipeline_started"
        );

        stream::iter(files)
            .map(|path| self.process_file(path))
            .buffer_unordered(self.detect_concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        let summary = RunSummary {
            stats: self.stats.snapshot(),
            cache: self.validator.cache_stats(),
            primed_ids: self.primed_ids,
            sink_path: self.sink.path().to_path_buf(),
            started_at,
            finished_at: now_timestamp(),
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            target: "pipeline",
            records_written = summary.stats.records_written,
            duplicates_skipped = summary.stats.duplicates_skipped,
            validation_failed = summary.stats.validation_failed,
            duration_seconds = summary.duration_seconds,
            "pipeline_finished"
        );
        Ok(summary)
    }

    /// One file end to end. Everything except infrastructure failures is
    /// contained here: a malformed file or failed candidate never aborts
    /// its siblings.
    async fn process_file(&self, path: PathBuf) -> Result<(), PipelineError> {
        bump(&self.stats.files_scanned);

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                bump(&self.stats.unreadable_files);
                tracing::warn!(
                    target: "pipeline",
                    path = %path.display(),
                    error = %err,
                    "file_unreadable"
                );
                return Ok(());
            }
        };

        let detection = match self.detector.detect(&path, &source) {
            Ok(detection) => detection,
            Err(err) => {
                bump(&self.stats.parse_failures);
                tracing::warn!(
                    target: "pipeline",
                    path = %path.display(),
                    error = %err,
                    "detection_failed"
                );
                return Ok(());
            }
        };
        add(
            &self.stats.candidates_detected,
            detection.candidates.len() as u64,
        );
        add(
            &self.stats.low_confidence_discarded,
            detection.low_confidence_discarded as u64,
        );

        for candidate in detection.candidates {
            let input_text = context::extract(&candidate, &source, self.context_max_bytes);
            self.process_candidate(candidate, input_text).await?;
        }
        Ok(())
    }

    async fn process_candidate(
        &self,
        candidate: Candidate,
        input_text: String,
    ) -> Result<(), PipelineError> {
        let adapter = self
            .adapters_by_kind
            .get(&candidate.kind)
            .expect("candidate kind comes from the registered adapter set");

        let execution = {
            let _permit = self
                .sandbox_permits
                .acquire()
                .await
                .expect("sandbox semaphore closed");
            self.sandbox.run(&candidate, adapter.as_ref()).await?
        };

        let artifact = match execution.outcome {
            ExecutionOutcome::Timeout => {
                bump(&self.stats.exec_timeout);
                return Ok(());
            }
            ExecutionOutcome::RuntimeFailure { message } => {
                bump(&self.stats.exec_failure);
                tracing::debug!(
                    target: "pipeline",
                    path = %candidate.path.display(),
                    line = candidate.span.start_line,
                    diagnostic = %message,
                    "candidate_runtime_failure"
                );
                return Ok(());
            }
            ExecutionOutcome::MalformedOutput => {
                bump(&self.stats.malformed_output);
                tracing::warn!(
                    target: "pipeline",
                    path = %candidate.path.display(),
                    line = candidate.span.start_line,
                    "candidate_output_malformed"
                );
                return Ok(());
            }
            ExecutionOutcome::Success { artifact } => {
                bump(&self.stats.exec_success);
                artifact
            }
        };

        let validation = self.validator.validate(&artifact).await;
        if !validation.is_valid {
            bump(&self.stats.validation_failed);
            tracing::debug!(
                target: "pipeline",
                path = %candidate.path.display(),
                line = candidate.span.start_line,
                diagnostic = validation.diagnostic.as_deref().unwrap_or(""),
                "artifact_rejected_by_checker"
            );
            return Ok(());
        }
        bump(&self.stats.validation_passed);

        let prefix = (!self.provenance.id_prefix.is_empty())
            .then_some(self.provenance.id_prefix.as_str());
        let id = generate_pair_id(&artifact, prefix);
        if !self.registry.try_accept(&id) {
            bump(&self.stats.duplicates_skipped);
            tracing::debug!(target: "pipeline", id = %id, "duplicate_artifact_skipped");
            return Ok(());
        }

        let record = PairRecord {
            id: id.clone(),
            source: candidate.provenance(&self.provenance.repo),
            source_url: self.provenance.url.clone(),
            license: self.provenance.license.clone(),
            task_type: TaskType::CodeToDot,
            input_text,
            output_dot: artifact,
            verification_status: VerificationStatus::PassedCompiler,
            scraped_at: now_timestamp(),
        };
        if let Err(err) = record.validate() {
            tracing::error!(
                target: "pipeline",
                id = %id,
                error = %err,
                "record_failed_schema_validation"
            );
            return Ok(());
        }

        self.sink.append(&record)?;
        bump(&self.stats.records_written);
        tracing::info!(
            target: "pipeline",
            id = %id,
            kind = %candidate.kind,
            source = %record.source,
            "record_written"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stats: RunStatsSnapshot,
    pub cache: CacheSnapshot,
    pub primed_ids: usize,
    pub sink_path: PathBuf,
    pub started_at: String,
    pub finished_at: String,
    pub duration_seconds: f64,
}

impl RunSummary {
    pub fn render(&self) -> String {
        let stats = &self.stats;
        format!(
            "\
Harvest Run Summary
===================
Files scanned:            {}
Unreadable files:         {}
Parse failures:           {}
Candidates detected:      {}
Below confidence floor:   {}
Executions succeeded:     {}
Execution timeouts:       {}
Execution failures:       {}
Malformed outputs:        {}
Validation passed:        {}
Validation failed:        {}
Validation pass rate:     {:.1}%
Duplicates skipped:       {}
Records written:          {}
Checker cache:            {} hits / {} misses ({:.1}% hit rate)
Resumed ids:              {}
Sink:                     {}
Duration:                 {:.2}s",
            stats.files_scanned,
            stats.unreadable_files,
            stats.parse_failures,
            stats.candidates_detected,
            stats.low_confidence_discarded,
            stats.exec_success,
            stats.exec_timeout,
            stats.exec_failure,
            stats.malformed_output,
            stats.validation_passed,
            stats.validation_failed,
            stats.validation_pass_rate(),
            stats.duplicates_skipped,
            stats.records_written,
            self.cache.hits,
            self.cache.misses,
            self.cache.hit_rate() * 100.0,
            self.primed_ids,
            self.sink_path.display(),
            self.duration_seconds,
        )
    }
}
