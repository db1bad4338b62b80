use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_source_repo() -> String {
    "unknown".to_string()
}

fn default_source_license() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_source_repo")]
    pub repo: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_source_license")]
    pub license: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            repo: default_source_repo(),
            url: String::new(),
            license: default_source_license(),
        }
    }
}

fn default_confidence_floor() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
        }
    }
}

fn default_context_max_bytes() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_context_max_bytes")]
    pub max_bytes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_context_max_bytes(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout_ms() -> u64 {
    30_000
}

fn default_sandbox_concurrency() -> usize {
    4
}

fn default_stderr_cap_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_sandbox_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_stderr_cap_bytes")]
    pub stderr_cap_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_ms: default_sandbox_timeout_ms(),
            max_concurrency: default_sandbox_concurrency(),
            stderr_cap_bytes: default_stderr_cap_bytes(),
        }
    }
}

fn default_checker_bin() -> String {
    "dot".to_string()
}

fn default_checker_format() -> String {
    "svg".to_string()
}

fn default_validator_timeout_ms() -> u64 {
    10_000
}

fn default_cache_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_checker_bin")]
    pub checker_bin: String,
    #[serde(default = "default_checker_format")]
    pub format: String,
    #[serde(default = "default_validator_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub strict: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            checker_bin: default_checker_bin(),
            format: default_checker_format(),
            timeout_ms: default_validator_timeout_ms(),
            cache_capacity: default_cache_capacity(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// 0 selects the machine's available parallelism.
    #[serde(default)]
    pub detect_concurrency: usize,
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("./data/pairs.jsonl")
}

fn default_id_prefix() -> String {
    "logic".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_path")]
    pub path: PathBuf,
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_sink_path(),
            id_prefix: default_id_prefix(),
        }
    }
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs/dotharvest")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

fn default_enabled_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config = serde_json::from_value(config_value)
            .context("failed to deserialize dotharvest config")?;

        for root in &mut config.source.roots {
            if !root.is_absolute() {
                *root = config_base.join(&*root);
            }
        }
        if !config.sink.path.is_absolute() {
            config.sink.path = config_base.join(&config.sink.path);
        }

        Ok(config)
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join("dotharvest.schema.json");
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or dotharvest.schema.json beside it"
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
