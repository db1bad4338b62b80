use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const ID_HASH_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "CODE_TO_DOT")]
    CodeToDot,
    #[serde(rename = "NL_TO_DOT")]
    NlToDot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[serde(rename = "passed_compiler")]
    PassedCompiler,
    #[serde(rename = "failed_compiler")]
    FailedCompiler,
}

/// One persisted (input, artifact) pair. Immutable once appended to the
/// sink; only compiler-verified artifacts ever reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRecord {
    pub id: String,
    pub source: String,
    pub source_url: String,
    pub license: String,
    pub task_type: TaskType,
    pub input_text: String,
    pub output_dot: String,
    pub verification_status: VerificationStatus,
    pub scraped_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub message: String,
}

impl RecordError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RecordError {}

impl PairRecord {
    /// Field-level checks applied before any sink write; an invalid record
    /// here is a pipeline bug, not a candidate failure.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.trim().is_empty() {
            return Err(RecordError::new("id cannot be empty"));
        }
        if self.source.trim().is_empty() {
            return Err(RecordError::new("source cannot be empty"));
        }
        if self.license.trim().is_empty() {
            return Err(RecordError::new("license cannot be empty"));
        }
        if self.input_text.trim().is_empty() {
            return Err(RecordError::new("input_text cannot be empty"));
        }
        if self.output_dot.trim().is_empty() {
            return Err(RecordError::new("output_dot cannot be empty"));
        }
        if OffsetDateTime::parse(&self.scraped_at, &Rfc3339).is_err() {
            return Err(RecordError::new(format!(
                "scraped_at must be RFC 3339, got '{}'",
                self.scraped_at
            )));
        }
        Ok(())
    }
}

/// Line-ending and trailing-whitespace normalization applied before
/// hashing, so cosmetically different serializations of the same graph
/// collapse to one id. The stored artifact keeps its original bytes.
pub fn normalize_artifact(artifact: &str) -> String {
    artifact.replace("\r\n", "\n").trim_end().to_string()
}

/// Deterministic content-derived pair id: first 16 hex chars of the
/// SHA-256 of the normalized artifact, optionally under a provenance
/// prefix. Identical artifacts across files, runs, and streams share one
/// id, which is what makes global deduplication work.
pub fn generate_pair_id(artifact: &str, prefix: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_artifact(artifact).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let short_hash = &digest[..ID_HASH_LEN];

    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}-{short_hash}"),
        _ => short_hash.to_string(),
    }
}

pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::{
        PairRecord, TaskType, VerificationStatus, generate_pair_id, normalize_artifact,
        now_timestamp,
    };

    fn sample_record() -> PairRecord {
        PairRecord {
            id: generate_pair_id("digraph { A -> B; }", Some("logic")),
            source: "github.com/demo/repo:traffic.py:4".to_string(),
            source_url: "https://github.com/demo/repo".to_string(),
            license: "MIT".to_string(),
            task_type: TaskType::CodeToDot,
            input_text: "class TrafficLight(StateMachine): ...".to_string(),
            output_dot: "digraph { A -> B; }".to_string(),
            verification_status: VerificationStatus::PassedCompiler,
            scraped_at: now_timestamp(),
        }
    }

    #[test]
    fn pair_id_is_deterministic_and_prefixed() {
        let first = generate_pair_id("digraph { A -> B; }", Some("logic"));
        let second = generate_pair_id("digraph { A -> B; }", Some("logic"));
        assert_eq!(first, second);
        assert!(first.starts_with("logic-"));
        assert_eq!(first.len(), "logic-".len() + 16);

        let bare = generate_pair_id("digraph { A -> B; }", None);
        assert_eq!(bare.len(), 16);
        assert!(first.ends_with(&bare));
    }

    #[test]
    fn normalization_collapses_line_endings_and_trailing_space() {
        let unix = "digraph {\n  A -> B;\n}\n";
        let windows = "digraph {\r\n  A -> B;\r\n}\r\n\r\n";
        assert_eq!(normalize_artifact(unix), normalize_artifact(windows));
        assert_eq!(
            generate_pair_id(unix, Some("logic")),
            generate_pair_id(windows, Some("logic")),
        );
    }

    #[test]
    fn different_artifacts_get_different_ids() {
        assert_ne!(
            generate_pair_id("digraph { A -> B; }", Some("logic")),
            generate_pair_id("digraph { A -> C; }", Some("logic")),
        );
    }

    #[test]
    fn record_serializes_with_schema_field_names() {
        let json = serde_json::to_value(sample_record()).expect("record should serialize");
        assert_eq!(json["task_type"], "CODE_TO_DOT");
        assert_eq!(json["verification_status"], "passed_compiler");
        assert!(json["id"].as_str().is_some_and(|id| id.starts_with("logic-")));
    }

    #[test]
    fn valid_record_passes_validation() {
        sample_record().validate().expect("record should be valid");
    }

    #[test]
    fn empty_output_dot_fails_validation() {
        let mut record = sample_record();
        record.output_dot = String::new();
        let err = record.validate().expect_err("empty artifact should fail");
        assert!(err.message.contains("output_dot"));
    }

    #[test]
    fn malformed_timestamp_fails_validation() {
        let mut record = sample_record();
        record.scraped_at = "yesterday".to_string();
        let err = record.validate().expect_err("bad timestamp should fail");
        assert!(err.message.contains("RFC 3339"));
    }
}
