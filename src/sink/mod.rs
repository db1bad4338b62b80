use std::{
    fmt, fs,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::record::PairRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    Io,
    Serialize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

impl SinkError {
    pub fn new(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SinkError {}

fn io_error(message: impl Into<String>) -> SinkError {
    SinkError::new(SinkErrorKind::Io, message)
}

fn serialize_error(message: impl Into<String>) -> SinkError {
    SinkError::new(SinkErrorKind::Serialize, message)
}

/// Append-only JSONL sink: one pair record per line, fsynced per append,
/// never rewritten in place. The file itself is the durable form of the
/// dedup registry.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl JsonlSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| {
                io_error(format!(
                    "failed to create sink directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| io_error(format!("failed to open sink {}: {err}", path.display())))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &PairRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)
            .map_err(|err| serialize_error(format!("failed to serialize record: {err}")))?;
        line.push('\n');

        let mut file = self.file.lock().expect("lock poisoned");
        file.write_all(line.as_bytes()).map_err(|err| {
            io_error(format!(
                "failed to append to sink {}: {err}",
                self.path.display()
            ))
        })?;
        file.sync_data().map_err(|err| {
            io_error(format!(
                "failed to sync sink {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

/// Ids of every record already in the sink, for registry priming. A
/// missing sink is an empty history; malformed lines are skipped with a
/// warning rather than poisoning the resume.
pub fn scan_sink_ids(path: &Path) -> Result<Vec<String>, SinkError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(io_error(format!(
                "failed to read sink {}: {err}",
                path.display()
            )));
        }
    };

    let mut ids = Vec::new();
    for (line_no, line_result) in BufReader::new(file).lines().enumerate() {
        let line = line_result.map_err(|err| {
            io_error(format!(
                "failed to read sink {} line {}: {err}",
                path.display(),
                line_no + 1
            ))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(value) => {
                if let Some(id) = value.get("id").and_then(|id| id.as_str()) {
                    ids.push(id.to_string());
                } else {
                    tracing::warn!(
                        target: "sink",
                        path = %path.display(),
                        line = line_no + 1,
                        "sink_line_missing_id"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    target: "sink",
                    path = %path.display(),
                    line = line_no + 1,
                    error = %err,
                    "sink_line_unparseable"
                );
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use uuid::Uuid;

    use crate::record::{
        PairRecord, TaskType, VerificationStatus, generate_pair_id, now_timestamp,
    };

    use super::{JsonlSink, scan_sink_ids};

    fn record_with_artifact(artifact: &str) -> PairRecord {
        PairRecord {
            id: generate_pair_id(artifact, Some("logic")),
            source: "github.com/demo/repo:machine.py:1".to_string(),
            source_url: "https://github.com/demo/repo".to_string(),
            license: "MIT".to_string(),
            task_type: TaskType::CodeToDot,
            input_text: "machine = GraphMachine(...)".to_string(),
            output_dot: artifact.to_string(),
            verification_status: VerificationStatus::PassedCompiler,
            scraped_at: now_timestamp(),
        }
    }

    #[test]
    fn appended_records_come_back_from_the_id_scan() {
        let dir = std::env::temp_dir().join(format!("dotharvest-sink-test-{}", Uuid::now_v7()));
        let path = dir.join("pairs.jsonl");

        let sink = JsonlSink::open(&path).expect("sink should open");
        let first = record_with_artifact("digraph { A -> B; }");
        let second = record_with_artifact("digraph { B -> C; }");
        sink.append(&first).expect("first append should succeed");
        sink.append(&second).expect("second append should succeed");

        let ids = scan_sink_ids(&path).expect("scan should succeed");
        assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn scan_of_missing_sink_is_empty() {
        let path = std::env::temp_dir().join(format!("dotharvest-absent-{}.jsonl", Uuid::now_v7()));
        let ids = scan_sink_ids(&path).expect("missing sink should scan as empty");
        assert!(ids.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let dir = std::env::temp_dir().join(format!("dotharvest-sink-test-{}", Uuid::now_v7()));
        fs::create_dir_all(&dir).expect("temp dir should exist");
        let path = dir.join("pairs.jsonl");
        fs::write(
            &path,
            "{\"id\": \"logic-aaaa\"}\nnot json at all\n{\"no_id\": true}\n{\"id\": \"logic-bbbb\"}\n",
        )
        .expect("sink fixture should be written");

        let ids = scan_sink_ids(&path).expect("scan should succeed");
        assert_eq!(ids, vec!["logic-aaaa".to_string(), "logic-bbbb".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn reopening_appends_instead_of_rewriting() {
        let dir = std::env::temp_dir().join(format!("dotharvest-sink-test-{}", Uuid::now_v7()));
        let path = dir.join("pairs.jsonl");

        {
            let sink = JsonlSink::open(&path).expect("sink should open");
            sink.append(&record_with_artifact("digraph { A; }"))
                .expect("append should succeed");
        }
        {
            let sink = JsonlSink::open(&path).expect("sink should reopen");
            sink.append(&record_with_artifact("digraph { B; }"))
                .expect("append should succeed");
        }

        let ids = scan_sink_ids(&path).expect("scan should succeed");
        assert_eq!(ids.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }
}
