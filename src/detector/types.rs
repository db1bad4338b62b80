use std::path::PathBuf;

use crate::adapters::{ConventionKind, SourceSpan};

/// A statically recognized occurrence of a supported convention. Immutable
/// once produced; the orchestrator owns it for the rest of its lifetime.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub span: SourceSpan,
    pub kind: ConventionKind,
    pub excerpt: String,
    pub confidence: f64,
}

impl Candidate {
    /// Provenance string persisted with the pair record:
    /// `<repo>:<file name>:<start line>`.
    pub fn provenance(&self, repo: &str) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string());
        format!("{}:{}:{}", repo, file_name, self.span.start_line)
    }
}

/// Outcome of detection over one file: surviving candidates plus the count
/// discarded below the confidence floor.
#[derive(Debug, Default)]
pub struct Detection {
    pub candidates: Vec<Candidate>,
    pub low_confidence_discarded: usize,
}

impl Detection {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::adapters::{ConventionKind, SourceSpan};

    use super::Candidate;

    #[test]
    fn provenance_uses_file_name_and_start_line() {
        let candidate = Candidate {
            path: PathBuf::from("/repos/demo/machines/traffic.py"),
            span: SourceSpan {
                start_byte: 0,
                end_byte: 10,
                start_line: 12,
                end_line: 30,
            },
            kind: ConventionKind::StateMachineClass,
            excerpt: String::new(),
            confidence: 1.0,
        };

        assert_eq!(
            candidate.provenance("github.com/demo/repo"),
            "github.com/demo/repo:traffic.py:12"
        );
    }
}
