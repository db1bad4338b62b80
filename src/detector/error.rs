use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionErrorKind {
    ParseFailure,
    GrammarUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionError {
    pub kind: DetectionErrorKind,
    pub message: String,
}

impl DetectionError {
    pub fn new(kind: DetectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DetectionError {}

pub fn parse_failure(message: impl Into<String>) -> DetectionError {
    DetectionError::new(DetectionErrorKind::ParseFailure, message)
}

pub fn grammar_unavailable(message: impl Into<String>) -> DetectionError {
    DetectionError::new(DetectionErrorKind::GrammarUnavailable, message)
}
