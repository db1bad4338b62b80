use std::fmt;

/// Infrastructure failures only. A candidate that merely times out or
/// crashes is an [`ExecutionOutcome`](super::ExecutionOutcome), not an
/// error; these variants mean no candidate can ever succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxErrorKind {
    InterpreterUnavailable,
    ScratchFailure,
    SpawnFailure,
    WaitFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxError {
    pub kind: SandboxErrorKind,
    pub message: String,
}

impl SandboxError {
    pub fn new(kind: SandboxErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SandboxError {}

pub fn interpreter_unavailable(message: impl Into<String>) -> SandboxError {
    SandboxError::new(SandboxErrorKind::InterpreterUnavailable, message)
}

pub fn scratch_failure(message: impl Into<String>) -> SandboxError {
    SandboxError::new(SandboxErrorKind::ScratchFailure, message)
}

pub fn spawn_failure(message: impl Into<String>) -> SandboxError {
    SandboxError::new(SandboxErrorKind::SpawnFailure, message)
}

pub fn wait_failure(message: impl Into<String>) -> SandboxError {
    SandboxError::new(SandboxErrorKind::WaitFailure, message)
}
