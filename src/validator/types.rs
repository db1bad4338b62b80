use serde::Serialize;

/// Result of one syntax check, cached by artifact content hash so repeated
/// artifacts cost one external invocation per run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub content_hash: String,
    pub is_valid: bool,
    pub diagnostic: Option<String>,
    pub checker_version: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
