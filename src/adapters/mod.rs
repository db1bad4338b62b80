use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tree_sitter::Node;
use uuid::Uuid;

mod automata;
mod graph_machine;
mod state_machine;

pub use automata::AutomataCall;
pub use graph_machine::GraphMachineCall;
pub use state_machine::StateMachineClass;

/// Closed set of recognized structural conventions. Adding a convention
/// means adding one adapter to [`registry`], nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionKind {
    StateMachineClass,
    GraphMachineCall,
    AutomataCall,
}

impl ConventionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConventionKind::StateMachineClass => "state_machine_class",
            ConventionKind::GraphMachineCall => "graph_machine_call",
            ConventionKind::AutomataCall => "automata_call",
        }
    }
}

impl fmt::Display for ConventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte and line bounds of a recognized definition inside one source file.
/// Lines are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
}

/// Import lines observed in a source file, collected once per file by a
/// plain line scan before any AST work.
#[derive(Debug, Clone, Default)]
pub struct ImportScan {
    lines: Vec<(usize, String)>,
}

impl ImportScan {
    pub fn scan(source: &str) -> Self {
        let lines = source
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let trimmed = line.trim_start();
                trimmed.starts_with("import ") || trimmed.starts_with("from ")
            })
            .map(|(index, line)| (index + 1, line.to_string()))
            .collect();
        Self { lines }
    }

    pub fn has_any(&self, markers: &[&str]) -> bool {
        self.lines.iter().any(|(_, line)| {
            markers
                .iter()
                .any(|marker| line.trim_start().starts_with(marker))
        })
    }

    /// Import lines matching `markers` that appear before `line` (1-based).
    pub fn lines_before(&self, line: usize, markers: &[&str]) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(line_no, _)| *line_no < line)
            .filter(|(_, text)| {
                markers
                    .iter()
                    .any(|marker| text.trim_start().starts_with(marker))
            })
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

/// Begin/end delimiter lines for one sandbox execution. The salt makes the
/// pair unguessable by the candidate code, so a printed literal can never
/// forge an artifact boundary.
#[derive(Debug, Clone)]
pub struct MarkerPair {
    pub begin: String,
    pub end: String,
}

impl MarkerPair {
    pub fn salted() -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        Self {
            begin: format!("===DOTHARVEST_BEGIN_{salt}==="),
            end: format!("===DOTHARVEST_END_{salt}==="),
        }
    }
}

/// One structural convention: a pure recognition predicate, span extraction
/// for the excerpt, and the harness template that exports the DOT artifact
/// between the run's markers.
pub trait ConventionAdapter: Send + Sync {
    fn kind(&self) -> ConventionKind;

    fn confidence(&self) -> f64;

    /// Import-line prefixes that gate recognition and are prepended to the
    /// excerpt so the harness is self-contained.
    fn import_markers(&self) -> &'static [&'static str];

    fn recognize(&self, node: &Node<'_>, source: &str, imports: &ImportScan) -> bool;

    fn extract_span(&self, node: &Node<'_>, source: &str) -> SourceSpan;

    fn build_harness(&self, excerpt: &str, markers: &MarkerPair) -> String;
}

/// The fixed adapter set, in recognition order.
pub fn registry() -> Vec<Arc<dyn ConventionAdapter>> {
    vec![
        Arc::new(StateMachineClass),
        Arc::new(GraphMachineCall),
        Arc::new(AutomataCall),
    ]
}

pub(crate) fn node_span(node: &Node<'_>) -> SourceSpan {
    SourceSpan {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
    }
}

/// Name of the invoked callable, for plain-identifier calls only.
pub(crate) fn call_name<'s>(node: &Node<'_>, source: &'s str) -> Option<&'s str> {
    if node.kind() != "call" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    if function.kind() != "identifier" {
        return None;
    }
    function.utf8_text(source.as_bytes()).ok()
}

/// Span of the statement enclosing a recognized call, widened upward over
/// contiguous non-blank, non-comment lines (bounded at 20) so that variable
/// definitions feeding the call travel with the excerpt.
pub(crate) fn widen_call_span(node: &Node<'_>, source: &str) -> SourceSpan {
    let mut statement = *node;
    while let Some(parent) = statement.parent() {
        if parent.kind() == "module" || parent.kind() == "block" {
            break;
        }
        statement = parent;
    }

    let mut span = node_span(&statement);
    let lines: Vec<&str> = source.lines().collect();
    let floor = span.start_line.saturating_sub(20).max(1);
    let mut first = span.start_line;
    while first > floor {
        let previous = lines[first - 2].trim();
        if previous.is_empty() || previous.starts_with('#') {
            break;
        }
        first -= 1;
    }

    if first != span.start_line {
        span.start_byte = line_start_byte(source, first);
        span.start_line = first;
    }
    span
}

fn line_start_byte(source: &str, line: usize) -> usize {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            return offset;
        }
        offset += text.len();
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::{ConventionAdapter, ImportScan, MarkerPair, registry};

    #[test]
    fn registry_kinds_are_unique() {
        let adapters = registry();
        assert_eq!(adapters.len(), 3);
        for (index, adapter) in adapters.iter().enumerate() {
            for other in &adapters[index + 1..] {
                assert_ne!(adapter.kind(), other.kind());
            }
        }
    }

    #[test]
    fn salted_markers_differ_between_executions() {
        let first = MarkerPair::salted();
        let second = MarkerPair::salted();
        assert_ne!(first.begin, second.begin);
        assert_ne!(first.end, second.end);
        assert!(first.begin.starts_with("===DOTHARVEST_BEGIN_"));
        assert!(first.end.starts_with("===DOTHARVEST_END_"));
    }

    #[test]
    fn import_scan_matches_prefixes_before_line() {
        let source = "\
import os
from statemachine import StateMachine

class Later:
    pass

from transitions import Machine
";
        let scan = ImportScan::scan(source);
        assert!(scan.has_any(&["from statemachine import"]));
        assert!(!scan.has_any(&["from automata"]));

        let before = scan.lines_before(4, &["from statemachine import", "import statemachine"]);
        assert_eq!(before, vec!["from statemachine import StateMachine"]);

        let transitions_before = scan.lines_before(4, &["from transitions"]);
        assert!(transitions_before.is_empty());
    }
}
