use std::{path::Path, sync::Arc};

use tree_sitter::{Node, Parser};

use crate::adapters::{ConventionAdapter, ImportScan, SourceSpan, registry};

pub mod error;
pub mod types;

use error::{DetectionError, grammar_unavailable, parse_failure};
pub use types::{Candidate, Detection};

/// Static recognizer: parses a Python source file and matches every node
/// against the registered convention adapters. Pure; the excerpts it
/// produces are executed later, elsewhere.
pub struct Detector {
    adapters: Vec<Arc<dyn ConventionAdapter>>,
    confidence_floor: f64,
}

impl Detector {
    pub fn new(adapters: Vec<Arc<dyn ConventionAdapter>>, confidence_floor: f64) -> Self {
        Self {
            adapters,
            confidence_floor,
        }
    }

    pub fn with_registry(confidence_floor: f64) -> Self {
        Self::new(registry(), confidence_floor)
    }

    pub fn adapters(&self) -> &[Arc<dyn ConventionAdapter>] {
        &self.adapters
    }

    /// Detect candidates in one file. A parse failure is an error for the
    /// caller to log and count; it must never abort sibling files.
    pub fn detect(&self, path: &Path, source: &str) -> Result<Detection, DetectionError> {
        if !self.mentions_known_imports(source) {
            return Ok(Detection::empty());
        }

        let imports = ImportScan::scan(source);

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|err| grammar_unavailable(format!("python grammar rejected: {err}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_failure(format!("parser returned no tree for {}", path.display())))?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(parse_failure(format!(
                "syntax errors in {}",
                path.display()
            )));
        }

        let mut detection = Detection::empty();
        visit(root, &mut |node| {
            for adapter in &self.adapters {
                if !adapter.recognize(&node, source, &imports) {
                    continue;
                }
                if adapter.confidence() < self.confidence_floor {
                    detection.low_confidence_discarded += 1;
                    tracing::debug!(
                        target: "detector",
                        kind = %adapter.kind(),
                        confidence = adapter.confidence(),
                        floor = self.confidence_floor,
                        path = %path.display(),
                        "candidate_below_confidence_floor"
                    );
                    break;
                }
                let span = adapter.extract_span(&node, source);
                detection.candidates.push(Candidate {
                    path: path.to_path_buf(),
                    span,
                    kind: adapter.kind(),
                    excerpt: compose_excerpt(source, span, &imports, adapter.import_markers()),
                    confidence: adapter.confidence(),
                });
                break;
            }
        });

        Ok(detection)
    }

    /// Cheap text pre-filter mirroring the adapters' import gates, so files
    /// that cannot match are skipped without an AST.
    fn mentions_known_imports(&self, source: &str) -> bool {
        self.adapters.iter().any(|adapter| {
            adapter
                .import_markers()
                .iter()
                .any(|marker| source.contains(marker))
        })
    }
}

fn visit<'tree>(node: Node<'tree>, f: &mut impl FnMut(Node<'tree>)) {
    f(node);
    for index in 0..node.child_count() {
        if let Some(child) = node.child(index) {
            visit(child, f);
        }
    }
}

/// Excerpt = matching import lines preceding the span, then the span text,
/// so the excerpt runs standalone inside a harness.
fn compose_excerpt(
    source: &str,
    span: SourceSpan,
    imports: &ImportScan,
    markers: &[&str],
) -> String {
    let body = &source[span.start_byte..span.end_byte];
    let import_lines = imports.lines_before(span.start_line, markers);
    if import_lines.is_empty() {
        body.to_string()
    } else {
        format!("{}\n\n{}", import_lines.join("\n"), body)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::adapters::ConventionKind;
    use crate::detector::error::DetectionErrorKind;

    use super::Detector;

    fn detect(source: &str) -> super::Detection {
        Detector::with_registry(0.5)
            .detect(Path::new("sample.py"), source)
            .expect("detection should succeed")
    }

    #[test]
    fn detects_statemachine_subclass_with_imports_in_excerpt() {
        let source = "\
from statemachine import StateMachine, State


class TrafficLight(StateMachine):
    green = State(initial=True)
    yellow = State()
    red = State()

    cycle = green.to(yellow) | yellow.to(red) | red.to(green)
";
        let detection = detect(source);
        assert_eq!(detection.candidates.len(), 1);

        let candidate = &detection.candidates[0];
        assert_eq!(candidate.kind, ConventionKind::StateMachineClass);
        assert_eq!(candidate.confidence, 1.0);
        assert_eq!(candidate.span.start_line, 4);
        assert!(candidate.excerpt.starts_with("from statemachine import StateMachine, State\n\n"));
        assert!(candidate.excerpt.contains("class TrafficLight(StateMachine):"));
        assert!(candidate.excerpt.contains("cycle = green.to(yellow)"));
    }

    #[test]
    fn plain_machine_call_is_not_a_candidate() {
        let source = "\
from transitions import Machine

states = ['solid', 'liquid', 'gas']
machine = Machine(states=states, initial='solid')
";
        let detection = detect(source);
        assert!(detection.candidates.is_empty());
        assert_eq!(detection.low_confidence_discarded, 0);
    }

    #[test]
    fn graph_machine_call_pulls_preceding_definitions_into_excerpt() {
        let source = "\
from transitions.extensions import GraphMachine

states = ['solid', 'liquid', 'gas']
transitions = [['melt', 'solid', 'liquid'], ['evaporate', 'liquid', 'gas']]
machine = GraphMachine(states=states, transitions=transitions, initial='solid')
";
        let detection = detect(source);
        assert_eq!(detection.candidates.len(), 1);

        let candidate = &detection.candidates[0];
        assert_eq!(candidate.kind, ConventionKind::GraphMachineCall);
        assert!(candidate.excerpt.contains("states = ['solid', 'liquid', 'gas']"));
        assert!(candidate.excerpt.contains("machine = GraphMachine("));
        assert!(
            candidate
                .excerpt
                .starts_with("from transitions.extensions import GraphMachine")
        );
    }

    #[test]
    fn automata_call_is_detected_above_floor() {
        let source = "\
from automata.fa.dfa import DFA

dfa = DFA(states={'q0', 'q1'}, initial_state='q0', final_states={'q1'})
";
        let detection = detect(source);
        assert_eq!(detection.candidates.len(), 1);
        assert_eq!(detection.candidates[0].kind, ConventionKind::AutomataCall);
        assert_eq!(detection.candidates[0].confidence, 0.8);
    }

    #[test]
    fn confidence_floor_discards_heuristic_matches() {
        let source = "\
from automata.fa.dfa import DFA

dfa = DFA(states={'q0'}, initial_state='q0', final_states={'q0'})
";
        let detection = Detector::with_registry(0.9)
            .detect(Path::new("sample.py"), source)
            .expect("detection should succeed");
        assert!(detection.candidates.is_empty());
        assert_eq!(detection.low_confidence_discarded, 1);
    }

    #[test]
    fn file_without_known_imports_short_circuits() {
        let source = "\
class TrafficLight(StateMachine):
    pass
";
        let detection = detect(source);
        assert!(detection.candidates.is_empty());
    }

    #[test]
    fn unparseable_source_is_a_parse_failure() {
        let source = "from statemachine import StateMachine\n\nclass (:\n";
        let err = Detector::with_registry(0.5)
            .detect(Path::new("broken.py"), source)
            .expect_err("syntax errors should surface");
        assert_eq!(err.kind, DetectionErrorKind::ParseFailure);
        assert!(err.message.contains("broken.py"));
    }
}
