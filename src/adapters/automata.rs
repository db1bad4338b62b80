use tree_sitter::Node;

use crate::adapters::{
    ConventionAdapter, ConventionKind, ImportScan, MarkerPair, SourceSpan, call_name,
    widen_call_span,
};

/// caleb531/automata convention: a `DFA(...)` or `NFA(...)` constructor
/// call. Heuristic: the constructor name alone is ambiguous across
/// libraries, so the match rides on a prior `automata` import and carries a
/// reduced confidence score.
pub struct AutomataCall;

impl ConventionAdapter for AutomataCall {
    fn kind(&self) -> ConventionKind {
        ConventionKind::AutomataCall
    }

    fn confidence(&self) -> f64 {
        0.8
    }

    fn import_markers(&self) -> &'static [&'static str] {
        &["from automata", "import automata"]
    }

    fn recognize(&self, node: &Node<'_>, source: &str, imports: &ImportScan) -> bool {
        matches!(call_name(node, source), Some("DFA") | Some("NFA"))
            && imports.has_any(self.import_markers())
    }

    fn extract_span(&self, node: &Node<'_>, source: &str) -> SourceSpan {
        widen_call_span(node, source)
    }

    fn build_harness(&self, excerpt: &str, markers: &MarkerPair) -> String {
        format!(
            r#"import sys

{excerpt}


def _harvest_export():
    from automata.fa.fa import FA

    for obj in list(globals().values()):
        if isinstance(obj, FA):
            return obj.show_diagram().to_string()
    raise RuntimeError("no automaton instance defined")


try:
    _harvest_dot = _harvest_export()
except Exception as exc:
    print(f"export failed: {{exc}}", file=sys.stderr)
    sys.exit(1)

print("{begin}")
print(_harvest_dot)
print("{end}")
"#,
            excerpt = excerpt,
            begin = markers.begin,
            end = markers.end,
        )
    }
}
