use tree_sitter::Node;

use crate::adapters::{
    ConventionAdapter, ConventionKind, ImportScan, MarkerPair, SourceSpan, call_name,
    widen_call_span,
};

/// transitions convention: a `GraphMachine(...)` instantiation under a
/// `transitions.extensions` import. Plain `Machine(...)` calls carry no
/// graph export and are deliberately not matched.
pub struct GraphMachineCall;

impl ConventionAdapter for GraphMachineCall {
    fn kind(&self) -> ConventionKind {
        ConventionKind::GraphMachineCall
    }

    fn confidence(&self) -> f64 {
        1.0
    }

    fn import_markers(&self) -> &'static [&'static str] {
        &["from transitions", "import transitions"]
    }

    fn recognize(&self, node: &Node<'_>, source: &str, imports: &ImportScan) -> bool {
        call_name(node, source) == Some("GraphMachine")
            && imports.has_any(&["from transitions.extensions"])
    }

    fn extract_span(&self, node: &Node<'_>, source: &str) -> SourceSpan {
        widen_call_span(node, source)
    }

    fn build_harness(&self, excerpt: &str, markers: &MarkerPair) -> String {
        format!(
            r#"import sys

{excerpt}


def _harvest_export():
    from transitions.extensions import GraphMachine

    for obj in list(globals().values()):
        if isinstance(obj, GraphMachine):
            return obj.get_graph().source
    raise RuntimeError("no GraphMachine instance defined")


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
