use dotharvest::adapters::{
    ConventionAdapter, ConventionKind, ImportScan, MarkerPair, SourceSpan,
};
use tree_sitter::Node;

/// Test convention: recognizes `make_demo_machine(...)` calls and builds a
/// shell-script harness from a fixed template, so sandbox behavior can be
/// driven without a Python interpreter or any FSM library installed.
pub struct ScriptConvention {
    pub script: &'static str,
}

impl ConventionAdapter for ScriptConvention {
    fn kind(&self) -> ConventionKind {
        ConventionKind::GraphMachineCall
    }

    fn confidence(&self) -> f64 {
        1.0
    }

    fn import_markers(&self) -> &'static [&'static str] {
        &["from demo_machines import"]
    }

    fn recognize(&self, node: &Node<'_>, source: &str, _imports: &ImportScan) -> bool {
        node.kind() == "call"
            && node
                .child_by_field_name("function")
                .and_then(|function| function.utf8_text(source.as_bytes()).ok())
                == Some("make_demo_machine")
    }

    fn extract_span(&self, node: &Node<'_>, _source: &str) -> SourceSpan {
        SourceSpan {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
        }
    }

    fn build_harness(&self, _excerpt: &str, markers: &MarkerPair) -> String {
        self.script
            .replace("{begin}", &markers.begin)
            .replace("{end}", &markers.end)
    }
}
