use tree_sitter::Node;

use crate::adapters::{
    ConventionAdapter, ConventionKind, ImportScan, MarkerPair, SourceSpan, node_span,
};

/// python-statemachine convention: a class whose base list names
/// `StateMachine`. The library renders its own graph, so every structural
/// match is exportable.
pub struct StateMachineClass;

impl ConventionAdapter for StateMachineClass {
    fn kind(&self) -> ConventionKind {
        ConventionKind::StateMachineClass
    }

    fn confidence(&self) -> f64 {
        1.0
    }

    fn import_markers(&self) -> &'static [&'static str] {
        &["from statemachine import", "import statemachine"]
    }

    fn recognize(&self, node: &Node<'_>, source: &str, imports: &ImportScan) -> bool {
        if node.kind() != "class_definition" || !imports.has_any(self.import_markers()) {
            return false;
        }
        let Some(superclasses) = node.child_by_field_name("superclasses") else {
            return false;
        };
        let mut cursor = superclasses.walk();
        superclasses.named_children(&mut cursor).any(|base| {
            base.kind() == "identifier"
                && base.utf8_text(source.as_bytes()) == Ok("StateMachine")
        })
    }

    fn extract_span(&self, node: &Node<'_>, _source: &str) -> SourceSpan {
        node_span(node)
    }

    fn build_harness(&self, excerpt: &str, markers: &MarkerPair) -> String {
        format!(
            r#"import sys

{excerpt}


def _harvest_export():
    import inspect

    from statemachine import StateMachine

    for obj in list(globals().values()):
        if inspect.isclass(obj) and issubclass(obj, StateMachine) and obj is not StateMachine:
            return obj()._graph().to_string()
    raise RuntimeError("no StateMachine subclass defined")


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

#[cfg(test)]
mod tests {
    use crate::adapters::{ConventionAdapter, MarkerPair};

    use super::StateMachineClass;

    #[test]
    fn harness_embeds_excerpt_between_preamble_and_export() {
        let markers = MarkerPair::salted();
        let harness = StateMachineClass.build_harness(
            "class TrafficLight(StateMachine):\n    pass",
            &markers,
        );

        assert!(harness.contains("class TrafficLight(StateMachine):"));
        assert!(harness.contains("_graph().to_string()"));
        assert!(harness.contains(&format!("print(\"{}\")", markers.begin)));
        assert!(harness.contains(&format!("print(\"{}\")", markers.end)));
        let begin_at = harness.find(&markers.begin).expect("begin marker present");
        let end_at = harness.find(&markers.end).expect("end marker present");
        assert!(begin_at < end_at);
    }
}
