// Interactive editing on a synthesized graph: connect, disconnect and the
// merge policy for list and scalar arguments.

use alloy_graph::error::GraphError;
use alloy_graph::graph::BlockStep;
use alloy_graph::{analyze, export_config, ArgumentPath, Graph, SchemaRegistry};
use std::path::PathBuf;

fn catalog() -> SchemaRegistry {
    SchemaRegistry::from_path(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/catalog.json"),
    )
    .unwrap()
}

fn graph_from(source: &str) -> Graph {
    let result = analyze(source, "test.alloy", &catalog());
    assert!(result.is_clean(), "{:?}", result.diagnostics);
    result.graph
}

fn value(graph: &Graph, id: &str, path: &ArgumentPath) -> String {
    graph.get(id).unwrap().argument_at(path).unwrap().value.clone()
}

const FILES: &str = r#"
local.file "a" { filename = "/a" }
local.file "b" { filename = "/b" }
discovery.kubernetes "k" {
    namespaces { }
}
"#;

#[test]
fn test_second_element_into_list_keeps_first() {
    let mut graph = graph_from(FILES);
    let names = ArgumentPath::nested(vec![BlockStep::new("namespaces", 0)], "names");

    graph.connect("local.file.a", "content", "discovery.kubernetes.k", &names).unwrap();
    assert_eq!(value(&graph, "discovery.kubernetes.k", &names), "[local.file.a.content]");

    graph.connect("local.file.b", "content", "discovery.kubernetes.k", &names).unwrap();
    assert_eq!(
        value(&graph, "discovery.kubernetes.k", &names),
        "[local.file.a.content, local.file.b.content]"
    );
    assert_eq!(graph.edges().len(), 2);
}

#[test]
fn test_mismatch_into_scalar_is_rejected() {
    let mut graph = graph_from(FILES);
    let own = ArgumentPath::nested(vec![BlockStep::new("namespaces", 0)], "own_namespace");
    let before = value(&graph, "discovery.kubernetes.k", &own);

    let err = graph
        .connect("local.file.a", "content", "discovery.kubernetes.k", &own)
        .unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    assert_eq!(value(&graph, "discovery.kubernetes.k", &own), before);
    assert!(graph.edges().is_empty());
}

#[test]
fn test_compatible_lists_concat() {
    let mut graph = graph_from(
        r#"
        discovery.kubernetes "a" { }
        discovery.kubernetes "b" { }
        prometheus.scrape "s" {
            targets = []
            forward_to = []
        }
        "#,
    );
    let targets = ArgumentPath::top("targets");
    graph.connect("discovery.kubernetes.a", "targets", "prometheus.scrape.s", &targets).unwrap();
    assert_eq!(value(&graph, "prometheus.scrape.s", &targets), "discovery.kubernetes.a.targets");

    graph.connect("discovery.kubernetes.b", "targets", "prometheus.scrape.s", &targets).unwrap();
    assert_eq!(
        value(&graph, "prometheus.scrape.s", &targets),
        "concat(discovery.kubernetes.a.targets, discovery.kubernetes.b.targets)"
    );

    let first = graph.edges()[0].id.clone();
    graph.disconnect(&first).unwrap();
    assert_eq!(value(&graph, "prometheus.scrape.s", &targets), "discovery.kubernetes.b.targets");
}

#[test]
fn test_connect_into_new_repeatable_block() {
    let mut graph = graph_from(FILES);
    let id = graph
        .add_component(catalog().get("loki.write").unwrap(), Some("out".to_string()))
        .unwrap();
    assert_eq!(id, "loki.write.out");
    let step = graph.add_block(&id, &[], "endpoint").unwrap();
    let url = ArgumentPath::nested(vec![step.clone()], "url");
    let token = ArgumentPath::nested(vec![step], "bearer_token");
    graph.set_value(&id, &url, "\"http://loki\"").unwrap();
    graph.connect("local.file.a", "content", &id, &token).unwrap();

    let text = export_config(&graph);
    assert!(text.ends_with(
        "loki.write \"out\" {\n    endpoint {\n        url = \"http://loki\"\n        bearer_token = local.file.a.content\n    }\n}\n"
    ));
}

#[test]
fn test_remove_component_cleans_targets() {
    let mut graph = graph_from(
        r#"
        loki.write "a" { }
        loki.source.file "f" {
            targets = []
            forward_to = loki.write.a.receiver
        }
        "#,
    );
    assert_eq!(graph.edges().len(), 1);
    graph.remove_component("loki.write.a").unwrap();

    assert!(graph.edges().is_empty());
    let forward = graph
        .get("loki.source.file.f")
        .unwrap()
        .argument("forward_to")
        .unwrap();
    assert_eq!(forward.value, "");
    assert!(forward.checked);
    assert_eq!(export_config(&graph), "loki.source.file \"f\" {\n    targets = []\n}\n");
}

#[test]
fn test_required_slots_stay_checked() {
    let mut graph = graph_from(FILES);
    let err = graph
        .set_checked("local.file.a", &ArgumentPath::top("filename"), false)
        .unwrap_err();
    assert!(matches!(err, GraphError::RequiredSlot { .. }));
}
