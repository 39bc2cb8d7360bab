//! Graph document round trips and corrupt-document handling.

use pretty_assertions::assert_eq;

use texgraph_core::color::Color;
use texgraph_core::error::{ErrorCode, GraphError};
use texgraph_core::eval::Evaluator;
use texgraph_core::graph::{Connection, InputRef, NodeGraph, NodeId, OutputRef};
use texgraph_core::params::{ColorStop, Curve, Gradient, ParamSet};
use texgraph_core::persist::{GraphDocument, NodeRecord};

fn material() -> NodeGraph {
    let mut g = NodeGraph::with_resolution(32, 16).unwrap();
    let noise = g
        .add_node(
            "perlin_noise",
            ParamSet::new().with("seed", 42_i64).with("octaves", 3_i64),
        )
        .unwrap();
    let cells = g
        .add_node("cellular", ParamSet::new().with("feature", "f2_minus_f1"))
        .unwrap();
    let ramp = g
        .add_node(
            "colorize",
            ParamSet::new().with(
                "gradient",
                Gradient::new(vec![
                    ColorStop::new(0.0, Color::rgb(0.1, 0.05, 0.0)),
                    ColorStop::new(0.6, Color::rgb(0.5, 0.3, 0.1)),
                    ColorStop::new(1.0, Color::rgb(0.9, 0.7, 0.4)),
                ])
                .unwrap(),
            ),
        )
        .unwrap();
    let curve = g
        .add_node(
            "curves",
            ParamSet::new().with(
                "curve",
                Curve::new(vec![[0.0, 0.0], [0.4, 0.6], [1.0, 1.0]]).unwrap(),
            ),
        )
        .unwrap();
    let add = g.add_node("add", ParamSet::new()).unwrap();
    g.set_input_count(add, 3).unwrap();
    let blend = g
        .add_node(
            "blend",
            ParamSet::new().with("mode", "overlay").with("factor", 0.6),
        )
        .unwrap();

    g.connect(noise, 0, ramp, 0).unwrap();
    g.connect(ramp, 0, curve, 0).unwrap();
    g.connect(noise, 0, add, 0).unwrap();
    g.connect(cells, 0, add, 2).unwrap();
    g.connect(curve, 0, blend, 0).unwrap();
    g.connect(add, 0, blend, 1).unwrap();
    g.set_terminal(Some(blend)).unwrap();
    g.set_position(blend, [320.0, 48.5]).unwrap();
    g.set_export_name(blend, Some("albedo".into())).unwrap();
    g
}

#[test]
fn round_trip_preserves_topology_and_parameters() {
    let g = material();
    let json = g.to_json().unwrap();
    let back = NodeGraph::from_json(&json).unwrap();

    assert_eq!(back.export(), g.export());
    assert_eq!(back.to_json().unwrap(), json);
    assert_eq!(back.resolution(), (32, 16));
    assert_eq!(back.node(NodeId(5)).unwrap().input_count(), 3);
    assert_eq!(back.node(NodeId(6)).unwrap().export_name(), Some("albedo"));
}

#[test]
fn round_trip_evaluates_identically() {
    let g = material();
    let back = NodeGraph::from_json(&g.to_json().unwrap()).unwrap();
    let a = Evaluator::new().evaluate_terminal(&g).unwrap();
    let b = Evaluator::new().evaluate_terminal(&back).unwrap();
    assert_eq!(*a, *b);
}

#[test]
fn save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("material.json");
    let g = material();
    g.save(&path).unwrap();
    let back = NodeGraph::load(&path).unwrap();
    assert_eq!(back.export(), g.export());
}

#[test]
fn missing_node_reference_is_corrupt_and_keeps_loaded_graph() {
    let mut loaded = material();
    let before = loaded.clone();

    let mut doc = loaded.export();
    doc.connections.push(Connection {
        from: OutputRef::new(NodeId(99), 0),
        to: InputRef::new(NodeId(6), 0),
    });
    let err = loaded.load_document(&doc).unwrap_err();
    assert!(matches!(err, GraphError::CorruptGraphData(_)));
    assert_eq!(err.code(), "GRAPH_006");
    assert_eq!(loaded, before);
}

#[test]
fn invalid_records_are_corrupt() {
    let base = material().export();
    let mut cases: Vec<GraphDocument> = Vec::new();

    let mut unknown_kind = base.clone();
    unknown_kind.nodes[0].kind = "hexagons".into();
    cases.push(unknown_kind);

    let mut bad_param = base.clone();
    bad_param.nodes[5].params = ParamSet::new().with("factor", 3.0);
    cases.push(bad_param);

    let mut bad_socket = base.clone();
    bad_socket.connections[0].to.socket = 9;
    cases.push(bad_socket);

    let mut mismatch = base.clone();
    // Color output into the gray height input of a normal map.
    mismatch.nodes.push(NodeRecord {
        id: NodeId(40),
        kind: "normal_map".into(),
        params: ParamSet::new(),
        inputs: None,
        position: [0.0, 0.0],
        export_name: None,
    });
    mismatch.connections.push(Connection {
        from: OutputRef::new(NodeId(6), 0),
        to: InputRef::new(NodeId(40), 0),
    });
    cases.push(mismatch);

    let mut cycle = base.clone();
    // blend feeds back into the curves node upstream of it.
    cycle.connections.push(Connection {
        from: OutputRef::new(NodeId(6), 0),
        to: InputRef::new(NodeId(4), 0),
    });
    cases.push(cycle);

    let mut bad_terminal = base.clone();
    bad_terminal.terminal = Some(NodeId(77));
    cases.push(bad_terminal);

    let mut bad_arity = base.clone();
    bad_arity.nodes[4].inputs = Some(1);
    cases.push(bad_arity);

    let mut bad_resolution = base;
    bad_resolution.resolution = [0, 16];
    cases.push(bad_resolution);

    for doc in &cases {
        let result = NodeGraph::import(doc);
        assert!(
            matches!(result, Err(GraphError::CorruptGraphData(_))),
            "expected CorruptGraphData, got {result:?}"
        );
    }
}

#[test]
fn malformed_json_is_corrupt() {
    for text in [
        "",
        "{",
        r#"{"format_version":1}"#,
        r#"{"format_version":1,"resolution":[8,8],"nodes":[],"extra":true}"#,
        r#"{"format_version":1,"resolution":[8,8],"nodes":[{"id":1,"kind":"constant","params":{"value":"high"}}]}"#,
    ] {
        assert!(
            matches!(NodeGraph::from_json(text), Err(GraphError::CorruptGraphData(_))),
            "{text}"
        );
    }
}

#[test]
fn document_json_shape() {
    let mut g = NodeGraph::with_resolution(8, 8).unwrap();
    let c = g
        .add_node("constant", ParamSet::new().with("value", 0.25))
        .unwrap();
    let inv = g.add_node("invert", ParamSet::new()).unwrap();
    g.connect(c, 0, inv, 0).unwrap();
    g.set_terminal(Some(inv)).unwrap();

    let value: serde_json::Value = serde_json::from_str(&g.to_json().unwrap()).unwrap();
    assert_eq!(value["format_version"], 1);
    assert_eq!(value["resolution"], serde_json::json!([8, 8]));
    assert_eq!(value["terminal"], 2);
    assert_eq!(value["nodes"][0]["kind"], "constant");
    assert_eq!(value["nodes"][0]["params"]["value"]["scalar"], 0.25);
    assert_eq!(
        value["connections"][0],
        serde_json::json!({"from": {"node": 1, "socket": 0}, "to": {"node": 2, "socket": 0}})
    );
}
