//! End-to-end evaluation behavior: cache reuse, determinism, fan-out,
//! failure propagation and the version-guarded commit.

use std::sync::Arc;

use texgraph_core::error::EvalError;
use texgraph_core::eval::{CancelToken, Evaluator, NodeState};
use texgraph_core::graph::{NodeGraph, NodeId};
use texgraph_core::params::ParamSet;
use texgraph_core::ImageBuffer;

const SIZE: u32 = 32;

/// noise(seed 42) -> blend(multiply, 0.5) layer socket; blend is terminal.
fn noise_blend() -> (NodeGraph, NodeId, NodeId) {
    let mut g = NodeGraph::with_resolution(SIZE, SIZE).unwrap();
    let noise = g
        .add_node("perlin_noise", ParamSet::new().with("seed", 42_i64))
        .unwrap();
    let blend = g
        .add_node(
            "blend",
            ParamSet::new().with("mode", "multiply").with("factor", 0.5),
        )
        .unwrap();
    g.connect(noise, 0, blend, 1).unwrap();
    g.set_terminal(Some(blend)).unwrap();
    (g, noise, blend)
}

fn pixels(image: &ImageBuffer) -> Vec<[f64; 4]> {
    image
        .to_color()
        .data
        .iter()
        .map(|c| [c.r, c.g, c.b, c.a])
        .collect()
}

#[test]
fn factor_change_recomputes_only_blend() {
    let (mut g, noise, blend) = noise_blend();
    let eval = Evaluator::new();

    let first = eval.evaluate(&g.snapshot_terminal().unwrap());
    assert_eq!(first.computed, vec![noise, blend]);
    let noise_img = eval.cached_output(&g, noise, 0).unwrap();
    let before = first.output(blend, 0).unwrap();

    g.set_parameter(blend, "factor", 0.8).unwrap();
    let second = eval.evaluate(&g.snapshot_terminal().unwrap());
    assert_eq!(second.computed, vec![blend]);
    assert_eq!(second.reused, vec![noise]);
    let after = second.output(blend, 0).unwrap();

    // Base is the 0.5 gray default, so multiply gives 0.5 * n and the blend
    // yields 0.5 * (1 - f) + 0.5 * n * f in every color channel.
    let n = noise_img.as_grayscale().unwrap();
    let (b, a) = (pixels(&before), pixels(&after));
    let mut changed = 0;
    for (i, (pb, pa)) in b.iter().zip(&a).enumerate() {
        let v = n.data[i];
        for ch in 0..3 {
            assert!((pb[ch] - (0.5 * 0.5 + 0.5 * v * 0.5)).abs() < 1e-12);
            assert!((pa[ch] - (0.5 * 0.2 + 0.5 * v * 0.8)).abs() < 1e-12);
        }
        assert_eq!(pb[3], pa[3], "alpha does not depend on the factor");
        if pb[0] != pa[0] {
            changed += 1;
        }
    }
    assert!(changed > 0);
}

#[test]
fn removing_source_falls_back_to_default() {
    let (mut g, noise, blend) = noise_blend();
    let eval = Evaluator::new();
    eval.evaluate(&g.snapshot_terminal().unwrap());

    g.remove_node(noise).unwrap();
    let report = eval.evaluate(&g.snapshot_terminal().unwrap());
    assert_eq!(report.computed, vec![blend]);
    // White layer multiplied into the 0.5 base at factor 0.5 is the base.
    let image = report.output(blend, 0).unwrap();
    for p in pixels(&image) {
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert_eq!(p[3], 1.0);
    }
}

#[test]
fn unchanged_graph_is_fully_reused() {
    let (g, ..) = noise_blend();
    let eval = Evaluator::new();
    eval.evaluate(&g.snapshot_all());
    let again = eval.evaluate(&g.snapshot_all());
    assert!(again.computed.is_empty());
    assert_eq!(again.reused.len(), 2);
}

#[test]
fn evaluation_is_bit_identical() {
    let (g, _, blend) = noise_blend();
    let a = Evaluator::new().evaluate_terminal(&g).unwrap();
    let b = Evaluator::new().evaluate_terminal(&g).unwrap();
    assert_eq!(*a, *b);

    let copy = NodeGraph::from_json(&g.to_json().unwrap()).unwrap();
    let c = Evaluator::new().evaluate_terminal(&copy).unwrap();
    assert_eq!(*a, *c);
    assert_eq!(copy.terminal(), Some(blend));
}

#[test]
fn fan_out_source_runs_once() {
    let mut g = NodeGraph::with_resolution(SIZE, SIZE).unwrap();
    let noise = g.add_node("cellular", ParamSet::new()).unwrap();
    let consumers: Vec<NodeId> = ["invert", "blur", "levels", "normal_map"]
        .into_iter()
        .map(|kind| {
            let id = g.add_node(kind, ParamSet::new()).unwrap();
            g.connect(noise, 0, id, 0).unwrap();
            id
        })
        .collect();

    let eval = Evaluator::new();
    let report = eval.evaluate(&g.snapshot(&consumers).unwrap());
    assert_eq!(report.computed.iter().filter(|&&n| n == noise).count(), 1);
    assert_eq!(report.computed.len(), 5);
    for id in &consumers {
        assert!(report.output(*id, 0).is_ok());
    }
}

#[test]
fn failure_propagates_and_is_cached() {
    let mut g = NodeGraph::with_resolution(8, 8).unwrap();
    let src = g.add_node("checker", ParamSet::new()).unwrap();
    let levels = g
        .add_node(
            "levels",
            ParamSet::new().with("in_low", 0.5).with("in_high", 0.5),
        )
        .unwrap();
    let invert = g.add_node("invert", ParamSet::new()).unwrap();
    g.connect(src, 0, levels, 0).unwrap();
    g.connect(levels, 0, invert, 0).unwrap();

    let eval = Evaluator::new();
    let snapshot = g.snapshot(&[invert]).unwrap();
    let report = eval.evaluate(&snapshot);
    assert_eq!(report.computed, vec![src, levels]);
    assert_eq!(report.failed, vec![levels, invert]);
    assert_eq!(
        report.output(invert, 0).unwrap_err(),
        EvalError::UpstreamFailure {
            node: invert,
            origin: levels
        }
    );
    assert!(matches!(
        eval.node_state(&snapshot, levels),
        Some(NodeState::Failed { .. })
    ));
    assert_eq!(
        eval.node_state(&snapshot, invert),
        Some(NodeState::UpstreamFailed { origin: levels })
    );

    // A failure is a result too: nothing reruns until something changes.
    let again = eval.evaluate(&g.snapshot(&[invert]).unwrap());
    assert!(again.computed.is_empty());

    g.set_parameter(levels, "in_high", 1.0).unwrap();
    let fixed = eval.evaluate(&g.snapshot(&[invert]).unwrap());
    assert_eq!(fixed.computed, vec![levels, invert]);
    assert!(fixed.output(invert, 0).is_ok());
    assert!(fixed.failed.is_empty());
}

#[test]
fn failure_in_one_branch_spares_the_other() {
    let mut g = NodeGraph::with_resolution(8, 8).unwrap();
    let src = g.add_node("constant", ParamSet::new()).unwrap();
    let bad = g
        .add_node(
            "levels",
            ParamSet::new().with("in_low", 0.2).with("in_high", 0.2),
        )
        .unwrap();
    let good = g.add_node("invert", ParamSet::new()).unwrap();
    g.connect(src, 0, bad, 0).unwrap();
    g.connect(src, 0, good, 0).unwrap();

    let report = Evaluator::new().evaluate(&g.snapshot(&[bad, good]).unwrap());
    assert!(matches!(
        report.output(bad, 0),
        Err(EvalError::EvaluationFailure { node, .. }) if node == bad
    ));
    assert!(report.output(good, 0).is_ok());
}

#[test]
fn stale_pass_cannot_overwrite_newer_result() {
    let (mut g, noise, blend) = noise_blend();
    let eval = Evaluator::new();

    let old = g.snapshot_terminal().unwrap();
    g.set_parameter(noise, "seed", 7_i64).unwrap();
    let new = g.snapshot_terminal().unwrap();

    let fresh = eval.evaluate(&new);
    let fresh_img = fresh.output(blend, 0).unwrap();
    let stale = eval.evaluate(&old);
    assert_eq!(stale.rejected_commits, 2);
    // The stale pass still reports what its own snapshot produces.
    assert_ne!(*stale.output(blend, 0).unwrap(), *fresh_img);

    // The cache still holds the newer results.
    let current = eval.cached_output(&g, blend, 0).unwrap();
    assert!(Arc::ptr_eq(&current, &fresh_img));
    assert!(eval.dirty_nodes(&g.snapshot_terminal().unwrap()).is_empty());
}

#[test]
fn same_version_newer_epoch_wins() {
    let (g, ..) = noise_blend();
    let eval = Evaluator::new();
    let a = g.snapshot_terminal().unwrap();
    let b = g.snapshot_terminal().unwrap();
    assert!(b.epoch() > a.epoch());

    eval.evaluate(&b);
    let report = eval.evaluate(&a);
    // Versions match, so the older snapshot reuses instead of recomputing.
    assert!(report.computed.is_empty());
    assert_eq!(report.rejected_commits, 0);
}

#[test]
fn cancelled_pass_leaves_cache_consistent() {
    let (g, noise, blend) = noise_blend();
    let eval = Evaluator::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let report = eval.evaluate_with(&g.snapshot_terminal().unwrap(), &cancel);
    assert_eq!(report.abandoned, Some(noise));
    assert_eq!(report.output(blend, 0).unwrap_err(), EvalError::Abandoned(blend));
    assert!(eval.cache().is_empty());

    let full = eval.evaluate(&g.snapshot_terminal().unwrap());
    assert_eq!(full.computed, vec![noise, blend]);
}

#[test]
fn deleted_nodes_are_retired() {
    let mut g = NodeGraph::with_resolution(8, 8).unwrap();
    let a = g.add_node("constant", ParamSet::new()).unwrap();
    let b = g.add_node("checker", ParamSet::new()).unwrap();
    let eval = Evaluator::new();
    eval.evaluate(&g.snapshot_all());
    assert_eq!(eval.cache().len(), 2);

    g.remove_node(b).unwrap();
    eval.evaluate(&g.snapshot(&[a]).unwrap());
    assert_eq!(eval.cache().len(), 1);
    assert!(eval.cache().get(b).is_none());
}

#[test]
fn variadic_add_sums_inputs() {
    let mut g = NodeGraph::with_resolution(4, 4).unwrap();
    let add = g.add_node("add", ParamSet::new().with("clamp", false)).unwrap();
    g.set_input_count(add, 3).unwrap();
    for (socket, value) in [0.25, 0.5, 0.75].into_iter().enumerate() {
        let c = g
            .add_node("constant", ParamSet::new().with("value", value))
            .unwrap();
        g.connect(c, 0, add, socket).unwrap();
    }
    g.set_terminal(Some(add)).unwrap();
    let image = Evaluator::new().evaluate_terminal(&g).unwrap();
    let gray = image.as_grayscale().unwrap();
    assert!((gray.get(2, 2) - 1.5).abs() < 1e-12);
}
