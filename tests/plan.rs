//! Tests for plan validation and explanation.

use flowplan::testing::diamond_network;
use flowplan::{GraphError, Network, Operation, StepKind};

#[test]
fn validate_accepts_matching_arguments() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    plan.validate(&["x"], Some(&["y"]))?;
    Ok(())
}

#[test]
fn validate_unsolvable_graph() -> anyhow::Result<()> {
    let net = diamond_network();
    // Nothing given: every operation is pruned as unsatisfied.
    let plan = net.compile(Some(&[]), Some(&["y"]), None)?;
    let err = plan.validate(&[], Some(&["y"])).unwrap_err();
    assert!(matches!(err, GraphError::UnsolvableGraph { .. }), "{err}");
    assert!(err.to_string().contains("Unsolvable graph"));
    Ok(())
}

#[test]
fn validate_needs_more_inputs() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let err = plan.validate(&[], Some(&["y"])).unwrap_err();
    match &err {
        GraphError::NeedsMoreInputs(missing) => assert_eq!(missing, &["x".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Plan needs more inputs"));
    Ok(())
}

#[test]
fn validate_optional_needs_may_stay_missing() -> anyhow::Result<()> {
    let net = Network::new([
        Operation::new("op")
            .needs([flowplan::Dep::new("x"), flowplan::Dep::new("extra").optional()])
            .provides(["y"]),
    ])?;
    let plan = net.compile(Some(&["x", "extra"]), Some(&["y"]), None)?;
    // `extra` is optional, so giving only `x` still validates.
    plan.validate(&["x"], Some(&["y"]))?;
    Ok(())
}

#[test]
fn validate_unreachable_outputs() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let err = plan.validate(&["x"], Some(&["a"])).unwrap_err();
    match &err {
        GraphError::UnreachableOutputs { outputs, .. } => {
            assert_eq!(outputs, &["a".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Unreachable outputs"));
    Ok(())
}

#[test]
fn explain_reports_steps_and_counts() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let explanation = plan.explain();

    assert_eq!(explanation.op_count, 3);
    assert_eq!(explanation.evict_count, 3);
    assert_eq!(explanation.steps.len(), 6);
    assert_eq!(explanation.needs, ["x"]);
    assert_eq!(explanation.provides, ["y"]);
    assert!(explanation.asked_outs);

    let first = &explanation.steps[0];
    assert_eq!(first.step, 1);
    assert_eq!(first.kind, StepKind::Operation);
    assert_eq!(first.name, "op1");
    assert_eq!(first.needs, ["x"]);
    assert_eq!(first.provides, ["a"]);

    let evict = explanation
        .steps
        .iter()
        .find(|s| s.kind == StepKind::Evict)
        .expect("an eviction step");
    assert_eq!(evict.name, "x");
    Ok(())
}

#[test]
fn explain_renders_and_serializes() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let explanation = plan.explain();

    let rendered = explanation.to_string();
    assert!(rendered.contains("EXECUTION PLAN"), "{rendered}");
    assert!(rendered.contains("Step 1: op1"), "{rendered}");
    assert!(rendered.contains("evict(x)"), "{rendered}");

    let json = serde_json::to_string(&explanation)?;
    assert!(json.contains("\"op_count\":3"), "{json}");
    Ok(())
}

#[test]
fn plan_display_lists_steps() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let s = plan.to_string();
    assert!(s.contains("x6 steps"), "{s}");
    assert!(s.contains("op1"), "{s}");
    assert!(s.contains("evict(x)"), "{s}");
    Ok(())
}
