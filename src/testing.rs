//! Test utilities: canned networks and plan assertions.
//!
//! Used by the crate's own integration tests and handy for testing
//! code that builds on flowplan: fixtures give you small, well-known
//! graphs; the assertion helpers compare compiled step sequences
//! against compact string forms (`"op1"`, `"evict(x)"`).
//!
//! ```
//! use flowplan::testing::{assert_steps, diamond_network};
//!
//! let net = diamond_network();
//! let plan = net.compile(Some(&["x"]), Some(&["y"]), None).unwrap();
//! assert_steps(&plan, &["op1", "op2", "evict(x)", "op3", "evict(a)", "evict(b)"]);
//! ```

use indexmap::IndexSet;

use crate::dep::Dep;
use crate::network::Network;
use crate::op::Operation;
use crate::plan::ExecutionPlan;

/// The classic diamond: `op1(x→a)`, `op2(x→b)`, `op3(a,b→y)`.
pub fn diamond_ops() -> Vec<Operation> {
    vec![
        Operation::new("op1").needs(["x"]).provides(["a"]),
        Operation::new("op2").needs(["x"]).provides(["b"]),
        Operation::new("op3").needs(["a", "b"]).provides(["y"]),
    ]
}

/// [`diamond_ops`] assembled into a network.
pub fn diamond_network() -> Network {
    Network::new(diamond_ops()).expect("diamond network")
}

/// A two-op chain through a hierarchical name:
/// `producer(→root/leaf)`, `consumer(root/leaf→out)`.
pub fn subdoc_ops() -> Vec<Operation> {
    vec![
        Operation::new("producer").provides(["root/leaf"]),
        Operation::new("consumer").needs(["root/leaf"]).provides(["out"]),
    ]
}

/// [`subdoc_ops`] assembled into a network.
pub fn subdoc_network() -> Network {
    Network::new(subdoc_ops()).expect("subdoc network")
}

/// The plan's steps in compact string form: operation names and
/// `evict(<name>)` entries, in order.
pub fn step_strings(plan: &ExecutionPlan) -> Vec<String> {
    plan.steps().iter().map(ToString::to_string).collect()
}

/// The plan's operation names only, in order.
pub fn op_names(plan: &ExecutionPlan) -> Vec<String> {
    plan.operations().map(|op| op.name.clone()).collect()
}

/// The identities of a dep set, in insertion order.
pub fn dep_idents(deps: &IndexSet<Dep>) -> Vec<String> {
    deps.iter().map(Dep::ident).collect()
}

/// Assert the plan's step sequence equals `expected` (compact forms).
///
/// # Panics
///
/// On mismatch, with both sequences in the message.
#[track_caller]
pub fn assert_steps(plan: &ExecutionPlan, expected: &[&str]) {
    let actual = step_strings(plan);
    assert_eq!(
        actual, expected,
        "plan steps mismatch:\n  actual:   {actual:?}\n  expected: {expected:?}"
    );
}

/// Assert the plan's operation names equal `expected`, ignoring
/// evictions.
#[track_caller]
pub fn assert_op_names(plan: &ExecutionPlan, expected: &[&str]) {
    let actual = op_names(plan);
    assert_eq!(
        actual, expected,
        "plan operations mismatch:\n  actual:   {actual:?}\n  expected: {expected:?}"
    );
}
