//! Global execution flags consulted while compiling and running plans.
//!
//! The compiler itself reads only [`is_skip_evictions`] (at sequencing
//! time) and [`is_debug`] (diagnostic strings). The rest -- abort,
//! parallel, marshal, endure, reschedule -- are policy bits owned by the
//! execution engine; they live here so pipelines and operations can
//! layer their own tristate values over the global ones with
//! [`first_solid`].
//!
//! Flags are plain process-wide atomics. Tristate flags distinguish
//! "unset" (`None`) from an explicit `true`/`false`, matching the
//! per-operation `Option<bool>` policy fields. Scoped variants return a
//! guard restoring the previous value on drop:
//!
//! ```
//! use flowplan::config;
//!
//! {
//!     let _guard = config::evictions_skipped(true);
//!     assert!(config::is_skip_evictions());
//! }
//! assert!(!config::is_skip_evictions());
//! ```

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};

const UNSET: i8 = -1;
const OFF: i8 = 0;
const ON: i8 = 1;

static ABORT: AtomicBool = AtomicBool::new(false);
static DEBUG: AtomicI8 = AtomicI8::new(UNSET);
static SKIP_EVICTIONS: AtomicI8 = AtomicI8::new(UNSET);
static PARALLEL_TASKS: AtomicI8 = AtomicI8::new(UNSET);
static MARSHAL_TASKS: AtomicI8 = AtomicI8::new(UNSET);
static ENDURE_OPERATIONS: AtomicI8 = AtomicI8::new(UNSET);
static RESCHEDULE_OPERATIONS: AtomicI8 = AtomicI8::new(UNSET);

/// Environment variable seeding the default of the debug flag.
pub const DEBUG_ENV_VAR: &str = "FLOWPLAN_DEBUG";

fn env_debug_default() -> bool {
    static DEFAULT: OnceLock<bool> = OnceLock::new();
    *DEFAULT.get_or_init(|| {
        std::env::var(DEBUG_ENV_VAR)
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                !(v.is_empty() || ["0", "false", "off", "no"].contains(&v.as_str()))
            })
            .unwrap_or(false)
    })
}

fn store(slot: &AtomicI8, enabled: Option<bool>) -> Option<bool> {
    let prev = slot.swap(
        match enabled {
            None => UNSET,
            Some(false) => OFF,
            Some(true) => ON,
        },
        Ordering::SeqCst,
    );
    load_raw(prev)
}

fn load_raw(raw: i8) -> Option<bool> {
    match raw {
        UNSET => None,
        OFF => Some(false),
        _ => Some(true),
    }
}

fn load(slot: &AtomicI8) -> Option<bool> {
    load_raw(slot.load(Ordering::SeqCst))
}

/// Restores a tristate flag to its previous value when dropped.
///
/// Returned by the scoped flag functions ([`evictions_skipped`],
/// [`debug_enabled`], …); hold it for the duration of the override.
#[must_use = "the previous flag value is restored when the guard drops"]
pub struct FlagGuard {
    slot: &'static AtomicI8,
    prev: Option<bool>,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        store(self.slot, self.prev);
    }
}

fn scoped(slot: &'static AtomicI8, enabled: Option<bool>) -> FlagGuard {
    let prev = store(slot, enabled);
    FlagGuard { slot, prev }
}

/* ---------- abort ---------- */

/// Signal all currently and future executing plans to halt.
///
/// The flag is reset by the execution engine before each fresh run, or
/// manually via [`reset_abort`].
pub fn abort_run() {
    ABORT.store(true, Ordering::SeqCst);
}

/// Reset the abort flag, permitting plan executions to proceed.
pub fn reset_abort() {
    ABORT.store(false, Ordering::SeqCst);
}

/// True if plan executions have been signaled to stop.
pub fn is_abort() -> bool {
    ABORT.load(Ordering::SeqCst)
}

/* ---------- debug ---------- */

/// Override the debug flag; `None` falls back to the
/// [`DEBUG_ENV_VAR`] environment default.
///
/// When enabled, network/plan `Debug`/display strings include
/// per-child details instead of one-line summaries.
pub fn set_debug(enabled: Option<bool>) {
    store(&DEBUG, enabled);
}

/// See [`set_debug`].
pub fn is_debug() -> bool {
    load(&DEBUG).unwrap_or_else(env_debug_default)
}

/// Scoped [`set_debug`], restoring the previous value on drop.
pub fn debug_enabled(enabled: bool) -> FlagGuard {
    scoped(&DEBUG, Some(enabled))
}

/* ---------- evictions ---------- */

/// When true, plans keep all intermediate values: the sequencer emits
/// no eviction instructions regardless of asked outputs.
pub fn set_skip_evictions(enabled: Option<bool>) {
    store(&SKIP_EVICTIONS, enabled);
}

/// See [`set_skip_evictions`].
pub fn is_skip_evictions() -> bool {
    load(&SKIP_EVICTIONS).unwrap_or(false)
}

/// Scoped [`set_skip_evictions`], restoring the previous value on drop.
pub fn evictions_skipped(enabled: bool) -> FlagGuard {
    scoped(&SKIP_EVICTIONS, Some(enabled))
}

/* ---------- engine policy tristates (pass-through) ---------- */

/// Force (or unset, with `None`) parallel execution for all operations.
pub fn set_parallel_tasks(enabled: Option<bool>) {
    store(&PARALLEL_TASKS, enabled);
}

/// See [`set_parallel_tasks`].
pub fn is_parallel_tasks() -> Option<bool> {
    load(&PARALLEL_TASKS)
}

/// Scoped [`set_parallel_tasks`].
pub fn tasks_in_parallel(enabled: bool) -> FlagGuard {
    scoped(&PARALLEL_TASKS, Some(enabled))
}

/// Force (or unset) marshalling of inputs/outputs for parallel operations.
pub fn set_marshal_tasks(enabled: Option<bool>) {
    store(&MARSHAL_TASKS, enabled);
}

/// See [`set_marshal_tasks`].
pub fn is_marshal_tasks() -> Option<bool> {
    load(&MARSHAL_TASKS)
}

/// Scoped [`set_marshal_tasks`].
pub fn tasks_marshalled(enabled: bool) -> FlagGuard {
    scoped(&MARSHAL_TASKS, Some(enabled))
}

/// Force (or unset) endurance: keep executing even if some operations fail.
pub fn set_endure_operations(enabled: Option<bool>) {
    store(&ENDURE_OPERATIONS, enabled);
}

/// See [`set_endure_operations`].
pub fn is_endure_operations() -> Option<bool> {
    load(&ENDURE_OPERATIONS)
}

/// Scoped [`set_endure_operations`].
pub fn operations_endured(enabled: bool) -> FlagGuard {
    scoped(&ENDURE_OPERATIONS, Some(enabled))
}

/// Force (or unset) rescheduling for operations returning partial outputs.
pub fn set_reschedule_operations(enabled: Option<bool>) {
    store(&RESCHEDULE_OPERATIONS, enabled);
}

/// See [`set_reschedule_operations`].
pub fn is_reschedule_operations() -> Option<bool> {
    load(&RESCHEDULE_OPERATIONS)
}

/// Scoped [`set_reschedule_operations`].
pub fn operations_rescheduled(enabled: bool) -> FlagGuard {
    scoped(&RESCHEDULE_OPERATIONS, Some(enabled))
}

/// Combine layered tristate policies: the first `Some` wins, else `default`.
///
/// Layering order is caller-chosen, typically
/// `first_solid(false, &[global, pipeline, operation])` reversed to
/// taste by the execution engine.
pub fn first_solid(default: bool, tristates: &[Option<bool>]) -> bool {
    tristates.iter().find_map(|t| *t).unwrap_or(default)
}
