//! Host-facing pass objects and the function pass manager seam.
//!
//! The host schedules passes; this module gives it the two refprune
//! passes as boxable [`FunctionPass`] objects plus the statistics
//! plumbing. [`add_refprune_passes`] appends them in the required order
//! (normalization before pruning) and hands back the statistics cell.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ir::Function;
use crate::normalize::normalize_refops;
use crate::stats::PruneStats;
use crate::{prune_refops, PruneConfig};

/// A transformation over a single function.
pub trait FunctionPass {
    /// The pass's name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Apply the pass. Returns `true` if the function was modified.
    fn run(&mut self, func: &mut Function) -> bool;
}

/// Runs a sequence of function passes in registration order.
#[derive(Default)]
pub struct FunctionPassManager {
    passes: Vec<Box<dyn FunctionPass>>,
}

impl FunctionPassManager {
    /// Create an empty pass manager.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Append a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    /// Run every pass on `func`, in order.
    /// Returns `true` if any pass modified the function.
    pub fn run_on(&mut self, func: &mut Function) -> bool {
        let mut mutated = false;
        for pass in &mut self.passes {
            if pass.run(func) {
                tracing::debug!(
                    pass = pass.name(),
                    function = %func.name,
                    "pass mutated function",
                );
                mutated = true;
            }
        }
        mutated
    }
}

// The two refprune passes

/// Refop normalization as a pass object. See
/// [`normalize_refops`](crate::normalize_refops).
#[derive(Clone, Copy, Debug, Default)]
pub struct RefNormalizePass;

impl FunctionPass for RefNormalizePass {
    fn name(&self) -> &'static str {
        "nrt-refnormalize"
    }

    fn run(&mut self, func: &mut Function) -> bool {
        normalize_refops(func)
    }
}

/// Shared, snapshot-able statistics cell for [`RefPrunePass`].
///
/// The counters live as long as the handle — the host keeps one per
/// process — and only ever grow. There is no internal synchronization:
/// the host serializes pass execution, so the cell is single-threaded
/// by contract (the handle is deliberately not `Send`).
#[derive(Clone, Debug, Default)]
pub struct PruneStatsHandle {
    inner: Rc<RefCell<PruneStats>>,
}

impl PruneStatsHandle {
    /// Create a fresh cell with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out the current counter values.
    pub fn snapshot(&self) -> PruneStats {
        *self.inner.borrow()
    }
}

/// The pruning pass object: configuration plus accumulated statistics.
pub struct RefPrunePass {
    config: PruneConfig,
    stats: PruneStatsHandle,
}

impl RefPrunePass {
    /// Create the pass with a fresh statistics cell.
    pub fn new(config: PruneConfig) -> Self {
        Self {
            config,
            stats: PruneStatsHandle::new(),
        }
    }

    /// Create the pass updating an existing statistics cell, so several
    /// pass managers can share one set of counters.
    pub fn with_stats(config: PruneConfig, stats: PruneStatsHandle) -> Self {
        Self { config, stats }
    }

    /// The statistics cell this pass updates.
    pub fn stats(&self) -> PruneStatsHandle {
        self.stats.clone()
    }
}

impl FunctionPass for RefPrunePass {
    fn name(&self) -> &'static str {
        "nrt-refprune"
    }

    fn run(&mut self, func: &mut Function) -> bool {
        let mut stats = self.stats.inner.borrow_mut();
        prune_refops(func, &self.config, &mut stats)
    }
}

// Host entry points

/// Append the normalization and pruning passes to `pm`, in that order,
/// with the default configuration. Returns the statistics cell of the
/// pruning pass; the host keeps it for later
/// [`dump_refprune_stats`] calls.
pub fn add_refprune_passes(pm: &mut FunctionPassManager) -> PruneStatsHandle {
    pm.add_pass(Box::new(RefNormalizePass));
    let prune = RefPrunePass::new(PruneConfig::default());
    let handle = prune.stats();
    pm.add_pass(Box::new(prune));
    handle
}

/// Snapshot the counters into a caller-owned struct. When `do_print` is
/// set, additionally emits a single summary line to stderr.
pub fn dump_refprune_stats(stats: &PruneStatsHandle, do_print: bool) -> PruneStats {
    let snap = stats.snapshot();
    if do_print {
        eprintln!(
            "refprune stats per-BB {} diamond {} fanout {} fanout+raise {}",
            snap.basicblock, snap.diamond, snap.fanout, snap.fanout_raise,
        );
    }
    snap
}
