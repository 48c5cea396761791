//! Redundant reference-count pruning for NRT-managed IR.
//!
//! The runtime front end wraps every value that participates in its
//! non-tracing refcount scheme with conservative `NRT_incref` /
//! `NRT_decref` calls. Many of those pairs protect lifetimes that never
//! escape a region of the control-flow graph and are provably redundant.
//! This crate removes them while preserving refcount soundness on every
//! path, through two passes:
//!
//! - **Normalization** ([`normalize_refops`], [`RefNormalizePass`]) — a
//!   block-local reorder that moves all decrefs after all increfs,
//!   establishing the precondition the pruners rely on.
//! - **Pruning** ([`prune_refops`], [`RefPrunePass`]) — a fixed-point
//!   loop over three elimination strategies: per-block peephole pairs,
//!   diamond pairs bounded by dominance and post-dominance, and fanout
//!   patterns where one incref is released by one decref on every
//!   forward path.
//!
//! # Design
//!
//! Refops are identified purely by textual callee name on direct calls
//! (see [`refop`]); there is no alias reasoning beyond IR value identity
//! of the first call argument, and no instruction other than a refop is
//! ever moved or deleted. Dominance queries go through the
//! [`graph::DominatorTree`] / [`graph::PostDominatorTree`] built once
//! per function — refop deletion never changes the CFG. Every deleted
//! refop is tallied in [`PruneStats`], which the host snapshots through
//! [`dump_refprune_stats`].
//!
//! The passes are single-threaded per function and never fail: they
//! either mutate the IR or leave it unchanged.

mod diamond;
mod fanout;
pub mod graph;
pub mod ir;
mod normalize;
mod pass;
mod per_block;
pub mod refop;
mod stats;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::ir::Function;

pub use graph::{DominatorTree, PostDominatorTree};
pub use normalize::normalize_refops;
pub use pass::{
    add_refprune_passes, dump_refprune_stats, FunctionPass, FunctionPassManager, PruneStatsHandle,
    RefNormalizePass, RefPrunePass,
};
pub use stats::PruneStats;

/// Configuration for the pruning pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneConfig {
    /// Treat raising return blocks (`ret_is_raise` metadata) as fanout
    /// tails that need no decref. Off by default; eliminations routed
    /// through a raising exit are counted in
    /// [`PruneStats::fanout_raise`].
    pub prune_raise_exits: bool,
}

/// Run the pruning pass on one function: a fixed-point loop of
/// {per-block → diamond → fanout} until no sub-pass mutates.
///
/// Expects refop order to be normalized (see [`normalize_refops`]); the
/// combined two-pass pipeline is what [`add_refprune_passes`] installs.
///
/// The dominator and post-dominator trees are built once up front —
/// refop deletion never changes the CFG, so they stay valid for the
/// whole loop. Neither analysis is preserved for later passes of a host
/// pipeline; recompute downstream if needed.
pub fn prune_refops(func: &mut Function, config: &PruneConfig, stats: &mut PruneStats) -> bool {
    let domtree = graph::DominatorTree::build(func);
    let postdomtree = graph::PostDominatorTree::build(func);

    let mut mutated = false;
    loop {
        let mut local = false;
        local |= per_block::prune_block_pairs(func, stats);
        local |= diamond::prune_diamonds(func, &domtree, &postdomtree, stats);
        local |= fanout::prune_fanouts(func, config, stats);
        if !local {
            break;
        }
        mutated = true;
    }

    mutated
}

#[cfg(test)]
mod tests;
