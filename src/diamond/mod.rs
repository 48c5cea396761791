//! Diamond pruning — cross-block pairs bounded by dominance.
//!
//! Removes an `incref(p)` / `decref(p)` pair in distinct blocks when the
//! incref dominates the decref, the decref post-dominates the incref, and
//! no decref on *any* pointer lies in the subgraph between them. Under
//! those conditions every execution of the incref runs exactly one
//! matching decref with no other refcount side effect in between, so the
//! pair is a net no-op.
//!
//! The interference walk rejects decrefs on unrelated pointers too. A
//! decref may free its object and run a destructor that observes the
//! protected value, so only a decref-free interior is known safe.
//!
//! Candidate pairs are scanned in source order (increfs outer, decrefs
//! inner) and the first eligible pair is deleted before rescanning;
//! the result is deterministic for a given input function.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::graph::{DominatorTree, PostDominatorTree};
use crate::ir::{remove_instructions_by_index, BlockId, Function};
use crate::refop::{self, RefOpSite};
use crate::stats::PruneStats;

/// Run one round of diamond pruning over the whole function.
///
/// Returns `true` iff any pair was deleted. Each deleted pair adds two
/// to `stats.diamond`.
pub(crate) fn prune_diamonds(
    func: &mut Function,
    domtree: &DominatorTree,
    postdomtree: &PostDominatorTree,
    stats: &mut PruneStats,
) -> bool {
    let mut pairs = 0u64;

    while let Some((inc, dec)) = find_candidate(func, domtree, postdomtree) {
        let mut removals: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
        removals.entry(inc.block).or_default().insert(inc.instr);
        removals.entry(dec.block).or_default().insert(dec.instr);
        remove_instructions_by_index(func, &removals);

        stats.diamond += 2;
        pairs += 1;
    }

    if pairs > 0 {
        tracing::debug!(
            function = %func.name,
            pairs,
            "diamond pruning removed refop pairs",
        );
    }

    pairs > 0
}

/// Find the first eligible cross-block pair in scan order.
fn find_candidate(
    func: &Function,
    domtree: &DominatorTree,
    postdomtree: &PostDominatorTree,
) -> Option<(RefOpSite, RefOpSite)> {
    let sites = refop::collect_refops(func);

    for inc in sites.iter().filter(|s| s.op.is_incref()) {
        for dec in sites.iter().filter(|s| s.op.is_decref()) {
            // Same-block pairs belong to the per-block pruner.
            if inc.block == dec.block {
                continue;
            }
            if inc.op.operand() != dec.op.operand() {
                continue;
            }

            let inc_bb = func.blocks[inc.block].id;
            let dec_bb = func.blocks[dec.block].id;
            if !domtree.dominates(inc_bb, dec_bb) {
                continue;
            }
            if !postdomtree.dominates(dec_bb, inc_bb) {
                continue;
            }

            if has_decref_between(func, inc_bb, dec_bb) {
                continue;
            }

            return Some((*inc, *dec));
        }
    }

    None
}

/// Is there a decref (on any pointer) in the subgraph between `head` and
/// `tail`?
///
/// DFS from `head` through CFG successors without revisiting blocks,
/// never descending into `tail`. The head block itself is inspected: a
/// decref next to the candidate incref interferes just the same.
///
/// Precondition: `head` dominates `tail`, so every walked path either
/// reaches `tail` or leaves through it; back edges into `head` are cut
/// off by the visited set.
fn has_decref_between(func: &Function, head: BlockId, tail: BlockId) -> bool {
    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut stack = vec![head.index()];

    while let Some(cur) = stack.pop() {
        if !visited.insert(cur) {
            continue;
        }

        if refop::block_has_any_decref(&func.blocks[cur]) {
            return true;
        }

        for succ in func.blocks[cur].terminator.successors() {
            if succ != tail {
                stack.push(succ.index());
            }
        }
    }

    false
}
