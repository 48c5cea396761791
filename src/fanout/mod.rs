//! Fanout pruning — one incref released on every forward path.
//!
//! The most general of the three pruners. A fanout pattern is a single
//! `incref(p)` in a *head* block whose protection is released by exactly
//! one matching `decref(p)` on every forward path, in a set of *tail*
//! blocks that form an antichain (no tail reachable from another tail
//! without passing back through the head). When the pattern holds, the
//! incref and the first matching decref in each tail are all deleted.
//!
//! Detection runs in two phases per candidate incref:
//!
//! 1. **Forward discovery** — a path-sensitive DFS from the head's
//!    successors collects tail blocks. Every branch of every walked block
//!    must end in a tail; a back edge to the head aborts the candidate,
//!    while re-entering any other block on the current path counts as
//!    covered (that branch is handled by the path already walking it).
//!    The path may not exceed [`MAX_PATH_LEN`] blocks.
//! 2. **Non-overlap verification** — a reverse walk from each tail must
//!    stop at the head on every branch. Reaching the function entry means
//!    the tail can execute without the incref; reaching another tail
//!    means two tails can release the same protection on one path.
//!    Either finding aborts the candidate.
//!
//! The two phases are only sound together: phase 1 alone would accept a
//! tail that is also reachable around the head.
//!
//! Heads that contain any decref are skipped outright — pairing across
//! an ambiguous local ordering is never attempted.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};

use crate::ir::{remove_instructions_by_index, Function, Operand};
use crate::refop::{self, RefOp};
use crate::stats::PruneStats;
use crate::PruneConfig;

/// Hard bound on the forward-walk path stack, in blocks.
///
/// A pragmatic cut-off, not a soundness boundary: raising it enlarges the
/// set of prunable patterns at higher analysis cost. It also caps the
/// recursion depth of the walk.
pub(crate) const MAX_PATH_LEN: usize = 15;

/// A verified fanout pattern for one incref.
struct FanoutMatch {
    /// Tail block indices in discovery order.
    tails: TailSet,
    /// Whether any tail is a raising exit rather than a decref block.
    through_raise: bool,
}

/// Insertion-ordered set of tail block indices.
///
/// Order matters: elimination iterates the set, and discovery order is
/// part of the pass's deterministic contract. The backing `Vec` stays
/// tiny (bounded by the walk depth), so membership is a linear scan.
#[derive(Default)]
struct TailSet {
    blocks: Vec<usize>,
}

impl TailSet {
    fn insert(&mut self, block: usize) {
        if !self.blocks.contains(&block) {
            self.blocks.push(block);
        }
    }

    fn contains(&self, block: usize) -> bool {
        self.blocks.contains(&block)
    }
}

/// Run one round of fanout pruning over the whole function.
///
/// Returns `true` iff any refop was deleted. Each deletion (tail decrefs
/// and the head incref alike) adds one to `stats.fanout`, or to
/// `stats.fanout_raise` for candidates routed through a raising exit.
pub(crate) fn prune_fanouts(
    func: &mut Function,
    config: &PruneConfig,
    stats: &mut PruneStats,
) -> bool {
    let predecessors = crate::graph::compute_predecessors(func);
    let mut mutated = false;

    for block_idx in 0..func.blocks.len() {
        let mut i = 0;
        while i < func.blocks[block_idx].body.len() {
            let Some(RefOp::Incref(ptr)) = refop::as_refop(&func.blocks[block_idx].body[i]) else {
                i += 1;
                continue;
            };

            // A decref anywhere in the head makes the local ordering
            // ambiguous; skip the candidate.
            if refop::block_has_any_decref(&func.blocks[block_idx]) {
                i += 1;
                continue;
            }

            match find_fanout(func, &predecessors, config, block_idx, ptr) {
                Some(m) => {
                    eliminate(func, stats, block_idx, i, ptr, &m);
                    mutated = true;
                    // The incref at `i` is gone; the next candidate now
                    // occupies this index.
                }
                None => i += 1,
            }
        }
    }

    mutated
}

/// Delete the first related decref in each tail, then the incref itself.
fn eliminate(
    func: &mut Function,
    stats: &mut PruneStats,
    head: usize,
    incref_idx: usize,
    ptr: Operand,
    m: &FanoutMatch,
) {
    let mut removals: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
    let mut deleted = 0u64;

    for &tail in &m.tails.blocks {
        // Raising tails carry no related decref; nothing to delete there.
        if let Some(j) = refop::first_related_decref(&func.blocks[tail], ptr) {
            removals.entry(tail).or_default().insert(j);
            deleted += 1;
        }
    }
    removals.entry(head).or_default().insert(incref_idx);
    deleted += 1;

    remove_instructions_by_index(func, &removals);

    let counter = if m.through_raise {
        &mut stats.fanout_raise
    } else {
        &mut stats.fanout
    };
    *counter += deleted;

    tracing::debug!(
        function = %func.name,
        tails = m.tails.blocks.len(),
        refops = deleted,
        through_raise = m.through_raise,
        "fanout pruning removed refops",
    );
}

/// Discover and verify a fanout pattern for the incref on `ptr` in `head`.
fn find_fanout(
    func: &Function,
    predecessors: &[Vec<usize>],
    config: &PruneConfig,
    head: usize,
    ptr: Operand,
) -> Option<FanoutMatch> {
    let m = find_decref_candidates(func, config, head, ptr)?;
    if verify_non_overlapping(func, predecessors, head, &m.tails) {
        Some(m)
    } else {
        None
    }
}

/// Forward discovery: collect the tail set, or `None` if any branch of
/// the walked subgraph fails to find a tail.
fn find_decref_candidates(
    func: &Function,
    config: &PruneConfig,
    head: usize,
    ptr: Operand,
) -> Option<FanoutMatch> {
    let mut path: SmallVec<[usize; MAX_PATH_LEN]> = smallvec![head];
    let mut m = FanoutMatch {
        tails: TailSet::default(),
        through_raise: false,
    };

    let succs = func.blocks[head].terminator.successors();
    if succs.is_empty() {
        // An incref in an exit block protects nothing past the exit and
        // has no forward region to pair against.
        return None;
    }
    for succ in succs {
        if !walk_for_decref(func, config, ptr, succ.index(), &mut path, &mut m) {
            return None;
        }
    }

    Some(m)
}

/// One step of the forward walk. Returns `true` if every branch below
/// `cur` (inclusive) finds a tail.
fn walk_for_decref(
    func: &Function,
    config: &PruneConfig,
    ptr: Operand,
    cur: usize,
    path: &mut SmallVec<[usize; MAX_PATH_LEN]>,
    m: &mut FanoutMatch,
) -> bool {
    if path.len() >= MAX_PATH_LEN {
        return false;
    }

    if path.contains(&cur) {
        // A back edge to the head re-runs the incref before any tail;
        // abort. Re-entering any other path block is benign: the branch
        // already walking it accounts for this route.
        return cur != path[0];
    }

    let block = &func.blocks[cur];

    if refop::first_related_decref(block, ptr).is_some() {
        m.tails.insert(cur);
        return true;
    }

    if config.prune_raise_exits && block.terminator.is_raise_exit() {
        // A raising exit abandons the protected value to the unwinder;
        // treat it as a tail that needs no decref.
        m.tails.insert(cur);
        m.through_raise = true;
        return true;
    }

    path.push(cur);
    let mut found = false;
    for succ in block.terminator.successors() {
        if !walk_for_decref(func, config, ptr, succ.index(), path, m) {
            found = false;
            break;
        }
        found = true;
    }
    path.pop();

    found
}

/// Backward verification: every reverse path from every tail must stop
/// at the head, without reaching the entry block or another tail.
fn verify_non_overlapping(
    func: &Function,
    predecessors: &[Vec<usize>],
    head: usize,
    tails: &TailSet,
) -> bool {
    let entry = func.entry.index();

    for &tail in &tails.blocks {
        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut workstack = vec![tail];

        while let Some(cur) = workstack.pop() {
            if !visited.insert(cur) {
                continue;
            }

            if cur == entry {
                // The tail can execute on a path that never ran the incref.
                return false;
            }

            for &pred in &predecessors[cur] {
                if tails.contains(pred) {
                    // One path would pass through two tails.
                    return false;
                }
                if pred != head {
                    workstack.push(pred);
                }
            }
        }
    }

    true
}
