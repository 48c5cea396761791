//! Per-block pruning — null refop cleanup and local pair elimination.
//!
//! The cheapest of the three pruners. Within each block it deletes every
//! refop whose pointer argument is the compile-time null constant (the
//! runtime treats those as no-ops), then pairs increfs with decrefs on
//! the same pointer and deletes both. Assumes normalization has already
//! moved all decrefs after all increfs.
//!
//! Pairing walks the incref list from the back and matches each incref
//! with the earliest remaining related decref, so nested protection
//! regions collapse from the inside out. An incref with no remaining
//! match is simply retained.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{remove_instructions_by_index, Function, Operand};
use crate::refop::{self, RefOp};
use crate::stats::PruneStats;

/// Run one round of per-block pruning over the whole function.
///
/// Returns `true` iff any refop was deleted. Each deletion increments
/// `stats.basicblock` by one.
pub(crate) fn prune_block_pairs(func: &mut Function, stats: &mut PruneStats) -> bool {
    let mut mutated = false;
    let mut eliminated = 0u64;

    for block_idx in 0..func.blocks.len() {
        // Classify the block's refops in source order.
        let mut null_list: Vec<usize> = Vec::new();
        let mut incref_list: Vec<(usize, Operand)> = Vec::new();
        // Decref slots are cleared as they are consumed by pairing.
        let mut decref_list: Vec<Option<(usize, Operand)>> = Vec::new();

        for (i, instr) in func.blocks[block_idx].body.iter().enumerate() {
            match refop::as_refop(instr) {
                Some(op) if op.operand().is_null() => null_list.push(i),
                Some(RefOp::Incref(ptr)) => incref_list.push((i, ptr)),
                Some(RefOp::Decref(ptr)) => decref_list.push(Some((i, ptr))),
                None => {}
            }
        }

        let mut remove_set: FxHashSet<usize> = FxHashSet::default();

        // Refops on the null constant are dead.
        for &i in &null_list {
            remove_set.insert(i);
            stats.basicblock += 1;
        }

        // Match incref/decref pairs on the same pointer. Last incref
        // first, earliest remaining decref wins.
        while let Some((inc_idx, inc_ptr)) = incref_list.pop() {
            for slot in &mut decref_list {
                let Some((dec_idx, dec_ptr)) = *slot else {
                    continue;
                };
                if dec_ptr == inc_ptr {
                    remove_set.insert(inc_idx);
                    remove_set.insert(dec_idx);
                    stats.basicblock += 2;
                    *slot = None;
                    break;
                }
            }
        }

        if !remove_set.is_empty() {
            eliminated += remove_set.len() as u64;
            let mut removals: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
            removals.insert(block_idx, remove_set);
            remove_instructions_by_index(func, &removals);
            mutated = true;
        }
    }

    if mutated {
        tracing::debug!(
            function = %func.name,
            refops = eliminated,
            "per-block pruning removed refops",
        );
    }

    mutated
}
