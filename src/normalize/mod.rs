//! Refop normalization — move decrefs after increfs within each block.
//!
//! The runtime emits refops interleaved with the code they protect. The
//! pruners assume that within any basic block every incref precedes every
//! decref; this pass establishes that invariant by hoisting each block's
//! decrefs to the end of the body, immediately before the terminator,
//! preserving their relative order.
//!
//! The reordering is sound: refops on possibly-distinct pointers commute
//! within a block because the runtime guarantees the block is not
//! interrupted between operations, and refcounts only become observable
//! at a decref that may free. A block with both `incref(p)` and
//! `decref(p)` ends up with the pair in adjacent candidate position for
//! the per-block pruner.
//!
//! Blocks with no incref are left untouched — there is nothing for the
//! pruners to pair there, and skipping them keeps the pass cheap.

use crate::ir::Function;
use crate::refop;

/// Hoist every decref in incref-bearing blocks to just before the block
/// terminator. Returns `true` iff some decref changed position.
pub fn normalize_refops(func: &mut Function) -> bool {
    let mut mutated = false;

    for block in &mut func.blocks {
        let has_incref = block.body.iter().any(refop::is_incref);
        if !has_incref {
            continue;
        }

        let Some(first_dec) = block.body.iter().position(refop::is_decref) else {
            continue;
        };
        // Already a trailing run of decrefs? Then nothing moves.
        if block.body[first_dec..].iter().all(refop::is_decref) {
            continue;
        }

        let body = std::mem::take(&mut block.body);
        let (decrefs, mut kept): (Vec<_>, Vec<_>) = body.into_iter().partition(refop::is_decref);
        kept.extend(decrefs);
        block.body = kept;
        mutated = true;
    }

    if mutated {
        tracing::debug!(function = %func.name, "normalized refop order");
    }

    mutated
}
