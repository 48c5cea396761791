//! Refop classification — the only window the pruning passes have into
//! the IR's call instructions.
//!
//! A *refop* is a direct call to one of the two runtime intrinsics,
//! identified purely by textual callee name. Indirect calls and calls to
//! differently named aliases are opaque and are never classified, moved,
//! or removed. The relevant payload of a refop is its first argument: the
//! pointer whose reference count it manipulates.

use crate::ir::{Block, Function, Instr, Operand};

/// Symbolic name of the increment intrinsic.
pub const INCREF_NAME: &str = "NRT_incref";

/// Symbolic name of the decrement intrinsic.
pub const DECREF_NAME: &str = "NRT_decref";

/// A classified refop: the two-tag sum of kind and pointer operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefOp {
    /// `NRT_incref(ptr)` — increments the refcount of `ptr`.
    Incref(Operand),
    /// `NRT_decref(ptr)` — decrements the refcount of `ptr`, possibly
    /// freeing the object.
    Decref(Operand),
}

impl RefOp {
    /// The pointer operand (first call argument).
    #[inline]
    pub fn operand(self) -> Operand {
        match self {
            RefOp::Incref(op) | RefOp::Decref(op) => op,
        }
    }

    /// Returns `true` for the increment intrinsic.
    #[inline]
    pub fn is_incref(self) -> bool {
        matches!(self, RefOp::Incref(_))
    }

    /// Returns `true` for the decrement intrinsic.
    #[inline]
    pub fn is_decref(self) -> bool {
        matches!(self, RefOp::Decref(_))
    }
}

/// Classify an instruction as a refop.
///
/// Only direct calls whose callee name equals one of the intrinsic names
/// match. A refop call with no arguments is a producer bug; it is
/// debug-asserted and otherwise treated as opaque.
pub fn as_refop(instr: &Instr) -> Option<RefOp> {
    let Instr::Call { callee, args, .. } = instr else {
        return None;
    };

    let kind: fn(Operand) -> RefOp = match callee.as_str() {
        INCREF_NAME => RefOp::Incref,
        DECREF_NAME => RefOp::Decref,
        _ => return None,
    };

    let Some(&first) = args.first() else {
        debug_assert!(false, "refop call {callee} with no arguments");
        return None;
    };
    Some(kind(first))
}

/// Returns `true` iff `instr` is a direct call to the increment intrinsic.
pub fn is_incref(instr: &Instr) -> bool {
    matches!(as_refop(instr), Some(RefOp::Incref(_)))
}

/// Returns `true` iff `instr` is a direct call to the decrement intrinsic.
pub fn is_decref(instr: &Instr) -> bool {
    matches!(as_refop(instr), Some(RefOp::Decref(_)))
}

/// Returns `true` iff `a` is an incref, `b` is a decref, and both operate
/// on the exact same IR value.
pub fn related(a: &Instr, b: &Instr) -> bool {
    match (as_refop(a), as_refop(b)) {
        (Some(RefOp::Incref(pa)), Some(RefOp::Decref(pb))) => pa == pb,
        _ => false,
    }
}

// Block-level queries shared by the pruners

/// A refop's location within a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RefOpSite {
    /// Block index within the function.
    pub block: usize,
    /// Instruction index within the block body.
    pub instr: usize,
    /// The classified refop.
    pub op: RefOp,
}

/// Collect every refop in the function in source order.
pub(crate) fn collect_refops(func: &Function) -> Vec<RefOpSite> {
    let mut sites = Vec::new();
    for (block_idx, block) in func.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.body.iter().enumerate() {
            if let Some(op) = as_refop(instr) {
                sites.push(RefOpSite {
                    block: block_idx,
                    instr: instr_idx,
                    op,
                });
            }
        }
    }
    sites
}

/// Does the block contain a decref on any pointer?
pub(crate) fn block_has_any_decref(block: &Block) -> bool {
    block.body.iter().any(is_decref)
}

/// Index of the first decref in `block` operating on `operand`, if any.
pub(crate) fn first_related_decref(block: &Block, operand: Operand) -> Option<usize> {
    block
        .body
        .iter()
        .position(|i| matches!(as_refop(i), Some(RefOp::Decref(p)) if p == operand))
}
