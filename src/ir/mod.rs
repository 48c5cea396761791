//! Basic-block IR that the refcount pruning passes operate on.
//!
//! The runtime front end emits functions in which reference-count
//! manipulation appears as direct calls to the `NRT_incref` / `NRT_decref`
//! intrinsics. The pruning passes only ever delete (or, for normalization,
//! reorder) such calls; every other instruction is opaque to them. The IR
//! therefore distinguishes exactly three instruction forms:
//!
//! - **[`Instr::Call`]** — a direct call by symbolic callee name. Refops are
//!   direct calls whose callee is one of the two intrinsic names.
//! - **[`Instr::CallIndirect`]** — a call through a function-pointer value.
//!   Never a refop, regardless of what it points to.
//! - **[`Instr::Opaque`]** — everything else (loads, stores, arithmetic).
//!
//! Control flow uses [`BlockId`] references between blocks; call operands
//! are [`Operand`]s, either an SSA value ([`ValueId`]) or a compile-time
//! null pointer constant. Null constants are uniqued: two `Operand::Null`s
//! are the same IR value.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};

// ID newtypes

/// SSA value ID within a function.
///
/// Two call operands refer to the same pointer iff their `ValueId`s are
/// equal. This is syntactic identity; the passes do no alias reasoning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    /// Create a new value ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a function.
///
/// IDs are allocated sequentially starting from 0 and double as indices
/// into [`Function::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// Operands

/// A call operand: an SSA value or a compile-time null pointer constant.
///
/// Derived equality gives IR value identity — `Null == Null` holds because
/// null pointer constants are uniqued, the same way constants are uniqued
/// in the backing IR library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Reference to an SSA value.
    Value(ValueId),
    /// Compile-time null pointer constant.
    Null,
}

impl Operand {
    /// Returns `true` for the compile-time null pointer constant.
    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Operand::Null)
    }
}

// Instructions

/// A single instruction in a basic block.
///
/// The pruning passes only inspect direct calls; `CallIndirect` and
/// `Opaque` exist so that producers can round-trip whole functions through
/// the passes without the passes ever touching the rest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    /// Direct call: `dst = callee(args...)`.
    ///
    /// The callee is identified purely by its symbolic name. Refop
    /// classification (see [`crate::refop`]) matches on this name.
    Call {
        dst: Option<ValueId>,
        callee: String,
        args: Vec<Operand>,
    },

    /// Indirect call through a function-pointer value.
    CallIndirect {
        dst: Option<ValueId>,
        callee: ValueId,
        args: Vec<Operand>,
    },

    /// Any non-call instruction. `uses` lists the values it reads.
    Opaque {
        dst: Option<ValueId>,
        uses: Vec<ValueId>,
    },
}

// Terminators

/// Block terminator — how control leaves a basic block.
///
/// Every block ends with exactly one terminator. Terminators reference
/// successor blocks by [`BlockId`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    /// Return from the function.
    ///
    /// `is_raise` mirrors the producer's `ret_is_raise` return metadata: a
    /// raising return unwinds into the caller's error path instead of
    /// handing back a live value. Only the gated fanout-through-raise
    /// pruning variant reads it.
    Return {
        value: Option<ValueId>,
        is_raise: bool,
    },

    /// Unconditional jump to a target block.
    Jump { target: BlockId },

    /// Conditional branch on a boolean value.
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Multi-way branch on an integer discriminant.
    Switch {
        scrutinee: ValueId,
        cases: Vec<(u64, BlockId)>,
        default: BlockId,
    },

    /// Marks a block as unreachable.
    Unreachable,
}

impl Terminator {
    /// Successor block IDs of this terminator, in operand order.
    ///
    /// Returns `SmallVec<[BlockId; 4]>` to avoid heap allocation for the
    /// common case (max 2 successors except `Switch` with many cases).
    /// Duplicate targets (a `Branch` with identical arms) are kept;
    /// consumers that need distinct predecessors deduplicate themselves.
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        match self {
            Terminator::Return { .. } | Terminator::Unreachable => SmallVec::new(),
            Terminator::Jump { target } => smallvec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut targets = SmallVec::with_capacity(cases.len() + 1);
                for &(_, b) in cases {
                    targets.push(b);
                }
                targets.push(*default);
                targets
            }
        }
    }

    /// Returns `true` for a raising return (`ret_is_raise` metadata set).
    #[inline]
    pub fn is_raise_exit(&self) -> bool {
        matches!(self, Terminator::Return { is_raise: true, .. })
    }
}

// Blocks

/// A basic block: a body of sequential instructions plus a terminator.
///
/// The terminator is a separate field, so "immediately before the
/// terminator" is simply the end of `body`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    /// This block's identifier.
    pub id: BlockId,
    /// Sequential instructions executed in order.
    pub body: Vec<Instr>,
    /// How control leaves this block.
    pub terminator: Terminator,
}

// Functions

/// A complete function: an ordered collection of basic blocks with a
/// designated entry block. `blocks[entry.index()]` is the entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Function {
    /// The function's symbolic name (used in trace events only).
    pub name: String,
    /// Basic blocks in definition order, indexed by `BlockId::index()`.
    pub blocks: Vec<Block>,
    /// The entry block ID.
    pub entry: BlockId,
}

impl Function {
    /// Create an empty function with entry block 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            entry: BlockId::new(0),
        }
    }

    /// Append a new basic block to this function.
    ///
    /// # Panics
    ///
    /// Debug-panics if `block.id` does not match the next sequential
    /// block index.
    pub fn push_block(&mut self, block: Block) {
        let expected = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        debug_assert_eq!(
            block.id,
            expected,
            "block ID {} does not match expected index {}",
            block.id.raw(),
            expected.raw(),
        );
        self.blocks.push(block);
    }

    /// Borrow a block by ID.
    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }
}

// Batch instruction removal

/// Remove instructions at specified indices from each block.
///
/// Takes a map from block index → set of instruction indices to remove.
/// Indices refer to positions before any removal; each block's body is
/// rebuilt in one pass so the caller never has to reason about shifting.
pub(crate) fn remove_instructions_by_index(
    func: &mut Function,
    removals: &FxHashMap<usize, FxHashSet<usize>>,
) {
    for (&block_idx, remove_set) in removals {
        let block = &mut func.blocks[block_idx];

        let old_body = std::mem::take(&mut block.body);
        let mut new_body = Vec::with_capacity(old_body.len() - remove_set.len());

        for (i, instr) in old_body.into_iter().enumerate() {
            if !remove_set.contains(&i) {
                new_body.push(instr);
            }
        }

        block.body = new_body;
    }
}

// Tests
