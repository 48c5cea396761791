//! Shared test utilities for the pruning passes.
//!
//! Consolidates factory functions used across the `normalize`,
//! `per_block`, `diamond`, `fanout`, `graph`, and pipeline tests.
//! Only compiled in test builds.

use crate::ir::{Block, BlockId, Function, Instr, Operand, Terminator, ValueId};
use crate::refop::{DECREF_NAME, INCREF_NAME};

/// Shorthand for `ValueId::new(n)`.
pub(crate) fn v(n: u32) -> ValueId {
    ValueId::new(n)
}

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// A refop call on an explicit operand.
pub(crate) fn refop_call(callee: &str, ptr: Operand) -> Instr {
    Instr::Call {
        dst: None,
        callee: callee.to_string(),
        args: vec![ptr],
    }
}

/// `NRT_incref(%n)`.
pub(crate) fn incref(n: u32) -> Instr {
    refop_call(INCREF_NAME, Operand::Value(v(n)))
}

/// `NRT_decref(%n)`.
pub(crate) fn decref(n: u32) -> Instr {
    refop_call(DECREF_NAME, Operand::Value(v(n)))
}

/// `NRT_incref(null)`.
pub(crate) fn incref_null() -> Instr {
    refop_call(INCREF_NAME, Operand::Null)
}

/// `NRT_decref(null)`.
pub(crate) fn decref_null() -> Instr {
    refop_call(DECREF_NAME, Operand::Null)
}

/// A direct call to an arbitrary (non-intrinsic) callee with value args.
pub(crate) fn call(callee: &str, args: &[u32]) -> Instr {
    Instr::Call {
        dst: None,
        callee: callee.to_string(),
        args: args.iter().map(|&n| Operand::Value(v(n))).collect(),
    }
}

/// An opaque instruction reading `%n`.
pub(crate) fn use_value(n: u32) -> Instr {
    Instr::Opaque {
        dst: None,
        uses: vec![v(n)],
    }
}

/// `ret void`.
pub(crate) fn ret() -> Terminator {
    Terminator::Return {
        value: None,
        is_raise: false,
    }
}

/// A raising return (`ret_is_raise` metadata set).
pub(crate) fn raise() -> Terminator {
    Terminator::Return {
        value: None,
        is_raise: true,
    }
}

/// Unconditional jump to block `target`.
pub(crate) fn jump(target: u32) -> Terminator {
    Terminator::Jump { target: b(target) }
}

/// Two-way branch on `%cond`.
pub(crate) fn branch(cond: u32, then_block: u32, else_block: u32) -> Terminator {
    Terminator::Branch {
        cond: v(cond),
        then_block: b(then_block),
        else_block: b(else_block),
    }
}

/// Multi-way switch on `%scrutinee`; the last target is the default.
pub(crate) fn switch(scrutinee: u32, targets: &[u32]) -> Terminator {
    let (&default, cases) = targets.split_last().expect("switch needs targets");
    Terminator::Switch {
        scrutinee: v(scrutinee),
        cases: cases
            .iter()
            .enumerate()
            .map(|(i, &t)| (i as u64, b(t)))
            .collect(),
        default: b(default),
    }
}

/// Build a block with a sequential ID.
pub(crate) fn block(id: u32, body: Vec<Instr>, terminator: Terminator) -> Block {
    Block {
        id: b(id),
        body,
        terminator,
    }
}

/// Build a function named `test` with entry block 0.
pub(crate) fn func(blocks: Vec<Block>) -> Function {
    let mut f = Function::new("test");
    for bl in blocks {
        f.push_block(bl);
    }
    f
}

/// Count all refops across the entire function.
pub(crate) fn count_refops(f: &Function) -> usize {
    f.blocks
        .iter()
        .flat_map(|bl| bl.body.iter())
        .filter(|i| crate::refop::as_refop(i).is_some())
        .count()
}

/// Count refops in a single block.
pub(crate) fn count_block_refops(f: &Function, block_idx: usize) -> usize {
    f.blocks[block_idx]
        .body
        .iter()
        .filter(|i| crate::refop::as_refop(i).is_some())
        .count()
}
