//! Pipeline tests exercising the public two-pass interface end to end.

use pretty_assertions::assert_eq;

use crate::refop::{self, RefOp};
use crate::test_helpers::{
    block, branch, call, count_refops, decref, decref_null, func, incref, incref_null, jump, ret,
    use_value,
};
use crate::{
    add_refprune_passes, dump_refprune_stats, normalize_refops, prune_refops, FunctionPassManager,
    PruneConfig, PruneStats,
};

/// Run normalization then pruning with default config and fresh stats.
fn run_pipeline(f: &mut crate::ir::Function) -> (bool, PruneStats) {
    let mut stats = PruneStats::default();
    let normalized = normalize_refops(f);
    let pruned = prune_refops(f, &PruneConfig::default(), &mut stats);
    (normalized || pruned, stats)
}

/// Single-block pair: `incref %p; use %p; decref %p; ret`.
#[test]
fn single_block_pair() {
    let mut f = func(vec![block(
        0,
        vec![incref(1), use_value(1), decref(1)],
        ret(),
    )]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert_eq!(f.blocks[0].body, vec![use_value(1)]);
    assert_eq!(stats.basicblock, 2);
    assert_eq!(stats.total(), 2);
}

/// A lone `decref null` is deleted.
#[test]
fn null_refop_deleted() {
    let mut f = func(vec![block(0, vec![decref_null()], ret())]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert!(f.blocks[0].body.is_empty());
    assert_eq!(stats.basicblock, 1);
}

/// Diamond: `A → {B, C} → D`, incref in A, decref in D.
#[test]
fn diamond_pair() {
    let mut f = func(vec![
        block(0, vec![incref(1)], branch(9, 1, 2)),
        block(1, vec![], jump(3)),
        block(2, vec![], jump(3)),
        block(3, vec![decref(1)], ret()),
    ]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert_eq!(count_refops(&f), 0);
    assert_eq!(stats.diamond, 2);
    assert_eq!(stats.fanout, 0);
}

/// Diamond with interference on an unrelated pointer: the diamond rule
/// rejects, but the fanout rule still matches the pattern — decrefs on
/// other pointers only block the diamond walk, not forward discovery.
#[test]
fn diamond_with_interference_falls_to_fanout() {
    let mut f = func(vec![
        block(0, vec![incref(1)], branch(9, 1, 2)),
        block(1, vec![decref(2)], jump(3)),
        block(2, vec![], jump(3)),
        block(3, vec![decref(1)], ret()),
    ]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert_eq!(stats.diamond, 0);
    assert_eq!(stats.fanout, 2);
    // The unrelated decref survives.
    assert_eq!(f.blocks[1].body, vec![decref(2)]);
    assert_eq!(count_refops(&f), 1);
}

/// Fanout triangle: incref in H, decrefs in both arms.
#[test]
fn fanout_triangle() {
    let mut f = func(vec![
        block(0, vec![incref(1)], branch(9, 1, 2)),
        block(1, vec![decref(1)], jump(3)),
        block(2, vec![decref(1)], jump(3)),
        block(3, vec![], ret()),
    ]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert_eq!(count_refops(&f), 0);
    assert_eq!(stats.fanout, 3);
}

/// Fanout rejected when the tail is reachable from the entry without
/// passing the head; no rule fires.
#[test]
fn fanout_rejected_via_entry_reachability() {
    let mut f = func(vec![
        block(0, vec![], branch(9, 1, 2)),
        block(1, vec![incref(1)], jump(2)),
        block(2, vec![decref(1)], ret()),
    ]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(!mutated);
    assert_eq!(count_refops(&f), 2);
    assert_eq!(stats, PruneStats::default());
}

/// Normalization turns a reversed local pair into a per-block candidate.
#[test]
fn normalization_enables_local_pairing() {
    let mut f = func(vec![block(
        0,
        vec![decref(1), incref(1), use_value(1)],
        ret(),
    )]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert_eq!(f.blocks[0].body, vec![use_value(1)]);
    assert_eq!(stats.basicblock, 2);
}

/// No refop with a null argument survives pruning, anywhere.
#[test]
fn no_null_refops_survive() {
    let mut f = func(vec![
        block(0, vec![incref_null(), incref(1)], jump(1)),
        block(1, vec![decref_null(), use_value(1)], jump(2)),
        block(2, vec![decref(1), decref_null()], ret()),
    ]);

    run_pipeline(&mut f);

    let nulls = refop::collect_refops(&f)
        .iter()
        .filter(|s| s.op.operand().is_null())
        .count();
    assert_eq!(nulls, 0);
}

/// Running the converged pipeline again changes nothing.
#[test]
fn pipeline_is_idempotent() {
    let mut f = func(vec![
        block(0, vec![decref(3), incref(3), incref(1)], branch(9, 1, 2)),
        block(1, vec![decref(1)], jump(3)),
        block(2, vec![decref(1)], jump(3)),
        block(3, vec![use_value(1)], ret()),
    ]);

    let (first, _) = run_pipeline(&mut f);
    assert!(first);

    let snapshot = f.clone();
    let (second, stats) = run_pipeline(&mut f);
    assert!(!second);
    assert_eq!(f, snapshot);
    assert_eq!(stats, PruneStats::default());
}

/// Counters accumulate across functions and equal the refops removed.
#[test]
fn stats_accumulate_monotonically() {
    let mut stats = PruneStats::default();
    let config = PruneConfig::default();

    let mut f1 = func(vec![block(0, vec![incref(1), decref(1)], ret())]);
    let before1 = count_refops(&f1);
    prune_refops(&mut f1, &config, &mut stats);
    assert_eq!(stats.total() as usize, before1 - count_refops(&f1));

    let after_f1 = stats;
    let mut f2 = func(vec![
        block(0, vec![incref(1)], jump(1)),
        block(1, vec![decref(1)], ret()),
    ]);
    prune_refops(&mut f2, &config, &mut stats);
    assert!(stats.total() >= after_f1.total());
    assert_eq!(stats.basicblock, after_f1.basicblock);
    assert_eq!(stats.diamond, after_f1.diamond + 2);
}

/// Calls that are not the two intrinsics are never deleted or moved.
#[test]
fn non_intrinsic_calls_untouched() {
    let mut f = func(vec![
        block(
            0,
            vec![
                call("NRT_incref2", &[1]),
                call("malloc", &[2]),
                crate::ir::Instr::CallIndirect {
                    dst: None,
                    callee: crate::test_helpers::v(5),
                    args: vec![crate::ir::Operand::Value(crate::test_helpers::v(1))],
                },
            ],
            jump(1),
        ),
        block(1, vec![call("free", &[2])], ret()),
    ]);

    let snapshot = f.clone();
    let (mutated, _) = run_pipeline(&mut f);
    assert!(!mutated);
    assert_eq!(f, snapshot);
}

// Pass-manager seam

/// The installed pipeline (normalize, then prune) works end to end and
/// reports through the shared statistics cell.
#[test]
fn pass_manager_pipeline() {
    let mut pm = FunctionPassManager::new();
    let handle = add_refprune_passes(&mut pm);

    let mut f = func(vec![block(
        0,
        vec![decref(1), incref(1), use_value(1)],
        ret(),
    )]);

    assert!(pm.run_on(&mut f));
    assert_eq!(f.blocks[0].body, vec![use_value(1)]);

    let snap = dump_refprune_stats(&handle, false);
    assert_eq!(snap.basicblock, 2);
    assert_eq!(snap, handle.snapshot());

    // Converged: a second scheduling round reports no mutation.
    assert!(!pm.run_on(&mut f));
    assert_eq!(dump_refprune_stats(&handle, false), snap);
}

/// A function mixing all three shapes converges with each counter fed
/// by its own rule.
#[test]
fn mixed_shapes_converge() {
    let mut f = func(vec![
        // Local pair plus a diamond head.
        block(0, vec![incref(1), decref(1), incref(2)], branch(9, 1, 2)),
        block(1, vec![], jump(3)),
        block(2, vec![], jump(3)),
        // Diamond tail plus a fanout head.
        block(3, vec![decref(2), incref(4)], branch(8, 4, 5)),
        block(4, vec![decref(4)], jump(6)),
        block(5, vec![decref(4)], jump(6)),
        block(6, vec![], ret()),
    ]);

    let (mutated, stats) = run_pipeline(&mut f);
    assert!(mutated);
    assert_eq!(count_refops(&f), 0);
    assert_eq!(stats.basicblock, 2);
    assert_eq!(stats.diamond, 2);
    assert_eq!(stats.fanout, 3);
}

/// The classified view stays in sync with the IR after pruning.
#[test]
fn collect_refops_after_prune_sees_survivors() {
    let mut f = func(vec![
        block(0, vec![incref(1)], jump(1)),
        block(1, vec![use_value(1)], ret()),
    ]);

    let (mutated, _) = run_pipeline(&mut f);
    // No decref anywhere: nothing can be proven redundant.
    assert!(!mutated);
    let sites = refop::collect_refops(&f);
    assert_eq!(sites.len(), 1);
    assert!(matches!(sites[0].op, RefOp::Incref(_)));
}
