//! Shared CFG analyses for the pruning passes.
//!
//! Functions in this module are generic graph operations on [`Function`]
//! that multiple independent passes need. They live here rather than in a
//! specific pass module so that passes do not import from each other —
//! keeping the dependency graph flat (all passes depend on `graph`, none
//! depend on each other).
//!
//! The pruning pass queries the [`DominatorTree`] and [`PostDominatorTree`]
//! but never keeps them across CFG mutations; refop deletion leaves the
//! CFG untouched, so one build per function suffices for the whole
//! fixed-point loop.

use smallvec::SmallVec;

use crate::ir::{BlockId, Function};

/// Compute the predecessor list for each block (deduplicated).
///
/// Returns a vector indexed by block index, where each entry is the
/// list of distinct predecessor block indices.
pub(crate) fn compute_predecessors(func: &Function) -> Vec<Vec<usize>> {
    let num_blocks = func.blocks.len();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); num_blocks];

    for (block_idx, block) in func.blocks.iter().enumerate() {
        let mut seen: SmallVec<[usize; 4]> = SmallVec::new();
        for succ_id in block.terminator.successors() {
            let succ_idx = succ_id.index();
            if succ_idx < num_blocks && !seen.contains(&succ_idx) {
                seen.push(succ_idx);
                predecessors[succ_idx].push(block_idx);
            }
        }
    }

    predecessors
}

/// Compute a postorder traversal of the CFG starting from the entry block.
///
/// Uses an iterative DFS with an explicit stack to avoid recursion depth
/// issues on deeply nested CFGs. Only visits reachable blocks.
pub(crate) fn compute_postorder(func: &Function) -> Vec<usize> {
    let num_blocks = func.blocks.len();
    let mut visited = vec![false; num_blocks];
    let mut postorder = Vec::with_capacity(num_blocks);

    // Stack entries: (block_index, children_processed).
    // When children_processed is false, we push successors.
    // When true, we emit the block to postorder.
    let mut stack: Vec<(usize, bool)> = vec![(func.entry.index(), false)];

    while let Some(&mut (block_idx, ref mut children_done)) = stack.last_mut() {
        if *children_done {
            postorder.push(block_idx);
            stack.pop();
            continue;
        }

        *children_done = true;

        if block_idx >= num_blocks {
            stack.pop();
            continue;
        }

        if visited[block_idx] {
            stack.pop();
            continue;
        }
        visited[block_idx] = true;

        for succ_id in func.blocks[block_idx].terminator.successors() {
            let succ_idx = succ_id.index();
            if succ_idx < num_blocks && !visited[succ_idx] {
                stack.push((succ_idx, false));
            }
        }
    }

    postorder
}

// Dominator tree

/// Dominator tree over a function's CFG.
///
/// Uses the Cooper-Harvey-Kennedy iterative algorithm, which is simpler
/// than Lengauer-Tarjan and fast enough for typical function sizes
/// (< 100 blocks). The algorithm works on reverse postorder and converges
/// in O(n * d) where d is the loop nesting depth — typically 2-3
/// iterations.
///
/// Reference: Cooper, Harvey, Kennedy — "A Simple, Fast Dominance
/// Algorithm" (2001)
pub struct DominatorTree {
    /// Immediate dominator for each block, indexed by block index.
    /// `idom[entry] == Some(entry)`; unreachable blocks have `None`.
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    /// Build the dominator tree for a function.
    pub fn build(func: &Function) -> Self {
        let n = func.blocks.len();
        if n == 0 {
            return Self { idom: vec![] };
        }

        let preds = compute_predecessors(func);

        let mut rpo = compute_postorder(func);
        rpo.reverse();

        let entry = func.entry.index();
        let idom = chk_idoms(n, entry, &rpo, |b| preds[b].as_slice());

        Self { idom }
    }

    /// Does block `a` dominate block `b`?
    ///
    /// A block dominates itself. The entry block dominates every
    /// reachable block.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        chain_contains(&self.idom, a.index(), b.index())
    }

    /// Blocks whose immediate dominator is `a`, in block-index order.
    pub fn children(&self, a: BlockId) -> Vec<BlockId> {
        let a_idx = a.index();
        self.idom
            .iter()
            .enumerate()
            .filter(|&(idx, &dom)| dom == Some(a_idx) && idx != a_idx)
            .map(|(idx, _)| block_id(idx))
            .collect()
    }

    /// The subtree rooted at `root` in preorder (root first).
    pub fn descendants(&self, root: BlockId) -> Vec<BlockId> {
        // Build children lists from idom.
        let num_blocks = self.idom.len();
        let mut children: Vec<Vec<usize>> = vec![vec![]; num_blocks];
        for (idx, &idom) in self.idom.iter().enumerate() {
            if let Some(dom) = idom {
                if dom != idx {
                    children[dom].push(idx);
                }
            }
        }

        let mut result = Vec::new();
        let mut stack = vec![root.index()];
        while let Some(idx) = stack.pop() {
            result.push(block_id(idx));
            // Push in reverse order so lower-index children are visited first.
            for &child in children[idx].iter().rev() {
                stack.push(child);
            }
        }
        result
    }
}

// Post-dominator tree

/// Post-dominator tree over a function's CFG.
///
/// The same CHK iteration as [`DominatorTree`], run over the reverse CFG
/// rooted at a virtual exit node that joins every exit block (a block
/// whose terminator has no successors). Multiple returns therefore share
/// one post-dominance root, as in the backing IR library's analysis.
///
/// Blocks that cannot reach any exit (infinite loops) post-dominate
/// nothing and are post-dominated only by themselves.
pub struct PostDominatorTree {
    /// Immediate post-dominator for each block, indexed by block index.
    /// The virtual exit occupies index `num_blocks`.
    idom: Vec<Option<usize>>,
}

impl PostDominatorTree {
    /// Build the post-dominator tree for a function.
    pub fn build(func: &Function) -> Self {
        let n = func.blocks.len();
        if n == 0 {
            return Self { idom: vec![] };
        }

        // Reverse CFG with a virtual exit at index n. Edges of the reverse
        // graph: exit → every forward exit block, b → a for every forward
        // edge a → b.
        let virtual_exit = n;
        let mut rev_succs: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
        let mut rev_preds: Vec<Vec<usize>> = vec![Vec::new(); n + 1];

        for (block_idx, block) in func.blocks.iter().enumerate() {
            let succs = block.terminator.successors();
            if succs.is_empty() {
                rev_succs[virtual_exit].push(block_idx);
                rev_preds[block_idx].push(virtual_exit);
            }
            let mut seen: SmallVec<[usize; 4]> = SmallVec::new();
            for succ_id in succs {
                let succ_idx = succ_id.index();
                if succ_idx < n && !seen.contains(&succ_idx) {
                    seen.push(succ_idx);
                    rev_succs[succ_idx].push(block_idx);
                    rev_preds[block_idx].push(succ_idx);
                }
            }
        }

        // Postorder of the reverse graph from the virtual exit.
        let mut visited = vec![false; n + 1];
        let mut postorder = Vec::with_capacity(n + 1);
        let mut stack: Vec<(usize, bool)> = vec![(virtual_exit, false)];
        while let Some(&mut (idx, ref mut children_done)) = stack.last_mut() {
            if *children_done {
                postorder.push(idx);
                stack.pop();
                continue;
            }
            *children_done = true;
            if visited[idx] {
                stack.pop();
                continue;
            }
            visited[idx] = true;
            for &succ in &rev_succs[idx] {
                if !visited[succ] {
                    stack.push((succ, false));
                }
            }
        }
        let mut rpo = postorder;
        rpo.reverse();

        let idom = chk_idoms(n + 1, virtual_exit, &rpo, |b| rev_preds[b].as_slice());

        Self { idom }
    }

    /// Does block `a` post-dominate block `b`?
    ///
    /// A block post-dominates itself. Every path from a post-dominated
    /// block to function exit passes through its post-dominator.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        chain_contains(&self.idom, a.index(), b.index())
    }
}

// CHK machinery shared by both trees

/// Run the CHK iteration and return the immediate-dominator array.
///
/// `rpo` is the reverse postorder of the graph rooted at `root`; `preds`
/// yields each node's predecessor list in that graph.
fn chk_idoms<'a, P>(num_nodes: usize, root: usize, rpo: &[usize], preds: P) -> Vec<Option<usize>>
where
    P: Fn(usize) -> &'a [usize],
{
    // Map node index → RPO position for O(1) intersect steps.
    let mut rpo_pos = vec![0usize; num_nodes];
    for (pos, &idx) in rpo.iter().enumerate() {
        rpo_pos[idx] = pos;
    }

    let mut idom: Vec<Option<usize>> = vec![None; num_nodes];
    idom[root] = Some(root); // the root dominates itself

    let mut changed = true;
    while changed {
        changed = false;
        // Iterate in RPO (skip the root at position 0).
        for &idx in &rpo[1..] {
            // Find first processed predecessor.
            let mut new_idom = None;
            for &pred in preds(idx) {
                if idom[pred].is_some() {
                    new_idom = Some(pred);
                    break;
                }
            }

            let Some(mut new_idom_val) = new_idom else {
                continue;
            };

            // Intersect with remaining processed predecessors.
            for &pred in preds(idx) {
                if pred == new_idom_val {
                    continue;
                }
                if idom[pred].is_some() {
                    new_idom_val = intersect(pred, new_idom_val, &idom, &rpo_pos);
                }
            }

            if idom[idx] != Some(new_idom_val) {
                idom[idx] = Some(new_idom_val);
                changed = true;
            }
        }
    }

    idom
}

/// CHK intersect: walk two fingers upward until they meet.
///
/// Both `a` and `b` must be reachable from the root — their idom chain
/// always leads to the root, so `idom[x]` is always `Some` here.
fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
    while a != b {
        while rpo_pos[a] > rpo_pos[b] {
            let Some(next) = idom[a] else {
                debug_assert!(false, "intersect: broken idom chain at {a}");
                return a;
            };
            a = next;
        }
        while rpo_pos[b] > rpo_pos[a] {
            let Some(next) = idom[b] else {
                debug_assert!(false, "intersect: broken idom chain at {b}");
                return b;
            };
            b = next;
        }
    }
    a
}

/// Walk the idom chain upward from `b`; `true` if it passes through `a`.
fn chain_contains(idom: &[Option<usize>], a: usize, b: usize) -> bool {
    let mut current = b;
    loop {
        if current == a {
            return true;
        }
        match idom[current] {
            Some(dom) if dom != current => current = dom,
            _ => return current == a,
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "block counts fit in u32 by construction"
)]
fn block_id(idx: usize) -> BlockId {
    BlockId::new(idx as u32)
}
