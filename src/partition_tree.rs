//! A `PartitionTree` splits a fixed index range `[0, len)` into two states (`false` and `true`)
//! and answers order-statistic queries such as "which index is the 17th one still in state
//! `false`?" in O(log n).
//!
//! The tree is materialized lazily. A node whose whole range is in one state ("uniform") has no
//! live children; it is subdivided the first time a toggle breaks its uniformity. Nodes live in
//! an arena and are addressed by integer handles, with `UNSPLIT` marking a node that has never
//! been subdivided. When a subdivided node becomes uniform again its children go stale and are
//! simply re-initialized the next time it splits, so no node is ever freed before the tree is
//! dropped.
//!
//! The contact processes use one tree per side to mark agents already queried in a time bucket,
//! which lets them sample "k random agents not yet queried" without rescanning the population.

use rand::Rng;

const ROOT: usize = 0;
const UNSPLIT: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    lo: usize,
    hi: usize,
    /// Number of indices in `[lo, hi)` currently in state `true`.
    ones: usize,
    /// Arena handle of the left child; the right child is stored right after it.
    children: usize,
}

impl Node {
    fn new(lo: usize, hi: usize, state: bool) -> Self {
        Node {
            lo,
            hi,
            ones: if state { hi - lo } else { 0 },
            children: UNSPLIT,
        }
    }

    fn len(&self) -> usize {
        self.hi - self.lo
    }

    fn count(&self, state: bool) -> usize {
        if state {
            self.ones
        } else {
            self.len() - self.ones
        }
    }

    /// The state shared by every index of the node, if there is one.
    fn uniform_state(&self) -> Option<bool> {
        if self.ones == self.len() {
            Some(true)
        } else if self.ones == 0 {
            Some(false)
        } else {
            None
        }
    }

    fn mid(&self) -> usize {
        (self.lo + self.hi) / 2
    }
}

#[derive(Debug, Clone)]
pub struct PartitionTree {
    nodes: Vec<Node>,
}

impl PartitionTree {
    /// Creates a tree over `[0, len)` with every index in `initial_state`.
    #[must_use]
    pub fn new(len: usize, initial_state: bool) -> Self {
        PartitionTree {
            nodes: vec![Node::new(0, len, initial_state)],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes[ROOT].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the state of `index`, or `None` if it is out of range.
    #[must_use]
    pub fn get_state(&self, index: usize) -> Option<bool> {
        if index >= self.len() {
            return None;
        }
        let mut handle = ROOT;
        loop {
            let node = &self.nodes[handle];
            if let Some(state) = node.uniform_state() {
                return Some(state);
            }
            handle = self.child_containing(node, index);
        }
    }

    /// Puts `index` in `state`. Returns `true` if the tree changed; setting an index to the state
    /// it already has, or an index out of range, does nothing.
    pub fn set_state(&mut self, index: usize, state: bool) -> bool {
        match self.get_state(index) {
            Some(current) if current != state => {}
            _ => return false,
        }

        let mut handle = ROOT;
        loop {
            let node = self.nodes[handle];
            let was_uniform = node.uniform_state().is_some();
            if state {
                self.nodes[handle].ones += 1;
            } else {
                self.nodes[handle].ones -= 1;
            }
            if node.len() == 1 {
                return true;
            }
            if was_uniform {
                // Breaking uniformity: the children must describe the old uniform state first.
                self.split(handle, !state);
            } else if self.nodes[handle].uniform_state().is_some() {
                // Uniform again; the children are stale and will be rebuilt on the next split.
                return true;
            }
            handle = self.child_containing(&self.nodes[handle], index);
        }
    }

    /// Number of indices currently in `state`.
    #[must_use]
    pub fn count_in_state(&self, state: bool) -> usize {
        self.nodes[ROOT].count(state)
    }

    /// Returns the `order`-th smallest index (0-based) among those in `state`, or `None` if fewer
    /// than `order + 1` indices are in `state`.
    #[must_use]
    pub fn nth_in_state(&self, order: usize, state: bool) -> Option<usize> {
        if order >= self.count_in_state(state) {
            return None;
        }
        let mut order = order;
        let mut handle = ROOT;
        loop {
            let node = &self.nodes[handle];
            if node.uniform_state().is_some() {
                return Some(node.lo + order);
            }
            let left = &self.nodes[node.children];
            let on_left = left.count(state);
            if order < on_left {
                handle = node.children;
            } else {
                order -= on_left;
                handle = node.children + 1;
            }
        }
    }

    /// Puts every index in `state` at once.
    pub fn fill(&mut self, state: bool) {
        let root = &mut self.nodes[ROOT];
        root.ones = if state { root.len() } else { 0 };
    }

    fn child_containing(&self, node: &Node, index: usize) -> usize {
        if index < self.nodes[node.children].hi {
            node.children
        } else {
            node.children + 1
        }
    }

    /// Gives `handle` two uniform children in `state`, reusing its old pair if it has one.
    fn split(&mut self, handle: usize, state: bool) {
        let node = self.nodes[handle];
        let left = Node::new(node.lo, node.mid(), state);
        let right = Node::new(node.mid(), node.hi, state);
        if node.children == UNSPLIT {
            let children = self.nodes.len();
            self.nodes.push(left);
            self.nodes.push(right);
            self.nodes[handle].children = children;
        } else {
            // Keep the grandchildren handles so deeper re-splits also reuse their slots.
            for (slot, fresh) in [(node.children, left), (node.children + 1, right)] {
                let children = self.nodes[slot].children;
                self.nodes[slot] = Node { children, ..fresh };
            }
        }
    }
}

/// Chooses `k` distinct indices of `0..n` uniformly at random, in the order they were drawn.
/// Returns at most `n` indices.
pub fn sample_distinct<R: Rng + ?Sized>(rng: &mut R, k: usize, n: usize) -> Vec<usize> {
    let mut selected = PartitionTree::new(n, false);
    let k = k.min(n);
    let mut result = Vec::with_capacity(k);
    for drawn in 0..k {
        let order = rng.random_range(0..n - drawn);
        // The order is always below the remaining count, so the lookup succeeds.
        if let Some(index) = selected.nth_in_state(order, false) {
            selected.set_state(index, true);
            result.push(index);
        }
    }
    result
}

/// Returns the items in a uniformly random order.
pub fn shuffled<R: Rng + ?Sized, T: Clone>(rng: &mut R, items: &[T]) -> Vec<T> {
    sample_distinct(rng, items.len(), items.len())
        .into_iter()
        .map(|index| items[index].clone())
        .collect()
}
