//! A `ReducibleTree` is a balanced binary tree over a fixed list of values in which every internal
//! node caches the reduction of its two children under an associative operator. It supports
//! point updates (recomputing the ancestors of the changed leaf) and a threshold search that walks
//! down from the root to the first leaf at which the running reduction reaches a target.
//!
//! With [`Sum`] the threshold search is an inverse CDF: draw `u` uniformly from `(0, total]` and
//! `find(u)` returns the bin in which the cumulative sum first reaches `u`. With [`Max`],
//! `find_total()` returns the first bin holding the maximum.

use std::marker::PhantomData;

use rand::Rng;

use crate::HashMap;

/// An associative operator together with the inverse used to steer the threshold search.
pub trait Reduction {
    /// The reduction of an empty range.
    const IDENTITY: f64;

    fn combine(left: f64, right: f64) -> f64;

    /// Given a target that the left subtree does not reach, returns the target that remains for
    /// the right subtree.
    fn uncombine(target: f64, left: f64) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Reduction for Sum {
    const IDENTITY: f64 = 0.0;

    fn combine(left: f64, right: f64) -> f64 {
        left + right
    }

    fn uncombine(target: f64, left: f64) -> f64 {
        target - left
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Max;

impl Reduction for Max {
    const IDENTITY: f64 = f64::NEG_INFINITY;

    fn combine(left: f64, right: f64) -> f64 {
        left.max(right)
    }

    fn uncombine(target: f64, _left: f64) -> f64 {
        target
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    len: usize,
    value: f64,
    /// Arena handles of the left and right subtrees; `None` for a leaf.
    children: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct ReducibleTree<R: Reduction> {
    nodes: Vec<Node>,
    reduction: PhantomData<R>,
}

impl<R: Reduction> ReducibleTree<R> {
    #[must_use]
    pub fn new(values: &[f64]) -> Self {
        let mut tree = ReducibleTree {
            nodes: Vec::with_capacity(2 * values.len().max(1)),
            reduction: PhantomData,
        };
        tree.build(values);
        tree
    }

    fn build(&mut self, values: &[f64]) -> usize {
        let handle = self.nodes.len();
        self.nodes.push(Node {
            len: values.len(),
            value: R::IDENTITY,
            children: None,
        });
        match values.len() {
            0 => {}
            1 => self.nodes[handle].value = values[0],
            len => {
                let mid = len / 2;
                let left = self.build(&values[..mid]);
                let right = self.build(&values[mid..]);
                let value = R::combine(self.nodes[left].value, self.nodes[right].value);
                let node = &mut self.nodes[handle];
                node.children = Some((left, right));
                node.value = value;
            }
        }
        handle
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes[0].len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The reduction over every value.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.nodes[0].value
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        if index >= self.len() {
            return None;
        }
        let mut index = index;
        let mut handle = 0;
        while let Some((left, right)) = self.nodes[handle].children {
            if index < self.nodes[left].len {
                handle = left;
            } else {
                index -= self.nodes[left].len;
                handle = right;
            }
        }
        Some(self.nodes[handle].value)
    }

    /// Replaces the value at `index`. Returns `false` if `index` is out of range.
    pub fn change(&mut self, index: usize, value: f64) -> bool {
        if index >= self.len() {
            return false;
        }
        let mut path = Vec::new();
        let mut index = index;
        let mut handle = 0;
        while let Some((left, right)) = self.nodes[handle].children {
            path.push(handle);
            if index < self.nodes[left].len {
                handle = left;
            } else {
                index -= self.nodes[left].len;
                handle = right;
            }
        }
        self.nodes[handle].value = value;
        for &ancestor in path.iter().rev() {
            if let Some((left, right)) = self.nodes[ancestor].children {
                self.nodes[ancestor].value =
                    R::combine(self.nodes[left].value, self.nodes[right].value);
            }
        }
        true
    }

    /// Returns the first index at which the running reduction reaches `target`, or `None` if the
    /// whole tree does not reach it.
    #[must_use]
    pub fn find(&self, target: f64) -> Option<usize> {
        if self.is_empty() || target > self.total() {
            return None;
        }
        let mut target = target;
        let mut offset = 0;
        let mut handle = 0;
        while let Some((left, right)) = self.nodes[handle].children {
            let left_value = self.nodes[left].value;
            if target <= left_value {
                handle = left;
            } else {
                // Clamp so rounding never pushes the target past the right subtree.
                target = R::uncombine(target, left_value).min(self.nodes[right].value);
                offset += self.nodes[left].len;
                handle = right;
            }
        }
        Some(offset)
    }

    /// `find` with the total as target; with [`Max`] this is the first index of the maximum.
    #[must_use]
    pub fn find_total(&self) -> Option<usize> {
        self.find(self.total())
    }
}

/// Bins of integer occupancy that can be drawn from in proportion to their occupancy, with the
/// largest bin tracked alongside.
///
/// Removals are batched per bin: a removal is only written back once the queued count for the
/// bin exceeds a quarter of its recorded occupancy, which keeps repeated draws without
/// replacement from rebuilding tree paths on every call.
#[derive(Debug, Clone)]
pub struct Histogram {
    sums: ReducibleTree<Sum>,
    maxima: ReducibleTree<Max>,
    removal_queue: HashMap<usize, u64>,
}

impl Histogram {
    #[must_use]
    pub fn new(occupancies: &[u64]) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f64> = occupancies.iter().map(|o| *o as f64).collect();
        Histogram {
            sums: ReducibleTree::new(&values),
            maxima: ReducibleTree::new(&values),
            removal_queue: HashMap::default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sums.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn total_occupancy(&self) -> u64 {
        self.sums.total().max(0.0).round() as u64
    }

    #[must_use]
    pub fn max_occupancy_bin(&self) -> Option<usize> {
        self.maxima.find_total()
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn occupancy(&self, bin: usize) -> Option<u64> {
        self.sums.get(bin).map(|value| value.round() as u64)
    }

    pub fn set_occupancy(&mut self, bin: usize, occupancy: u64) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let value = occupancy as f64;
        self.maxima.change(bin, value) && self.sums.change(bin, value)
    }

    /// Records one removal from `bin`, writing queued removals back once they are numerous enough.
    pub fn remove(&mut self, bin: usize) {
        let Some(occupancy) = self.occupancy(bin) else {
            return;
        };
        let queued = self.removal_queue.entry(bin).or_insert(0);
        *queued += 1;
        if 4 * *queued > occupancy {
            let remaining = occupancy.saturating_sub(*queued);
            *queued = 0;
            self.set_occupancy(bin, remaining);
        }
    }

    /// Draws a bin with probability proportional to its occupancy.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let total = self.sums.total();
        if total <= 0.0 {
            return None;
        }
        // `1 - u` lies in (0, 1], so empty bins can never be selected.
        let target = (1.0 - rng.random::<f64>()) * total;
        self.sums.find(target)
    }

    /// Draws a bin and removes one unit of occupancy from it.
    pub fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        let bin = self.draw(rng)?;
        self.remove(bin);
        Some(bin)
    }

    /// Draws up to `count` distinct bins by rejection, giving up after `count` repeated draws.
    pub fn draw_distinct<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) -> Vec<usize> {
        let mut chosen: Vec<usize> = Vec::with_capacity(count);
        let mut repeats = 0;
        while chosen.len() < count && repeats < count {
            let Some(bin) = self.draw(rng) else {
                break;
            };
            if chosen.contains(&bin) {
                repeats += 1;
            } else {
                chosen.push(bin);
            }
        }
        chosen
    }
}
