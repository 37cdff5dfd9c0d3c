//! Discrete distributions for the quantities a transmission model needs to draw: incubation
//! periods, serial intervals and arbitrary categorical choices.
//!
//! Two families are provided. [`WeightedSampler`] is mutable: it keeps its weights in a
//! [`ReducibleTree`] so that a weight can be changed in O(log n) between draws.
//! [`DiscreteDistribution`] is immutable: it precomputes a cumulative table and a decision tree
//! whose split points halve the remaining probability mass, so that likely outcomes are found
//! after fewer comparisons than a plain binary search needs.

use rand::Rng;

use crate::error::ContactError;
use crate::reducible_tree::{ReducibleTree, Sum};

/// Densities below this value end the support of the named distributions.
const DENSITY_FLOOR: f64 = 1e-20;

fn check_weight(weight: f64) -> Result<(), ContactError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(ContactError::InvalidParameter(format!(
            "weights must be finite and non-negative, got {weight}"
        )))
    }
}

/// Draws labels with probability proportional to their weights.
#[derive(Debug, Clone)]
pub struct WeightedSampler<L> {
    labels: Vec<L>,
    tree: ReducibleTree<Sum>,
}

impl WeightedSampler<usize> {
    /// A sampler over the indices of `weights`.
    pub fn from_weights(weights: &[f64]) -> Result<Self, ContactError> {
        Self::from_pairs(weights.iter().copied().enumerate())
    }

    /// The mean of the sampled index.
    #[must_use]
    pub fn mean(&self) -> f64 {
        let total = self.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let weighted: f64 = (0..self.len())
            .map(|i| self.labels[i] as f64 * self.weight(i).unwrap_or(0.0))
            .sum();
        weighted / total
    }
}

impl<L: Clone> WeightedSampler<L> {
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ContactError>
    where
        I: IntoIterator<Item = (L, f64)>,
    {
        let mut labels = Vec::new();
        let mut weights = Vec::new();
        for (label, weight) in pairs {
            check_weight(weight)?;
            labels.push(label);
            weights.push(weight);
        }
        Ok(WeightedSampler {
            labels,
            tree: ReducibleTree::new(&weights),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.tree.total()
    }

    #[must_use]
    pub fn label(&self, index: usize) -> Option<&L> {
        self.labels.get(index)
    }

    #[must_use]
    pub fn weight(&self, index: usize) -> Option<f64> {
        self.tree.get(index)
    }

    pub fn set_weight(&mut self, index: usize, weight: f64) -> Result<(), ContactError> {
        check_weight(weight)?;
        if self.tree.change(index, weight) {
            Ok(())
        } else {
            Err(ContactError::InvalidParameter(format!(
                "index {index} is out of range for a sampler of {} labels",
                self.len()
            )))
        }
    }

    /// Draws a label, or `None` if every weight is zero.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<L> {
        let total = self.total_weight();
        if total <= 0.0 {
            return None;
        }
        let target = (1.0 - rng.random::<f64>()) * total;
        self.tree
            .find(target)
            .and_then(|index| self.labels.get(index).cloned())
    }
}

/// Builds a density table from `density(k)` for `k = start, start + 1, ...` until the density
/// drops below the floor or `k` reaches `cutoff`.
fn tabulate(start: usize, cutoff: Option<usize>, mut density: impl FnMut(usize) -> f64) -> Vec<f64> {
    let mut table = vec![0.0; start];
    let mut point = start;
    loop {
        let value = density(point);
        table.push(value);
        point += 1;
        if value < DENSITY_FLOOR || cutoff.is_some_and(|cutoff| point >= cutoff) {
            return table;
        }
    }
}

/// A discretized gamma distribution on `1, 2, ...` with the given mean and integer shape (a
/// negative binomial shifted by one). Shape 1 is a geometric distribution; larger shapes
/// concentrate the mass around the mean.
pub fn discrete_gamma(
    mean: f64,
    shape: u32,
    cutoff: Option<usize>,
) -> Result<WeightedSampler<usize>, ContactError> {
    if !(mean.is_finite() && mean > 1.0) || shape == 0 {
        return Err(ContactError::InvalidParameter(format!(
            "a discrete gamma needs mean > 1 and shape >= 1, got mean {mean} and shape {shape}"
        )));
    }
    let shape_f = f64::from(shape);
    let increment = (mean - 1.0) / (mean + shape_f - 1.0);
    let mut base = (1.0 - increment).powf(shape_f);
    let table = tabulate(1, cutoff, |point| {
        let mut density = base;
        for counter in 0..shape - 1 {
            #[allow(clippy::cast_precision_loss)]
            let numerator = (point + counter as usize) as f64;
            density *= numerator / f64::from(counter + 1);
        }
        base *= increment;
        density
    });
    WeightedSampler::from_weights(&table)
}

/// A discretized exponential (geometric) distribution on `0, 1, ...` with the given mean.
pub fn discrete_exponential(
    mean: f64,
    cutoff: Option<usize>,
) -> Result<WeightedSampler<usize>, ContactError> {
    if !(mean.is_finite() && mean >= 0.0) {
        return Err(ContactError::InvalidParameter(format!(
            "a discrete exponential needs a non-negative mean, got {mean}"
        )));
    }
    let increment = mean / (mean + 1.0);
    let mut density = 1.0 - increment;
    let table = tabulate(0, cutoff, |_| {
        let value = density;
        density *= increment;
        value
    });
    WeightedSampler::from_weights(&table)
}

const LEAF: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Split {
    /// Cumulative-table index compared against the draw.
    mid: usize,
    below: usize,
    above: usize,
}

/// An immutable categorical distribution over `0..len` with a mass-balanced decision tree.
#[derive(Debug, Clone)]
pub struct DiscreteDistribution {
    /// `cumulative[i]` is the total weight of bins `0..i`; `cumulative[0] == 0`.
    cumulative: Vec<f64>,
    splits: Vec<Split>,
    root: usize,
}

impl DiscreteDistribution {
    pub fn new(weights: &[f64]) -> Result<Self, ContactError> {
        let mut cumulative = Vec::with_capacity(weights.len() + 1);
        cumulative.push(0.0);
        let mut total = 0.0;
        for weight in weights {
            check_weight(*weight)?;
            total += weight;
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Err(ContactError::InvalidParameter(
                "a discrete distribution needs positive total weight".to_string(),
            ));
        }

        let mut splits: Vec<Split> = Vec::new();
        let mut root = LEAF;
        // (bottom, top, parent handle, whether this is the parent's lower half)
        let mut pending = vec![(0, weights.len(), None::<(usize, bool)>)];
        while let Some((bottom, top, parent)) = pending.pop() {
            if top - bottom <= 1 {
                continue;
            }
            let mid = Self::midpoint(&cumulative, bottom, top);
            let handle = splits.len();
            splits.push(Split {
                mid,
                below: LEAF,
                above: LEAF,
            });
            match parent {
                None => root = handle,
                Some((parent, true)) => splits[parent].below = handle,
                Some((parent, false)) => splits[parent].above = handle,
            }
            pending.push((bottom, mid, Some((handle, true))));
            pending.push((mid, top, Some((handle, false))));
        }

        Ok(DiscreteDistribution {
            cumulative,
            splits,
            root,
        })
    }

    /// The index strictly inside `(bottom, top)` whose cumulative weight is closest to splitting
    /// the mass of the range in half.
    fn midpoint(cumulative: &[f64], bottom: usize, top: usize) -> usize {
        let target = 0.5 * (cumulative[bottom] + cumulative[top]);
        let (mut low, mut high) = (bottom, top);
        while high - low > 1 {
            let mid = (low + high) / 2;
            if cumulative[mid] < target {
                low = mid;
            } else {
                high = mid;
            }
        }
        high.clamp(bottom + 1, top - 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cumulative.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.cumulative[self.len()]
    }

    /// The total weight of bins `0..=index`.
    #[must_use]
    pub fn cumulative(&self, index: usize) -> Option<f64> {
        self.cumulative.get(index + 1).copied()
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let dice = (1.0 - rng.random::<f64>()) * self.total();
        let (mut bottom, mut top) = (0, self.len());
        let mut handle = self.root;
        while top - bottom > 1 {
            let split = self.splits[handle];
            if self.cumulative[split.mid] < dice {
                bottom = split.mid;
                handle = split.above;
            } else {
                top = split.mid;
                handle = split.below;
            }
        }
        top - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::numeric::SampleMoments;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn weighted_sampler_respects_weights() {
        let sampler = WeightedSampler::from_pairs([("a", 1.0), ("b", 0.0), ("c", 3.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut c_count = 0;
        for _ in 0..20_000 {
            let label = sampler.draw(&mut rng).unwrap();
            assert_ne!(label, "b");
            if label == "c" {
                c_count += 1;
            }
        }
        let share = f64::from(c_count) / 20_000.0;
        assert!((share - 0.75).abs() < 0.015, "share was {share}");
    }

    #[test]
    fn weighted_sampler_updates() {
        let mut sampler = WeightedSampler::from_weights(&[1.0, 1.0]).unwrap();
        sampler.set_weight(0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(sampler.draw(&mut rng), Some(1));
        }
        sampler.set_weight(1, 0.0).unwrap();
        assert_eq!(sampler.draw(&mut rng), None);
        assert!(sampler.set_weight(2, 1.0).is_err());
        assert!(sampler.set_weight(0, -1.0).is_err());
        assert!(WeightedSampler::from_weights(&[f64::NAN]).is_err());
    }

    #[test]
    fn discrete_gamma_has_requested_mean() {
        for shape in [1, 2, 3, 5] {
            let gamma = discrete_gamma(5.2, shape, None).unwrap();
            assert_eq!(gamma.weight(0), Some(0.0));
            assert_almost_eq!(gamma.total_weight(), 1.0, 1e-9);
            assert_almost_eq!(gamma.mean(), 5.2, 1e-6);
        }
    }

    #[test]
    fn discrete_gamma_cutoff_limits_support() {
        let gamma = discrete_gamma(5.0, 2, Some(10)).unwrap();
        assert_eq!(gamma.len(), 10);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            let value = gamma.draw(&mut rng).unwrap();
            assert!((1..10).contains(&value));
        }
        assert!(discrete_gamma(0.5, 2, None).is_err());
        assert!(discrete_gamma(1.0, 2, None).is_err());
        assert!(discrete_gamma(1.0001, 1, None).is_ok());
        assert!(discrete_gamma(3.0, 0, None).is_err());
    }

    #[test]
    fn discrete_exponential_mean() {
        let exponential = discrete_exponential(3.0, None).unwrap();
        assert_almost_eq!(exponential.mean(), 3.0, 1e-6);
        let mut rng = StdRng::seed_from_u64(9);
        let mut moments = SampleMoments::new();
        for _ in 0..50_000 {
            #[allow(clippy::cast_precision_loss)]
            moments.push(exponential.draw(&mut rng).unwrap() as f64);
        }
        assert!((moments.mean() - 3.0).abs() < 0.1, "mean was {}", moments.mean());
    }

    #[test]
    fn distribution_draws_match_cdf() {
        let weights = [0.0, 1.0, 0.0, 6.0, 2.0, 1.0];
        let distribution = DiscreteDistribution::new(&weights).unwrap();
        assert_eq!(distribution.len(), 6);
        assert_almost_eq!(distribution.total(), 10.0, 1e-12);
        assert_eq!(distribution.cumulative(3), Some(7.0));

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 6];
        for _ in 0..50_000 {
            counts[distribution.draw(&mut rng)] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        for (count, weight) in counts.iter().zip(weights) {
            let share = f64::from(*count) / 50_000.0;
            assert!((share - weight / 10.0).abs() < 0.01);
        }
    }

    #[test]
    fn distribution_edge_cases() {
        let single = DiscreteDistribution::new(&[2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(single.draw(&mut rng), 0);
        assert!(DiscreteDistribution::new(&[]).is_err());
        assert!(DiscreteDistribution::new(&[0.0, 0.0]).is_err());
    }
}
