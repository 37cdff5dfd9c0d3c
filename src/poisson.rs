//! A Poisson sampler for arbitrary, per-call intensities.
//!
//! Intensities change on every call (they are products of a rate and the current number of
//! available partners), so the sampler cannot precompute one distribution per intensity.
//! Instead it keeps precomputed tables for the checkpoint intensities `base * 2^i` and splits
//! a requested intensity into a sum of checkpoints plus a residual below `base`. Since the sum
//! of independent Poisson variables is Poisson with the summed intensity, the draws from each
//! part add up to a draw for the whole. The residual is split further into a few equal parts
//! that are each sampled by series inversion.
//!
//! The checkpoint tables are append-only. A sampler is shared through an `Arc` by every
//! process and channel of an orchestrator; the tables sit behind a `RwLock` so that growth for
//! an unusually large intensity is visible to every holder.

use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use rand::Rng;

/// Densities below this value are left out of the tables and end series inversion.
const DENSITY_FLOOR: f64 = 1e-20;

/// The tabulated support of a Poisson distribution with an integer intensity.
#[derive(Debug)]
struct PoissonTable {
    /// The smallest value in the table.
    offset: u64,
    cumulative: Vec<f64>,
}

/// `ln(n!)`, summed exactly for small `n` and from Stirling's series otherwise.
fn ln_factorial(n: u64) -> f64 {
    if n < 16 {
        #[allow(clippy::cast_precision_loss)]
        let exact: f64 = (2..=n).map(|k| (k as f64).ln()).sum();
        return exact;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    let inverse = 1.0 / n;
    let inverse_squared = inverse * inverse;
    let correction =
        inverse * (1.0 / 12.0 - inverse_squared * (1.0 / 360.0 - inverse_squared / 1260.0));
    n * n.ln() - n + 0.5 * (std::f64::consts::TAU * n).ln() + correction
}

impl PoissonTable {
    fn new(intensity: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let lambda = intensity as f64;
        let at_mode = (-lambda + lambda * lambda.ln() - ln_factorial(intensity)).exp();

        let mut above = Vec::new();
        let mut density = at_mode;
        let mut k = intensity;
        while density > DENSITY_FLOOR {
            above.push(density);
            k += 1;
            #[allow(clippy::cast_precision_loss)]
            let step = lambda / k as f64;
            density *= step;
        }

        let mut below = Vec::new();
        let mut k = intensity;
        let mut density = at_mode;
        while k > 0 {
            #[allow(clippy::cast_precision_loss)]
            let step = k as f64 / lambda;
            density *= step;
            if density <= DENSITY_FLOOR {
                break;
            }
            below.push(density);
            k -= 1;
        }

        let offset = intensity - below.len() as u64;
        let total: f64 = below.iter().chain(above.iter()).sum();
        let mut running = 0.0;
        let cumulative = below
            .iter()
            .rev()
            .chain(above.iter())
            .map(|density| {
                running += density / total;
                running
            })
            .collect();
        PoissonTable { offset, cumulative }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        self.locate(rng.random::<f64>())
    }

    /// The value whose cumulative probability first reaches `u`. Rounding can leave the last
    /// cumulative value just below 1; such `u` map to the last tabulated value.
    fn locate(&self, u: f64) -> u64 {
        let index = self
            .cumulative
            .partition_point(|c| *c < u)
            .min(self.cumulative.len() - 1);
        self.offset + index as u64
    }
}

/// Samples a Poisson variable with a small intensity by walking its cumulative distribution.
fn invert<R: Rng + ?Sized>(rng: &mut R, intensity: f64) -> u64 {
    let u = rng.random::<f64>();
    let mut term = (-intensity).exp();
    let mut cumulative = term;
    let mut k = 0;
    while cumulative < u {
        k += 1;
        #[allow(clippy::cast_precision_loss)]
        let step = intensity / k as f64;
        term *= step;
        cumulative += term;
        if term < DENSITY_FLOOR {
            break;
        }
    }
    k
}

#[derive(Debug)]
pub struct PoissonSampler {
    base: u32,
    tables: RwLock<Vec<Arc<PoissonTable>>>,
}

impl Default for PoissonSampler {
    fn default() -> Self {
        PoissonSampler::new(8, 1024)
    }
}

impl PoissonSampler {
    /// Creates a sampler with checkpoints `base, 2 * base, ...` up to at least `ceiling`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is zero.
    #[must_use]
    pub fn new(base: u32, ceiling: u32) -> Self {
        assert!(base > 0, "the base checkpoint of a Poisson sampler must be positive");
        let mut tables = vec![Arc::new(PoissonTable::new(u64::from(base)))];
        let mut checkpoint = u64::from(base);
        while checkpoint < u64::from(ceiling) {
            checkpoint *= 2;
            tables.push(Arc::new(PoissonTable::new(checkpoint)));
        }
        PoissonSampler {
            base,
            tables: RwLock::new(tables),
        }
    }

    /// Number of precomputed checkpoint tables.
    #[must_use]
    pub fn checkpoint_count(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The largest precomputed checkpoint intensity.
    #[must_use]
    pub fn largest_checkpoint(&self) -> u64 {
        u64::from(self.base) << (self.checkpoint_count() - 1)
    }

    /// Adds checkpoint tables until the largest one covers `intensity`.
    fn ensure_covers(&self, intensity: f64) {
        #[allow(clippy::cast_precision_loss)]
        let largest = self.largest_checkpoint() as f64;
        if intensity <= largest {
            return;
        }
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut largest = u64::from(self.base) << (tables.len() - 1);
        // Another holder may have grown the tables since the check above.
        #[allow(clippy::cast_precision_loss)]
        while (largest as f64) < intensity {
            largest *= 2;
            debug!("adding Poisson checkpoint table for intensity {largest}");
            tables.push(Arc::new(PoissonTable::new(largest)));
        }
    }

    /// Draws from a Poisson distribution with the given intensity.
    ///
    /// # Panics
    ///
    /// Panics if `intensity` is negative, NaN or infinite.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, intensity: f64) -> u64 {
        assert!(
            intensity.is_finite() && intensity >= 0.0,
            "Poisson intensity must be finite and non-negative, got {intensity}"
        );
        self.ensure_covers(intensity);

        let base = f64::from(self.base);
        let mut remaining = intensity;
        let mut total = 0;
        {
            let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
            while remaining >= base {
                let mut checkpoint = base;
                let mut index = 0;
                while remaining > 2.0 * checkpoint {
                    checkpoint *= 2.0;
                    index += 1;
                }
                total += tables[index].draw(rng);
                remaining -= checkpoint;
            }
        }

        if remaining > 0.0 {
            let repeats = 1.0 + (remaining / 2.0).floor();
            let part = remaining / repeats;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let repeats = repeats as u32;
            for _ in 0..repeats {
                total += invert(rng, part);
            }
        }
        total
    }
}
