//! Floating point helpers: tolerance comparisons built on the `approx` crate and a running
//! mean/variance accumulator used to summarize calibration runs and sampler output.

use approx::AbsDiffEq;

/// Targeted accuracy instantiated over `f64`
pub const ACC: f64 = 10e-11;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Compares if two floats agree to within a relative tolerance `max_relative`.
#[must_use]
pub fn relative_eq(a: f64, b: f64, max_relative: f64) -> bool {
    approx::relative_eq!(a, b, max_relative = max_relative)
}

/// Welford's online mean and variance.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleMoments {
    count: u64,
    mean: f64,
    sum_squares: f64,
}

impl SampleMoments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.sum_squares += delta * (value - self.mean);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// The unbiased sample variance; zero with fewer than two samples.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let denominator = (self.count - 1) as f64;
        self.sum_squares / denominator
    }
}

impl Extend<f64> for SampleMoments {
    fn extend<T: IntoIterator<Item = f64>>(&mut self, iter: T) {
        for value in iter {
            self.push(value);
        }
    }
}
