//! Small statistical helpers shared by the engine, aggregator and reporter.

use ramia_core::{RamiaError, Result};
use statrs::distribution::{Continuous, Normal};
use statrs::statistics::{Data, Median, Statistics};

/// Sample moments of one reference set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Moments {
    /// Number of observations.
    pub count: usize,
    /// Sample mean, `None` when empty.
    pub mean: Option<f64>,
    /// Unbiased sample variance, `None` below two observations.
    pub variance: Option<f64>,
}

impl Moments {
    /// Moments of `values`.
    pub fn of(values: &[f64]) -> Self {
        let count = values.len();
        let mean = (count > 0).then(|| mean(values));
        let variance = (count > 1).then(|| values.iter().variance());
        Self {
            count,
            mean,
            variance,
        }
    }
}

/// Arithmetic mean, NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample standard deviation, `None` below two observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    (values.len() > 1).then(|| values.iter().std_dev())
}

/// Pooled variance of two samples, each with at least two observations.
pub fn pooled_variance(a: &Moments, b: &Moments) -> Option<f64> {
    let (va, vb) = (a.variance?, b.variance?);
    let dof = (a.count + b.count).checked_sub(2)?;
    if dof == 0 {
        return None;
    }
    Some(((a.count - 1) as f64 * va + (b.count - 1) as f64 * vb) / dof as f64)
}

/// Log-density of `x` under a Gaussian.
pub fn gaussian_ln_pdf(x: f64, mean: f64, variance: f64) -> Result<f64> {
    let normal = Normal::new(mean, variance.sqrt()).map_err(|e| {
        RamiaError::numerical(format!("gaussian(mean={mean}, var={variance}): {e}"))
    })?;
    Ok(normal.ln_pdf(x))
}

/// Median (mean of the two middle values for even counts), NaN for empty
/// input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    Data::new(values.to_vec()).median()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments_of_small_samples() {
        let empty = Moments::of(&[]);
        assert_eq!(empty.mean, None);
        let one = Moments::of(&[2.0]);
        assert_eq!(one.mean, Some(2.0));
        assert_eq!(one.variance, None);
        let two = Moments::of(&[0.9, 0.95]);
        assert!((two.mean.unwrap() - 0.925).abs() < 1e-12);
        assert!((two.variance.unwrap() - 0.00125).abs() < 1e-12);
    }

    #[test]
    fn mean_is_exact_for_constant_input() {
        let values = vec![0.1; 7];
        assert_eq!(mean(&values), 0.1);
    }

    #[test]
    fn pooled_variance_weights_by_dof() {
        let a = Moments::of(&[1.0, 3.0]);
        let b = Moments::of(&[0.0, 0.0, 0.0]);
        assert!((pooled_variance(&a, &b).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(pooled_variance(&a, &Moments::of(&[1.0])), None);
    }

    #[test]
    fn ln_pdf_matches_closed_form() {
        let value = gaussian_ln_pdf(1.0, 0.0, 4.0).unwrap();
        let expected = -0.5 * (2.0 * std::f64::consts::PI * 4.0).ln() - 1.0 / 8.0;
        assert!((value - expected).abs() < 1e-12);
        assert!(gaussian_ln_pdf(0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[10.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[]).is_nan());
    }
}
