//! Synthetic signals for tests and demonstrations.

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use ramia_core::{MembershipMatrix, RamiaError, Result, SignalMatrix};

/// Generate a signal matrix where members sit `separation` above
/// non-members.
///
/// Each record gets its own difficulty offset drawn from `N(0, 1)`, shared
/// by every model, and each (model, record) cell adds `N(0, noise^2)`.
pub fn synthetic_signal_matrix<R: Rng + ?Sized>(
    rng: &mut R,
    membership: &MembershipMatrix,
    separation: f64,
    noise: f64,
) -> Result<SignalMatrix> {
    if !noise.is_finite() || noise < 0.0 {
        return Err(RamiaError::invalid(format!(
            "noise must be finite and non-negative, got {noise}"
        )));
    }
    if !separation.is_finite() {
        return Err(RamiaError::invalid(format!(
            "separation must be finite, got {separation}"
        )));
    }
    let difficulty_dist =
        Normal::new(0.0, 1.0).map_err(|e| RamiaError::invalid(e.to_string()))?;
    let noise_dist = Normal::new(0.0, noise).map_err(|e| RamiaError::invalid(e.to_string()))?;

    let difficulty: Vec<f64> = (0..membership.num_records())
        .map(|_| difficulty_dist.sample(rng))
        .collect();
    let mut values = Array2::zeros((membership.num_models(), membership.num_records()));
    for ((model, record), cell) in values.indexed_iter_mut() {
        let shift = if membership.is_member(model, record) {
            separation
        } else {
            0.0
        };
        *cell = difficulty[record] + shift + noise_dist.sample(rng);
    }
    SignalMatrix::from_array(values)
}
