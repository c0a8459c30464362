//! ROC curves over membership scores.
//!
//! Thresholds sweep from `+inf` down through every distinct score; tied
//! scores move together. Points are kept as raw counts so the AUC can be
//! integrated exactly and divided once.

use serde::Serialize;

use ramia_core::{RamiaError, Result};

/// A receiver operating characteristic curve.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RocCurve {
    /// False-positive rate at each threshold, non-decreasing.
    pub fpr: Vec<f64>,
    /// True-positive rate at each threshold, non-decreasing.
    pub tpr: Vec<f64>,
    /// Score threshold; a record is predicted member when `score >= threshold`.
    pub thresholds: Vec<f64>,
    #[serde(skip)]
    tp_counts: Vec<u64>,
    #[serde(skip)]
    fp_counts: Vec<u64>,
    num_members: u64,
    num_non_members: u64,
}

impl RocCurve {
    /// Compute the curve for `scores` against ground-truth `labels`.
    ///
    /// Both classes must be present.
    pub fn compute(scores: &[f64], labels: &[bool]) -> Result<Self> {
        if scores.len() != labels.len() {
            return Err(RamiaError::shape(format!(
                "{} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }
        if let Some(pos) = scores.iter().position(|s| s.is_nan()) {
            return Err(RamiaError::numerical(format!("score {pos} is NaN")));
        }
        let num_members = labels.iter().filter(|&&l| l).count() as u64;
        let num_non_members = labels.len() as u64 - num_members;
        if num_members == 0 || num_non_members == 0 {
            return Err(RamiaError::invalid(format!(
                "ROC needs both classes, got {num_members} members and {num_non_members} non-members"
            )));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut thresholds = vec![f64::INFINITY];
        let mut tp_counts = vec![0u64];
        let mut fp_counts = vec![0u64];
        let (mut tp, mut fp) = (0u64, 0u64);
        for (pos, &i) in order.iter().enumerate() {
            if labels[i] {
                tp += 1;
            } else {
                fp += 1;
            }
            let last_of_tie = order
                .get(pos + 1)
                .map_or(true, |&next| scores[next] != scores[i]);
            if last_of_tie {
                thresholds.push(scores[i]);
                tp_counts.push(tp);
                fp_counts.push(fp);
            }
        }

        let tpr = tp_counts
            .iter()
            .map(|&c| c as f64 / num_members as f64)
            .collect();
        let fpr = fp_counts
            .iter()
            .map(|&c| c as f64 / num_non_members as f64)
            .collect();
        Ok(Self {
            fpr,
            tpr,
            thresholds,
            tp_counts,
            fp_counts,
            num_members,
            num_non_members,
        })
    }

    /// Number of member records.
    pub fn num_members(&self) -> u64 {
        self.num_members
    }

    /// Number of non-member records.
    pub fn num_non_members(&self) -> u64 {
        self.num_non_members
    }

    /// Area under the curve by the trapezoidal rule.
    pub fn auc(&self) -> f64 {
        let mut twice_area: u128 = 0;
        for i in 1..self.tp_counts.len() {
            let dx = (self.fp_counts[i] - self.fp_counts[i - 1]) as u128;
            let heights = (self.tp_counts[i] + self.tp_counts[i - 1]) as u128;
            twice_area += dx * heights;
        }
        let denom = 2 * self.num_members as u128 * self.num_non_members as u128;
        twice_area as f64 / denom as f64
    }

    /// TPR at a fixed FPR.
    ///
    /// When the curve passes through `fpr` the highest TPR reached there is
    /// returned; otherwise the two bracketing points are interpolated
    /// linearly.
    pub fn tpr_at_fpr(&self, fpr: f64) -> f64 {
        let fpr = fpr.clamp(0.0, 1.0);
        let target = fpr * self.num_non_members as f64;
        // First point strictly beyond the target.
        let idx = self
            .fp_counts
            .partition_point(|&c| c as f64 <= target);
        if idx == 0 {
            return 0.0;
        }
        let left = idx - 1;
        if self.fp_counts[left] as f64 == target || idx == self.fp_counts.len() {
            return self.tpr[left];
        }
        let (x0, x1) = (self.fp_counts[left] as f64, self.fp_counts[idx] as f64);
        let q = (target - x0) / (x1 - x0);
        (self.tpr[left] + q * (self.tpr[idx] - self.tpr[left])).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn perfect_separation_has_unit_auc() {
        let scores = [0.9, 0.8, 0.7, 0.3, 0.2, 0.1, 0.05];
        let labels = [true, true, true, false, false, false, false];
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert_eq!(roc.auc(), 1.0);
        assert_eq!(roc.tpr_at_fpr(0.0), 1.0);
    }

    #[test]
    fn inverted_scores_have_zero_auc() {
        let scores = [0.1, 0.2, 0.8, 0.9];
        let labels = [true, true, false, false];
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert_eq!(roc.auc(), 0.0);
    }

    #[test]
    fn ties_give_half_credit() {
        let scores = [0.5, 0.5];
        let labels = [true, false];
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert_eq!(roc.fpr, vec![0.0, 1.0]);
        assert_eq!(roc.tpr, vec![0.0, 1.0]);
        assert_eq!(roc.auc(), 0.5);
    }

    #[test]
    fn curve_starts_and_ends_at_corners() {
        let scores = [3.0, 1.0, 2.0, 0.0];
        let labels = [true, false, true, false];
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert_eq!((roc.fpr[0], roc.tpr[0]), (0.0, 0.0));
        assert_eq!((*roc.fpr.last().unwrap(), *roc.tpr.last().unwrap()), (1.0, 1.0));
        assert!(roc.thresholds[0].is_infinite());
    }

    #[test]
    fn tpr_takes_best_point_on_vertical_steps() {
        // Points: (0,0) (0,0.5) (0.5,0.5) (0.5,1) (1,1)
        let scores = [4.0, 3.0, 2.0, 1.0];
        let labels = [true, false, true, false];
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert_eq!(roc.tpr_at_fpr(0.0), 0.5);
        assert_eq!(roc.tpr_at_fpr(0.5), 1.0);
        assert_eq!(roc.tpr_at_fpr(0.25), 0.5);
    }

    #[test]
    fn tpr_interpolates_across_tied_scores() {
        // The tie at 2.0 yields a diagonal from (0,0.5) to (0.5,1).
        let scores = [3.0, 2.0, 2.0, 1.0];
        let labels = [true, true, false, false];
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert_eq!(roc.fpr, vec![0.0, 0.0, 0.5, 1.0]);
        assert!((roc.tpr_at_fpr(0.25) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn single_class_is_rejected() {
        assert!(RocCurve::compute(&[0.1, 0.2], &[true, true]).is_err());
        assert!(RocCurve::compute(&[0.1], &[true, false]).is_err());
    }

    proptest! {
        #[test]
        fn auc_is_a_probability(
            pairs in proptest::collection::vec((-10.0f64..10.0, any::<bool>()), 2..64),
        ) {
            let scores: Vec<f64> = pairs.iter().map(|p| p.0).collect();
            let labels: Vec<bool> = pairs.iter().map(|p| p.1).collect();
            prop_assume!(labels.iter().any(|&l| l) && labels.iter().any(|&l| !l));
            let roc = RocCurve::compute(&scores, &labels).unwrap();
            let auc = roc.auc();
            prop_assert!((0.0..=1.0).contains(&auc));
            prop_assert!(roc.fpr.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(roc.tpr.windows(2).all(|w| w[0] <= w[1]));
            for fpr in [0.0, 0.001, 0.1, 0.5, 1.0] {
                let tpr = roc.tpr_at_fpr(fpr);
                prop_assert!((0.0..=1.0).contains(&tpr));
            }
        }

        #[test]
        fn auc_matches_pairwise_ranking(
            pairs in proptest::collection::vec((0u8..6, any::<bool>()), 2..40),
        ) {
            let scores: Vec<f64> = pairs.iter().map(|p| p.0 as f64).collect();
            let labels: Vec<bool> = pairs.iter().map(|p| p.1).collect();
            prop_assume!(labels.iter().any(|&l| l) && labels.iter().any(|&l| !l));
            let mut wins = 0.0;
            let mut total = 0.0;
            for (i, &li) in labels.iter().enumerate() {
                for (j, &lj) in labels.iter().enumerate() {
                    if li && !lj {
                        total += 1.0;
                        if scores[i] > scores[j] {
                            wins += 1.0;
                        } else if scores[i] == scores[j] {
                            wins += 0.5;
                        }
                    }
                }
            }
            let roc = RocCurve::compute(&scores, &labels).unwrap();
            prop_assert!((roc.auc() - wins / total).abs() < 1e-12);
        }
    }
}
