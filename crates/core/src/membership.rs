//! Ground-truth membership labels and the paired model ensemble.
//!
//! Models are trained in pairs over complementary halves of the dataset,
//! so every record is a member of exactly one model in each pair. Pairs
//! are represented explicitly so that "the target and its twin" is a
//! lookup rather than an index convention spread across the code.

use ndarray::{Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RamiaError, Result};

/// Two models trained on complementary splits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelPair {
    /// Model trained on the pair's first half.
    pub first: usize,
    /// Model trained on the complement.
    pub twin: usize,
}

impl ModelPair {
    /// Whether `model` belongs to this pair.
    pub fn contains(&self, model: usize) -> bool {
        self.first == model || self.twin == model
    }

    /// The other model of the pair, if `model` belongs to it.
    pub fn partner(&self, model: usize) -> Option<usize> {
        if model == self.first {
            Some(self.twin)
        } else if model == self.twin {
            Some(self.first)
        } else {
            None
        }
    }
}

/// All trained pairs of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedEnsemble {
    pairs: Vec<ModelPair>,
    num_models: usize,
}

impl PairedEnsemble {
    /// Standard layout: pair `i` holds models `2i` and `2i + 1`.
    pub fn interleaved(num_pairs: usize) -> Self {
        let pairs = (0..num_pairs)
            .map(|i| ModelPair {
                first: 2 * i,
                twin: 2 * i + 1,
            })
            .collect();
        Self {
            pairs,
            num_models: 2 * num_pairs,
        }
    }

    /// Build from explicit pairs. Every model index in `0..2 * pairs.len()`
    /// must appear exactly once.
    pub fn from_pairs(pairs: Vec<ModelPair>) -> Result<Self> {
        let num_models = 2 * pairs.len();
        let mut seen = vec![false; num_models];
        for pair in &pairs {
            for model in [pair.first, pair.twin] {
                if model >= num_models {
                    return Err(RamiaError::invalid(format!(
                        "model {model} out of range for {num_models} models"
                    )));
                }
                if seen[model] {
                    return Err(RamiaError::invalid(format!(
                        "model {model} appears in more than one pair"
                    )));
                }
                seen[model] = true;
            }
        }
        Ok(Self { pairs, num_models })
    }

    /// Trained pairs in order.
    pub fn pairs(&self) -> &[ModelPair] {
        &self.pairs
    }

    /// Total number of models.
    pub fn num_models(&self) -> usize {
        self.num_models
    }

    /// The pair containing `model`.
    pub fn pair_of(&self, model: usize) -> Option<&ModelPair> {
        self.pairs.iter().find(|p| p.contains(model))
    }

    /// The model trained on the complement of `model`'s split.
    pub fn twin(&self, model: usize) -> Option<usize> {
        self.pair_of(model).and_then(|p| p.partner(model))
    }
}

/// `M[model][record]`: whether a record was in a model's training set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipMatrix {
    labels: Array2<bool>,
}

impl MembershipMatrix {
    /// Wrap a `(models, records)` label array.
    pub fn new(labels: Array2<bool>) -> Self {
        Self { labels }
    }

    /// Build from one row of labels per model.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self> {
        let num_models = rows.len();
        let num_records = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != num_records) {
            return Err(RamiaError::shape(format!(
                "membership row {bad} has {} records, expected {num_records}",
                rows[bad].len()
            )));
        }
        let flat: Vec<bool> = rows.into_iter().flatten().collect();
        let labels = Array2::from_shape_vec((num_models, num_records), flat)
            .map_err(|e| RamiaError::shape(e.to_string()))?;
        Ok(Self { labels })
    }

    /// Number of models (rows).
    pub fn num_models(&self) -> usize {
        self.labels.nrows()
    }

    /// Number of records (columns).
    pub fn num_records(&self) -> usize {
        self.labels.ncols()
    }

    /// Whether `record` was in `model`'s training set.
    pub fn is_member(&self, model: usize, record: usize) -> bool {
        self.labels[[model, record]]
    }

    /// Labels of one model across all records.
    pub fn row(&self, model: usize) -> ArrayView1<'_, bool> {
        self.labels.row(model)
    }

    /// Labels of one record across all models.
    pub fn column(&self, record: usize) -> ArrayView1<'_, bool> {
        self.labels.column(record)
    }

    /// Underlying label array.
    pub fn as_array(&self) -> &Array2<bool> {
        &self.labels
    }

    /// Keep only the given record columns, in the given order.
    pub fn select_records(&self, records: &[usize]) -> Result<Self> {
        if let Some(&bad) = records.iter().find(|&&r| r >= self.num_records()) {
            return Err(RamiaError::shape(format!(
                "record {bad} out of range for {} records",
                self.num_records()
            )));
        }
        Ok(Self {
            labels: self.labels.select(Axis(1), records),
        })
    }

    /// Repeat every column `factor` times consecutively, so that range
    /// point `b * factor + j` carries the label of base record `b`.
    pub fn repeat_columns(&self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(RamiaError::config("range.sample_size", "must be positive"));
        }
        let num_base = self.num_records();
        let labels = Array2::from_shape_fn((self.num_models(), num_base * factor), |(m, c)| {
            self.labels[[m, c / factor]]
        });
        Ok(Self { labels })
    }

    /// Check that every pair of `ensemble` splits each record between its
    /// two models.
    pub fn check_complementary(&self, ensemble: &PairedEnsemble) -> Result<()> {
        if ensemble.num_models() != self.num_models() {
            return Err(RamiaError::shape(format!(
                "ensemble has {} models, membership matrix has {}",
                ensemble.num_models(),
                self.num_models()
            )));
        }
        for pair in ensemble.pairs() {
            let first = self.row(pair.first);
            let twin = self.row(pair.twin);
            if let Some(record) = first.iter().zip(twin.iter()).position(|(a, b)| a == b) {
                return Err(RamiaError::invalid(format!(
                    "models {} and {} agree on record {record}",
                    pair.first, pair.twin
                )));
            }
        }
        Ok(())
    }
}

/// Split `dataset_size` records across `num_pairs` trained pairs.
///
/// Each pair draws a uniformly random half for its first model and gives
/// the complement to its twin.
pub fn split_dataset_for_training<R: Rng>(
    dataset_size: usize,
    num_pairs: usize,
    rng: &mut R,
) -> Result<(PairedEnsemble, MembershipMatrix)> {
    if dataset_size == 0 {
        return Err(RamiaError::invalid("dataset_size must be positive"));
    }
    if num_pairs == 0 {
        return Err(RamiaError::invalid("num_pairs must be positive"));
    }
    let ensemble = PairedEnsemble::interleaved(num_pairs);
    let mut labels = Array2::from_elem((ensemble.num_models(), dataset_size), false);
    let mut indices: Vec<usize> = (0..dataset_size).collect();
    let half = dataset_size / 2;
    for pair in ensemble.pairs() {
        indices.shuffle(rng);
        for (pos, &record) in indices.iter().enumerate() {
            let in_first = pos < half;
            labels[[pair.first, record]] = in_first;
            labels[[pair.twin, record]] = !in_first;
        }
    }
    Ok((ensemble, MembershipMatrix::new(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn interleaved_twins() {
        let ensemble = PairedEnsemble::interleaved(3);
        assert_eq!(ensemble.num_models(), 6);
        assert_eq!(ensemble.twin(0), Some(1));
        assert_eq!(ensemble.twin(5), Some(4));
        assert_eq!(ensemble.twin(6), None);
    }

    #[test]
    fn from_pairs_rejects_reuse() {
        let pairs = vec![
            ModelPair { first: 0, twin: 1 },
            ModelPair { first: 1, twin: 2 },
        ];
        assert!(PairedEnsemble::from_pairs(pairs).is_err());
    }

    #[test]
    fn split_is_complementary_and_balanced() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let (ensemble, membership) = split_dataset_for_training(100, 4, &mut rng).unwrap();
        membership.check_complementary(&ensemble).unwrap();
        for pair in ensemble.pairs() {
            let members = membership.row(pair.first).iter().filter(|&&m| m).count();
            assert_eq!(members, 50);
        }
    }

    #[test]
    fn repeat_columns_propagates_base_label() {
        let membership =
            MembershipMatrix::from_rows(vec![vec![true, false], vec![false, true]]).unwrap();
        let expanded = membership.repeat_columns(3).unwrap();
        assert_eq!(expanded.num_records(), 6);
        for model in 0..2 {
            for point in 0..6 {
                assert_eq!(
                    expanded.is_member(model, point),
                    membership.is_member(model, point / 3)
                );
            }
        }
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = MembershipMatrix::from_rows(vec![vec![true], vec![true, false]]).unwrap_err();
        assert!(matches!(err, RamiaError::ShapeMismatch { .. }));
    }

    #[test]
    fn select_records_keeps_order() {
        let membership =
            MembershipMatrix::from_rows(vec![vec![true, false, true], vec![false, true, false]])
                .unwrap();
        let subset = membership.select_records(&[2, 1]).unwrap();
        assert_eq!(subset.num_records(), 2);
        assert!(subset.is_member(0, 0));
        assert!(subset.is_member(1, 1));
        assert!(membership.select_records(&[3]).is_err());
    }
}
