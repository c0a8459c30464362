//! Trimmed aggregation of range-point scores.
//!
//! Each base record's range group is sorted, the configured tails are
//! dropped, and the remaining scores are reduced with the configured
//! statistic. Sorting first makes the result independent of the order in
//! which range points were generated.

use ndarray::{Array2, ArrayView1, Axis, Slice};
use rayon::prelude::*;

use ramia_core::{AggregationStatistic, AuditConfig, RamiaError, RangeGroups, Result, TrimConfig};

use crate::likelihood::AuditScores;
use crate::stats::{mean, median};

/// `A'[target][base]` for a set of target models.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedScores {
    targets: Vec<usize>,
    scores: Array2<f64>,
}

impl AggregatedScores {
    /// Target model of each row.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Number of base records (columns).
    pub fn num_base(&self) -> usize {
        self.scores.ncols()
    }

    /// Aggregated scores of the `i`-th target row.
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.scores.row(i)
    }

    /// Score matrix.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.scores
    }
}

/// Collapses each range group into one score.
#[derive(Clone, Debug, PartialEq)]
pub struct TrimmedAggregator {
    trim: TrimConfig,
    statistic: AggregationStatistic,
    sample_size: usize,
    low: usize,
    high: usize,
}

impl TrimmedAggregator {
    /// Build an aggregator for groups of `sample_size` range points.
    ///
    /// Fails if the trim policy would discard every point.
    pub fn new(
        trim: TrimConfig,
        statistic: AggregationStatistic,
        sample_size: usize,
    ) -> Result<Self> {
        if sample_size == 0 {
            return Err(RamiaError::config("range.sample_size", "must be positive"));
        }
        if !trim.fraction.is_finite() || !(0.0..1.0).contains(&trim.fraction) {
            return Err(RamiaError::config(
                "trim.fraction",
                format!("must be in [0, 1), got {}", trim.fraction),
            ));
        }
        let (low, high) = trim.trim_counts(sample_size);
        if low + high >= sample_size {
            return Err(RamiaError::config(
                "trim.fraction",
                format!(
                    "trimming {low} low and {high} high points removes all {sample_size} range points"
                ),
            ));
        }
        Ok(Self {
            trim,
            statistic,
            sample_size,
            low,
            high,
        })
    }

    /// Aggregator settings taken from a run configuration.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        Self::new(config.trim.clone(), config.statistic, config.range.sample_size)
    }

    /// Points dropped from the low and high tails of each group.
    pub fn trim_counts(&self) -> (usize, usize) {
        (self.low, self.high)
    }

    /// Reduce one range group.
    pub fn aggregate_group(&self, scores: &[f64]) -> Result<f64> {
        if scores.len() != self.sample_size {
            return Err(RamiaError::shape(format!(
                "range group has {} scores, expected {}",
                scores.len(),
                self.sample_size
            )));
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        let kept = &sorted[self.low..self.sample_size - self.high];
        Ok(match self.statistic {
            AggregationStatistic::Mean => mean(kept),
            AggregationStatistic::Median => median(kept),
        })
    }

    /// Reduce every group of one target's range-point scores.
    pub fn aggregate_row(
        &self,
        row: ArrayView1<'_, f64>,
        groups: &RangeGroups,
    ) -> Result<Vec<f64>> {
        self.check_groups(row.len(), groups)?;
        (0..groups.num_base())
            .map(|base| {
                let span = groups.group(base);
                let group = row.slice_axis(Axis(0), Slice::from(span)).to_vec();
                self.aggregate_group(&group)
            })
            .collect()
    }

    /// Reduce every row of an audit score matrix.
    pub fn aggregate(
        &self,
        scores: &AuditScores,
        groups: &RangeGroups,
    ) -> Result<AggregatedScores> {
        self.check_groups(scores.num_records(), groups)?;
        let rows = (0..scores.targets().len())
            .into_par_iter()
            .map(|i| self.aggregate_row(scores.row(i), groups))
            .collect::<Result<Vec<_>>>()?;
        let num_targets = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((num_targets, groups.num_base()), flat)
            .map_err(|e| RamiaError::shape(e.to_string()))?;
        Ok(AggregatedScores {
            targets: scores.targets().to_vec(),
            scores: matrix,
        })
    }

    fn check_groups(&self, num_points: usize, groups: &RangeGroups) -> Result<()> {
        if groups.sample_size() != self.sample_size {
            return Err(RamiaError::shape(format!(
                "range groups hold {} points, aggregator expects {}",
                groups.sample_size(),
                self.sample_size
            )));
        }
        if groups.num_points() != num_points {
            return Err(RamiaError::shape(format!(
                "{num_points} range-point scores for {} range points",
                groups.num_points()
            )));
        }
        Ok(())
    }

    /// Trim policy in use.
    pub fn trim(&self) -> &TrimConfig {
        &self.trim
    }
}
