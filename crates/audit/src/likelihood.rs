//! Likelihood-ratio membership scoring.
//!
//! For a target model `t` and record `r`, Gaussians are fitted to the
//! signals of the reference models that trained on `r` (IN) and those that
//! did not (OUT). The score is
//!
//! ```text
//! log N(S[t][r]; mu_in, var_in) - log N(S[t][r]; mu_out, var_out)
//! ```
//!
//! Records whose IN or OUT set has fewer than two models cannot support a
//! variance estimate; they borrow a population-wide variance computed over
//! every record of the same target, and are reported back as fallbacks.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use tracing::{debug, warn};

use ramia_core::{
    AuditConfig, MembershipMatrix, PairedEnsemble, RamiaError, Result, SignalMatrix,
    VarianceMode,
};

use crate::reference::ReferencePool;
use crate::stats::{gaussian_ln_pdf, mean, pooled_variance, Moments};

/// A fitted one-dimensional Gaussian.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gaussian {
    /// Mean.
    pub mean: f64,
    /// Variance.
    pub variance: f64,
}

impl Gaussian {
    /// Log-density at `x`.
    pub fn ln_pdf(&self, x: f64) -> Result<f64> {
        gaussian_ln_pdf(x, self.mean, self.variance)
    }
}

/// `log p_in(x) - log p_out(x)`.
pub fn log_likelihood_ratio(x: f64, inside: &Gaussian, outside: &Gaussian) -> Result<f64> {
    Ok(inside.ln_pdf(x)? - outside.ln_pdf(x)?)
}

#[derive(Clone, Copy, Debug)]
struct RecordFit {
    inside: Moments,
    outside: Moments,
}

impl RecordFit {
    fn has_variance(&self) -> bool {
        self.inside.count >= 2 && self.outside.count >= 2
    }
}

/// Population-wide estimates used when a record's own sets are too small.
#[derive(Clone, Copy, Debug)]
struct Population {
    variance: f64,
    in_mean: Option<f64>,
    out_mean: Option<f64>,
}

/// Scores of one target model over every record.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetScores {
    /// Target model index.
    pub target: usize,
    /// One log-likelihood ratio per record.
    pub scores: Vec<f64>,
    /// Records scored with the population-wide fallback.
    pub fallback_records: Vec<usize>,
}

/// `A[target][record]` for a set of target models.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditScores {
    targets: Vec<usize>,
    scores: Array2<f64>,
    fallback_records: Vec<Vec<usize>>,
}

impl AuditScores {
    /// Assemble from per-target rows of equal length.
    pub fn from_targets(rows: Vec<TargetScores>) -> Result<Self> {
        let num_records = rows.first().map_or(0, |r| r.scores.len());
        if let Some(bad) = rows.iter().find(|r| r.scores.len() != num_records) {
            return Err(RamiaError::shape(format!(
                "target {} has {} scores, expected {num_records}",
                bad.target,
                bad.scores.len()
            )));
        }
        let num_targets = rows.len();
        let mut targets = Vec::with_capacity(num_targets);
        let mut fallback_records = Vec::with_capacity(num_targets);
        let mut flat = Vec::with_capacity(num_targets * num_records);
        for row in rows {
            targets.push(row.target);
            fallback_records.push(row.fallback_records);
            flat.extend(row.scores);
        }
        let scores = Array2::from_shape_vec((num_targets, num_records), flat)
            .map_err(|e| RamiaError::shape(e.to_string()))?;
        Ok(Self {
            targets,
            scores,
            fallback_records,
        })
    }

    /// Target model of each row.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Number of records (columns).
    pub fn num_records(&self) -> usize {
        self.scores.ncols()
    }

    /// Scores of the `i`-th target row.
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.scores.row(i)
    }

    /// Score matrix.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.scores
    }

    /// Records of the `i`-th target row that used the fallback.
    pub fn fallback_records(&self, i: usize) -> &[usize] {
        &self.fallback_records[i]
    }
}

/// Stateless likelihood-ratio scorer.
#[derive(Clone, Debug, PartialEq)]
pub struct LikelihoodRatioEngine {
    num_reference_models: usize,
    variance: VarianceMode,
    min_variance: f64,
}

impl LikelihoodRatioEngine {
    /// Create an engine using `num_reference_models` per target, taken as
    /// whole pairs.
    pub fn new(
        num_reference_models: usize,
        variance: VarianceMode,
        min_variance: f64,
    ) -> Result<Self> {
        if num_reference_models < 2 {
            return Err(RamiaError::config(
                "num_reference_models",
                format!("at least 2 required, got {num_reference_models}"),
            ));
        }
        if num_reference_models % 2 != 0 {
            return Err(RamiaError::config(
                "num_reference_models",
                format!("must be even so whole pairs are used, got {num_reference_models}"),
            ));
        }
        if !min_variance.is_finite() || min_variance <= 0.0 {
            return Err(RamiaError::config("min_variance", "must be positive"));
        }
        Ok(Self {
            num_reference_models,
            variance,
            min_variance,
        })
    }

    /// Engine settings taken from a run configuration.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        Self::new(
            config.num_reference_models,
            config.variance,
            config.min_variance,
        )
    }

    /// Score every record for each target in `targets`.
    pub fn score_targets(
        &self,
        targets: &[usize],
        signals: &SignalMatrix,
        membership: &MembershipMatrix,
        ensemble: &PairedEnsemble,
    ) -> Result<AuditScores> {
        check_shapes(signals, membership, ensemble)?;
        let rows = targets
            .par_iter()
            .map(|&t| self.score_checked(t, signals, membership, ensemble))
            .collect::<Result<Vec<_>>>()?;
        AuditScores::from_targets(rows)
    }

    /// Score every record for one target model.
    pub fn score_target(
        &self,
        target: usize,
        signals: &SignalMatrix,
        membership: &MembershipMatrix,
        ensemble: &PairedEnsemble,
    ) -> Result<TargetScores> {
        check_shapes(signals, membership, ensemble)?;
        self.score_checked(target, signals, membership, ensemble)
    }

    fn score_checked(
        &self,
        target: usize,
        signals: &SignalMatrix,
        membership: &MembershipMatrix,
        ensemble: &PairedEnsemble,
    ) -> Result<TargetScores> {
        let pool = ReferencePool::for_target(ensemble, target, self.num_reference_models)?;
        if !pool.excludes_target_pair() {
            return Err(RamiaError::invalid(format!(
                "reference pool of target {target} contains the target pair"
            )));
        }

        let fits: Vec<RecordFit> = (0..signals.num_records())
            .into_par_iter()
            .map(|record| fit_record(&pool, signals, membership, record))
            .collect();
        let population = self.population(&pool, signals, membership, &fits);

        let scored = fits
            .par_iter()
            .enumerate()
            .map(|(record, fit)| {
                let x = signals.get(target, record);
                let (inside, outside) = self.distributions(fit, &population, target, record)?;
                Ok((log_likelihood_ratio(x, &inside, &outside)?, !fit.has_variance()))
            })
            .collect::<Result<Vec<(f64, bool)>>>()?;

        let fallback_records: Vec<usize> = scored
            .iter()
            .enumerate()
            .filter(|(_, (_, fallback))| *fallback)
            .map(|(record, _)| record)
            .collect();
        if !fallback_records.is_empty() {
            warn!(
                target_model = target,
                records = fallback_records.len(),
                population_variance = population.variance,
                "too few IN/OUT reference models; used population-wide variance"
            );
            for &record in &fallback_records {
                debug!(
                    target_model = target,
                    record,
                    in_models = fits[record].inside.count,
                    out_models = fits[record].outside.count,
                    "shrinkage fallback"
                );
            }
        }

        Ok(TargetScores {
            target,
            scores: scored.into_iter().map(|(s, _)| s).collect(),
            fallback_records,
        })
    }

    fn population(
        &self,
        pool: &ReferencePool,
        signals: &SignalMatrix,
        membership: &MembershipMatrix,
        fits: &[RecordFit],
    ) -> Population {
        let per_record: Vec<f64> = fits
            .iter()
            .filter_map(|f| pooled_variance(&f.inside, &f.outside))
            .collect();

        let mut in_signals = Vec::new();
        let mut out_signals = Vec::new();
        for record in 0..signals.num_records() {
            for &m in pool.models() {
                if membership.is_member(m, record) {
                    in_signals.push(signals.get(m, record));
                } else {
                    out_signals.push(signals.get(m, record));
                }
            }
        }

        let variance = if per_record.is_empty() {
            // No record has two models per side: pool all signals around
            // their side means instead.
            let inside = Moments::of(&in_signals);
            let outside = Moments::of(&out_signals);
            pooled_variance(&inside, &outside)
                .or(inside.variance)
                .or(outside.variance)
                .unwrap_or(self.min_variance)
        } else {
            mean(&per_record)
        };

        Population {
            variance: variance.max(self.min_variance),
            in_mean: (!in_signals.is_empty()).then(|| mean(&in_signals)),
            out_mean: (!out_signals.is_empty()).then(|| mean(&out_signals)),
        }
    }

    fn distributions(
        &self,
        fit: &RecordFit,
        population: &Population,
        target: usize,
        record: usize,
    ) -> Result<(Gaussian, Gaussian)> {
        let missing = |side: &str| {
            RamiaError::numerical(format!(
                "no {side} reference signals for target {target}, record {record}"
            ))
        };
        let in_mean = fit
            .inside
            .mean
            .or(population.in_mean)
            .ok_or_else(|| missing("IN"))?;
        let out_mean = fit
            .outside
            .mean
            .or(population.out_mean)
            .ok_or_else(|| missing("OUT"))?;

        let (in_var, out_var) = match (self.variance, fit.has_variance()) {
            (VarianceMode::Global, _) | (_, false) => (population.variance, population.variance),
            (VarianceMode::Pooled, true) => {
                let v = pooled_variance(&fit.inside, &fit.outside).unwrap_or(population.variance);
                (v, v)
            }
            (VarianceMode::Separate, true) => (
                fit.inside.variance.unwrap_or(population.variance),
                fit.outside.variance.unwrap_or(population.variance),
            ),
        };

        Ok((
            Gaussian {
                mean: in_mean,
                variance: in_var.max(self.min_variance),
            },
            Gaussian {
                mean: out_mean,
                variance: out_var.max(self.min_variance),
            },
        ))
    }
}

fn fit_record(
    pool: &ReferencePool,
    signals: &SignalMatrix,
    membership: &MembershipMatrix,
    record: usize,
) -> RecordFit {
    let sets = pool.partition(membership, record);
    let gather = |models: &[usize]| -> Vec<f64> {
        models.iter().map(|&m| signals.get(m, record)).collect()
    };
    RecordFit {
        inside: Moments::of(&gather(&sets.in_models)),
        outside: Moments::of(&gather(&sets.out_models)),
    }
}

fn check_shapes(
    signals: &SignalMatrix,
    membership: &MembershipMatrix,
    ensemble: &PairedEnsemble,
) -> Result<()> {
    if signals.num_models() != membership.num_models() {
        return Err(RamiaError::shape(format!(
            "signal matrix has {} models, membership matrix has {}",
            signals.num_models(),
            membership.num_models()
        )));
    }
    if signals.num_records() != membership.num_records() {
        return Err(RamiaError::shape(format!(
            "signal matrix has {} records, membership matrix has {}",
            signals.num_records(),
            membership.num_records()
        )));
    }
    if ensemble.num_models() != signals.num_models() {
        return Err(RamiaError::shape(format!(
            "ensemble has {} models, signal matrix has {}",
            ensemble.num_models(),
            signals.num_models()
        )));
    }
    Ok(())
}
