//! Privacy-risk metrics across independent experiments.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use ramia_core::{AuditConfig, RamiaError, Result};

use crate::roc::RocCurve;
use crate::stats::{mean, std_dev};

/// TPR reached at one operating FPR.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OperatingPoint {
    /// False-positive rate.
    pub fpr: f64,
    /// True-positive rate at that FPR.
    pub tpr: f64,
}

/// Metrics of one experiment with both label classes present.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExperimentMetrics {
    /// Experiment identifier (the target model index in a standard run).
    pub experiment: usize,
    /// Member base records.
    pub num_members: usize,
    /// Non-member base records.
    pub num_non_members: usize,
    /// Area under the ROC curve.
    pub auc: f64,
    /// TPR at the configured target FPR.
    pub tpr_at_target_fpr: f64,
    /// TPR at each additional reporting FPR.
    pub operating_points: Vec<OperatingPoint>,
    /// Full ROC curve.
    pub roc: RocCurve,
}

/// Metrics over the concatenated scores of all usable experiments.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PooledMetrics {
    /// Number of experiments pooled.
    pub experiments: usize,
    /// Area under the pooled ROC curve.
    pub auc: f64,
    /// Pooled TPR at the configured target FPR.
    pub tpr_at_target_fpr: f64,
    /// Pooled TPR at each additional reporting FPR.
    pub operating_points: Vec<OperatingPoint>,
    /// Pooled ROC curve.
    pub roc: RocCurve,
}

/// An experiment left out of the averages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExcludedExperiment {
    /// Experiment identifier.
    pub experiment: usize,
    /// Member base records.
    pub num_members: usize,
    /// Non-member base records.
    pub num_non_members: usize,
    /// Why the experiment was excluded.
    pub reason: String,
}

/// Result of evaluating one experiment.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExperimentOutcome {
    /// Both classes present; metrics computed.
    Usable(ExperimentMetrics),
    /// Only one label class present.
    Excluded(ExcludedExperiment),
}

/// Aggregated scores and labels of one experiment.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentInput {
    /// Experiment identifier.
    pub experiment: usize,
    /// One aggregated score per base record.
    pub scores: Vec<f64>,
    /// Ground-truth membership for the experiment's target.
    pub labels: Vec<bool>,
}

/// Cross-experiment summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskSummary {
    /// Operating FPR of the headline TPR.
    pub target_fpr: f64,
    /// Usable experiments, in input order.
    pub experiments: Vec<ExperimentMetrics>,
    /// Experiments left out of the averages.
    pub excluded: Vec<ExcludedExperiment>,
    /// Mean AUC over usable experiments.
    pub mean_auc: Option<f64>,
    /// Sample standard deviation of AUC.
    pub std_auc: Option<f64>,
    /// Mean TPR at the target FPR over usable experiments.
    pub mean_tpr_at_target_fpr: Option<f64>,
    /// Sample standard deviation of TPR at the target FPR.
    pub std_tpr_at_target_fpr: Option<f64>,
    /// Metrics over the concatenation of every usable experiment.
    pub pooled: Option<PooledMetrics>,
}

impl RiskSummary {
    /// Number of experiments contributing to the averages.
    pub fn usable_experiments(&self) -> usize {
        self.experiments.len()
    }

    /// Per-experiment AUC values, for variance inspection.
    pub fn aucs(&self) -> Vec<f64> {
        self.experiments.iter().map(|e| e.auc).collect()
    }

    /// Per-experiment TPR values at the target FPR.
    pub fn tprs_at_target_fpr(&self) -> Vec<f64> {
        self.experiments.iter().map(|e| e.tpr_at_target_fpr).collect()
    }
}

/// Turns labeled scores into ROC-based risk metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskReporter {
    target_fpr: f64,
    report_fprs: Vec<f64>,
}

impl RiskReporter {
    /// Reporter for a target FPR plus extra operating points.
    pub fn new(target_fpr: f64, report_fprs: Vec<f64>) -> Result<Self> {
        if !target_fpr.is_finite() || !(0.0..=1.0).contains(&target_fpr) {
            return Err(RamiaError::config(
                "target_fpr",
                format!("must be in [0, 1], got {target_fpr}"),
            ));
        }
        if report_fprs
            .iter()
            .any(|f| !f.is_finite() || !(0.0..=1.0).contains(f))
        {
            return Err(RamiaError::config(
                "report_fprs",
                "every value must be in [0, 1]",
            ));
        }
        Ok(Self {
            target_fpr,
            report_fprs,
        })
    }

    /// Reporter settings taken from a run configuration.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        Self::new(config.target_fpr, config.report_fprs.clone())
    }

    /// Operating FPR of the headline TPR.
    pub fn target_fpr(&self) -> f64 {
        self.target_fpr
    }

    /// Evaluate one experiment.
    ///
    /// Shape mismatches are errors; a single label class is an exclusion.
    pub fn evaluate(
        &self,
        experiment: usize,
        scores: &[f64],
        labels: &[bool],
    ) -> Result<ExperimentOutcome> {
        if scores.len() != labels.len() {
            return Err(RamiaError::shape(format!(
                "experiment {experiment}: {} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }
        let num_members = labels.iter().filter(|&&l| l).count();
        let num_non_members = labels.len() - num_members;
        if num_members == 0 || num_non_members == 0 {
            let reason = if labels.is_empty() {
                "no audited records".to_string()
            } else if num_members == 0 {
                "all audited records are non-members".to_string()
            } else {
                "all audited records are members".to_string()
            };
            return Ok(ExperimentOutcome::Excluded(ExcludedExperiment {
                experiment,
                num_members,
                num_non_members,
                reason,
            }));
        }
        let roc = RocCurve::compute(scores, labels)?;
        Ok(ExperimentOutcome::Usable(self.metrics(experiment, roc)))
    }

    fn metrics(&self, experiment: usize, roc: RocCurve) -> ExperimentMetrics {
        ExperimentMetrics {
            experiment,
            num_members: roc.num_members() as usize,
            num_non_members: roc.num_non_members() as usize,
            auc: roc.auc(),
            tpr_at_target_fpr: roc.tpr_at_fpr(self.target_fpr),
            operating_points: self.operating_points(&roc),
            roc,
        }
    }

    fn operating_points(&self, roc: &RocCurve) -> Vec<OperatingPoint> {
        self.report_fprs
            .iter()
            .map(|&fpr| OperatingPoint {
                fpr,
                tpr: roc.tpr_at_fpr(fpr),
            })
            .collect()
    }

    /// Average already-evaluated experiments.
    pub fn summarize(&self, outcomes: Vec<ExperimentOutcome>) -> RiskSummary {
        let mut experiments = Vec::new();
        let mut excluded = Vec::new();
        for outcome in outcomes {
            match outcome {
                ExperimentOutcome::Usable(m) => experiments.push(m),
                ExperimentOutcome::Excluded(e) => {
                    warn!(
                        experiment = e.experiment,
                        members = e.num_members,
                        non_members = e.num_non_members,
                        reason = %e.reason,
                        "excluding experiment from averages"
                    );
                    excluded.push(e);
                }
            }
        }

        let aucs: Vec<f64> = experiments.iter().map(|e| e.auc).collect();
        let tprs: Vec<f64> = experiments.iter().map(|e| e.tpr_at_target_fpr).collect();
        let summary = RiskSummary {
            target_fpr: self.target_fpr,
            mean_auc: (!aucs.is_empty()).then(|| mean(&aucs)),
            std_auc: std_dev(&aucs),
            mean_tpr_at_target_fpr: (!tprs.is_empty()).then(|| mean(&tprs)),
            std_tpr_at_target_fpr: std_dev(&tprs),
            experiments,
            excluded,
            pooled: None,
        };
        info!(
            usable = summary.usable_experiments(),
            excluded = summary.excluded.len(),
            mean_auc = ?summary.mean_auc,
            mean_tpr = ?summary.mean_tpr_at_target_fpr,
            target_fpr = self.target_fpr,
            "summarized experiments"
        );
        summary
    }

    /// Evaluate every experiment, average the usable ones, and add a
    /// pooled ROC over their concatenated scores.
    pub fn report(&self, inputs: &[ExperimentInput]) -> Result<RiskSummary> {
        let outcomes = inputs
            .par_iter()
            .map(|input| self.evaluate(input.experiment, &input.scores, &input.labels))
            .collect::<Result<Vec<_>>>()?;

        let usable: Vec<&ExperimentInput> = inputs
            .iter()
            .zip(&outcomes)
            .filter(|(_, o)| matches!(o, ExperimentOutcome::Usable(_)))
            .map(|(i, _)| i)
            .collect();

        let mut summary = self.summarize(outcomes);
        if !usable.is_empty() {
            let scores: Vec<f64> = usable.iter().flat_map(|i| i.scores.iter().copied()).collect();
            let labels: Vec<bool> = usable.iter().flat_map(|i| i.labels.iter().copied()).collect();
            let roc = RocCurve::compute(&scores, &labels)?;
            summary.pooled = Some(PooledMetrics {
                experiments: usable.len(),
                auc: roc.auc(),
                tpr_at_target_fpr: roc.tpr_at_fpr(self.target_fpr),
                operating_points: self.operating_points(&roc),
                roc,
            });
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> RiskReporter {
        RiskReporter::new(0.001, vec![0.01, 0.0]).unwrap()
    }

    fn input(experiment: usize, scores: Vec<f64>, labels: Vec<bool>) -> ExperimentInput {
        ExperimentInput {
            experiment,
            scores,
            labels,
        }
    }

    #[test]
    fn all_member_experiment_is_excluded() {
        let summary = reporter()
            .report(&[input(0, vec![0.1, 0.7, 0.3], vec![true, true, true])])
            .unwrap();
        assert_eq!(summary.usable_experiments(), 0);
        assert_eq!(summary.excluded.len(), 1);
        assert_eq!(summary.excluded[0].reason, "all audited records are members");
        assert_eq!(summary.mean_auc, None);
        assert_eq!(summary.mean_tpr_at_target_fpr, None);
        assert!(summary.pooled.is_none());
    }

    #[test]
    fn identical_experiments_average_to_single() {
        let scores = vec![0.3, 0.9, 0.1, 0.5, 0.7, 0.2, 0.65];
        let labels = vec![false, true, false, true, true, false, false];
        let single = reporter()
            .report(&[input(0, scores.clone(), labels.clone())])
            .unwrap();
        let many: Vec<ExperimentInput> = (0..5)
            .map(|i| input(i, scores.clone(), labels.clone()))
            .collect();
        let repeated = reporter().report(&many).unwrap();
        assert_eq!(repeated.usable_experiments(), 5);
        assert_eq!(repeated.mean_auc, single.mean_auc);
        assert_eq!(repeated.mean_tpr_at_target_fpr, single.mean_tpr_at_target_fpr);
        assert_eq!(repeated.std_auc, Some(0.0));
        assert_eq!(repeated.pooled.unwrap().auc, single.mean_auc.unwrap());
    }

    #[test]
    fn degenerate_experiment_does_not_drag_average() {
        let good = input(0, vec![0.9, 0.8, 0.1, 0.2], vec![true, true, false, false]);
        let bad = input(1, vec![0.5, 0.4], vec![false, false]);
        let summary = reporter().report(&[good, bad]).unwrap();
        assert_eq!(summary.usable_experiments(), 1);
        assert_eq!(summary.mean_auc, Some(1.0));
        assert_eq!(summary.excluded[0].experiment, 1);
        assert_eq!(summary.excluded[0].reason, "all audited records are non-members");
    }

    #[test]
    fn per_experiment_values_are_exposed() {
        let a = input(0, vec![0.9, 0.8, 0.1, 0.2], vec![true, true, false, false]);
        let b = input(1, vec![0.1, 0.2, 0.9, 0.8], vec![true, true, false, false]);
        let summary = reporter().report(&[a, b]).unwrap();
        assert_eq!(summary.aucs(), vec![1.0, 0.0]);
        assert_eq!(summary.mean_auc, Some(0.5));
        assert_eq!(summary.tprs_at_target_fpr(), vec![1.0, 0.0]);
        let points = &summary.experiments[0].operating_points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1], OperatingPoint { fpr: 0.0, tpr: 1.0 });
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let err = reporter()
            .report(&[input(0, vec![0.1, 0.2], vec![true])])
            .unwrap_err();
        assert!(matches!(err, RamiaError::ShapeMismatch { .. }));
    }

    #[test]
    fn invalid_fpr_is_config_error() {
        assert_eq!(
            RiskReporter::new(1.5, vec![]).unwrap_err().param(),
            Some("target_fpr")
        );
    }
}
