//! End-to-end range audit: subset selection, signal extraction, scoring,
//! aggregation and reporting.

use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use ramia_audit::{
    AggregatedScores, AuditScores, ExperimentInput, LikelihoodRatioEngine, RiskReporter,
    RiskSummary, TrimmedAggregator,
};
use ramia_core::{
    compute_signal_matrix, select_auditing_subset, AuditConfig, MembershipMatrix,
    PairedEnsemble, RamiaError, RangeGroups, Result, SignalExtractor, SignalMatrix,
};

/// Per-experiment output exposed to the reporting layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExperimentReport {
    /// Target model of the experiment.
    pub target: usize,
    /// One aggregated score per audited base record.
    pub aggregated_scores: Vec<f64>,
    /// Ground-truth membership of each audited base record in the target.
    pub labels: Vec<bool>,
    /// Range points scored with the shrinkage fallback.
    pub fallback_points: Vec<usize>,
}

/// Everything a run produces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RangeAuditReport {
    /// Range-sampling strategy, for provenance only.
    pub strategy: String,
    /// Range points per base record.
    pub sample_size: usize,
    /// Base records selected for the audit, when selection ran.
    pub subset: Option<Vec<usize>>,
    /// One entry per experiment, in target order.
    pub experiments: Vec<ExperimentReport>,
    /// Cross-experiment metrics.
    pub summary: RiskSummary,
}

/// Drives a full audit from one immutable configuration.
#[derive(Clone, Debug)]
pub struct RangeAuditRunner {
    config: AuditConfig,
    engine: LikelihoodRatioEngine,
    aggregator: TrimmedAggregator,
    reporter: RiskReporter,
}

impl RangeAuditRunner {
    /// Validate `config` and build every stage.
    pub fn new(config: AuditConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: LikelihoodRatioEngine::from_config(&config)?,
            aggregator: TrimmedAggregator::from_config(&config)?,
            reporter: RiskReporter::from_config(&config)?,
            config,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Run the audit from trained models.
    ///
    /// `membership` is the base-record matrix `(models, base records)`. The
    /// range dataset is laid out contiguously, so the extractor is asked
    /// about range-point indices `b * sample_size .. (b + 1) * sample_size`
    /// for each selected base record `b`.
    pub fn run<M, X>(
        &self,
        extractor: &X,
        models: &[M],
        ensemble: &PairedEnsemble,
        membership: &MembershipMatrix,
    ) -> Result<RangeAuditReport>
    where
        M: Sync,
        X: SignalExtractor<M>,
    {
        if models.len() != ensemble.num_models() {
            return Err(RamiaError::shape(format!(
                "{} models supplied for a {}-model ensemble",
                models.len(),
                ensemble.num_models()
            )));
        }
        let sample_size = self.config.range.sample_size;
        let num_base = membership.num_records();
        if num_base == 0 {
            return Err(RamiaError::shape("membership matrix has no base records"));
        }
        let full_groups = RangeGroups::new(num_base, sample_size)?;

        let started = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let subset = select_auditing_subset(
            num_base,
            self.config.subset_size.unwrap_or(num_base),
            membership,
            0,
            &mut rng,
        )?;
        let range_membership = subset.range_membership(sample_size)?;
        let points = subset.range_points(&full_groups)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            base_records = subset.len(),
            range_points = points.len(),
            "prepared auditing dataset"
        );

        let started = Instant::now();
        let signals =
            compute_signal_matrix(extractor, models, &points, self.config.signal_batch_size)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            models = signals.num_models(),
            records = signals.num_records(),
            "prepared signals"
        );

        let groups = RangeGroups::new(subset.len(), sample_size)?;
        let mut report = self.run_on_signals(&signals, &range_membership, ensemble, &groups)?;
        report.subset = Some(subset.indices().to_vec());
        Ok(report)
    }

    /// Run the audit from a precomputed signal matrix over range points.
    ///
    /// `range_membership` has one column per range point; every point of a
    /// group must carry its base record's label.
    pub fn run_on_signals(
        &self,
        signals: &SignalMatrix,
        range_membership: &MembershipMatrix,
        ensemble: &PairedEnsemble,
        groups: &RangeGroups,
    ) -> Result<RangeAuditReport> {
        self.check_inputs(signals, range_membership, ensemble, groups)?;
        let targets: Vec<usize> = (0..self.config.num_experiments).collect();

        let started = Instant::now();
        let scores = self
            .engine
            .score_targets(&targets, signals, range_membership, ensemble)?;
        let aggregated = self.aggregator.aggregate(&scores, groups)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            experiments = targets.len(),
            "audited target models"
        );

        let started = Instant::now();
        let experiments = collect_experiments(&scores, &aggregated, range_membership, groups);
        let inputs: Vec<ExperimentInput> = experiments
            .iter()
            .map(|e| ExperimentInput {
                experiment: e.target,
                scores: e.aggregated_scores.clone(),
                labels: e.labels.clone(),
            })
            .collect();
        let summary = self.reporter.report(&inputs)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            usable = summary.usable_experiments(),
            "averaged experiment results"
        );

        Ok(RangeAuditReport {
            strategy: self.config.range.strategy.clone(),
            sample_size: groups.sample_size(),
            subset: None,
            experiments,
            summary,
        })
    }

    fn check_inputs(
        &self,
        signals: &SignalMatrix,
        range_membership: &MembershipMatrix,
        ensemble: &PairedEnsemble,
        groups: &RangeGroups,
    ) -> Result<()> {
        if groups.sample_size() != self.config.range.sample_size {
            return Err(RamiaError::shape(format!(
                "range groups hold {} points, configuration says {}",
                groups.sample_size(),
                self.config.range.sample_size
            )));
        }
        if range_membership.num_records() != groups.num_points() {
            return Err(RamiaError::shape(format!(
                "membership covers {} range points, groups hold {}",
                range_membership.num_records(),
                groups.num_points()
            )));
        }
        if self.config.num_experiments > ensemble.num_models() {
            return Err(RamiaError::config(
                "num_experiments",
                format!(
                    "{} experiments need as many target models, ensemble has {}",
                    self.config.num_experiments,
                    ensemble.num_models()
                ),
            ));
        }
        if signals.num_models() != range_membership.num_models() {
            return Err(RamiaError::shape(format!(
                "signal matrix has {} models, membership has {}",
                signals.num_models(),
                range_membership.num_models()
            )));
        }
        for model in 0..range_membership.num_models() {
            for base in 0..groups.num_base() {
                let span = groups.group(base);
                let label = range_membership.is_member(model, span.start);
                if span.clone().any(|p| range_membership.is_member(model, p) != label) {
                    return Err(RamiaError::shape(format!(
                        "range points of base record {base} disagree on membership in model {model}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn collect_experiments(
    scores: &AuditScores,
    aggregated: &AggregatedScores,
    range_membership: &MembershipMatrix,
    groups: &RangeGroups,
) -> Vec<ExperimentReport> {
    aggregated
        .targets()
        .iter()
        .enumerate()
        .map(|(i, &target)| ExperimentReport {
            target,
            aggregated_scores: aggregated.row(i).to_vec(),
            labels: (0..groups.num_base())
                .map(|base| range_membership.is_member(target, groups.group(base).start))
                .collect(),
            fallback_points: scores.fallback_records(i).to_vec(),
        })
        .collect()
}
