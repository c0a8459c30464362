//! Facade crate re-exporting stable APIs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod pipeline;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use ramia_audit as audit;
pub use ramia_core as core;

pub use ramia_audit::{
    log_likelihood_ratio, synthetic_signal_matrix, AggregatedScores, AuditScores,
    ExcludedExperiment, ExperimentInput, ExperimentMetrics, ExperimentOutcome, Gaussian,
    LikelihoodRatioEngine, OperatingPoint, PooledMetrics, ReferencePool, ReferenceSets,
    RiskReporter, RiskSummary, RocCurve, TargetScores, TrimmedAggregator,
};
pub use ramia_core::prelude as core_prelude;
pub use ramia_core::{
    compute_signal_matrix, expand_range_dataset, select_auditing_subset,
    split_dataset_for_training, AggregationStatistic, AuditConfig, AuditingSubset, BoxedSource,
    LogitModel, LogitSignalExtractor, MembershipMatrix, ModelPair, PairedEnsemble, RamiaError,
    RangeConfig, RangeGroups, RangeSampler, Result, SignalExtractor, SignalKind, SignalMatrix,
    TrimConfig, TrimSide, VarianceMode,
};
pub use pipeline::{ExperimentReport, RangeAuditReport, RangeAuditRunner};

/// Convenience prelude covering the audit pipeline.
pub mod prelude {
    pub use crate::pipeline::{ExperimentReport, RangeAuditReport, RangeAuditRunner};
    pub use ramia_audit::prelude::*;
    pub use ramia_core::prelude::*;
}
