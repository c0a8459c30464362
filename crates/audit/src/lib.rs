//! Scoring, aggregation, and risk reporting for range membership audits.
//!
//! Signals for range points come in from `ramia-core`; this crate turns them
//! into per-target likelihood-ratio scores, collapses each range group with
//! a trimmed statistic, and reports ROC-based risk metrics.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod likelihood;
pub mod reference;
pub mod report;
pub mod roc;
pub mod stats;
pub mod synthetic;

pub use aggregate::{AggregatedScores, TrimmedAggregator};
pub use likelihood::{
    log_likelihood_ratio, AuditScores, Gaussian, LikelihoodRatioEngine, TargetScores,
};
pub use reference::{ReferencePool, ReferenceSets};
pub use report::{
    ExcludedExperiment, ExperimentInput, ExperimentMetrics, ExperimentOutcome, OperatingPoint,
    PooledMetrics, RiskReporter, RiskSummary,
};
pub use roc::RocCurve;
pub use synthetic::synthetic_signal_matrix;

/// Common imports for auditing.
pub mod prelude {
    pub use crate::{
        synthetic_signal_matrix, AggregatedScores, AuditScores, ExperimentInput,
        ExperimentMetrics, ExperimentOutcome, LikelihoodRatioEngine, ReferencePool,
        RiskReporter, RiskSummary, RocCurve, TrimmedAggregator,
    };
}
