//! Core building blocks for range membership-inference audits.
//!
//! This crate owns everything that sits below the scoring engine:
//! configuration, the paired model ensemble and its membership labels,
//! range-group layout, signal extraction, and auditing-subset selection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod membership;
pub mod range;
pub mod selection;
pub mod signal;

pub use config::{
    AggregationStatistic, AuditConfig, RangeConfig, TrimConfig, TrimSide, VarianceMode,
};
pub use error::{BoxedSource, RamiaError, Result};
pub use membership::{split_dataset_for_training, MembershipMatrix, ModelPair, PairedEnsemble};
pub use range::{expand_range_dataset, RangeGroups, RangeSampler};
pub use selection::{select_auditing_subset, AuditingSubset};
pub use signal::{
    compute_signal_matrix, LogitModel, LogitSignalExtractor, SignalExtractor, SignalKind,
    SignalMatrix,
};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        compute_signal_matrix, expand_range_dataset, select_auditing_subset,
        split_dataset_for_training, AggregationStatistic, AuditConfig, AuditingSubset,
        LogitModel, LogitSignalExtractor, MembershipMatrix, ModelPair, PairedEnsemble,
        RamiaError, RangeConfig, RangeGroups, RangeSampler, Result, SignalExtractor,
        SignalKind, SignalMatrix, TrimConfig, TrimSide, VarianceMode,
    };
}
