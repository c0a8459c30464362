//! Audit configuration.
//!
//! A single [`AuditConfig`] value is built once per run, validated, and
//! handed by reference to every stage. The YAML layout matches the
//! sections of the tool's config files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RamiaError, Result};

/// Which tails of a sorted range group are discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimSide {
    /// Trim the same fraction from both tails.
    #[default]
    Both,
    /// Trim only the lowest scores.
    Low,
    /// Trim only the highest scores.
    High,
}

/// Statistic applied to the scores left after trimming.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStatistic {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Median (mean of the two middle values for even counts).
    Median,
}

/// How per-record reference variances are estimated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    /// One variance per record, pooled over the IN and OUT signals.
    #[default]
    Pooled,
    /// Separate IN and OUT variances per record.
    Separate,
    /// One variance per target model, shared by every record.
    Global,
}

/// Trimming policy for the range aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrimConfig {
    /// Fraction of range points removed from each trimmed tail.
    pub fraction: f64,
    /// Tails to trim.
    pub side: TrimSide,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            fraction: 0.2,
            side: TrimSide::Both,
        }
    }
}

impl TrimConfig {
    /// Number of points dropped from the low and high tails of a group of `k`.
    pub fn trim_counts(&self, k: usize) -> (usize, usize) {
        // Guard against 0.2 * 5 landing just under 1.0.
        let per_tail = (self.fraction * k as f64 + 1e-9).floor() as usize;
        match self.side {
            TrimSide::Both => (per_tail, per_tail),
            TrimSide::Low => (per_tail, 0),
            TrimSide::High => (0, per_tail),
        }
    }

    /// Number of points left after trimming a group of `k`.
    pub fn kept(&self, k: usize) -> usize {
        let (low, high) = self.trim_counts(k);
        k.saturating_sub(low + high)
    }
}

/// Range-expansion settings. The strategy name is only logged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangeConfig {
    /// Number of range points generated per base record.
    pub sample_size: usize,
    /// Identity of the sampling strategy, for reproducibility records.
    pub strategy: String,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            sample_size: 10,
            strategy: "unspecified".to_string(),
        }
    }
}

/// Immutable configuration for one audit run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Reference models used to calibrate each record's distributions.
    pub num_reference_models: usize,
    /// Number of experiments, one target model each.
    pub num_experiments: usize,
    /// Range-expansion settings.
    pub range: RangeConfig,
    /// Trimming policy.
    pub trim: TrimConfig,
    /// Statistic applied after trimming.
    pub statistic: AggregationStatistic,
    /// Operating false-positive rate for the headline TPR.
    pub target_fpr: f64,
    /// Additional operating points reported per experiment.
    pub report_fprs: Vec<f64>,
    /// Variance estimation policy.
    pub variance: VarianceMode,
    /// Lower bound applied to every variance estimate.
    pub min_variance: f64,
    /// Number of base records to audit. `None` audits all of them.
    pub subset_size: Option<usize>,
    /// Records per model-evaluation call.
    pub signal_batch_size: usize,
    /// Seed for subset selection and splits.
    pub seed: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            num_reference_models: 4,
            num_experiments: 2,
            range: RangeConfig::default(),
            trim: TrimConfig::default(),
            statistic: AggregationStatistic::Mean,
            target_fpr: 0.001,
            report_fprs: vec![0.01, 0.001, 0.0],
            variance: VarianceMode::Pooled,
            min_variance: 1e-8,
            subset_size: None,
            signal_batch_size: 256,
            seed: 1234,
        }
    }
}

impl AuditConfig {
    /// Parse and validate a YAML configuration.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| RamiaError::Parse { msg: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RamiaError::Parse {
            msg: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&text)
    }

    /// Number of trained pairs a run needs: enough targets for every
    /// experiment and enough references left after removing a target's pair.
    pub fn num_model_pairs(&self) -> usize {
        self.num_experiments
            .div_ceil(2)
            .max(self.num_reference_models + 1)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.num_reference_models < 2 {
            return Err(RamiaError::config(
                "num_reference_models",
                format!("at least 2 required, got {}", self.num_reference_models),
            ));
        }
        if self.num_reference_models % 2 != 0 {
            return Err(RamiaError::config(
                "num_reference_models",
                format!(
                    "must be even so whole pairs are used, got {}",
                    self.num_reference_models
                ),
            ));
        }
        if self.num_experiments == 0 {
            return Err(RamiaError::config("num_experiments", "must be positive"));
        }
        if self.range.sample_size == 0 {
            return Err(RamiaError::config("range.sample_size", "must be positive"));
        }
        if !self.trim.fraction.is_finite() || !(0.0..1.0).contains(&self.trim.fraction) {
            return Err(RamiaError::config(
                "trim.fraction",
                format!("must be in [0, 1), got {}", self.trim.fraction),
            ));
        }
        if !self.target_fpr.is_finite() || !(0.0..=1.0).contains(&self.target_fpr) {
            return Err(RamiaError::config(
                "target_fpr",
                format!("must be in [0, 1], got {}", self.target_fpr),
            ));
        }
        if let Some(&bad) = self
            .report_fprs
            .iter()
            .find(|f| !f.is_finite() || !(0.0..=1.0).contains(*f))
        {
            return Err(RamiaError::config(
                "report_fprs",
                format!("every value must be in [0, 1], got {bad}"),
            ));
        }
        if !self.min_variance.is_finite() || self.min_variance <= 0.0 {
            return Err(RamiaError::config("min_variance", "must be positive"));
        }
        if self.subset_size == Some(0) {
            return Err(RamiaError::config("subset_size", "must be positive"));
        }
        if self.signal_batch_size == 0 {
            return Err(RamiaError::config("signal_batch_size", "must be positive"));
        }
        self.validate_for_sample_size(self.range.sample_size)
    }

    /// Reject trimming policies that would leave no range point behind.
    pub fn validate_for_sample_size(&self, sample_size: usize) -> Result<()> {
        if sample_size == 0 {
            return Err(RamiaError::config("range.sample_size", "must be positive"));
        }
        if self.trim.kept(sample_size) == 0 {
            let (low, high) = self.trim.trim_counts(sample_size);
            return Err(RamiaError::config(
                "trim.fraction",
                format!(
                    "trimming {low} low and {high} high points removes all {sample_size} range points"
                ),
            ));
        }
        Ok(())
    }
}
