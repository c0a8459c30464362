//! Range groups: the layout of range points around base records.
//!
//! Range points are stored contiguously: base record `b` owns points
//! `b * sample_size .. (b + 1) * sample_size`. Generating the points is
//! left to a [`RangeSampler`]; this module only checks and indexes the
//! shape of its output.

use std::ops::Range;

use crate::error::{RamiaError, Result};

/// Produces the semantic neighborhood of a base record.
pub trait RangeSampler {
    /// Record type handled by the sampler.
    type Record;

    /// Identity of the sampling strategy, for logs.
    fn strategy(&self) -> &str;

    /// Number of range points produced per base record.
    fn sample_size(&self) -> usize;

    /// Ordered range points for `record`.
    fn sample(&self, record: &Self::Record) -> Vec<Self::Record>;
}

/// Fixed-size, disjoint range groups over a contiguous point layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeGroups {
    num_base: usize,
    sample_size: usize,
}

impl RangeGroups {
    /// Groups for `num_base` base records with `sample_size` points each.
    pub fn new(num_base: usize, sample_size: usize) -> Result<Self> {
        if sample_size == 0 {
            return Err(RamiaError::config("range.sample_size", "must be positive"));
        }
        Ok(Self {
            num_base,
            sample_size,
        })
    }

    /// Recover the grouping of a flat range-point axis.
    pub fn from_num_points(num_points: usize, sample_size: usize) -> Result<Self> {
        if sample_size == 0 {
            return Err(RamiaError::config("range.sample_size", "must be positive"));
        }
        if num_points % sample_size != 0 {
            return Err(RamiaError::shape(format!(
                "{num_points} range points is not a multiple of sample_size {sample_size}"
            )));
        }
        Self::new(num_points / sample_size, sample_size)
    }

    /// Validate per-base expansion lengths against the configured size.
    pub fn from_expansion_lengths(lengths: &[usize], sample_size: usize) -> Result<Self> {
        if let Some((base, &len)) = lengths
            .iter()
            .enumerate()
            .find(|&(_, &len)| len != sample_size)
        {
            return Err(RamiaError::shape(format!(
                "base record {base} expanded to {len} range points, expected {sample_size}"
            )));
        }
        Self::new(lengths.len(), sample_size)
    }

    /// Number of base records.
    pub fn num_base(&self) -> usize {
        self.num_base
    }

    /// Range points per base record.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Total number of range points.
    pub fn num_points(&self) -> usize {
        self.num_base * self.sample_size
    }

    /// Range-point indices belonging to `base`.
    pub fn group(&self, base: usize) -> Range<usize> {
        let start = base * self.sample_size;
        start..start + self.sample_size
    }

    /// Base record owning range point `point`.
    pub fn base_of(&self, point: usize) -> usize {
        point / self.sample_size
    }

    /// Range-point indices of the selected base records, concatenated in
    /// selection order.
    pub fn points_for(&self, bases: &[usize]) -> Vec<usize> {
        bases.iter().flat_map(|&b| self.group(b)).collect()
    }
}

/// Expand every base record through `sampler` into a flat range dataset.
pub fn expand_range_dataset<S: RangeSampler>(
    sampler: &S,
    records: &[S::Record],
) -> Result<(Vec<S::Record>, RangeGroups)> {
    let sample_size = sampler.sample_size();
    tracing::info!(
        strategy = sampler.strategy(),
        sample_size,
        num_base = records.len(),
        "expanding range dataset"
    );
    let mut points = Vec::with_capacity(records.len() * sample_size);
    let mut lengths = Vec::with_capacity(records.len());
    for record in records {
        let neighborhood = sampler.sample(record);
        lengths.push(neighborhood.len());
        points.extend(neighborhood);
    }
    let groups = RangeGroups::from_expansion_lengths(&lengths, sample_size)?;
    Ok((points, groups))
}
