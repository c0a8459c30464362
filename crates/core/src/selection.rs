//! Auditing subset selection.
//!
//! The subset is stratified on one model's membership row so the audited
//! member ratio tracks the full dataset's ratio up to rounding.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{RamiaError, Result};
use crate::membership::MembershipMatrix;
use crate::range::RangeGroups;

/// Base records chosen for the audit and their labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditingSubset {
    indices: Vec<usize>,
    membership: MembershipMatrix,
}

impl AuditingSubset {
    /// Selected base record indices, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of selected base records.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Base-level labels, `(models, selected records)`.
    pub fn membership(&self) -> &MembershipMatrix {
        &self.membership
    }

    /// Fraction of selected records that are members of `model`.
    pub fn member_ratio(&self, model: usize) -> f64 {
        if self.indices.is_empty() {
            return 0.0;
        }
        let members = self.membership.row(model).iter().filter(|&&m| m).count();
        members as f64 / self.indices.len() as f64
    }

    /// Labels for every range point of the subset: each point inherits the
    /// label of its base record.
    pub fn range_membership(&self, sample_size: usize) -> Result<MembershipMatrix> {
        self.membership.repeat_columns(sample_size)
    }

    /// Range-point indices (in the full range dataset) of the subset.
    pub fn range_points(&self, groups: &RangeGroups) -> Result<Vec<usize>> {
        if let Some(&bad) = self.indices.iter().find(|&&b| b >= groups.num_base()) {
            return Err(RamiaError::shape(format!(
                "base record {bad} out of range for {} range groups",
                groups.num_base()
            )));
        }
        Ok(groups.points_for(&self.indices))
    }
}

/// Pick at most `requested` base records out of `full_size`.
///
/// Members and non-members of `stratify_model` are sampled separately in
/// proportion to their share of the full dataset.
pub fn select_auditing_subset<R: Rng + ?Sized>(
    full_size: usize,
    requested: usize,
    membership: &MembershipMatrix,
    stratify_model: usize,
    rng: &mut R,
) -> Result<AuditingSubset> {
    if requested == 0 {
        return Err(RamiaError::config("subset_size", "must be positive"));
    }
    if membership.num_records() != full_size {
        return Err(RamiaError::shape(format!(
            "membership matrix covers {} records, dataset has {full_size}",
            membership.num_records()
        )));
    }
    if stratify_model >= membership.num_models() {
        return Err(RamiaError::shape(format!(
            "model {stratify_model} out of range for {} models",
            membership.num_models()
        )));
    }

    let n = requested.min(full_size);
    let (mut members, mut non_members): (Vec<usize>, Vec<usize>) =
        (0..full_size).partition(|&r| membership.is_member(stratify_model, r));

    let member_quota = if full_size == 0 {
        0
    } else {
        ((n as f64 * members.len() as f64 / full_size as f64).round() as usize).min(members.len())
    };
    let non_member_quota = (n - member_quota).min(non_members.len());

    members.shuffle(rng);
    non_members.shuffle(rng);
    members.truncate(member_quota);
    non_members.truncate(non_member_quota);

    let mut indices = members;
    indices.append(&mut non_members);
    indices.sort_unstable();

    let subset_membership = membership.select_records(&indices)?;
    let subset = AuditingSubset {
        indices,
        membership: subset_membership,
    };
    tracing::info!(
        requested,
        selected = subset.len(),
        member_ratio = subset.member_ratio(stratify_model),
        "selected auditing subset"
    );
    Ok(subset)
}
