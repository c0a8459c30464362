//! Reference-model partitioning.
//!
//! For a target model the reference pool is every model outside the
//! target's own pair, taken pair by pair. For each record the pool splits
//! into the models that trained on it (IN) and those that did not (OUT).

use ramia_core::{MembershipMatrix, PairedEnsemble, RamiaError, Result};

/// Reference models available to one target model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferencePool {
    target: usize,
    twin: usize,
    models: Vec<usize>,
}

impl ReferencePool {
    /// Take `limit` reference models for `target` as `limit / 2` whole
    /// pairs, skipping the target's pair.
    pub fn for_target(ensemble: &PairedEnsemble, target: usize, limit: usize) -> Result<Self> {
        if limit % 2 != 0 {
            return Err(RamiaError::config(
                "num_reference_models",
                format!("must be even so whole pairs are used, got {limit}"),
            ));
        }
        let twin = ensemble.twin(target).ok_or_else(|| {
            RamiaError::shape(format!(
                "target model {target} is not part of the {}-model ensemble",
                ensemble.num_models()
            ))
        })?;
        let mut models: Vec<usize> = ensemble
            .pairs()
            .iter()
            .filter(|p| !p.contains(target))
            .flat_map(|p| [p.first, p.twin])
            .collect();
        if models.len() < limit {
            return Err(RamiaError::config(
                "num_reference_models",
                format!(
                    "{limit} requested but only {} models remain after excluding target {target} and its twin {twin}",
                    models.len()
                ),
            ));
        }
        models.truncate(limit);
        Ok(Self {
            target,
            twin,
            models,
        })
    }

    /// Target model the pool was built for.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Reference model indices.
    pub fn models(&self) -> &[usize] {
        &self.models
    }

    /// Split the pool by membership of `record`.
    pub fn partition(&self, membership: &MembershipMatrix, record: usize) -> ReferenceSets {
        let (in_models, out_models) = self
            .models
            .iter()
            .partition(|&&m| membership.is_member(m, record));
        ReferenceSets {
            record,
            in_models,
            out_models,
        }
    }

    /// Whether the pool avoids the target and its twin.
    pub fn excludes_target_pair(&self) -> bool {
        !self
            .models
            .iter()
            .any(|&m| m == self.target || m == self.twin)
    }
}

/// IN and OUT reference models for one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceSets {
    /// Record the sets were built for.
    pub record: usize,
    /// Reference models that trained on the record.
    pub in_models: Vec<usize>,
    /// Reference models that did not.
    pub out_models: Vec<usize>,
}

impl ReferenceSets {
    /// Whether both sides have enough models to estimate a variance.
    pub fn has_variance(&self) -> bool {
        self.in_models.len() >= 2 && self.out_models.len() >= 2
    }
}
