use std::convert::Infallible;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ramia::{
    split_dataset_for_training, AuditConfig, LogitModel, LogitSignalExtractor, RangeAuditRunner,
    SignalKind,
};

/// Two-class model whose true-class logit rises on memorized base records.
struct ToyModel {
    id: u64,
    members: Vec<bool>,
    sample_size: usize,
}

impl LogitModel for ToyModel {
    type Error = Infallible;

    fn logits(&self, records: &[usize]) -> Result<Array2<f64>, Infallible> {
        let mut out = Array2::zeros((records.len(), 2));
        for (row, &point) in records.iter().enumerate() {
            let base = point / self.sample_size;
            let mut rng = ChaCha8Rng::seed_from_u64((self.id << 32) ^ point as u64);
            let difficulty = ((base * 7919) % 100) as f64 / 50.0 - 1.0;
            let memorized = if self.members[base] { 1.0 } else { 0.0 };
            out[[row, 0]] = difficulty + memorized + rng.gen_range(-0.5..0.5);
        }
        Ok(out)
    }
}

fn main() {
    let config = AuditConfig {
        subset_size: Some(100),
        ..AuditConfig::default()
    };
    let num_base = 200;
    let sample_size = config.range.sample_size;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (ensemble, membership) =
        split_dataset_for_training(num_base, config.num_model_pairs(), &mut rng)
            .expect("split dataset");
    let models: Vec<ToyModel> = (0..ensemble.num_models())
        .map(|m| ToyModel {
            id: m as u64,
            members: membership.row(m).to_vec(),
            sample_size,
        })
        .collect();
    let labels = vec![0; num_base * sample_size];
    let extractor = LogitSignalExtractor::new(SignalKind::RescaledLogit, labels);

    let runner = RangeAuditRunner::new(config).expect("valid config");
    let report = runner
        .run(&extractor, &models, &ensemble, &membership)
        .expect("audit");

    for metrics in &report.summary.experiments {
        println!(
            "target {}: AUC {:.4}, TPR@{} {:.4}",
            metrics.experiment, metrics.auc, report.summary.target_fpr, metrics.tpr_at_target_fpr
        );
    }
    if let Some(auc) = report.summary.mean_auc {
        println!(
            "mean AUC over {} experiments: {auc:.4}",
            report.summary.usable_experiments()
        );
    }
}
