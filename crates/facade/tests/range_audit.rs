use std::convert::Infallible;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use ramia::{
    split_dataset_for_training, synthetic_signal_matrix, AuditConfig, LogitModel,
    LogitSignalExtractor, MembershipMatrix, PairedEnsemble, RamiaError, RangeAuditRunner,
    RangeConfig, RangeGroups, SignalExtractor, SignalKind, TrimConfig, TrimSide,
};

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
            let memorized = if self.members[base] { 1.5 } else { 0.0 };
            out[[row, 0]] = difficulty + memorized + rng.gen_range(-0.3..0.3);
        }
        Ok(out)
    }
}

fn toy_ensemble(
    num_base: usize,
    config: &AuditConfig,
) -> (PairedEnsemble, MembershipMatrix, Vec<ToyModel>) {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (ensemble, membership) =
        split_dataset_for_training(num_base, config.num_model_pairs(), &mut rng).unwrap();
    let models = (0..ensemble.num_models())
        .map(|m| ToyModel {
            id: m as u64,
            members: membership.row(m).to_vec(),
            sample_size: config.range.sample_size,
        })
        .collect();
    (ensemble, membership, models)
}

fn rescaled_logits(num_points: usize) -> LogitSignalExtractor {
    LogitSignalExtractor::new(SignalKind::RescaledLogit, vec![0; num_points])
}

#[test]
fn pipeline_detects_memorized_records() {
    let config = AuditConfig {
        subset_size: Some(60),
        signal_batch_size: 32,
        ..AuditConfig::default()
    };
    let (ensemble, membership, models) = toy_ensemble(120, &config);
    let extractor = rescaled_logits(120 * config.range.sample_size);
    let runner = RangeAuditRunner::new(config).unwrap();
    let report = runner
        .run(&extractor, &models, &ensemble, &membership)
        .unwrap();

    let subset = report.subset.as_ref().unwrap();
    assert_eq!(subset.len(), 60);
    assert!(subset.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(report.experiments.len(), 2);
    for experiment in &report.experiments {
        assert_eq!(experiment.aggregated_scores.len(), 60);
        let expected: Vec<bool> = subset
            .iter()
            .map(|&b| membership.is_member(experiment.target, b))
            .collect();
        assert_eq!(experiment.labels, expected);
    }

    let summary = &report.summary;
    assert_eq!(summary.usable_experiments(), 2);
    assert!(summary.excluded.is_empty());
    assert!(summary.mean_auc.unwrap() > 0.95);
    assert!(summary.pooled.as_ref().unwrap().auc > 0.95);
}

#[test]
fn reruns_with_the_same_seed_are_identical() {
    let config = AuditConfig {
        subset_size: Some(30),
        ..AuditConfig::default()
    };
    let (ensemble, membership, models) = toy_ensemble(50, &config);
    let extractor = rescaled_logits(50 * config.range.sample_size);
    let runner = RangeAuditRunner::new(config).unwrap();
    let first = runner
        .run(&extractor, &models, &ensemble, &membership)
        .unwrap();
    let second = runner
        .run(&extractor, &models, &ensemble, &membership)
        .unwrap();
    assert_eq!(first, second);
}

struct FailsOnModel(usize);

impl SignalExtractor<usize> for FailsOnModel {
    type Error = String;

    fn signal(&self, model: &usize, records: &[usize]) -> Result<Vec<f64>, String> {
        if *model == self.0 {
            return Err(format!("model {model} crashed"));
        }
        Ok(records.iter().map(|&r| r as f64).collect())
    }
}

#[test]
fn evaluation_failure_names_the_model() {
    let config = AuditConfig::default();
    let (ensemble, membership, _) = toy_ensemble(20, &config);
    let models: Vec<usize> = (0..ensemble.num_models()).collect();
    let runner = RangeAuditRunner::new(config).unwrap();
    let err = runner
        .run(&FailsOnModel(3), &models, &ensemble, &membership)
        .unwrap_err();
    match err {
        RamiaError::Evaluation { model, .. } => assert_eq!(model, 3),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn all_member_target_is_excluded_from_averages() {
    let config = AuditConfig {
        num_experiments: 1,
        range: RangeConfig {
            sample_size: 5,
            strategy: "test".into(),
        },
        trim: TrimConfig {
            fraction: 0.2,
            side: TrimSide::Both,
        },
        ..AuditConfig::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let (ensemble, split) = split_dataset_for_training(16, 5, &mut rng).unwrap();
    let mut rows: Vec<Vec<bool>> = (0..split.num_models())
        .map(|m| split.row(m).to_vec())
        .collect();
    rows[0] = vec![true; 16];
    rows[1] = vec![false; 16];
    let base = MembershipMatrix::from_rows(rows).unwrap();
    let range = base.repeat_columns(5).unwrap();
    let signals = synthetic_signal_matrix(&mut rng, &range, 1.0, 0.2).unwrap();
    let groups = RangeGroups::new(16, 5).unwrap();

    let runner = RangeAuditRunner::new(config).unwrap();
    let report = runner
        .run_on_signals(&signals, &range, &ensemble, &groups)
        .unwrap();
    assert_eq!(report.summary.usable_experiments(), 0);
    assert_eq!(report.summary.excluded.len(), 1);
    assert_eq!(report.summary.excluded[0].num_members, 16);
    assert_eq!(report.summary.mean_auc, None);
    assert!(report.summary.pooled.is_none());
}

#[test]
fn sparse_reference_pool_falls_back_without_failing() {
    let config = AuditConfig::from_yaml_str(
        "num_reference_models: 2\nnum_experiments: 2\nrange:\n  sample_size: 4\ntrim:\n  fraction: 0.25\n",
    )
    .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let (ensemble, base) =
        split_dataset_for_training(40, config.num_model_pairs(), &mut rng).unwrap();
    let range = base.repeat_columns(4).unwrap();
    let signals = synthetic_signal_matrix(&mut rng, &range, 2.0, 0.1).unwrap();
    let groups = RangeGroups::new(40, 4).unwrap();

    let runner = RangeAuditRunner::new(config).unwrap();
    let report = runner
        .run_on_signals(&signals, &range, &ensemble, &groups)
        .unwrap();
    for experiment in &report.experiments {
        assert_eq!(experiment.fallback_points.len(), 160);
        assert!(experiment.aggregated_scores.iter().all(|s| s.is_finite()));
    }
    assert_eq!(report.summary.usable_experiments(), 2);
}
