//! Signal extraction: one scalar per (model, record).
//!
//! Model evaluation is the only expensive step of an audit. Every
//! (model, record-batch) job runs independently on the rayon pool and
//! owns the cells it produces, so the finished [`SignalMatrix`] is
//! written exactly once per cell and is read-only afterwards.

use std::ops::Range;

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BoxedSource, RamiaError, Result};

/// Computes a membership signal from a model and a batch of records.
///
/// Implementations must be deterministic for fixed model weights:
/// evaluate in inference mode with no dropout or other sampling.
pub trait SignalExtractor<M: ?Sized>: Sync {
    /// Error reported when the model cannot be evaluated.
    type Error: Into<BoxedSource>;

    /// One signal per record, in the order of `records`.
    fn signal(&self, model: &M, records: &[usize]) -> std::result::Result<Vec<f64>, Self::Error>;
}

/// `S[model][record]`, computed once per run.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalMatrix {
    values: Array2<f64>,
}

impl SignalMatrix {
    /// Wrap a `(models, records)` array. Non-finite signals are rejected.
    pub fn from_array(values: Array2<f64>) -> Result<Self> {
        if let Some(((model, record), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(RamiaError::numerical(format!(
                "signal for model {model}, record {record} is {v}"
            )));
        }
        Ok(Self { values })
    }

    /// Build from one row of signals per model.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let num_models = rows.len();
        let num_records = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != num_records) {
            return Err(RamiaError::shape(format!(
                "signal row {bad} has {} records, expected {num_records}",
                rows[bad].len()
            )));
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((num_models, num_records), flat)
            .map_err(|e| RamiaError::shape(e.to_string()))?;
        Self::from_array(values)
    }

    /// Number of models (rows).
    pub fn num_models(&self) -> usize {
        self.values.nrows()
    }

    /// Number of records (columns).
    pub fn num_records(&self) -> usize {
        self.values.ncols()
    }

    /// Signal of `model` on `record`.
    pub fn get(&self, model: usize, record: usize) -> f64 {
        self.values[[model, record]]
    }

    /// Signals of one model across all records.
    pub fn row(&self, model: usize) -> ArrayView1<'_, f64> {
        self.values.row(model)
    }

    /// Signals of one record across all models.
    pub fn column(&self, record: usize) -> ArrayView1<'_, f64> {
        self.values.column(record)
    }

    /// Underlying array.
    pub fn as_array(&self) -> &Array2<f64> {
        &self.values
    }
}

/// Evaluate every model on `records` in batches of `batch_size`.
///
/// Column `j` of the result holds the signals for `records[j]`. The first
/// failing job aborts the computation with its model and batch attached.
pub fn compute_signal_matrix<M, X>(
    extractor: &X,
    models: &[M],
    records: &[usize],
    batch_size: usize,
) -> Result<SignalMatrix>
where
    M: Sync,
    X: SignalExtractor<M>,
{
    if batch_size == 0 {
        return Err(RamiaError::config("signal_batch_size", "must be positive"));
    }
    let num_records = records.len();
    let jobs: Vec<(usize, Range<usize>)> = (0..models.len())
        .flat_map(|model| {
            (0..num_records)
                .step_by(batch_size)
                .map(move |start| (model, start..(start + batch_size).min(num_records)))
        })
        .collect();

    tracing::debug!(
        num_models = models.len(),
        num_records,
        num_jobs = jobs.len(),
        "dispatching signal extraction"
    );

    let outputs: Vec<(usize, Range<usize>, Vec<f64>)> = jobs
        .into_par_iter()
        .map(|(model, span)| {
            let batch = &records[span.clone()];
            let values = extractor
                .signal(&models[model], batch)
                .map_err(|e| RamiaError::evaluation(model, span.clone(), e))?;
            if values.len() != batch.len() {
                return Err(RamiaError::evaluation(
                    model,
                    span,
                    format!("returned {} signals for {} records", values.len(), batch.len()),
                ));
            }
            Ok((model, span, values))
        })
        .collect::<Result<_>>()?;

    let mut matrix = Array2::zeros((models.len(), num_records));
    for (model, span, values) in outputs {
        for (col, value) in span.zip(values) {
            matrix[[model, col]] = value;
        }
    }
    SignalMatrix::from_array(matrix)
}

/// A classifier that exposes per-class logits.
pub trait LogitModel: Sync {
    /// Error reported when evaluation fails.
    type Error: Into<BoxedSource>;

    /// Logits of shape `(records.len(), num_classes)`.
    fn logits(&self, records: &[usize]) -> std::result::Result<Array2<f64>, Self::Error>;
}

/// Scalar summaries of a logit row given the true label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Softmax probability of the true label.
    Confidence,
    /// Log-softmax of the true label (negative cross-entropy loss).
    NegativeLoss,
    /// `log(p_y) - log(1 - p_y)`, the logit-scaled confidence.
    #[default]
    RescaledLogit,
    /// True-label logit minus the largest other logit.
    LogitMargin,
}

impl SignalKind {
    /// Apply to one row of logits. Requires at least two classes.
    pub fn apply(self, logits: ArrayView1<'_, f64>, label: usize) -> Result<f64> {
        let width = logits.len();
        if width < 2 {
            return Err(RamiaError::shape(format!(
                "need at least 2 classes, got {width}"
            )));
        }
        if label >= width {
            return Err(RamiaError::shape(format!(
                "label {label} out of range for {width} classes"
            )));
        }
        let target = logits[label];
        let others = logits
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != label)
            .map(|(_, &z)| z);
        let value = match self {
            Self::Confidence => (target - log_sum_exp(logits.iter().copied())).exp(),
            Self::NegativeLoss => target - log_sum_exp(logits.iter().copied()),
            Self::RescaledLogit => target - log_sum_exp(others),
            Self::LogitMargin => target - others.fold(f64::NEG_INFINITY, f64::max),
        };
        Ok(value)
    }
}

fn log_sum_exp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Turns a [`LogitModel`] into a [`SignalExtractor`] using true labels.
#[derive(Clone, Debug)]
pub struct LogitSignalExtractor {
    kind: SignalKind,
    labels: Vec<usize>,
}

impl LogitSignalExtractor {
    /// `labels[r]` is the true class of record `r`.
    pub fn new(kind: SignalKind, labels: Vec<usize>) -> Self {
        Self { kind, labels }
    }

    /// Configured signal.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }
}

impl<M: LogitModel> SignalExtractor<M> for LogitSignalExtractor {
    type Error = BoxedSource;

    fn signal(&self, model: &M, records: &[usize]) -> std::result::Result<Vec<f64>, BoxedSource> {
        let logits = model
            .logits(records)
            .map_err(|e| -> BoxedSource { e.into() })?;
        if logits.nrows() != records.len() {
            return Err(RamiaError::shape(format!(
                "model returned {} logit rows for {} records",
                logits.nrows(),
                records.len()
            ))
            .into());
        }
        records
            .iter()
            .zip(logits.rows())
            .map(|(&record, row)| {
                let label = *self.labels.get(record).ok_or_else(|| {
                    RamiaError::shape(format!("no label for record {record}"))
                })?;
                self.kind.apply(row, label)
            })
            .collect::<Result<Vec<f64>>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Offset(f64);

    #[derive(Debug)]
    struct Broken;

    impl std::fmt::Display for Broken {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "forward pass failed")
        }
    }

    impl std::error::Error for Broken {}

    struct AddRecord {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl SignalExtractor<Offset> for AddRecord {
        type Error = Broken;

        fn signal(
            &self,
            model: &Offset,
            records: &[usize],
        ) -> std::result::Result<Vec<f64>, Broken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(bad) = self.fail_on {
                if records.contains(&bad) && model.0 > 0.5 {
                    return Err(Broken);
                }
            }
            Ok(records.iter().map(|&r| model.0 + r as f64).collect())
        }
    }

    struct FixedLogits(Array2<f64>);

    impl LogitModel for FixedLogits {
        type Error = Broken;

        fn logits(&self, records: &[usize]) -> std::result::Result<Array2<f64>, Broken> {
            Ok(self.0.select(ndarray::Axis(0), records))
        }
    }

    #[test]
    fn matrix_cells_follow_record_order() {
        let models = vec![Offset(0.0), Offset(10.0)];
        let extractor = AddRecord {
            calls: AtomicUsize::new(0),
            fail_on: None,
        };
        let matrix = compute_signal_matrix(&extractor, &models, &[5, 3, 8], 2).unwrap();
        assert_eq!(matrix.num_models(), 2);
        assert_eq!(matrix.num_records(), 3);
        assert_eq!(matrix.get(0, 1), 3.0);
        assert_eq!(matrix.get(1, 2), 18.0);
        // two models, two batches each
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failure_reports_model_and_batch() {
        let models = vec![Offset(0.0), Offset(1.0)];
        let extractor = AddRecord {
            calls: AtomicUsize::new(0),
            fail_on: Some(4),
        };
        let err = compute_signal_matrix(&extractor, &models, &[0, 1, 2, 3, 4], 2).unwrap_err();
        match err {
            RamiaError::Evaluation {
                model, start, end, ..
            } => {
                assert_eq!(model, 1);
                assert_eq!((start, end), (4, 5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_finite_signals_are_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = SignalMatrix::from_rows(vec![vec![0.0, bad]]).unwrap_err();
            assert!(matches!(err, RamiaError::NumericalError { .. }));
        }
    }

    #[test]
    fn signal_kinds_on_two_classes() {
        let row = array![2.0, 0.0];
        let conf = SignalKind::Confidence.apply(row.view(), 0).unwrap();
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        assert!((conf - expected).abs() < 1e-12);
        let loss = SignalKind::NegativeLoss.apply(row.view(), 0).unwrap();
        assert!((loss - expected.ln()).abs() < 1e-12);
        let scaled = SignalKind::RescaledLogit.apply(row.view(), 0).unwrap();
        assert!((scaled - 2.0).abs() < 1e-12);
        let margin = SignalKind::LogitMargin.apply(row.view(), 1).unwrap();
        assert!((margin + 2.0).abs() < 1e-12);
    }

    #[test]
    fn rescaled_logit_is_stable_for_large_logits() {
        let row = array![1000.0, -1000.0, 0.0];
        let scaled = SignalKind::RescaledLogit.apply(row.view(), 0).unwrap();
        assert!(scaled.is_finite());
        assert!((scaled - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn single_class_logits_are_rejected() {
        let row = array![1.0];
        assert!(SignalKind::Confidence.apply(row.view(), 0).is_err());
    }

    #[test]
    fn logit_extractor_uses_true_labels() {
        let model = FixedLogits(array![[3.0, 1.0], [0.0, 4.0]]);
        let extractor = LogitSignalExtractor::new(SignalKind::LogitMargin, vec![0, 1]);
        let values = extractor.signal(&model, &[1, 0]).unwrap();
        assert_eq!(values, vec![4.0, 2.0]);
    }

    #[test]
    fn logit_extractor_rejects_unlabeled_records() {
        let model = FixedLogits(array![[3.0, 1.0], [0.0, 4.0]]);
        let extractor = LogitSignalExtractor::new(SignalKind::Confidence, vec![0]);
        assert!(extractor.signal(&model, &[1]).is_err());
    }
}
