//! Error types for range membership-inference audits.

/// Boxed error returned by an external model-evaluation collaborator.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while auditing.
#[derive(Debug, thiserror::Error)]
pub enum RamiaError {
    /// Configuration rejected before any computation.
    #[error("configuration error: {param}: {msg}")]
    Config {
        /// Name of the offending parameter.
        param: &'static str,
        /// Human-readable error description.
        msg: String,
    },

    /// Configuration text could not be deserialized.
    #[error("failed to parse configuration: {msg}")]
    Parse {
        /// Human-readable error description.
        msg: String,
    },

    /// A model-evaluation call failed.
    #[error("evaluation failed for model {model} on records {start}..{end}: {source}")]
    Evaluation {
        /// Index of the model being evaluated.
        model: usize,
        /// First record index of the failing batch.
        start: usize,
        /// One past the last record index of the failing batch.
        end: usize,
        /// Error reported by the evaluator.
        #[source]
        source: BoxedSource,
    },

    /// Inputs of a stage do not line up.
    #[error("shape mismatch: {msg}")]
    ShapeMismatch {
        /// Human-readable error description.
        msg: String,
    },

    /// Invalid parameter provided.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// Human-readable error description.
        msg: String,
    },

    /// Numerical computation error.
    #[error("numerical error: {msg}")]
    NumericalError {
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, RamiaError>;

impl RamiaError {
    /// Create a configuration error for `param`.
    pub fn config<S: Into<String>>(param: &'static str, msg: S) -> Self {
        Self::Config {
            param,
            msg: msg.into(),
        }
    }

    /// Create a shape mismatch error.
    pub fn shape<S: Into<String>>(msg: S) -> Self {
        Self::ShapeMismatch { msg: msg.into() }
    }

    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Create a numerical error.
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::NumericalError { msg: msg.into() }
    }

    /// Wrap an evaluator error with the model and record batch it came from.
    pub fn evaluation<E>(model: usize, records: std::ops::Range<usize>, source: E) -> Self
    where
        E: Into<BoxedSource>,
    {
        Self::Evaluation {
            model,
            start: records.start,
            end: records.end,
            source: source.into(),
        }
    }

    /// Name of the offending parameter for configuration errors.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::Config { param, .. } => Some(param),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_names_model_and_batch() {
        let err = RamiaError::evaluation(3, 10..20, "logits have wrong width");
        let text = err.to_string();
        assert!(text.contains("model 3"));
        assert!(text.contains("10..20"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn config_error_exposes_param() {
        let err = RamiaError::config("trim.fraction", "must be in [0, 1)");
        assert_eq!(err.param(), Some("trim.fraction"));
        assert!(err.to_string().starts_with("configuration error: trim.fraction"));
    }
}
