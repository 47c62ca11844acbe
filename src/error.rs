// ⚠️ Detection errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    /// A raw record could not be parsed; fatal to the whole pass
    #[error("malformed transaction #{index}: field `{field}` {reason}")]
    MalformedInput {
        index: usize,
        field: String,
        reason: String,
    },

    /// Remote classifier failed or timed out
    #[error("suspicious payee classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Remote classifier answered outside the declared schema
    #[error("suspicious payee classifier returned an invalid response: {0}")]
    ClassifierResponseInvalid(String),

    /// Upstream bank data could not be fetched
    #[error("bank data source unavailable: {0}")]
    SourceUnavailable(String),
}

impl DetectionError {
    pub(crate) fn missing(index: usize, field: &str) -> Self {
        DetectionError::MalformedInput {
            index,
            field: field.to_string(),
            reason: "is missing".to_string(),
        }
    }

    pub(crate) fn invalid(index: usize, field: &str, reason: impl Into<String>) -> Self {
        DetectionError::MalformedInput {
            index,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Classifier failures only degrade their own detector
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DetectionError::ClassifierUnavailable(_) | DetectionError::ClassifierResponseInvalid(_)
        )
    }

    /// Name of the offending field for `MalformedInput`
    pub fn field(&self) -> Option<&str> {
        match self {
            DetectionError::MalformedInput { field, .. } => Some(field),
            _ => None,
        }
    }
}
