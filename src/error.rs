//! Failure taxonomy for the verification pipeline.
//!
//! Each stage returns its own error type. The orchestrator folds them into
//! [`PipelineError`] so logs can tell the kinds apart while the user only
//! ever sees a single failed outcome.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document is empty")]
    EmptyDocument,
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no bearer token configured for the inference endpoint")]
    MissingCredential,
    #[error("inference request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference response is not valid JSON: {0}")]
    MalformedResponse(String),
    #[error("inference response has no answer")]
    MissingAnswer,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("answer has no digits after the unit symbol")]
    Empty,
    #[error("'{remainder}' is not a whole number")]
    InvalidDigits { remainder: String },
    #[error("value does not fit in 256 bits")]
    Overflow,
}

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("wallet denied account access: {0}")]
    AccessDenied(String),
    #[error("no signer available: {0}")]
    SignerUnavailable(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction {0} reverted")]
    Reverted(String),
    #[error("transaction {tx_hash} not confirmed within {secs}s")]
    ConfirmationTimeout { tx_hash: String, secs: u64 },
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),
}

/// Any stage failure of a single run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("text extraction: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("value extraction: {0}")]
    Inference(#[from] InferenceError),
    #[error("normalization: {0}")]
    Normalization(#[from] NormalizationError),
    #[error("issuance: {0}")]
    Issuance(#[from] IssuanceError),
}

impl PipelineError {
    /// Stable label of the failing stage, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extraction",
            Self::Inference(_) => "inference",
            Self::Normalization(_) => "normalization",
            Self::Issuance(_) => "issuance",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        let err: PipelineError = NormalizationError::Empty.into();
        assert_eq!(err.kind(), "normalization");

        let err: PipelineError = IssuanceError::AccessDenied("user rejected".into()).into();
        assert_eq!(err.kind(), "issuance");
        assert!(err.to_string().contains("user rejected"));
    }
}
