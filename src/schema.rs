//! Data carried through one verification-and-issuance run.
//!
//! Nothing here outlives a run: every value is created, consumed once by the
//! next stage, and dropped when the run reaches a terminal state.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Image payload selected by the user.
#[derive(Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    /// Hex SHA-256 of the payload, used to correlate log lines for a run.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.data);
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("filename", &self.filename)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Plain text transcribed from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText(pub String);

impl ExtractedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Question/context pair sent to the question-answering model.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceQuery {
    pub question: String,
    pub context: String,
}

impl InferenceQuery {
    pub fn new(question: impl Into<String>, context: &ExtractedText) -> Self {
        Self {
            question: question.into(),
            context: context.0.clone(),
        }
    }
}

/// Answer returned by the question-answering model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InferenceResult {
    pub answer: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
}

/// Whole-unit amount submitted for issuance.
///
/// Held as the 32-byte big-endian word passed to `uint256`. Only produced by
/// [`crate::normalize::normalize`]; bounds are left to the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalValue([u8; 32]);

impl CanonicalValue {
    /// Parse decimal digits. `None` on a non-digit or a value wider than 256 bits.
    pub(crate) fn from_decimal(digits: &str) -> Option<Self> {
        let mut word = [0u8; 32];
        for c in digits.chars() {
            let mut carry = c.to_digit(10)? as u16;
            for byte in word.iter_mut().rev() {
                let acc = u16::from(*byte) * 10 + carry;
                *byte = acc as u8;
                carry = acc >> 8;
            }
            if carry != 0 {
                return None;
            }
        }
        Some(Self(word))
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0
    }
}

#[cfg(test)]
impl From<u128> for CanonicalValue {
    fn from(value: u128) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        Self(word)
    }
}

impl std::fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut word = self.0;
        let mut digits = Vec::new();
        while word.iter().any(|b| *b != 0) {
            let mut rem = 0u16;
            for byte in word.iter_mut() {
                let acc = (rem << 8) | u16::from(*byte);
                *byte = (acc / 10) as u8;
                rem = acc % 10;
            }
            digits.push(b'0' + rem as u8);
        }
        if digits.is_empty() {
            return f.write_str("0");
        }
        digits.reverse();
        f.write_str(&String::from_utf8_lossy(&digits))
    }
}

/// 20-byte account or contract address, kept in its `0x`-prefixed lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value plus the account that signs its issuance.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub value: CanonicalValue,
    pub signer: Address,
}

/// Confirmation of an included transaction. The pipeline treats it as opaque.
#[derive(Debug, Clone)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub block_hash: Option<String>,
}

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Processing,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
