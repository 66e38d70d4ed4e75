//! Minimal contract ABI handling: entry parsing, selectors and calldata.

use anyhow::{Context, Result};
use serde::Deserialize;
use sha3::{Digest as Sha3Digest, Keccak256};

use crate::schema::{Address, CanonicalValue};

/// One entry of a JSON contract ABI. Only the fields needed to build calls.
#[derive(Debug, Clone, Deserialize)]
pub struct AbiEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiParam {
    #[serde(rename = "type")]
    pub kind: String,
}

impl AbiEntry {
    /// Canonical signature, e.g. `issuePoA(uint256)`.
    pub fn signature(&self) -> String {
        let params = self
            .inputs
            .iter()
            .map(|p| p.kind.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", self.name.as_deref().unwrap_or_default(), params)
    }
}

/// The verifier contract's ABI, checked to expose what the pipeline calls.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    entries: Vec<AbiEntry>,
    issue_selector: [u8; 4],
    token_selector: [u8; 4],
}

pub const ISSUE_METHOD: &str = "issuePoA";
pub const TOKEN_METHOD: &str = "token";

impl ContractAbi {
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<AbiEntry> =
            serde_json::from_str(json).context("Failed to parse contract ABI")?;

        let issue = find_function(&entries, ISSUE_METHOD)?;
        if issue.inputs.len() != 1 || issue.inputs[0].kind != "uint256" {
            anyhow::bail!(
                "ABI method {} must take a single uint256, found {}",
                ISSUE_METHOD,
                issue.signature()
            );
        }

        let token = find_function(&entries, TOKEN_METHOD)?;
        if !token.inputs.is_empty() || token.outputs.first().map(|o| o.kind.as_str()) != Some("address") {
            anyhow::bail!("ABI method {} must be `token() returns (address)`", TOKEN_METHOD);
        }

        let issue_selector = selector(&issue.signature());
        let token_selector = selector(&token.signature());

        Ok(Self {
            entries,
            issue_selector,
            token_selector,
        })
    }

    pub fn entries(&self) -> &[AbiEntry] {
        &self.entries
    }

    /// Calldata for `issuePoA(value)`.
    pub fn encode_issue(&self, value: CanonicalValue) -> String {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&self.issue_selector);
        data.extend_from_slice(&value.to_be_bytes());
        to_hex(&data)
    }

    /// Calldata for `token()`.
    pub fn encode_token(&self) -> String {
        to_hex(&self.token_selector)
    }
}

fn find_function<'a>(entries: &'a [AbiEntry], name: &str) -> Result<&'a AbiEntry> {
    entries
        .iter()
        .find(|e| e.kind == "function" && e.name.as_deref() == Some(name))
        .with_context(|| format!("ABI has no function named {}", name))
}

/// First four bytes of the Keccak-256 of a method signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn to_hex(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

/// Decode an ABI-encoded `address` return word.
pub fn decode_address(word: &str) -> Option<Address> {
    let hex = word.strip_prefix("0x")?;
    if hex.len() != 64 {
        return None;
    }
    let (padding, addr) = hex.split_at(24);
    if !padding.bytes().all(|b| b == b'0') {
        return None;
    }
    Address::parse(&format!("0x{addr}"))
}
