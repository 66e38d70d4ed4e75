//! Runtime configuration.
//!
//! Everything the pipeline needs from its environment is read once at startup
//! into a [`PipelineConfig`] and handed to each adapter at construction.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::chain::abi::ContractAbi;
use crate::ocr::OcrProviderKind;
use crate::schema::Address;

const DEFAULT_CONTRACT_ADDRESS: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
const DEFAULT_INFERENCE_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/sabrinah/ALBERT-PoA";
const DEFAULT_QUESTION: &str = "What is the value of the property?";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const BUNDLED_ABI: &str = include_str!("../abi/verifier.json");

/// Immutable settings shared by every run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub contract_address: Address,
    pub contract_abi: ContractAbi,
    pub inference_endpoint: String,
    pub bearer_token: Option<String>,
    pub question: String,
    pub rpc_url: String,
    /// Pin the signing account instead of taking the first authorized one.
    pub signer_address: Option<Address>,
    pub confirmation_timeout: Duration,
    pub confirmation_poll_interval: Duration,
    pub ocr: OcrConfig,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub provider: OcrProviderKind,
    pub language: String,
    pub tesseract_bin: String,
    pub sidecar_url: Option<String>,
}

impl PipelineConfig {
    /// Build from process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_address =
            get("POA_CONTRACT_ADDRESS").unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_string());
        let contract_address = Address::parse(&raw_address)
            .with_context(|| format!("POA_CONTRACT_ADDRESS is not an address: {}", raw_address))?;

        let contract_abi = match get("POA_CONTRACT_ABI_PATH") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read ABI: {:?}", path))?;
                let abi = ContractAbi::from_json(&json)?;
                info!("Loaded contract ABI from {:?} ({} entries)", path, abi.entries().len());
                abi
            }
            None => ContractAbi::from_json(BUNDLED_ABI)?,
        };

        let bearer_token = get("HF_TOKEN");
        if bearer_token.is_none() {
            warn!("HF_TOKEN not set; every inference call will fail authorization");
        }

        let signer_address = match get("POA_SIGNER_ADDRESS") {
            Some(raw) => Some(
                Address::parse(&raw)
                    .with_context(|| format!("POA_SIGNER_ADDRESS is not an address: {}", raw))?,
            ),
            None => None,
        };

        let provider_name = get("OCR_PROVIDER").unwrap_or_else(|| "tesseract".to_string());
        let provider = OcrProviderKind::from_str(&provider_name)
            .with_context(|| format!("Unknown OCR_PROVIDER: {}", provider_name))?;
        let sidecar_url = get("OCR_SIDECAR_URL");
        if provider == OcrProviderKind::Sidecar && sidecar_url.is_none() {
            anyhow::bail!("OCR_PROVIDER=sidecar requires OCR_SIDECAR_URL");
        }

        Ok(Self {
            contract_address,
            contract_abi,
            inference_endpoint: get("INFERENCE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_INFERENCE_ENDPOINT.to_string()),
            bearer_token,
            question: get("INFERENCE_QUESTION").unwrap_or_else(|| DEFAULT_QUESTION.to_string()),
            rpc_url: get("ETH_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            signer_address,
            confirmation_timeout: Duration::from_secs(parse_or(
                get("POA_CONFIRMATION_TIMEOUT_SECS"),
                "POA_CONFIRMATION_TIMEOUT_SECS",
                120,
            )?),
            confirmation_poll_interval: Duration::from_millis(parse_or(
                get("POA_CONFIRMATION_POLL_MS"),
                "POA_CONFIRMATION_POLL_MS",
                1000,
            )?),
            ocr: OcrConfig {
                provider,
                language: get("OCR_LANGUAGE").unwrap_or_else(|| "eng".to_string()),
                tesseract_bin: get("TESSERACT_BIN").unwrap_or_else(|| "tesseract".to_string()),
                sidecar_url,
            },
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            max_upload_bytes: parse_or(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, v)),
        None => Ok(default),
    }
}
