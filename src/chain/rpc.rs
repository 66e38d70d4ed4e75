//! Ethereum JSON-RPC client and the issuer built on it.
//!
//! Signing is delegated to the node's wallet: accounts are authorized with
//! `eth_requestAccounts` and transactions go out through `eth_sendTransaction`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::abi::{decode_address, ContractAbi};
use super::Issuer;
use crate::config::PipelineConfig;
use crate::error::IssuanceError;
use crate::schema::{Address, CanonicalValue, IssuanceRequest, TransactionReceipt};

/// EIP-1193 "user rejected the request".
const USER_REJECTED: i64 = 4001;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("RPC endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("RPC response parse error: {0}")]
    Parse(String),
}

impl RpcError {
    /// Map onto the issuance taxonomy, using `on_node` for errors reported by the node.
    fn into_issuance(self, on_node: fn(String) -> IssuanceError) -> IssuanceError {
        match self {
            Self::Transport(e) => IssuanceError::Transport(e.to_string()),
            Self::Node { code, message } => on_node(format!("{} (code {})", message, code)),
            Self::Status { status, body } => {
                IssuanceError::Transport(format!("HTTP {}: {}", status, body))
            }
            Self::Parse(msg) => IssuanceError::MalformedResponse(msg),
        }
    }
}

/// Thin JSON-RPC 2.0 client.
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC -> {} #{}", method, id);

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        // Some providers pair a JSON-RPC error object with a non-2xx status.
        let resp: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
            Err(e) => return Err(RpcError::Parse(format!("json: {e}"))),
        };

        if let Some(error) = resp.get("error") {
            return Err(RpcError::Node {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        if !status.is_success() {
            return Err(RpcError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let result = resp.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| RpcError::Parse(format!("{method}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    block_hash: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Issues values through the verifier contract over JSON-RPC.
pub struct RpcIssuer {
    rpc: RpcClient,
    contract: Address,
    abi: ContractAbi,
    pinned_signer: Option<Address>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl RpcIssuer {
    pub fn new(config: &PipelineConfig, client: Client) -> Self {
        Self {
            rpc: RpcClient::new(client, config.rpc_url.clone()),
            contract: config.contract_address.clone(),
            abi: config.contract_abi.clone(),
            pinned_signer: config.signer_address.clone(),
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.confirmation_poll_interval,
        }
    }

    /// Address of the token contract the verifier issues into (`token()`).
    pub async fn token_address(&self) -> Result<Address, RpcError> {
        let word: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": self.contract, "data": self.abi.encode_token() }, "latest"]),
            )
            .await?;
        decode_address(&word).ok_or_else(|| RpcError::Parse(format!("token() returned {word}")))
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, IssuanceError> {
        let raw: Vec<String> = self
            .rpc
            .call("eth_requestAccounts", json!([]))
            .await
            .map_err(|e| match e {
                RpcError::Node { code, message } if code == USER_REJECTED => {
                    IssuanceError::AccessDenied(message)
                }
                other => other.into_issuance(IssuanceError::AccessDenied),
            })?;

        let accounts: Vec<Address> = raw.iter().filter_map(|a| Address::parse(a)).collect();
        if accounts.is_empty() {
            return Err(IssuanceError::AccessDenied(
                "wallet authorized no accounts".to_string(),
            ));
        }
        Ok(accounts)
    }

    async fn send(&self, request: &IssuanceRequest) -> Result<String, IssuanceError> {
        let tx = json!({
            "from": request.signer,
            "to": self.contract,
            "data": self.abi.encode_issue(request.value),
        });

        self.rpc
            .call("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| e.into_issuance(IssuanceError::Rejected))
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<RawReceipt, IssuanceError> {
        let poll = async {
            loop {
                let polled: Result<Option<RawReceipt>, RpcError> = self
                    .rpc
                    .call("eth_getTransactionReceipt", json!([tx_hash]))
                    .await;

                match polled {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(e) => return Err(e.into_issuance(IssuanceError::Transport)),
                }
                debug!("Transaction {} pending... waiting", tx_hash);
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.confirmation_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(IssuanceError::ConfirmationTimeout {
                tx_hash: tx_hash.to_string(),
                secs: self.confirmation_timeout.as_secs(),
            }),
        }
    }
}

/// Pick the signing account among those the wallet authorized.
fn resolve_signer(accounts: &[Address], pinned: Option<&Address>) -> Result<Address, IssuanceError> {
    match pinned {
        Some(want) if accounts.contains(want) => Ok(want.clone()),
        Some(want) => Err(IssuanceError::SignerUnavailable(format!(
            "{} is not among the authorized accounts",
            want
        ))),
        None => accounts
            .first()
            .cloned()
            .ok_or_else(|| IssuanceError::SignerUnavailable("no accounts".to_string())),
    }
}

#[async_trait::async_trait]
impl Issuer for RpcIssuer {
    async fn issue(&self, value: CanonicalValue) -> Result<TransactionReceipt, IssuanceError> {
        let accounts = self.request_accounts().await?;
        let signer = resolve_signer(&accounts, self.pinned_signer.as_ref())?;
        info!("Account: {}", signer);

        let request = IssuanceRequest { value, signer };
        let tx_hash = self.send(&request).await?;
        info!(
            "Submitted issuePoA({}) to {} as {}",
            request.value, self.contract, tx_hash
        );

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        if receipt.status.as_deref() == Some("0x0") {
            warn!("Transaction {} reverted", receipt.transaction_hash);
            return Err(IssuanceError::Reverted(receipt.transaction_hash));
        }

        info!(
            "Transaction {} confirmed in block {}",
            receipt.transaction_hash,
            receipt.block_number.as_deref().unwrap_or("?")
        );

        Ok(TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            block_hash: receipt.block_hash,
        })
    }
}
