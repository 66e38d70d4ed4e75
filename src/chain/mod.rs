//! On-chain issuance through the verifier contract.

pub mod abi;
pub mod rpc;

use crate::error::IssuanceError;
use crate::schema::{CanonicalValue, TransactionReceipt};

pub use rpc::RpcIssuer;

/// Submits a canonical value for issuance and resolves once it is confirmed.
#[async_trait::async_trait]
pub trait Issuer: Send + Sync {
    async fn issue(&self, value: CanonicalValue) -> Result<TransactionReceipt, IssuanceError>;
}
