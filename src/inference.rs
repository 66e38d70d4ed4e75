//! Hosted question-answering client used to read the declared value.

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::schema::{InferenceQuery, InferenceResult};

/// Async trait for anything that can answer a question about extracted text.
#[async_trait::async_trait]
pub trait ValueExtractor: Send + Sync {
    async fn query(&self, query: &InferenceQuery) -> Result<InferenceResult, InferenceError>;
}

/// Client for a hosted extractive QA model.
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl InferenceClient {
    pub fn new(client: Client, endpoint: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            bearer_token,
        }
    }
}

#[async_trait::async_trait]
impl ValueExtractor for InferenceClient {
    async fn query(&self, query: &InferenceQuery) -> Result<InferenceResult, InferenceError> {
        let token = self
            .bearer_token
            .as_deref()
            .ok_or(InferenceError::MissingCredential)?;

        debug!(
            "Sending question to {} ({} chars of context)",
            self.endpoint,
            query.context.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&QaRequest { inputs: query })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let result = parse_answer(&body)?;

        info!(
            "Inference answer: {:?} (score: {}, span: {:?}..{:?})",
            result.answer,
            result
                .score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "n/a".to_string()),
            result.start,
            result.end
        );

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct QaRequest<'a> {
    inputs: &'a InferenceQuery,
}

/// Accept `{answer, ..}` or `[{answer, ..}]`; anything else is a failure.
fn parse_answer(body: &str) -> Result<InferenceResult, InferenceError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    let object = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };

    match object.get("answer") {
        Some(serde_json::Value::String(_)) => serde_json::from_value(object)
            .map_err(|e| InferenceError::MalformedResponse(e.to_string())),
        _ => Err(InferenceError::MissingAnswer),
    }
}
