//! Shared fixtures for unit tests: throwaway HTTP servers and stage stand-ins.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::sync::Notify;

use crate::chain::Issuer;
use crate::config::PipelineConfig;
use crate::error::{ExtractionError, InferenceError, IssuanceError};
use crate::inference::ValueExtractor;
use crate::ocr::{OcrProvider, PNG_MAGIC};
use crate::pipeline::Orchestrator;
use crate::schema::{
    CanonicalValue, ExtractedText, InferenceQuery, InferenceResult, TransactionReceipt,
    UploadedDocument,
};

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Configuration with every value at its default.
pub fn test_config() -> PipelineConfig {
    PipelineConfig::from_lookup(|_| None).unwrap()
}

pub fn scan() -> UploadedDocument {
    UploadedDocument::new("scan.png", PNG_MAGIC.to_vec())
}

pub fn orchestrator(
    ocr: Arc<dyn OcrProvider>,
    extractor: Arc<dyn ValueExtractor>,
    issuer: Arc<dyn Issuer>,
) -> Orchestrator {
    Orchestrator::new(ocr, extractor, issuer, test_config().question)
}

pub struct FixedOcr {
    text: String,
    failure: Mutex<Option<ExtractionError>>,
    gate: Option<Notify>,
}

impl FixedOcr {
    pub fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            failure: Mutex::new(None),
            gate: None,
        })
    }

    pub fn failing(error: ExtractionError) -> Arc<Self> {
        Arc::new(Self {
            text: String::new(),
            failure: Mutex::new(Some(error)),
            gate: None,
        })
    }

    /// Blocks inside extraction until [`FixedOcr::release`] is called.
    pub fn gated(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            failure: Mutex::new(None),
            gate: Some(Notify::new()),
        })
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for FixedOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract_text(
        &self,
        _document: &UploadedDocument,
    ) -> Result<ExtractedText, ExtractionError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        Ok(ExtractedText(self.text.clone()))
    }
}

/// Returns scripted answers in order and records every query.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    queries: Mutex<Vec<InferenceQuery>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<String, InferenceError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn answers(answers: &[&str]) -> Arc<Self> {
        Self::new(answers.iter().map(|a| Ok(a.to_string())).collect())
    }

    pub fn queries(&self) -> Vec<InferenceQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ValueExtractor for ScriptedExtractor {
    async fn query(&self, query: &InferenceQuery) -> Result<InferenceResult, InferenceError> {
        self.queries.lock().unwrap().push(query.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(InferenceError::MissingAnswer));
        next.map(|answer| InferenceResult {
            answer,
            score: Some(0.9),
            start: None,
            end: None,
        })
    }
}

/// Confirms every issuance and records the values it was called with.
pub struct RecordingIssuer {
    values: Mutex<Vec<CanonicalValue>>,
}

impl RecordingIssuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: Mutex::new(Vec::new()),
        })
    }

    /// Issued values in decimal.
    pub fn values(&self) -> Vec<String> {
        self.values.lock().unwrap().iter().map(|v| v.to_string()).collect()
    }
}

#[async_trait::async_trait]
impl Issuer for RecordingIssuer {
    async fn issue(&self, value: CanonicalValue) -> Result<TransactionReceipt, IssuanceError> {
        let mut values = self.values.lock().unwrap();
        values.push(value);
        Ok(TransactionReceipt {
            transaction_hash: format!("0x{:064x}", values.len()),
            block_number: Some("0x1".to_string()),
            block_hash: None,
        })
    }
}

/// Models a wallet whose user refuses account access.
pub struct DenyingIssuer {
    attempts: AtomicUsize,
}

impl DenyingIssuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Issuer for DenyingIssuer {
    async fn issue(&self, _value: CanonicalValue) -> Result<TransactionReceipt, IssuanceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(IssuanceError::AccessDenied("User rejected the request.".to_string()))
    }
}
