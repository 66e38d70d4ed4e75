//! Verification-and-issuance orchestrator.
//!
//! One run takes an uploaded document through text extraction, value
//! extraction, normalization and issuance, strictly in that order. The first
//! stage error ends the run in [`PipelineState::Failed`]; only a confirmed
//! receipt ends it in [`PipelineState::Succeeded`].

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::chain::Issuer;
use crate::error::PipelineError;
use crate::inference::ValueExtractor;
use crate::normalize::normalize;
use crate::ocr::OcrProvider;
use crate::schema::{InferenceQuery, PipelineState, TransactionReceipt, UploadedDocument};

/// Terminal result of a run.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded { receipt: TransactionReceipt },
    Failed { error: PipelineError },
}

impl RunOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            Self::Succeeded { .. } => PipelineState::Succeeded,
            Self::Failed { .. } => PipelineState::Failed,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RunRejected {
    #[error("a run is already processing")]
    Busy,
}

pub struct Orchestrator {
    ocr: Arc<dyn OcrProvider>,
    extractor: Arc<dyn ValueExtractor>,
    issuer: Arc<dyn Issuer>,
    question: String,
    state: Arc<Mutex<PipelineState>>,
}

impl Orchestrator {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        extractor: Arc<dyn ValueExtractor>,
        issuer: Arc<dyn Issuer>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            ocr,
            extractor,
            issuer,
            question: question.into(),
            state: Arc::new(Mutex::new(PipelineState::Idle)),
        }
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    /// Notify the orchestrator of a newly selected document and run it to completion.
    ///
    /// Rejected without side effects while another run is processing.
    pub async fn submit(&self, document: UploadedDocument) -> Result<RunOutcome, RunRejected> {
        let guard = self.begin()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        info!(
            parent: &span,
            "Run started for {} ({} bytes, sha256={})",
            document.filename,
            document.data.len(),
            document.digest()
        );

        let result = self.run(document).instrument(span.clone()).await;

        let outcome = match result {
            Ok(receipt) => {
                info!(parent: &span, "Run succeeded: tx {}", receipt.transaction_hash);
                RunOutcome::Succeeded { receipt }
            }
            Err(error) => {
                error!(parent: &span, kind = error.kind(), "Run failed: {}", error);
                RunOutcome::Failed { error }
            }
        };

        guard.finish(outcome.state());
        Ok(outcome)
    }

    /// Move to `Processing`, restarting from `Idle` if a previous run ended.
    fn begin(&self) -> Result<RunGuard, RunRejected> {
        let mut state = lock(&self.state);
        if *state == PipelineState::Processing {
            return Err(RunRejected::Busy);
        }
        if state.is_terminal() {
            debug!("State {:?} -> Idle", *state);
            *state = PipelineState::Idle;
        }
        debug!("State Idle -> Processing");
        *state = PipelineState::Processing;

        Ok(RunGuard {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }

    async fn run(&self, document: UploadedDocument) -> Result<TransactionReceipt, PipelineError> {
        let text = self.ocr.extract_text(&document).await?;
        drop(document);
        debug!("Extracted text via {}: {:?}", self.ocr.name(), text.as_str());

        let query = InferenceQuery::new(self.question.clone(), &text);
        let answer = self.extractor.query(&query).await?;

        let value = normalize(&answer.answer)?;
        info!("Normalized {:?} -> {}", answer.answer, value);

        let receipt = self.issuer.issue(value).await?;
        Ok(receipt)
    }
}

/// Holds a run in `Processing`; a run dropped before finishing is marked `Failed`.
struct RunGuard {
    state: Arc<Mutex<PipelineState>>,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self, terminal: PipelineState) {
        *lock(&self.state) = terminal;
        debug!("State Processing -> {:?}", terminal);
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            error!("Run dropped before completion");
            *lock(&self.state) = PipelineState::Failed;
        }
    }
}

fn lock(state: &Mutex<PipelineState>) -> std::sync::MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
