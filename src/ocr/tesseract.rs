//! Local Tesseract OCR provider.
//!
//! The engine runs as a child process fed through stdin. The child is killed
//! when dropped, so an aborted or failed call never leaves it running.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{check_document, OcrProvider};
use crate::error::ExtractionError;
use crate::schema::{ExtractedText, UploadedDocument};

pub struct TesseractProvider {
    binary: String,
    language: String,
}

impl TesseractProvider {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for TesseractProvider {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract_text(
        &self,
        document: &UploadedDocument,
    ) -> Result<ExtractedText, ExtractionError> {
        let format = check_document(document)?;
        info!(
            "TesseractProvider: recognizing {} ({:?}, {} bytes, lang={})",
            document.filename,
            format,
            document.data.len(),
            self.language
        );

        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExtractionError::EngineUnavailable(format!("failed to start {}: {}", self.binary, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractionError::EngineFailed("stdin not captured".to_string()))?;
        let data = document.data.as_slice();
        let feed = async move {
            let result = stdin.write_all(data).await;
            drop(stdin);
            result
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| ExtractionError::EngineFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::EngineFailed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        // A broken pipe only matters if the engine also reported failure.
        if let Err(e) = fed {
            debug!("TesseractProvider: stdin closed early: {}", e);
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("TesseractProvider: {} chars recognized", text.len());
        Ok(ExtractedText(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::PNG_MAGIC;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let provider = TesseractProvider::new("poa-verifier-no-such-ocr-binary", "eng");
        let doc = UploadedDocument::new("scan.png", PNG_MAGIC.to_vec());
        let err = provider.extract_text(&doc).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        // `cat` rejects the `-l` flag and exits non-zero.
        let provider = TesseractProvider::new("cat", "eng");
        let doc = UploadedDocument::new("scan.png", PNG_MAGIC.to_vec());
        let err = provider.extract_text(&doc).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EngineFailed(_)));
    }

    #[tokio::test]
    async fn test_rejects_before_spawning() {
        let provider = TesseractProvider::new("poa-verifier-no-such-ocr-binary", "eng");
        let doc = UploadedDocument::new("doc.pdf", b"%PDF-1.7".to_vec());
        let err = provider.extract_text(&doc).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat));
    }
}
