//! HTTP OCR sidecar provider.

use serde::Deserialize;
use tracing::info;

use super::{check_document, OcrProvider};
use crate::error::ExtractionError;
use crate::schema::{ExtractedText, UploadedDocument};

/// Sidecar response (private deserialization type).
#[derive(Debug, Deserialize)]
struct SidecarResponse {
    text: String,
}

pub struct SidecarProvider {
    url: String,
    client: reqwest::Client,
}

impl SidecarProvider {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for SidecarProvider {
    fn name(&self) -> &str {
        "sidecar"
    }

    async fn extract_text(
        &self,
        document: &UploadedDocument,
    ) -> Result<ExtractedText, ExtractionError> {
        use reqwest::multipart::{Form, Part};

        let format = check_document(document)?;
        info!(
            "SidecarProvider: sending {} ({} bytes) to {}",
            document.filename,
            document.data.len(),
            self.url
        );

        let part = Part::bytes(document.data.clone())
            .file_name(document.filename.clone())
            .mime_str(format.to_mime_type())
            .map_err(|e| ExtractionError::EngineFailed(e.to_string()))?;

        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/ocr", self.url.trim_end_matches('/')))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractionError::EngineUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::EngineFailed(format!(
                "OCR sidecar error ({}): {}",
                status, error_text
            )));
        }

        let result: SidecarResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::EngineFailed(format!("bad sidecar response: {}", e)))?;

        Ok(ExtractedText(result.text))
    }
}
