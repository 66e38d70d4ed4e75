//! Text extraction from uploaded document images.
//!
//! Defines the [`OcrProvider`] trait so the local Tesseract engine and an HTTP
//! OCR sidecar can be swapped through configuration.

pub mod sidecar;
pub mod tesseract;

use std::sync::Arc;

use image::ImageFormat;

use crate::config::OcrConfig;
use crate::error::ExtractionError;
use crate::schema::{ExtractedText, UploadedDocument};

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn extract_text(&self, document: &UploadedDocument)
        -> Result<ExtractedText, ExtractionError>;
}

/// Known provider identifiers used for config lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Tesseract,
    Sidecar,
}

impl OcrProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tesseract" => Some(Self::Tesseract),
            "sidecar" => Some(Self::Sidecar),
            _ => None,
        }
    }
}

/// Build the configured provider.
pub fn build_provider(config: &OcrConfig, client: reqwest::Client) -> Arc<dyn OcrProvider> {
    match (config.provider, config.sidecar_url.as_ref()) {
        (OcrProviderKind::Sidecar, Some(url)) => {
            Arc::new(sidecar::SidecarProvider::new(url.clone(), client))
        }
        _ => Arc::new(tesseract::TesseractProvider::new(
            config.tesseract_bin.clone(),
            config.language.clone(),
        )),
    }
}

/// Reject payloads no OCR engine should be handed, returning the detected format.
pub fn check_document(document: &UploadedDocument) -> Result<ImageFormat, ExtractionError> {
    if document.data.is_empty() {
        return Err(ExtractionError::EmptyDocument);
    }

    let format =
        image::guess_format(&document.data).map_err(|_| ExtractionError::UnsupportedFormat)?;

    match format {
        ImageFormat::Png
        | ImageFormat::Jpeg
        | ImageFormat::Tiff
        | ImageFormat::Bmp
        | ImageFormat::Gif
        | ImageFormat::WebP
        | ImageFormat::Pnm => Ok(format),
        _ => Err(ExtractionError::UnsupportedFormat),
    }
}

#[cfg(test)]
pub(crate) const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
