use std::path::Path;

use image::DynamicImage;
use thiserror::Error;
use tracing::info;

use crate::config::RecognizerConfig;
use crate::extract::Extractor;
use crate::preprocess::{self, PreprocessError};
use crate::recognizer::{OcrBackend, TextRecognizer};
use crate::types::ExtractionResult;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
}

/// The result of a single receipt processing run.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Raw OCR text output (empty when recognition produced nothing).
    pub ocr_text: String,
    /// Fields extracted from the OCR text.
    pub extracted: ExtractionResult,
}

/// Orchestrates: load → normalize → OCR → extract.
///
/// Only loading the image can fail; every later stage degrades to empty text
/// or absent fields.
pub struct ReceiptPipeline<R: OcrBackend> {
    recognizer: TextRecognizer<R>,
}

impl<R: OcrBackend> ReceiptPipeline<R> {
    pub fn new(backend: R, config: RecognizerConfig) -> Self {
        Self { recognizer: TextRecognizer::new(backend, config) }
    }

    pub fn recognizer(&self) -> &TextRecognizer<R> {
        &self.recognizer
    }

    /// Process a receipt image on disk.
    pub fn process_file(&self, path: &Path) -> Result<OcrResult, PipelineError> {
        info!("Processing receipt: {}", path.display());
        let img = preprocess::load_image(path)?;
        Ok(self.process_image(img))
    }

    /// Process an already-decoded image.
    pub fn process_image(&self, img: DynamicImage) -> OcrResult {
        let binary = preprocess::normalize(img);
        let ocr_text = self.recognizer.recognize(&DynamicImage::ImageLuma8(binary));
        let extracted = Extractor::extract(&ocr_text);
        OcrResult { ocr_text, extracted }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use image::{GrayImage, ImageBuffer, Luma};

    fn receipt_png(dir: &Path) -> std::path::PathBuf {
        let img: GrayImage =
            ImageBuffer::from_fn(60, 90, |x, y| Luma([if y % 12 < 3 && x > 5 { 20 } else { 230 }]));
        let path = dir.join("receipt.png");
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn process_file_produces_ocr_result() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ReceiptPipeline::new(
            MockRecognizer::new("SHOP\n12/05/2024 14:35\nItem 28.50\nTOTAL 1.100.00"),
            RecognizerConfig::default(),
        );

        let result = pipeline.process_file(&receipt_png(dir.path())).unwrap();

        assert_eq!(result.extracted.date.as_deref(), Some("12/05/2024"));
        assert_eq!(result.extracted.total.as_deref(), Some("1.100.00"));
        assert!(result.ocr_text.starts_with("SHOP"));
    }

    #[test]
    fn small_input_reaches_recognizer_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ReceiptPipeline::new(MockRecognizer::new("x"), RecognizerConfig::default());
        pipeline.process_file(&receipt_png(dir.path())).unwrap();
        let calls = pipeline.recognizer().backend().calls();
        let call = &calls[0];
        assert_eq!(call.image_size, Some((200, 300)));
        assert!(!call.image_path.exists());
    }

    #[test]
    fn missing_file_is_the_only_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ReceiptPipeline::new(MockRecognizer::new("x"), RecognizerConfig::default());
        let err = pipeline.process_file(&dir.path().join("missing.jpg")).unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(PreprocessError::Load { .. })));
        assert!(pipeline.recognizer().backend().calls().is_empty());
    }

    #[test]
    fn failed_recognition_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockRecognizer::new("")
            .with_failure(Some("tha+eng"), "no tha.traineddata");
        let pipeline = ReceiptPipeline::new(mock, RecognizerConfig::default());
        let result = pipeline.process_file(&receipt_png(dir.path())).unwrap();
        assert_eq!(result.ocr_text, "");
        assert!(result.extracted.is_empty());
    }
}
