use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RecognizerConfig;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to write temporary OCR image: {0}")]
    TempImage(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: {0}")]
    NotAvailable(String),
}

/// Abstraction over an OCR backend.
///
/// A backend reads the image file at `image_path` and returns whatever text
/// the engine produced, using `language` (a Tesseract language code such as
/// `tha+eng`, or `None` for the engine's default) and the given page
/// segmentation mode.
pub trait OcrBackend: Send + Sync {
    fn recognize(
        &self,
        image_path: &Path,
        language: Option<&str>,
        page_seg_mode: u8,
    ) -> Result<String, OcrError>;
}

// ── Fallback driver ───────────────────────────────────────────────────────────

/// Runs a backend over the configured language attempts and keeps the first
/// non-blank result.
///
/// Recognition never fails from the caller's point of view: a failing attempt
/// is logged and skipped, and when nothing produces text the result is empty.
pub struct TextRecognizer<B: OcrBackend> {
    backend: B,
    config: RecognizerConfig,
}

impl<B: OcrBackend> TextRecognizer<B> {
    pub fn new(backend: B, config: RecognizerConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Recognize the text in `image`.
    ///
    /// The image is written to a temporary JPEG for the duration of the call;
    /// the file is gone again by the time this returns.
    pub fn recognize(&self, image: &DynamicImage) -> String {
        if image.width() == 0 || image.height() == 0 {
            warn!("image is empty, skipping OCR");
            return String::new();
        }

        let file = match self.write_temp_jpeg(image) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "could not stage image for OCR");
                return String::new();
            }
        };

        let text = self.run_attempts(file.path());

        let path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            warn!(path = %path.display(), error = %e, "failed to remove temporary OCR image");
        }
        text
    }

    fn run_attempts(&self, image_path: &Path) -> String {
        for (i, attempt) in self.config.attempts.iter().enumerate() {
            debug!(attempt = %attempt.label, "running OCR attempt");
            match self.backend.recognize(
                image_path,
                attempt.language.as_deref(),
                self.config.page_seg_mode,
            ) {
                Ok(text) if !text.trim().is_empty() => {
                    if i > 0 {
                        info!(attempt = %attempt.label, "OCR text produced by fallback attempt");
                    }
                    return text;
                }
                Ok(_) => debug!(attempt = %attempt.label, "OCR attempt produced no text"),
                Err(e) => warn!(attempt = %attempt.label, error = %e, "OCR attempt failed"),
            }
        }
        warn!("all OCR attempts came back empty");
        String::new()
    }

    /// 8-bit, three channel, JPEG at the configured quality.
    fn write_temp_jpeg(&self, image: &DynamicImage) -> Result<NamedTempFile, OcrError> {
        let rgb = image.to_rgb8();
        let mut file = tempfile::Builder::new()
            .prefix("receipt-ocr-")
            .suffix(".jpg")
            .tempfile()
            .map_err(|e| OcrError::TempImage(e.to_string()))?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            JpegEncoder::new_with_quality(&mut writer, self.config.jpeg_quality)
                .encode_image(&rgb)
                .map_err(|e| OcrError::TempImage(e.to_string()))?;
            writer.flush().map_err(|e| OcrError::TempImage(e.to_string()))?;
        }
        Ok(file)
    }
}

// ── Tesseract command-line backend ────────────────────────────────────────────

/// Shells out to the `tesseract` executable, reading the text from stdout.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: PathBuf,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(command: impl Into<PathBuf>, tessdata_dir: Option<PathBuf>) -> Self {
        Self { command: command.into(), tessdata_dir }
    }

    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self::new(config.tesseract_cmd.clone(), config.tessdata_dir.clone())
    }

    fn build_command(&self, image_path: &Path, language: Option<&str>, page_seg_mode: u8) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(image_path).arg("stdout");
        if let Some(lang) = language {
            cmd.arg("-l").arg(lang);
        }
        cmd.arg("--psm").arg(page_seg_mode.to_string());
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(
        &self,
        image_path: &Path,
        language: Option<&str>,
        page_seg_mode: u8,
    ) -> Result<String, OcrError> {
        let output = self
            .build_command(image_path, language, page_seg_mode)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    OcrError::NotAvailable(format!("{} not found", self.command.display()))
                }
                _ => OcrError::Engine(format!("failed to run {}: {e}", self.command.display())),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

#[derive(Debug, Clone)]
enum MockOutcome {
    Text(String),
    Fail(String),
}

/// One call observed by [`MockRecognizer`].
#[derive(Debug, Clone)]
pub struct MockCall {
    pub image_path: PathBuf,
    pub language: Option<String>,
    pub page_seg_mode: u8,
    /// Whether the image file existed while the backend was running.
    pub file_existed: bool,
    /// Dimensions of the staged image, when it could be read.
    pub image_size: Option<(u32, u32)>,
}

/// Scripted backend: returns preset text (or errors) per language, and
/// records every call so tests can inspect the fallback order.
pub struct MockRecognizer {
    default: MockOutcome,
    by_language: Vec<(Option<String>, MockOutcome)>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockRecognizer {
    /// Every attempt returns `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            default: MockOutcome::Text(text.into()),
            by_language: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Attempts for `language` return `text` instead of the default.
    pub fn with_text(mut self, language: Option<&str>, text: impl Into<String>) -> Self {
        self.by_language
            .push((language.map(str::to_string), MockOutcome::Text(text.into())));
        self
    }

    /// Attempts for `language` fail with an engine error.
    pub fn with_failure(mut self, language: Option<&str>, message: impl Into<String>) -> Self {
        self.by_language
            .push((language.map(str::to_string), MockOutcome::Fail(message.into())));
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn outcome_for(&self, language: Option<&str>) -> &MockOutcome {
        self.by_language
            .iter()
            .find(|(lang, _)| lang.as_deref() == language)
            .map(|(_, outcome)| outcome)
            .unwrap_or(&self.default)
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(
        &self,
        image_path: &Path,
        language: Option<&str>,
        page_seg_mode: u8,
    ) -> Result<String, OcrError> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(MockCall {
            image_path: image_path.to_path_buf(),
            language: language.map(str::to_string),
            page_seg_mode,
            file_existed: image_path.exists(),
            image_size: image::image_dimensions(image_path).ok(),
        });
        match self.outcome_for(language) {
            MockOutcome::Text(text) => Ok(text.clone()),
            MockOutcome::Fail(message) => Err(OcrError::Engine(message.clone())),
        }
    }
}

// ── In-process Tesseract backend (optional, gated behind `tesseract` feature) ─

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use std::path::Path;

    use super::{OcrBackend, OcrError};
    use leptess::{LepTess, Variable};

    /// libtesseract has no "unspecified" language at init time; this is what
    /// the engine itself falls back to.
    const ENGINE_DEFAULT_LANGUAGE: &str = "eng";

    pub struct TesseractRecognizer {
        data_path: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(
            &self,
            image_path: &Path,
            language: Option<&str>,
            page_seg_mode: u8,
        ) -> Result<String, OcrError> {
            let lang = language.unwrap_or(ENGINE_DEFAULT_LANGUAGE);
            let mut lt = LepTess::new(self.data_path.as_deref(), lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &page_seg_mode.to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image(image_path)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LanguageAttempt, RecognizerConfig};
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    fn binary_image() -> DynamicImage {
        let img: GrayImage =
            ImageBuffer::from_fn(40, 20, |x, _| Luma([if x % 4 == 0 { 0 } else { 255 }]));
        DynamicImage::ImageLuma8(img)
    }

    fn recognizer(mock: MockRecognizer) -> TextRecognizer<MockRecognizer> {
        TextRecognizer::new(mock, RecognizerConfig::default())
    }

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("SHOP\n1,028.20");
        let text = r.recognize(Path::new("/nonexistent.jpg"), Some("eng"), 6).unwrap();
        assert_eq!(text, "SHOP\n1,028.20");
    }

    #[test]
    fn first_attempt_wins() {
        let rec = recognizer(MockRecognizer::new("TOTAL 28.50"));
        assert_eq!(rec.recognize(&binary_image()), "TOTAL 28.50");
        let calls = rec.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].language.as_deref(), Some("tha+eng"));
        assert_eq!(calls[0].page_seg_mode, 6);
    }

    #[test]
    fn failed_primary_falls_back_to_later_attempt() {
        let mock = MockRecognizer::new("")
            .with_failure(Some("tha+eng"), "Failed loading language 'tha'")
            .with_text(Some("deu"), "Summe 12,80\n");
        let rec = recognizer(mock);
        assert_eq!(rec.recognize(&binary_image()), "Summe 12,80\n");
        let langs: Vec<Option<String>> =
            rec.backend().calls().into_iter().map(|c| c.language).collect();
        assert_eq!(
            langs,
            [Some("tha+eng".to_string()), Some("eng".to_string()), Some("deu".to_string())]
        );
    }

    #[test]
    fn whitespace_only_output_counts_as_empty() {
        let mock = MockRecognizer::new("  \n\t ").with_text(None, "last resort");
        let rec = recognizer(mock);
        assert_eq!(rec.recognize(&binary_image()), "last resort");
        assert_eq!(rec.backend().calls().len(), 4);
    }

    #[test]
    fn all_attempts_failing_yields_empty_string() {
        let mock = MockRecognizer::new("")
            .with_failure(Some("tha+eng"), "boom")
            .with_failure(Some("eng"), "boom")
            .with_failure(Some("deu"), "boom")
            .with_failure(None, "boom");
        let rec = recognizer(mock);
        assert_eq!(rec.recognize(&binary_image()), "");
        assert_eq!(rec.backend().calls().len(), 4);
    }

    #[test]
    fn temp_file_exists_during_call_and_is_removed_after() {
        let rec = recognizer(MockRecognizer::new("text"));
        rec.recognize(&binary_image());
        let calls = rec.backend().calls();
        let call = &calls[0];
        assert!(call.file_existed);
        assert_eq!(call.image_path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(!call.image_path.exists());
    }

    #[test]
    fn temp_file_removed_when_every_attempt_fails() {
        let rec = recognizer(MockRecognizer::new("").with_failure(Some("tha+eng"), "boom"));
        assert_eq!(rec.recognize(&binary_image()), "");
        for call in rec.backend().calls() {
            assert!(!call.image_path.exists());
        }
    }

    #[test]
    fn staged_image_is_three_channel_jpeg() {
        struct Inspect;
        impl OcrBackend for Inspect {
            fn recognize(&self, path: &Path, _: Option<&str>, _: u8) -> Result<String, OcrError> {
                let format = image::ImageFormat::from_path(path).map_err(|e| OcrError::Engine(e.to_string()))?;
                let img = image::open(path).map_err(|e| OcrError::Engine(e.to_string()))?;
                Ok(format!("{format:?} {:?} {}x{}", img.color(), img.width(), img.height()))
            }
        }
        let rec = TextRecognizer::new(Inspect, RecognizerConfig::default());
        assert_eq!(rec.recognize(&binary_image()), "Jpeg Rgb8 40x20");
    }

    #[test]
    fn sixteen_bit_input_is_coerced() {
        let img = DynamicImage::ImageRgb16(ImageBuffer::from_pixel(8, 8, Rgb([65535u16, 0, 0])));
        let rec = recognizer(MockRecognizer::new("ok"));
        assert_eq!(rec.recognize(&img), "ok");
        let color: RgbImage = img.to_rgb8();
        assert_eq!(color.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn empty_image_skips_backend() {
        let rec = recognizer(MockRecognizer::new("never"));
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert_eq!(rec.recognize(&empty), "");
        assert!(rec.backend().calls().is_empty());
    }

    #[test]
    fn custom_attempt_list_is_respected() {
        let config = RecognizerConfig {
            attempts: vec![LanguageAttempt::new("English", Some("eng"))],
            page_seg_mode: 4,
            ..RecognizerConfig::default()
        };
        let rec = TextRecognizer::new(MockRecognizer::new(""), config);
        assert_eq!(rec.recognize(&binary_image()), "");
        let calls = rec.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].page_seg_mode, 4);
    }

    #[test]
    fn cli_command_line_layout() {
        let cli = TesseractCli::new("/usr/bin/tesseract", Some(PathBuf::from("/share/tessdata")));
        let cmd = cli.build_command(Path::new("/tmp/r.jpg"), Some("tha+eng"), 6);
        assert_eq!(cmd.get_program(), "/usr/bin/tesseract");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["/tmp/r.jpg", "stdout", "-l", "tha+eng", "--psm", "6", "--tessdata-dir", "/share/tessdata"]
        );
    }

    #[test]
    fn cli_default_language_omits_flag() {
        let cli = TesseractCli::new("tesseract", None);
        let cmd = cli.build_command(Path::new("r.jpg"), None, 6);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["r.jpg", "stdout", "--psm", "6"]);
    }

    #[test]
    fn missing_executable_is_not_available() {
        let cli = TesseractCli::new("/definitely/not/here/tesseract", None);
        let err = cli.recognize(Path::new("r.jpg"), Some("eng"), 6).unwrap_err();
        assert!(matches!(err, OcrError::NotAvailable(_)));
    }

    #[test]
    fn missing_executable_degrades_to_empty_text() {
        let cli = TesseractCli::new("/definitely/not/here/tesseract", None);
        let rec = TextRecognizer::new(cli, RecognizerConfig::default());
        assert_eq!(rec.recognize(&binary_image()), "");
    }
}
