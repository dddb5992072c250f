pub mod config;
pub mod extract;
pub mod filters;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use config::{ConfigError, LanguageAttempt, RecognizerConfig};
pub use extract::Extractor;
pub use pipeline::{OcrResult, PipelineError, ReceiptPipeline};
pub use preprocess::{load_image, normalize, prepare_for_ocr, PreprocessError};
pub use recognizer::{MockCall, MockRecognizer, OcrBackend, OcrError, TesseractCli, TextRecognizer};
pub use types::{AmountCandidate, ExtractionResult};
