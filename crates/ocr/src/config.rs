use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tesseract's "assume a single uniform block of text" layout mode.
pub const PSM_SINGLE_BLOCK: u8 = 6;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One entry in the recognizer's ordered fallback list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageAttempt {
    /// Human-readable name used in log output.
    pub label: String,
    /// Tesseract language code (`tha+eng`, `eng`, …); `None` lets the engine
    /// pick its own default.
    pub language: Option<String>,
}

impl LanguageAttempt {
    pub fn new(label: impl Into<String>, language: Option<&str>) -> Self {
        Self { label: label.into(), language: language.map(str::to_string) }
    }
}

/// The fallback order used when no config overrides it.
///
/// German is not a supported receipt language. It was reached by accident on
/// installations that shipped `deu` traineddata and happened to read digits
/// well, so it stays as an explicit third attempt.
pub fn default_attempts() -> Vec<LanguageAttempt> {
    vec![
        LanguageAttempt::new("Thai+English", Some("tha+eng")),
        LanguageAttempt::new("English", Some("eng")),
        LanguageAttempt::new("German", Some("deu")),
        LanguageAttempt::new("engine default", None),
    ]
}

/// Everything the recognizer needs to know about the local OCR installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Path (or bare name resolved through `PATH`) of the `tesseract` executable.
    pub tesseract_cmd: PathBuf,
    /// Directory containing `*.traineddata`; the engine default when absent.
    pub tessdata_dir: Option<PathBuf>,
    pub page_seg_mode: u8,
    /// Quality of the temporary JPEG handed to the engine (1–100).
    pub jpeg_quality: u8,
    pub attempts: Vec<LanguageAttempt>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: PathBuf::from("tesseract"),
            tessdata_dir: None,
            page_seg_mode: PSM_SINGLE_BLOCK,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            attempts: default_attempts(),
        }
    }
}

impl RecognizerConfig {
    /// Defaults, overridden by `TESSERACT_CMD` and `TESSDATA_PREFIX` when set.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(cmd) = non_empty_env("TESSERACT_CMD") {
            self.tesseract_cmd = PathBuf::from(cmd);
        }
        if let Some(dir) = non_empty_env("TESSDATA_PREFIX") {
            self.tessdata_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts.is_empty() {
            return Err(ConfigError::Invalid("at least one language attempt is required".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.page_seg_mode > 13 {
            return Err(ConfigError::Invalid(format!(
                "page_seg_mode must be within 0..=13, got {}",
                self.page_seg_mode
            )));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
