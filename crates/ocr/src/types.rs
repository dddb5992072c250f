use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fields pulled out of a receipt's OCR text.
///
/// Both values are the substrings exactly as they appeared in the text; no
/// date parsing or currency normalization is applied to what is returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionResult {
    /// First date-shaped match, or `"Time: HH:MM"` when only a time was found.
    pub date: Option<String>,
    /// The numerically largest amount, in its original textual form.
    pub total: Option<String>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.total.is_none()
    }
}

impl std::fmt::Display for ExtractionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        write!(f, "date: {}, total: {}", show(&self.date), show(&self.total))
    }
}

/// A numeric-shaped substring together with the value it was read as.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmountCandidate {
    pub raw: String,
    pub value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_result_is_empty() {
        assert!(ExtractionResult::default().is_empty());
        let r = ExtractionResult { date: None, total: Some("28.50".into()) };
        assert!(!r.is_empty());
    }

    #[test]
    fn display_marks_absent_fields() {
        let r = ExtractionResult { date: Some("12/05/2024".into()), total: None };
        assert_eq!(r.to_string(), "date: 12/05/2024, total: -");
    }

    #[test]
    fn serializes_absent_fields_as_null() {
        let r = ExtractionResult { date: None, total: Some("1,028.20".into()) };
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"date":null,"total":"1,028.20"}"#);
    }
}
