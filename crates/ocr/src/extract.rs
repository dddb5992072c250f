use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::types::{AmountCandidate, ExtractionResult};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_date_slash_long, r"(?i)(\d{2})/(\d{2})/(\d{4})");
re!(re_date_dash_short, r"(?i)(\d{2})-(\d{2})-(\d{2})");
re!(re_date_slash_short, r"(?i)(\d{2})/(\d{2})/(\d{2})");
re!(re_date_month_word, r"(?i)(\d{1,2})\s+[a-z]+\s+(\d{4})");
re!(re_time, r"(\d{2}):(\d{2})");

// Plain decimals ("28.50") and thousands-grouped amounts ("1.100.00", "1,028.20").
re!(re_amount, r"\d+[.,]\d{2,3}(?:[.,]\d{2})?");

/// Date patterns in priority order. An earlier pattern wins even when a later
/// one matches closer to the start of the text.
fn date_patterns() -> [&'static Regex; 4] {
    [
        re_date_slash_long(),
        re_date_dash_short(),
        re_date_slash_short(),
        re_date_month_word(),
    ]
}

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Extract the date and total from raw OCR text.
    pub fn extract(ocr_text: &str) -> ExtractionResult {
        ExtractionResult {
            date: Self::extract_date(ocr_text),
            total: Self::extract_total(ocr_text),
        }
    }

    // ── Date ─────────────────────────────────────────────────────────────────

    pub fn extract_date(text: &str) -> Option<String> {
        if let Some(m) = date_patterns().iter().find_map(|re| re.find(text)) {
            return Some(m.as_str().to_string());
        }
        // Degraded result: at least report when the receipt was printed.
        re_time()
            .find(text)
            .map(|m| format!("Time: {}", m.as_str()))
    }

    // ── Total ─────────────────────────────────────────────────────────────────

    /// The grand total is assumed to be the largest amount on the receipt.
    pub fn extract_total(text: &str) -> Option<String> {
        Self::amount_candidates(text)
            .into_iter()
            .max_by(compare_candidates)
            .map(|c| c.raw)
    }

    /// Every numeric-shaped substring that normalizes to a valid amount,
    /// in order of appearance.
    pub fn amount_candidates(text: &str) -> Vec<AmountCandidate> {
        re_amount()
            .find_iter(text)
            .filter_map(|m| {
                let raw = m.as_str();
                parse_amount_str(raw).map(|value| AmountCandidate { raw: raw.to_string(), value })
            })
            .collect()
    }
}

fn compare_candidates(a: &AmountCandidate, b: &AmountCandidate) -> Ordering {
    a.value.cmp(&b.value).then_with(|| a.raw.cmp(&b.raw))
}

// ── Amount parsing ────────────────────────────────────────────────────────────

/// Normalize an OCR'd amount whose separators may be either `.` or `,`.
///
/// With two separators the last one is the decimal point and the first is a
/// thousands separator (`1.100.00` → 1100.00, `1,028.20` → 1028.20). With a
/// single separator it is the decimal point (`28,50` → 28.50).
///
/// Digits from other scripts (Thai `๑,๐๒๘.๒๐`) are read by value.
fn parse_amount_str(s: &str) -> Option<Decimal> {
    let folded: String = s
        .chars()
        .map(|c| match c {
            '.' | ',' => Some(c),
            _ => ascii_digit(c),
        })
        .collect::<Option<String>>()?;
    let parts: Vec<&str> = folded.split(['.', ',']).collect();
    let normalized = match parts.as_slice() {
        [int, frac] => format!("{int}.{frac}"),
        [head @ .., frac] if head.len() == 2 => format!("{}.{frac}", head.concat()),
        _ => return None,
    };
    Decimal::from_str(&normalized).ok()
}

/// Code points of the zero digit for each BMP block of decimal digits
/// (Unicode category Nd). Each block holds 0-9 contiguously.
const DIGIT_ZEROS: [u32; 36] = [
    0x0660, 0x06F0, 0x07C0, 0x0966, 0x09E6, 0x0A66, 0x0AE6, 0x0B66, 0x0BE6, 0x0C66, 0x0CE6,
    0x0D66, 0x0DE6, 0x0E50, 0x0ED0, 0x0F20, 0x1040, 0x1090, 0x17E0, 0x1810, 0x1946, 0x19D0,
    0x1A80, 0x1A90, 0x1B50, 0x1BB0, 0x1C40, 0x1C50, 0xA620, 0xA8D0, 0xA900, 0xA9D0, 0xA9F0,
    0xAA50, 0xABF0, 0xFF10,
];

/// Fold a decimal digit from any supported script to its ASCII form.
fn ascii_digit(c: char) -> Option<char> {
    if c.is_ascii_digit() {
        return Some(c);
    }
    let cp = c as u32;
    DIGIT_ZEROS
        .iter()
        .find(|&&zero| (zero..zero + 10).contains(&cp))
        .and_then(|&zero| char::from_digit(cp - zero, 10))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
