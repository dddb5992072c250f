//! Human-readable output. None of this is a stable format.
//!
//! "Found numbers" lists runs that start with a digit; whitespace never joins
//! two runs, so `1 200.00` shows up as two numbers.

use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;
use receipt_scan_ocr::{Extractor, OcrResult};

const RAW_PREVIEW_CHARS: usize = 500;
const MAX_NUMBERS: usize = 10;
const LINE_PREVIEW_CHARS: usize = 80;

fn re_number_run() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\d[\d,.]*").expect("invalid regex"))
}

fn re_date_like() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\d{2}[:/ -]\d{2}").expect("invalid regex"))
}

pub fn scan_report(result: &OcrResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===== OCR TEXT =====");
    let _ = writeln!(out, "{}", result.ocr_text);
    let _ = writeln!(out, "\n===== EXTRACTED DATA =====");
    let _ = writeln!(out, "{}", result.extracted);
    out
}

pub fn inspection_report(result: &OcrResult) -> String {
    let text = result.ocr_text.as_str();
    let mut out = String::new();

    let preview: String = text.chars().take(RAW_PREVIEW_CHARS).collect();
    let _ = writeln!(out, "===== RAW OCR TEXT =====");
    let _ = writeln!(out, "{preview:?}");

    let numbers: Vec<&str> = re_number_run()
        .find_iter(text)
        .take(MAX_NUMBERS)
        .map(|m| m.as_str())
        .collect();
    let _ = writeln!(out, "\n===== LOOKING FOR NUMBERS =====");
    let _ = writeln!(out, "Found numbers: {numbers:?}");

    let _ = writeln!(out, "\n===== LINES WITH NUMBERS =====");
    for (i, line) in text.lines().enumerate() {
        if line.chars().any(|c| c.is_ascii_digit()) {
            let short: String = line.chars().take(LINE_PREVIEW_CHARS).collect();
            let _ = writeln!(out, "Line {i}: {short}");
        }
    }

    let _ = writeln!(out, "\n===== DATE / TIME SHAPES =====");
    for (i, line) in text.lines().enumerate() {
        if re_date_like().is_match(line) {
            let _ = writeln!(out, "Line {i}: {line:?}");
        }
    }

    let _ = writeln!(out, "\n===== LINES WITH SLASHES =====");
    for (i, line) in text.lines().enumerate().filter(|(_, l)| l.contains('/')) {
        let _ = writeln!(out, "Line {i}: {line}");
    }

    let _ = writeln!(out, "\n===== AMOUNT CANDIDATES =====");
    for c in Extractor::amount_candidates(text) {
        let _ = writeln!(out, "{:>16} -> {}", c.raw, c.value);
    }

    let _ = writeln!(out, "\n===== EXTRACTED DATA =====");
    let _ = writeln!(out, "{}", result.extracted);
    out
}
