use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use receipt_scan_ocr::{OcrBackend, ReceiptPipeline, RecognizerConfig, TesseractCli};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod report;

/// Pull the date and total out of a photographed receipt
#[derive(Parser, Debug)]
#[command(name = "receipt-scan", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// TOML file with the Tesseract location and language attempts
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tesseract executable (overrides config and TESSERACT_CMD)
    #[arg(long, global = true)]
    tesseract: Option<PathBuf>,

    /// Directory holding *.traineddata (overrides config and TESSDATA_PREFIX)
    #[arg(long, global = true)]
    tessdata_dir: Option<PathBuf>,

    /// Run libtesseract in-process instead of the tesseract executable
    #[cfg(feature = "tesseract")]
    #[arg(long, global = true)]
    in_process: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the OCR text and the extracted date and total
    Scan {
        image: PathBuf,
        /// Emit a single JSON object instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Dump what OCR saw: numbers, date-like lines and amount candidates
    Inspect { image: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(&args)?;
    debug!(?config, "recognizer configuration");

    #[cfg(feature = "tesseract")]
    if args.in_process {
        use receipt_scan_ocr::recognizer::tesseract_backend::TesseractRecognizer;
        let data_path = config
            .tessdata_dir
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned());
        return run(ReceiptPipeline::new(TesseractRecognizer::new(data_path), config), args.command);
    }

    let backend = TesseractCli::from_config(&config);
    run(ReceiptPipeline::new(backend, config), args.command)
}

fn run<B: OcrBackend>(pipeline: ReceiptPipeline<B>, command: Command) -> Result<()> {
    match command {
        Command::Scan { image, json } => {
            let result = pipeline
                .process_file(&image)
                .with_context(|| format!("Failed to scan {}", image.display()))?;
            if json {
                let out = serde_json::json!({
                    "date": result.extracted.date,
                    "total": result.extracted.total,
                    "ocr_text": result.ocr_text,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", report::scan_report(&result));
            }
        }
        Command::Inspect { image } => {
            let result = pipeline
                .process_file(&image)
                .with_context(|| format!("Failed to inspect {}", image.display()))?;
            print!("{}", report::inspection_report(&result));
        }
    }
    Ok(())
}

/// Config file (or defaults), then environment, then command-line flags.
fn load_config(args: &Args) -> Result<RecognizerConfig> {
    let mut config = match &args.config {
        Some(path) => RecognizerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?
            .with_env_overrides(),
        None => RecognizerConfig::from_env(),
    };
    if let Some(cmd) = &args.tesseract {
        config.tesseract_cmd = cmd.clone();
    }
    if let Some(dir) = &args.tessdata_dir {
        config.tessdata_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
