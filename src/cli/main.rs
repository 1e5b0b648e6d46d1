use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use leafcheck::codec;
use leafcheck::config::{BackendMode, Config};
use leafcheck::pipeline::AnalysisClient;

#[derive(Parser, Debug)]
#[command(
    name = "leafcheck",
    version,
    about = "Leaf disease identifier — send a leaf photo to an AI model and print the diagnosis"
)]
struct Cli {
    /// Leaf image to analyze (JPEG or PNG)
    #[arg(value_name = "IMAGE", required_unless_present = "init")]
    image: Option<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Analysis backend to use (overrides backend.mode)
    #[arg(long, value_name = "proxy|direct")]
    mode: Option<BackendMode>,

    /// Output the result as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let Some(image_path) = cli.image else {
        anyhow::bail!("No image specified. Use --help for usage.");
    };

    // Load config
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.backend.mode = mode;
    }

    let bytes = std::fs::read(&image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let image = codec::decode_upload(&bytes)
        .with_context(|| format!("Cannot use {}", image_path.display()))?;

    let client = AnalysisClient::from_config(&config)?;
    let result = client.analyze(&image).await;

    if cli.json {
        let output = match &result {
            Ok(diagnosis) => serde_json::json!({
                "path": image_path.display().to_string(),
                "backend": diagnosis.backend,
                "analysis": diagnosis.text,
                "error": null,
                "error_kind": null,
            }),
            Err(e) => serde_json::json!({
                "path": image_path.display().to_string(),
                "backend": client.backend_name(),
                "analysis": null,
                "error": e.to_string(),
                "error_kind": e.kind(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    match result {
        Ok(diagnosis) => {
            if !cli.json {
                print_diagnosis(&diagnosis.text);
            }
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to analyze the image. Please try again.")),
    }
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width of a wrapped diagnosis line.
const TEXT_WIDTH: usize = 78;

fn print_diagnosis(text: &str) {
    println!();
    println!("{GREEN}Analysis Complete!{RESET}");
    println!("{BOLD}Leaf Disease Analysis{RESET}");
    println!("{DIM}{}{RESET}", "─".repeat(TEXT_WIDTH));
    for line in text.lines() {
        for wrapped in wrap_text(line, TEXT_WIDTH) {
            println!("{wrapped}");
        }
    }
    println!("{DIM}{}{RESET}", "─".repeat(TEXT_WIDTH));
}

/// Wrap one line at word boundaries, keeping its leading indent on every piece.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let indent: String = s.chars().take_while(|c| c.is_whitespace()).collect();
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = format!("{indent}{word}");
        } else if current_line.chars().count() + 1 + word.chars().count() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = format!("{indent}{word}");
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}
