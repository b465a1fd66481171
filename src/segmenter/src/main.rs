//! Segmenter: evaluates a JSON criteria document against subject data files.
//!
//! Prints one line per subject: the file name followed by `match` or
//! `no match`. Exits non-zero when the criteria or a subject cannot be read.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{info, warn};

use segmenter_core::{AppConfig, Subject};
use segmenter_segmentation::{Evaluator, SegmentationParser};

#[derive(Parser, Debug)]
#[command(name = "segmenter")]
#[command(about = "Evaluate audience segmentation criteria against subject data")]
#[command(version)]
struct Cli {
    /// JSON criteria document
    #[arg(long)]
    criteria: PathBuf,

    /// JSON subject file (repeatable)
    #[arg(long = "subject", required = true)]
    subjects: Vec<PathBuf>,

    /// Evaluation instant, RFC 3339 (defaults to now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Maximum criteria nesting depth (overrides config)
    #[arg(long, env = "SEGMENTER__PARSER__MAX_DEPTH")]
    max_depth: Option<usize>,

    /// TOML configuration file
    #[arg(long, env = "SEGMENTER_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    init_tracing(&config);

    if let Some(max_depth) = cli.max_depth {
        config.parser.max_depth = max_depth;
    }

    let parser = SegmentationParser::new(config.parser);
    let text = read(&cli.criteria)?;
    let criteria = parser
        .parse_criteria_str(&text)
        .with_context(|| format!("invalid criteria in {}", cli.criteria.display()))?;

    let now = cli.now.unwrap_or_else(Utc::now);
    info!(
        criteria = %cli.criteria.display(),
        subjects = cli.subjects.len(),
        now = %now,
        "evaluating criteria"
    );

    let mut matched = 0usize;
    for path in &cli.subjects {
        let subject: Subject = serde_json::from_str(&read(path)?)
            .with_context(|| format!("invalid subject in {}", path.display()))?;
        let is_match = Evaluator::at(&subject, now).evaluate(&criteria);
        if is_match {
            matched += 1;
        }
        println!(
            "{}\t{}",
            path.display(),
            if is_match { "match" } else { "no match" }
        );
    }

    if matched == 0 {
        warn!("no subject matched");
    }
    info!(matched, total = cli.subjects.len(), "evaluation complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log.filter.as_str().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
