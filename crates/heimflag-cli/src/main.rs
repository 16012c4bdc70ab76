//! CLI for heimflag.
//!
//! Loads a context-options JSON document (attributes, features, forced
//! variations, ...) and prints one JSON record per evaluation on stdout.
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG=debug` to see
//! why a subject was excluded from an experiment.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use heimflag_core::{
    Attributes, ConfigWarning, Experiment, ExperimentResult, FeatureResult, WarningSink,
};
use heimflag_eval::{ContextBuilder, TracingWarnings};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve features for the context described by a config file
    Eval {
        /// Context options (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Feature key to evaluate; repeatable. Default: every feature
        #[arg(long = "feature")]
        features: Vec<String>,

        /// JSON object merged over the configured attributes
        #[arg(long)]
        attributes: Option<String>,

        /// Current URL, for query-string overrides
        #[arg(long)]
        url: Option<String>,
    },
    /// Run one experiment definition against the context
    Run {
        /// Context options (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Experiment definition (JSON)
        #[arg(long)]
        experiment: PathBuf,

        /// JSON object merged over the configured attributes
        #[arg(long)]
        attributes: Option<String>,
    },
    /// Validate a config file and list its warnings
    Check {
        /// Context options (JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Serialize, Debug)]
struct FeatureRecord<'a> {
    #[serde(with = "time::serde::rfc3339")]
    ts: OffsetDateTime,
    feature: &'a str,
    #[serde(flatten)]
    result: FeatureResult,
}

#[derive(Serialize, Debug)]
struct RunRecord<'a> {
    #[serde(with = "time::serde::rfc3339")]
    ts: OffsetDateTime,
    experiment: &'a str,
    result: ExperimentResult,
}

#[derive(Serialize, Debug)]
struct CheckReport {
    features: usize,
    warnings: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_attributes(json: &str) -> Result<Attributes> {
    serde_json::from_str(json).context("--attributes must be a JSON object")
}

fn load_context(
    config: &Path,
    attributes: Option<&str>,
    warnings: &mut dyn WarningSink,
) -> Result<ContextBuilder> {
    let json = read_json_file(config)?;
    let mut builder = ContextBuilder::from_json(&json, warnings)
        .with_context(|| format!("Invalid config {}", config.display()))?;
    if let Some(attributes) = attributes {
        for (key, value) in parse_attributes(attributes)? {
            builder = builder.attribute(key, value);
        }
    }
    Ok(builder)
}

fn log_enrollment(experiment: &Experiment, result: &ExperimentResult) {
    tracing::info!(
        experiment = %experiment.key,
        variation = %result.key,
        "enrolled"
    );
}

fn eval(
    config: &Path,
    features: Vec<String>,
    attributes: Option<&str>,
    url: Option<String>,
) -> Result<()> {
    let mut builder = load_context(config, attributes, &mut TracingWarnings)?
        .tracking_callback(log_enrollment);
    if let Some(url) = url {
        builder = builder.url(url);
    }
    let ctx = builder.build();

    let keys = if features.is_empty() {
        let mut keys: Vec<String> = ctx.features().keys().cloned().collect();
        keys.sort();
        keys
    } else {
        features
    };

    for key in &keys {
        let record = FeatureRecord {
            ts: OffsetDateTime::now_utc(),
            feature: key,
            result: ctx.eval_feature(key),
        };
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn run(config: &Path, experiment: &Path, attributes: Option<&str>) -> Result<()> {
    let ctx = load_context(config, attributes, &mut TracingWarnings)?
        .tracking_callback(log_enrollment)
        .build();
    let experiment: Experiment = serde_json::from_str(&read_json_file(experiment)?)
        .with_context(|| format!("Invalid experiment {}", experiment.display()))?;

    let record = RunRecord {
        ts: OffsetDateTime::now_utc(),
        experiment: &experiment.key,
        result: ctx.run(&experiment),
    };
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

fn check(config: &Path) -> Result<CheckReport> {
    let mut warnings: Vec<ConfigWarning> = Vec::new();
    let json = read_json_file(config)?;
    let ctx = ContextBuilder::from_json(&json, &mut warnings)
        .with_context(|| format!("Invalid config {}", config.display()))?
        .build();

    Ok(CheckReport {
        features: ctx.features().len(),
        warnings: warnings.iter().map(ToString::to_string).collect(),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Eval {
            config,
            features,
            attributes,
            url,
        } => eval(&config, features, attributes.as_deref(), url)?,
        Commands::Run {
            config,
            experiment,
            attributes,
        } => run(&config, &experiment, attributes.as_deref())?,
        Commands::Check { config } => {
            let report = check(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
