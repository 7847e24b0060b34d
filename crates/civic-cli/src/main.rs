mod display;
mod pipeline;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use civic_ai::{DocumentParams, OpenAiClient, Resilient};
use civic_core::{ApiKey, BridgeConfig, FeedbackKind, ReadingLevel, SentimentLabel};
use civic_store::{ExportFormat, FeedbackFilter, FeedbackStore};
use tracing::info;

use crate::pipeline::Submission;

/// Civic Bridge: simplify policy documents and collect citizen feedback.
#[derive(Parser, Debug)]
#[command(name = "civic", version, about, long_about = None)]
struct Cli {
    /// Feedback log file.
    #[arg(long, global = true, env = "CIVIC_STORE", default_value = "civic-feedback.jsonl")]
    store: PathBuf,

    /// JSON configuration file.
    #[arg(long, global = true, env = "CIVIC_CONFIG")]
    config: Option<PathBuf>,

    /// API key for the analysis service.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model name.
    #[arg(long, global = true, env = "CIVIC_MODEL")]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, global = true, env = "CIVIC_API_BASE")]
    base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simplify a policy document and summarise its impact per group.
    Analyze {
        file: PathBuf,
        /// middle_school, high_school, college or professional.
        #[arg(long)]
        reading_level: Option<ReadingLevel>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Analyse and record one piece of feedback.
    Submit {
        /// Policy document id (as printed by `analyze`).
        #[arg(long)]
        document: String,
        #[arg(long)]
        text: String,
        /// Demographic attribute, repeatable.
        #[arg(long = "demographic", value_name = "KEY=VALUE")]
        demographics: Vec<String>,
        /// Submitter name; omitted means anonymous.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        kind: Option<FeedbackKind>,
    },
    /// Print matching entries.
    List {
        #[command(flatten)]
        filter: FilterArgs,
        /// Only the last N matching entries.
        #[arg(long, value_name = "N")]
        recent: Option<usize>,
    },
    /// Print the aggregate report and recommendations.
    Report {
        #[command(flatten)]
        filter: FilterArgs,
        /// Demographic attribute to break down by.
        #[arg(long)]
        by: Option<String>,
    },
    /// Export matching entries.
    Export {
        /// csv, json, parquet or report.
        #[arg(long)]
        format: ExportFormat,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only this policy document.
    #[arg(long)]
    document: Option<String>,
    /// Demographic criterion, repeatable; all must match.
    #[arg(long = "demographic", value_name = "KEY=VALUE")]
    demographics: Vec<String>,
    #[arg(long)]
    sentiment: Option<SentimentLabel>,
    #[arg(long)]
    kind: Option<FeedbackKind>,
}

impl FilterArgs {
    fn to_filter(&self) -> anyhow::Result<FeedbackFilter> {
        let mut filter = FeedbackFilter::all();
        if let Some(doc) = &self.document {
            filter = filter.document(doc);
        }
        for raw in &self.demographics {
            let (key, value) = FeedbackFilter::parse_demographic(raw)?;
            filter = filter.demographic(key, value);
        }
        if let Some(label) = self.sentiment {
            filter = filter.sentiment(label);
        }
        if let Some(kind) = self.kind {
            filter = filter.kind(kind);
        }
        filter.validate()?;
        Ok(filter)
    }
}

/// File config, then command-line and environment overrides.
fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(key) = &cli.api_key {
        config.api_key = ApiKey::new(key.clone());
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout_secs = secs;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_store(path: &Path, config: &BridgeConfig) -> anyhow::Result<FeedbackStore> {
    let store = FeedbackStore::open(path)
        .with_context(|| format!("opening feedback store {}", path.display()))?
        .with_taxonomy(config.taxonomy.clone())
        .with_top_tags(config.top_tags);
    Ok(store)
}

fn analysis_client(config: &BridgeConfig) -> anyhow::Result<Resilient<OpenAiClient>> {
    OpenAiClient::resilient(config).context("analysis unavailable")
}

fn write_output(out: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), bytes = bytes.len(), "export written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Analyze {
            file,
            reading_level,
            language,
        } => {
            let language = language.clone().unwrap_or_else(|| config.language.clone());
            if !config.taxonomy.supports_language(&language) {
                bail!(
                    "language {language:?} is not one of: {}",
                    config.taxonomy.languages.join(", ")
                );
            }
            let params = DocumentParams {
                reading_level: reading_level.unwrap_or(config.reading_level),
                language,
            };
            let client = analysis_client(&config)?;
            let report =
                pipeline::analyze_file(&client, file, &params, config.max_file_bytes()).await?;
            display::write_document(&mut std::io::stdout().lock(), &report)?;
        }
        Command::Submit {
            document,
            text,
            demographics,
            name,
            kind,
        } => {
            let demographics = demographics
                .iter()
                .map(String::as_str)
                .map(FeedbackFilter::parse_demographic)
                .collect::<Result<Vec<_>, _>>()?;
            let store = open_store(&cli.store, &config)?;
            let client = analysis_client(&config)?;
            let submission = Submission {
                document_id: document.clone(),
                text: text.clone(),
                demographics,
                submitter: name.clone(),
                kind: *kind,
            };
            let entry = pipeline::submit_feedback(&store, &client, submission).await?;
            display::write_entry_card(&mut std::io::stdout().lock(), &entry)?;
        }
        Command::List { filter, recent } => {
            let store = open_store(&cli.store, &config)?;
            let listing = store.list(&filter.to_filter()?)?;
            let mut stdout = std::io::stdout().lock();
            match recent {
                Some(n) => {
                    let entries: Vec<_> = listing.iter().collect();
                    let tail = display::recent(&entries, *n).iter().copied();
                    display::write_entries(&mut stdout, tail)?;
                }
                None => display::write_entries(&mut stdout, &listing)?,
            }
        }
        Command::Report { filter, by } => {
            let store = open_store(&cli.store, &config)?;
            let report = store.aggregate(&filter.to_filter()?)?;
            let by = by.clone().or_else(|| store.focus_attribute(&report));
            let recommendations = store.recommendations(&report, by.as_deref());
            display::write_report(
                &mut std::io::stdout().lock(),
                &report,
                by.as_deref(),
                &recommendations,
            )?;
        }
        Command::Export {
            format,
            out,
            filter,
        } => {
            let store = open_store(&cli.store, &config)?;
            let bytes = store.export(&filter.to_filter()?, *format)?;
            write_output(out.as_deref(), &bytes)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
