//! doc-import: bulk-load a JSON array into a document-store collection.

use anyhow::{Context, Result};
use clap::Parser;
use doc_import::{
    FirestoreStore, ImportConfig, ImportReport, Importer, InMemoryStore, LogFormat,
    ServiceAccountKey,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "doc-import")]
#[command(about = "Import a JSON array into a Firestore collection")]
#[command(
    after_help = "Exit status is 0 only when every document was imported; any error or failed commit exits with 1."
)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service account key file
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// JSON file holding the records
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Target collection
    #[arg(long)]
    collection: Option<String>,

    /// Top-level JSON key holding the record array (defaults to the collection name)
    #[arg(long)]
    root_key: Option<String>,

    /// Record field used as the document id
    #[arg(long)]
    id_field: Option<String>,

    /// Maximum writes per commit
    #[arg(long)]
    batch_limit: Option<usize>,

    /// Commits allowed in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Project id (overrides the key file)
    #[arg(long)]
    project: Option<String>,

    /// Stage and commit against an in-memory store; nothing is sent
    #[arg(long)]
    dry_run: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn resolve_config(&self) -> Result<ImportConfig> {
        let mut config = match &self.config {
            Some(path) => ImportConfig::load(path)?,
            None => ImportConfig::default(),
        };

        if let Some(path) = &self.credentials {
            config.credentials_path = path.clone();
        }
        if let Some(path) = &self.data {
            config.data_path = path.clone();
        }
        if let Some(collection) = &self.collection {
            config.collection = collection.clone();
        }
        if let Some(key) = &self.root_key {
            config.root_key = Some(key.clone());
        }
        if let Some(field) = &self.id_field {
            config.id_field = field.clone();
        }
        if let Some(limit) = self.batch_limit {
            config.batch_limit = limit;
        }
        if let Some(n) = self.concurrency {
            config.max_concurrent_commits = n;
        }
        if let Some(project) = &self.project {
            config.project_id = Some(project.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(config: &ImportConfig, verbose: u8) -> Result<()> {
    let log_level = match verbose {
        0 => config.logging.level.as_tracing(),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false);
    match config.logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

async fn run(config: &ImportConfig) -> Result<ImportReport> {
    if config.dry_run {
        info!("Dry run: writes go to an in-memory store");
        let store = InMemoryStore::new();
        let report = Importer::new(config, &store).run().await?;
        info!(
            staged = report.total,
            generated_ids = report.generated_ids,
            stored = store.count(&config.collection),
            "Dry run finished; nothing was sent"
        );
        return Ok(report);
    }

    let key = ServiceAccountKey::from_file(&config.credentials_path)?;
    let store = FirestoreStore::connect(&key, config.firestore_options())
        .await
        .context("failed to initialize the document store client")?;
    let report = Importer::new(config, &store).run().await?;
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = cli.resolve_config();
    let logging_base = config.as_ref().cloned().unwrap_or_default();
    if let Err(e) = init_logging(&logging_base, cli.verbose) {
        eprintln!("failed to initialize logging: {e}");
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("An error occurred during the import process: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config).await {
        Ok(report) if report.is_complete() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("An error occurred during the import process: {e:#}");
            ExitCode::FAILURE
        }
    }
}
