//! `recmem`: batch recommendation runs with semantic memory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;

use recommendation_memory::config::{AppConfig, ConfigArgs};
use recommendation_memory::embedding::{self, DisabledEmbedder, Embedder};
use recommendation_memory::engine::{BatchOrchestrator, SubjectPipeline};
use recommendation_memory::generator::ChatGenerator;
use recommendation_memory::persistence;
use recommendation_memory::retry::RetryPolicy;
use recommendation_memory::source::{DataSource, JsonFileSource};
use recommendation_memory::telemetry;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate, deduplicate and store recommendations for every subject
    Run {
        /// Reference date (defaults to now)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// JSON file with subjects and their target pools
        #[arg(long, env = "SUBJECTS_FILE")]
        subjects: Option<PathBuf>,
    },
    /// Delete every remembered recommendation of some subjects
    Reset {
        /// Subject id (repeatable)
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Reset every subject listed in this subjects file
        #[arg(long)]
        all_from: Option<PathBuf>,
    },
    /// Print remembered recommendations, newest first
    History {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    let config = AppConfig::load(&cli.config).context("Invalid configuration")?;
    let store = persistence::connect(&config.persistence).await?;

    match cli.command {
        Command::Run { as_of, subjects } => {
            let path = subjects
                .or_else(|| config.source.subjects_file.clone().map(PathBuf::from))
                .context("No subjects file given (--subjects or source.subjects_file)")?;
            let now = match as_of {
                Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
                None => Utc::now(),
            };

            let embedder: Arc<dyn Embedder> = if config.memory.enabled {
                embedding::from_config(&config.embedding).await?
            } else {
                Arc::new(DisabledEmbedder)
            };
            let generator = Arc::new(ChatGenerator::new(&config.generator)?);
            let retry = RetryPolicy::from(&config.retry);

            let pipeline = Arc::new(SubjectPipeline::new(
                store,
                embedder,
                generator,
                config.memory.clone(),
                retry,
            ));
            let orchestrator = BatchOrchestrator::new(pipeline, config.batch.clone());

            let subjects = JsonFileSource::new(path)
                .fetch_subjects(now.date_naive())
                .await?;
            info!(subjects = subjects.len(), as_of = %now.date_naive(), "Starting batch");

            let report = orchestrator.run(subjects, now).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Reset { subjects, all_from } => {
            let mut ids = subjects;
            if let Some(path) = all_from {
                let listed = JsonFileSource::new(path)
                    .fetch_subjects(Utc::now().date_naive())
                    .await?;
                ids.extend(listed.into_iter().map(|s| s.subject_id));
            }
            if ids.is_empty() {
                bail!("Nothing to reset: pass --subject or --all-from");
            }

            let mut total = 0;
            for id in &ids {
                let deleted = store.delete_all(id).await?;
                info!(subject_id = %id, deleted, "Memory reset");
                total += deleted;
            }
            println!(
                "{}",
                serde_json::json!({ "subjects": ids.len(), "deleted": total })
            );
        }
        Command::History {
            subject,
            target,
            limit,
        } => {
            let records = store.history(&subject, target.as_deref(), limit).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
