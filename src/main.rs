use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use email_triage::config::TriageConfig;
use email_triage::llm::{LlmProvider, RetryProvider, create_provider};
use email_triage::pipeline::processor::failures_by_stage;
use email_triage::pipeline::{DrafterConfig, EmailPipeline, LlmClassifier, LlmDrafter};
use email_triage::store::{
    Category, CsvRecordStore, EmailRecord, RecordPatch, RecordStatus, RecordStore, StoreSummary,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "email-triage",
    version,
    about = "Classify business emails, draft replies, and track them for review"
)]
struct Cli {
    /// Record file (overrides EMAIL_TRIAGE_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify and draft a reply for one or more emails
    Process {
        /// Read the email from this file (repeatable); stdin when omitted
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
    },

    /// List processed emails
    List {
        /// Only records with this status (new, in_progress, done, on_hold)
        #[arg(long)]
        status: Option<String>,

        /// Only records with this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one record in full
    Show { id: Uuid },

    /// Edit a record's review fields
    Update {
        id: Uuid,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Replacement reply draft
        #[arg(long)]
        draft: Option<String>,
    },

    /// Delete a record
    Remove { id: Uuid },

    /// Counts per status and category
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TriageConfig::from_env()?;
    if let Some(path) = cli.store.clone() {
        config.store_path = path;
    }

    let store = CsvRecordStore::open(&config.store_path).await?;
    let store = match config.backup_path.clone() {
        Some(backup) => store.with_backup(backup),
        None => store,
    };
    let store: Arc<dyn RecordStore> = Arc::new(store);

    match cli.command {
        Commands::Process { files } => process(&config, store, &files, cli.json).await,
        Commands::List { status, category } => {
            let status = status
                .map(|s| s.parse::<RecordStatus>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let category = category
                .map(|c| c.parse::<Category>())
                .transpose()
                .map_err(anyhow::Error::msg)?;

            let records: Vec<EmailRecord> = store
                .records()
                .await
                .into_iter()
                .filter(|r| status.is_none_or(|s| r.status == s))
                .filter(|r| category.is_none_or(|c| r.category == c))
                .collect();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                eprintln!("No records.");
            } else {
                for record in &records {
                    println!("{}", record_line(record));
                }
            }
            Ok(())
        }
        Commands::Show { id } => {
            let record = store
                .get(id)
                .await
                .with_context(|| format!("Record {id} not found"))?;
            print_record(&record, cli.json)
        }
        Commands::Update {
            id,
            status,
            category,
            notes,
            draft,
        } => {
            let fields = [
                ("status", status),
                ("category", category),
                ("notes", notes),
                ("draft_reply", draft),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)));

            let patch = RecordPatch::from_fields(fields)?;
            if patch.is_empty() {
                bail!("Nothing to update: pass --status, --category, --notes or --draft");
            }

            let record = store.update(id, &patch).await?;
            store.commit().await?;
            tracing::info!(id = %id, status = record.status.as_str(), "Record updated");
            print_record(&record, cli.json)
        }
        Commands::Remove { id } => {
            let record = store.remove(id).await?;
            store.commit().await?;
            tracing::info!(id = %id, "Record removed");
            eprintln!("Removed {} ({})", record.id, record.subject());
            Ok(())
        }
        Commands::Summary => {
            let summary = StoreSummary::from_records(&store.records().await);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary_text(&summary));
            }
            Ok(())
        }
    }
}

async fn process(
    config: &TriageConfig,
    store: Arc<dyn RecordStore>,
    files: &[PathBuf],
    json: bool,
) -> anyhow::Result<()> {
    let llm_config = config.llm_config()?;
    let provider = create_provider(&llm_config)?;
    let llm: Arc<dyn LlmProvider> = Arc::new(RetryProvider::new(
        provider,
        config.llm_retries,
        config.llm_timeout,
    ));

    let classifier =
        Arc::new(LlmClassifier::new(Arc::clone(&llm)).with_min_confidence(config.min_confidence));
    let drafter = Arc::new(LlmDrafter::with_config(llm, DrafterConfig::default()));
    let pipeline = EmailPipeline::new(store, classifier, drafter);

    let texts = read_inputs(files)?;
    if texts.len() == 1 {
        let record = pipeline.process(&texts[0]).await?;
        return print_record(&record, json);
    }

    let results = pipeline.process_batch(&texts).await;
    let mut processed = Vec::new();
    for (path, result) in files.iter().zip(&results) {
        match result {
            Ok(record) => {
                if !json {
                    println!("{}  {}", record_line(record), path.display());
                }
                processed.push(record);
            }
            Err(e) => eprintln!("{}: {}", path.display(), e),
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&processed)?);
    }

    let failures = failures_by_stage(&results);
    if !failures.is_empty() {
        let detail = failures
            .iter()
            .map(|(stage, count)| format!("{count} at {stage}"))
            .collect::<Vec<_>>()
            .join(", ");
        bail!(
            "{} of {} emails failed ({detail})",
            results.len() - processed.len(),
            results.len()
        );
    }
    Ok(())
}

fn read_inputs(files: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    if files.is_empty() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read email from stdin")?;
        return Ok(vec![text]);
    }

    files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

// ============================================================================
// Output
// ============================================================================

fn record_line(record: &EmailRecord) -> String {
    format!(
        "{}  {:<11}  {:<17}  {:<6}  {}",
        record.id,
        record.status.as_str(),
        record.category.as_str(),
        record.priority().to_string(),
        record.subject()
    )
}

fn record_detail(record: &EmailRecord) -> String {
    let mut out = format!(
        "ID:        {}\nCreated:   {}\nStatus:    {}\nCategory:  {} ({} priority)\nSubject:   {}\n",
        record.id,
        record.created_at.to_rfc3339(),
        record.status,
        record.category.label(),
        record.priority(),
        record.subject(),
    );

    if !record.extracted_fields.is_empty() {
        out.push_str("Fields:\n");
        for (key, value) in &record.extracted_fields {
            out.push_str(&format!("  {key}: {value}\n"));
        }
    }
    if !record.notes.is_empty() {
        out.push_str(&format!("Notes:     {}\n", record.notes));
    }

    out.push_str(&format!(
        "\n--- Email ---\n{}\n\n--- Draft reply ({}) ---\n{}\n",
        record.received_text.trim_end(),
        record.reply_subject(),
        record.draft_reply
    ));
    out
}

fn print_record(record: &EmailRecord, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        print!("{}", record_detail(record));
    }
    Ok(())
}

fn summary_text(summary: &StoreSummary) -> String {
    let mut out = format!(
        "Total:        {}\nOpen drafts:  {}\n\nBy status:\n",
        summary.total, summary.open_drafts
    );
    for (status, count) in &summary.by_status {
        out.push_str(&format!("  {:<17} {}\n", status.as_str(), count));
    }
    out.push_str("\nBy category:\n");
    for (category, count) in &summary.by_category {
        out.push_str(&format!("  {:<17} {}\n", category.as_str(), count));
    }
    out
}
