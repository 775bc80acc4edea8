//! Command-line interface for spacelaw.
//!
//! Provides commands for importing collected documents, running the
//! analysis engine over them, and inspecting what it has stored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{self, paths, ResolvedConfig};
use crate::core::lexicon::{DEFAULT_RULESET_NAME, DEFAULT_RULESET_YAML};
use crate::core::{BatchLog, BatchRequest, CancelHandle, Engine, Orchestrator, Ruleset};
use crate::domain::{
    BatchSummary, Document, DocumentStatus, ItemOutcome, Jurisdiction, LawType, SpaceEvent,
    StageOutcome,
};
use crate::store::{DocumentFilter, Page, PersistenceError, SqliteStore, Store};

/// spacelaw - Legal analysis engine for space-law documents
#[derive(Parser, Debug)]
#[command(name = "spacelaw")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the state directory, database and default ruleset
    Init,

    /// Import documents and events (JSON array or JSONL)
    Import {
        /// File produced by the ingestion service
        file: PathBuf,
    },

    /// Classify one document as customary or treaty law
    Classify {
        document_id: String,
    },

    /// Run a batch over several documents
    Analyze {
        #[arg(required = true)]
        document_ids: Vec<String>,

        /// Also detect jurisdictional boundaries after classification
        #[arg(long)]
        jurisdictional: bool,

        /// Also generate jus cogens recommendations
        #[arg(long)]
        jus_cogens: bool,

        /// Restrict boundary detection to these jurisdictions
        #[arg(long = "jurisdiction", value_parser = Jurisdiction::from_str)]
        jurisdictions: Vec<Jurisdiction>,
    },

    /// Detect boundary conflicts among documents
    Boundaries {
        #[arg(required = true)]
        document_ids: Vec<String>,

        #[arg(long = "jurisdiction", value_parser = Jurisdiction::from_str)]
        jurisdictions: Vec<Jurisdiction>,
    },

    /// Generate jus cogens recommendations from the stored corpus
    Recommend,

    /// List stored records
    List {
        #[arg(value_enum)]
        kind: RecordKind,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Documents only
        #[arg(long, value_parser = Jurisdiction::from_str)]
        jurisdiction: Option<Jurisdiction>,

        /// Documents only
        #[arg(long, value_parser = LawType::from_str)]
        law_type: Option<LawType>,

        /// Documents only
        #[arg(long, value_parser = DocumentStatus::from_str)]
        status: Option<DocumentStatus>,

        /// Analyses only
        #[arg(long)]
        document: Option<String>,
    },

    /// Show the summary of a logged batch
    Status {
        /// Batch ID (UUID)
        batch_id: String,
    },

    /// List available rulesets
    Rulesets,

    /// Show resolved configuration
    Config,
}

/// Stored record families
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RecordKind {
    Documents,
    Analyses,
    Boundaries,
    Recommendations,
    Events,
}

/// One line of an import file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportRecord {
    Document(Document),
    Event(SpaceEvent),
}

#[derive(Debug, Default, Serialize)]
struct ImportReport {
    documents: usize,
    events: usize,
    skipped: usize,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let json = self.json;
        match self.command {
            Commands::Init => init(json).await,
            Commands::Import { file } => import(&file, json).await,
            Commands::Classify { document_id } => classify(&document_id, json).await,
            Commands::Analyze {
                document_ids,
                jurisdictional,
                jus_cogens,
                jurisdictions,
            } => {
                let mut request = BatchRequest::new(document_ids).for_jurisdictions(jurisdictions);
                if jurisdictional {
                    request = request.with_boundaries();
                }
                if jus_cogens {
                    request = request.with_jus_cogens();
                }
                analyze(request, json).await
            }
            Commands::Boundaries {
                document_ids,
                jurisdictions,
            } => boundaries(&document_ids, &jurisdictions, json).await,
            Commands::Recommend => recommend(json).await,
            Commands::List {
                kind,
                limit,
                offset,
                jurisdiction,
                law_type,
                status,
                document,
            } => {
                let filter = DocumentFilter {
                    jurisdiction,
                    law_type,
                    status,
                };
                list(kind, &filter, document.as_deref(), Page::new(limit, offset), json).await
            }
            Commands::Status { batch_id } => show_status(&batch_id, json).await,
            Commands::Rulesets => list_rulesets(json).await,
            Commands::Config => show_config(json).await,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn open_store(cfg: &ResolvedConfig) -> Result<Arc<dyn Store>> {
    if let Some(parent) = cfg.database.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let store = SqliteStore::open(&cfg.database)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))?;
    Ok(Arc::new(store))
}

fn open_engine(cfg: &ResolvedConfig) -> Result<Engine> {
    let store = open_store(cfg)?;
    Engine::from_config(store, cfg).context("Failed to start the analysis engine")
}

/// Create the state directory layout
async fn init(json: bool) -> Result<()> {
    let cfg = config::config()?;

    for dir in [&cfg.home, &cfg.rulesets_dir, &paths::batches_dir(&cfg.home)] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let ruleset = cfg.rulesets_dir.join(format!("{}.yaml", DEFAULT_RULESET_NAME));
    if !ruleset.exists() {
        tokio::fs::write(&ruleset, DEFAULT_RULESET_YAML)
            .await
            .with_context(|| format!("Failed to write ruleset: {}", ruleset.display()))?;
        info!(path = %ruleset.display(), "Wrote default ruleset");
    }

    open_store(cfg)?;

    if json {
        return print_json(cfg);
    }
    println!("Initialized spacelaw home at {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!("  Rulesets: {}", cfg.rulesets_dir.display());
    Ok(())
}

/// Parse a JSON array or JSONL import file
fn parse_import(content: &str) -> Result<Vec<ImportRecord>> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).context("Failed to parse JSON array");
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Failed to parse line {}", n + 1))
        })
        .collect()
}

async fn import(file: &Path, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read import file: {}", file.display()))?;
    let records = parse_import(&content)?;

    let store = open_store(cfg)?;
    let mut report = ImportReport::default();

    for record in records {
        let (id, result) = match &record {
            ImportRecord::Document(document) => (&document.id, store.insert_document(document).await),
            ImportRecord::Event(event) => (&event.id, store.insert_event(event).await),
        };
        match result {
            Ok(()) => match &record {
                ImportRecord::Document(_) => report.documents += 1,
                ImportRecord::Event(_) => report.events += 1,
            },
            Err(PersistenceError::Conflict(reason)) => {
                warn!(id = %id, %reason, "Skipping record");
                report.skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to import record {}", id)),
        }
    }

    if json {
        return print_json(&report);
    }
    println!(
        "Imported {} documents and {} events ({} skipped)",
        report.documents, report.events, report.skipped
    );
    Ok(())
}

async fn classify(document_id: &str, json: bool) -> Result<()> {
    let engine = open_engine(config::config()?)?;
    let (analysis, report) = engine.classify_with_report(document_id).await?;

    if json {
        return print_json(&analysis);
    }
    println!("Document:   {}", document_id);
    println!("Analysis:   {}", analysis.id);
    println!("Label:      {}", report.label);
    println!("Confidence: {:.3}", report.confidence);
    println!("Rationale:  {}", report.rationale);
    Ok(())
}

async fn analyze(request: BatchRequest, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let orchestrator = Orchestrator::new(open_engine(cfg)?).with_batch_log(paths::batches_dir(&cfg.home));

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, draining dispatched documents");
            on_interrupt.cancel();
        }
    });

    let summary = orchestrator.run_with_cancel(&request, &cancel).await;
    interrupt.abort();
    let summary = summary?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!("Batch: {}", summary.batch_id);
    println!("State: {:?}", summary.state);
    println!(
        "Processed: {}  Failed: {}  Not dispatched: {}",
        summary.processed, summary.failed, summary.not_dispatched
    );
    println!();
    println!("{:<38} {:<15} {}", "DOCUMENT", "OUTCOME", "DETAIL");
    println!("{}", "-".repeat(80));
    for result in &summary.results {
        let (outcome, detail) = match &result.outcome {
            ItemOutcome::Pending => ("pending".to_string(), String::new()),
            ItemOutcome::Succeeded {
                label, confidence, ..
            } => (label.to_string(), format!("confidence {:.3}", confidence)),
            ItemOutcome::Failed { kind, message } => (format!("failed ({})", kind), message.clone()),
            ItemOutcome::NotDispatched => ("not dispatched".to_string(), String::new()),
        };
        println!("{:<38} {:<15} {}", result.document_id, outcome, detail);
    }
    println!();
    println!("Boundaries:      {}", describe_stage(&summary.boundaries));
    println!("Recommendations: {}", describe_stage(&summary.recommendations));
}

fn describe_stage(outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::NotRequested => "not requested".to_string(),
        StageOutcome::Completed { record_ids } => format!("{} records", record_ids.len()),
        StageOutcome::Skipped { reason } => format!("skipped: {}", reason),
        StageOutcome::Failed { kind, message } => format!("failed ({}): {}", kind, message),
    }
}

async fn boundaries(document_ids: &[String], jurisdictions: &[Jurisdiction], json: bool) -> Result<()> {
    let engine = open_engine(config::config()?)?;
    let boundaries = engine.analyze_boundaries(jurisdictions, document_ids).await?;

    if json {
        return print_json(&boundaries);
    }
    if boundaries.is_empty() {
        println!("No boundary conflicts found");
        return Ok(());
    }
    for boundary in &boundaries {
        println!(
            "{} [{}] {:.3} {}",
            boundary.id, boundary.boundary_type, boundary.confidence_score, boundary.description
        );
        for conflict in &boundary.conflicts {
            println!("    {}: {}", conflict.jurisdiction.label(), conflict.conflict_description);
        }
    }
    Ok(())
}

async fn recommend(json: bool) -> Result<()> {
    let engine = open_engine(config::config()?)?;
    let recommendations = engine.generate_recommendations().await?;

    if json {
        return print_json(&recommendations);
    }
    if recommendations.is_empty() {
        println!("No recommendations: too few jurisdictions agree on any principle");
        return Ok(());
    }
    for r in &recommendations {
        println!("{:.3}  {}", r.recommendation_strength, r.principle);
        println!("       {}", r.implementation_guidance);
    }
    Ok(())
}

async fn list(
    kind: RecordKind,
    filter: &DocumentFilter,
    document_id: Option<&str>,
    page: Page,
    json: bool,
) -> Result<()> {
    let store = open_store(config::config()?)?;

    match kind {
        RecordKind::Documents => {
            let documents = store.list_documents(filter, page).await?;
            if json {
                return print_json(&documents);
            }
            println!("{:<38} {:<14} {:<12} {:<10} {}", "ID", "JURISDICTION", "LAW TYPE", "STATUS", "TITLE");
            println!("{}", "-".repeat(100));
            for d in documents {
                println!(
                    "{:<38} {:<14} {:<12} {:<10} {}",
                    d.id,
                    d.jurisdiction.label(),
                    d.law_type,
                    d.status.as_str(),
                    d.title
                );
            }
        }
        RecordKind::Analyses => {
            let analyses = store.list_analyses(document_id, page).await?;
            if json {
                return print_json(&analyses);
            }
            println!("{:<38} {:<38} {:<20} {}", "ID", "DOCUMENT", "TYPE", "CONFIDENCE");
            println!("{}", "-".repeat(110));
            for a in analyses {
                println!(
                    "{:<38} {:<38} {:<20} {:.3}",
                    a.id, a.document_id, a.analysis_type, a.confidence_score
                );
            }
        }
        RecordKind::Boundaries => {
            let boundaries = store.list_boundaries(page).await?;
            if json {
                return print_json(&boundaries);
            }
            for b in boundaries {
                println!("{} [{}] {:.3} {}", b.id, b.boundary_type, b.confidence_score, b.description);
            }
        }
        RecordKind::Recommendations => {
            let recommendations = store.list_recommendations(page).await?;
            if json {
                return print_json(&recommendations);
            }
            for r in recommendations {
                println!("{} {:.3} {}", r.id, r.recommendation_strength, r.principle);
            }
        }
        RecordKind::Events => {
            let events = store.list_events(page).await?;
            if json {
                return print_json(&events);
            }
            for e in events {
                println!("{} {} [{}] {}", e.date_occurred.format("%Y-%m-%d"), e.id, e.event_type, e.title);
            }
        }
    }

    Ok(())
}

/// Show the summary of a batch rebuilt from its log
async fn show_status(batch_id_str: &str, json: bool) -> Result<()> {
    let batch_id = Uuid::parse_str(batch_id_str)
        .with_context(|| format!("Invalid batch ID: {}", batch_id_str))?;

    let batches = config::batches_dir()?;
    if !paths::batch_log(&batches, &batch_id).exists() {
        anyhow::bail!("Batch {} not found", batch_id);
    }

    let log = BatchLog::open(&batches, batch_id).await?;
    let summary = log
        .summary()
        .await?
        .with_context(|| format!("Batch {} not found", batch_id))?;

    if json {
        return print_json(&summary);
    }
    print_summary(&summary);
    println!("Log: {}", log.events_path().display());
    Ok(())
}

async fn list_rulesets(json: bool) -> Result<()> {
    let cfg = config::config()?;
    let files = Ruleset::discover(&cfg.rulesets_dir)?;

    let mut rulesets = Vec::new();
    let mut has_default = false;
    for file in files {
        match Ruleset::from_file(&file) {
            Ok(ruleset) => {
                has_default |= ruleset.name == DEFAULT_RULESET_NAME;
                rulesets.push((ruleset.name, ruleset.version, file.display().to_string()));
            }
            Err(e) => warn!(path = %file.display(), error = %e, "Skipping unreadable ruleset"),
        }
    }
    if !has_default {
        let builtin = Ruleset::builtin()?;
        rulesets.push((builtin.name, builtin.version, "(built in)".to_string()));
    }

    if json {
        let entries: Vec<_> = rulesets
            .iter()
            .map(|(name, version, source)| {
                serde_json::json!({ "name": name, "version": version, "source": source })
            })
            .collect();
        return print_json(&entries);
    }
    for (name, version, source) in rulesets {
        let marker = if name == cfg.engine.ruleset { "*" } else { " " };
        println!("{} {:<20} v{:<4} {}", marker, name, version, source);
    }
    Ok(())
}

async fn show_config(json: bool) -> Result<()> {
    let cfg = config::config()?;

    if json {
        return print_json(cfg);
    }

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!("  Rulesets: {}", cfg.rulesets_dir.display());
    println!("  Batches:  {}", paths::batches_dir(&cfg.home).display());
    println!();
    let engine = &cfg.engine;
    println!("Ruleset: {}", engine.ruleset);
    println!();
    println!("Classifier:");
    println!("  Min signal:        {}", engine.classifier.min_signal);
    println!("  Closeness:         {}", engine.classifier.closeness);
    println!("  Refine confidence: {}", engine.classifier.refine_confidence);
    println!("Boundaries:");
    println!("  Conflict threshold: {}", engine.boundaries.conflict_threshold);
    println!("Recommendations:");
    println!("  Min jurisdictions: {}", engine.recommendations.min_jurisdictions);
    println!("  Dissent threshold: {}", engine.recommendations.dissent_threshold);
    println!();
    println!("Limits:");
    println!("  Max concurrency:   {}", engine.limits.max_concurrency);
    println!("  Write timeout:     {}ms", engine.limits.write_timeout_ms);
    println!("  Max content size:  {} bytes", engine.limits.max_content_bytes);
    println!("  Max batch size:    {}", engine.limits.max_batch_size);

    Ok(())
}
