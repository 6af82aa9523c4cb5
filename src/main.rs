use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand, ValueEnum};

use case_reconcile::api::HttpCaseApi;
use case_reconcile::audit::AuditLog;
use case_reconcile::cases::record::FieldValues;
use case_reconcile::cases::{CaseId, FieldRegistry, LockState, ReviewSession};
use case_reconcile::config::ReconcileConfig;
use case_reconcile::error::ReconcileError;
use case_reconcile::settings::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "case-reconcile",
    version,
    about = "Review and apply extracted field suggestions on legal cases"
)]
struct Cli {
    /// TOML settings file. Environment variables take precedence.
    #[arg(long, env = "CASE_SETTINGS", default_value = "case-reconcile.toml")]
    settings: PathBuf,

    #[arg(long, env = "CASE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the case fields suggestions can target.
    Fields,
    #[command(flatten)]
    Case(CaseCommand),
}

/// Commands that work on one case through the backend.
#[derive(Debug, Subcommand)]
enum CaseCommand {
    /// Show reviewable suggestions for a case.
    Show {
        case_id: String,
        /// Print the review as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Accept visible suggestions and write them to the case.
    Apply {
        case_id: String,
        /// Only accept suggestions from this document.
        #[arg(long)]
        doc: Option<String>,
        /// Only accept these fields (repeatable).
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Stop suggestions from being applied to a field.
    Lock { case_id: String, field: String },
    /// Allow suggestions to be applied to a field again.
    Unlock { case_id: String, field: String },
    /// Discard every pending suggestion on a case.
    Clear { case_id: String },
    /// Merge an analysis result (JSON object of field -> value) into a case.
    Ingest {
        case_id: String,
        doc_key: String,
        #[arg(long)]
        file: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "case_reconcile=info,warn".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn user_error(err: ReconcileError) -> anyhow::Error {
    anyhow!(err.user_message())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let registry = Arc::new(
        FieldRegistry::bundled()
            .context("loading field registry")?
            .clone(),
    );

    let command = match cli.command {
        Command::Fields => {
            print_fields(&registry);
            return Ok(());
        }
        Command::Case(command) => command,
    };

    let settings = Settings::load(&cli.settings)?;
    let config = ReconcileConfig::resolve(&settings)?;
    let api = Arc::new(HttpCaseApi::new(&config.api)?);
    let mut session = ReviewSession::new(api, registry, config.suggestions.clone());
    if let Some(audit) = AuditLog::from_config(&config.audit) {
        tracing::debug!(path = %audit.path().display(), "Audit log enabled");
        session = session.with_audit(Arc::new(audit));
    }

    match command {
        CaseCommand::Show { case_id, json } => {
            load(&session, &case_id).await?;
            if json {
                let review = session.review().map_err(user_error)?;
                println!("{}", serde_json::to_string_pretty(&review)?);
            } else {
                print_review(&session)?;
            }
        }
        CaseCommand::Apply {
            case_id,
            doc,
            fields,
        } => {
            load(&session, &case_id).await?;
            let review = session.review().map_err(user_error)?;
            for document in review
                .into_iter()
                .filter(|d| doc.as_deref().is_none_or(|wanted| d.doc_key == wanted))
            {
                for item in document
                    .items
                    .into_iter()
                    .filter(|i| fields.is_empty() || fields.contains(&i.field))
                {
                    session
                        .record_acceptance(&document.doc_key, &item.field, item.suggested, true)
                        .map_err(user_error)?;
                }
            }
            match session.apply().await.map_err(user_error)? {
                None => println!("Nothing to apply."),
                Some(outcome) => {
                    println!(
                        "Applied {} suggestion(s); skipped {} locked.",
                        outcome.applied, outcome.skipped_locked
                    );
                    if !outcome.removed_documents.is_empty() {
                        println!("Finished documents: {}", outcome.removed_documents.join(", "));
                    }
                    if !outcome.refreshed {
                        println!("Saved, but the case could not be reloaded.");
                    }
                }
            }
        }
        CaseCommand::Lock { case_id, field } => {
            set_lock(&session, &case_id, &field, LockState::Locked).await?;
        }
        CaseCommand::Unlock { case_id, field } => {
            set_lock(&session, &case_id, &field, LockState::Unlocked).await?;
        }
        CaseCommand::Clear { case_id } => {
            load(&session, &case_id).await?;
            session.clear().await.map_err(user_error)?;
            println!("Cleared pending suggestions for case {case_id}.");
        }
        CaseCommand::Ingest {
            case_id,
            doc_key,
            file,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let suggestions: FieldValues = serde_json::from_str(&raw)
                .with_context(|| format!("{} must hold a JSON object", file.display()))?;
            load(&session, &case_id).await?;
            let merged = session
                .ingest_analysis(&doc_key, suggestions)
                .await
                .map_err(user_error)?;
            println!("Merged {merged} suggestion(s) from {doc_key}.");
        }
    }

    Ok(())
}

async fn load(session: &ReviewSession, case_id: &str) -> anyhow::Result<()> {
    session
        .load(&CaseId::new(case_id))
        .await
        .map_err(user_error)
}

async fn set_lock(
    session: &ReviewSession,
    case_id: &str,
    field: &str,
    wanted: LockState,
) -> anyhow::Result<()> {
    load(session, case_id).await?;
    let current = if session.is_locked(field) {
        LockState::Locked
    } else {
        LockState::Unlocked
    };
    if current == wanted {
        println!("'{field}' is already {}.", wanted.as_str());
        return Ok(());
    }
    let state = session.toggle_lock(field).await.map_err(user_error)?;
    println!("'{field}' is now {}.", state.as_str());
    Ok(())
}

fn print_fields(registry: &FieldRegistry) {
    for spec in registry.iter() {
        println!(
            "{:<30} {:<24} {:<10} {:<17}{}",
            spec.name,
            spec.label,
            if spec.is_dedicated() { "column" } else { "details" },
            spec.group.as_str(),
            if spec.editable { "" } else { " read-only" }
        );
    }
}

fn print_review(session: &ReviewSession) -> anyhow::Result<()> {
    let review = session.review().map_err(user_error)?;
    if review.is_empty() {
        println!("No suggestions to review.");
        return Ok(());
    }
    for document in &review {
        println!("{}", document.doc_key);
        for item in &document.items {
            let marker = if item.locked { "[locked]" } else { "" };
            let current = item
                .current
                .as_ref()
                .map(|v| format!(" (currently {v})"))
                .unwrap_or_default();
            println!(
                "  {:<9}{} / {}: {}{}",
                marker,
                item.group.title(),
                item.label,
                item.suggested,
                current
            );
        }
    }
    println!(
        "{} suggestion(s) to review.",
        case_reconcile::cases::reconcile::visible_count(&review)
    );
    Ok(())
}
