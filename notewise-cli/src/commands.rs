//! Subcommand implementations.

use anyhow::{bail, Result};
use notewise_ai::models::{ModelInfo, ModelRegistry, ProviderKind, SizingPolicy};
use notewise_ai::AiService;
use notewise_common::config::{AiConfig, Config};
use notewise_context::{ContextConfig, DocumentSession, SqliteSummaryStore, SummaryStore};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::document::{default_document_id, read_text, read_transcript};

fn registry(config: &Config) -> ModelRegistry {
    ModelRegistry::builtin().with_custom_models(&config.ai.custom_models)
}

fn open_store(config: &Config) -> Result<SqliteSummaryStore> {
    SqliteSummaryStore::open(&config.storage.database_path())
}

// ============================================================================
// models
// ============================================================================

pub fn models(config: &Config, provider: Option<&str>) -> Result<()> {
    let filter = provider.map(str::parse::<ProviderKind>).transpose()?;
    let registry = registry(config);
    let policy = SizingPolicy::with_chars_per_token(config.context.chars_per_token);

    println!(
        "{:<20} {:<8} {:>10} {:>12} {:>8}",
        "MODEL", "PROVIDER", "TOKENS", "MAX CHARS", "RECENT"
    );
    let models: Vec<&ModelInfo> = match filter {
        Some(kind) => registry.by_provider(kind).collect(),
        None => registry.all().iter().collect(),
    };
    for model in models {
        let rec = policy.recommend(model.context_length);
        println!(
            "{:<20} {:<8} {:>10} {:>12} {:>8}",
            model.name,
            model.provider,
            model.context_length,
            rec.max_context_length,
            rec.recent_text_length
        );
    }
    Ok(())
}

// ============================================================================
// ask
// ============================================================================

#[derive(Debug)]
pub struct AskArgs {
    pub prompt: String,
    pub file: PathBuf,
    pub document_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub no_context: bool,
}

/// Configured AI settings with command-line overrides applied.
fn ai_with_overrides(config: &Config, provider: Option<String>, model: Option<String>) -> AiConfig {
    let mut ai = config.ai.clone();
    if let Some(provider) = provider {
        ai.default_provider = provider;
    }
    if let Some(model) = model {
        ai.default_model = model;
    }
    ai
}

fn build_service(ai: &AiConfig) -> Result<Arc<AiService>> {
    let service = Arc::new(AiService::from_config(ai));
    if service.provider(&ai.default_provider).is_none() {
        bail!(
            "Provider '{}' is not available (registered: {}). Is an API key configured?",
            ai.default_provider,
            service.provider_names().join(", ")
        );
    }
    Ok(service)
}

async fn open_session(
    config: &Config,
    ai: &AiConfig,
    service: Arc<AiService>,
    document_id: String,
    context_config: ContextConfig,
) -> Result<DocumentSession> {
    let store: Arc<dyn SummaryStore> = Arc::new(open_store(config)?);
    Ok(DocumentSession::open(
        document_id,
        service,
        store,
        context_config,
        ai.default_provider.clone(),
        ai.default_model.clone(),
    )
    .await)
}

pub async fn ask(config: &Config, args: AskArgs) -> Result<()> {
    let transcript = read_transcript(&args.file)?;

    let ai = ai_with_overrides(config, args.provider, args.model);
    let service = build_service(&ai)?;

    let mut context_config = ContextConfig::resolve(&ai, &config.context, &registry(config));
    if args.no_context {
        context_config.enabled = false;
    }

    let document_id = args
        .document_id
        .unwrap_or_else(|| default_document_id(&args.file));
    let session = open_session(config, &ai, service.clone(), document_id, context_config).await?;

    // Ctrl-C stops the stream instead of killing the process
    let stopper = service.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop_generation();
        }
    });

    let mut stdout = std::io::stdout();
    let result = session
        .ask(&args.prompt, &transcript, &mut |chunk: &str| {
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        })
        .await;
    interrupt.abort();
    println!();

    let status = session.status();
    tracing::debug!(
        document_id = session.document_id(),
        memory_length = status.memory_length,
        recent_length = status.recent_length,
        "Context after turn"
    );

    result?;
    Ok(())
}

// ============================================================================
// summary
// ============================================================================

pub async fn summary_show(config: &Config, document_id: &str) -> Result<()> {
    let store = open_store(config)?;
    match store.read(document_id).await? {
        Some(summary) => {
            if let Some(updated_at) = store.updated_at(document_id).await? {
                println!("# {document_id} (updated {updated_at})");
            }
            println!("{summary}");
        }
        None => println!("No saved summary for '{document_id}'"),
    }
    Ok(())
}

pub async fn summary_clear(config: &Config, document_id: &str) -> Result<()> {
    let store = open_store(config)?;
    store.clear(document_id).await?;
    println!("Cleared saved summary for '{document_id}'");
    Ok(())
}

/// Replace the saved summary with text read from `file`, or from `input` when
/// no file is given.
pub async fn summary_set(
    config: &Config,
    document_id: &str,
    file: Option<&Path>,
    mut input: impl Read,
) -> Result<()> {
    let summary = match file {
        Some(path) => read_text(path)?,
        None => {
            let mut text = String::new();
            input.read_to_string(&mut text)?;
            text
        }
    };
    let summary = summary.trim_end();
    if summary.is_empty() {
        bail!("Summary is empty; use `notewise summary clear {document_id}` to delete it");
    }

    let store = open_store(config)?;
    store.write(document_id, summary).await?;
    tracing::info!(document_id, length = summary.chars().count(), "Saved edited summary");
    println!("Saved summary for '{document_id}'");
    Ok(())
}

#[derive(Debug)]
pub struct RegenerateArgs {
    pub document_id: String,
    pub file: PathBuf,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Rebuild the saved summary of a document from its current content.
pub async fn summary_regenerate(config: &Config, args: RegenerateArgs) -> Result<()> {
    let transcript = read_transcript(&args.file)?;

    let ai = ai_with_overrides(config, args.provider, args.model);
    let service = build_service(&ai)?;
    let context_config = ContextConfig::resolve(&ai, &config.context, &registry(config));

    let session = open_session(config, &ai, service, args.document_id, context_config).await?;
    let summary = session.regenerate_summary(&transcript).await?;
    println!("{summary}");
    Ok(())
}
