//! Two-tier context manager.
//!
//! The context sent alongside a prompt is built from two tiers:
//! - `memory` - one condensed summary of everything compacted so far
//! - `recent` - the raw transcript since the last compaction
//!
//! Each call receives the full transcript. When it exceeds the character
//! threshold the manager asks the summarizing provider to condense it once,
//! replacing `memory` and clearing `recent`. When summarization fails the
//! transcript is tail-truncated to the threshold instead.

use notewise_ai::{AiError, AiProvider, CancellationToken};
use notewise_common::util::{char_len, tail_chars, truncate_with_ellipsis};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::ContextConfig;
use crate::store::SummaryPersister;

/// Prefix of a summary produced by compaction.
pub const SUMMARY_MARKER: &str = "[history summary]";

/// Header placed before the raw tail when both tiers are present.
pub const RECENT_MARKER: &str = "[recent]";

/// Tier sizes, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextStatus {
    pub memory_length: usize,
    pub recent_length: usize,
    pub total_length: usize,
}

/// Copy of both tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub memory: String,
    pub recent: String,
}

#[derive(Debug, Error)]
enum SummarizeError {
    #[error("no summarization provider set")]
    NoProvider,
    #[error(transparent)]
    Provider(#[from] AiError),
}

struct State {
    config: ContextConfig,
    memory: String,
    recent: String,
    provider: Option<Arc<dyn AiProvider>>,
    persister: Option<Arc<dyn SummaryPersister>>,
}

impl State {
    fn compose(&self) -> String {
        match (self.memory.is_empty(), self.recent.is_empty()) {
            (false, false) => format!("{}\n\n{RECENT_MARKER}\n{}", self.memory, self.recent),
            (false, true) => self.memory.clone(),
            _ => self.recent.clone(),
        }
    }
}

/// Keeps a document's conversation context under a character budget.
///
/// Calls to [`process_context`](Self::process_context) are queued: a second
/// call waits until the first, including its compaction, has finished.
pub struct ContextManager {
    state: Mutex<State>,
    turn: tokio::sync::Mutex<()>,
    compacting: AtomicBool,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            state: Mutex::new(State {
                config,
                memory: String::new(),
                recent: String::new(),
                provider: None,
                persister: None,
            }),
            turn: tokio::sync::Mutex::new(()),
            compacting: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the context for `full_text`, compacting it if it is over budget.
    ///
    /// Never fails: summarization problems degrade to truncation.
    pub async fn process_context(&self, full_text: &str) -> String {
        let _turn = self.turn.lock().await;

        let (config, provider) = {
            let mut state = self.state();
            if !state.config.enabled {
                tracing::debug!("Context management disabled, passing transcript through");
                return full_text.to_string();
            }
            state.recent = full_text.to_string();
            (state.config.clone(), state.provider.clone())
        };

        let recent_length = char_len(full_text);
        tracing::debug!(
            recent_length,
            threshold = config.max_context_length,
            "Processing context"
        );

        if recent_length > config.max_context_length {
            self.compact(full_text, &config, provider).await;
        }

        let context = self.state().compose();
        tracing::debug!(context_length = char_len(&context), "Context ready");
        context
    }

    async fn compact(
        &self,
        text: &str,
        config: &ContextConfig,
        provider: Option<Arc<dyn AiProvider>>,
    ) {
        self.compacting.store(true, Ordering::SeqCst);
        let _flag = CompactingFlag(&self.compacting);

        match summarize(provider, text, &config.summary_model).await {
            Ok(summary) => {
                let (memory, persister) = self.install_summary(text, &summary);
                if let Some(persister) = persister {
                    if let Err(e) = persister.persist(&memory).await {
                        tracing::warn!(error = %e, "Failed to persist summary, keeping it in memory");
                    }
                }
            }
            Err(e) => {
                self.state().recent = tail_chars(text, config.max_context_length).to_string();
                tracing::warn!(
                    error = %e,
                    kept = config.max_context_length,
                    "Summarization failed, truncating transcript"
                );
            }
        }
    }

    /// Summarize `full_text` now, regardless of its length, and persist the result.
    ///
    /// Unlike [`process_context`](Self::process_context), failures are returned.
    /// A failed summarization leaves both tiers untouched; a failed persist
    /// keeps the new summary in memory. Returns the new `memory` tier.
    pub async fn regenerate(&self, full_text: &str) -> anyhow::Result<String> {
        let _turn = self.turn.lock().await;

        let (config, provider) = {
            let state = self.state();
            (state.config.clone(), state.provider.clone())
        };

        self.compacting.store(true, Ordering::SeqCst);
        let _flag = CompactingFlag(&self.compacting);

        let summary = summarize(provider, full_text, &config.summary_model).await?;
        let (memory, persister) = self.install_summary(full_text, &summary);
        if let Some(persister) = persister {
            persister.persist(&memory).await?;
        }
        Ok(memory)
    }

    fn install_summary(
        &self,
        text: &str,
        summary: &str,
    ) -> (String, Option<Arc<dyn SummaryPersister>>) {
        let memory = format!("{SUMMARY_MARKER}\n{summary}");
        let persister = {
            let mut state = self.state();
            state.memory = memory.clone();
            state.recent.clear();
            state.persister.clone()
        };

        tracing::info!(
            input_length = char_len(text),
            summary_length = char_len(&memory),
            preview = %truncate_with_ellipsis(summary, 80),
            "Compacted context"
        );
        (memory, persister)
    }

    /// Whether a compaction round is in flight.
    pub fn is_compacting(&self) -> bool {
        self.compacting.load(Ordering::SeqCst)
    }

    /// Seed `memory` with a previously persisted summary. Empty input is ignored.
    pub fn load_summary(&self, summary: Option<&str>) {
        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            tracing::debug!(length = char_len(summary), "Loaded saved summary");
            self.state().memory = summary.to_string();
        }
    }

    pub fn set_provider(&self, provider: Arc<dyn AiProvider>) {
        self.state().provider = Some(provider);
    }

    pub fn update_config(&self, config: ContextConfig) {
        self.state().config = config;
    }

    pub fn set_persister(&self, persister: Arc<dyn SummaryPersister>) {
        self.state().persister = Some(persister);
    }

    /// Clear both tiers. Persisted summaries are untouched.
    pub fn reset(&self) {
        let mut state = self.state();
        state.memory.clear();
        state.recent.clear();
        tracing::debug!("Context reset");
    }

    pub fn status(&self) -> ContextStatus {
        let state = self.state();
        let memory_length = char_len(&state.memory);
        let recent_length = char_len(&state.recent);
        ContextStatus {
            memory_length,
            recent_length,
            total_length: memory_length + recent_length,
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state();
        ContextSnapshot {
            memory: state.memory.clone(),
            recent: state.recent.clone(),
        }
    }

    pub fn config(&self) -> ContextConfig {
        self.state().config.clone()
    }
}

struct CompactingFlag<'a>(&'a AtomicBool);

impl Drop for CompactingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn summary_prompt(text: &str) -> String {
    format!(
        "Summarize the key points of the following conversation and document content. \
         Keep every important fact, key concept, user question and the substance of each AI answer. \
         Be concise but complete and do not leave out important details:\n\n\
         {text}\n\n\
         Summarize the key points of the content above concisely:"
    )
}

async fn summarize(
    provider: Option<Arc<dyn AiProvider>>,
    text: &str,
    model: &str,
) -> Result<String, SummarizeError> {
    let provider = provider.ok_or(SummarizeError::NoProvider)?;
    let prompt = summary_prompt(text);

    let mut summary = String::new();
    provider
        .send_prompt(
            &prompt,
            "",
            model,
            &mut |chunk: &str| summary.push_str(chunk),
            &CancellationToken::new(),
        )
        .await?;

    Ok(summary.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_joins_tiers() {
        let manager = ContextManager::new(ContextConfig::new(100, "m"));
        assert_eq!(manager.state().compose(), "");

        manager.state().recent = "tail".into();
        assert_eq!(manager.state().compose(), "tail");

        manager.load_summary(Some("[history summary]\nolder"));
        assert_eq!(
            manager.state().compose(),
            "[history summary]\nolder\n\n[recent]\ntail"
        );

        manager.state().recent.clear();
        assert_eq!(manager.state().compose(), "[history summary]\nolder");
    }

    #[test]
    fn load_summary_ignores_empty() {
        let manager = ContextManager::new(ContextConfig::new(100, "m"));
        manager.load_summary(Some("kept"));
        manager.load_summary(Some(""));
        manager.load_summary(None);
        assert_eq!(manager.snapshot().memory, "kept");
    }

    #[test]
    fn status_counts_chars() {
        let manager = ContextManager::new(ContextConfig::new(100, "m"));
        manager.load_summary(Some("摘要"));
        manager.state().recent = "abc".into();
        assert_eq!(
            manager.status(),
            ContextStatus {
                memory_length: 2,
                recent_length: 3,
                total_length: 5,
            }
        );

        manager.reset();
        assert_eq!(manager.status().total_length, 0);
    }

    #[test]
    fn summary_prompt_wraps_text() {
        let prompt = summary_prompt("TRANSCRIPT");
        assert!(prompt.contains("\n\nTRANSCRIPT\n\n"));
        assert!(prompt.starts_with("Summarize"));
    }

    #[tokio::test]
    async fn missing_provider_falls_back_to_truncation() {
        let manager = ContextManager::new(ContextConfig::new(4, "m"));
        let context = manager.process_context("abcdefgh").await;
        assert_eq!(context, "efgh");
        assert!(manager.snapshot().memory.is_empty());
        assert!(!manager.is_compacting());
    }
}
