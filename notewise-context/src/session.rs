//! Document session: one open document talking to one model.
//!
//! Wires the context manager to the document's persisted summary and to the
//! AI service, so asking a question is a single call.

use notewise_ai::{AiError, AiService};
use std::sync::Arc;

use crate::config::ContextConfig;
use crate::manager::{ContextManager, ContextStatus};
use crate::store::{DocumentSummaryPersister, SummaryStore};

/// Conversation state for one open document.
pub struct DocumentSession {
    document_id: String,
    service: Arc<AiService>,
    store: Arc<dyn SummaryStore>,
    manager: ContextManager,
    provider_name: String,
    model: String,
}

impl DocumentSession {
    /// Open a session, seeding the manager with the document's saved summary.
    ///
    /// Summarization uses the provider registered as `provider_name`. A
    /// summary that cannot be read is logged and the session starts empty.
    pub async fn open(
        document_id: impl Into<String>,
        service: Arc<AiService>,
        store: Arc<dyn SummaryStore>,
        config: ContextConfig,
        provider_name: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let document_id = document_id.into();
        let provider_name = provider_name.into();
        let manager = ContextManager::new(config);

        match store.read(&document_id).await {
            Ok(summary) => manager.load_summary(summary.as_deref()),
            Err(e) => tracing::warn!(
                document_id = %document_id,
                error = %e,
                "Failed to load saved summary, starting fresh"
            ),
        }

        match service.provider(&provider_name) {
            Some(provider) => manager.set_provider(provider),
            None => tracing::warn!(
                provider = %provider_name,
                "Provider not registered, long transcripts will be truncated"
            ),
        }

        manager.set_persister(Arc::new(DocumentSummaryPersister::new(
            store.clone(),
            document_id.clone(),
        )));

        tracing::debug!(document_id = %document_id, provider = %provider_name, "Opened document session");

        Self {
            document_id,
            service,
            store,
            manager,
            provider_name,
            model: model.into(),
        }
    }

    /// Ask a question about the document, streaming the answer to `on_chunk`.
    pub async fn ask(
        &self,
        prompt: &str,
        full_text: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), AiError> {
        let context = self.manager.process_context(full_text).await;
        self.service
            .send_prompt(&self.provider_name, prompt, &context, &self.model, on_chunk)
            .await
    }

    /// Stop the answer currently streaming.
    pub fn stop(&self) {
        self.service.stop_generation();
    }

    /// Forget the conversation: clear both tiers and the saved summary.
    pub async fn clear_context(&self) -> anyhow::Result<()> {
        self.manager.reset();
        self.store.clear(&self.document_id).await
    }

    /// Rebuild the saved summary from the whole document.
    ///
    /// Returns the new summary, already persisted.
    pub async fn regenerate_summary(&self, full_text: &str) -> anyhow::Result<String> {
        self.manager.regenerate(full_text).await
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn status(&self) -> ContextStatus {
        self.manager.status()
    }
}
