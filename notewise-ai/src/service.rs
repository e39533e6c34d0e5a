//! Provider routing and generation control.
//!
//! The service owns a registry of providers and a single "current generation"
//! slot holding the cancellation token of the most recent call, so a UI stop
//! button can cancel whatever is streaming.

use notewise_common::config::AiConfig;
use notewise_common::logging::generate_generation_id;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;
use crate::provider::{AiProvider, HostedProvider, OllamaProvider};

struct ActiveGeneration {
    id: String,
    cancel: CancellationToken,
}

/// Routes prompts to named providers.
#[derive(Default)]
pub struct AiService {
    providers: RwLock<HashMap<String, Arc<dyn AiProvider>>>,
    current: Mutex<Option<ActiveGeneration>>,
}

impl AiService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a service with the providers enabled in `config`.
    pub fn from_config(config: &AiConfig) -> Self {
        let service = Self::new();
        let connect = Duration::from_secs(config.connect_timeout_secs);
        let request = config.request_timeout_secs.map(Duration::from_secs);

        if config.hosted.enabled {
            match config.hosted.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
                Some(key) => service.register_provider(Arc::new(
                    HostedProvider::new(key)
                        .with_name(config.hosted.name.clone())
                        .with_base_url(&config.hosted.base_url)
                        .with_timeouts(connect, request),
                )),
                None => tracing::debug!(
                    provider = %config.hosted.name,
                    "No API key configured, hosted provider not registered"
                ),
            }
        }

        if config.ollama.enabled {
            service.register_provider(Arc::new(
                OllamaProvider::new(Some(&config.ollama.base_url)).with_timeouts(connect, request),
            ));
        }

        service
    }

    /// Register a provider under its own name. A later registration replaces
    /// an earlier one with the same name.
    pub fn register_provider(&self, provider: Arc<dyn AiProvider>) {
        let name = provider.name().to_string();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.insert(name.clone(), provider).is_some() {
            tracing::debug!(provider = %name, "Replaced provider");
        } else {
            tracing::debug!(provider = %name, "Registered provider");
        }
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Whether a call started through [`send_prompt`](Self::send_prompt) is in flight.
    pub fn is_generating(&self) -> bool {
        self.slot().is_some()
    }

    /// Stream a completion through the named provider.
    ///
    /// The call becomes the current generation, replacing any earlier handle,
    /// and can be cancelled with [`stop_generation`](Self::stop_generation).
    pub async fn send_prompt(
        &self,
        provider_name: &str,
        prompt: &str,
        context: &str,
        model: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), AiError> {
        let provider = self
            .provider(provider_name)
            .ok_or_else(|| AiError::ProviderNotFound(provider_name.to_string()))?;

        let cancel = CancellationToken::new();
        let guard = self.install(cancel.clone());

        tracing::info!(
            generation_id = %guard.id,
            provider = provider_name,
            model,
            context_len = context.chars().count(),
            "Starting generation"
        );

        let result = provider
            .send_prompt(prompt, context, model, on_chunk, &cancel)
            .await;

        match &result {
            Ok(()) if cancel.is_cancelled() => {
                tracing::info!(generation_id = %guard.id, "Generation stopped")
            }
            Ok(()) => tracing::debug!(generation_id = %guard.id, "Generation complete"),
            Err(e) => tracing::warn!(generation_id = %guard.id, error = %e, "Generation failed"),
        }

        drop(guard);
        result
    }

    /// Stream a completion with a caller-owned cancellation token.
    ///
    /// The shared slot is not touched, so concurrent conversations can be
    /// stopped independently.
    pub async fn send_prompt_with_cancel(
        &self,
        provider_name: &str,
        prompt: &str,
        context: &str,
        model: &str,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
        cancel: &CancellationToken,
    ) -> Result<(), AiError> {
        let provider = self
            .provider(provider_name)
            .ok_or_else(|| AiError::ProviderNotFound(provider_name.to_string()))?;
        provider
            .send_prompt(prompt, context, model, on_chunk, cancel)
            .await
    }

    /// Cancel the current generation, if any. Safe to call repeatedly.
    pub fn stop_generation(&self) {
        if let Some(active) = self.slot().take() {
            tracing::debug!(generation_id = %active.id, "Stopping generation");
            active.cancel.cancel();
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveGeneration>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, cancel: CancellationToken) -> GenerationGuard<'_> {
        let id = generate_generation_id();
        *self.slot() = Some(ActiveGeneration {
            id: id.clone(),
            cancel,
        });
        GenerationGuard { service: self, id }
    }

    fn release(&self, id: &str) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|active| active.id == id) {
            *slot = None;
        }
    }
}

/// Clears the current-generation slot when the call ends, however it ends.
struct GenerationGuard<'a> {
    service: &'a AiService,
    id: String,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.service.release(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Emits its chunks, then waits for cancellation if `hold` is set.
    struct ScriptedProvider {
        name: &'static str,
        chunks: Vec<&'static str>,
        hold: bool,
        started: Arc<Notify>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, chunks: Vec<&'static str>) -> Self {
            Self {
                name,
                chunks,
                hold: false,
                started: Arc::new(Notify::new()),
            }
        }

        fn holding(mut self) -> Self {
            self.hold = true;
            self
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn send_prompt(
            &self,
            _prompt: &str,
            _context: &str,
            _model: &str,
            on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
            cancel: &CancellationToken,
        ) -> Result<(), AiError> {
            for chunk in &self.chunks {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                on_chunk(chunk);
            }
            self.started.notify_one();
            if self.hold {
                cancel.cancelled().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_fast() {
        let service = AiService::new();
        let err = service
            .send_prompt("claude", "hi", "", "m", &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::ProviderNotFound(name) if name == "claude"));
        assert!(!service.is_generating());
    }

    #[tokio::test]
    async fn test_routes_and_releases_slot() {
        let service = AiService::new();
        service.register_provider(Arc::new(ScriptedProvider::new("poe", vec!["a", "b", "c"])));

        let mut out = String::new();
        service
            .send_prompt("poe", "hi", "", "GPT-4o", &mut |c: &str| out.push_str(c))
            .await
            .unwrap();

        assert_eq!(out, "abc");
        assert!(!service.is_generating());
    }

    #[test]
    fn test_last_registration_wins() {
        let service = AiService::new();
        service.register_provider(Arc::new(ScriptedProvider::new("poe", vec!["old"])));
        service.register_provider(Arc::new(ScriptedProvider::new("poe", vec!["new"])));
        service.register_provider(Arc::new(ScriptedProvider::new("ollama", vec![])));
        assert_eq!(service.provider_names(), vec!["ollama", "poe"]);
    }

    #[tokio::test]
    async fn test_stop_generation_cancels_and_is_idempotent() {
        let service = Arc::new(AiService::new());
        let provider = ScriptedProvider::new("poe", vec!["first"]).holding();
        let started = provider.started.clone();
        service.register_provider(Arc::new(provider));

        // No-op when idle
        service.stop_generation();

        let task = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut out = Vec::new();
                let result = service
                    .send_prompt("poe", "hi", "", "m", &mut |c: &str| out.push(c.to_string()))
                    .await;
                (result, out)
            })
        };

        started.notified().await;
        assert!(service.is_generating());
        service.stop_generation();
        service.stop_generation();

        let (result, out) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(out, vec!["first"]);
        assert!(!service.is_generating());
    }

    #[test]
    fn test_finishing_older_call_keeps_newer_handle() {
        let service = AiService::new();
        let older = service.install(CancellationToken::new());
        let newer_token = CancellationToken::new();
        let newer = service.install(newer_token.clone());

        drop(older);
        assert!(service.is_generating());

        service.stop_generation();
        assert!(newer_token.is_cancelled());
        drop(newer);
        assert!(!service.is_generating());
    }

    #[tokio::test]
    async fn test_dropped_future_releases_slot() {
        let service = AiService::new();
        let provider = ScriptedProvider::new("poe", vec![]).holding();
        service.register_provider(Arc::new(provider));

        let mut sink = |_: &str| {};
        let call = service.send_prompt("poe", "hi", "", "m", &mut sink);
        let timed_out = tokio::time::timeout(Duration::from_millis(20), call).await;

        assert!(timed_out.is_err());
        assert!(!service.is_generating());
    }

    #[tokio::test]
    async fn test_per_call_cancel_bypasses_slot() {
        let service = AiService::new();
        service.register_provider(Arc::new(ScriptedProvider::new("poe", vec!["x"])));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        service
            .send_prompt_with_cancel("poe", "hi", "", "m", &mut |c: &str| out.push(c.to_string()), &cancel)
            .await
            .unwrap();

        assert!(out.is_empty());
        assert!(!service.is_generating());
    }

    #[test]
    fn test_from_config_registers_enabled_providers() {
        let mut config = AiConfig::default();
        let service = AiService::from_config(&config);
        assert_eq!(service.provider_names(), vec!["ollama"]);

        config.hosted.api_key = Some("k".into());
        config.hosted.name = "poe-compatible".into();
        config.ollama.enabled = false;
        let service = AiService::from_config(&config);
        assert_eq!(service.provider_names(), vec!["poe-compatible"]);
    }
}
