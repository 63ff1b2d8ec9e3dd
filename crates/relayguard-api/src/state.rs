//! Shared application state for the HTTP layer.

use std::sync::Arc;

use relayguard_core::pipeline::{ChatPipeline, PipelineOptions};
use relayguard_core::session::SessionStore;
use relayguard_infra::guard::GuardClient;
use relayguard_infra::llm::CompletionClient;
use relayguard_types::config::RelayConfig;

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub pipeline: Arc<ChatPipeline<GuardClient, CompletionClient>>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    /// Wire up the store, upstream clients, and pipeline.
    pub fn init(config: RelayConfig) -> anyhow::Result<Self> {
        if config.guard_api_key.is_none() {
            tracing::error!(
                "RELAYGUARD_GUARD_API_KEY is not set; screening requests will be sent unauthenticated"
            );
        }

        let config = Arc::new(config);
        let store = Arc::new(SessionStore::new());
        let screener = Arc::new(GuardClient::new(Arc::clone(&config))?);
        let completer = Arc::new(CompletionClient::new(Arc::clone(&config))?);
        let options = PipelineOptions {
            input_fail_policy: config.input_fail_policy,
            output_fail_policy: config.output_fail_policy,
            pacing_delay: config.pacing_delay,
        };
        let pipeline = Arc::new(ChatPipeline::new(
            Arc::clone(&store),
            screener,
            completer,
            options,
        ));

        Ok(Self {
            store,
            pipeline,
            config,
        })
    }
}
