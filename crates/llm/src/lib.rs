//! Provider seam between the chat session and a streaming text-generation backend.

use std::sync::Arc;

mod event;
mod provider;
mod rig_adapter;

pub use event::{StreamEventMapped, StreamEventPayload, StreamSessionId, StreamTarget};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderResult,
    ProviderStreamHandle, ProviderWorker, StreamRequest, make_event_stream,
};
pub use rig_adapter::{DEFAULT_OPENAI_MODEL, RIG_OPENAI_PROVIDER_ID, RigProviderAdapter};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_provider_id_defaults_to_openai() {
        let provider = create_provider(ProviderConfig::new("", "sk-test", "")).unwrap();
        assert_eq!(provider.id(), RIG_OPENAI_PROVIDER_ID);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = create_provider(ProviderConfig::new("mystery", "sk-test", ""));
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider { provider_id, .. }) if provider_id == "mystery"
        ));
    }
}
