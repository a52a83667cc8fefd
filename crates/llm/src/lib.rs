use std::sync::Arc;

mod model;
mod provider;
mod rig_adapter;

pub use model::{
    DEFAULT_ANTHROPIC_MODEL, DEFAULT_OPENAI_MODEL, Model, default_model_id, default_models,
    resolve_model_id,
};
pub use provider::{
    BoxFuture, COST_PER_COMPLETION_TOKEN, COST_PER_PROMPT_TOKEN, ChatMessage, CompletionChunk,
    CompletionRequest, CompletionStream, ProviderCredentials, ProviderError, ProviderKind,
    ProviderResult, Role, StreamChat, TokenUsage,
};
pub use rig_adapter::{
    ANTHROPIC_DEFAULT_MAX_TOKENS, RigAnthropicAdapter, RigOpenAiAdapter, STOP_FINISH_REASON,
};

/// Builds the production adapter for one provider.
pub fn create_adapter(kind: ProviderKind) -> Arc<dyn StreamChat> {
    match kind {
        ProviderKind::OpenAi => Arc::new(RigOpenAiAdapter),
        ProviderKind::Anthropic => Arc::new(RigAnthropicAdapter),
    }
}
