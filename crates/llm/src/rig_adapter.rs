use futures::{StreamExt, future, stream};
use rig::completion::{CompletionError, CompletionModel, GetTokenUsage, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::{anthropic, openai};
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};

use super::model::resolve_model_id;
use super::provider::{
    BoxFuture, ChatMessage, CompletionChunk, CompletionRequest, CompletionStream,
    CompletionsFailedSnafu, EmptyMessageSetSnafu, HttpClientSnafu, MissingApiKeySnafu,
    ProviderCredentials, ProviderError, ProviderKind, ProviderResult, Role, StreamChat,
    TokenUsage,
};

/// Anthropic rejects requests without an explicit output budget.
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u64 = 4096;

/// Rig does not surface a vendor finish reason on its streaming API.
pub const STOP_FINISH_REASON: &str = "stop";

#[derive(Debug, Default, Clone, Copy)]
pub struct RigOpenAiAdapter;

#[derive(Debug, Default, Clone, Copy)]
pub struct RigAnthropicAdapter;

fn ensure_credentials(
    kind: ProviderKind,
    credentials: &ProviderCredentials,
    request: &CompletionRequest,
) -> ProviderResult<()> {
    ensure!(
        !credentials.api_key.trim().is_empty(),
        MissingApiKeySnafu {
            stage: "rig-adapter-credentials",
            provider_id: kind.tag(),
        }
    );
    ensure!(
        !request.messages.is_empty(),
        EmptyMessageSetSnafu {
            stage: "rig-adapter-messages",
            model_id: request.model_id.clone(),
        }
    );
    Ok(())
}

fn to_rig_message(message: &ChatMessage) -> RigMessage {
    match message.role {
        Role::User => RigMessage::user(message.content.clone()),
        Role::Assistant => RigMessage::assistant(message.content.clone()),
    }
}

fn map_stream_item<R>(
    item: Result<StreamedAssistantContent<R>, CompletionError>,
) -> Option<ProviderResult<CompletionChunk>>
where
    R: Clone + Unpin + GetTokenUsage,
{
    match item {
        Ok(StreamedAssistantContent::Text(text)) => {
            if text.text.is_empty() {
                return None;
            }
            Some(Ok(CompletionChunk::Text(text.text)))
        }
        Ok(StreamedAssistantContent::Final(response)) => {
            let usage = response.token_usage()?;
            Some(Ok(CompletionChunk::Usage(TokenUsage::new(
                usage.input_tokens,
                usage.output_tokens,
                usage.total_tokens,
            ))))
        }
        // Reasoning and tool-call content never reaches the transcript.
        Ok(_) => None,
        Err(source) => Some(Err(ProviderError::CompletionsFailed {
            stage: "stream-chunk",
            source,
        })),
    }
}

async fn open_stream<M>(model: M, request: CompletionRequest) -> ProviderResult<CompletionStream>
where
    M: CompletionModel + 'static,
    M::StreamingResponse: GetTokenUsage + Send + 'static,
{
    let mut messages = request
        .messages
        .iter()
        .map(to_rig_message)
        .collect::<Vec<_>>();

    let Some(prompt) = messages.pop() else {
        return EmptyMessageSetSnafu {
            stage: "open-stream-pop-prompt",
            model_id: request.model_id,
        }
        .fail();
    };

    let mut builder = model.completion_request(prompt).messages(messages);
    if let Some(max_tokens) = request.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }

    let response = builder.stream().await.context(CompletionsFailedSnafu {
        stage: "open-stream",
    })?;

    let finished = stream::once(future::ready(Ok(CompletionChunk::Finished {
        finish_reason: STOP_FINISH_REASON.to_string(),
    })));

    Ok(response
        .filter_map(|item| future::ready(map_stream_item(item)))
        .chain(finished)
        .boxed())
}

impl RigOpenAiAdapter {
    fn build_client(credentials: &ProviderCredentials) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(credentials.api_key.as_str());
        if let Some(base_url) = credentials.base_url.as_deref() {
            builder = builder.base_url(base_url);
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-openai-client",
        })
    }
}

impl StreamChat for RigOpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn name(&self) -> &str {
        "Rig OpenAI"
    }

    fn default_model(&self) -> &str {
        super::model::DEFAULT_OPENAI_MODEL
    }

    fn stream_chat<'a>(
        &'a self,
        credentials: &'a ProviderCredentials,
        mut request: CompletionRequest,
    ) -> BoxFuture<'a, ProviderResult<CompletionStream>> {
        Box::pin(async move {
            ensure_credentials(self.kind(), credentials, &request)?;
            request.model_id = resolve_model_id(self.kind(), &request.model_id);

            let client = Self::build_client(credentials)?;
            tracing::debug!(
                provider = %self.kind(),
                model_id = %request.model_id,
                message_count = request.messages.len(),
                "opening provider stream"
            );
            open_stream(client.completion_model(request.model_id.clone()), request).await
        })
    }
}

impl RigAnthropicAdapter {
    fn build_client(credentials: &ProviderCredentials) -> ProviderResult<anthropic::Client> {
        let mut builder = anthropic::Client::builder().api_key(credentials.api_key.as_str());
        if let Some(base_url) = credentials.base_url.as_deref() {
            builder = builder.base_url(base_url);
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-anthropic-client",
        })
    }
}

impl StreamChat for RigAnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn name(&self) -> &str {
        "Rig Anthropic"
    }

    fn default_model(&self) -> &str {
        super::model::DEFAULT_ANTHROPIC_MODEL
    }

    fn stream_chat<'a>(
        &'a self,
        credentials: &'a ProviderCredentials,
        mut request: CompletionRequest,
    ) -> BoxFuture<'a, ProviderResult<CompletionStream>> {
        Box::pin(async move {
            ensure_credentials(self.kind(), credentials, &request)?;
            request.model_id = resolve_model_id(self.kind(), &request.model_id);
            request.max_tokens.get_or_insert(ANTHROPIC_DEFAULT_MAX_TOKENS);

            let client = Self::build_client(credentials)?;
            tracing::debug!(
                provider = %self.kind(),
                model_id = %request.model_id,
                message_count = request.messages.len(),
                "opening provider stream"
            );
            open_stream(client.completion_model(request.model_id.clone()), request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest::new("", vec![ChatMessage::user("hello")])
    }

    #[test]
    fn missing_key_fails_before_any_network_call() {
        let credentials = ProviderCredentials::new("  ");

        let error = block_on(RigOpenAiAdapter.stream_chat(&credentials, request()))
            .err()
            .expect("empty key must be rejected");
        assert!(matches!(error, ProviderError::MissingApiKey { .. }));
        assert!(error.is_configuration());

        let error = block_on(RigAnthropicAdapter.stream_chat(&credentials, request()))
            .err()
            .expect("empty key must be rejected");
        assert_eq!(error.to_string(), "missing API key for provider 'anthropic'");
    }

    #[test]
    fn empty_message_set_is_rejected() {
        let credentials = ProviderCredentials::new("sk-test");
        let error = block_on(
            RigOpenAiAdapter.stream_chat(&credentials, CompletionRequest::new("m1", Vec::new())),
        )
        .err()
        .expect("empty message set must be rejected");
        assert!(matches!(error, ProviderError::EmptyMessageSet { .. }));
    }
}
