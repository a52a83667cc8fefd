use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use hotprompt_llm::{
    ChatMessage, CompletionChunk, CompletionRequest, ProviderCredentials, ProviderError,
    ProviderKind, STOP_FINISH_REASON, StreamChat, create_adapter,
};
use snafu::{OptionExt, ResultExt};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::{
    ConfigurationSnafu, DispatchError, DispatchResult, IdleTimeoutSnafu, TransportSnafu,
    UnsupportedProviderSnafu,
};
use crate::events::{EventSink, EventSubscription, StreamEvent};
use crate::ids::CorrelationId;
use crate::registry::CancellationRegistry;

/// Read-only view of the settings the dispatcher needs.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, kind: ProviderKind) -> Option<ProviderCredentials>;

    /// Maximum wait for the next stream item; `None` waits forever.
    fn idle_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Submit/cancel surface the response reducer drives.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, provider: &str, model: &str, messages: Vec<ChatMessage>) -> CorrelationId;
    fn cancel(&self, id: CorrelationId) -> bool;
}

/// Provider adapters keyed by provider kind.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<ProviderKind, Arc<dyn StreamChat>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One rig-backed adapter per supported provider.
    pub fn production() -> Self {
        ProviderKind::ALL
            .into_iter()
            .fold(Self::new(), |set, kind| set.with(create_adapter(kind)))
    }

    pub fn with(mut self, adapter: Arc<dyn StreamChat>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn StreamChat>> {
        self.adapters.get(&kind).cloned()
    }
}

/// One logical request, fixed once its stream starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub correlation_id: CorrelationId,
    pub provider: ProviderKind,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

struct DispatcherInner {
    credentials: Arc<dyn CredentialSource>,
    adapters: AdapterSet,
    registry: Arc<CancellationRegistry>,
    sink: EventSink,
}

/// Runs one request/stream/respond cycle per `dispatch` on the Tokio runtime.
#[derive(Clone)]
pub struct RequestDispatcher {
    inner: Arc<DispatcherInner>,
    runtime: Handle,
}

impl RequestDispatcher {
    pub fn new(
        runtime: Handle,
        credentials: Arc<dyn CredentialSource>,
        adapters: AdapterSet,
        sink: EventSink,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                credentials,
                adapters,
                registry: Arc::new(CancellationRegistry::new()),
                sink,
            }),
            runtime,
        }
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.inner.sink.subscribe()
    }

    async fn run_request(
        inner: Arc<DispatcherInner>,
        correlation_id: CorrelationId,
        provider: String,
        model: String,
        messages: Vec<ChatMessage>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = &mut cancel_rx => None,
            outcome = inner.drive(correlation_id, &provider, model, messages) => Some(outcome),
        };

        match outcome {
            None => {
                // Dropping the drive future dropped the provider stream with it.
                tracing::debug!(correlation_id = %correlation_id, "request cancelled; stream dropped");
            }
            Some(Ok(finish_reason)) => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    finish_reason = %finish_reason,
                    "request finished"
                );
                inner.finish(StreamEvent::End {
                    correlation_id,
                    finish_reason,
                });
            }
            Some(Err(error)) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    configuration = error.is_configuration(),
                    error = %error,
                    "request failed"
                );
                inner.finish(StreamEvent::Error {
                    correlation_id,
                    message: error.to_string(),
                });
            }
        }
    }
}

impl Dispatch for RequestDispatcher {
    /// Registers a fresh correlation id and starts streaming in the background.
    fn dispatch(&self, provider: &str, model: &str, messages: Vec<ChatMessage>) -> CorrelationId {
        let correlation_id = CorrelationId::new_v4();
        let (abort_handle, cancel_rx) = oneshot::channel();
        self.inner.registry.register(correlation_id, abort_handle);

        tracing::debug!(
            correlation_id = %correlation_id,
            provider,
            model,
            message_count = messages.len(),
            "dispatching request"
        );

        self.runtime.spawn(Self::run_request(
            self.inner.clone(),
            correlation_id,
            provider.to_string(),
            model.to_string(),
            messages,
            cancel_rx,
        ));

        correlation_id
    }

    fn cancel(&self, id: CorrelationId) -> bool {
        self.inner.registry.cancel(id)
    }
}

impl DispatcherInner {
    fn resolve(
        &self,
        correlation_id: CorrelationId,
        provider: &str,
        model: String,
        messages: Vec<ChatMessage>,
    ) -> DispatchResult<(RequestDescriptor, ProviderCredentials, Arc<dyn StreamChat>)> {
        let kind = ProviderKind::parse_tag(provider).context(UnsupportedProviderSnafu {
            stage: "resolve-provider",
        })?;

        let credentials = self
            .credentials
            .credentials(kind)
            .filter(|credentials| !credentials.api_key.is_empty())
            .context(ConfigurationSnafu {
                stage: "resolve-credentials",
                provider: kind,
            })?;

        let adapter = self
            .adapters
            .get(kind)
            .ok_or_else(|| DispatchError::UnsupportedProvider {
                stage: "select-adapter",
                source: ProviderError::UnsupportedProvider {
                    stage: "select-adapter",
                    provider_id: kind.tag().to_string(),
                },
            })?;

        let descriptor = RequestDescriptor {
            correlation_id,
            provider: kind,
            model,
            messages,
        };
        Ok((descriptor, credentials, adapter))
    }

    async fn drive(
        &self,
        correlation_id: CorrelationId,
        provider: &str,
        model: String,
        messages: Vec<ChatMessage>,
    ) -> DispatchResult<String> {
        let (descriptor, credentials, adapter) =
            self.resolve(correlation_id, provider, model, messages)?;
        let idle_timeout = self.credentials.idle_timeout();

        let request = CompletionRequest::new(descriptor.model.clone(), descriptor.messages.clone());
        let mut stream = with_idle_timeout(idle_timeout, adapter.stream_chat(&credentials, request))
            .await?
            .context(TransportSnafu {
                stage: "open-stream",
            })?;

        let mut finish_reason = None;
        while let Some(item) = with_idle_timeout(idle_timeout, stream.next()).await? {
            match item.context(TransportSnafu {
                stage: "stream-chunk",
            })? {
                CompletionChunk::Text(text) => {
                    self.emit(StreamEvent::Chunk {
                        correlation_id,
                        text,
                    });
                }
                CompletionChunk::Usage(usage) if usage.is_empty() => {
                    tracing::trace!(correlation_id = %correlation_id, "skipping empty usage report");
                }
                CompletionChunk::Usage(usage) => match usage.validated() {
                    Ok(usage) => {
                        self.emit(StreamEvent::Usage {
                            correlation_id,
                            usage,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(
                            correlation_id = %correlation_id,
                            error = %error,
                            "skipping malformed usage data"
                        );
                    }
                },
                CompletionChunk::Finished {
                    finish_reason: reason,
                } => finish_reason = Some(reason),
            }
        }

        Ok(finish_reason.unwrap_or_else(|| STOP_FINISH_REASON.to_string()))
    }

    fn emit(&self, event: StreamEvent) -> bool {
        let correlation_id = event.correlation_id();
        self.registry
            .emit_if_live(correlation_id, || self.sink.send(event))
    }

    fn finish(&self, event: StreamEvent) {
        let correlation_id = event.correlation_id();
        if !self.registry.finish(correlation_id, || self.sink.send(event)) {
            tracing::debug!(
                correlation_id = %correlation_id,
                "terminal event suppressed; request was cancelled"
            );
        }
    }
}

async fn with_idle_timeout<F>(limit: Option<Duration>, future: F) -> DispatchResult<F::Output>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| {
            IdleTimeoutSnafu {
                stage: "await-stream-item",
                timeout: limit,
            }
            .build()
        }),
        None => Ok(future.await),
    }
}
