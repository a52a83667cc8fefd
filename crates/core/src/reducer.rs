use std::sync::Arc;

use hotprompt_llm::{ChatMessage, Role, TokenUsage};

use crate::dispatcher::Dispatch;
use crate::events::StreamEvent;
use crate::ids::CorrelationId;

/// Observable effect of folding one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Event belonged to a stale or cancelled request.
    Ignored,
    /// Transcript or usage changed; the stream is still running.
    Updated,
    /// `End` arrived; the view should show the result.
    Completed,
    /// `Error` arrived; partial output stays visible.
    Failed,
}

/// Client-side fold of the event stream into a transcript and running usage.
pub struct LlmSession {
    dispatcher: Arc<dyn Dispatch>,
    messages: Vec<ChatMessage>,
    usage: TokenUsage,
    is_loading: bool,
    current_request: Option<CorrelationId>,
    last_error: Option<String>,
}

impl LlmSession {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self {
            dispatcher,
            messages: Vec::new(),
            usage: TokenUsage::default(),
            is_loading: false,
            current_request: None,
            last_error: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn current_request(&self) -> Option<CorrelationId> {
        self.current_request
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Text of the newest assistant message, which is what the result view shows.
    pub fn latest_response(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.content.as_str())
    }

    /// Starts a fresh cycle with exactly one user message.
    pub fn submit(&mut self, provider: &str, model: &str, content: impl Into<String>) -> CorrelationId {
        self.cancel_in_flight();
        self.messages = vec![ChatMessage::user(content)];
        self.usage = TokenUsage::default();
        self.last_error = None;
        self.start(provider, model)
    }

    /// Continues the transcript with one more user message.
    pub fn adjust(&mut self, provider: &str, model: &str, content: impl Into<String>) -> CorrelationId {
        self.cancel_in_flight();
        self.messages.push(ChatMessage::user(content));
        self.last_error = None;
        self.start(provider, model)
    }

    /// Cancels the active request, if any. Local state settles immediately.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.cancel_in_flight();
        self.is_loading = false;
        cancelled
    }

    pub fn clear(&mut self) {
        self.cancel_in_flight();
        self.messages.clear();
        self.usage = TokenUsage::default();
        self.is_loading = false;
        self.last_error = None;
    }

    pub fn apply(&mut self, event: StreamEvent) -> Reduction {
        let correlation_id = event.correlation_id();
        if self.current_request != Some(correlation_id) {
            tracing::trace!(correlation_id = %correlation_id, "ignoring event for inactive request");
            return Reduction::Ignored;
        }

        match event {
            StreamEvent::Chunk { text, .. } => {
                self.append_chunk(&text);
                Reduction::Updated
            }
            StreamEvent::Usage { usage, .. } => {
                self.usage += usage;
                Reduction::Updated
            }
            StreamEvent::Error { message, .. } => {
                self.last_error = Some(message);
                self.is_loading = false;
                self.current_request = None;
                Reduction::Failed
            }
            StreamEvent::End { .. } => {
                self.is_loading = false;
                self.current_request = None;
                Reduction::Completed
            }
        }
    }

    fn append_chunk(&mut self, text: &str) {
        match self.messages.last_mut() {
            Some(message) if message.role == Role::Assistant => message.content.push_str(text),
            _ => self.messages.push(ChatMessage::assistant(text)),
        }
    }

    fn start(&mut self, provider: &str, model: &str) -> CorrelationId {
        self.is_loading = true;
        let correlation_id = self
            .dispatcher
            .dispatch(provider, model, self.messages.clone());
        self.current_request = Some(correlation_id);
        correlation_id
    }

    fn cancel_in_flight(&mut self) -> bool {
        let Some(correlation_id) = self.current_request.take() else {
            return false;
        };
        self.dispatcher.cancel(correlation_id);
        true
    }
}
