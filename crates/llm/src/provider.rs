use std::fmt;
use std::future::Future;
use std::ops::AddAssign;
use std::pin::Pin;
use std::str::FromStr;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Closed set of provider backends a request can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];

    pub fn tag(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Resolves a stored provider tag. Blank tags fall back to OpenAI.
    pub fn parse_tag(raw: &str) -> ProviderResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "openai" | "rig-openai" => Ok(Self::OpenAi),
            "anthropic" | "rig-anthropic" => Ok(Self::Anthropic),
            _ => UnsupportedProviderSnafu {
                stage: "parse-provider-tag",
                provider_id: raw.trim().to_string(),
            }
            .fail(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.tag())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(raw: &str) -> ProviderResult<Self> {
        Self::parse_tag(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl ProviderCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim().to_string();
        self.base_url = if base_url.is_empty() {
            None
        } else {
            Some(base_url)
        };
        self
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Token counters reported by a provider for one or more responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// USD per prompt token used for the running cost estimate.
pub const COST_PER_PROMPT_TOKEN: f64 = 0.005 / 1000.0;
/// USD per completion token used for the running cost estimate.
pub const COST_PER_COMPLETION_TOKEN: f64 = 0.015 / 1000.0;

impl TokenUsage {
    pub const fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.prompt_tokens == 0 && self.completion_tokens == 0
    }

    /// Rejects counters whose total cannot cover its parts.
    pub fn validated(self) -> ProviderResult<Self> {
        let parts = self.prompt_tokens.saturating_add(self.completion_tokens);
        if self.total_tokens < parts {
            return MalformedUsageSnafu {
                stage: "validate-usage",
                details: format!(
                    "total_tokens={} is smaller than prompt_tokens + completion_tokens={}",
                    self.total_tokens, parts
                ),
            }
            .fail();
        }
        Ok(self)
    }

    /// Returns the estimated cost in USD, or `None` when nothing was used.
    pub fn estimated_cost(&self) -> Option<f64> {
        if self.total_tokens == 0 {
            return None;
        }
        Some(
            self.prompt_tokens as f64 * COST_PER_PROMPT_TOKEN
                + self.completion_tokens as f64 * COST_PER_COMPLETION_TOKEN,
        )
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    /// Output budget; adapters fill in a vendor default when one is required.
    pub max_tokens: Option<u64>,
}

impl CompletionRequest {
    pub fn new(model_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model_id: model_id.into().trim().to_string(),
            messages,
            max_tokens: None,
        }
    }
}

/// One item of a provider completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    Text(String),
    Usage(TokenUsage),
    Finished { finish_reason: String },
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type CompletionStream = BoxStream<'static, ProviderResult<CompletionChunk>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("completion request for model '{model_id}' has no messages"))]
    EmptyMessageSet {
        stage: &'static str,
        model_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("provider reported malformed usage data: {details}"))]
    MalformedUsage {
        stage: &'static str,
        details: String,
    },
}

impl ProviderError {
    /// True for failures the user fixes in settings rather than by retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey { .. } | Self::UnsupportedProvider { .. }
        )
    }
}

/// Uniform streaming-completion capability implemented once per provider.
pub trait StreamChat: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;

    /// Opens a lazy completion stream. Dropping the stream aborts the upstream request.
    fn stream_chat<'a>(
        &'a self,
        credentials: &'a ProviderCredentials,
        request: CompletionRequest,
    ) -> BoxFuture<'a, ProviderResult<CompletionStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tags_resolve_to_closed_set() {
        assert_eq!(ProviderKind::parse_tag("openai").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::parse_tag(" Anthropic ").unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::parse_tag("").unwrap(), ProviderKind::OpenAi);

        let error = ProviderKind::parse_tag("gemini").unwrap_err();
        assert!(matches!(error, ProviderError::UnsupportedProvider { .. }));
        assert!(error.is_configuration());
        assert_eq!(error.to_string(), "provider 'gemini' is not supported");
    }

    #[test]
    fn usage_adds_component_wise() {
        let mut usage = TokenUsage::new(10, 5, 15);
        usage += TokenUsage::new(2, 1, 3);
        assert_eq!(usage, TokenUsage::new(12, 6, 18));
    }

    #[test]
    fn usage_with_short_total_is_malformed() {
        assert!(TokenUsage::new(5, 3, 8).validated().is_ok());
        assert!(matches!(
            TokenUsage::new(5, 3, 2).validated(),
            Err(ProviderError::MalformedUsage { .. })
        ));
    }

    #[test]
    fn cost_estimate_skips_empty_usage() {
        assert_eq!(TokenUsage::default().estimated_cost(), None);

        let cost = TokenUsage::new(1000, 1000, 2000).estimated_cost().unwrap();
        assert!((cost - 0.02).abs() < 1e-9);
    }

    #[test]
    fn blank_base_url_is_dropped() {
        let credentials = ProviderCredentials::new(" sk-test ").with_base_url("  ");
        assert_eq!(credentials.api_key, "sk-test");
        assert_eq!(credentials.base_url, None);
    }

    #[test]
    fn chat_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }
}
