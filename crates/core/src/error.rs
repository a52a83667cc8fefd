use std::path::PathBuf;
use std::time::Duration;

use hotprompt_llm::{ProviderError, ProviderKind};
use snafu::Snafu;

use crate::ids::PromptId;

/// Failures of one dispatched request. Each becomes exactly one `Error` event.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DispatchError {
    #[snafu(display("API key not found for {provider}. Please set it in Settings > AI."))]
    Configuration {
        stage: &'static str,
        provider: ProviderKind,
    },
    #[snafu(display("{source}"))]
    UnsupportedProvider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("{source}"))]
    Transport {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("provider stream was idle for {timeout:?}"))]
    IdleTimeout {
        stage: &'static str,
        timeout: Duration,
    },
}

impl DispatchError {
    /// Configuration failures are actionable in settings and never retried.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::UnsupportedProvider { .. } => true,
            Self::Transport { source, .. } => source.is_configuration(),
            Self::IdleTimeout { .. } => false,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize {what} on `{stage}`: {source}"))]
    Serialize {
        stage: &'static str,
        what: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace {to:?} with {from:?} on `{stage}`: {source}"))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PromptError {
    #[snafu(display("prompt '{id}' was not found"))]
    NotFound { stage: &'static str, id: PromptId },
    #[snafu(display("prompt name must not be blank"))]
    BlankName { stage: &'static str },
    #[snafu(display("failed to persist prompts: {source}"))]
    Persist {
        stage: &'static str,
        source: SettingsError,
    },
}

pub type DispatchResult<T> = Result<T, DispatchError>;
pub type SettingsResult<T> = Result<T, SettingsError>;
pub type PromptResult<T> = Result<T, PromptError>;
