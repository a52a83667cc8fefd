use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use hotprompt_llm::{ProviderCredentials, ProviderKind, default_model_id};
use serde::{Deserialize, Serialize};

use crate::dispatcher::CredentialSource;
use crate::error::SettingsResult;
use crate::persist::{default_config_dir, write_json_atomically};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "HOTPROMPT_";
pub const DEFAULT_SHORTCUT: &str = "CommandOrControl+Shift+Space";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default)]
    pub theme: ThemePreference,
    #[serde(default)]
    pub launch_at_login: bool,
    #[serde(default = "default_true")]
    pub show_in_dock: bool,
    #[serde(default = "default_shortcut")]
    pub shortcut: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            theme: ThemePreference::default(),
            launch_at_login: false,
            show_in_dock: true,
            shortcut: default_shortcut(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model used when a prompt leaves its model blank.
    #[serde(default)]
    pub model: String,
}

impl ProviderSettings {
    fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.base_url = self
            .base_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        self.model = self.model.trim().to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub anthropic: ProviderSettings,
    /// Seconds without a stream item before the request fails; 0 disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub request_idle_timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            openai: ProviderSettings::default(),
            anthropic: ProviderSettings::default(),
            request_idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl AiSettings {
    pub fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.request_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.request_idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub ai: AiSettings,
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        if self.general.shortcut.trim().is_empty() {
            self.general.shortcut = default_shortcut();
        } else {
            self.general.shortcut = self.general.shortcut.trim().to_string();
        }
        if self.general.language.trim().is_empty() {
            self.general.language = default_language();
        }
        self.ai.openai = self.ai.openai.normalized();
        self.ai.anthropic = self.ai.anthropic.normalized();
        self
    }

    pub fn credentials(&self, kind: ProviderKind) -> Option<ProviderCredentials> {
        let provider = self.ai.provider(kind);
        if !provider.has_api_key() {
            return None;
        }

        let mut credentials = ProviderCredentials::new(&provider.api_key);
        if let Some(base_url) = &provider.base_url {
            credentials = credentials.with_base_url(base_url);
        }
        Some(credentials)
    }

    /// Settings-level model for `kind`, falling back to the provider default.
    pub fn model_for(&self, kind: ProviderKind) -> String {
        let model = self.ai.provider(kind).model.trim();
        if model.is_empty() {
            default_model_id(kind).to_string()
        } else {
            model.to_string()
        }
    }
}

/// Persistent settings held behind a lock-free snapshot.
pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_path() -> PathBuf {
        default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    /// In-memory store that never touched disk; used by tests and dry runs.
    pub fn with_settings(settings: Settings, config_path: PathBuf) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings.normalized())),
            config_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> SettingsResult<()> {
        let normalized_settings = settings.normalized();
        write_json_atomically(&self.config_path, &normalized_settings, "settings")?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    pub fn set_api_key(&self, kind: ProviderKind, api_key: &str) -> SettingsResult<()> {
        let mut settings = Settings::clone(&self.settings());
        settings.ai.provider_mut(kind).api_key = api_key.to_string();
        self.update(settings)
    }

    fn load_from_disk(path: &Path) -> Settings {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        }
    }
}

impl CredentialSource for SettingsStore {
    fn credentials(&self, kind: ProviderKind) -> Option<ProviderCredentials> {
        self.settings.load().credentials(kind)
    }

    fn idle_timeout(&self) -> Option<Duration> {
        self.settings.load().ai.idle_timeout()
    }
}

fn default_true() -> bool {
    true
}

fn default_shortcut() -> String {
    DEFAULT_SHORTCUT.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}
