use super::provider::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

pub fn default_model_id(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
        ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
    }
}

/// Falls back to the provider default when no model was configured.
pub fn resolve_model_id(kind: ProviderKind, requested: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        default_model_id(kind).to_string()
    } else {
        requested.to_string()
    }
}

pub fn default_models(kind: ProviderKind) -> Vec<Model> {
    match kind {
        ProviderKind::OpenAi => vec![
            Model::from_id("gpt-4o-mini").with_description("Balanced cost/performance default"),
            Model::from_id("gpt-4o").with_description("High quality general model"),
            Model::from_id("gpt-4.1").with_description("Reasoning-forward GPT-4.1"),
            Model::from_id("o3").with_description("Advanced reasoning model"),
        ],
        ProviderKind::Anthropic => vec![
            Model::from_id("claude-3-5-haiku-latest").with_description("Fast, low-cost default"),
            Model::from_id("claude-3-7-sonnet-latest").with_description("Balanced Sonnet model"),
            Model::from_id("claude-sonnet-4-0").with_description("Current Sonnet generation"),
            Model::from_id("claude-opus-4-0").with_description("Highest quality Claude model"),
        ],
    }
}
