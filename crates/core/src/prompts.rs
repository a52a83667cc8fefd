use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use hotprompt_llm::{DEFAULT_OPENAI_MODEL, ProviderKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, ensure};

use crate::error::{BlankNameSnafu, NotFoundSnafu, PersistSnafu, PromptResult};
use crate::ids::PromptId;
use crate::persist::{default_config_dir, write_json_atomically};

pub const PROMPTS_FILE_NAME: &str = "prompts.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderKind {
    #[default]
    Text,
    Textarea,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub id: String,
    /// Token name used as `{{name}}` in the template.
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub kind: PlaceholderKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Placeholder {
    pub fn text(id: impl Into<String>, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label: label.into(),
            kind: PlaceholderKind::Text,
            options: Vec::new(),
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn default_or_empty(&self) -> &str {
        self.default_value.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template: String,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    /// Provider tag as the dispatcher expects it (`openai`, `anthropic`).
    pub ai_provider: String,
    /// Blank means the settings model for the provider.
    #[serde(default)]
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    /// Form values seeded from placeholder defaults.
    pub fn initial_values(&self) -> HashMap<String, String> {
        self.placeholders
            .iter()
            .map(|placeholder| {
                (
                    placeholder.name.clone(),
                    placeholder.default_or_empty().to_string(),
                )
            })
            .collect()
    }

    pub fn render(&self, values: &HashMap<String, String>) -> String {
        render_template(&self.template, &self.placeholders, values)
    }
}

/// Fields a caller supplies for a new prompt; id and timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrompt {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template: String,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    pub ai_provider: String,
    #[serde(default)]
    pub model: String,
}

/// Replaces every `{{name}}` with its value.
///
/// Declared placeholders missing from `values` use their default. Tokens that
/// match no placeholder and no value are left as written.
pub fn render_template(
    template: &str,
    placeholders: &[Placeholder],
    values: &HashMap<String, String>,
) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };

        rendered.push_str(&rest[..open]);
        let token = &after_open[..close];
        let name = token.trim();

        let replacement = values.get(name).map(String::as_str).or_else(|| {
            placeholders
                .iter()
                .find(|placeholder| placeholder.name == name)
                .map(Placeholder::default_or_empty)
        });
        match replacement {
            Some(value) => rendered.push_str(value),
            None => {
                rendered.push_str("{{");
                rendered.push_str(token);
                rendered.push_str("}}");
            }
        }

        rest = &after_open[close + 2..];
    }

    rendered.push_str(rest);
    rendered
}

/// Distinct `{{name}}` tokens in order of first appearance.
pub fn placeholder_names(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };
        let name = after_open[..close].trim();
        if !name.is_empty() && !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
        rest = &after_open[close + 2..];
    }
    names
}

pub fn default_prompts() -> Vec<Prompt> {
    let now = Utc::now();
    vec![Prompt {
        id: PromptId::new_v4(),
        name: "Translate".to_string(),
        description: "Translate text to a specified language.".to_string(),
        template: "Translate the following text to {{language}}: {{text}}".to_string(),
        placeholders: vec![
            Placeholder::text("language", "language", "Language").with_default("Japanese"),
            Placeholder {
                kind: PlaceholderKind::Textarea,
                ..Placeholder::text("text", "text", "Text")
            },
        ],
        ai_provider: ProviderKind::OpenAi.tag().to_string(),
        model: DEFAULT_OPENAI_MODEL.to_string(),
        created_at: now,
        updated_at: now,
    }]
}

/// Saved prompt templates backed by a JSON file.
pub struct PromptStore {
    prompts: ArcSwap<Vec<Prompt>>,
    // Serializes read-modify-write cycles; readers go through the snapshot.
    write_lock: Mutex<()>,
    path: PathBuf,
}

impl PromptStore {
    pub fn default_path() -> PathBuf {
        default_config_dir().join(PROMPTS_FILE_NAME)
    }

    pub fn new(path: PathBuf) -> Self {
        let prompts = Self::load_from_disk(&path);
        Self::with_prompts(prompts, path)
    }

    pub fn load() -> Self {
        Self::new(Self::default_path())
    }

    pub fn with_prompts(prompts: Vec<Prompt>, path: PathBuf) -> Self {
        Self {
            prompts: ArcSwap::from_pointee(prompts),
            write_lock: Mutex::new(()),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Arc<Vec<Prompt>> {
        self.prompts.load_full()
    }

    pub fn get(&self, id: PromptId) -> PromptResult<Prompt> {
        self.prompts
            .load()
            .iter()
            .find(|prompt| prompt.id == id)
            .cloned()
            .context(NotFoundSnafu {
                stage: "get-prompt",
                id,
            })
    }

    /// Looks a prompt up by id, then by case-insensitive name.
    pub fn find(&self, key: &str) -> Option<Prompt> {
        let prompts = self.prompts.load();
        if let Ok(id) = PromptId::parse(key)
            && let Some(prompt) = prompts.iter().find(|prompt| prompt.id == id)
        {
            return Some(prompt.clone());
        }

        let key = key.trim();
        prompts
            .iter()
            .find(|prompt| prompt.name.eq_ignore_ascii_case(key))
            .cloned()
    }

    pub fn add(&self, new_prompt: NewPrompt) -> PromptResult<Prompt> {
        ensure!(
            !new_prompt.name.trim().is_empty(),
            BlankNameSnafu { stage: "add-prompt" }
        );

        let now = Utc::now();
        let prompt = Prompt {
            id: PromptId::new_v4(),
            name: new_prompt.name.trim().to_string(),
            description: new_prompt.description,
            template: new_prompt.template,
            placeholders: new_prompt.placeholders,
            ai_provider: new_prompt.ai_provider,
            model: new_prompt.model.trim().to_string(),
            created_at: now,
            updated_at: now,
        };

        self.modify("add-prompt", |prompts| {
            prompts.push(prompt.clone());
            Ok(())
        })?;
        tracing::info!(prompt_id = %prompt.id, name = %prompt.name, "prompt added");
        Ok(prompt)
    }

    /// Replaces the stored prompt with the same id, keeping its creation time.
    pub fn update(&self, prompt: Prompt) -> PromptResult<Prompt> {
        ensure!(
            !prompt.name.trim().is_empty(),
            BlankNameSnafu {
                stage: "update-prompt"
            }
        );

        let id = prompt.id;
        let mut updated = None;
        self.modify("update-prompt", |prompts| {
            let slot = prompts
                .iter_mut()
                .find(|existing| existing.id == id)
                .context(NotFoundSnafu {
                    stage: "update-prompt",
                    id,
                })?;
            let created_at = slot.created_at;
            *slot = Prompt {
                created_at,
                updated_at: Utc::now(),
                ..prompt
            };
            updated = Some(slot.clone());
            Ok(())
        })?;

        updated.context(NotFoundSnafu {
            stage: "update-prompt",
            id,
        })
    }

    pub fn delete(&self, id: PromptId) -> PromptResult<()> {
        self.modify("delete-prompt", |prompts| {
            let before = prompts.len();
            prompts.retain(|prompt| prompt.id != id);
            ensure!(
                prompts.len() < before,
                NotFoundSnafu {
                    stage: "delete-prompt",
                    id,
                }
            );
            Ok(())
        })?;
        tracing::info!(prompt_id = %id, "prompt deleted");
        Ok(())
    }

    fn modify(
        &self,
        stage: &'static str,
        change: impl FnOnce(&mut Vec<Prompt>) -> PromptResult<()>,
    ) -> PromptResult<()> {
        let _guard = self.write_lock.lock();
        let mut prompts = Vec::clone(&self.prompts.load());
        change(&mut prompts)?;
        write_json_atomically(&self.path, &prompts, "prompts").context(PersistSnafu { stage })?;
        self.prompts.store(Arc::new(prompts));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> Vec<Prompt> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("prompts file not found at {:?}, seeding defaults", path);
                return default_prompts();
            }
            Err(error) => {
                tracing::warn!("failed to read prompts from {:?}: {}. using defaults", path, error);
                return default_prompts();
            }
        };

        match serde_json::from_str(&content) {
            Ok(prompts) => prompts,
            Err(error) => {
                tracing::warn!("failed to parse prompts from {:?}: {}. using defaults", path, error);
                default_prompts()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PromptError;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn new_prompt(name: &str) -> NewPrompt {
        NewPrompt {
            name: name.to_string(),
            description: String::new(),
            template: "Summarize: {{text}}".to_string(),
            placeholders: vec![Placeholder::text("text", "text", "Text")],
            ai_provider: "anthropic".to_string(),
            model: String::new(),
        }
    }

    #[test]
    fn render_replaces_every_occurrence() {
        let rendered = render_template(
            "{{a}} and {{ a }} then {{b}}",
            &[],
            &values(&[("a", "x"), ("b", "y")]),
        );
        assert_eq!(rendered, "x and x then y");
    }

    #[test]
    fn render_falls_back_to_defaults_and_keeps_unknown_tokens() {
        let placeholders = vec![
            Placeholder::text("1", "language", "Language").with_default("Japanese"),
            Placeholder::text("2", "text", "Text"),
        ];
        let rendered = render_template(
            "To {{language}}: {{text}} {{unknown}} {{unclosed",
            &placeholders,
            &HashMap::new(),
        );
        assert_eq!(rendered, "To Japanese:  {{unknown}} {{unclosed");
    }

    #[test]
    fn placeholder_names_are_distinct_and_ordered() {
        assert_eq!(
            placeholder_names("{{ text }} to {{language}}, again {{text}} {{}} {{open"),
            vec!["text".to_string(), "language".to_string()]
        );
    }

    #[test]
    fn default_translate_prompt_renders() {
        let prompt = default_prompts().remove(0);
        let mut form = prompt.initial_values();
        assert_eq!(form.get("language").map(String::as_str), Some("Japanese"));

        form.insert("text".to_string(), "good morning".to_string());
        assert_eq!(
            prompt.render(&form),
            "Translate the following text to Japanese: good morning"
        );
    }

    #[test]
    fn missing_file_seeds_translate_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path().join(PROMPTS_FILE_NAME));

        let prompts = store.list();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].name, "Translate");
        assert!(store.find("translate").is_some());
    }

    #[test]
    fn crud_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROMPTS_FILE_NAME);
        let store = PromptStore::new(path.clone());

        let added = store.add(new_prompt("  Summarize ")).unwrap();
        assert_eq!(added.name, "Summarize");
        assert_eq!(store.find(&added.id.to_string()).unwrap().id, added.id);

        let mut edited = added.clone();
        edited.template = "TL;DR {{text}}".to_string();
        let updated = store.update(edited).unwrap();
        assert_eq!(updated.created_at, added.created_at);
        assert!(updated.updated_at >= added.updated_at);

        let reloaded = PromptStore::new(path.clone());
        assert_eq!(reloaded.list().len(), 2);
        assert_eq!(reloaded.get(added.id).unwrap().template, "TL;DR {{text}}");

        reloaded.delete(added.id).unwrap();
        assert_eq!(PromptStore::new(path).list().len(), 1);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path().join(PROMPTS_FILE_NAME));
        let missing = PromptId::new_v4();

        assert!(matches!(store.get(missing), Err(PromptError::NotFound { .. })));
        assert!(matches!(store.delete(missing), Err(PromptError::NotFound { .. })));

        let mut ghost = store.list()[0].clone();
        ghost.id = missing;
        assert!(matches!(store.update(ghost), Err(PromptError::NotFound { .. })));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn blank_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path().join(PROMPTS_FILE_NAME));
        assert!(matches!(
            store.add(new_prompt("   ")),
            Err(PromptError::BlankName { .. })
        ));
    }
}
