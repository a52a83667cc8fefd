use std::io::{self, Write};
use std::sync::Arc;

use hotprompt_core::{
    AdapterSet, EventSubscription, Launcher, NewPrompt, Placeholder, Prompt, PromptStore,
    Reduction, RequestDispatcher, Settings, SettingsStore, StreamEvent, placeholder_names,
};
use hotprompt_llm::{ProviderKind, TokenUsage, default_models};
use snafu::{OptionExt, ResultExt, Whatever, whatever};
use tokio::runtime::Handle;

use crate::cli::{Command, ConfigAction, PromptAction, PromptFields};
use crate::clipboard::{copy_to_clipboard, text_to_copy};

const MASKED_KEY: &str = "********";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Completed,
    Failed,
    Cancelled,
}

pub async fn execute(command: Command) -> Result<(), Whatever> {
    match command {
        Command::Prompts { action } => prompts(action),
        Command::Models { provider } => list_models(provider.as_deref()),
        Command::Run {
            prompt,
            vars,
            adjustments,
            json,
            copy,
        } => run_prompt(&prompt, vars, adjustments, json, copy).await,
        Command::Config { action } => config(action),
    }
}

fn prompts(action: Option<PromptAction>) -> Result<(), Whatever> {
    let store = PromptStore::load();
    let mut stdout = io::stdout().lock();
    match action.unwrap_or(PromptAction::List) {
        PromptAction::List => list_prompts(&store, &mut stdout),
        PromptAction::Add {
            name,
            template,
            fields,
        } => {
            let prompt = add_prompt(&store, name, template, fields)?;
            writeln!(stdout, "added {} ({})", prompt.name, prompt.id)
                .whatever_context("failed to write output")
        }
        PromptAction::Edit {
            prompt,
            name,
            template,
            fields,
        } => {
            let prompt = edit_prompt(&store, &prompt, name, template, fields)?;
            writeln!(stdout, "updated {} ({})", prompt.name, prompt.id)
                .whatever_context("failed to write output")
        }
        PromptAction::Delete { prompt } => {
            let prompt = delete_prompt(&store, &prompt)?;
            writeln!(stdout, "deleted {} ({})", prompt.name, prompt.id)
                .whatever_context("failed to write output")
        }
    }
}

fn list_prompts(store: &PromptStore, out: &mut impl Write) -> Result<(), Whatever> {
    for prompt in store.list().iter() {
        let provider = match prompt.ai_provider.as_str() {
            "" => "(default)",
            tag => tag,
        };
        let model = match prompt.model.as_str() {
            "" => "(settings default)",
            model => model,
        };
        writeln!(out, "{}\t{provider}/{model}\t{}", prompt.name, prompt.id)
            .whatever_context("failed to write prompt list")?;
        if !prompt.description.is_empty() {
            writeln!(out, "    {}", prompt.description)
                .whatever_context("failed to write prompt list")?;
        }
    }
    Ok(())
}

fn find_prompt(store: &PromptStore, key: &str) -> Result<Prompt, Whatever> {
    store
        .find(key)
        .with_whatever_context(|| format!("no prompt with id or name '{key}'"))
}

/// Blank means "use the default provider from settings".
fn optional_provider_tag(raw: &str) -> Result<String, Whatever> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    ProviderKind::parse_tag(raw)
        .map(|kind| kind.tag().to_string())
        .with_whatever_context(|_| format!("unknown provider '{raw}'"))
}

fn placeholders_from(fields: Vec<(String, Option<String>)>) -> Vec<Placeholder> {
    fields
        .into_iter()
        .map(|(name, default_value)| Placeholder {
            default_value,
            ..Placeholder::text(name.clone(), name.clone(), name)
        })
        .collect()
}

fn add_prompt(
    store: &PromptStore,
    name: String,
    template: String,
    fields: PromptFields,
) -> Result<Prompt, Whatever> {
    let placeholders = if fields.placeholders.is_empty() {
        placeholder_names(&template)
            .into_iter()
            .map(|name| (name, None))
            .collect()
    } else {
        fields.placeholders
    };

    let new_prompt = NewPrompt {
        name,
        description: fields.description.unwrap_or_default(),
        template,
        placeholders: placeholders_from(placeholders),
        ai_provider: optional_provider_tag(fields.provider.as_deref().unwrap_or_default())?,
        model: fields.model.unwrap_or_default(),
    };
    store
        .add(new_prompt)
        .whatever_context("failed to add prompt")
}

fn edit_prompt(
    store: &PromptStore,
    key: &str,
    name: Option<String>,
    template: Option<String>,
    fields: PromptFields,
) -> Result<Prompt, Whatever> {
    let mut prompt = find_prompt(store, key)?;
    if let Some(name) = name {
        prompt.name = name;
    }
    if let Some(template) = template {
        prompt.template = template;
    }
    if let Some(description) = fields.description {
        prompt.description = description;
    }
    if !fields.placeholders.is_empty() {
        prompt.placeholders = placeholders_from(fields.placeholders);
    }
    if let Some(provider) = fields.provider {
        prompt.ai_provider = optional_provider_tag(&provider)?;
    }
    if let Some(model) = fields.model {
        prompt.model = model.trim().to_string();
    }

    store
        .update(prompt)
        .whatever_context("failed to update prompt")
}

fn delete_prompt(store: &PromptStore, key: &str) -> Result<Prompt, Whatever> {
    let prompt = find_prompt(store, key)?;
    store
        .delete(prompt.id)
        .whatever_context("failed to delete prompt")?;
    Ok(prompt)
}

fn list_models(provider: Option<&str>) -> Result<(), Whatever> {
    let kinds = match provider {
        Some(tag) => vec![
            ProviderKind::parse_tag(tag)
                .with_whatever_context(|_| format!("unknown provider '{tag}'"))?,
        ],
        None => ProviderKind::ALL.to_vec(),
    };

    let mut stdout = io::stdout().lock();
    for kind in kinds {
        for model in default_models(kind) {
            writeln!(stdout, "{kind}\t{}\t{}", model.id, model.name)
                .whatever_context("failed to write model list")?;
        }
    }
    Ok(())
}

fn config(action: ConfigAction) -> Result<(), Whatever> {
    match action {
        ConfigAction::Path => {
            println!("{}", SettingsStore::default_config_path().display());
        }
        ConfigAction::Show => {
            let store = SettingsStore::load();
            let masked = masked_settings(&store.settings());
            let rendered = serde_json::to_string_pretty(&masked)
                .whatever_context("failed to render settings")?;
            println!("{rendered}");
        }
        ConfigAction::SetKey { provider, key } => {
            let kind = ProviderKind::parse_tag(&provider)
                .with_whatever_context(|_| format!("unknown provider '{provider}'"))?;
            let store = SettingsStore::load();
            store
                .set_api_key(kind, &key)
                .whatever_context("failed to save settings")?;
            eprintln!("saved {kind} API key to {}", store.config_path().display());
        }
        ConfigAction::Set {
            provider,
            model,
            base_url,
            default,
        } => {
            let store = SettingsStore::load();
            let kind = set_provider_options(&store, &provider, model, base_url, default)?;
            eprintln!("saved {kind} settings to {}", store.config_path().display());
        }
    }
    Ok(())
}

fn set_provider_options(
    store: &SettingsStore,
    provider: &str,
    model: Option<String>,
    base_url: Option<String>,
    make_default: bool,
) -> Result<ProviderKind, Whatever> {
    let kind = ProviderKind::parse_tag(provider)
        .with_whatever_context(|_| format!("unknown provider '{provider}'"))?;

    let mut settings = Settings::clone(&store.settings());
    let options = settings.ai.provider_mut(kind);
    if let Some(model) = model {
        options.model = model;
    }
    if let Some(base_url) = base_url {
        // Normalization drops a blank URL, restoring the vendor endpoint.
        options.base_url = Some(base_url);
    }
    if make_default {
        settings.ai.provider = kind;
    }

    store
        .update(settings)
        .whatever_context("failed to save settings")?;
    Ok(kind)
}

fn masked_settings(settings: &Settings) -> Settings {
    let mut masked = settings.clone();
    for kind in ProviderKind::ALL {
        let provider = masked.ai.provider_mut(kind);
        if provider.has_api_key() {
            provider.api_key = MASKED_KEY.to_string();
        }
    }
    masked
}

async fn run_prompt(
    prompt_key: &str,
    vars: Vec<(String, String)>,
    adjustments: Vec<String>,
    json: bool,
    copy: bool,
) -> Result<(), Whatever> {
    let settings = Arc::new(SettingsStore::load());
    let prompt_store = PromptStore::load();
    let prompt = prompt_store
        .find(prompt_key)
        .with_whatever_context(|| format!("no prompt with id or name '{prompt_key}'"))?;

    let dispatcher = RequestDispatcher::new(
        Handle::current(),
        settings.clone(),
        AdapterSet::production(),
        Default::default(),
    );
    let mut subscription = dispatcher.subscribe();
    let mut launcher = Launcher::new(Arc::new(dispatcher), settings, prompt_store.list());
    launcher.show();
    launcher
        .select_prompt(prompt.id)
        .whatever_context("failed to open prompt")?;

    for (name, value) in vars {
        if !prompt.placeholders.iter().any(|placeholder| placeholder.name == name) {
            tracing::warn!(prompt = %prompt.name, placeholder = %name, "prompt has no such placeholder");
        }
        launcher.set_field(name, value);
    }

    let mut stdout = io::stdout();
    launcher
        .submit_form()
        .whatever_context("prompt form could not be submitted")?;
    let mut outcome = stream_cycle(&mut launcher, &mut subscription, json, &mut stdout).await?;

    for adjustment in adjustments {
        if outcome != Cycle::Completed {
            break;
        }
        launcher.open_adjust();
        if launcher.submit_adjustment(&adjustment).is_none() {
            tracing::debug!("skipping blank adjustment");
            continue;
        }
        if !json {
            println!("\n---");
        }
        outcome = stream_cycle(&mut launcher, &mut subscription, json, &mut stdout).await?;
    }

    match outcome {
        Cycle::Completed => {
            if !json {
                println!();
                eprintln!("{}", usage_summary(launcher.session().usage()));
            }
            if copy {
                copy_answer(&launcher);
            }
            Ok(())
        }
        Cycle::Failed => {
            let message = launcher
                .session()
                .last_error()
                .unwrap_or("request failed")
                .to_string();
            whatever!("{message}")
        }
        Cycle::Cancelled => whatever!("request cancelled"),
    }
}

fn copy_answer(launcher: &Launcher) {
    let Some(text) = text_to_copy(launcher.session()) else {
        tracing::warn!("no answer to copy");
        return;
    };
    match copy_to_clipboard(text) {
        Ok(()) => eprintln!("copied answer to clipboard"),
        Err(error) => tracing::warn!(error = %error, "failed to copy answer to clipboard"),
    }
}

/// Streams one request to `out` until it ends, fails or Ctrl-C cancels it.
async fn stream_cycle(
    launcher: &mut Launcher,
    subscription: &mut EventSubscription,
    json: bool,
    out: &mut impl Write,
) -> Result<Cycle, Whatever> {
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    whatever!("event channel closed while a request was running");
                };
                if let Some(cycle) = render_event(launcher, event, json, out)? {
                    return Ok(cycle);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                launcher.cancel();
                tracing::info!("request cancelled from keyboard");
                return Ok(Cycle::Cancelled);
            }
        }
    }
}

fn render_event(
    launcher: &mut Launcher,
    event: StreamEvent,
    json: bool,
    out: &mut impl Write,
) -> Result<Option<Cycle>, Whatever> {
    let line = if json {
        Some(serde_json::to_string(&event).whatever_context("failed to encode event")?)
    } else {
        match &event {
            StreamEvent::Chunk { text, .. } => Some(text.clone()),
            _ => None,
        }
    };

    let reduction = launcher.handle_event(event);
    if reduction == Reduction::Ignored {
        return Ok(None);
    }

    if let Some(line) = line {
        let written = if json {
            writeln!(out, "{line}")
        } else {
            write!(out, "{line}")
        };
        written
            .and_then(|()| out.flush())
            .whatever_context("failed to write response")?;
    }

    Ok(match reduction {
        Reduction::Completed => Some(Cycle::Completed),
        Reduction::Failed => Some(Cycle::Failed),
        Reduction::Ignored | Reduction::Updated => None,
    })
}

fn usage_summary(usage: TokenUsage) -> String {
    match usage.estimated_cost() {
        Some(cost) => format!(
            "tokens: {} prompt, {} completion, {} total (~${cost:.4})",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        ),
        None => "tokens: no usage reported".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use hotprompt_core::prompts::default_prompts;
    use hotprompt_core::{CorrelationId, Dispatch, EventSink, View};
    use hotprompt_llm::ChatMessage;

    use super::*;

    /// Answers every request with a fixed script pushed straight into the sink.
    struct EchoDispatcher {
        sink: EventSink,
    }

    impl Dispatch for EchoDispatcher {
        fn dispatch(&self, _provider: &str, _model: &str, messages: Vec<ChatMessage>) -> CorrelationId {
            let correlation_id = CorrelationId::new_v4();
            let prompt = messages
                .last()
                .map(|message| message.content.clone())
                .unwrap_or_default();
            self.sink.send(StreamEvent::Chunk {
                correlation_id,
                text: format!("echo: {prompt}"),
            });
            self.sink.send(StreamEvent::Usage {
                correlation_id,
                usage: TokenUsage::new(10, 5, 15),
            });
            self.sink.send(StreamEvent::End {
                correlation_id,
                finish_reason: "stop".to_string(),
            });
            correlation_id
        }

        fn cancel(&self, _id: CorrelationId) -> bool {
            false
        }
    }

    fn launcher() -> (Launcher, EventSubscription) {
        let sink = EventSink::new();
        let subscription = sink.subscribe();
        let settings = Arc::new(SettingsStore::with_settings(
            Settings::default(),
            PathBuf::from("unused-settings.json"),
        ));
        let prompts = Arc::new(default_prompts());
        let prompt_id = prompts[0].id;
        let mut launcher = Launcher::new(Arc::new(EchoDispatcher { sink }), settings, prompts);
        launcher.select_prompt(prompt_id).unwrap();
        launcher.set_field("text", "hi");
        (launcher, subscription)
    }

    #[tokio::test]
    async fn plain_output_prints_only_text() {
        let (mut launcher, mut subscription) = launcher();
        launcher.submit_form().unwrap();

        let mut out = Vec::new();
        let cycle = stream_cycle(&mut launcher, &mut subscription, false, &mut out)
            .await
            .unwrap();

        assert_eq!(cycle, Cycle::Completed);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "echo: Translate the following text to Japanese: hi"
        );
        assert_eq!(launcher.view(), View::Result);
    }

    #[tokio::test]
    async fn json_output_prints_one_line_per_event() {
        let (mut launcher, mut subscription) = launcher();
        launcher.submit_form().unwrap();

        let mut out = Vec::new();
        stream_cycle(&mut launcher, &mut subscription, true, &mut out)
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        let types: Vec<String> = output
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(types, vec!["chunk", "usage", "end"]);
    }

    #[test]
    fn stale_events_are_not_printed() {
        let (mut launcher, _subscription) = launcher();
        let mut out = Vec::new();
        let stale = StreamEvent::Chunk {
            correlation_id: CorrelationId::new_v4(),
            text: "stale".to_string(),
        };

        assert_eq!(render_event(&mut launcher, stale, false, &mut out).unwrap(), None);
        assert!(out.is_empty());
    }

    fn prompt_store(dir: &tempfile::TempDir) -> PromptStore {
        PromptStore::new(dir.path().join("prompts.json"))
    }

    #[test]
    fn add_prompt_derives_placeholders_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = prompt_store(&dir);

        let added = add_prompt(
            &store,
            "Summarize".to_string(),
            "Summarize {{text}} in {{style}}".to_string(),
            PromptFields {
                provider: Some("Anthropic".to_string()),
                ..PromptFields::default()
            },
        )
        .unwrap();

        let reloaded = prompt_store(&dir).find("summarize").unwrap();
        assert_eq!(reloaded.id, added.id);
        assert_eq!(reloaded.ai_provider, "anthropic");
        assert_eq!(
            reloaded
                .placeholders
                .iter()
                .map(|placeholder| placeholder.name.as_str())
                .collect::<Vec<_>>(),
            vec!["text", "style"]
        );
    }

    #[test]
    fn add_prompt_rejects_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let store = prompt_store(&dir);

        let result = add_prompt(
            &store,
            "Ask".to_string(),
            "{{q}}".to_string(),
            PromptFields {
                provider: Some("gemini".to_string()),
                ..PromptFields::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn edit_prompt_changes_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = prompt_store(&dir);

        let edited = edit_prompt(
            &store,
            "translate",
            None,
            None,
            PromptFields {
                placeholders: vec![
                    ("language".to_string(), Some("French".to_string())),
                    ("text".to_string(), None),
                ],
                provider: Some(String::new()),
                model: Some("  ".to_string()),
                ..PromptFields::default()
            },
        )
        .unwrap();

        let reloaded = prompt_store(&dir).get(edited.id).unwrap();
        assert_eq!(reloaded.name, "Translate");
        assert_eq!(
            reloaded.template,
            "Translate the following text to {{language}}: {{text}}"
        );
        assert_eq!(reloaded.ai_provider, "");
        assert_eq!(reloaded.model, "");
        assert_eq!(
            reloaded.placeholders[0].default_value.as_deref(),
            Some("French")
        );
    }

    #[test]
    fn delete_prompt_by_name_and_reject_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = prompt_store(&dir);

        let deleted = delete_prompt(&store, "Translate").unwrap();
        assert_eq!(deleted.name, "Translate");
        assert!(prompt_store(&dir).list().is_empty());
        assert!(delete_prompt(&store, "Translate").is_err());
    }

    #[test]
    fn prompt_list_marks_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = prompt_store(&dir);
        edit_prompt(
            &store,
            "translate",
            None,
            None,
            PromptFields {
                model: Some(String::new()),
                ..PromptFields::default()
            },
        )
        .unwrap();

        let mut out = Vec::new();
        list_prompts(&store, &mut out).unwrap();
        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("Translate\topenai/(settings default)\t"));
        assert!(output.contains("    Translate text to a specified language."));
    }

    #[test]
    fn provider_options_persist_and_blank_url_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone());

        let kind = set_provider_options(
            &store,
            "anthropic",
            Some("claude-sonnet-4-0".to_string()),
            Some("http://localhost:9000".to_string()),
            true,
        )
        .unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);

        let reloaded = SettingsStore::new(path.clone()).settings();
        assert_eq!(reloaded.ai.provider, ProviderKind::Anthropic);
        assert_eq!(reloaded.ai.anthropic.model, "claude-sonnet-4-0");
        assert_eq!(
            reloaded.ai.anthropic.base_url.as_deref(),
            Some("http://localhost:9000")
        );

        set_provider_options(&store, "anthropic", None, Some(String::new()), false).unwrap();
        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.ai.anthropic.base_url, None);
        assert_eq!(reloaded.ai.anthropic.model, "claude-sonnet-4-0");
        assert_eq!(reloaded.ai.provider, ProviderKind::Anthropic);
    }

    #[test]
    fn provider_options_reject_unknown_provider() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert!(set_provider_options(&store, "gemini", None, None, true).is_err());
        assert!(!store.config_path().exists());
    }

    #[test]
    fn api_keys_are_masked() {
        let mut settings = Settings::default();
        settings.ai.openai.api_key = "sk-secret".to_string();

        let masked = masked_settings(&settings);
        assert_eq!(masked.ai.openai.api_key, MASKED_KEY);
        assert!(masked.ai.anthropic.api_key.is_empty());
    }

    #[test]
    fn usage_summary_includes_cost() {
        assert_eq!(
            usage_summary(TokenUsage::new(1000, 1000, 2000)),
            "tokens: 1000 prompt, 1000 completion, 2000 total (~$0.0200)"
        );
        assert_eq!(usage_summary(TokenUsage::default()), "tokens: no usage reported");
    }
}
