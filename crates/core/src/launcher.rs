use std::collections::HashMap;
use std::sync::Arc;

use hotprompt_llm::ProviderKind;
use snafu::OptionExt;

use crate::dispatcher::Dispatch;
use crate::error::{NotFoundSnafu, PromptResult};
use crate::events::StreamEvent;
use crate::ids::{CorrelationId, PromptId};
use crate::prompts::Prompt;
use crate::reducer::{LlmSession, Reduction};
use crate::settings::SettingsStore;
use crate::view::{EscapeOutcome, SettingsSection, View, ViewState};

/// Provider tag and model a prompt is sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub provider: String,
    pub model: String,
}

/// Glue between the prompt library, the session and the visible screen.
pub struct Launcher {
    settings: Arc<SettingsStore>,
    prompts: Arc<Vec<Prompt>>,
    selected: Option<Prompt>,
    form_values: HashMap<String, String>,
    session: LlmSession,
    view: ViewState,
    visible: bool,
}

impl Launcher {
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        settings: Arc<SettingsStore>,
        prompts: Arc<Vec<Prompt>>,
    ) -> Self {
        Self {
            settings,
            prompts,
            selected: None,
            form_values: HashMap::new(),
            session: LlmSession::new(dispatcher),
            view: ViewState::new(),
            visible: false,
        }
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn selected_prompt(&self) -> Option<&Prompt> {
        self.selected.as_ref()
    }

    pub fn form_values(&self) -> &HashMap<String, String> {
        &self.form_values
    }

    pub fn session(&self) -> &LlmSession {
        &self.session
    }

    pub fn view(&self) -> View {
        self.view.current()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Opens the form for `id` with every field at its default.
    pub fn select_prompt(&mut self, id: PromptId) -> PromptResult<bool> {
        let prompt = self
            .prompts
            .iter()
            .find(|prompt| prompt.id == id)
            .cloned()
            .context(NotFoundSnafu {
                stage: "select-prompt",
                id,
            })?;

        if !self.view.select_prompt() {
            return Ok(false);
        }
        self.form_values = prompt.initial_values();
        self.selected = Some(prompt);
        Ok(true)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.form_values.insert(name.into(), value.into());
    }

    pub fn request_target(&self, prompt: &Prompt) -> RequestTarget {
        let settings = self.settings.settings();
        let provider = match prompt.ai_provider.trim() {
            "" => settings.ai.provider.tag().to_string(),
            tag => tag.to_string(),
        };

        let model = match prompt.model.trim() {
            "" => ProviderKind::parse_tag(&provider)
                .map(|kind| settings.model_for(kind))
                // The dispatcher reports the bad tag; no model to pick here.
                .unwrap_or_default(),
            model => model.to_string(),
        };

        RequestTarget { provider, model }
    }

    /// Renders the selected prompt and starts a fresh request.
    pub fn submit_form(&mut self) -> Option<CorrelationId> {
        let prompt = self.selected.as_ref()?;
        if self.view.current() != View::Form {
            return None;
        }

        let content = prompt.render(&self.form_values);
        let target = self.request_target(prompt);
        self.view.begin_loading();

        tracing::debug!(
            prompt_id = %prompt.id,
            provider = %target.provider,
            model = %target.model,
            "submitting prompt"
        );
        Some(
            self.session
                .submit(&target.provider, &target.model, content),
        )
    }

    pub fn open_adjust(&mut self) -> bool {
        self.view.open_adjust()
    }

    /// Sends a follow-up instruction on the current transcript. Blank text is ignored.
    pub fn submit_adjustment(&mut self, text: &str) -> Option<CorrelationId> {
        let text = text.trim();
        if text.is_empty() || self.view.current() != View::AdjustForm {
            return None;
        }

        let target = self.request_target(self.selected.as_ref()?);
        self.view.begin_loading();
        Some(self.session.adjust(&target.provider, &target.model, text))
    }

    pub fn cancel(&mut self) -> bool {
        let cancelled = self.session.cancel();
        self.view.cancel_loading();
        cancelled
    }

    pub fn escape(&mut self) -> EscapeOutcome {
        let origin = self.view.current();
        let outcome = self.view.escape();
        match outcome {
            EscapeOutcome::CancelRequest(_) => {
                self.session.cancel();
            }
            EscapeOutcome::Navigated(View::Selector) if origin != View::Settings => {
                self.reset_selection();
            }
            EscapeOutcome::Navigated(_) => {}
            EscapeOutcome::HideWindow => self.hide(),
        }
        outcome
    }

    /// Folds a stream event into the session and moves the view on terminals.
    pub fn handle_event(&mut self, event: StreamEvent) -> Reduction {
        let reduction = self.session.apply(event);
        if matches!(reduction, Reduction::Completed | Reduction::Failed) {
            self.view.finish_loading();
        }
        reduction
    }

    pub fn back_to_prompts(&mut self) {
        self.reset_selection();
        self.view.hide();
    }

    pub fn open_settings(&mut self, section: SettingsSection) {
        self.session.cancel();
        self.view.open_settings(section);
    }

    pub fn close_settings(&mut self) -> bool {
        self.view.close_settings()
    }

    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.reset_selection();
        self.view.hide();
    }

    pub fn toggle(&mut self) -> bool {
        if self.visible {
            self.hide();
        } else {
            self.show();
        }
        self.visible
    }

    fn reset_selection(&mut self) {
        self.session.clear();
        self.selected = None;
        self.form_values.clear();
    }
}
