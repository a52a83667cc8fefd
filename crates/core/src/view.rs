use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Selector,
    Form,
    Loading,
    Result,
    AdjustForm,
    Settings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsSection {
    #[default]
    General,
    Prompts,
    Ai,
}

/// What the front-end should do after Escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeOutcome {
    /// Moved to another view.
    Navigated(View),
    /// The in-flight request must be cancelled; the view already moved back.
    CancelRequest(View),
    HideWindow,
}

/// Which screen is visible, plus the screen to return to when loading is cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    current: View,
    before_loading: Option<View>,
    settings_section: SettingsSection,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            current: View::Selector,
            before_loading: None,
            settings_section: SettingsSection::default(),
        }
    }

    pub fn current(&self) -> View {
        self.current
    }

    pub fn before_loading(&self) -> Option<View> {
        self.before_loading
    }

    pub fn settings_section(&self) -> SettingsSection {
        self.settings_section
    }

    pub fn select_prompt(&mut self) -> bool {
        self.transition(&[View::Selector], View::Form)
    }

    pub fn begin_loading(&mut self) -> bool {
        let origin = self.current;
        if !self.transition(&[View::Form, View::AdjustForm], View::Loading) {
            return false;
        }
        self.before_loading = Some(origin);
        true
    }

    /// Loading → Result. A second terminal finds the state already moved and is rejected.
    pub fn finish_loading(&mut self) -> bool {
        if !self.transition(&[View::Loading], View::Result) {
            return false;
        }
        self.before_loading = None;
        true
    }

    pub fn cancel_loading(&mut self) -> bool {
        if self.current != View::Loading {
            return false;
        }
        self.current = self.before_loading.take().unwrap_or(View::Form);
        true
    }

    pub fn open_adjust(&mut self) -> bool {
        self.transition(&[View::Result], View::AdjustForm)
    }

    pub fn open_settings(&mut self, section: SettingsSection) {
        self.current = View::Settings;
        self.settings_section = section;
        self.before_loading = None;
    }

    pub fn close_settings(&mut self) -> bool {
        self.transition(&[View::Settings], View::Selector)
    }

    pub fn escape(&mut self) -> EscapeOutcome {
        match self.current {
            View::Selector => EscapeOutcome::HideWindow,
            View::Form | View::Settings | View::Result => {
                self.current = View::Selector;
                EscapeOutcome::Navigated(View::Selector)
            }
            View::AdjustForm => {
                self.current = View::Result;
                EscapeOutcome::Navigated(View::Result)
            }
            View::Loading => {
                self.cancel_loading();
                EscapeOutcome::CancelRequest(self.current)
            }
        }
    }

    /// The window went away; the next show starts from the selector.
    pub fn hide(&mut self) {
        self.current = View::Selector;
        self.before_loading = None;
    }

    fn transition(&mut self, from: &[View], to: View) -> bool {
        if !from.contains(&self.current) {
            tracing::debug!(current = ?self.current, target = ?to, "rejecting view transition");
            return false;
        }
        self.current = to;
        true
    }
}
