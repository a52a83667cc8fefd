pub mod dispatcher;
pub mod error;
pub mod events;
pub mod ids;
pub mod launcher;
pub mod persist;
pub mod prompts;
pub mod reducer;
pub mod registry;
pub mod settings;
pub mod view;

pub use dispatcher::{AdapterSet, CredentialSource, Dispatch, RequestDescriptor, RequestDispatcher};
pub use error::{DispatchError, PromptError, SettingsError};
pub use events::{EventSink, EventSubscription, StreamEvent};
pub use ids::{CorrelationId, PromptId};
pub use launcher::{Launcher, RequestTarget};
pub use prompts::{
    NewPrompt, Placeholder, PlaceholderKind, Prompt, PromptStore, SelectOption, placeholder_names,
};
pub use reducer::{LlmSession, Reduction};
pub use registry::CancellationRegistry;
pub use settings::{Settings, SettingsStore};
pub use view::{EscapeOutcome, SettingsSection, View, ViewState};
