pub mod command;
pub mod datetime;
pub mod expiry;
pub mod presenter;
pub mod prompt;
pub mod session;
pub mod steps;
pub mod wizard;

pub use command::{Command, CommandParseError, EditField, PreferenceChoice, TripOption, UserEvent};
pub use datetime::{DateTimeMachine, DateTimeState};
pub use expiry::SessionReaper;
pub use presenter::{run_conversation, Presenter};
pub use prompt::{Notice, Prompt, PromptOption, Reply, WizardOutcome};
pub use session::{MemorySessionStore, SessionStore, WizardSession};
pub use steps::{BookingDraft, Flow, StepId, TripDraft};
pub use wizard::{Wizard, WizardConfig, WizardError};
