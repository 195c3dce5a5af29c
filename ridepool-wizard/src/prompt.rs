//! What the wizard asks next. Rendering is left to the presenter.

use crate::command::Command;
use crate::steps::StepId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOption {
    pub token: String,
    pub label: String,
    pub enabled: bool,
}

impl PromptOption {
    pub fn new(command: Command, label: impl Into<String>) -> Self {
        Self {
            token: command.to_string(),
            label: label.into(),
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub key: String,
    pub options: Vec<PromptOption>,
    pub context: serde_json::Value,
    pub accepts_text: bool,
    pub error: Option<String>,
}

impl Prompt {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            options: Vec::new(),
            context: serde_json::Value::Object(serde_json::Map::new()),
            accepts_text: false,
            error: None,
        }
    }

    pub fn with_options(mut self, options: Vec<PromptOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_option(mut self, option: PromptOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Serialize) -> Self {
        if let serde_json::Value::Object(map) = &mut self.context {
            map.insert(
                key.to_string(),
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            );
        }
        self
    }

    pub fn accepts_text(mut self) -> Self {
        self.accepts_text = true;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.options.iter().any(|o| o.token == token && o.enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum WizardOutcome {
    TripsCreated(Vec<Uuid>),
    BookingCreated(Uuid),
    Cancelled,
}

/// Answer to one processed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub session_id: Uuid,
    pub step: StepId,
    pub seq: u64,
    pub prompt: Prompt,
    pub notice: Option<Notice>,
    pub outcome: Option<WizardOutcome>,
}

impl Reply {
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}
