use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default wait for `wait_for` / `expect_visible` steps
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// A declarative browser test loaded from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Used as the test name in the fix loop
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Steps run in order until the first failed expectation
    pub steps: Vec<Step>,
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to `path`, relative to the application base URL
    Goto { path: String },

    Click { selector: String },

    /// Type `text` into an input
    Fill { selector: String, text: String },

    /// Wait until `selector` exists; a timeout is a fault
    WaitFor {
        selector: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },

    /// Fail the scenario unless `selector` is visible
    ExpectVisible {
        selector: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default)]
        message: Option<String>,
    },

    /// Fail the scenario unless the text of `selector` contains `contains`
    ExpectText {
        selector: String,
        contains: String,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Result type for scenario loading
pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error reading scenario: {0}")]
    Io(std::io::Error),

    #[error("Invalid scenario: {0}")]
    Parse(serde_json::Error),

    #[error("Scenario '{0}' has no steps")]
    Empty(String),
}

impl From<std::io::Error> for ScenarioError {
    fn from(err: std::io::Error) -> Self {
        ScenarioError::Io(err)
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(err: serde_json::Error) -> Self {
        ScenarioError::Parse(err)
    }
}

impl Scenario {
    /// Parse a scenario from JSON text
    pub fn from_json(json: &str) -> ScenarioResult<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        if scenario.steps.is_empty() {
            return Err(ScenarioError::Empty(scenario.name));
        }
        Ok(scenario)
    }

    /// Load a scenario file
    pub fn load(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }
}
