pub mod run;
pub mod types;

pub use types::{Scenario, ScenarioError, ScenarioResult, Step};
