//! Runs scenarios against a browser page.

use anyhow::Context;
use std::time::Duration;

use crate::browser::{BrowserError, Page};
use crate::executor::{TestOutcome, TestProcedure};
use crate::scenario::types::{Scenario, Step};

/// Join a base URL and a path with exactly one slash
pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

impl Scenario {
    /// Run every step; returns at the first failed expectation.
    ///
    /// Driver errors other than an expectation timing out are faults.
    pub fn run_steps(&self, page: &mut dyn Page, base_url: &str) -> anyhow::Result<TestOutcome> {
        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(scenario = %self.name, step = index + 1, ?step, "running step");
            if let Some(failure) = run_step(page, base_url, step)
                .with_context(|| format!("step {} of '{}'", index + 1, self.name))?
            {
                return Ok(TestOutcome::failed(failure));
            }
        }
        Ok(TestOutcome::passed())
    }
}

impl TestProcedure for Scenario {
    fn run(&mut self, page: &mut dyn Page, base_url: &str) -> anyhow::Result<TestOutcome> {
        self.run_steps(page, base_url)
    }
}

/// `Ok(Some(message))` when an expectation failed
fn run_step(page: &mut dyn Page, base_url: &str, step: &Step) -> anyhow::Result<Option<String>> {
    match step {
        Step::Goto { path } => page.goto(&join_url(base_url, path))?,
        Step::Click { selector } => page.click(selector)?,
        Step::Fill { selector, text } => page.fill(selector, text)?,
        Step::WaitFor {
            selector,
            timeout_ms,
        } => {
            page.wait_for_selector(selector, Duration::from_millis(*timeout_ms))?;
        }
        Step::ExpectVisible {
            selector,
            timeout_ms,
            message,
        } => {
            let visible = match page.wait_for_selector(selector, Duration::from_millis(*timeout_ms)) {
                Ok(visible) => visible,
                Err(BrowserError::Timeout { .. }) => false,
                Err(err) => return Err(err.into()),
            };
            if !visible {
                return Ok(Some(
                    message
                        .clone()
                        .unwrap_or_else(|| format!("Element '{}' not visible", selector)),
                ));
            }
        }
        Step::ExpectText {
            selector,
            contains,
            message,
        } => {
            let text = page.text_content(selector)?.unwrap_or_default();
            if !text.contains(contains.as_str()) {
                return Ok(Some(message.clone().unwrap_or_else(|| {
                    format!("Expected '{}' to contain '{}', got '{}'", selector, contains, text)
                })));
            }
        }
    }
    Ok(None)
}
