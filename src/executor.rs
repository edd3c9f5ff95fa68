//! Runs one test attempt in a fresh browser session and normalizes the outcome.
//!
//! Whatever the test procedure does (pass, fail, return an error, panic) the
//! executor returns a [`TestResult`]; no fault escapes. Screenshots are taken
//! only on failure paths and a failed capture never replaces the attempt's
//! own error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use crate::browser::{BrowserDriver, BrowserError, Page, SessionOptions};
use crate::session::{Diagnostics, ScopedSession, ScreenshotKind, screenshot_path};
use crate::types::TestResult;
use crate::verify::Verification;

/// What a test procedure reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,

    #[serde(default)]
    pub error: Option<String>,

    /// Any structured value the procedure wants kept with the attempt
    #[serde(default)]
    pub data_verification: Option<Value>,
}

impl TestOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            error: None,
            data_verification: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data_verification: None,
        }
    }

    /// Attach a verification result
    pub fn with_verification(mut self, verification: &Verification) -> Self {
        self.data_verification = serde_json::to_value(verification).ok();
        self
    }

    /// Outcome that mirrors a verification: passes iff the data matched
    pub fn from_verification(verification: Verification) -> Self {
        let error = if verification.success {
            None
        } else {
            Some(
                verification
                    .error
                    .clone()
                    .unwrap_or_else(|| "Data verification failed".to_string()),
            )
        };
        Self {
            success: verification.success,
            error,
            data_verification: serde_json::to_value(&verification).ok(),
        }
    }

    /// Strictly parse a loosely structured payload.
    ///
    /// Requires an object with a boolean `success`; `error` must be a string
    /// or null. `data_verification` is kept as whatever value was given and
    /// unknown keys are ignored.
    pub fn from_value(value: Value) -> Result<Self, OutcomeError> {
        let Value::Object(map) = &value else {
            return Err(OutcomeError::NotAnObject(value.to_string()));
        };
        match map.get("success") {
            Some(Value::Bool(_)) => {}
            Some(other) => return Err(OutcomeError::InvalidSuccess(other.to_string())),
            None => return Err(OutcomeError::MissingSuccess),
        }
        serde_json::from_value(value).map_err(OutcomeError::Malformed)
    }
}

/// Rejected test payloads
///
/// Messages embed the underlying cause, so no variant reports a `source()`.
#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error("test result must be an object, got {0}")]
    NotAnObject(String),

    #[error("test result is missing the `success` flag")]
    MissingSuccess,

    #[error("`success` must be a boolean, got {0}")]
    InvalidSuccess(String),

    #[error("malformed test result: {0}")]
    Malformed(serde_json::Error),
}

/// A test procedure: drive one page against one base URL
pub trait TestProcedure {
    fn run(&mut self, page: &mut dyn Page, base_url: &str) -> anyhow::Result<TestOutcome>;
}

impl<F> TestProcedure for F
where
    F: FnMut(&mut dyn Page, &str) -> anyhow::Result<TestOutcome>,
{
    fn run(&mut self, page: &mut dyn Page, base_url: &str) -> anyhow::Result<TestOutcome> {
        self(page, base_url)
    }
}

/// Adapter for procedures that return a loose JSON payload
pub struct JsonProcedure<F>(pub F);

impl<F> TestProcedure for JsonProcedure<F>
where
    F: FnMut(&mut dyn Page, &str) -> anyhow::Result<Value>,
{
    fn run(&mut self, page: &mut dyn Page, base_url: &str) -> anyhow::Result<TestOutcome> {
        let payload = (self.0)(page, base_url)?;
        Ok(TestOutcome::from_value(payload)?)
    }
}

/// Executes test procedures in scoped browser sessions
pub struct TestExecutor {
    driver: Box<dyn BrowserDriver>,
    base_url: String,
    screenshot_dir: PathBuf,
    options: SessionOptions,
}

impl TestExecutor {
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        base_url: impl Into<String>,
        screenshot_dir: impl Into<PathBuf>,
        options: SessionOptions,
    ) -> Self {
        Self {
            driver,
            base_url: base_url.into(),
            screenshot_dir: screenshot_dir.into(),
            options,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    /// Run one attempt of `test` named `name`
    pub fn execute(&self, test: &mut dyn TestProcedure, name: &str) -> TestResult {
        let started = Instant::now();

        let mut session = match ScopedSession::open(self.driver.as_ref(), &self.options) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(test = name, error = %err, "could not open browser session");
                return TestResult {
                    name: name.to_string(),
                    success: false,
                    duration: started.elapsed().as_secs_f64(),
                    error: Some(format!("Failed to open browser session: {}", err)),
                    screenshot: None,
                    data_verification: None,
                    console_logs: Vec::new(),
                    network_failures: Vec::new(),
                };
            }
        };

        tracing::info!(test = name, url = %self.base_url, "running attempt");
        let base_url = self.base_url.as_str();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| test.run(session.page(), base_url)));

        let (success, error, data_verification, screenshot) = match outcome {
            Ok(Ok(outcome)) if outcome.success => (true, None, outcome.data_verification, None),
            Ok(Ok(outcome)) => {
                let screenshot = self.capture(&mut session, name, ScreenshotKind::Failure);
                (false, outcome.error, outcome.data_verification, screenshot)
            }
            Ok(Err(fault)) => {
                let screenshot = self.capture(&mut session, name, ScreenshotKind::Fault);
                (false, Some(format!("{:#}", fault)), None, screenshot)
            }
            Err(payload) => {
                let screenshot = self.capture(&mut session, name, ScreenshotKind::Fault);
                (false, Some(panic_message(payload.as_ref())), None, screenshot)
            }
        };
        let duration = started.elapsed().as_secs_f64();

        let Diagnostics {
            console_logs,
            network_failures,
        } = session.close();

        if success {
            tracing::info!(test = name, duration, "attempt passed");
        } else {
            tracing::info!(
                test = name,
                duration,
                error = error.as_deref().unwrap_or("unknown"),
                "attempt failed"
            );
        }

        TestResult {
            name: name.to_string(),
            success,
            duration,
            error,
            screenshot,
            data_verification,
            console_logs,
            network_failures,
        }
    }

    /// Best-effort full-page screenshot: a capture failure is logged and dropped.
    fn capture(
        &self,
        session: &mut ScopedSession,
        name: &str,
        kind: ScreenshotKind,
    ) -> Option<PathBuf> {
        let path = screenshot_path(&self.screenshot_dir, name, kind);
        let captured = std::fs::create_dir_all(&self.screenshot_dir)
            .map_err(BrowserError::from)
            .and_then(|_| session.page().screenshot(&path, true));

        match captured {
            Ok(()) => Some(path),
            Err(err) => {
                tracing::debug!(test = name, error = %err, "screenshot capture failed");
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("Test procedure panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{MockBrowser, MockPage};
    use serde_json::json;
    use std::time::Duration;

    const APP: &str = "http://app.test";

    fn executor(browser: &MockBrowser, dir: &Path) -> TestExecutor {
        TestExecutor::new(
            Box::new(browser.clone()),
            APP,
            dir,
            SessionOptions {
                headless: true,
                viewport: crate::browser::Viewport::new(200, 120),
            },
        )
    }

    #[test]
    fn test_outcome_from_value_requires_success() {
        assert!(matches!(
            TestOutcome::from_value(json!({"error": "x"})),
            Err(OutcomeError::MissingSuccess)
        ));
        assert!(matches!(
            TestOutcome::from_value(json!({"success": "yes"})),
            Err(OutcomeError::InvalidSuccess(_))
        ));
        assert!(matches!(
            TestOutcome::from_value(json!([true])),
            Err(OutcomeError::NotAnObject(_))
        ));
        assert!(matches!(
            TestOutcome::from_value(json!({"success": false, "error": 3})),
            Err(OutcomeError::Malformed(_))
        ));
    }

    #[test]
    fn test_outcome_from_value_ignores_extra_keys() {
        let outcome =
            TestOutcome::from_value(json!({"success": false, "error": "Modal missing", "step": 3}))
                .unwrap();
        assert_eq!(outcome, TestOutcome::failed("Modal missing"));
    }

    #[test]
    fn test_passing_attempt_has_no_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        browser.route(APP, MockPage::new("Home").console("log", "ready"));

        let mut test = |page: &mut dyn Page, url: &str| -> anyhow::Result<TestOutcome> {
            page.goto(url)?;
            Ok(TestOutcome::passed())
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "home");

        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.screenshot.is_none());
        assert_eq!(result.console_logs.len(), 1);
        assert!(result.duration >= 0.0);
        assert_eq!(browser.sessions_closed(), 1);
    }

    #[test]
    fn test_success_drops_stray_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        let mut test = |_: &mut dyn Page, _: &str| -> anyhow::Result<TestOutcome> {
            Ok(TestOutcome {
                success: true,
                error: Some("leftover".into()),
                data_verification: None,
            })
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "stray");
        assert!(result.success);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_failed_attempt_takes_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        browser.route(APP, MockPage::new("Home").hidden("#modal"));

        let mut test = |page: &mut dyn Page, url: &str| -> anyhow::Result<TestOutcome> {
            page.goto(url)?;
            if !page.wait_for_selector("#modal", Duration::from_secs(3))? {
                return Ok(TestOutcome::failed("Modal not visible after click"));
            }
            Ok(TestOutcome::passed())
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "modal");

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Modal not visible after click"));
        let shot = result.screenshot.expect("screenshot path");
        assert!(shot.exists());
        let file = shot.file_name().unwrap().to_string_lossy().to_string();
        assert!(file.starts_with("modal-") && !file.contains("-error-"));
    }

    #[test]
    fn test_fault_uses_error_screenshot_name() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let mut test = |page: &mut dyn Page, _: &str| -> anyhow::Result<TestOutcome> {
            page.goto("http://down.test")?;
            Ok(TestOutcome::passed())
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "down");

        assert!(!result.success);
        assert!(result.error.unwrap().contains("http://down.test"));
        let file = result.screenshot.unwrap();
        assert!(file.to_string_lossy().contains("down-error-"));
        assert_eq!(result.network_failures.len(), 1);
    }

    #[test]
    fn test_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let mut test = |_: &mut dyn Page, _: &str| -> anyhow::Result<TestOutcome> {
            panic!("selector table corrupted");
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "panics");

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Test procedure panicked: selector table corrupted")
        );
        assert_eq!(browser.sessions_opened(), 1);
        assert_eq!(browser.sessions_closed(), 1);
    }

    #[test]
    fn test_screenshot_failure_keeps_primary_error() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        browser.fail_screenshots(true);

        let mut test = |_: &mut dyn Page, _: &str| -> anyhow::Result<TestOutcome> {
            anyhow::bail!("element detached from DOM")
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "detached");

        assert_eq!(result.error.as_deref(), Some("element detached from DOM"));
        assert!(result.screenshot.is_none());
    }

    #[test]
    fn test_launch_failure_becomes_result() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        browser.fail_launch("chrome not found");

        let mut test = |_: &mut dyn Page, _: &str| -> anyhow::Result<TestOutcome> {
            Ok(TestOutcome::passed())
        };
        let result = executor(&browser, dir.path()).execute(&mut test, "nolaunch");

        assert!(!result.success);
        assert!(result.error.unwrap().contains("chrome not found"));
    }

    #[test]
    fn test_json_procedure_keeps_arbitrary_data() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let mut test = JsonProcedure(|_: &mut dyn Page, _: &str| -> anyhow::Result<Value> {
            Ok(json!({"success": true, "data_verification": {"rows_checked": 3}}))
        });
        let result = executor(&browser, dir.path()).execute(&mut test, "counted");

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.data_verification, Some(json!({"rows_checked": 3})));
    }

    #[test]
    fn test_from_verification_serializes_result() {
        let verification = Verification::compare(
            json!({"id": 1, "name": "Lamp"}).as_object().cloned().unwrap(),
            &json!({"name": "Desk"}).as_object().cloned().unwrap(),
        );
        let outcome = TestOutcome::from_verification(verification);

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Data verification failed"));
        let data = outcome.data_verification.unwrap();
        assert_eq!(data["diff"]["name"]["expected"], json!("Desk"));
    }

    #[test]
    fn test_malformed_payload_names_cause_once() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let mut test = JsonProcedure(|_: &mut dyn Page, _: &str| -> anyhow::Result<Value> {
            Ok(json!({"success": false, "error": 3}))
        });
        let error = executor(&browser, dir.path())
            .execute(&mut test, "typed")
            .error
            .unwrap();

        assert!(error.starts_with("malformed test result: "));
        assert_eq!(error.matches("invalid type").count(), 1);
    }

    #[test]
    fn test_json_procedure_rejects_malformed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let mut test = JsonProcedure(|_: &mut dyn Page, _: &str| -> anyhow::Result<Value> {
            Ok(json!({"ok": true}))
        });
        let result = executor(&browser, dir.path()).execute(&mut test, "loose");

        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing the `success` flag"));
    }
}
