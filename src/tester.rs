//! High-level entry point tying configuration, browser driver and store together.

use std::path::Path;

use crate::browser::BrowserDriver;
use crate::config::TesterConfig;
use crate::executor::{TestExecutor, TestProcedure};
use crate::fix_loop::{ExecutorRunner, FixLoop, FixProcedure, LoopLimits};
use crate::report::render_report;
use crate::store::{LazyStore, Record};
use crate::types::{FixLoopResult, TestResult};
use crate::verify::{DataVerifier, Verification};

/// Runs tests, fix loops and data verifications against one application
pub struct LiveAppTester {
    config: TesterConfig,
    executor: TestExecutor,
    verifier: DataVerifier,
}

impl LiveAppTester {
    /// Build a tester; creates the screenshot directory if it is missing.
    ///
    /// The store client is created on first verification, and only when both
    /// the store URL and key are configured.
    pub fn new(config: TesterConfig, driver: Box<dyn BrowserDriver>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;
        let store = LazyStore::postgrest(config.store_url.as_deref(), config.store_key.as_deref());
        let executor = TestExecutor::new(
            driver,
            config.app_url.clone(),
            config.screenshot_dir.clone(),
            config.session_options(),
        );
        tracing::debug!(
            app_url = %config.app_url,
            store = config.store_configured(),
            "tester initialized"
        );

        Ok(Self {
            config,
            executor,
            verifier: DataVerifier::new(store),
        })
    }

    /// Replace the store used for verification
    pub fn with_store(mut self, store: LazyStore) -> Self {
        self.verifier = DataVerifier::new(store);
        self
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.config.screenshot_dir
    }

    pub fn verifier(&self) -> &DataVerifier {
        &self.verifier
    }

    /// Run a single attempt
    pub fn run_test(&self, test: &mut dyn TestProcedure, name: &str) -> TestResult {
        self.executor.execute(test, name)
    }

    /// Compare the first record of `table` matching `conditions` with `expected`
    pub fn verify_data(&self, table: &str, conditions: &Record, expected: &Record) -> Verification {
        self.verifier.verify(table, conditions, expected)
    }

    /// Run the fix loop with the configured limits
    pub fn run_with_fix_loop(
        &self,
        test: &mut dyn TestProcedure,
        fix: &mut dyn FixProcedure,
        test_name: &str,
    ) -> FixLoopResult {
        self.run_with_limits(test, fix, test_name, self.config.limits)
    }

    /// Run the fix loop with explicit limits
    pub fn run_with_limits(
        &self,
        test: &mut dyn TestProcedure,
        fix: &mut dyn FixProcedure,
        test_name: &str,
        limits: LoopLimits,
    ) -> FixLoopResult {
        let mut runner = ExecutorRunner::new(&self.executor, test);
        FixLoop::new(limits).run(&mut runner, fix, test_name)
    }

    /// Markdown report for a loop result
    pub fn generate_report(&self, result: &FixLoopResult) -> String {
        render_report(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{MockBrowser, MockPage, Page};
    use crate::executor::TestOutcome;
    use crate::store::MemoryStore;
    use crate::verify::NOT_CONFIGURED;
    use serde_json::json;

    fn config(dir: &Path) -> TesterConfig {
        TesterConfig::defaults()
            .app_url("http://app.test")
            .screenshot_dir(dir.join("shots"))
    }

    #[test]
    fn test_new_creates_screenshot_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tester = LiveAppTester::new(config(dir.path()), Box::new(MockBrowser::new())).unwrap();
        assert!(tester.screenshot_dir().is_dir());
    }

    #[test]
    fn test_verify_without_store() {
        let dir = tempfile::tempdir().unwrap();
        let tester = LiveAppTester::new(config(dir.path()), Box::new(MockBrowser::new())).unwrap();
        let result = tester.verify_data("items", &Record::new(), &Record::new());
        assert_eq!(result.error.as_deref(), Some(NOT_CONFIGURED));
    }

    #[test]
    fn test_verification_inside_test_procedure() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        browser.route("http://app.test/items", MockPage::new("Items"));

        let store = MemoryStore::new().with_row("items", json!({"id": 1, "name": "Lamp"}));
        let tester = LiveAppTester::new(config(dir.path()), Box::new(browser))
            .unwrap()
            .with_store(LazyStore::with_client(store));

        let verifier = tester.verifier();
        let mut test = |page: &mut dyn Page, url: &str| -> anyhow::Result<TestOutcome> {
            page.goto(&format!("{}/items", url))?;
            let conditions = json!({"id": 1}).as_object().cloned().unwrap_or_default();
            let expected = json!({"name": "Desk"}).as_object().cloned().unwrap_or_default();
            Ok(TestOutcome::from_verification(
                verifier.verify("items", &conditions, &expected),
            ))
        };
        let result = tester.run_test(&mut test, "item_saved");

        assert!(!result.success);
        let verification = result.data_verification.unwrap();
        assert_eq!(verification["success"], json!(false));
        assert_eq!(verification["diff"]["name"]["actual"], json!("Lamp"));
    }
}
