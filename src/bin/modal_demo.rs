//! Modal-open demo: a test that fails until a fix makes the modal visible.
//!
//! Runs against the scripted mock browser, so no real app or browser is
//! needed. The fix procedure "patches" the app by swapping the served page.

use std::time::Duration;

use live_app_tester::browser::{MockBrowser, MockPage, Page};
use live_app_tester::{
    Confidence, FixDescriptor, LiveAppTester, TestOutcome, TestResult, config, logging,
};

const TRIGGER: &str = "[data-testid=open-modal]";
const MODAL: &str = "[role=dialog]";

fn app_page(modal_visible: bool) -> MockPage {
    MockPage::new("Inventory")
        .element(TRIGGER)
        .on_click(TRIGGER, MODAL, modal_visible)
        .console("log", "inventory loaded")
}

fn main() -> anyhow::Result<()> {
    logging::init(std::env::args().any(|a| a == "--verbose" || a == "-v"));

    let config = config::get().clone();
    let app_url = config.app_url.clone();

    let browser = MockBrowser::new();
    browser.route(&app_url, app_page(false));

    let tester = LiveAppTester::new(config, Box::new(browser.clone()))?;

    let mut test = |page: &mut dyn Page, url: &str| -> anyhow::Result<TestOutcome> {
        page.goto(url)?;
        page.click(TRIGGER)?;
        if !page.wait_for_selector(MODAL, Duration::from_secs(3))? {
            return Ok(TestOutcome::failed("Modal not visible after click"));
        }
        Ok(TestOutcome::passed())
    };

    let mut fix = |result: &TestResult, iteration: usize| -> Option<FixDescriptor> {
        let error = result.error.as_deref()?;
        if !error.contains("Modal not visible") {
            return None;
        }
        tracing::info!(iteration, "patching modal visibility");
        browser.route(&app_url, app_page(true));
        Some(
            FixDescriptor::new()
                .diagnosis("Modal mounts with display: none and is never toggled")
                .applied("Toggle modal visibility in the click handler")
                .confidence(Confidence::High),
        )
    };

    let result = tester.run_with_fix_loop(&mut test, &mut fix, "modal_open_test");
    println!("{}", tester.generate_report(&result));

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
