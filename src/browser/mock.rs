//! Scripted in-memory browser.
//!
//! `MockBrowser` serves `MockPage` definitions keyed by URL. Pages declare
//! which selectors exist and whether they are visible, what a click reveals,
//! and which console messages and failed requests they emit on load.
//! Screenshots are rendered through [`Framebuffer`] and written as real PNGs.
//!
//! The browser is a cheap handle over shared state, so a fix procedure can
//! swap a route while the loop is running to simulate a code change.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::framebuffer::Framebuffer;
use super::types::{
    BrowserError, BrowserResult, EventSender, EventSubscription, PageEvent, SessionOptions,
    Viewport,
};
use super::{BrowserDriver, BrowserSession, Page};
use crate::types::{ConsoleEntry, NetworkFailure};

const BACKGROUND: [u8; 3] = [245, 245, 245];
const FOREGROUND: [u8; 3] = [20, 20, 20];
const HEADER: [u8; 3] = [40, 90, 160];

/// A scripted element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockElement {
    pub visible: bool,
    pub text: String,
}

/// A scripted page served at one URL
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    title: String,
    elements: BTreeMap<String, MockElement>,
    on_click: HashMap<String, Vec<(String, MockElement)>>,
    console: Vec<ConsoleEntry>,
    failed_requests: Vec<NetworkFailure>,
}

impl MockPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Add a visible element
    pub fn element(mut self, selector: impl Into<String>) -> Self {
        self.elements.insert(
            selector.into(),
            MockElement {
                visible: true,
                text: String::new(),
            },
        );
        self
    }

    /// Add a visible element with text content
    pub fn text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.insert(
            selector.into(),
            MockElement {
                visible: true,
                text: text.into(),
            },
        );
        self
    }

    /// Add an element that exists but is not visible
    pub fn hidden(mut self, selector: impl Into<String>) -> Self {
        self.elements.insert(selector.into(), MockElement::default());
        self
    }

    /// Clicking `trigger` attaches `target` with the given visibility
    pub fn on_click(
        mut self,
        trigger: impl Into<String>,
        target: impl Into<String>,
        visible: bool,
    ) -> Self {
        self.on_click.entry(trigger.into()).or_default().push((
            target.into(),
            MockElement {
                visible,
                text: String::new(),
            },
        ));
        self
    }

    /// Console message emitted when the page loads
    pub fn console(mut self, kind: impl Into<String>, text: impl Into<String>) -> Self {
        self.console.push(ConsoleEntry::new(kind, text));
        self
    }

    /// Request failure emitted when the page loads
    pub fn request_failed(mut self, url: impl Into<String>, failure: impl Into<String>) -> Self {
        self.failed_requests.push(NetworkFailure::new(url, failure));
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, MockPage>,
    sessions_opened: usize,
    sessions_closed: usize,
    launch_error: Option<String>,
    fail_screenshots: bool,
    last_options: Option<SessionOptions>,
}

/// Scripted browser driver
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test procedure may poison the lock; the state is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `page` at `url`, replacing any previous definition
    pub fn route(&self, url: impl AsRef<str>, page: MockPage) -> &Self {
        self.lock().routes.insert(normalize_url(url.as_ref()), page);
        self
    }

    /// Make every session launch fail with `message`
    pub fn fail_launch(&self, message: impl Into<String>) -> &Self {
        self.lock().launch_error = Some(message.into());
        self
    }

    /// Make screenshot capture fail
    pub fn fail_screenshots(&self, fail: bool) -> &Self {
        self.lock().fail_screenshots = fail;
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().sessions_closed
    }

    /// Options passed to the most recent session launch
    pub fn last_options(&self) -> Option<SessionOptions> {
        self.lock().last_options.clone()
    }
}

impl BrowserDriver for MockBrowser {
    fn open_session(&self, options: &SessionOptions) -> BrowserResult<Box<dyn BrowserSession>> {
        let mut state = self.lock();
        state.last_options = Some(options.clone());
        if let Some(message) = &state.launch_error {
            return Err(BrowserError::Launch(message.clone()));
        }
        state.sessions_opened += 1;
        drop(state);

        Ok(Box::new(MockSession {
            page: MockTab {
                browser: self.clone(),
                viewport: options.viewport,
                url: "about:blank".to_string(),
                title: String::new(),
                elements: BTreeMap::new(),
                on_click: HashMap::new(),
                subscribers: Vec::new(),
            },
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockSession {
    page: MockTab,
    closed: bool,
}

impl BrowserSession for MockSession {
    fn page(&mut self) -> &mut dyn Page {
        &mut self.page
    }

    fn subscribe(&mut self) -> BrowserResult<EventSubscription> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        let (sender, subscription) = EventSubscription::channel();
        self.page.subscribers.push(sender);
        Ok(subscription)
    }

    fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page.subscribers.clear();
        self.page.browser.lock().sessions_closed += 1;
        Ok(())
    }
}

struct MockTab {
    browser: MockBrowser,
    viewport: Viewport,
    url: String,
    title: String,
    elements: BTreeMap<String, MockElement>,
    on_click: HashMap<String, Vec<(String, MockElement)>>,
    subscribers: Vec<EventSender>,
}

impl MockTab {
    fn emit(&mut self, event: PageEvent) {
        self.subscribers.retain(|sender| sender.emit(event.clone()));
    }

    fn element(&self, selector: &str) -> BrowserResult<&MockElement> {
        self.elements
            .get(selector)
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
    }

    fn render(&self) -> Framebuffer {
        let mut fb =
            Framebuffer::with_color(self.viewport.width, self.viewport.height, BACKGROUND);
        fb.banner(0, 24, &self.url, [255, 255, 255], HEADER);
        fb.text(8, 40, &self.title, FOREGROUND, BACKGROUND);

        let mut y = 64;
        for (selector, element) in self.elements.iter().filter(|(_, e)| e.visible) {
            let line = if element.text.is_empty() {
                selector.clone()
            } else {
                format!("{} {}", selector, element.text)
            };
            fb.text(8, y, &line, FOREGROUND, BACKGROUND);
            y += 12;
        }
        fb
    }
}

impl Page for MockTab {
    fn goto(&mut self, url: &str) -> BrowserResult<()> {
        let page = self.browser.lock().routes.get(&normalize_url(url)).cloned();
        let Some(page) = page else {
            let failure = "net::ERR_CONNECTION_REFUSED";
            self.emit(PageEvent::RequestFailed(NetworkFailure::new(url, failure)));
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                details: failure.to_string(),
            });
        };

        self.url = url.to_string();
        self.title = page.title;
        self.elements = page.elements;
        self.on_click = page.on_click;
        for entry in page.console {
            self.emit(PageEvent::Console(entry));
        }
        for failure in page.failed_requests {
            self.emit(PageEvent::RequestFailed(failure));
        }
        Ok(())
    }

    fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.element(selector)?;
        if let Some(attached) = self.on_click.get(selector).cloned() {
            for (target, element) in attached {
                self.elements.insert(target, element);
            }
        }
        Ok(())
    }

    fn fill(&mut self, selector: &str, text: &str) -> BrowserResult<()> {
        self.element(selector)?;
        if let Some(element) = self.elements.get_mut(selector) {
            element.text = text.to_string();
        }
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> BrowserResult<bool> {
        match self.elements.get(selector) {
            Some(element) => Ok(element.visible),
            None => Err(BrowserError::Timeout {
                selector: selector.to_string(),
                timeout,
            }),
        }
    }

    fn text_content(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        Ok(self.elements.get(selector).map(|e| e.text.clone()))
    }

    fn url(&mut self) -> BrowserResult<String> {
        Ok(self.url.clone())
    }

    fn screenshot(&mut self, path: &Path, _full_page: bool) -> BrowserResult<()> {
        if self.browser.lock().fail_screenshots {
            return Err(BrowserError::Screenshot("capture disabled".into()));
        }
        self.render().save_png(path)
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
