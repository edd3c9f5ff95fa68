//! Browser driver abstraction.
//!
//! The executor only needs a narrow slice of a browser: open an isolated
//! session with a fixed viewport, drive one page, capture a full-page
//! screenshot and observe console / failed-request events. Implementations:
//! - `MockBrowser` for tests and demos (scripted pages, rendered screenshots)
//! - `ChromiumDriver` over the Chrome DevTools Protocol (feature `chromium`)

pub mod framebuffer;
pub mod mock;
pub mod types;

#[cfg(feature = "chromium")]
pub mod chromium;

use std::path::Path;
use std::time::Duration;

pub use framebuffer::Framebuffer;
pub use mock::{MockBrowser, MockElement, MockPage};
pub use types::{
    BrowserError, BrowserResult, EventSender, EventSubscription, PageEvent, SessionOptions,
    Viewport,
};

#[cfg(feature = "chromium")]
pub use chromium::ChromiumDriver;

/// A single page handle handed to test procedures
pub trait Page {
    /// Navigate to an absolute URL and wait for the load to finish
    fn goto(&mut self, url: &str) -> BrowserResult<()>;

    /// Click the first element matching `selector`
    fn click(&mut self, selector: &str) -> BrowserResult<()>;

    /// Type `text` into the first element matching `selector`
    fn fill(&mut self, selector: &str, text: &str) -> BrowserResult<()>;

    /// Wait for an element matching `selector` to exist and report whether it is visible.
    ///
    /// Returns `BrowserError::Timeout` when nothing matches within `timeout`.
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> BrowserResult<bool>;

    /// Text content of the first element matching `selector`, if any
    fn text_content(&mut self, selector: &str) -> BrowserResult<Option<String>>;

    /// URL of the current document
    fn url(&mut self) -> BrowserResult<String>;

    /// Capture a screenshot to `path`
    fn screenshot(&mut self, path: &Path, full_page: bool) -> BrowserResult<()>;
}

/// An isolated browsing context with one page
pub trait BrowserSession {
    fn page(&mut self) -> &mut dyn Page;

    /// Subscribe to console messages and failed requests for the rest of the session
    fn subscribe(&mut self) -> BrowserResult<EventSubscription>;

    /// Tear the session down. Calling it twice is a no-op.
    fn close(&mut self) -> BrowserResult<()>;
}

/// Launches browser sessions
pub trait BrowserDriver {
    fn open_session(&self, options: &SessionOptions) -> BrowserResult<Box<dyn BrowserSession>>;

    /// Driver identifier for logs (e.g. "mock", "chromium")
    fn name(&self) -> &str;
}
