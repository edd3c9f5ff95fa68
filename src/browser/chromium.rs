//! Chromium driver over the Chrome DevTools Protocol.
//!
//! chromiumoxide is async; the driver owns a tokio runtime and blocks on it
//! so the rest of the crate stays synchronous. Every session launches its own
//! browser process, which is torn down in `close`.

use chromiumoxide::cdp::browser_protocol::network::{EventLoadingFailed, EventRequestWillBeSent};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use super::types::{
    BrowserError, BrowserResult, EventSender, EventSubscription, PageEvent, SessionOptions,
};
use super::{BrowserDriver, BrowserSession, Page};
use crate::types::{ConsoleEntry, NetworkFailure};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

type Subscribers = Arc<Mutex<Vec<EventSender>>>;

/// Launches headless or headed Chromium sessions
pub struct ChromiumDriver {
    runtime: Arc<Runtime>,
}

impl ChromiumDriver {
    pub fn new() -> BrowserResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl BrowserDriver for ChromiumDriver {
    fn open_session(&self, options: &SessionOptions) -> BrowserResult<Box<dyn BrowserSession>> {
        let runtime = self.runtime.clone();
        let options = options.clone();

        let session = self.runtime.block_on(async move {
            let mut builder = BrowserConfig::builder()
                .window_size(options.viewport.width, options.viewport.height)
                .viewport(CdpViewport {
                    width: options.viewport.width,
                    height: options.viewport.height,
                    ..Default::default()
                });
            if !options.headless {
                builder = builder.with_head();
            }
            let config = builder.build().map_err(BrowserError::Launch)?;

            tracing::debug!(headless = options.headless, "launching chromium");
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| BrowserError::Launch(e.to_string()))?;

            let mut tasks = vec![tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(err) = event {
                        tracing::debug!(error = %err, "chromium handler stopped");
                        break;
                    }
                }
            })];

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::Launch(e.to_string()))?;

            let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
            tasks.push(spawn_console_pump(&page, subscribers.clone()).await?);
            tasks.push(spawn_network_pump(&page, subscribers.clone()).await?);

            Ok::<_, BrowserError>(ChromiumSession {
                tab: ChromiumTab {
                    runtime,
                    page,
                },
                browser: Some(browser),
                subscribers,
                tasks,
            })
        })?;

        Ok(Box::new(session))
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

fn broadcast(subscribers: &Subscribers, event: PageEvent) {
    if let Ok(mut senders) = subscribers.lock() {
        senders.retain(|sender| sender.emit(event.clone()));
    }
}

async fn spawn_console_pump(
    page: &chromiumoxide::Page,
    subscribers: Subscribers,
) -> BrowserResult<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| BrowserError::Subscription(e.to_string()))?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let kind = format!("{:?}", event.r#type).to_lowercase();
            let text = event
                .args
                .iter()
                .map(|arg| match (&arg.value, &arg.description) {
                    (Some(Value::String(s)), _) => s.clone(),
                    (Some(value), _) => value.to_string(),
                    (None, Some(description)) => description.clone(),
                    (None, None) => String::new(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            broadcast(&subscribers, PageEvent::Console(ConsoleEntry::new(kind, text)));
        }
    }))
}

/// Pairs `requestWillBeSent` with `loadingFailed` to recover the failed URL
async fn spawn_network_pump(
    page: &chromiumoxide::Page,
    subscribers: Subscribers,
) -> BrowserResult<JoinHandle<()>> {
    let mut sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| BrowserError::Subscription(e.to_string()))?;
    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(|e| BrowserError::Subscription(e.to_string()))?;

    Ok(tokio::spawn(async move {
        let mut urls: HashMap<String, String> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = sent.next() => {
                    urls.insert(event.request_id.inner().clone(), event.request.url.clone());
                }
                Some(event) = failed.next() => {
                    let url = urls
                        .remove(event.request_id.inner())
                        .unwrap_or_default();
                    broadcast(
                        &subscribers,
                        PageEvent::RequestFailed(NetworkFailure::new(url, event.error_text.clone())),
                    );
                }
                else => break,
            }
        }
    }))
}

struct ChromiumSession {
    tab: ChromiumTab,
    browser: Option<Browser>,
    subscribers: Subscribers,
    tasks: Vec<JoinHandle<()>>,
}

impl BrowserSession for ChromiumSession {
    fn page(&mut self) -> &mut dyn Page {
        &mut self.tab
    }

    fn subscribe(&mut self) -> BrowserResult<EventSubscription> {
        if self.browser.is_none() {
            return Err(BrowserError::Closed);
        }
        let (sender, subscription) = EventSubscription::channel();
        self.subscribers
            .lock()
            .map_err(|_| BrowserError::Subscription("subscriber list poisoned".into()))?
            .push(sender);
        Ok(subscription)
    }

    fn close(&mut self) -> BrowserResult<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        if let Ok(mut senders) = self.subscribers.lock() {
            senders.clear();
        }

        let result = self.tab.runtime.block_on(async {
            browser
                .close()
                .await
                .map_err(|e| BrowserError::Teardown(e.to_string()))?;
            browser.wait().await?;
            Ok::<_, BrowserError>(())
        });
        for task in self.tasks.drain(..) {
            task.abort();
        }
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!(error = %err, "chromium teardown failed");
        }
    }
}

struct ChromiumTab {
    runtime: Arc<Runtime>,
    page: chromiumoxide::Page,
}

impl ChromiumTab {
    fn eval(&self, script: &str) -> BrowserResult<Value> {
        self.runtime.block_on(async {
            let result = self
                .page
                .evaluate(script)
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?;
            result
                .into_value::<Value>()
                .map_err(|e| BrowserError::Script(e.to_string()))
        })
    }

    /// `Some(visible)` when the selector matches, `None` otherwise
    fn visibility(&self, selector: &str) -> BrowserResult<Option<bool>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return null; \
             const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
             return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0; }})()",
            js_string(selector)
        );
        match self.eval(&script)? {
            Value::Bool(visible) => Ok(Some(visible)),
            _ => Ok(None),
        }
    }
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

impl Page for ChromiumTab {
    fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.runtime.block_on(async {
            self.page
                .goto(url)
                .await
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation {
                    url: url.to_string(),
                    details: e.to_string(),
                })
        })
    }

    fn click(&mut self, selector: &str) -> BrowserResult<()> {
        self.runtime.block_on(async {
            let element = self
                .page
                .find_element(selector)
                .await
                .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
            element
                .click()
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?;
            Ok(())
        })
    }

    fn fill(&mut self, selector: &str, text: &str) -> BrowserResult<()> {
        self.runtime.block_on(async {
            let element = self
                .page
                .find_element(selector)
                .await
                .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
            element
                .click()
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?
                .type_str(text)
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?;
            Ok(())
        })
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> BrowserResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut last = None;
        loop {
            last = self.visibility(selector)?.or(last);
            if last == Some(true) || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        last.ok_or_else(|| BrowserError::Timeout {
            selector: selector.to_string(),
            timeout,
        })
    }

    fn text_content(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return null; \
             return ('value' in el && typeof el.value === 'string') ? el.value : el.textContent; }})()",
            js_string(selector)
        );
        match self.eval(&script)? {
            Value::String(text) => Ok(Some(text)),
            _ => Ok(None),
        }
    }

    fn url(&mut self) -> BrowserResult<String> {
        self.runtime.block_on(async {
            let url = self
                .page
                .url()
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?;
            Ok(url.unwrap_or_default())
        })
    }

    fn screenshot(&mut self, path: &Path, full_page: bool) -> BrowserResult<()> {
        self.runtime.block_on(async {
            let params = ScreenshotParams::builder().full_page(full_page).build();
            self.page
                .save_screenshot(params, path)
                .await
                .map(|_| ())
                .map_err(|e| BrowserError::Screenshot(e.to_string()))
        })
    }
}
