use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Tab};
use thiserror::Error;
use tracing::{debug, warn};

use common::error::AppError;

/// CSS selectors for the catalog's result list markup.
const RESULT_SELECTOR: &str = ".RPCAllsiteSearchResultList";
const TITLE_SELECTOR: &str = ".CoveoResultLink";
const DESCRIPTION_SELECTOR: &str = ".result-body";
const DATE_SELECTOR: &str = ".date";
const AUTHORS_SELECTOR: &str = ".author";
const NEXT_PAGE_SELECTOR: &str = ".coveo-pager-next";
const IMAGE_SELECTOR: &str = "img";

/// Attribute used to tag a result element so its detachment can be observed
/// across a page turn.
const NAV_TOKEN_ATTR: &str = "data-nav-token";

/// Interval between polls while waiting for a tagged element to detach.
const DETACH_POLL_INTERVAL_MS: u64 = 200;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("result handle at index {index} is no longer attached")]
    Stale { index: usize },
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl From<BrowserError> for AppError {
    fn from(err: BrowserError) -> Self {
        AppError::Browser(err.to_string())
    }
}

/// Raw sub-element reads for one catalog result. A `None` field means the
/// sub-element was absent or unreadable; absence is data, not a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResult {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub authors: Option<String>,
    pub detail_url: Option<String>,
    pub image_url: Option<String>,
}

/// Seam over the browser-automation driver.
///
/// The result list is never handed out as retained handles: every read goes
/// back through `read_result(index)`, which re-resolves the live list. That
/// makes handle retention across re-renders impossible by construction.
pub trait CatalogBrowser: Send + Sync {
    fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Block until the result-list region is present, up to `timeout`.
    fn wait_for_result_list(&self, timeout: Duration) -> Result<(), BrowserError>;

    /// Re-resolve the live result list and return its current length.
    fn result_count(&self) -> Result<usize, BrowserError>;

    /// Re-resolve the live result list and read the entry at `index`.
    fn read_result(&self, index: usize) -> Result<RawResult, BrowserError>;

    /// Tag the first result entry and return an identifying token, used to
    /// detect that the page content has been replaced.
    fn first_result_token(&self) -> Result<Option<String>, BrowserError>;

    /// Locate and click the next-page control. `Ok(false)` means the control
    /// is absent or unclickable, which ends pagination normally.
    fn advance_page(&self) -> Result<bool, BrowserError>;

    /// Block until the element tagged with `token` has left the DOM.
    fn wait_until_detached(&self, token: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Open `detail_url` in an isolated tab and scan its outbound links for
    /// one ending in `.pdf`. The tab is closed on every exit path.
    fn find_pdf_link(&self, detail_url: &str) -> Result<Option<String>, BrowserError>;
}

/// `CatalogBrowser` over a headless Chrome session. One session and one
/// primary tab are shared for the whole run; PDF-link scans open and close
/// their own short-lived tab.
pub struct ChromeCatalogBrowser {
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeCatalogBrowser {
    pub fn new() -> Result<Self, BrowserError> {
        let browser = create_browser()?;
        let tab = browser.new_tab().map_err(driver_err)?;

        Ok(Self {
            browser,
            tab,
        })
    }

    fn is_token_detached(&self, token: &str) -> Result<bool, BrowserError> {
        let script = format!(
            "document.querySelector('[{NAV_TOKEN_ATTR}=\"{token}\"]') === null"
        );
        let result = self.tab.evaluate(&script, false).map_err(driver_err)?;
        Ok(result
            .value
            .as_ref()
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }
}

impl CatalogBrowser for ChromeCatalogBrowser {
    fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.tab
            .navigate_to(url)
            .map_err(driver_err)?
            .wait_until_navigated()
            .map_err(driver_err)?;
        Ok(())
    }

    fn wait_for_result_list(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.tab
            .wait_for_element_with_custom_timeout(RESULT_SELECTOR, timeout)
            .map(|_| ())
            .map_err(|_| BrowserError::Timeout("catalog result list".to_string()))
    }

    fn result_count(&self) -> Result<usize, BrowserError> {
        match self.tab.find_elements(RESULT_SELECTOR) {
            Ok(elements) => Ok(elements.len()),
            // The driver reports an empty selector match as an error.
            Err(_) => Ok(0),
        }
    }

    fn read_result(&self, index: usize) -> Result<RawResult, BrowserError> {
        // Re-acquire the list on every call; any handle captured earlier may
        // have been invalidated by a re-render.
        let results = self
            .tab
            .find_elements(RESULT_SELECTOR)
            .map_err(driver_err)?;
        let entry = results.get(index).ok_or(BrowserError::Stale { index })?;

        let title_element = entry.find_element(TITLE_SELECTOR).ok();
        let title = title_element
            .as_ref()
            .and_then(|element| element.get_inner_text().ok());
        let detail_url = title_element
            .as_ref()
            .and_then(|element| element.get_attribute_value("href").ok())
            .flatten();

        let description = entry
            .find_element(DESCRIPTION_SELECTOR)
            .ok()
            .and_then(|element| element.get_inner_text().ok());
        let date = entry
            .find_element(DATE_SELECTOR)
            .ok()
            .and_then(|element| element.get_inner_text().ok());
        let authors = entry
            .find_element(AUTHORS_SELECTOR)
            .ok()
            .and_then(|element| element.get_inner_text().ok());

        // Best effort only; a missing or unreadable thumbnail never fails
        // the read.
        let image_url = entry
            .find_element(IMAGE_SELECTOR)
            .ok()
            .and_then(|element| element.get_attribute_value("src").ok())
            .flatten();

        Ok(RawResult {
            title,
            description,
            date,
            authors,
            detail_url,
            image_url,
        })
    }

    fn first_result_token(&self) -> Result<Option<String>, BrowserError> {
        let token = uuid::Uuid::new_v4().to_string();
        let script = format!(
            r#"(function() {{
                const first = document.querySelector('{RESULT_SELECTOR}');
                if (!first) return false;
                first.setAttribute('{NAV_TOKEN_ATTR}', '{token}');
                return true;
            }})()"#
        );
        let result = self.tab.evaluate(&script, false).map_err(driver_err)?;
        let tagged = result
            .value
            .as_ref()
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        Ok(tagged.then_some(token))
    }

    fn advance_page(&self) -> Result<bool, BrowserError> {
        let Ok(control) = self.tab.find_element(NEXT_PAGE_SELECTOR) else {
            debug!("next-page control not present");
            return Ok(false);
        };

        if let Err(err) = control.scroll_into_view() {
            debug!(error = %err, "failed to scroll next-page control into view");
        }

        match control.click() {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(error = %err, "next-page control rejected the click");
                Ok(false)
            }
        }
    }

    fn wait_until_detached(&self, token: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.is_token_detached(token)? {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout(
                    "previous page to become stale".to_string(),
                ));
            }
            std::thread::sleep(Duration::from_millis(DETACH_POLL_INTERVAL_MS));
        }
    }

    fn find_pdf_link(&self, detail_url: &str) -> Result<Option<String>, BrowserError> {
        let tab = self.browser.new_tab().map_err(driver_err)?;
        // The guard closes the tab on every exit path, including errors.
        let guard = TabGuard::new(tab);

        guard
            .tab()
            .navigate_to(detail_url)
            .map_err(driver_err)?
            .wait_until_navigated()
            .map_err(driver_err)?;

        let Ok(links) = guard.tab().find_elements("a") else {
            return Ok(None);
        };

        for link in links {
            if let Ok(Some(href)) = link.get_attribute_value("href") {
                if href.ends_with(".pdf") {
                    return Ok(Some(href));
                }
            }
        }

        Ok(None)
    }
}

/// Closes an auxiliary tab when dropped, so PDF-link scans cannot leak
/// browsing contexts on any exit path.
struct TabGuard {
    tab: Arc<Tab>,
}

impl TabGuard {
    fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn tab(&self) -> &Tab {
        &self.tab
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tab.close(true) {
            debug!(error = %err, "failed to close auxiliary tab");
        }
    }
}

/// Launch a headless Chrome instance, honouring the container feature flag.
fn create_browser() -> Result<Browser, BrowserError> {
    #[cfg(feature = "docker")]
    {
        let options = headless_chrome::LaunchOptionsBuilder::default()
            .sandbox(false)
            .build()
            .map_err(|err| BrowserError::Driver(format!("failed to configure Chrome: {err}")))?;
        Browser::new(options)
            .map_err(|err| BrowserError::Driver(format!("failed to start Chrome: {err}")))
    }
    #[cfg(not(feature = "docker"))]
    {
        Browser::default()
            .map_err(|err| BrowserError::Driver(format!("failed to start Chrome: {err}")))
    }
}

fn driver_err(err: anyhow::Error) -> BrowserError {
    BrowserError::Driver(err.to_string())
}
