use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use common::error::AppError;

use crate::browser::CatalogBrowser;

/// One paginated batch of catalog results.
///
/// Only the page number and result count are carried; the entries themselves
/// stay in the live browser session and are re-read by index, because every
/// handle is invalidated as soon as the navigator advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultPage {
    pub number: usize,
    pub result_count: usize,
}

/// Drives the browser through the catalog's result pages.
///
/// Produces a lazy, finite, non-restartable sequence: the first page comes
/// from the seed URL, each following page from clicking the next-page
/// control. A missing or unclickable control ends the sequence normally.
/// Only the initial result-list wait is fatal to the run.
pub struct PageNavigator {
    browser: Arc<dyn CatalogBrowser>,
    seed_url: String,
    result_wait: Duration,
    page_turn_wait: Duration,
    state: NavigatorState,
    page_number: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavigatorState {
    NotStarted,
    Active,
    Exhausted,
}

impl PageNavigator {
    pub fn new(
        browser: Arc<dyn CatalogBrowser>,
        seed_url: impl Into<String>,
        result_wait: Duration,
        page_turn_wait: Duration,
    ) -> Self {
        Self {
            browser,
            seed_url: seed_url.into(),
            result_wait,
            page_turn_wait,
            state: NavigatorState::NotStarted,
            page_number: 0,
        }
    }

    /// Yield the next result page, or `None` once pagination is exhausted.
    pub fn next_page(&mut self) -> Result<Option<ResultPage>, AppError> {
        match self.state {
            NavigatorState::NotStarted => self.open_first_page().map(Some),
            NavigatorState::Active => self.turn_page(),
            NavigatorState::Exhausted => Ok(None),
        }
    }

    fn open_first_page(&mut self) -> Result<ResultPage, AppError> {
        self.browser.navigate(&self.seed_url)?;

        // Without an initial result list nothing can ever be produced, so
        // this is the one wait whose failure aborts the whole run.
        self.browser
            .wait_for_result_list(self.result_wait)
            .map_err(|err| {
                AppError::Processing(format!(
                    "catalog result list never appeared at {}: {err}",
                    self.seed_url
                ))
            })?;

        let result_count = self.browser.result_count()?;
        self.state = NavigatorState::Active;
        self.page_number = 1;
        info!(page = self.page_number, result_count, "opened first result page");

        Ok(ResultPage {
            number: self.page_number,
            result_count,
        })
    }

    fn turn_page(&mut self) -> Result<Option<ResultPage>, AppError> {
        let token = match self.browser.first_result_token() {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "could not tag current page; ending pagination");
                self.state = NavigatorState::Exhausted;
                return Ok(None);
            }
        };

        match self.browser.advance_page() {
            Ok(true) => {}
            Ok(false) => {
                info!(pages = self.page_number, "no further result pages");
                self.state = NavigatorState::Exhausted;
                return Ok(None);
            }
            Err(err) => {
                // Errors while looking for the control are the normal end
                // condition, not a failure.
                info!(pages = self.page_number, error = %err, "pager lookup failed; ending pagination");
                self.state = NavigatorState::Exhausted;
                return Ok(None);
            }
        }

        if let Some(token) = token {
            if let Err(err) = self.browser.wait_until_detached(&token, self.page_turn_wait) {
                warn!(error = %err, "previous page never became stale; ending pagination");
                self.state = NavigatorState::Exhausted;
                return Ok(None);
            }
        }

        if let Err(err) = self.browser.wait_for_result_list(self.result_wait) {
            warn!(error = %err, "result list missing after page turn; ending pagination");
            self.state = NavigatorState::Exhausted;
            return Ok(None);
        }

        let result_count = self.browser.result_count()?;
        self.page_number += 1;
        info!(page = self.page_number, result_count, "advanced to next result page");

        Ok(Some(ResultPage {
            number: self.page_number,
            result_count,
        }))
    }
}
