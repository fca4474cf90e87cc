//! chromiumoxide-backed implementation of the browser session.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;
use url::Url;

use crate::browser::{Locator, SessionError, UiSession, WaitOpts};

/// How often `wait_for` re-checks for the awaited element.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bound on the implicit wait performed before clicking or typing.
const ACTION_WAIT: Duration = Duration::from_secs(10);

/// A headless browsing context for one sign-in attempt.
///
/// Launches an isolated headless Chromium with a fixed `en` locale, the
/// locale the sign-in flow's text locators are written against. The CDP
/// event handler runs on its own task for the lifetime of the session.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    /// Launch a browser and open a blank page.
    ///
    /// # Errors
    ///
    /// Fails if Chromium cannot be found or launched.
    pub async fn launch() -> Result<Self, SessionError> {
        let config = BrowserConfig::builder()
            .arg("--lang=en")
            .build()
            .map_err(SessionError::Engine)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(SessionError::engine)?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(error) => {
                handler.abort();
                return Err(SessionError::engine(error));
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Release the browser and its event handler.
    ///
    /// Consumes the session, so it can only happen once. Failures during
    /// teardown are logged and swallowed: by this point the sign-in outcome
    /// is already decided.
    pub async fn close(mut self) {
        if let Err(error) = self.browser.close().await {
            debug!("failed to close browser cleanly: {error}");
        }
        if let Err(error) = self.browser.wait().await {
            debug!("failed to await browser exit: {error}");
        }
        self.handler.abort();
    }

    async fn find(&self, locator: &Locator) -> Result<Element, SessionError> {
        match locator {
            Locator::Css(selector) => self.page.find_element(selector.as_ref()).await,
            Locator::Text { tag, needle } => {
                self.page
                    .find_xpath(format!("//{tag}[contains(., '{needle}')]"))
                    .await
            }
        }
        .map_err(|_| SessionError::ElementNotFound(locator.to_string()))
    }
}

#[async_trait]
impl UiSession for ChromiumSession {
    async fn navigate(&self, url: &Url) -> Result<(), SessionError> {
        self.page
            .goto(url.as_str())
            .await
            .map_err(SessionError::engine)?;
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, opts: WaitOpts) -> Result<(), SessionError> {
        let deadline = opts.timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if let Ok(element) = self.find(locator).await {
                if !opts.visible || element.clickable_point().await.is_ok() {
                    return Ok(());
                }
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(SessionError::ElementNotFound(locator.to_string()));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), SessionError> {
        self.wait_for(locator, WaitOpts::bounded(ACTION_WAIT)).await?;
        self.find(locator)
            .await?
            .type_str(text)
            .await
            .map_err(SessionError::engine)?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        self.wait_for(locator, WaitOpts::bounded(ACTION_WAIT)).await?;
        self.find(locator)
            .await?
            .click()
            .await
            .map_err(SessionError::engine)?;
        Ok(())
    }

    async fn read_text(&self, locator: &Locator) -> Result<String, SessionError> {
        let text = self
            .find(locator)
            .await?
            .inner_text()
            .await
            .map_err(SessionError::engine)?;
        Ok(text.unwrap_or_default())
    }
}
