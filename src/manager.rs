//! Browser lifecycle and the page every tool acts on
//!
//! One [`BrowserManager`] belongs to one server instance. The browser is launched lazily on
//! the first page request and health-checked on every access; a browser that stopped
//! answering is torn down, and its page is dropped with it, so the next tool call sees no
//! page and is asked to navigate again.
//!
//! # Locking
//!
//! Both slots use `tokio::sync::Mutex` because they are held across CDP calls. The browser
//! slot is always taken before the page slot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::BrowserConfig;
use crate::browser::{BrowserError, BrowserWrapper, launch_browser};
use crate::page::{ChromiumPage, PageHandle};

/// Source of the page tools operate on
#[async_trait]
pub trait PageProvider: Send + Sync {
    /// The active page, or `None` when there is none (never launched, closed, crashed)
    async fn current_page(&self) -> Option<Arc<dyn PageHandle>>;

    /// Replace the active page with a fresh blank one, launching the browser if needed
    async fn open_page(&self) -> Result<Arc<dyn PageHandle>>;
}

pub struct BrowserManager {
    config: BrowserConfig,
    browser: Mutex<Option<BrowserWrapper>>,
    current_page: Mutex<Option<Arc<ChromiumPage>>>,
}

impl BrowserManager {
    /// Nothing is launched until a page is requested
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
            current_page: Mutex::new(None),
        }
    }

    /// Lock the browser slot, discarding a browser that fails its health check
    async fn checked_browser(&self) -> MutexGuard<'_, Option<BrowserWrapper>> {
        let mut guard = self.browser.lock().await;
        let healthy = match guard.as_ref() {
            Some(wrapper) => wrapper.is_alive().await,
            None => return guard,
        };
        if !healthy {
            warn!("Browser stopped responding; discarding it and its page");
            self.current_page.lock().await.take();
            if let Some(crashed) = guard.take() {
                crashed.close().await;
            }
        }
        guard
    }

    /// Close the page and the browser process. Safe to call repeatedly.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        self.current_page.lock().await.take();
        if let Some(wrapper) = guard.take() {
            info!("Shutting down browser");
            wrapper.close().await;
        }
        Ok(())
    }
}

#[async_trait]
impl PageProvider for BrowserManager {
    async fn current_page(&self) -> Option<Arc<dyn PageHandle>> {
        let guard = self.checked_browser().await;
        guard.as_ref()?;
        let page = self.current_page.lock().await.clone()?;
        Some(page as Arc<dyn PageHandle>)
    }

    async fn open_page(&self) -> Result<Arc<dyn PageHandle>> {
        let mut guard = self.checked_browser().await;
        if guard.is_none() {
            info!("Launching browser");
            let (browser, handler, profile_dir) = launch_browser(&self.config)
                .await
                .map_err(|e| BrowserError::LaunchFailed(format!("{e:#}")))?;
            *guard = Some(BrowserWrapper::new(browser, handler, profile_dir));
        }
        let wrapper = guard
            .as_ref()
            .context("Browser slot empty right after launch")?;

        // One page at a time, so "the current page" is never ambiguous
        let mut current = self.current_page.lock().await;
        current.take();
        if let Ok(existing) = wrapper.browser().pages().await {
            for page in existing {
                if let Err(e) = page.close().await {
                    debug!("Closing stale page failed: {}", e);
                }
            }
        }

        let page = wrapper
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        let page = Arc::new(ChromiumPage::new(page));
        *current = Some(page.clone());
        Ok(page as Arc<dyn PageHandle>)
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        if self.browser.get_mut().is_some() {
            warn!("BrowserManager dropped without shutdown(); the browser process is killed uncleanly");
        }
    }
}
