//! Owned browser process plus its handler task and profile directory

use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The handler task is aborted when the wrapper drops. The profile directory is only
/// removed by [`BrowserWrapper::close`], after the process exited.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, profile_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            profile_dir: Some(profile_dir),
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Cheap liveness check over CDP
    pub(crate) async fn is_alive(&self) -> bool {
        match self.browser.version().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Browser health check failed: {}", e);
                false
            }
        }
    }

    /// Close the process, wait for it to exit, then remove the profile
    ///
    /// Errors are logged; a crashed browser cannot be closed cleanly.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for browser exit failed: {}", e);
        }
        self.remove_profile();
    }

    fn remove_profile(&mut self) {
        if let Some(path) = self.profile_dir.take() {
            info!("Removing browser profile: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove browser profile {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(path) = &self.profile_dir {
            warn!(
                "Browser dropped without close(); profile left behind at {}",
                path.display()
            );
        }
    }
}
