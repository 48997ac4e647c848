//! Launching Chromium with the configured window, headless mode and stealth flags

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig, HeadlessMode};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::discovery::{download_managed_browser, find_browser_executable};
use crate::BrowserConfig;
use crate::utils::constants::{CDP_REQUEST_TIMEOUT, CHROME_USER_AGENT};

/// Removes a freshly created profile directory unless the launch succeeded
struct TempDirGuard {
    path: PathBuf,
    keep: bool,
}

impl TempDirGuard {
    fn create(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create profile directory {}", path.display()))?;
        Ok(Self { path, keep: false })
    }

    fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed profile directory after failed launch: {}", self.path.display()),
            Err(e) => warn!("Failed to remove profile directory {}: {}", self.path.display(), e),
        }
    }
}

/// Extra command line flags for the configured launch
pub(crate) fn launch_args(config: &BrowserConfig, in_container: bool) -> Vec<String> {
    let mut args: Vec<String> = [
        "--disable-blink-features=AutomationControlled",
        "--disable-infobars",
        "--disable-notifications",
        "--disable-popup-blocking",
        "--disable-extensions",
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-breakpad",
        "--disable-hang-monitor",
        "--disable-ipc-flooding-protection",
        "--disable-prompt-on-repost",
        "--disable-features=TranslateUI",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--use-mock-keychain",
        "--hide-scrollbars",
        // Autoplay must work for players to start requesting manifests
        "--autoplay-policy=no-user-gesture-required",
        "--mute-audio",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("--user-agent={CHROME_USER_AGENT}"));

    if config.disable_security {
        args.extend(
            [
                "--disable-web-security",
                "--disable-features=IsolateOrigins,site-per-process",
                "--ignore-certificate-errors",
            ]
            .map(String::from),
        );
    }
    if in_container || config.disable_security {
        args.extend(["--no-sandbox", "--disable-setuid-sandbox"].map(String::from));
    }
    args
}

/// Containers cannot use the setuid sandbox
fn in_container() -> bool {
    Path::new("/.dockerenv").exists()
        || std::env::var("container").is_ok()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}

fn is_benign_handler_error(message: &str) -> bool {
    // chromiumoxide cannot decode some newer CDP events; these are noise
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

/// Find or download a browser, launch it with a fresh profile and spawn its event handler
///
/// The returned profile directory belongs to the caller and must be removed after the
/// browser process exited.
pub async fn launch_browser(config: &BrowserConfig) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let executable = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let profile = TempDirGuard::create(std::env::temp_dir().join(format!(
        "kodegen_browser_capture_{}_{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    )))?;

    let mut builder = LaunchConfig::builder()
        .request_timeout(CDP_REQUEST_TIMEOUT)
        .window_size(config.window.width, config.window.height)
        .user_data_dir(&profile.path)
        .chrome_executable(executable);
    builder = if config.headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    if config.disable_security {
        warn!("Browser security features are disabled by configuration");
    }
    builder = builder.args(launch_args(config, in_container()));

    let launch_config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    info!(
        "Launching browser (headless: {}, window {}x{})",
        config.headless, config.window.width, config.window.height
    );
    let (browser, mut handler) = tokio::time::timeout(
        Duration::from_secs(60),
        Browser::launch(launch_config),
    )
    .await
    .context("Browser launch timed out")?
    .context("Failed to launch browser")?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                if is_benign_handler_error(&message) {
                    trace!("Ignored CDP decode error: {}", message);
                } else {
                    error!("Browser handler error: {:?}", e);
                }
            }
        }
        info!("Browser handler task completed");
    });

    Ok((browser, handler_task, profile.keep()))
}
