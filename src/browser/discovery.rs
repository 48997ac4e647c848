//! Locating a Chrome/Chromium executable, or fetching one

use anyhow::{Context, Result};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info, warn};

/// Overrides every other lookup when it points at an existing file
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

#[cfg(target_os = "windows")]
const INSTALL_PATHS: &[&str] = &[
    r"%PROGRAMFILES%\Google\Chrome\Application\chrome.exe",
    r"%PROGRAMFILES(X86)%\Google\Chrome\Application\chrome.exe",
    r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
    r"%PROGRAMFILES%\Chromium\Application\chrome.exe",
];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "~/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/homebrew/bin/chromium",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const INSTALL_PATHS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/snap/bin/chromium",
    "/usr/local/bin/chromium",
    "/opt/google/chrome/chrome",
];

const PATH_COMMANDS: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Well-known install locations with `~` and `%VAR%` expanded
fn install_candidates() -> Vec<PathBuf> {
    INSTALL_PATHS
        .iter()
        .filter_map(|raw| expand_path(raw))
        .collect()
}

fn expand_path(raw: &str) -> Option<PathBuf> {
    if let Some(rest) = raw.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    if raw.contains('%') {
        return Some(PathBuf::from(expand_windows_env_vars(raw)));
    }
    Some(PathBuf::from(raw))
}

/// Replace `%VAR%` tokens with their values; unknown variables are left as written
fn expand_windows_env_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            Some(_) => {
                // "%%"
                out.push('%');
                rest = &after[1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn which(command: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(command).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!found.is_empty()).then(|| PathBuf::from(found))
}

/// Find an installed Chrome/Chromium: `CHROMIUM_PATH`, then install locations, then `PATH`
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from {}: {}", CHROMIUM_PATH_ENV, path.display());
            return Ok(path);
        }
        warn!(
            "{} points to a missing file: {}",
            CHROMIUM_PATH_ENV,
            path.display()
        );
    }

    if let Some(path) = install_candidates().into_iter().find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if !cfg!(target_os = "windows") {
        for command in PATH_COMMANDS {
            if let Some(path) = which(command) {
                info!("Found browser on PATH: {}", path.display());
                return Ok(path);
            }
        }
    }

    debug!("No local Chrome/Chromium executable");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a Chromium build into the user cache and return its executable
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::env::temp_dir().join(".cache"))
        .join("kodegen")
        .join("chromium");
    info!("Downloading managed Chromium into {}", cache_dir.display());

    std::fs::create_dir_all(&cache_dir).context("Failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to fetch Chromium")?;

    info!("Downloaded Chromium to: {}", revision.folder_path.display());
    Ok(revision.executable_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_variables_are_preserved() {
        assert_eq!(
            expand_windows_env_vars(r"%KODEGEN_SURELY_UNSET_VAR%\chrome.exe"),
            r"%KODEGEN_SURELY_UNSET_VAR%\chrome.exe"
        );
        assert_eq!(expand_windows_env_vars("100%%"), "100%");
        assert_eq!(expand_windows_env_vars("50% off"), "50% off");
    }

    #[test]
    fn known_variables_are_expanded() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        assert_eq!(expand_windows_env_vars("%PATH%/x"), format!("{path}/x"));
    }

    #[test]
    fn candidates_are_absolute() {
        for candidate in install_candidates() {
            assert!(!candidate.to_string_lossy().starts_with('~'));
        }
    }
}
