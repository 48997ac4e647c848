//! Chromium process management

mod discovery;
mod launch;
mod wrapper;

pub use launch::launch_browser;
pub use wrapper::BrowserWrapper;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
