//! Shared defaults and limits

use std::time::Duration;

/// User agent presented by launched browsers
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.7339.128 Safari/537.36";

/// Per-command CDP timeout
pub const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for navigation timeouts (5 minutes)
pub const MAX_NAVIGATION_TIMEOUT_MS: u64 = 300_000;

/// Upper bound for selector waits and post-click navigation
pub const MAX_INTERACTION_TIMEOUT_MS: u64 = 30_000;

/// Upper bound on exchanges kept by one network recording
pub const MAX_RECORDED_EXCHANGES: usize = 500;
