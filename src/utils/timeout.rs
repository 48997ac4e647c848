//! Argument validation for timeouts and capture windows

use std::time::Duration;

use super::constants::{MAX_INTERACTION_TIMEOUT_MS, MAX_NAVIGATION_TIMEOUT_MS};
use crate::tools::ToolError;

fn bounded(timeout_ms: Option<u64>, default_ms: u64, max_ms: u64, what: &str) -> Result<Duration, ToolError> {
    let ms = timeout_ms.unwrap_or(default_ms);
    if ms == 0 {
        return Err(ToolError::invalid(format!("{what} timeout must be greater than 0ms")));
    }
    if ms > max_ms {
        return Err(ToolError::invalid(format!(
            "{what} timeout cannot exceed {max_ms}ms ({:.1}s). Received: {ms}ms",
            max_ms as f64 / 1000.0
        )));
    }
    Ok(Duration::from_millis(ms))
}

/// Validate timeout for navigation and selector waits (navigate, wait_for_selector)
///
/// # Arguments
/// * `timeout_ms` - Optional timeout in milliseconds
/// * `default_ms` - Default timeout if None provided
///
/// # Returns
/// * `Ok(Duration)` - Validated timeout
/// * `Err(ToolError)` - If the timeout is zero or exceeds MAX_NAVIGATION_TIMEOUT_MS
pub fn validate_navigation_timeout(timeout_ms: Option<u64>, default_ms: u64) -> Result<Duration, ToolError> {
    bounded(timeout_ms, default_ms, MAX_NAVIGATION_TIMEOUT_MS, "Navigation")
}

/// Validate timeout for element interactions (click, type_text)
///
/// # Arguments
/// * `timeout_ms` - Optional timeout in milliseconds
/// * `default_ms` - Default timeout if None provided
///
/// # Returns
/// * `Ok(Duration)` - Validated timeout
/// * `Err(ToolError)` - If the timeout is zero or exceeds MAX_INTERACTION_TIMEOUT_MS
pub fn validate_interaction_timeout(timeout_ms: Option<u64>, default_ms: u64) -> Result<Duration, ToolError> {
    bounded(timeout_ms, default_ms, MAX_INTERACTION_TIMEOUT_MS, "Interaction")
}

/// Resolve the observation window of a capture
///
/// Windows are clamped rather than rejected; zero is a valid window.
///
/// # Arguments
/// * `wait_ms` - Requested window in milliseconds
/// * `default_ms` - Window used when none is requested
/// * `max_ms` - Upper clamp
///
/// # Returns
/// The window as a Duration, never above `max_ms`
pub fn clamp_capture_window(wait_ms: Option<u64>, default_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(wait_ms.unwrap_or(default_ms).min(max_ms))
}
