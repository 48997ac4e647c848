//! Polling for elements that render after the load event
//!
//! Single page applications often insert their content some time after navigation
//! completes, so selector waits poll with exponential backoff until a deadline.

use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::page::{ElementRef, PageError, PageHandle};

const FIRST_POLL: Duration = Duration::from_millis(100);
const MAX_POLL: Duration = Duration::from_secs(1);

/// Wait until `selector` matches at least one element
///
/// Query errors (e.g. a document that is being replaced) count as "not yet" until the
/// deadline passes; the last one is reported on timeout.
///
/// # Arguments
/// * `page` - Page to search in
/// * `selector` - CSS selector for the element
/// * `timeout` - Maximum time to wait
///
/// # Returns
/// * `Ok(ElementRef)` - First matching element
/// * `Err(PageError::Query)` - Timeout exceeded
///
/// # Polling Strategy
/// - Starts at 100ms intervals
/// - Doubles each retry, capped at 1 second
/// - Total duration limited by `timeout`
pub async fn wait_for_element(
    page: &dyn PageHandle,
    selector: &str,
    timeout: Duration,
) -> Result<ElementRef, PageError> {
    let deadline = Instant::now() + timeout;
    let mut interval = FIRST_POLL;
    let mut last_error = None;

    loop {
        match page.query(selector).await {
            Ok(elements) => {
                if let Some(first) = elements.into_iter().next() {
                    return Ok(first);
                }
            }
            Err(e) => {
                trace!("Selector wait for '{}' query failed: {}", selector, e);
                last_error = Some(e.to_string());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PageError::Query {
                selector: selector.to_string(),
                reason: match last_error {
                    Some(e) => format!("not found within {}ms (last error: {e})", timeout.as_millis()),
                    None => format!("not found within {}ms", timeout.as_millis()),
                },
            });
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = (interval * 2).min(MAX_POLL);
    }
}
