pub mod constants;
mod timeout;
mod wait_for_element;

pub use timeout::{clamp_capture_window, validate_interaction_timeout, validate_navigation_timeout};
pub use wait_for_element::wait_for_element;
