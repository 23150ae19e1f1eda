//! Shared primitives for the convos crates: time, retry, test logging.

#[cfg(feature = "test-utils")]
pub mod logging;
pub mod retry;
pub mod time;

pub use retry::{retry_async, Retry, RetryableError};
