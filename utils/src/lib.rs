//! Shared utilities for the gateway client crates.

pub mod cancel;
pub mod logging;
pub mod retry;

pub use cancel::{CancelToken, Cancelled};
pub use logging::{init_logging, init_tracing, LogFormat};
pub use retry::{retry, retry_cancellable, RetryPolicy};
