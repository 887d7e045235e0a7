//! Timeout and retry-with-backoff helpers, trimmed from a larger resilience
//! toolkit down to the two pieces this system actually calls: bounding
//! broker publishes / DB connects at a fixed deadline, and retrying startup
//! DB/broker connection attempts within a fixed budget before giving up as a
//! fatal startup error. Circuit-breaker and service-tier presets from the
//! source library aren't used anywhere in this system and were dropped.

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
