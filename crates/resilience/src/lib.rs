//! Failure-isolation primitives: per-dependency circuit breaking and
//! bounded retry with jittered exponential backoff.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerConfig, CircuitBreakerRegistry, CircuitState};
pub use retry::{with_retry, RetryPolicy};
