//! Resilient outbound HTTP for linkwatch.
//!
//! Every outbound call is bound to a logical service name (`github`,
//! `stackoverflow`, `bot`, ...). [`ResilientClient`] applies a bounded retry
//! policy with capped exponential backoff, and gates each attempt through the
//! [`CircuitBreaker`] registered for that service.

pub mod breaker;
pub mod client;
pub mod error;
pub mod settings;

pub use breaker::{BreakerConfig, BreakerRegistry, BreakerState, CircuitBreaker, Permit};
pub use client::{ResilienceConfig, ResilientClient};
pub use error::{Error, Result};
pub use settings::ResilienceSettings;
