//! A durable, append-only record log stored in SQLite.
//!
//! Topics are ordered sequences of [`Record`]s addressed by a per-topic
//! offset. A [`Producer`] appends; a [`Consumer`] reads one record at a time
//! from its group's position and persists that position with
//! [`Consumer::commit`]. Delivery is at-least-once: records read after the
//! last commit are delivered again after a restart.

mod schema;

pub mod error;
pub mod log;
pub mod transport;

pub use error::{Error, Result};
pub use log::{Bus, Consumer, Producer, ProducerRecord, Record};
pub use transport::Transport;
