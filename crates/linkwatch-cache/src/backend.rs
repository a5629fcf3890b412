use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A string key/value store with TTLs and append-only lists.
///
/// Implementations must be cheap to share behind an `Arc`.
#[async_trait]
pub trait Cache: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>>;

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  async fn delete(&self, key: &str) -> Result<()>;

  /// Append `value` to the list at `key` and reset the list's TTL.
  async fn append(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

  /// The whole list at `key`, in insertion order, left in place.
  async fn range(&self, key: &str) -> Result<Vec<String>>;

  /// Remove the first `count` entries of the list at `key`. Entries appended
  /// since they were read are kept.
  async fn trim_front(&self, key: &str, count: usize) -> Result<()>;

  /// Live keys starting with `prefix`.
  async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
