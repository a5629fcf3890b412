//! Key/value cache backends for linkwatch.
//!
//! [`Cache`] is an object-safe async trait with two implementations: an
//! in-process [`MemoryCache`] and a durable [`RedisCache`]. On top of it,
//! [`LinkListCache`] holds each chat's subscribed-link list.

mod backend;
mod memory;
mod redis_cache;

pub mod error;
pub mod link_list;

use std::sync::Arc;

pub use backend::Cache;
pub use error::{Error, Result};
pub use link_list::LinkListCache;
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Open the backend named by `url`: `memory`, or a `redis://` URL.
pub async fn open(url: &str) -> Result<Arc<dyn Cache>> {
  if url.eq_ignore_ascii_case("memory") {
    Ok(Arc::new(MemoryCache::new()))
  } else {
    Ok(Arc::new(RedisCache::connect(url).await?))
  }
}
