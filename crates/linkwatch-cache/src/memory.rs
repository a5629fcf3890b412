//! In-process [`Cache`] backed by a mutex-guarded map.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard, PoisonError},
  time::{Duration, Instant},
};

use async_trait::async_trait;

use crate::{Cache, Error, Result};

#[derive(Debug)]
enum Value {
  Scalar(String),
  List(Vec<String>),
}

#[derive(Debug)]
struct Entry {
  value:      Value,
  expires_at: Instant,
}

/// Entries live until their TTL elapses; expired entries are dropped lazily.
#[derive(Debug, Default)]
pub struct MemoryCache {
  entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    let now = Instant::now();
    entries.retain(|_, e| e.expires_at > now);
    entries
  }
}

#[async_trait]
impl Cache for MemoryCache {
  async fn get(&self, key: &str) -> Result<Option<String>> {
    match self.lock().get(key) {
      None => Ok(None),
      Some(Entry { value: Value::Scalar(v), .. }) => Ok(Some(v.clone())),
      Some(Entry { value: Value::List(_), .. }) => Err(Error::WrongKind(key.to_owned())),
    }
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    self.lock().insert(key.to_owned(), Entry {
      value:      Value::Scalar(value),
      expires_at: Instant::now() + ttl,
    });
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.lock().remove(key);
    Ok(())
  }

  async fn append(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    let mut entries = self.lock();
    let entry = entries.entry(key.to_owned()).or_insert_with(|| Entry {
      value:      Value::List(Vec::new()),
      expires_at: Instant::now(),
    });
    match &mut entry.value {
      Value::List(items) => items.push(value),
      Value::Scalar(_) => return Err(Error::WrongKind(key.to_owned())),
    }
    entry.expires_at = Instant::now() + ttl;
    Ok(())
  }

  async fn range(&self, key: &str) -> Result<Vec<String>> {
    match self.lock().get(key) {
      None => Ok(Vec::new()),
      Some(Entry { value: Value::List(items), .. }) => Ok(items.clone()),
      Some(Entry { value: Value::Scalar(_), .. }) => Err(Error::WrongKind(key.to_owned())),
    }
  }

  async fn trim_front(&self, key: &str, count: usize) -> Result<()> {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(key) else { return Ok(()) };
    let Value::List(items) = &mut entry.value else {
      return Err(Error::WrongKind(key.to_owned()));
    };
    items.drain(..count.min(items.len()));
    if items.is_empty() {
      entries.remove(key);
    }
    Ok(())
  }

  async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = self
      .lock()
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect();
    keys.sort();
    Ok(keys)
  }
}
