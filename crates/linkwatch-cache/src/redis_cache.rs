//! [`Cache`] backed by Redis (or any RESP-compatible server such as Valkey).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::{Cache, Result};

#[derive(Clone)]
pub struct RedisCache {
  conn: MultiplexedConnection,
}

impl RedisCache {
  pub async fn connect(url: &str) -> Result<Self> {
    let client = redis::Client::open(url)?;
    let conn = client.get_multiplexed_async_connection().await?;
    tracing::info!(url, "connected to redis cache");
    Ok(Self { conn })
  }
}

fn ttl_secs(ttl: Duration) -> u64 {
  ttl.as_secs().max(1)
}

#[async_trait]
impl Cache for RedisCache {
  async fn get(&self, key: &str) -> Result<Option<String>> {
    let mut conn = self.conn.clone();
    let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
    Ok(value)
  }

  async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    let mut conn = self.conn.clone();
    let () = redis::cmd("SETEX")
      .arg(key)
      .arg(ttl_secs(ttl))
      .arg(value)
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let mut conn = self.conn.clone();
    let _removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
    Ok(())
  }

  async fn append(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
    let mut conn = self.conn.clone();
    let () = redis::pipe()
      .atomic()
      .cmd("RPUSH").arg(key).arg(value).ignore()
      .cmd("EXPIRE").arg(key).arg(ttl_secs(ttl)).ignore()
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn range(&self, key: &str) -> Result<Vec<String>> {
    let mut conn = self.conn.clone();
    let items: Vec<String> = redis::cmd("LRANGE")
      .arg(key)
      .arg(0)
      .arg(-1)
      .query_async(&mut conn)
      .await?;
    Ok(items)
  }

  async fn trim_front(&self, key: &str, count: usize) -> Result<()> {
    let mut conn = self.conn.clone();
    let () = redis::cmd("LTRIM")
      .arg(key)
      .arg(count)
      .arg(-1)
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
    let mut conn = self.conn.clone();
    let mut keys: Vec<String> = redis::cmd("KEYS")
      .arg(format!("{prefix}*"))
      .query_async(&mut conn)
      .await?;
    keys.sort();
    Ok(keys)
  }
}
