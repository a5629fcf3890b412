//! [`Bus`], [`Producer`] and [`Consumer`] over the SQLite record log.

use std::{collections::BTreeMap, path::Path, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension as _, params};
use tracing::{debug, info};

use crate::{Error, Result, schema::SCHEMA};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Records ─────────────────────────────────────────────────────────────────

/// A record to append.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRecord {
  pub topic:     String,
  pub key:       Option<String>,
  pub value:     Vec<u8>,
  pub headers:   BTreeMap<String, String>,
  pub timestamp: DateTime<Utc>,
}

impl ProducerRecord {
  pub fn new(topic: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
    Self {
      topic: topic.into(),
      key: Some(key.into()),
      value,
      headers: BTreeMap::new(),
      timestamp: Utc::now(),
    }
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }
}

/// A record read back from a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub topic:     String,
  pub offset:    u64,
  pub key:       Option<String>,
  pub value:     Vec<u8>,
  pub headers:   BTreeMap<String, String>,
  pub timestamp: DateTime<Utc>,
}

struct RawRecord {
  topic:     String,
  offset:    i64,
  key:       Option<String>,
  value:     Vec<u8>,
  headers:   String,
  timestamp: String,
}

impl RawRecord {
  fn into_record(self) -> Result<Record> {
    Ok(Record {
      topic:     self.topic,
      offset:    self.offset as u64,
      key:       self.key,
      value:     self.value,
      headers:   serde_json::from_str(&self.headers)?,
      timestamp: DateTime::parse_from_rfc3339(&self.timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(e.to_string()))?,
    })
  }
}

// ─── Bus ─────────────────────────────────────────────────────────────────────

/// Handle on one log file. Cloning shares the connection.
#[derive(Clone)]
pub struct Bus {
  conn: tokio_rusqlite::Connection,
}

impl Bus {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let bus = Self { conn };
    bus.init().await?;
    Ok(bus)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let bus = Self { conn };
    bus.init().await?;
    Ok(bus)
  }

  async fn init(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// A producer whose appends fail with [`Error::Timeout`] after
  /// `write_timeout`.
  pub fn producer(&self, write_timeout: Duration) -> Producer {
    Producer { bus: self.clone(), write_timeout }
  }

  /// A consumer positioned at `group`'s committed offset on `topic`
  /// (0 when the group has never committed).
  pub async fn consumer(
    &self,
    group: impl Into<String>,
    topic: impl Into<String>,
  ) -> Result<Consumer> {
    let group = group.into();
    let topic = topic.into();
    let committed = self.committed(&group, &topic).await?;
    info!(group = %group, topic = %topic, offset = committed, "consumer subscribed");
    Ok(Consumer { bus: self.clone(), group, topic, position: committed, committed })
  }

  async fn append(&self, record: ProducerRecord) -> Result<u64> {
    let headers = serde_json::to_string(&record.headers)?;
    let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);

    let offset = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let next: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq) + 1, 0) FROM records WHERE topic = ?1",
          [&record.topic],
          |row| row.get(0),
        )?;
        tx.execute(
          "INSERT INTO records (topic, seq, key, value, headers, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          params![record.topic, next, record.key, record.value, headers, timestamp],
        )?;
        tx.commit()?;
        Ok(next)
      })
      .await?;

    Ok(offset as u64)
  }

  /// The record at `offset` in `topic`, if it has been written.
  pub async fn fetch(&self, topic: &str, offset: u64) -> Result<Option<Record>> {
    let topic = topic.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT topic, seq, key, value, headers, timestamp
               FROM records WHERE topic = ?1 AND seq = ?2",
              params![topic, offset as i64],
              |row| {
                Ok(RawRecord {
                  topic:     row.get(0)?,
                  offset:    row.get(1)?,
                  key:       row.get(2)?,
                  value:     row.get(3)?,
                  headers:   row.get(4)?,
                  timestamp: row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  /// Number of records ever appended to `topic`.
  pub async fn len(&self, topic: &str) -> Result<u64> {
    let topic = topic.to_owned();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM records WHERE topic = ?1",
          [topic],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(n as u64)
  }

  async fn committed(&self, group: &str, topic: &str) -> Result<u64> {
    let (group, topic) = (group.to_owned(), topic.to_owned());
    let offset: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT next_offset FROM consumer_offsets
               WHERE group_id = ?1 AND topic = ?2",
              [group, topic],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(offset.unwrap_or(0) as u64)
  }

  async fn store_offset(&self, group: &str, topic: &str, offset: u64) -> Result<()> {
    let (group, topic) = (group.to_owned(), topic.to_owned());
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO consumer_offsets (group_id, topic, next_offset, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (group_id, topic) DO UPDATE SET
             next_offset = excluded.next_offset,
             updated_at  = excluded.updated_at",
          params![group, topic, offset as i64, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Producer ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Producer {
  bus:           Bus,
  write_timeout: Duration,
}

impl Producer {
  /// Append `record`; resolves once the append has committed.
  pub async fn send(&self, record: ProducerRecord) -> Result<u64> {
    let topic = record.topic.clone();
    let offset = tokio::time::timeout(self.write_timeout, self.bus.append(record))
      .await
      .map_err(|_| Error::Timeout(self.write_timeout))??;
    debug!(topic = %topic, offset, "record appended");
    Ok(offset)
  }
}

// ─── Consumer ────────────────────────────────────────────────────────────────

/// Sequential reader for one `(group, topic)` pair.
pub struct Consumer {
  bus:       Bus,
  group:     String,
  topic:     String,
  position:  u64,
  committed: u64,
}

impl Consumer {
  pub fn topic(&self) -> &str { &self.topic }

  /// Offset of the next record [`Self::poll`] will return.
  pub fn position(&self) -> u64 { self.position }

  /// The next record, advancing the in-memory position; `None` when the
  /// consumer has caught up with the log.
  pub async fn poll(&mut self) -> Result<Option<Record>> {
    let record = self.bus.fetch(&self.topic, self.position).await?;
    if record.is_some() {
      self.position += 1;
    }
    Ok(record)
  }

  /// Move the read position to `offset` without committing, e.g. to
  /// re-read a record whose handling failed.
  pub fn seek(&mut self, offset: u64) { self.position = offset; }

  /// Persist the current position for the group. No-op when unchanged.
  pub async fn commit(&mut self) -> Result<()> {
    if self.position == self.committed {
      return Ok(());
    }
    self.bus.store_offset(&self.group, &self.topic, self.position).await?;
    debug!(group = %self.group, topic = %self.topic, offset = self.position, "offset committed");
    self.committed = self.position;
    Ok(())
  }

  /// Commit and release the consumer.
  pub async fn close(mut self) -> Result<()> {
    self.commit().await?;
    info!(group = %self.group, topic = %self.topic, offset = self.position, "consumer closed");
    Ok(())
  }
}
