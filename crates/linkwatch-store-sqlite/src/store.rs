//! [`SqliteStore`] — the SQLite implementation of the linkwatch store traits.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params};

use linkwatch_core::{
  chat::{Chat, NotificationMode, NotificationSettings},
  link::{Link, LinkType, NewLink, dedup_ordered},
  store::{ChatStore, DetailsStore, LinkStore, Store},
  update::ContentDetails,
};

use crate::{
  Result,
  encode::{
    RawChat, RawDetails, RawLink, encode_dt, encode_link_type, encode_mode,
  },
  schema::SCHEMA,
};

/// Domain outcome computed inside a database closure.
type Outcome<T> = std::result::Result<T, linkwatch_core::Error>;

pub(crate) const LINK_COLUMNS: &str =
  "l.link_id, l.url, l.link_type, l.last_checked, l.last_updated, l.created_at";

pub(crate) const CHAT_COLUMNS: &str =
  "c.chat_id, c.mode, c.digest_hour, c.digest_minute, c.created_at";

// ─── Store ───────────────────────────────────────────────────────────────────

/// Link, chat and details stores backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn select_one_link<P>(&self, tail: &'static str, params: P) -> Result<Option<Link>>
  where
    P: rusqlite::Params + Send + 'static,
  {
    let mut raws = self
      .conn
      .call(move |conn| Ok(select_links(conn, tail, params)?))
      .await?;
    raws.pop().map(RawLink::into_link).transpose()
  }
}

// ─── Sync helpers (run inside `Connection::call`) ────────────────────────────

fn select_links<P: rusqlite::Params>(
  conn: &Connection,
  tail: &str,
  params: P,
) -> rusqlite::Result<Vec<RawLink>> {
  let sql = format!("SELECT {LINK_COLUMNS} FROM links l {tail}");
  let mut stmt = conn.prepare(&sql)?;
  let mut raws = stmt
    .query_map(params, RawLink::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  for raw in &mut raws {
    raw.tags = select_strings(
      conn,
      "SELECT t.name FROM link_tags lt
       JOIN tags t ON t.tag_id = lt.tag_id
       WHERE lt.link_id = ?1
       ORDER BY lt.position",
      raw.link_id,
    )?;
    raw.filters = select_strings(
      conn,
      "SELECT value FROM filters WHERE link_id = ?1 ORDER BY position",
      raw.link_id,
    )?;
  }
  Ok(raws)
}

fn select_strings(
  conn: &Connection,
  sql: &str,
  link_id: i64,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare_cached(sql)?;
  let rows = stmt
    .query_map([link_id], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(rows)
}

fn select_chats<P: rusqlite::Params>(
  conn: &Connection,
  tail: &str,
  params: P,
) -> rusqlite::Result<Vec<RawChat>> {
  let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c {tail}");
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(params, RawChat::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn link_exists(conn: &Connection, link_id: i64) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM links WHERE link_id = ?1", [link_id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

fn chat_exists(conn: &Connection, chat_id: i64) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM chats WHERE chat_id = ?1", [chat_id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

fn edge_exists(
  conn: &Connection,
  chat_id: i64,
  link_id: i64,
) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM chat_links WHERE chat_id = ?1 AND link_id = ?2",
        [chat_id, link_id],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

fn tag_position(
  conn: &Connection,
  link_id: i64,
  tag: &str,
) -> rusqlite::Result<Option<i64>> {
  conn
    .query_row(
      "SELECT lt.position FROM link_tags lt
       JOIN tags t ON t.tag_id = lt.tag_id
       WHERE lt.link_id = ?1 AND t.name = ?2",
      params![link_id, tag],
      |row| row.get(0),
    )
    .optional()
}

fn insert_tag(
  conn: &Connection,
  link_id: i64,
  tag: &str,
  position: i64,
) -> rusqlite::Result<()> {
  conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [tag])?;
  conn.execute(
    "INSERT INTO link_tags (link_id, tag_id, position)
     SELECT ?1, tag_id, ?3 FROM tags WHERE name = ?2",
    params![link_id, tag, position],
  )?;
  Ok(())
}

fn write_tags(
  conn: &Connection,
  link_id: i64,
  tags: &[String],
) -> rusqlite::Result<()> {
  conn.execute("DELETE FROM link_tags WHERE link_id = ?1", [link_id])?;
  for (position, tag) in tags.iter().enumerate() {
    insert_tag(conn, link_id, tag, position as i64)?;
  }
  Ok(())
}

fn write_filters(
  conn: &Connection,
  link_id: i64,
  filters: &[String],
) -> rusqlite::Result<()> {
  conn.execute("DELETE FROM filters WHERE link_id = ?1", [link_id])?;
  for (position, value) in filters.iter().enumerate() {
    conn.execute(
      "INSERT INTO filters (link_id, value, position) VALUES (?1, ?2, ?3)",
      params![link_id, value, position as i64],
    )?;
  }
  Ok(())
}

/// Delete `link_id` (cascading to tags, filters and details) when no chat
/// subscribes to it any more. Returns whether the link was deleted.
fn collect_if_orphan(conn: &Connection, link_id: i64) -> rusqlite::Result<bool> {
  let removed = conn.execute(
    "DELETE FROM links
     WHERE link_id = ?1
       AND NOT EXISTS (SELECT 1 FROM chat_links WHERE link_id = ?1)",
    [link_id],
  )?;
  Ok(removed > 0)
}

// ─── Store impls ─────────────────────────────────────────────────────────────

impl Store for SqliteStore {
  type Error = crate::Error;
}

impl LinkStore for SqliteStore {
  async fn save_link(&self, link: NewLink) -> Result<Link> {
    if link.link_type == LinkType::Unknown {
      return Err(linkwatch_core::Error::UnsupportedLinkType(link.url).into());
    }

    let now_str  = encode_dt(Utc::now());
    let type_str = encode_link_type(link.link_type);
    let tags     = dedup_ordered(link.tags);
    let filters  = dedup_ordered(link.filters);
    let url      = link.url;

    let raw: Outcome<RawLink> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
          .query_row("SELECT link_id FROM links WHERE url = ?1", [&url], |r| {
            r.get(0)
          })
          .optional()?;
        if existing.is_some() {
          return Ok(Err(linkwatch_core::Error::LinkAlreadyExists(url)));
        }

        tx.execute(
          "INSERT INTO links (url, link_type, created_at) VALUES (?1, ?2, ?3)",
          params![url, type_str, now_str],
        )?;
        let link_id = tx.last_insert_rowid();
        write_tags(&tx, link_id, &tags)?;
        write_filters(&tx, link_id, &filters)?;

        let mut raws = select_links(&tx, "WHERE l.link_id = ?1", [link_id])?;
        tx.commit()?;

        Ok(
          raws
            .pop()
            .ok_or(linkwatch_core::Error::LinkNotFound(link_id.to_string())),
        )
      })
      .await?;

    raw?.into_link()
  }

  async fn find_link(&self, link_id: i64) -> Result<Option<Link>> {
    self.select_one_link("WHERE l.link_id = ?1", [link_id]).await
  }

  async fn find_link_by_url(&self, url: String) -> Result<Option<Link>> {
    self.select_one_link("WHERE l.url = ?1", [url]).await
  }

  async fn find_links_by_chat(&self, chat_id: i64) -> Result<Vec<Link>> {
    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_links(
          conn,
          "JOIN chat_links cl ON cl.link_id = l.link_id
           WHERE cl.chat_id = ?1
           ORDER BY l.link_id",
          [chat_id],
        )?)
      })
      .await?;

    raws.into_iter().map(RawLink::into_link).collect()
  }

  async fn delete_link_by_url(&self, url: String, chat_id: i64) -> Result<Link> {
    let raw: Outcome<RawLink> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut raws = select_links(&tx, "WHERE l.url = ?1", [&url])?;
        let Some(raw) = raws.pop() else {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(url)));
        };
        if !edge_exists(&tx, chat_id, raw.link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(url)));
        }

        tx.execute(
          "DELETE FROM chat_links WHERE chat_id = ?1 AND link_id = ?2",
          [chat_id, raw.link_id],
        )?;
        collect_if_orphan(&tx, raw.link_id)?;
        tx.commit()?;

        Ok(Ok(raw))
      })
      .await?;

    raw?.into_link()
  }

  async fn record_check(
    &self,
    link_id:    i64,
    checked_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
  ) -> Result<bool> {
    let checked_str = encode_dt(checked_at);
    let updated_str = updated_at.map(encode_dt);

    let advanced: Outcome<bool> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !link_exists(&tx, link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(link_id.to_string())));
        }

        tx.execute(
          "UPDATE links SET last_checked = ?2
           WHERE link_id = ?1 AND (last_checked IS NULL OR last_checked < ?2)",
          params![link_id, checked_str],
        )?;

        // Compare-and-set: a stale watermark never overwrites a newer one.
        let advanced = match updated_str {
          Some(updated) => {
            tx.execute(
              "UPDATE links SET last_updated = ?2
               WHERE link_id = ?1 AND (last_updated IS NULL OR last_updated < ?2)",
              params![link_id, updated],
            )? > 0
          }
          None => false,
        };

        tx.commit()?;
        Ok(Ok(advanced))
      })
      .await?;

    Ok(advanced?)
  }

  async fn add_chat_link(&self, chat_id: i64, link_id: i64) -> Result<()> {
    let now_str = encode_dt(Utc::now());

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !chat_exists(&tx, chat_id)? {
          return Ok(Err(linkwatch_core::Error::ChatNotFound(chat_id)));
        }
        if !link_exists(&tx, link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(link_id.to_string())));
        }
        tx.execute(
          "INSERT OR IGNORE INTO chat_links (chat_id, link_id, created_at)
           VALUES (?1, ?2, ?3)",
          params![chat_id, link_id, now_str],
        )?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }

  async fn find_due(
    &self,
    limit:          usize,
    offset:         usize,
    checked_before: DateTime<Utc>,
  ) -> Result<Vec<Link>> {
    let before_str = encode_dt(checked_before);
    let limit_val  = limit as i64;
    let offset_val = offset as i64;

    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_links(
          conn,
          "WHERE l.last_checked IS NULL OR l.last_checked < ?1
           ORDER BY l.last_checked ASC NULLS FIRST, l.link_id ASC
           LIMIT ?2 OFFSET ?3",
          params![before_str, limit_val, offset_val],
        )?)
      })
      .await?;

    raws.into_iter().map(RawLink::into_link).collect()
  }

  async fn save_tags(&self, link_id: i64, tags: Vec<String>) -> Result<()> {
    let tags = dedup_ordered(tags);

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !link_exists(&tx, link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(link_id.to_string())));
        }
        write_tags(&tx, link_id, &tags)?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }

  async fn save_filters(&self, link_id: i64, filters: Vec<String>) -> Result<()> {
    let filters = dedup_ordered(filters);

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !link_exists(&tx, link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(link_id.to_string())));
        }
        write_filters(&tx, link_id, &filters)?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }

  async fn add_tag(&self, link_id: i64, tag: String) -> Result<()> {
    let tag = tag.trim().to_owned();

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !link_exists(&tx, link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(link_id.to_string())));
        }
        if tag_position(&tx, link_id, &tag)?.is_some() {
          return Ok(Err(linkwatch_core::Error::TagAlreadyExists { link_id, tag }));
        }
        let next: i64 = tx.query_row(
          "SELECT COALESCE(MAX(position) + 1, 0) FROM link_tags WHERE link_id = ?1",
          [link_id],
          |row| row.get(0),
        )?;
        insert_tag(&tx, link_id, &tag, next)?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }

  async fn remove_tag(&self, link_id: i64, tag: String) -> Result<()> {
    let tag = tag.trim().to_owned();

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        let removed = conn.execute(
          "DELETE FROM link_tags
           WHERE link_id = ?1
             AND tag_id = (SELECT tag_id FROM tags WHERE name = ?2)",
          params![link_id, tag],
        )?;
        if removed == 0 {
          return Ok(Err(linkwatch_core::Error::TagNotFound { link_id, tag }));
        }
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }
}

impl ChatStore for SqliteStore {
  async fn register_chat(&self, chat_id: i64) -> Result<Chat> {
    let now_str = encode_dt(Utc::now());

    let mut raws = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO chats (chat_id, created_at) VALUES (?1, ?2)",
          params![chat_id, now_str],
        )?;
        Ok(select_chats(conn, "WHERE c.chat_id = ?1", [chat_id])?)
      })
      .await?;

    raws
      .pop()
      .ok_or(linkwatch_core::Error::ChatNotFound(chat_id))?
      .into_chat()
  }

  async fn find_chat(&self, chat_id: i64) -> Result<Option<Chat>> {
    let mut raws = self
      .conn
      .call(move |conn| Ok(select_chats(conn, "WHERE c.chat_id = ?1", [chat_id])?))
      .await?;

    raws.pop().map(RawChat::into_chat).transpose()
  }

  async fn delete_chat(&self, chat_id: i64) -> Result<Vec<i64>> {
    let collected: Outcome<Vec<i64>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !chat_exists(&tx, chat_id)? {
          return Ok(Err(linkwatch_core::Error::ChatNotFound(chat_id)));
        }

        let link_ids = {
          let mut stmt =
            tx.prepare("SELECT link_id FROM chat_links WHERE chat_id = ?1")?;
          stmt
            .query_map([chat_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute("DELETE FROM chats WHERE chat_id = ?1", [chat_id])?;

        let mut collected = Vec::new();
        for link_id in link_ids {
          if collect_if_orphan(&tx, link_id)? {
            collected.push(link_id);
          }
        }
        tx.commit()?;
        Ok(Ok(collected))
      })
      .await?;

    Ok(collected?)
  }

  async fn chat_link_exists(&self, chat_id: i64, link_id: i64) -> Result<bool> {
    Ok(
      self
        .conn
        .call(move |conn| Ok(edge_exists(conn, chat_id, link_id)?))
        .await?,
    )
  }

  async fn find_chats_by_link(&self, link_id: i64) -> Result<Vec<Chat>> {
    let raws = self
      .conn
      .call(move |conn| {
        Ok(select_chats(
          conn,
          "JOIN chat_links cl ON cl.chat_id = c.chat_id
           WHERE cl.link_id = ?1
           ORDER BY c.chat_id",
          [link_id],
        )?)
      })
      .await?;

    raws.into_iter().map(RawChat::into_chat).collect()
  }

  async fn update_notification_settings(
    &self,
    chat_id:  i64,
    settings: NotificationSettings,
  ) -> Result<Chat> {
    if settings.mode == NotificationMode::Digest && settings.digest_time.is_none() {
      return Err(linkwatch_core::Error::DigestTimeRequired.into());
    }

    let mode_str = encode_mode(settings.mode);
    let hour     = settings.digest_time.map(|t| t.hour);
    let minute   = settings.digest_time.map(|t| t.minute);

    let raw: Outcome<RawChat> = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE chats SET mode = ?2, digest_hour = ?3, digest_minute = ?4
           WHERE chat_id = ?1",
          params![chat_id, mode_str, hour, minute],
        )?;
        if updated == 0 {
          return Ok(Err(linkwatch_core::Error::ChatNotFound(chat_id)));
        }
        let mut raws = select_chats(conn, "WHERE c.chat_id = ?1", [chat_id])?;
        Ok(raws.pop().ok_or(linkwatch_core::Error::ChatNotFound(chat_id)))
      })
      .await?;

    raw?.into_chat()
  }
}

impl DetailsStore for SqliteStore {
  async fn upsert_details(&self, link_id: i64, details: ContentDetails) -> Result<()> {
    let type_str    = encode_link_type(details.content_type);
    let updated_str = encode_dt(details.updated_at);

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        if !link_exists(conn, link_id)? {
          return Ok(Err(linkwatch_core::Error::LinkNotFound(link_id.to_string())));
        }
        conn.execute(
          "INSERT INTO content_details (
             link_id, content_type, title, author, updated_at, text_preview, full_text
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (link_id) DO UPDATE SET
             content_type = excluded.content_type,
             title        = excluded.title,
             author       = excluded.author,
             updated_at   = excluded.updated_at,
             text_preview = excluded.text_preview,
             full_text    = excluded.full_text",
          params![
            link_id,
            type_str,
            details.title,
            details.author,
            updated_str,
            details.text_preview,
            details.full_text,
          ],
        )?;
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }

  async fn find_details(&self, link_id: i64) -> Result<Option<ContentDetails>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT content_type, title, author, updated_at, text_preview, full_text
               FROM content_details WHERE link_id = ?1",
              [link_id],
              |row| {
                Ok(RawDetails {
                  content_type: row.get(0)?,
                  title:        row.get(1)?,
                  author:       row.get(2)?,
                  updated_at:   row.get(3)?,
                  text_preview: row.get(4)?,
                  full_text:    row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDetails::into_details).transpose()
  }
}
