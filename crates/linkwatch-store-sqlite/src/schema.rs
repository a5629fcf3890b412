//! SQL schema for the linkwatch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS chats (
    chat_id       INTEGER PRIMARY KEY,   -- externally assigned
    mode          TEXT NOT NULL DEFAULT 'instant',
    digest_hour   INTEGER,
    digest_minute INTEGER,
    created_at    TEXT NOT NULL,
    CHECK (mode != 'digest' OR digest_hour IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS links (
    link_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    url          TEXT NOT NULL UNIQUE,
    link_type    TEXT NOT NULL CHECK (link_type != 'unknown'),
    last_checked TEXT,   -- fixed-width RFC 3339 UTC; sorts lexically
    last_updated TEXT,   -- watermark; only ever moves forward
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name   TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS link_tags (
    link_id  INTEGER NOT NULL REFERENCES links(link_id) ON DELETE CASCADE,
    tag_id   INTEGER NOT NULL REFERENCES tags(tag_id),
    position INTEGER NOT NULL,
    PRIMARY KEY (link_id, tag_id)
);

CREATE TABLE IF NOT EXISTS filters (
    filter_id INTEGER PRIMARY KEY AUTOINCREMENT,
    link_id   INTEGER NOT NULL REFERENCES links(link_id) ON DELETE CASCADE,
    value     TEXT NOT NULL,
    position  INTEGER NOT NULL,
    UNIQUE (link_id, value)
);

CREATE TABLE IF NOT EXISTS chat_links (
    chat_id    INTEGER NOT NULL REFERENCES chats(chat_id) ON DELETE CASCADE,
    link_id    INTEGER NOT NULL REFERENCES links(link_id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (chat_id, link_id)
);

-- One row per link; content_type discriminates the provider.
CREATE TABLE IF NOT EXISTS content_details (
    link_id      INTEGER PRIMARY KEY REFERENCES links(link_id) ON DELETE CASCADE,
    content_type TEXT NOT NULL,
    title        TEXT NOT NULL,
    author       TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    text_preview TEXT NOT NULL,
    full_text    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS chat_links_link_idx ON chat_links(link_id);
CREATE INDEX IF NOT EXISTS links_due_idx       ON links(last_checked, link_id);
CREATE INDEX IF NOT EXISTS filters_link_idx    ON filters(link_id);

PRAGMA user_version = 1;
";
