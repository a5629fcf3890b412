/// Log DDL; idempotent.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS records (
    topic     TEXT    NOT NULL,
    seq       INTEGER NOT NULL,   -- per-topic offset, dense from 0
    key       TEXT,
    value     BLOB    NOT NULL,
    headers   TEXT    NOT NULL DEFAULT '{}',   -- JSON object of strings
    timestamp TEXT    NOT NULL,
    PRIMARY KEY (topic, seq)
);

CREATE TABLE IF NOT EXISTS consumer_offsets (
    group_id    TEXT    NOT NULL,
    topic       TEXT    NOT NULL,
    next_offset INTEGER NOT NULL,
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (group_id, topic)
);
";
