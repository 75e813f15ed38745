//! SQL schema for the Parley SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS contacts (
    contact_id      TEXT PRIMARY KEY,
    tenant_id       TEXT NOT NULL,
    address         TEXT NOT NULL,     -- digits only
    display_name    TEXT NOT NULL DEFAULT '',
    tags            TEXT NOT NULL DEFAULT '[]',
    is_valid        INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    last_message_at TEXT NOT NULL,
    UNIQUE (tenant_id, address)
);

CREATE TABLE IF NOT EXISTS conversations (
    conversation_id TEXT PRIMARY KEY,
    tenant_id       TEXT NOT NULL,
    contact_id      TEXT NOT NULL REFERENCES contacts(contact_id),
    status          TEXT NOT NULL
                    CHECK (status IN ('active', 'waiting_human', 'resolved')),
    bot_active      INTEGER NOT NULL DEFAULT 1,
    unread_count    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    last_message_at TEXT NOT NULL
);

-- At most one open conversation per contact. The predicate must stay
-- identical to the ON CONFLICT target in store.rs.
CREATE UNIQUE INDEX IF NOT EXISTS conversations_open_idx
    ON conversations(tenant_id, contact_id)
    WHERE status IN ('active', 'waiting_human');

CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id      TEXT NOT NULL UNIQUE,
    tenant_id       TEXT NOT NULL,
    conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
    content         TEXT NOT NULL,
    sender          TEXT NOT NULL,   -- 'contact' | 'agent' | 'bot'
    content_kind    TEXT NOT NULL,
    external_id     TEXT,            -- provider id; NULLs never collide
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    status_at       TEXT,
    UNIQUE (tenant_id, external_id)
);

CREATE TABLE IF NOT EXISTS automation_rules (
    rule_id      TEXT PRIMARY KEY,
    tenant_id    TEXT NOT NULL,
    name         TEXT NOT NULL,
    trigger_kind TEXT NOT NULL,      -- discriminant of Trigger
    trigger_json TEXT NOT NULL,
    action_json  TEXT NOT NULL,
    enabled      INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS conversations_contact_idx ON conversations(contact_id);
CREATE INDEX IF NOT EXISTS messages_conversation_idx ON messages(conversation_id, seq);
CREATE INDEX IF NOT EXISTS rules_tenant_idx         ON automation_rules(tenant_id, enabled);

PRAGMA user_version = 1;
";
