//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Shelfwatch database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Current state of every crawled item
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    category TEXT,
    price_excl_tax REAL NOT NULL,
    price_incl_tax REAL NOT NULL,
    availability TEXT,
    review_count INTEGER NOT NULL DEFAULT 0,
    image_url TEXT,
    rating INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT NOT NULL,
    crawl_timestamp TEXT NOT NULL,
    status TEXT NOT NULL,
    raw_html TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_category_price ON items(category, price_excl_tax);
CREATE INDEX IF NOT EXISTS idx_items_price ON items(price_excl_tax);

-- Append-only change log
CREATE TABLE IF NOT EXISTS changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id),
    source_url TEXT NOT NULL,
    change_type TEXT NOT NULL,
    changed_at TEXT NOT NULL,
    details TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_changes_item ON changes(item_id);
CREATE INDEX IF NOT EXISTS idx_changes_changed_at ON changes(changed_at);

-- Token buckets of the read API rate limiter
CREATE TABLE IF NOT EXISTS rate_buckets (
    api_key TEXT PRIMARY KEY,
    tokens REAL NOT NULL,
    last_refill_us INTEGER NOT NULL,
    expires_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rate_buckets_expires ON rate_buckets(expires_at_us);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
