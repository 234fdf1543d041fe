//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ItemStore trait.

use crate::ingest::{ExtractedItem, FieldDiffs, ItemRecord, ItemStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ItemStore, StorageError, StorageResult};
use crate::storage::{ChangeEntry, ChangeType, ItemPage, ItemQuery, StoredItem};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

const ITEM_COLUMNS: &str = "id, source_url, name, description, category, price_excl_tax,
    price_incl_tax, availability, review_count, image_url, rating, content_hash,
    crawl_timestamp, status, raw_html";

const CHANGE_COLUMNS: &str = "id, item_id, source_url, change_type, changed_at, details";

/// Formats a timestamp the way every TEXT time column is stored
///
/// Fixed precision keeps lexical order equal to chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_items(&self, sql: &str, values: &[Value]) -> StorageResult<Vec<StoredItem>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), ItemRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ItemRow::into_stored).collect()
    }

    fn query_changes(&self, sql: &str, values: &[Value]) -> StorageResult<Vec<ChangeEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), ChangeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ChangeRow::into_entry).collect()
    }
}

/// Raw `items` row before conversion into domain types
struct ItemRow {
    id: i64,
    source_url: String,
    name: String,
    description: Option<String>,
    category: Option<String>,
    price_excl_tax: f64,
    price_incl_tax: f64,
    availability: Option<String>,
    review_count: u32,
    image_url: Option<String>,
    rating: u8,
    content_hash: String,
    crawl_timestamp: String,
    status: String,
    raw_html: Option<String>,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_url: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            price_excl_tax: row.get(5)?,
            price_incl_tax: row.get(6)?,
            availability: row.get(7)?,
            review_count: row.get(8)?,
            image_url: row.get(9)?,
            rating: row.get(10)?,
            content_hash: row.get(11)?,
            crawl_timestamp: row.get(12)?,
            status: row.get(13)?,
            raw_html: row.get(14)?,
        })
    }

    fn into_stored(self) -> StorageResult<StoredItem> {
        let crawl_timestamp =
            parse_timestamp(&self.crawl_timestamp).ok_or_else(|| StorageError::Corrupt {
                column: "crawl_timestamp",
                value: self.crawl_timestamp.clone(),
            })?;
        let status = ItemStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Corrupt {
                column: "status",
                value: self.status.clone(),
            }
        })?;

        Ok(StoredItem {
            id: self.id,
            record: ItemRecord {
                source_url: self.source_url,
                fields: ExtractedItem {
                    name: self.name,
                    description: self.description,
                    category: self.category,
                    price_excl_tax: self.price_excl_tax,
                    price_incl_tax: self.price_incl_tax,
                    availability: self.availability,
                    review_count: self.review_count,
                    image_url: self.image_url,
                    rating: self.rating,
                },
                content_hash: self.content_hash,
                crawl_timestamp,
                status,
                raw_html: self.raw_html,
            },
        })
    }
}

/// Raw `changes` row before conversion into domain types
struct ChangeRow {
    id: i64,
    item_id: i64,
    source_url: String,
    change_type: String,
    changed_at: String,
    details: String,
}

impl ChangeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_id: row.get(1)?,
            source_url: row.get(2)?,
            change_type: row.get(3)?,
            changed_at: row.get(4)?,
            details: row.get(5)?,
        })
    }

    fn into_entry(self) -> StorageResult<ChangeEntry> {
        let change_type = ChangeType::from_db_string(&self.change_type).ok_or_else(|| {
            StorageError::Corrupt {
                column: "change_type",
                value: self.change_type.clone(),
            }
        })?;
        let when = parse_timestamp(&self.changed_at).ok_or_else(|| StorageError::Corrupt {
            column: "changed_at",
            value: self.changed_at.clone(),
        })?;

        Ok(ChangeEntry {
            id: self.id,
            item_id: self.item_id,
            source_url: self.source_url,
            change_type,
            when,
            details: serde_json::from_str(&self.details)?,
        })
    }
}

impl ItemStore for SqliteStorage {
    // ===== Items =====

    fn get_item_by_url(&self, source_url: &str) -> StorageResult<Option<StoredItem>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM items WHERE source_url = ?1", ITEM_COLUMNS),
                params![source_url],
                ItemRow::from_row,
            )
            .optional()?;

        row.map(ItemRow::into_stored).transpose()
    }

    fn get_item(&self, id: i64) -> StorageResult<Option<StoredItem>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
                params![id],
                ItemRow::from_row,
            )
            .optional()?;

        row.map(ItemRow::into_stored).transpose()
    }

    fn insert_item(&mut self, record: &ItemRecord) -> StorageResult<i64> {
        let fields = &record.fields;
        let crawled_at = format_timestamp(record.crawl_timestamp);
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO items (source_url, name, description, category, price_excl_tax,
             price_incl_tax, availability, review_count, image_url, rating, content_hash,
             crawl_timestamp, status, raw_html)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.source_url,
                fields.name,
                fields.description,
                fields.category,
                fields.price_excl_tax,
                fields.price_incl_tax,
                fields.availability,
                fields.review_count,
                fields.image_url,
                fields.rating,
                record.content_hash,
                crawled_at,
                record.status.to_db_string(),
                record.raw_html,
            ],
        )?;
        let id = tx.last_insert_rowid();

        let details = json!({ "name": fields.name });
        tx.execute(
            "INSERT INTO changes (item_id, source_url, change_type, changed_at, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                record.source_url,
                ChangeType::New.to_db_string(),
                crawled_at,
                details.to_string()
            ],
        )?;

        tx.commit()?;
        Ok(id)
    }

    fn update_item(
        &mut self,
        id: i64,
        record: &ItemRecord,
        diffs: &FieldDiffs,
    ) -> StorageResult<()> {
        let fields = &record.fields;
        let crawled_at = format_timestamp(record.crawl_timestamp);
        let tx = self.conn.transaction()?;

        let updated = tx.execute(
            "UPDATE items SET source_url = ?1, name = ?2, description = ?3, category = ?4,
             price_excl_tax = ?5, price_incl_tax = ?6, availability = ?7, review_count = ?8,
             image_url = ?9, rating = ?10, content_hash = ?11, crawl_timestamp = ?12,
             status = ?13, raw_html = ?14
             WHERE id = ?15",
            params![
                record.source_url,
                fields.name,
                fields.description,
                fields.category,
                fields.price_excl_tax,
                fields.price_incl_tax,
                fields.availability,
                fields.review_count,
                fields.image_url,
                fields.rating,
                record.content_hash,
                crawled_at,
                record.status.to_db_string(),
                record.raw_html,
                id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::ItemNotFound(id));
        }

        if !diffs.is_empty() {
            tx.execute(
                "INSERT INTO changes (item_id, source_url, change_type, changed_at, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    record.source_url,
                    ChangeType::Updated.to_db_string(),
                    crawled_at,
                    serde_json::to_string(diffs)?
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_items(&self, query: &ItemQuery) -> StorageResult<ItemPage> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(category) = &query.category {
            clauses.push("category = ?");
            values.push(Value::Text(category.clone()));
        }
        if let Some(min_price) = query.min_price {
            clauses.push("price_excl_tax >= ?");
            values.push(Value::Real(min_price));
        }
        if let Some(max_price) = query.max_price {
            clauses.push("price_excl_tax <= ?");
            values.push(Value::Real(max_price));
        }
        if let Some(rating) = query.rating {
            clauses.push("rating = ?");
            values.push(Value::Integer(i64::from(rating)));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM items{}", filter),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let page = query.page.max(1);
        let offset = i64::from(page - 1) * i64::from(query.page_size);
        let sql = format!(
            "SELECT {} FROM items{} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            ITEM_COLUMNS,
            filter,
            query.sort.column(),
            query.order.keyword()
        );
        values.push(Value::Integer(i64::from(query.page_size)));
        values.push(Value::Integer(offset));

        let items = self.query_items(&sql, &values)?;

        Ok(ItemPage {
            items,
            total: total as u64,
        })
    }

    // ===== Change Log =====

    fn recent_changes(&self, limit: u32) -> StorageResult<Vec<ChangeEntry>> {
        self.query_changes(
            &format!(
                "SELECT {} FROM changes ORDER BY changed_at DESC, id DESC LIMIT ?",
                CHANGE_COLUMNS
            ),
            &[Value::Integer(i64::from(limit))],
        )
    }

    fn changes_for_item(&self, item_id: i64) -> StorageResult<Vec<ChangeEntry>> {
        self.query_changes(
            &format!(
                "SELECT {} FROM changes WHERE item_id = ? ORDER BY changed_at ASC, id ASC",
                CHANGE_COLUMNS
            ),
            &[Value::Integer(item_id)],
        )
    }

    // ===== Statistics =====

    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_changes(&self, change_type: ChangeType) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM changes WHERE change_type = ?1",
            params![change_type.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn category_breakdown(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM items WHERE category IS NOT NULL
             GROUP BY category ORDER BY category",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
