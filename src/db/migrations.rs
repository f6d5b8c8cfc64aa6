use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::schema;

/// Schema generation this build writes and understands.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Bring a freshly opened connection up to [`SCHEMA_VERSION`]. A database
/// stamped with a newer version than this build understands is refused rather
/// than half-read.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );
        "#,
    )
    .context("ensure meta table")?;

    match schema_version(conn)? {
        0 => {
            schema::create_schema(conn).context("create mail tables")?;
            set_meta(conn, SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_string())?;
            Ok(())
        }
        v if v == SCHEMA_VERSION => Ok(()),
        newer => Err(anyhow!(
            "database schema {newer} was written by a newer maildeck; this build supports up to {SCHEMA_VERSION}"
        )),
    }
}

/// Version stamp from the meta table; 0 means a blank database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    match get_meta(conn, SCHEMA_VERSION_KEY)? {
        None => Ok(0),
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("corrupt schema version stamp: {raw}")),
    }
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("read meta key '{key}'"))
    .map(Option::flatten)
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO meta (key, value, updated_at)
        VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![key, value],
    )
    .with_context(|| format!("write meta key '{key}'"))?;
    Ok(())
}
