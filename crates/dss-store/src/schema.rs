//! SQLite 連線設定與建表

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// 預設 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 目前程式期望的 schema 版本
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER NOT NULL PRIMARY KEY,
    applied_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS production_plan (
    plan_id               TEXT NOT NULL PRIMARY KEY,
    branch_id             TEXT NOT NULL,
    product_id            TEXT NOT NULL,
    plan_date             TEXT NOT NULL,
    recommended_qty       TEXT NOT NULL,
    weighted_average      TEXT NOT NULL,
    config_snapshot_json  TEXT NOT NULL,
    adjusted_qty          TEXT,
    actual_qty            TEXT,
    frozen_target_qty     TEXT,
    status                TEXT NOT NULL
        CHECK (status IN ('RECOMMENDED', 'ADJUSTED', 'REALIZED', 'FINALIZED')),
    revision              INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    realized_at           TEXT,
    finalized_at          TEXT,
    UNIQUE (branch_id, product_id, plan_date)
);

CREATE INDEX IF NOT EXISTS idx_production_plan_branch_date
    ON production_plan (branch_id, plan_date);

CREATE TABLE IF NOT EXISTS sales_fact (
    branch_id   TEXT NOT NULL,
    product_id  TEXT NOT NULL,
    sale_date   TEXT NOT NULL,
    sold_qty    TEXT NOT NULL,
    PRIMARY KEY (branch_id, product_id, sale_date)
);
"#;

/// 設定 SQLite 連線
///
/// foreign_keys 與 busy_timeout 都必須每個連線各自設定。
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 開啟 SQLite 連線並套用設定
pub fn open_sqlite_connection(db_path: impl AsRef<Path>) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（可重複執行）並登記目前 schema 版本
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 讀取 schema_version（表不存在時回傳 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
}
