//! SQLite 儲存實作

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use dss_core::{
    trailing_days, DateRange, DssConfig, PlanKey, PlanStatus, ProductionPlan, SalesFact,
    SalesHistory,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schema::{configure_sqlite_connection, init_schema, open_sqlite_connection, read_schema_version};
use crate::{PlanStore, StoreError, StoreResult};

const PLAN_COLUMNS: &str = "plan_id, branch_id, product_id, plan_date, recommended_qty, \
     weighted_average, config_snapshot_json, adjusted_qty, actual_qty, frozen_target_qty, \
     status, revision, created_at, updated_at, realized_at, finalized_at";

/// SQLite 計劃儲存與銷售時間序列
///
/// 同一連線由 Mutex 保護；條件寫入與寫入後的重讀在同一次持鎖內完成。
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 開啟（或建立）資料庫檔案並初始化 schema
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Self::from_connection(conn)
    }

    /// 記憶體資料庫
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_sqlite_connection(&conn)?;
        Self::from_connection(conn)
    }

    /// 從既有連線建立，會執行建表
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockError(e.to_string()))
    }

    /// 目前資料庫的 schema 版本
    pub fn schema_version(&self) -> StoreResult<Option<i64>> {
        let conn = self.get_conn()?;
        Ok(read_schema_version(&conn)?)
    }

    /// 寫入（或覆寫）單日銷售
    pub fn record_sale(&self, fact: &SalesFact) -> StoreResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO sales_fact (branch_id, product_id, sale_date, sold_qty) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (branch_id, product_id, sale_date) DO UPDATE SET sold_qty = excluded.sold_qty",
            params![
                fact.branch_id,
                fact.product_id,
                fact.sale_date.to_string(),
                fact.sold_qty.to_string(),
            ],
        )?;
        Ok(())
    }
}

impl PlanStore for SqliteStore {
    fn insert(&self, plan: &ProductionPlan) -> StoreResult<()> {
        let conn = self.get_conn()?;
        let config_json = serde_json::to_string(&plan.config_snapshot)
            .map_err(|e| StoreError::DataConversion(e.to_string()))?;

        let result = conn.execute(
            &format!(
                "INSERT INTO production_plan ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                PLAN_COLUMNS
            ),
            params![
                plan.id.to_string(),
                plan.branch_id,
                plan.product_id,
                plan.plan_date.to_string(),
                plan.recommended_qty.to_string(),
                plan.weighted_average.to_string(),
                config_json,
                plan.adjusted_qty.map(|q| q.to_string()),
                plan.actual_qty.map(|q| q.to_string()),
                plan.frozen_target_qty.map(|q| q.to_string()),
                plan.status.as_str(),
                plan.revision,
                format_timestamp(plan.created_at),
                format_timestamp(plan.updated_at),
                plan.realized_at.map(format_timestamp),
                plan.finalized_at.map(format_timestamp),
            ],
        );

        match result.map_err(StoreError::from) {
            Ok(_) => Ok(()),
            Err(StoreError::UniqueConstraintViolation(msg)) if msg.contains("branch_id") => {
                debug!("計劃鍵重複: {}", plan.key());
                Err(StoreError::DuplicateKey { key: plan.key() })
            }
            Err(e) => Err(e),
        }
    }

    fn get(&self, plan_id: Uuid) -> StoreResult<Option<ProductionPlan>> {
        let conn = self.get_conn()?;
        load_plan(&conn, plan_id)
    }

    fn find_by_key(&self, key: &PlanKey) -> StoreResult<Option<ProductionPlan>> {
        let conn = self.get_conn()?;
        let plan = conn
            .query_row(
                &format!(
                    "SELECT {} FROM production_plan \
                     WHERE branch_id = ?1 AND product_id = ?2 AND plan_date = ?3",
                    PLAN_COLUMNS
                ),
                params![key.branch_id, key.product_id, key.plan_date.to_string()],
                map_plan_row,
            )
            .optional()?;
        Ok(plan)
    }

    fn list_for_branch(
        &self,
        branch_id: &str,
        range: DateRange,
    ) -> StoreResult<Vec<ProductionPlan>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM production_plan \
             WHERE branch_id = ?1 AND plan_date >= ?2 AND plan_date <= ?3 \
             ORDER BY plan_date, product_id",
            PLAN_COLUMNS
        ))?;

        let plans = stmt
            .query_map(
                params![branch_id, range.start.to_string(), range.end.to_string()],
                map_plan_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    fn update(&self, plan: &ProductionPlan, expected_revision: u32) -> StoreResult<ProductionPlan> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "UPDATE production_plan SET \
                 adjusted_qty = ?1, actual_qty = ?2, frozen_target_qty = ?3, status = ?4, \
                 updated_at = ?5, realized_at = ?6, finalized_at = ?7, revision = revision + 1 \
             WHERE plan_id = ?8 AND revision = ?9 AND status <> 'FINALIZED'",
            params![
                plan.adjusted_qty.map(|q| q.to_string()),
                plan.actual_qty.map(|q| q.to_string()),
                plan.frozen_target_qty.map(|q| q.to_string()),
                plan.status.as_str(),
                format_timestamp(plan.updated_at),
                plan.realized_at.map(format_timestamp),
                plan.finalized_at.map(format_timestamp),
                plan.id.to_string(),
                expected_revision,
            ],
        )?;

        if rows == 0 {
            // 區分失敗原因
            let current: Option<(String, u32)> = conn
                .query_row(
                    "SELECT status, revision FROM production_plan WHERE plan_id = ?1",
                    params![plan.id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            return Err(match current {
                None => StoreError::NotFound(plan.id),
                Some((status, _)) if status == PlanStatus::Finalized.as_str() => {
                    StoreError::PlanFinalized { plan_id: plan.id }
                }
                Some((_, actual)) => {
                    warn!(
                        "樂觀鎖衝突: plan_id={}, expected={}, actual={}",
                        plan.id, expected_revision, actual
                    );
                    StoreError::OptimisticLockFailure {
                        plan_id: plan.id,
                        expected: expected_revision,
                        actual,
                    }
                }
            });
        }

        load_plan(&conn, plan.id)?.ok_or(StoreError::NotFound(plan.id))
    }
}

impl SalesHistory for SqliteStore {
    fn sold_qty(
        &self,
        branch_id: &str,
        product_id: &str,
        date: NaiveDate,
    ) -> dss_core::Result<Option<Decimal>> {
        let conn = self.get_conn()?;
        let qty = conn
            .query_row(
                "SELECT sold_qty FROM sales_fact \
                 WHERE branch_id = ?1 AND product_id = ?2 AND sale_date = ?3",
                params![branch_id, product_id, date.to_string()],
                |row| parse_text(row, 0, |s: &str| Decimal::from_str(s)),
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(qty)
    }

    /// 以單次區間查詢取得視窗
    fn window(
        &self,
        branch_id: &str,
        product_id: &str,
        before: NaiveDate,
        days: usize,
    ) -> dss_core::Result<Vec<SalesFact>> {
        let dates = trailing_days(before, days)?;
        let Some(first) = dates.first() else {
            return Ok(Vec::new());
        };

        let conn = self.get_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT sale_date, sold_qty FROM sales_fact \
                 WHERE branch_id = ?1 AND product_id = ?2 AND sale_date >= ?3 AND sale_date < ?4 \
                 ORDER BY sale_date",
            )
            .map_err(StoreError::from)?;

        let facts = stmt
            .query_map(
                params![branch_id, product_id, first.to_string(), before.to_string()],
                |row| {
                    Ok(SalesFact::new(
                        branch_id,
                        product_id,
                        parse_text(row, 0, |s: &str| NaiveDate::from_str(s))?,
                        parse_text(row, 1, |s: &str| Decimal::from_str(s))?,
                    ))
                },
            )
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(StoreError::from)?;
        Ok(facts)
    }
}

fn load_plan(conn: &Connection, plan_id: Uuid) -> StoreResult<Option<ProductionPlan>> {
    let plan = conn
        .query_row(
            &format!("SELECT {} FROM production_plan WHERE plan_id = ?1", PLAN_COLUMNS),
            params![plan_id.to_string()],
            map_plan_row,
        )
        .optional()?;
    Ok(plan)
}

fn map_plan_row(row: &Row<'_>) -> rusqlite::Result<ProductionPlan> {
    Ok(ProductionPlan {
        id: parse_text(row, 0, |s: &str| Uuid::parse_str(s))?,
        branch_id: row.get(1)?,
        product_id: row.get(2)?,
        plan_date: parse_text(row, 3, |s: &str| NaiveDate::from_str(s))?,
        recommended_qty: parse_text(row, 4, |s: &str| Decimal::from_str(s))?,
        weighted_average: parse_text(row, 5, |s: &str| Decimal::from_str(s))?,
        config_snapshot: parse_text(row, 6, |s: &str| serde_json::from_str::<DssConfig>(s))?,
        adjusted_qty: parse_optional_text(row, 7, |s: &str| Decimal::from_str(s))?,
        actual_qty: parse_optional_text(row, 8, |s: &str| Decimal::from_str(s))?,
        frozen_target_qty: parse_optional_text(row, 9, |s: &str| Decimal::from_str(s))?,
        status: parse_text(row, 10, PlanStatus::from_str)?,
        revision: row.get(11)?,
        created_at: parse_text(row, 12, parse_timestamp)?,
        updated_at: parse_text(row, 13, parse_timestamp)?,
        realized_at: parse_optional_text(row, 14, parse_timestamp)?,
        finalized_at: parse_optional_text(row, 15, parse_timestamp)?,
    })
}

fn parse_text<T, E, F>(row: &Row<'_>, idx: usize, parse: F) -> rusqlite::Result<T>
where
    F: Fn(&str) -> Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_text<T, E, F>(row: &Row<'_>, idx: usize, parse: F) -> rusqlite::Result<Option<T>>
where
    F: Fn(&str) -> Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Utc))
}
