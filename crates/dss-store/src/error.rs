//! 儲存層錯誤類型

use dss_core::{DssError, PlanKey};
use thiserror::Error;
use uuid::Uuid;

/// 儲存層錯誤
#[derive(Error, Debug)]
pub enum StoreError {
    // ===== 並發控制 =====
    #[error("計劃鍵重複: {key}")]
    DuplicateKey { key: PlanKey },

    #[error("樂觀鎖衝突: plan_id={plan_id}, expected_revision={expected}, actual_revision={actual}")]
    OptimisticLockFailure {
        plan_id: Uuid,
        expected: u32,
        actual: u32,
    },

    #[error("計劃已結案，拒絕寫入: plan_id={plan_id}")]
    PlanFinalized { plan_id: Uuid },

    // ===== 資料庫 =====
    #[error("記錄未找到: plan_id={0}")]
    NotFound(Uuid),

    #[error("資料庫鎖獲取失敗: {0}")]
    LockError(String),

    #[error("唯一約束違反: {0}")]
    UniqueConstraintViolation(String),

    #[error("資料庫查詢失敗: {0}")]
    DatabaseQueryError(String),

    #[error("資料轉換失敗: {0}")]
    DataConversion(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE") => {
                StoreError::UniqueConstraintViolation(msg)
            }
            rusqlite::Error::FromSqlConversionFailure(_, _, e) => {
                StoreError::DataConversion(e.to_string())
            }
            _ => StoreError::DatabaseQueryError(err.to_string()),
        }
    }
}

impl From<StoreError> for DssError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(plan_id) => DssError::PlanNotFound { plan_id },
            StoreError::PlanFinalized { plan_id } => DssError::PlanFinalized {
                plan_id,
                finalized_at: None,
            },
            StoreError::OptimisticLockFailure {
                plan_id,
                expected,
                actual,
            } => DssError::ConcurrentModification {
                plan_id,
                expected_revision: expected,
                actual_revision: actual,
            },
            other => DssError::Storage(other.to_string()),
        }
    }
}

/// Result 類型別名
pub type StoreResult<T> = Result<T, StoreError>;
