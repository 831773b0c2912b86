//! # DSS Core
//!
//! 生產決策支援核心資料模型與類型定義

pub mod calendar;
pub mod catalog;
pub mod config;
pub mod plan;
pub mod sales;

// Re-export 主要類型
pub use calendar::{trailing_days, DateRange};
pub use catalog::ProductCatalog;
pub use config::{BranchConfigSet, DssConfig};
pub use plan::{PlanKey, PlanStatus, ProductionPlan};
pub use sales::{SalesFact, SalesHistory};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 生產決策支援錯誤類型
///
/// 除 `Storage` 以外皆為本地驗證失敗，不應自動重試。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DssError {
    #[error("無效的配置: {reason}")]
    InvalidConfig { reason: String },

    #[error("找不到分店配置: {branch_id}")]
    ConfigNotFound { branch_id: String },

    #[error(
        "歷史銷售資料不足: 分店 {branch_id} 產品 {product_id} 於 {plan_date} 前需要 {required} 天，實有 {available} 天"
    )]
    InsufficientHistory {
        branch_id: String,
        product_id: String,
        plan_date: NaiveDate,
        required: usize,
        available: usize,
    },

    #[error(
        "生產計劃已存在: 分店 {branch_id} 產品 {product_id} 日期 {plan_date} (plan_id={existing_plan_id})"
    )]
    PlanAlreadyExists {
        branch_id: String,
        product_id: String,
        plan_date: NaiveDate,
        existing_plan_id: Uuid,
    },

    #[error("找不到生產計劃: {plan_id}")]
    PlanNotFound { plan_id: Uuid },

    #[error("結案前必須先登錄實際產量: plan_id={plan_id}, status={status}")]
    RealizationRequired { plan_id: Uuid, status: PlanStatus },

    #[error("生產計劃已結案，不可再修改: plan_id={plan_id}")]
    PlanFinalized {
        plan_id: Uuid,
        finalized_at: Option<DateTime<Utc>>,
    },

    #[error("目標量已於登錄實際產量時凍結: plan_id={plan_id}, status={status}")]
    TargetFrozen { plan_id: Uuid, status: PlanStatus },

    #[error("計劃狀態不符: plan_id={plan_id}, expected={expected}, actual={actual}")]
    StatusMismatch {
        plan_id: Uuid,
        expected: PlanStatus,
        actual: PlanStatus,
    },

    #[error(
        "計劃已被其他操作修改: plan_id={plan_id}, expected_revision={expected_revision}, actual_revision={actual_revision}"
    )]
    ConcurrentModification {
        plan_id: Uuid,
        expected_revision: u32,
        actual_revision: u32,
    },

    #[error("數量不可為負數: {field}={value}")]
    InvalidQuantity { field: &'static str, value: Decimal },

    #[error("無效的日期區間: {0}")]
    InvalidDateRange(String),

    #[error("資料存取錯誤: {0}")]
    Storage(String),
}

impl DssError {
    /// 是否屬於基礎設施錯誤（由外層決定是否重試）
    pub fn is_retryable(&self) -> bool {
        matches!(self, DssError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, DssError>;
