//! # DSS Store
//!
//! 生產計劃儲存與銷售時間序列存取
//!
//! 每 (分店, 產品, 日期) 唯一一筆計劃由儲存層的唯一約束保證；
//! 所有修改都是以 `revision` 為條件的比較後寫入。

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

// Re-export 主要類型
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryPlanStore, InMemoryProductCatalog, InMemorySalesHistory};
pub use sqlite::SqliteStore;

use dss_core::{DateRange, PlanKey, ProductionPlan};
use uuid::Uuid;

/// 生產計劃儲存介面
pub trait PlanStore: Send + Sync {
    /// 新增計劃；同一 (分店, 產品, 日期) 已存在時回傳 `DuplicateKey`
    fn insert(&self, plan: &ProductionPlan) -> StoreResult<()>;

    /// 依ID查詢
    fn get(&self, plan_id: Uuid) -> StoreResult<Option<ProductionPlan>>;

    /// 依唯一鍵查詢
    fn find_by_key(&self, key: &PlanKey) -> StoreResult<Option<ProductionPlan>>;

    /// 查詢分店在日期區間內的計劃，依 (日期, 產品) 排序
    fn list_for_branch(&self, branch_id: &str, range: DateRange)
        -> StoreResult<Vec<ProductionPlan>>;

    /// 條件寫入
    ///
    /// 只有在儲存中的 revision 等於 `expected_revision` 且計劃尚未結案時才寫入
    /// 可變欄位（調整量、實際產量、凍結目標量、狀態、時間戳），寫入後 revision + 1。
    /// 回傳寫入後的計劃。
    fn update(&self, plan: &ProductionPlan, expected_revision: u32) -> StoreResult<ProductionPlan>;
}
