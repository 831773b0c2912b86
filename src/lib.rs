//! # DSS
//!
//! 多分店每日生產決策支援：以近期銷售加權平均建議生產量，
//! 管理計劃生命週期（建議 → 調整 → 登錄實際產量 → 結案），
//! 並產出建議量、實際產量與實際銷售的對帳報表。

pub mod logging;

pub use dss_calc::{
    Forecast, ForecastEngine, PendingPlan, PlanReconciliation, Ratio, ReconciliationAggregate,
    ReconciliationEngine, ReconciliationReport,
};
pub use dss_core::{
    BranchConfigSet, DateRange, DssConfig, DssError, PlanKey, PlanStatus, ProductCatalog,
    ProductionPlan, Result, SalesFact, SalesHistory,
};
pub use dss_planner::{BranchConfigRegistry, DailyPlanRun, PlanOutcome, ProductionPlanner};
pub use dss_store::{
    InMemoryPlanStore, InMemoryProductCatalog, InMemorySalesHistory, PlanStore, SqliteStore,
    StoreError,
};
