//! # DSS Calculation Engine
//!
//! 生產建議量預測與對帳計算（純函數，不持有狀態）

pub mod forecast;
pub mod reconciliation;

// Re-export 主要類型
pub use forecast::{Forecast, ForecastEngine, Recommendation};
pub use reconciliation::{
    PendingPlan, PlanReconciliation, Ratio, ReconciliationAggregate, ReconciliationEngine,
    ReconciliationReport,
};
