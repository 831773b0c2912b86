//! # DSS Planner
//!
//! 生產計劃生命週期管理（建立、調整、登錄實際產量、結案）與對帳報表入口

pub mod planner;
pub mod registry;

// Re-export 主要類型
pub use planner::{DailyPlanRun, PlanOutcome, ProductionPlanner};
pub use registry::BranchConfigRegistry;
