//! 單一分店一日流程：建立計劃 → 調整 → 登錄實際產量 → 結案 → 對帳
//!
//! ```text
//! cargo run --example daily_close
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use dss::{
    logging, BranchConfigRegistry, BranchConfigSet, DateRange, InMemoryProductCatalog,
    PlanStatus, ProductionPlanner, SalesFact, SqliteStore,
};
use rust_decimal::Decimal;

const BRANCH_CONFIG: &str = r#"{
    "branches": {
        "BR-TPE": { "weights": [0.5, 0.3, 0.2], "safety_stock_percent": 20 }
    }
}"#;

fn main() -> Result<()> {
    logging::init();

    let store = SqliteStore::open_in_memory().context("無法開啟資料庫")?;
    let plan_date = NaiveDate::from_ymd_opt(2025, 11, 4).context("無效日期")?;

    // 前三天銷售（由舊到新）
    for (day, croissant, bagel) in [(1, 100, 60), (2, 80, 55), (3, 120, 70)] {
        let date = NaiveDate::from_ymd_opt(2025, 11, day).context("無效日期")?;
        store.record_sale(&SalesFact::new("BR-TPE", "CROISSANT", date, Decimal::from(croissant)))?;
        store.record_sale(&SalesFact::new("BR-TPE", "BAGEL", date, Decimal::from(bagel)))?;
    }

    let configs = BranchConfigRegistry::from_set(&BranchConfigSet::from_json_str(BRANCH_CONFIG)?);
    let catalog = InMemoryProductCatalog::new().with_products("BR-TPE", ["CROISSANT", "BAGEL"]);
    let planner = ProductionPlanner::new(store.clone(), store.clone(), catalog).with_configs(configs);

    let run = planner.create_daily_plans("BR-TPE", plan_date)?;
    for plan in run.created() {
        println!("{} 建議量 {}", plan.product_id, plan.recommended_qty);
    }

    let croissant = planner
        .find_plan("BR-TPE", "CROISSANT", plan_date)?
        .context("找不到 CROISSANT 計劃")?;
    let bagel = planner
        .find_plan("BR-TPE", "BAGEL", plan_date)?
        .context("找不到 BAGEL 計劃")?;

    planner.adjust_plan(croissant.id, Decimal::from(110))?;
    planner.record_realization(croissant.id, Decimal::from(105), Some(PlanStatus::Adjusted))?;
    planner.finalize_plan(croissant.id)?;
    planner.record_realization(bagel.id, Decimal::from(70), None)?;

    // 當日收班後的實際銷售
    store.record_sale(&SalesFact::new("BR-TPE", "CROISSANT", plan_date, Decimal::from(95)))?;
    store.record_sale(&SalesFact::new("BR-TPE", "BAGEL", plan_date, Decimal::from(74)))?;

    let report = planner.get_reconciliation_report("BR-TPE", DateRange::single_day(plan_date))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
