//! 建議量 / 實際產量 / 實際銷售 對帳

use chrono::NaiveDate;
use dss_core::{DateRange, PlanStatus, ProductionPlan, SalesHistory};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// 比率；分母為 0 時為 n/a
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ratio {
    Value(Decimal),
    NotApplicable,
}

impl Ratio {
    /// numerator / denominator，分母為 0 時回傳 `NotApplicable`
    pub fn of(numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            return Ratio::NotApplicable;
        }
        numerator
            .checked_div(denominator)
            .map(Ratio::Value)
            .unwrap_or(Ratio::NotApplicable)
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Ratio::Value(v) => Some(*v),
            Ratio::NotApplicable => None,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Value(v) => write!(f, "{}", v.round_dp(4)),
            Ratio::NotApplicable => f.write_str("n/a"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Ratio::Value(v) => Serialize::serialize(v, serializer),
            Ratio::NotApplicable => serializer.serialize_str("n/a"),
        }
    }
}

/// 單一計劃的對帳結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReconciliation {
    pub plan_id: Uuid,
    pub branch_id: String,
    pub product_id: String,
    pub plan_date: NaiveDate,
    pub status: PlanStatus,

    /// FINALIZED 為定案數字；REALIZED 仍可能被更正
    pub is_final: bool,

    pub recommended_qty: Decimal,
    pub adjusted_qty: Option<Decimal>,
    pub effective_target_qty: Decimal,
    pub actual_qty: Decimal,
    pub sold_qty: Decimal,

    /// 報廢：max(0, 實際產量 − 銷售)
    pub waste_qty: Decimal,

    /// 缺貨訊號：max(0, 銷售 − 實際產量)
    pub lost_sales_signal: Decimal,

    /// 實際產量 / 目標量
    pub accuracy_ratio: Ratio,
}

/// 彙總指標（一律以加總計算，不平均比率）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationAggregate {
    pub plan_count: usize,

    /// Σ 目標量（調整量 ?? 建議量）
    pub total_recommended: Decimal,
    pub total_actual: Decimal,
    pub total_sold: Decimal,
    pub total_waste: Decimal,
    pub total_lost_sales_signal: Decimal,

    /// total_actual / total_recommended
    pub overall_accuracy: Ratio,
}

impl Default for ReconciliationAggregate {
    fn default() -> Self {
        Self {
            plan_count: 0,
            total_recommended: Decimal::ZERO,
            total_actual: Decimal::ZERO,
            total_sold: Decimal::ZERO,
            total_waste: Decimal::ZERO,
            total_lost_sales_signal: Decimal::ZERO,
            overall_accuracy: Ratio::NotApplicable,
        }
    }
}

impl ReconciliationAggregate {
    /// 累加單一計劃
    pub fn add(&mut self, row: &PlanReconciliation) {
        self.plan_count += 1;
        self.total_recommended += row.effective_target_qty;
        self.total_actual += row.actual_qty;
        self.total_sold += row.sold_qty;
        self.total_waste += row.waste_qty;
        self.total_lost_sales_signal += row.lost_sales_signal;
        self.refresh_accuracy();
    }

    /// 合併另一組彙總（例如跨分店）
    pub fn merge(&mut self, other: &ReconciliationAggregate) {
        self.plan_count += other.plan_count;
        self.total_recommended += other.total_recommended;
        self.total_actual += other.total_actual;
        self.total_sold += other.total_sold;
        self.total_waste += other.total_waste;
        self.total_lost_sales_signal += other.total_lost_sales_signal;
        self.refresh_accuracy();
    }

    fn refresh_accuracy(&mut self) {
        self.overall_accuracy = Ratio::of(self.total_actual, self.total_recommended);
    }
}

/// 未納入彙總的計劃
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPlan {
    pub plan_id: Uuid,
    pub branch_id: String,
    pub product_id: String,
    pub plan_date: NaiveDate,
    pub status: PlanStatus,
}

impl From<&ProductionPlan> for PendingPlan {
    fn from(plan: &ProductionPlan) -> Self {
        Self {
            plan_id: plan.id,
            branch_id: plan.branch_id.clone(),
            product_id: plan.product_id.clone(),
            plan_date: plan.plan_date,
            status: plan.status,
        }
    }
}

/// 對帳報表
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub branch_ids: Vec<String>,
    pub range: DateRange,

    /// 依 (分店, 日期, 產品) 排序
    pub per_plan: Vec<PlanReconciliation>,
    pub aggregate: ReconciliationAggregate,
    pub by_branch: BTreeMap<String, ReconciliationAggregate>,
    pub by_product: BTreeMap<String, ReconciliationAggregate>,

    /// 尚未登錄實際產量（RECOMMENDED / ADJUSTED）
    pub pending_realization: Vec<PendingPlan>,

    /// 已登錄實際產量，但當日尚無銷售資料
    pub awaiting_sales: Vec<PendingPlan>,
}

/// 對帳引擎
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// 計算單一計劃的對帳指標；尚未登錄實際產量時回傳 `None`
    pub fn reconcile_plan(plan: &ProductionPlan, sold_qty: Decimal) -> Option<PlanReconciliation> {
        if !plan.status.is_realized() {
            return None;
        }
        let actual_qty = plan.actual_qty?;
        let target = plan.effective_target_qty();

        Some(PlanReconciliation {
            plan_id: plan.id,
            branch_id: plan.branch_id.clone(),
            product_id: plan.product_id.clone(),
            plan_date: plan.plan_date,
            status: plan.status,
            is_final: plan.status == PlanStatus::Finalized,
            recommended_qty: plan.recommended_qty,
            adjusted_qty: plan.adjusted_qty,
            effective_target_qty: target,
            actual_qty,
            sold_qty,
            waste_qty: (actual_qty - sold_qty).max(Decimal::ZERO),
            lost_sales_signal: (sold_qty - actual_qty).max(Decimal::ZERO),
            accuracy_ratio: Ratio::of(actual_qty, target),
        })
    }

    /// 產生對帳報表
    ///
    /// 只處理 `branch_ids` 中、計劃日落在 `range` 內的計劃。無副作用，
    /// 相同輸入必得相同輸出。
    pub fn report<H: SalesHistory + ?Sized>(
        branch_ids: &[String],
        range: DateRange,
        plans: &[ProductionPlan],
        sales: &H,
    ) -> dss_core::Result<ReconciliationReport> {
        let mut selected: Vec<&ProductionPlan> = plans
            .iter()
            .filter(|p| range.contains(p.plan_date) && branch_ids.contains(&p.branch_id))
            .collect();
        selected.sort_by(|a, b| {
            (&a.branch_id, a.plan_date, &a.product_id, a.id)
                .cmp(&(&b.branch_id, b.plan_date, &b.product_id, b.id))
        });

        let mut report = ReconciliationReport {
            branch_ids: branch_ids.to_vec(),
            range,
            per_plan: Vec::new(),
            aggregate: ReconciliationAggregate::default(),
            by_branch: BTreeMap::new(),
            by_product: BTreeMap::new(),
            pending_realization: Vec::new(),
            awaiting_sales: Vec::new(),
        };

        for plan in selected {
            if !plan.status.is_realized() {
                report.pending_realization.push(PendingPlan::from(plan));
                continue;
            }

            let Some(sold_qty) = sales.sold_qty(&plan.branch_id, &plan.product_id, plan.plan_date)?
            else {
                report.awaiting_sales.push(PendingPlan::from(plan));
                continue;
            };

            if let Some(row) = Self::reconcile_plan(plan, sold_qty) {
                report
                    .by_branch
                    .entry(row.branch_id.clone())
                    .or_default()
                    .add(&row);
                report
                    .by_product
                    .entry(row.product_id.clone())
                    .or_default()
                    .add(&row);
                report.per_plan.push(row);
            }
        }

        for branch_aggregate in report.by_branch.values() {
            report.aggregate.merge(branch_aggregate);
        }

        tracing::info!(
            "對帳完成: 分店 {:?} {}~{}，納入 {} 筆，待登錄 {} 筆，待銷售資料 {} 筆",
            branch_ids,
            range.start,
            range.end,
            report.per_plan.len(),
            report.pending_realization.len(),
            report.awaiting_sales.len()
        );

        Ok(report)
    }
}
