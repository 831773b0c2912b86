//! 生產計劃生命週期管理

use chrono::{DateTime, NaiveDate, Utc};
use dss_calc::{Forecast, ForecastEngine, ReconciliationEngine, ReconciliationReport};
use dss_core::{
    DateRange, DssConfig, DssError, PlanKey, PlanStatus, ProductCatalog, ProductionPlan, Result,
    SalesHistory,
};
use dss_store::{PlanStore, StoreError};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::BranchConfigRegistry;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 單一產品的建立結果
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub product_id: String,
    pub result: Result<ProductionPlan>,
}

/// 每日批次建立計劃的結果
///
/// 單一產品失敗（歷史不足、計劃已存在）不會中止其他產品。
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPlanRun {
    pub branch_id: String,
    pub plan_date: NaiveDate,
    pub outcomes: Vec<PlanOutcome>,
}

impl DailyPlanRun {
    /// 成功建立的計劃
    pub fn created(&self) -> Vec<&ProductionPlan> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .collect()
    }

    /// 失敗的產品與原因
    pub fn failures(&self) -> Vec<(&str, &DssError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.product_id.as_str(), e)))
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
}

/// 生產計劃管理器
///
/// 所有修改都走「讀取 → 在副本上做狀態轉換 → 以 revision 條件寫入」，
/// 條件寫入失敗時不重試，直接回報給呼叫端。
pub struct ProductionPlanner<S, H, C> {
    store: S,
    sales: H,
    catalog: C,
    configs: BranchConfigRegistry,
    clock: Clock,
}

impl<S, H, C> ProductionPlanner<S, H, C>
where
    S: PlanStore,
    H: SalesHistory,
    C: ProductCatalog,
{
    /// 創建新的管理器
    pub fn new(store: S, sales: H, catalog: C) -> Self {
        Self {
            store,
            sales,
            catalog,
            configs: BranchConfigRegistry::new(),
            clock: Arc::new(Utc::now),
        }
    }

    /// 建構器模式：設定分店配置登錄表
    pub fn with_configs(mut self, configs: BranchConfigRegistry) -> Self {
        self.configs = configs;
        self
    }

    /// 建構器模式：設定時鐘
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sales(&self) -> &H {
        &self.sales
    }

    pub fn configs(&self) -> &BranchConfigRegistry {
        &self.configs
    }

    /// 更新分店配置（僅影響之後建立的計劃）
    pub fn set_branch_config(&self, branch_id: &str, config: DssConfig) -> Result<()> {
        self.configs.set(branch_id, config)?;
        Ok(())
    }

    // ===== 建立 =====

    /// 為單一產品建立計劃
    pub fn create_plan(
        &self,
        branch_id: &str,
        product_id: &str,
        plan_date: NaiveDate,
    ) -> Result<ProductionPlan> {
        let key = PlanKey::new(branch_id, product_id, plan_date);
        self.ensure_absent(&key)?;

        let config = self.configs.snapshot(branch_id)?;
        let forecast = ForecastEngine::recommend(&self.sales, branch_id, product_id, plan_date, &config)?;
        self.insert_forecast(forecast, config)
    }

    /// 為分店所有上架產品建立當日計劃
    ///
    /// 找不到分店配置時整批失敗；其餘錯誤逐產品記錄在結果中。
    pub fn create_daily_plans(&self, branch_id: &str, plan_date: NaiveDate) -> Result<DailyPlanRun> {
        let config = self.configs.snapshot(branch_id)?;
        let products = self.catalog.active_products(branch_id)?;

        info!(
            "開始建立每日計劃: 分店 {} 日期 {}，共 {} 項產品",
            branch_id,
            plan_date,
            products.len()
        );

        let forecasts =
            ForecastEngine::recommend_many(&self.sales, branch_id, &products, plan_date, &config);

        let outcomes: Vec<PlanOutcome> = forecasts
            .into_iter()
            .map(|(product_id, forecast)| {
                let key = PlanKey::new(branch_id, product_id.as_str(), plan_date);
                let result = self
                    .ensure_absent(&key)
                    .and_then(|_| forecast)
                    .and_then(|forecast| self.insert_forecast(forecast, config.clone()));

                if let Err(e) = &result {
                    warn!("略過產品 {}: {}", product_id, e);
                }
                PlanOutcome { product_id, result }
            })
            .collect();

        let run = DailyPlanRun {
            branch_id: branch_id.to_string(),
            plan_date,
            outcomes,
        };

        info!(
            "每日計劃完成: 分店 {} 日期 {}，建立 {} 筆，失敗 {} 筆",
            branch_id,
            plan_date,
            run.created_count(),
            run.outcomes.len() - run.created_count()
        );

        Ok(run)
    }

    // ===== 修改 =====

    /// 人工調整生產量
    pub fn adjust_plan(&self, plan_id: Uuid, qty: Decimal) -> Result<ProductionPlan> {
        self.mutate(plan_id, "調整", |plan, now| plan.adjust(qty, now))
    }

    /// 取消人工調整
    pub fn clear_adjustment(&self, plan_id: Uuid) -> Result<ProductionPlan> {
        self.mutate(plan_id, "取消調整", |plan, now| plan.clear_adjustment(now))
    }

    /// 登錄（或更正）實際產量
    ///
    /// 提供 `expected_status` 時，計劃目前狀態不符即回傳 `StatusMismatch`。
    pub fn record_realization(
        &self,
        plan_id: Uuid,
        qty: Decimal,
        expected_status: Option<PlanStatus>,
    ) -> Result<ProductionPlan> {
        self.mutate(plan_id, "登錄實際產量", |plan, now| {
            if let Some(expected) = expected_status {
                plan.expect_status(expected)?;
            }
            plan.record_realization(qty, now)
        })
    }

    /// 結案（每個計劃至多成功一次）
    pub fn finalize_plan(&self, plan_id: Uuid) -> Result<ProductionPlan> {
        let plan = self.mutate(plan_id, "結案", |plan, now| plan.finalize(now))?;
        info!(
            "計劃已結案: {} ({}) 目標 {} 實際 {:?}",
            plan.id,
            plan.key(),
            plan.effective_target_qty(),
            plan.actual_qty
        );
        Ok(plan)
    }

    // ===== 查詢 =====

    /// 依ID查詢計劃
    pub fn get_plan(&self, plan_id: Uuid) -> Result<ProductionPlan> {
        self.store
            .get(plan_id)?
            .ok_or(DssError::PlanNotFound { plan_id })
    }

    /// 依 (分店, 產品, 日期) 查詢計劃
    pub fn find_plan(
        &self,
        branch_id: &str,
        product_id: &str,
        plan_date: NaiveDate,
    ) -> Result<Option<ProductionPlan>> {
        Ok(self
            .store
            .find_by_key(&PlanKey::new(branch_id, product_id, plan_date))?)
    }

    /// 分店在日期區間內的計劃
    pub fn list_plans(&self, branch_id: &str, range: DateRange) -> Result<Vec<ProductionPlan>> {
        Ok(self.store.list_for_branch(branch_id, range)?)
    }

    // ===== 對帳 =====

    /// 單一分店對帳報表
    pub fn get_reconciliation_report(
        &self,
        branch_id: &str,
        range: DateRange,
    ) -> Result<ReconciliationReport> {
        let plans = self.list_plans(branch_id, range)?;
        ReconciliationEngine::report(&[branch_id.to_string()], range, &plans, &self.sales)
    }

    /// 多分店合併對帳報表
    pub fn get_consolidated_report(
        &self,
        branch_ids: &[String],
        range: DateRange,
    ) -> Result<ReconciliationReport> {
        let mut plans = Vec::new();
        for branch_id in branch_ids {
            plans.extend(self.list_plans(branch_id, range)?);
        }
        ReconciliationEngine::report(branch_ids, range, &plans, &self.sales)
    }

    // ===== 內部 =====

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn ensure_absent(&self, key: &PlanKey) -> Result<()> {
        match self.store.find_by_key(key)? {
            Some(existing) => Err(already_exists(key, existing.id)),
            None => Ok(()),
        }
    }

    fn insert_forecast(&self, forecast: Forecast, config: DssConfig) -> Result<ProductionPlan> {
        let key = PlanKey::new(forecast.branch_id, forecast.product_id, forecast.plan_date);
        let plan = ProductionPlan::new(
            key,
            forecast.recommended_qty,
            forecast.weighted_average,
            config,
            self.now(),
        );

        match self.store.insert(&plan) {
            Ok(()) => {
                info!(
                    "建立計劃: {} ({}) 建議量 {}",
                    plan.id,
                    plan.key(),
                    plan.recommended_qty
                );
                Ok(plan)
            }
            Err(StoreError::DuplicateKey { key }) => {
                // 並發建立：唯一約束已擋下
                let existing = self
                    .store
                    .find_by_key(&key)?
                    .ok_or_else(|| DssError::Storage(format!("唯一鍵衝突後找不到計劃: {}", key)))?;
                Err(already_exists(&key, existing.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn mutate<F>(&self, plan_id: Uuid, action: &str, apply: F) -> Result<ProductionPlan>
    where
        F: FnOnce(&mut ProductionPlan, DateTime<Utc>) -> Result<()>,
    {
        let current = self.get_plan(plan_id)?;
        let expected_revision = current.revision;

        let mut next = current;
        if let Err(e) = apply(&mut next, self.now()) {
            warn!("{}被拒絕: {}", action, e);
            return Err(e);
        }

        match self.store.update(&next, expected_revision) {
            Ok(stored) => {
                debug!(
                    "{}完成: {} 狀態 {} revision {}",
                    action, stored.id, stored.status, stored.revision
                );
                Ok(stored)
            }
            Err(err @ (StoreError::PlanFinalized { .. } | StoreError::OptimisticLockFailure { .. })) => {
                warn!("{}寫入衝突: {}", action, err);
                Err(self.explain_conflict(plan_id, err))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 條件寫入失敗後重新讀取，已結案者回報 `PlanFinalized`
    fn explain_conflict(&self, plan_id: Uuid, err: StoreError) -> DssError {
        match self.store.get(plan_id) {
            Ok(Some(latest)) if latest.is_finalized() => DssError::PlanFinalized {
                plan_id,
                finalized_at: latest.finalized_at,
            },
            _ => err.into(),
        }
    }
}

fn already_exists(key: &PlanKey, existing_plan_id: Uuid) -> DssError {
    DssError::PlanAlreadyExists {
        branch_id: key.branch_id.clone(),
        product_id: key.product_id.clone(),
        plan_date: key.plan_date,
        existing_plan_id,
    }
}
