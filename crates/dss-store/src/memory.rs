//! 記憶體內儲存實作（測試與單機情境）

use chrono::NaiveDate;
use dss_core::{
    DateRange, DssError, PlanKey, ProductCatalog, ProductionPlan, SalesFact, SalesHistory,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::{PlanStore, StoreError, StoreResult};

#[derive(Default)]
struct PlanTable {
    plans: HashMap<Uuid, ProductionPlan>,
    keys: HashMap<PlanKey, Uuid>,
}

/// 記憶體內計劃儲存
///
/// 唯一鍵索引與計劃本體在同一把鎖下維護，新增為原子操作。
#[derive(Default)]
pub struct InMemoryPlanStore {
    table: RwLock<PlanTable>,
}

impl InMemoryPlanStore {
    /// 創建空的儲存
    pub fn new() -> Self {
        Self::default()
    }

    /// 計劃總筆數
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.plans.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, PlanTable>> {
        self.table
            .read()
            .map_err(|e| StoreError::LockError(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, PlanTable>> {
        self.table
            .write()
            .map_err(|e| StoreError::LockError(e.to_string()))
    }
}

impl PlanStore for InMemoryPlanStore {
    fn insert(&self, plan: &ProductionPlan) -> StoreResult<()> {
        let mut table = self.write()?;
        let key = plan.key();

        if table.keys.contains_key(&key) {
            return Err(StoreError::DuplicateKey { key });
        }

        table.keys.insert(key, plan.id);
        table.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    fn get(&self, plan_id: Uuid) -> StoreResult<Option<ProductionPlan>> {
        Ok(self.read()?.plans.get(&plan_id).cloned())
    }

    fn find_by_key(&self, key: &PlanKey) -> StoreResult<Option<ProductionPlan>> {
        let table = self.read()?;
        Ok(table
            .keys
            .get(key)
            .and_then(|id| table.plans.get(id))
            .cloned())
    }

    fn list_for_branch(
        &self,
        branch_id: &str,
        range: DateRange,
    ) -> StoreResult<Vec<ProductionPlan>> {
        let table = self.read()?;
        let mut plans: Vec<ProductionPlan> = table
            .plans
            .values()
            .filter(|p| p.branch_id == branch_id && range.contains(p.plan_date))
            .cloned()
            .collect();
        plans.sort_by(|a, b| (a.plan_date, &a.product_id).cmp(&(b.plan_date, &b.product_id)));
        Ok(plans)
    }

    fn update(&self, plan: &ProductionPlan, expected_revision: u32) -> StoreResult<ProductionPlan> {
        let mut table = self.write()?;
        let stored = table
            .plans
            .get_mut(&plan.id)
            .ok_or(StoreError::NotFound(plan.id))?;

        if stored.is_finalized() {
            return Err(StoreError::PlanFinalized { plan_id: plan.id });
        }
        if stored.revision != expected_revision {
            return Err(StoreError::OptimisticLockFailure {
                plan_id: plan.id,
                expected: expected_revision,
                actual: stored.revision,
            });
        }

        stored.adjusted_qty = plan.adjusted_qty;
        stored.actual_qty = plan.actual_qty;
        stored.frozen_target_qty = plan.frozen_target_qty;
        stored.status = plan.status;
        stored.updated_at = plan.updated_at;
        stored.realized_at = plan.realized_at;
        stored.finalized_at = plan.finalized_at;
        stored.revision = expected_revision + 1;

        Ok(stored.clone())
    }
}

/// 記憶體內銷售時間序列
#[derive(Default)]
pub struct InMemorySalesHistory {
    facts: RwLock<BTreeMap<(String, String, NaiveDate), Decimal>>,
}

impl InMemorySalesHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：載入銷售事實
    pub fn with_facts(mut self, facts: impl IntoIterator<Item = SalesFact>) -> Self {
        // 持有所有權，不需加鎖
        let map = self.facts.get_mut().unwrap_or_else(PoisonError::into_inner);
        for fact in facts {
            map.insert((fact.branch_id, fact.product_id, fact.sale_date), fact.sold_qty);
        }
        self
    }

    /// 記錄（或覆寫）單日銷售
    pub fn record(&self, fact: SalesFact) -> StoreResult<()> {
        let mut map = self
            .facts
            .write()
            .map_err(|e| StoreError::LockError(e.to_string()))?;
        map.insert((fact.branch_id, fact.product_id, fact.sale_date), fact.sold_qty);
        Ok(())
    }
}

impl SalesHistory for InMemorySalesHistory {
    fn sold_qty(
        &self,
        branch_id: &str,
        product_id: &str,
        date: NaiveDate,
    ) -> dss_core::Result<Option<Decimal>> {
        let map = self
            .facts
            .read()
            .map_err(|e| DssError::Storage(e.to_string()))?;
        Ok(map
            .get(&(branch_id.to_string(), product_id.to_string(), date))
            .copied())
    }
}

/// 記憶體內產品目錄
#[derive(Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<BTreeMap<String, Vec<String>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：設定分店產品
    pub fn with_products<I, S>(mut self, branch_id: impl Into<String>, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(branch_id.into(), products.into_iter().map(Into::into).collect());
        self
    }

    /// 覆寫分店產品清單
    pub fn set_products(&self, branch_id: impl Into<String>, products: Vec<String>) -> StoreResult<()> {
        let mut map = self
            .products
            .write()
            .map_err(|e| StoreError::LockError(e.to_string()))?;
        map.insert(branch_id.into(), products);
        Ok(())
    }
}

impl ProductCatalog for InMemoryProductCatalog {
    fn active_products(&self, branch_id: &str) -> dss_core::Result<Vec<String>> {
        let map = self
            .products
            .read()
            .map_err(|e| DssError::Storage(e.to_string()))?;
        Ok(map.get(branch_id).cloned().unwrap_or_default())
    }
}
