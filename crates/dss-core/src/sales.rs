//! 銷售事實（外部交易系統提供，唯讀）

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{trailing_days, Result};

/// 某分店某產品某日的實際銷售量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesFact {
    /// 分店ID
    pub branch_id: String,

    /// 產品ID
    pub product_id: String,

    /// 銷售日期
    pub sale_date: NaiveDate,

    /// 銷售量
    pub sold_qty: Decimal,
}

impl SalesFact {
    /// 創建新的銷售事實
    pub fn new(
        branch_id: impl Into<String>,
        product_id: impl Into<String>,
        sale_date: NaiveDate,
        sold_qty: Decimal,
    ) -> Self {
        Self {
            branch_id: branch_id.into(),
            product_id: product_id.into(),
            sale_date,
            sold_qty,
        }
    }
}

/// 歷史銷售時間序列（交易子系統的唯讀介面）
///
/// 沒有紀錄的日期視為缺少歷史，而非零銷售。
pub trait SalesHistory: Send + Sync {
    /// 查詢單日銷售量
    fn sold_qty(&self, branch_id: &str, product_id: &str, date: NaiveDate)
        -> Result<Option<Decimal>>;

    /// 取得 `before` 之前連續 `days` 天中有紀錄的銷售（由舊到新）
    fn window(
        &self,
        branch_id: &str,
        product_id: &str,
        before: NaiveDate,
        days: usize,
    ) -> Result<Vec<SalesFact>> {
        let mut facts = Vec::with_capacity(days);
        for date in trailing_days(before, days)? {
            if let Some(qty) = self.sold_qty(branch_id, product_id, date)? {
                facts.push(SalesFact::new(branch_id, product_id, date, qty));
            }
        }
        Ok(facts)
    }
}
