//! 每日生產計劃模型與狀態機

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{DssConfig, DssError, Result};

/// 計劃狀態
///
/// ```text
/// RECOMMENDED ⇄ ADJUSTED → REALIZED → FINALIZED
///        └────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    /// 系統建議（初始狀態）
    Recommended,
    /// 人工調整
    Adjusted,
    /// 已登錄實際產量
    Realized,
    /// 已結案（終態）
    Finalized,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Recommended => "RECOMMENDED",
            PlanStatus::Adjusted => "ADJUSTED",
            PlanStatus::Realized => "REALIZED",
            PlanStatus::Finalized => "FINALIZED",
        }
    }

    /// 是否為終態
    pub fn is_terminal(&self) -> bool {
        *self == PlanStatus::Finalized
    }

    /// 是否已有實際產量（可納入對帳）
    pub fn is_realized(&self) -> bool {
        matches!(self, PlanStatus::Realized | PlanStatus::Finalized)
    }

    /// 檢查狀態轉換是否合法
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (*self, next),
            (Recommended, Recommended)
                | (Recommended, Adjusted)
                | (Adjusted, Adjusted)
                | (Adjusted, Recommended)
                | (Recommended, Realized)
                | (Adjusted, Realized)
                | (Realized, Realized)
                | (Realized, Finalized)
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = DssError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RECOMMENDED" => Ok(PlanStatus::Recommended),
            "ADJUSTED" => Ok(PlanStatus::Adjusted),
            "REALIZED" => Ok(PlanStatus::Realized),
            "FINALIZED" => Ok(PlanStatus::Finalized),
            other => Err(DssError::Storage(format!("未知的計劃狀態: {}", other))),
        }
    }
}

/// 計劃唯一鍵：每分店每產品每日一筆
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanKey {
    pub branch_id: String,
    pub product_id: String,
    pub plan_date: NaiveDate,
}

impl PlanKey {
    pub fn new(branch_id: impl Into<String>, product_id: impl Into<String>, plan_date: NaiveDate) -> Self {
        Self {
            branch_id: branch_id.into(),
            product_id: product_id.into(),
            plan_date,
        }
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.branch_id, self.product_id, self.plan_date)
    }
}

/// 每日生產計劃
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionPlan {
    /// 計劃ID
    pub id: Uuid,

    /// 分店ID
    pub branch_id: String,

    /// 產品ID
    pub product_id: String,

    /// 計劃日期
    pub plan_date: NaiveDate,

    /// 系統建議量（建立後不變）
    pub recommended_qty: Decimal,

    /// 建議量計算時的加權平均（未含安全庫存）
    pub weighted_average: Decimal,

    /// 建立計劃時的分店配置快照
    pub config_snapshot: DssConfig,

    /// 人工調整量
    pub adjusted_qty: Option<Decimal>,

    /// 實際產量
    pub actual_qty: Option<Decimal>,

    /// 首次登錄實際產量時凍結的目標量
    pub frozen_target_qty: Option<Decimal>,

    /// 狀態
    pub status: PlanStatus,

    /// 樂觀鎖版本號，每次寫入遞增
    pub revision: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// 首次登錄實際產量時間
    pub realized_at: Option<DateTime<Utc>>,

    /// 結案時間
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ProductionPlan {
    /// 以預測結果創建新計劃（狀態為 RECOMMENDED）
    pub fn new(
        key: PlanKey,
        recommended_qty: Decimal,
        weighted_average: Decimal,
        config_snapshot: DssConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            branch_id: key.branch_id,
            product_id: key.product_id,
            plan_date: key.plan_date,
            recommended_qty,
            weighted_average,
            config_snapshot,
            adjusted_qty: None,
            actual_qty: None,
            frozen_target_qty: None,
            status: PlanStatus::Recommended,
            revision: 0,
            created_at: now,
            updated_at: now,
            realized_at: None,
            finalized_at: None,
        }
    }

    /// 計劃唯一鍵
    pub fn key(&self) -> PlanKey {
        PlanKey::new(self.branch_id.clone(), self.product_id.clone(), self.plan_date)
    }

    /// 對帳用目標量
    ///
    /// 登錄實際產量後固定為當時的 調整量 ?? 建議量。
    pub fn effective_target_qty(&self) -> Decimal {
        self.frozen_target_qty
            .unwrap_or_else(|| self.adjusted_qty.unwrap_or(self.recommended_qty))
    }

    /// 是否已結案
    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }

    /// 檢查呼叫端預期的狀態
    ///
    /// 供變更前使用：已結案的計劃一律回報 `PlanFinalized`。
    pub fn expect_status(&self, expected: PlanStatus) -> Result<()> {
        self.ensure_mutable()?;
        if self.status != expected {
            return Err(DssError::StatusMismatch {
                plan_id: self.id,
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    /// 人工調整生產量
    pub fn adjust(&mut self, qty: Decimal, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        ensure_non_negative("adjusted_qty", qty)?;
        self.ensure_target_open()?;

        self.adjusted_qty = Some(qty);
        self.transition(PlanStatus::Adjusted, now)
    }

    /// 取消人工調整，回到系統建議量
    pub fn clear_adjustment(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        self.ensure_target_open()?;

        self.adjusted_qty = None;
        self.transition(PlanStatus::Recommended, now)
    }

    /// 登錄（或更正）實際產量
    pub fn record_realization(&mut self, qty: Decimal, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        ensure_non_negative("actual_qty", qty)?;

        if self.frozen_target_qty.is_none() {
            self.frozen_target_qty = Some(self.effective_target_qty());
            self.realized_at = Some(now);
        }
        self.actual_qty = Some(qty);
        self.transition(PlanStatus::Realized, now)
    }

    /// 結案（不可逆）
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        if self.actual_qty.is_none() {
            return Err(DssError::RealizationRequired {
                plan_id: self.id,
                status: self.status,
            });
        }

        self.finalized_at = Some(now);
        self.transition(PlanStatus::Finalized, now)
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(DssError::PlanFinalized {
                plan_id: self.id,
                finalized_at: self.finalized_at,
            });
        }
        Ok(())
    }

    fn ensure_target_open(&self) -> Result<()> {
        if self.status == PlanStatus::Realized {
            return Err(DssError::TargetFrozen {
                plan_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: PlanStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DssError::StatusMismatch {
                plan_id: self.id,
                expected: next,
                actual: self.status,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

fn ensure_non_negative(field: &'static str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(DssError::InvalidQuantity { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 4, hour, 0, 0).unwrap()
    }

    fn sample_plan() -> ProductionPlan {
        let config = DssConfig::new(
            vec!["0.5".parse().unwrap(), "0.3".parse().unwrap(), "0.2".parse().unwrap()],
            Decimal::from(20),
        )
        .unwrap();

        ProductionPlan::new(
            PlanKey::new("BR-TPE", "CROISSANT", NaiveDate::from_ymd_opt(2025, 11, 4).unwrap()),
            Decimal::from(118),
            Decimal::from(98),
            config,
            at(6),
        )
    }

    #[test]
    fn test_create_plan() {
        let plan = sample_plan();

        assert_eq!(plan.status, PlanStatus::Recommended);
        assert_eq!(plan.effective_target_qty(), Decimal::from(118));
        assert_eq!(plan.adjusted_qty, None);
        assert_eq!(plan.actual_qty, None);
        assert_eq!(plan.revision, 0);
        assert_eq!(plan.key().to_string(), "BR-TPE/CROISSANT/2025-11-04");
    }

    #[test]
    fn test_adjust_and_revert() {
        let mut plan = sample_plan();

        plan.adjust(Decimal::from(110), at(7)).unwrap();
        assert_eq!(plan.status, PlanStatus::Adjusted);
        assert_eq!(plan.effective_target_qty(), Decimal::from(110));

        plan.adjust(Decimal::from(90), at(7)).unwrap();
        assert_eq!(plan.effective_target_qty(), Decimal::from(90));

        plan.clear_adjustment(at(8)).unwrap();
        assert_eq!(plan.status, PlanStatus::Recommended);
        assert_eq!(plan.effective_target_qty(), Decimal::from(118));
        assert_eq!(plan.updated_at, at(8));
    }

    #[test]
    fn test_negative_quantities_rejected() {
        let mut plan = sample_plan();

        assert!(matches!(
            plan.adjust(Decimal::from(-1), at(7)),
            Err(DssError::InvalidQuantity { field: "adjusted_qty", .. })
        ));
        assert!(matches!(
            plan.record_realization(Decimal::from(-1), at(7)),
            Err(DssError::InvalidQuantity { field: "actual_qty", .. })
        ));
        assert_eq!(plan.status, PlanStatus::Recommended);
    }

    #[test]
    fn test_target_frozen_at_first_realization() {
        let mut plan = sample_plan();
        plan.adjust(Decimal::from(110), at(7)).unwrap();
        plan.record_realization(Decimal::from(105), at(12)).unwrap();

        assert_eq!(plan.status, PlanStatus::Realized);
        assert_eq!(plan.frozen_target_qty, Some(Decimal::from(110)));
        assert_eq!(plan.realized_at, Some(at(12)));

        // 更正實際產量：目標量與首次登錄時間不變
        plan.record_realization(Decimal::from(108), at(13)).unwrap();
        assert_eq!(plan.actual_qty, Some(Decimal::from(108)));
        assert_eq!(plan.effective_target_qty(), Decimal::from(110));
        assert_eq!(plan.realized_at, Some(at(12)));

        // 實際產量登錄後不可再改目標
        assert!(matches!(
            plan.adjust(Decimal::from(100), at(14)),
            Err(DssError::TargetFrozen { .. })
        ));
        assert!(matches!(
            plan.clear_adjustment(at(14)),
            Err(DssError::TargetFrozen { .. })
        ));
        assert_eq!(plan.effective_target_qty(), Decimal::from(110));
    }

    #[test]
    fn test_finalize_requires_realization() {
        let mut plan = sample_plan();
        plan.adjust(Decimal::from(110), at(7)).unwrap();

        let result = plan.finalize(at(20));
        assert!(matches!(
            result,
            Err(DssError::RealizationRequired {
                status: PlanStatus::Adjusted,
                ..
            })
        ));
        assert_eq!(plan.status, PlanStatus::Adjusted);
        assert_eq!(plan.finalized_at, None);
    }

    #[test]
    fn test_finalized_plan_is_read_only() {
        let mut plan = sample_plan();
        plan.record_realization(Decimal::from(120), at(12)).unwrap();
        plan.finalize(at(20)).unwrap();
        assert_eq!(plan.finalized_at, Some(at(20)));

        let snapshot = plan.clone();

        assert!(matches!(
            plan.adjust(Decimal::from(1), at(21)),
            Err(DssError::PlanFinalized { .. })
        ));
        assert!(matches!(
            plan.record_realization(Decimal::from(1), at(21)),
            Err(DssError::PlanFinalized { .. })
        ));
        assert!(matches!(
            plan.finalize(at(21)),
            Err(DssError::PlanFinalized { .. })
        ));
        // 結案後即使是無效數量，也先回報已結案
        assert!(matches!(
            plan.adjust(Decimal::from(-1), at(21)),
            Err(DssError::PlanFinalized { .. })
        ));

        assert_eq!(plan, snapshot);
    }

    #[test]
    fn test_expect_status() {
        let plan = sample_plan();
        assert!(plan.expect_status(PlanStatus::Recommended).is_ok());
        assert!(matches!(
            plan.expect_status(PlanStatus::Adjusted),
            Err(DssError::StatusMismatch {
                expected: PlanStatus::Adjusted,
                actual: PlanStatus::Recommended,
                ..
            })
        ));
    }

    #[rstest]
    #[case(PlanStatus::Realized)]
    #[case(PlanStatus::Adjusted)]
    #[case(PlanStatus::Finalized)]
    fn test_expect_status_on_finalized_plan(#[case] expected: PlanStatus) {
        let mut plan = sample_plan();
        plan.record_realization(Decimal::from(105), at(12)).unwrap();
        plan.finalize(at(20)).unwrap();

        assert!(matches!(
            plan.expect_status(expected),
            Err(DssError::PlanFinalized { finalized_at: Some(t), .. }) if t == at(20)
        ));
    }

    #[rstest]
    #[case(PlanStatus::Recommended, PlanStatus::Adjusted, true)]
    #[case(PlanStatus::Adjusted, PlanStatus::Recommended, true)]
    #[case(PlanStatus::Recommended, PlanStatus::Realized, true)]
    #[case(PlanStatus::Realized, PlanStatus::Finalized, true)]
    #[case(PlanStatus::Recommended, PlanStatus::Finalized, false)]
    #[case(PlanStatus::Realized, PlanStatus::Adjusted, false)]
    #[case(PlanStatus::Finalized, PlanStatus::Realized, false)]
    #[case(PlanStatus::Finalized, PlanStatus::Finalized, false)]
    fn test_transitions(#[case] from: PlanStatus, #[case] to: PlanStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(PlanStatus::Recommended)]
    #[case(PlanStatus::Adjusted)]
    #[case(PlanStatus::Realized)]
    #[case(PlanStatus::Finalized)]
    fn test_status_round_trip_through_str(#[case] status: PlanStatus) {
        assert_eq!(status.as_str().parse::<PlanStatus>().unwrap(), status);
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&PlanStatus::Finalized).unwrap(),
            "\"FINALIZED\""
        );
    }
}
