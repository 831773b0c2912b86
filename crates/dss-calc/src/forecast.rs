//! 加權移動平均生產建議

use chrono::NaiveDate;
use dss_core::{DssConfig, DssError, SalesFact, SalesHistory};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 由固定視窗算出的建議量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Σ weight[i] · sold[i]
    pub weighted_average: Decimal,
    /// 加權平均 × (1 + 安全庫存%)，未捨入
    pub buffered_qty: Decimal,
    /// 無條件進位且不小於 0 的建議量
    pub recommended_qty: Decimal,
}

/// 單一 (分店, 產品, 日期) 的預測結果，保留計算依據供稽核
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub branch_id: String,
    pub product_id: String,
    pub plan_date: NaiveDate,

    /// 使用的歷史銷售（由舊到新，與權重一一對應）
    pub window: Vec<SalesFact>,

    pub weighted_average: Decimal,
    pub buffered_qty: Decimal,
    pub recommended_qty: Decimal,
}

/// 預測引擎
pub struct ForecastEngine;

impl ForecastEngine {
    /// 計算建議生產量
    ///
    /// 取計劃日之前 N = 權重個數 的日曆日銷售，缺任何一天即回報
    /// `InsufficientHistory`，不補零也不外插。
    pub fn recommend<H: SalesHistory + ?Sized>(
        history: &H,
        branch_id: &str,
        product_id: &str,
        plan_date: NaiveDate,
        config: &DssConfig,
    ) -> dss_core::Result<Forecast> {
        let required = config.window_size();
        let window = history.window(branch_id, product_id, plan_date, required)?;

        let quantities: Vec<Decimal> = window.iter().map(|f| f.sold_qty).collect();
        let recommendation = Self::weighted_recommendation(&quantities, config).ok_or_else(|| {
            tracing::debug!(
                "歷史不足: {}/{} 於 {} 前需要 {} 天，實有 {} 天",
                branch_id,
                product_id,
                plan_date,
                required,
                window.len()
            );
            DssError::InsufficientHistory {
                branch_id: branch_id.to_string(),
                product_id: product_id.to_string(),
                plan_date,
                required,
                available: window.len(),
            }
        })?;

        tracing::debug!(
            "預測 {}/{} {}: 加權平均 {} → 建議量 {}",
            branch_id,
            product_id,
            plan_date,
            recommendation.weighted_average,
            recommendation.recommended_qty
        );

        Ok(Forecast {
            branch_id: branch_id.to_string(),
            product_id: product_id.to_string(),
            plan_date,
            window,
            weighted_average: recommendation.weighted_average,
            buffered_qty: recommendation.buffered_qty,
            recommended_qty: recommendation.recommended_qty,
        })
    }

    /// 同一分店多個產品的預測（彼此獨立，可平行計算）
    ///
    /// 回傳順序與 `product_ids` 相同。
    pub fn recommend_many<H: SalesHistory + ?Sized>(
        history: &H,
        branch_id: &str,
        product_ids: &[String],
        plan_date: NaiveDate,
        config: &DssConfig,
    ) -> Vec<(String, dss_core::Result<Forecast>)> {
        product_ids
            .par_iter()
            .map(|product_id| {
                let forecast = Self::recommend(history, branch_id, product_id, plan_date, config);
                (product_id.clone(), forecast)
            })
            .collect()
    }

    /// 由銷售視窗（由舊到新）計算建議量
    ///
    /// 視窗長度必須等於權重個數，否則回傳 `None`。
    pub fn weighted_recommendation(
        quantities: &[Decimal],
        config: &DssConfig,
    ) -> Option<Recommendation> {
        let weights = config.weights();
        if quantities.len() != weights.len() {
            return None;
        }

        let weighted_average: Decimal = weights
            .iter()
            .zip(quantities)
            .map(|(weight, qty)| weight * qty)
            .sum();

        let buffered_qty = weighted_average * config.buffer_multiplier();

        Some(Recommendation {
            weighted_average,
            buffered_qty,
            recommended_qty: Self::round_up(buffered_qty),
        })
    }

    /// 無條件進位至整數，下限為 0
    pub fn round_up(qty: Decimal) -> Decimal {
        qty.ceil().max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::collections::HashMap;

    /// 測試用歷史資料：單一分店/產品
    struct VecHistory {
        sales: HashMap<NaiveDate, Decimal>,
    }

    impl VecHistory {
        /// 以計劃日往前依序排列的銷售建立（由舊到新）
        fn ending_before(plan_date: NaiveDate, sold: &[i64]) -> Self {
            let days = dss_core::trailing_days(plan_date, sold.len()).unwrap();
            let sales = days
                .into_iter()
                .zip(sold.iter().map(|q| Decimal::from(*q)))
                .collect();
            Self { sales }
        }
    }

    impl SalesHistory for VecHistory {
        fn sold_qty(
            &self,
            _branch_id: &str,
            _product_id: &str,
            date: NaiveDate,
        ) -> dss_core::Result<Option<Decimal>> {
            Ok(self.sales.get(&date).copied())
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn plan_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 4).unwrap()
    }

    fn reference_config() -> DssConfig {
        DssConfig::new(vec![dec("0.5"), dec("0.3"), dec("0.2")], Decimal::from(20)).unwrap()
    }

    #[test]
    fn test_reference_calculation() {
        // 0.5·100 + 0.3·80 + 0.2·120 = 98 → ×1.2 = 117.6 → 118
        let history = VecHistory::ending_before(plan_date(), &[100, 80, 120]);

        let forecast = ForecastEngine::recommend(
            &history,
            "BR-TPE",
            "CROISSANT",
            plan_date(),
            &reference_config(),
        )
        .unwrap();

        assert_eq!(forecast.weighted_average, Decimal::from(98));
        assert_eq!(forecast.buffered_qty, dec("117.6"));
        assert_eq!(forecast.recommended_qty, Decimal::from(118));
        assert_eq!(forecast.window.len(), 3);
        assert_eq!(
            forecast.window[2].sale_date,
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
        );
    }

    #[test]
    fn test_last_weight_applies_to_most_recent_day() {
        let config = DssConfig::new(vec![dec("0.1"), dec("0.9")], Decimal::ZERO).unwrap();

        // 最近一天 200 佔 90%
        let recent_heavy = ForecastEngine::weighted_recommendation(
            &[Decimal::from(0), Decimal::from(200)],
            &config,
        )
        .unwrap();
        assert_eq!(recent_heavy.recommended_qty, Decimal::from(180));

        let old_heavy = ForecastEngine::weighted_recommendation(
            &[Decimal::from(200), Decimal::from(0)],
            &config,
        )
        .unwrap();
        assert_eq!(old_heavy.recommended_qty, Decimal::from(20));
    }

    #[test]
    fn test_insufficient_history() {
        let history = VecHistory::ending_before(plan_date(), &[100, 80]);

        let result = ForecastEngine::recommend(
            &history,
            "BR-TPE",
            "CROISSANT",
            plan_date(),
            &reference_config(),
        );

        match result {
            Err(DssError::InsufficientHistory {
                required,
                available,
                product_id,
                ..
            }) => {
                assert_eq!(required, 3);
                assert_eq!(available, 2);
                assert_eq!(product_id, "CROISSANT");
            }
            other => panic!("expected InsufficientHistory, got {:?}", other),
        }
    }

    #[test]
    fn test_gap_in_window_is_insufficient() {
        let mut history = VecHistory::ending_before(plan_date(), &[100, 80, 120]);
        history
            .sales
            .remove(&NaiveDate::from_ymd_opt(2025, 11, 2).unwrap());
        // 更早的資料不可用來補洞
        history.sales.insert(
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            Decimal::from(90),
        );

        let result = ForecastEngine::recommend(
            &history,
            "BR-TPE",
            "CROISSANT",
            plan_date(),
            &reference_config(),
        );
        assert!(matches!(
            result,
            Err(DssError::InsufficientHistory { available: 2, .. })
        ));
    }

    #[test]
    fn test_sales_on_plan_date_are_ignored() {
        let mut history = VecHistory::ending_before(plan_date(), &[100, 80, 120]);
        history.sales.insert(plan_date(), Decimal::from(10_000));

        let forecast = ForecastEngine::recommend(
            &history,
            "BR-TPE",
            "CROISSANT",
            plan_date(),
            &reference_config(),
        )
        .unwrap();
        assert_eq!(forecast.recommended_qty, Decimal::from(118));
    }

    #[rstest]
    #[case(dec("117.6"), Decimal::from(118))]
    #[case(dec("117.01"), Decimal::from(118))]
    #[case(Decimal::from(118), Decimal::from(118))]
    #[case(Decimal::ZERO, Decimal::ZERO)]
    #[case(dec("0.0001"), Decimal::ONE)]
    #[case(dec("-3.5"), Decimal::ZERO)]
    fn test_round_up(#[case] raw: Decimal, #[case] expected: Decimal) {
        assert_eq!(ForecastEngine::round_up(raw), expected);
    }

    #[test]
    fn test_no_float_drift() {
        // 0.1 + 0.2 + 0.7 權重下，整數銷售的加權平均應為精確整數
        let config = DssConfig::new(vec![dec("0.1"), dec("0.2"), dec("0.7")], Decimal::ZERO).unwrap();
        let rec = ForecastEngine::weighted_recommendation(
            &[Decimal::from(100), Decimal::from(100), Decimal::from(100)],
            &config,
        )
        .unwrap();
        assert_eq!(rec.recommended_qty, Decimal::from(100));
    }

    #[test]
    fn test_recommend_many_keeps_order() {
        let history = VecHistory::ending_before(plan_date(), &[100, 80, 120]);
        let products = vec!["BAGEL".to_string(), "CROISSANT".to_string(), "DONUT".to_string()];

        let results = ForecastEngine::recommend_many(
            &history,
            "BR-TPE",
            &products,
            plan_date(),
            &reference_config(),
        );

        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["BAGEL", "CROISSANT", "DONUT"]);
        assert!(results
            .iter()
            .all(|(_, r)| r.as_ref().unwrap().recommended_qty == Decimal::from(118)));
    }

    proptest! {
        #[test]
        fn prop_recommendation_is_deterministic_and_rounds_up(
            sold in prop::collection::vec(0i64..5_000, 3),
            pct in 0u32..200,
        ) {
            let config = DssConfig::new(
                vec![dec("0.5"), dec("0.3"), dec("0.2")],
                Decimal::from(pct),
            ).unwrap();
            let quantities: Vec<Decimal> = sold.iter().map(|q| Decimal::from(*q)).collect();

            let first = ForecastEngine::weighted_recommendation(&quantities, &config).unwrap();
            let second = ForecastEngine::weighted_recommendation(&quantities, &config).unwrap();
            prop_assert_eq!(first, second);

            prop_assert!(first.recommended_qty >= first.buffered_qty);
            prop_assert!(first.recommended_qty - first.buffered_qty < Decimal::ONE);
            prop_assert_eq!(first.recommended_qty, first.recommended_qty.trunc());
            prop_assert!(first.recommended_qty >= Decimal::ZERO);
        }
    }
}
