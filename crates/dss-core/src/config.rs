//! 分店預測配置模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{DssError, Result};

/// 權重總和允許誤差（1e-6）
pub const WEIGHT_SUM_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// 分店的生產建議參數
///
/// 權重由舊到新排列：最後一個權重作用於計劃日前一天。
/// 只能透過 [`DssConfig::new`] 或反序列化取得，兩者都會驗證，
/// 因此任何存在的 `DssConfig` 都滿足權重總和為 1 的約束。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDssConfig")]
pub struct DssConfig {
    /// 加權移動平均權重（由舊到新）
    weights: Vec<Decimal>,

    /// 安全庫存百分比（20 代表 +20%）
    safety_stock_percent: Decimal,
}

/// 未驗證的配置（反序列化中繼）
#[derive(Debug, Deserialize)]
struct RawDssConfig {
    weights: Vec<Decimal>,
    #[serde(default)]
    safety_stock_percent: Decimal,
}

impl TryFrom<RawDssConfig> for DssConfig {
    type Error = DssError;

    fn try_from(raw: RawDssConfig) -> Result<Self> {
        DssConfig::new(raw.weights, raw.safety_stock_percent)
    }
}

impl DssConfig {
    /// 創建並驗證配置
    pub fn new(weights: Vec<Decimal>, safety_stock_percent: Decimal) -> Result<Self> {
        if weights.is_empty() {
            return Err(DssError::InvalidConfig {
                reason: "權重不可為空".to_string(),
            });
        }

        if let Some((index, weight)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| **w < Decimal::ZERO)
        {
            return Err(DssError::InvalidConfig {
                reason: format!("權重不可為負數: weights[{}]={}", index, weight),
            });
        }

        let sum: Decimal = weights.iter().sum();
        if (sum - Decimal::ONE).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(DssError::InvalidConfig {
                reason: format!("權重總和必須為 1，實際為 {}", sum),
            });
        }

        if safety_stock_percent < Decimal::ZERO {
            return Err(DssError::InvalidConfig {
                reason: format!("安全庫存百分比不可為負數: {}", safety_stock_percent),
            });
        }

        Ok(Self {
            weights,
            safety_stock_percent,
        })
    }

    /// 等權重配置（簡單移動平均）
    pub fn uniform(window_size: usize, safety_stock_percent: Decimal) -> Result<Self> {
        if window_size == 0 {
            return Self::new(Vec::new(), safety_stock_percent);
        }

        let size = Decimal::from(window_size as u64);
        let share = (Decimal::ONE / size).round_dp(8);
        let mut weights = vec![share; window_size];
        // 將捨入誤差補到最新一天
        let remainder = Decimal::ONE - share * size;
        if let Some(last) = weights.last_mut() {
            *last += remainder;
        }

        Self::new(weights, safety_stock_percent)
    }

    /// 權重（由舊到新）
    pub fn weights(&self) -> &[Decimal] {
        &self.weights
    }

    /// 安全庫存百分比
    pub fn safety_stock_percent(&self) -> Decimal {
        self.safety_stock_percent
    }

    /// 預測視窗天數（等於權重個數）
    pub fn window_size(&self) -> usize {
        self.weights.len()
    }

    /// 安全庫存乘數：1 + 百分比 / 100
    pub fn buffer_multiplier(&self) -> Decimal {
        Decimal::ONE + self.safety_stock_percent / Decimal::ONE_HUNDRED
    }
}

/// 多分店配置文件
///
/// ```json
/// { "branches": { "BR-TPE": { "weights": [0.5, 0.3, 0.2], "safety_stock_percent": 20 } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchConfigSet {
    /// 分店ID → 配置
    #[serde(default)]
    pub branches: BTreeMap<String, DssConfig>,
}

impl BranchConfigSet {
    /// 從 JSON 字串載入（逐一驗證各分店配置）
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DssError::InvalidConfig {
            reason: format!("配置解析失敗: {}", e),
        })
    }

    /// 從 JSON 檔案載入
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DssError::InvalidConfig {
            reason: format!("無法讀取配置檔 {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&content)
    }

    /// 建構器模式：加入分店配置
    pub fn with_branch(mut self, branch_id: impl Into<String>, config: DssConfig) -> Self {
        self.branches.insert(branch_id.into(), config);
        self
    }

    /// 取得分店配置
    pub fn get(&self, branch_id: &str) -> Option<&DssConfig> {
        self.branches.get(branch_id)
    }
}
