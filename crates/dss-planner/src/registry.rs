//! 分店配置登錄表

use dss_core::{BranchConfigSet, DssConfig, DssError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

/// 每分店一份生效中的配置
///
/// 建立計劃時取值快照，之後的配置更新不影響已建立的計劃。
#[derive(Debug, Default)]
pub struct BranchConfigRegistry {
    configs: RwLock<HashMap<String, DssConfig>>,
}

impl BranchConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 JSON 配置集建立
    pub fn from_set(set: &BranchConfigSet) -> Self {
        let configs = set
            .branches
            .iter()
            .map(|(branch_id, config)| (branch_id.clone(), config.clone()))
            .collect();
        Self {
            configs: RwLock::new(configs),
        }
    }

    /// 設定分店配置，回傳被取代的舊配置
    pub fn set(&self, branch_id: impl Into<String>, config: DssConfig) -> Result<Option<DssConfig>> {
        let branch_id = branch_id.into();
        let mut configs = self
            .configs
            .write()
            .map_err(|e| DssError::Storage(format!("配置鎖獲取失敗: {}", e)))?;

        tracing::info!(
            "更新分店配置: {} (視窗 {} 天, 安全庫存 {}%)",
            branch_id,
            config.window_size(),
            config.safety_stock_percent()
        );
        Ok(configs.insert(branch_id, config))
    }

    /// 以原始數值設定分店配置，驗證失敗時保留原配置
    pub fn set_raw(
        &self,
        branch_id: impl Into<String>,
        weights: Vec<Decimal>,
        safety_stock_percent: Decimal,
    ) -> Result<Option<DssConfig>> {
        let config = DssConfig::new(weights, safety_stock_percent)?;
        self.set(branch_id, config)
    }

    /// 取得分店配置的值快照
    pub fn snapshot(&self, branch_id: &str) -> Result<DssConfig> {
        let configs = self
            .configs
            .read()
            .map_err(|e| DssError::Storage(format!("配置鎖獲取失敗: {}", e)))?;

        configs
            .get(branch_id)
            .cloned()
            .ok_or_else(|| DssError::ConfigNotFound {
                branch_id: branch_id.to_string(),
            })
    }

    /// 已設定配置的分店（排序）
    pub fn branches(&self) -> Result<Vec<String>> {
        let configs = self
            .configs
            .read()
            .map_err(|e| DssError::Storage(format!("配置鎖獲取失敗: {}", e)))?;

        let mut branches: Vec<String> = configs.keys().cloned().collect();
        branches.sort();
        Ok(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_snapshot_missing_branch() {
        let registry = BranchConfigRegistry::new();
        assert_eq!(
            registry.snapshot("BR-TPE"),
            Err(DssError::ConfigNotFound {
                branch_id: "BR-TPE".to_string()
            })
        );
    }

    #[test]
    fn test_set_replaces_and_returns_previous() {
        let registry = BranchConfigRegistry::new();
        let first = DssConfig::uniform(3, Decimal::ZERO).unwrap();
        let second = DssConfig::new(vec![dec("0.5"), dec("0.5")], dec("10")).unwrap();

        assert_eq!(registry.set("BR-TPE", first.clone()).unwrap(), None);
        assert_eq!(registry.set("BR-TPE", second.clone()).unwrap(), Some(first));
        assert_eq!(registry.snapshot("BR-TPE").unwrap(), second);
    }

    #[test]
    fn test_set_raw_rejects_invalid_and_keeps_previous() {
        let registry = BranchConfigRegistry::new();
        registry
            .set_raw("BR-TPE", vec![dec("0.5"), dec("0.3"), dec("0.2")], dec("20"))
            .unwrap();

        let result = registry.set_raw("BR-TPE", vec![dec("0.5"), dec("0.3")], dec("20"));
        assert!(matches!(result, Err(DssError::InvalidConfig { .. })));
        assert_eq!(registry.snapshot("BR-TPE").unwrap().window_size(), 3);
    }

    #[test]
    fn test_from_set() {
        let set = BranchConfigSet::from_json_str(
            r#"{"branches": {
                "BR-TPE": {"weights": [0.5, 0.3, 0.2], "safety_stock_percent": 20},
                "BR-KHH": {"weights": [1]}
            }}"#,
        )
        .unwrap();

        let registry = BranchConfigRegistry::from_set(&set);
        assert_eq!(registry.branches().unwrap(), vec!["BR-KHH", "BR-TPE"]);
        assert_eq!(
            registry.snapshot("BR-KHH").unwrap().safety_stock_percent(),
            Decimal::ZERO
        );
    }
}
