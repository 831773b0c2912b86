//! 產品目錄介面

use crate::Result;

/// 分店上架中的產品清單（產品主檔維護不在本系統範圍）
pub trait ProductCatalog: Send + Sync {
    /// 取得分店需要每日排產的產品ID
    fn active_products(&self, branch_id: &str) -> Result<Vec<String>>;
}
