//! 日期區間與預測視窗

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{DssError, Result};

/// 日期區間（含首尾兩日）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// 起始日
    pub start: NaiveDate,
    /// 結束日
    pub end: NaiveDate,
}

impl DateRange {
    /// 創建日期區間，起始日不可晚於結束日
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DssError::InvalidDateRange(format!(
                "起始日 {} 晚於結束日 {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// 單日區間
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// 檢查日期是否落在區間內
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// 區間天數
    pub fn num_days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1) as u32
    }

    /// 逐日列舉
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// 計算 `anchor` 之前的連續 `count` 個日曆日（不含 `anchor`），由舊到新排列
pub fn trailing_days(anchor: NaiveDate, count: usize) -> Result<Vec<NaiveDate>> {
    let first = anchor
        .checked_sub_days(Days::new(count as u64))
        .ok_or_else(|| DssError::InvalidDateRange(format!("{} 前 {} 天超出日期範圍", anchor, count)))?;

    Ok(first.iter_days().take(count).collect())
}
