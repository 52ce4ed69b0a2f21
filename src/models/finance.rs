use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 财务汇总 (/finance/summary)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinanceSummary {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub open_total: BigDecimal,
    #[serde(default)]
    pub overdue_total: BigDecimal,
    #[serde(default)]
    pub paid_last_30_days: BigDecimal,
    #[serde(default)]
    pub draft_count: u32,
    #[serde(default)]
    pub open_count: u32,
    #[serde(default)]
    pub overdue_count: u32,
    #[serde(default)]
    pub disputed_count: u32,
}

/// 回款预测 (/finance/forecast)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinanceForecast {
    #[serde(default)]
    pub horizon_days: u32,
    #[serde(default)]
    pub total_expected: BigDecimal,
    #[serde(default)]
    pub buckets: Vec<ForecastBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastBucket {
    pub period_start: NaiveDate,
    pub expected: BigDecimal,
    #[serde(default)]
    pub invoice_count: u32,
}
