use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 运单 (只引用, 不归本客户端管理)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub load_id: String,
    #[serde(default)]
    pub load_number: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "pod_uploaded")]
    pub has_pod: bool,
    #[serde(default)]
    pub shipper_uid: Option<String>,
    #[serde(default)]
    pub shipper_name: Option<String>,
    #[serde(default)]
    pub shipper_email: Option<String>,
    #[serde(default)]
    pub rate: Option<BigDecimal>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Load {
    /// "Dallas, TX -> Atlanta, GA"
    pub fn route(&self) -> String {
        format!(
            "{} -> {}",
            self.origin.as_deref().unwrap_or("?"),
            self.destination.as_deref().unwrap_or("?")
        )
    }

    pub fn display_number(&self) -> &str {
        self.load_number.as_deref().unwrap_or(&self.load_id)
    }
}
