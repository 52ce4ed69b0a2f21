use thiserror::Error;

/// 客户端统一错误
///
/// 三类来源: 网络/HTTP 失败, 提交前的校验失败, 业务规则拒绝.
/// 三者都以 `Display` 文本作为横幅提示展示, 不区分瞬时/永久失败, 也不重试.
#[derive(Debug, Error)]
pub enum FinanceError {
    /// 后端返回非 2xx, message 为后端原文
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BusinessRule(String),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl FinanceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }

    /// 是否在发出请求前就被拦截
    pub fn is_client_side(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::BusinessRule(_))
    }
}

impl From<reqwest::Error> for FinanceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FinanceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FinanceError>;
