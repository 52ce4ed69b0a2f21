//! REST 客户端
//!
//! 每个函数把类型化参数翻译成一次 HTTP 请求, 返回解析后的结果或原始字节.
//! 不重试, 不缓存, 不生成幂等键; 失败时错误信息保持后端原文.

pub mod finance;
pub mod messaging;
pub mod sse;

use crate::config::AppConfig;
use crate::error::{FinanceError, Result};
use crate::models::{
    CreateInvoiceRequest, EmailDraft, FinanceForecast, FinanceSummary, Invoice, InvoicePdfContext,
    InvoiceStatus, Load, Message, PaymentRequest, Thread, UnreadSummary,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub use finance::InvoiceQuery;

/// 实时消息流
pub type MessageStream = BoxStream<'static, Result<Message>>;

/// 财务相关后端操作
#[async_trait]
pub trait FinanceBackend: Send + Sync {
    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>>;
    async fn list_payer_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>>;
    async fn create_invoice(&self, req: &CreateInvoiceRequest) -> Result<Invoice>;
    async fn issue_invoice(&self, invoice_id: &str) -> Result<()>;
    async fn send_invoice(&self, invoice_id: &str) -> Result<()>;
    async fn void_invoice(&self, invoice_id: &str, reason: Option<&str>) -> Result<()>;
    async fn dispute_invoice(&self, invoice_id: &str, reason: &str) -> Result<()>;
    async fn payer_dispute_invoice(&self, invoice_id: &str, reason: &str) -> Result<()>;
    async fn resolve_invoice_dispute(&self, invoice_id: &str, resolution: &str) -> Result<()>;
    async fn record_invoice_payment(&self, invoice_id: &str, payment: &PaymentRequest)
        -> Result<()>;
    async fn email_invoice(&self, invoice_id: &str, draft: &EmailDraft) -> Result<()>;
    async fn submit_factoring(&self, invoice_id: &str) -> Result<()>;
    async fn invoice_pdf_context(&self, invoice_id: &str) -> Result<InvoicePdfContext>;
    async fn download_invoice_package_zip(&self, invoice_id: &str) -> Result<Vec<u8>>;
    async fn finance_summary(&self) -> Result<FinanceSummary>;
    async fn finance_forecast(&self, horizon_days: u32) -> Result<FinanceForecast>;
    async fn eligible_loads(&self) -> Result<Vec<Load>>;
}

/// 消息相关后端操作
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn list_threads(&self) -> Result<Vec<Thread>>;
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>>;
    async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message>;
    async fn mark_thread_read(&self, thread_id: &str) -> Result<()>;
    async fn unread_summary(&self) -> Result<UnreadSummary>;
    /// 订阅单个线程的 SSE 流; 丢弃返回的流即关闭连接
    async fn subscribe_thread(&self, thread_id: &str) -> Result<MessageStream>;
}

/// HTTP 客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FinanceError::validation(format!("invalid api base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FinanceError::validation("invalid api base url"));
        }
        // SSE 长连接不能受整体超时限制, 超时按请求设置
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            auth_token: auth_token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.api.base_url,
            config.api.auth_token.clone(),
            config.request_timeout(),
        )
    }

    /// 拼接路径段 (自动转义 id 中的特殊字符)
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FinanceError::validation("invalid api base url"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let mut rb = self.http.request(method, url);
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| FinanceError::validation(format!("invalid auth token: {e}")))?;
            rb = rb.header(AUTHORIZATION, value);
        }
        Ok(rb)
    }

    /// 普通请求: 带超时, 非 2xx 转为错误
    async fn execute(&self, rb: RequestBuilder) -> Result<Response> {
        let resp = rb.timeout(self.timeout).send().await?;
        check_status(resp).await
    }

    pub(crate) async fn get_json<T, Q>(&self, segments: &[&str], query: Option<&Q>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!("GET {}", url);
        let mut rb = self.request(Method::GET, url)?;
        if let Some(q) = query {
            rb = rb.query(q);
        }
        Ok(self.execute(rb).await?.json::<T>().await?)
    }

    pub(crate) async fn post_json<B>(&self, segments: &[&str], body: Option<&B>) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!("POST {}", url);
        let mut rb = self.request(Method::POST, url)?;
        if let Some(b) = body {
            rb = rb.json(b);
        }
        let resp = self.execute(rb).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub(crate) async fn get_bytes(&self, segments: &[&str]) -> Result<Vec<u8>> {
        let url = self.endpoint(segments)?;
        tracing::debug!("GET {} (binary)", url);
        let rb = self.request(Method::GET, url)?;
        Ok(self.execute(rb).await?.bytes().await?.to_vec())
    }

    /// 流式请求: 不设整体超时
    pub(crate) async fn open_stream(&self, segments: &[&str]) -> Result<Response> {
        let url = self.endpoint(segments)?;
        tracing::debug!("GET {} (event-stream)", url);
        let rb = self
            .request(Method::GET, url)?
            .header(reqwest::header::ACCEPT, "text/event-stream");
        check_status(rb.send().await?).await
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| error_message(&v))
        .or_else(|| {
            let t = text.trim();
            (!t.is_empty() && t.len() <= 300 && !t.starts_with('<')).then(|| t.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
    tracing::debug!("request failed: {} {}", status.as_u16(), message);
    Err(FinanceError::Http {
        status: status.as_u16(),
        message,
    })
}

/// 从错误响应体中取出给用户看的信息: detail / message / error
fn error_message(body: &Value) -> Option<String> {
    for key in ["detail", "message", "error"] {
        match body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Array(items)) => {
                if let Some(msg) = items.iter().find_map(|i| i.get("msg")?.as_str()) {
                    return Some(msg.to_string());
                }
            }
            Some(Value::Object(_)) => {
                if let Some(inner) = body.get(key).and_then(error_message) {
                    return Some(inner);
                }
            }
            _ => {}
        }
    }
    None
}

/// 列表响应既可能是数组, 也可能包在 { key: [...] } 中
pub(crate) fn decode_list<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>> {
    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        Value::Object(mut map) => match map.remove(key).or_else(|| map.remove("items")) {
            Some(list) => Ok(serde_json::from_value(list)?),
            None => Err(FinanceError::Decode(format!("missing `{key}` in response"))),
        },
        other => Err(FinanceError::Decode(format!(
            "expected list for `{key}`, got {other}"
        ))),
    }
}

/// 单个实体响应既可能是实体本身, 也可能包在 { key: {...} } 中
pub(crate) fn decode_entity<T: DeserializeOwned>(value: Value, key: &str) -> Result<T> {
    match value {
        Value::Object(mut map) if map.contains_key(key) => {
            Ok(serde_json::from_value(map.remove(key).unwrap_or(Value::Null))?)
        }
        other => Ok(serde_json::from_value(other)?),
    }
}

pub(crate) fn status_param(status: Option<InvoiceStatus>) -> Option<&'static str> {
    status.map(|s| s.as_str())
}
