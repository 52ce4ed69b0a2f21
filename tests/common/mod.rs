#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use freight_finance::client::{InvoiceQuery, MessageStream};
use freight_finance::models::{
    CreateInvoiceRequest, EmailDraft, FinanceForecast, FinanceSummary, Invoice, InvoicePdfContext,
    InvoiceStatus, Load, Message, PaymentRequest, Thread, UnreadSummary,
};
use freight_finance::{FinanceBackend, FinanceError, MessagingBackend, Result};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::channel::oneshot;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn invoice(id: &str, status: &str, with_pod: bool) -> Invoice {
    let attachments = if with_pod {
        json!([{ "kind": "pod", "filename": "pod.pdf" }])
    } else {
        json!([])
    };
    serde_json::from_value(json!({
        "invoice_id": id,
        "invoice_number": format!("INV-{id}"),
        "status": status,
        "amount_total": "1000",
        "load_id": format!("L-{id}"),
        "issuer_uid": "carrier-1",
        "payer_uid": "shipper-1",
        "attachments": attachments,
        "metadata": { "bill_to": { "name": "Acme Foods", "email": "ap@acme.test" } }
    }))
    .unwrap()
}

pub fn load(id: &str, has_pod: bool) -> Load {
    serde_json::from_value(json!({
        "load_id": id,
        "has_pod": has_pod,
        "shipper_name": "Acme Foods",
        "shipper_email": "ap@acme.test"
    }))
    .unwrap()
}

/// 内存版财务后端, 记录每次调用
#[derive(Default)]
pub struct FakeFinance {
    invoices: Mutex<Vec<Invoice>>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<CreateInvoiceRequest>>,
    failures: Mutex<Vec<(String, u16, String)>>,
}

impl FakeFinance {
    pub fn with_invoices(invoices: Vec<Invoice>) -> Self {
        Self {
            invoices: Mutex::new(invoices),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn created(&self) -> Vec<CreateInvoiceRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn status_of(&self, id: &str) -> Option<InvoiceStatus> {
        self.invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.invoice_id == id)
            .map(|i| i.status)
    }

    /// 下一次变更请求返回 HTTP 错误
    pub fn fail_next(&self, status: u16, message: &str) {
        self.fail_once("", status, message);
    }

    /// 下一次以 `call` 开头的变更请求 (如 "email") 返回 HTTP 错误
    pub fn fail_once(&self, call: &str, status: u16, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((call.to_string(), status, message.to_string()));
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn mutate(&self, call: String, id: &str, f: impl FnOnce(&mut Invoice)) -> Result<()> {
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(pos) = failures.iter().position(|(p, _, _)| call.starts_with(p.as_str())) {
                let (_, status, message) = failures.remove(pos);
                self.record(call);
                return Err(FinanceError::Http { status, message });
            }
        }
        self.record(call);
        let mut invoices = self.invoices.lock().unwrap();
        let inv = invoices
            .iter_mut()
            .find(|i| i.invoice_id == id)
            .ok_or_else(|| FinanceError::Http {
                status: 404,
                message: "Invoice not found".into(),
            })?;
        f(inv);
        Ok(())
    }
}

#[async_trait]
impl FinanceBackend for FakeFinance {
    async fn list_invoices(&self, _query: &InvoiceQuery) -> Result<Vec<Invoice>> {
        self.record("list_invoices");
        Ok(self.invoices.lock().unwrap().clone())
    }

    async fn list_payer_invoices(&self, _query: &InvoiceQuery) -> Result<Vec<Invoice>> {
        self.record("list_payer_invoices");
        Ok(self.invoices.lock().unwrap().clone())
    }

    async fn create_invoice(&self, req: &CreateInvoiceRequest) -> Result<Invoice> {
        self.record("create");
        self.created.lock().unwrap().push(req.clone());
        let mut invoices = self.invoices.lock().unwrap();
        let id = format!("inv_{}", invoices.len() + 1);
        let mut inv = invoice(&id, "draft", false);
        inv.amount_total = req.amount_total.clone();
        inv.load_id = Some(req.load_id.clone());
        inv.metadata = req.metadata.clone();
        invoices.push(inv.clone());
        Ok(inv)
    }

    async fn issue_invoice(&self, id: &str) -> Result<()> {
        self.mutate(format!("issue:{id}"), id, |i| i.status = InvoiceStatus::Issued)
    }

    async fn send_invoice(&self, id: &str) -> Result<()> {
        self.mutate(format!("send:{id}"), id, |i| i.status = InvoiceStatus::Sent)
    }

    async fn void_invoice(&self, id: &str, _reason: Option<&str>) -> Result<()> {
        self.mutate(format!("void:{id}"), id, |i| i.status = InvoiceStatus::Void)
    }

    async fn dispute_invoice(&self, id: &str, _reason: &str) -> Result<()> {
        self.mutate(format!("dispute:{id}"), id, |i| {
            i.status = InvoiceStatus::Disputed
        })
    }

    async fn payer_dispute_invoice(&self, id: &str, _reason: &str) -> Result<()> {
        self.mutate(format!("payer_dispute:{id}"), id, |i| {
            i.status = InvoiceStatus::Disputed
        })
    }

    async fn resolve_invoice_dispute(&self, id: &str, _resolution: &str) -> Result<()> {
        self.mutate(format!("resolve:{id}"), id, |i| i.status = InvoiceStatus::Sent)
    }

    async fn record_invoice_payment(&self, id: &str, payment: &PaymentRequest) -> Result<()> {
        let amount = payment.amount.clone();
        self.mutate(format!("payment:{id}"), id, move |i| {
            i.amount_paid = &i.amount_paid + &amount;
            i.status = if i.amount_paid >= i.amount_total {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::PartiallyPaid
            };
        })
    }

    async fn email_invoice(&self, id: &str, _draft: &EmailDraft) -> Result<()> {
        self.mutate(format!("email:{id}"), id, |i| {
            if i.status == InvoiceStatus::Issued {
                i.status = InvoiceStatus::Sent;
            }
        })
    }

    async fn submit_factoring(&self, id: &str) -> Result<()> {
        self.mutate(format!("factoring:{id}"), id, |i| i.factoring = true)
    }

    async fn invoice_pdf_context(&self, id: &str) -> Result<InvoicePdfContext> {
        self.record(format!("pdf_context:{id}"));
        let invoice = self
            .invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.invoice_id == id)
            .cloned()
            .ok_or_else(|| FinanceError::Http {
                status: 404,
                message: "Invoice not found".into(),
            })?;
        Ok(InvoicePdfContext {
            invoice,
            issuer: None,
            payer: None,
            load: None,
        })
    }

    async fn download_invoice_package_zip(&self, id: &str) -> Result<Vec<u8>> {
        self.record(format!("package:{id}"));
        Ok(b"PK\x03\x04".to_vec())
    }

    async fn finance_summary(&self) -> Result<FinanceSummary> {
        self.record("finance_summary");
        Ok(FinanceSummary {
            open_count: 2,
            ..Default::default()
        })
    }

    async fn finance_forecast(&self, horizon_days: u32) -> Result<FinanceForecast> {
        self.record(format!("finance_forecast:{horizon_days}"));
        Ok(FinanceForecast {
            horizon_days,
            ..Default::default()
        })
    }

    async fn eligible_loads(&self) -> Result<Vec<Load>> {
        self.record("eligible_loads");
        Ok(vec![load("L-1", true)])
    }
}

pub fn thread(id: &str) -> Thread {
    Thread {
        thread_id: id.to_string(),
        title: Some(format!("Load {id}")),
        participants: vec!["carrier-1".into(), "shipper-1".into()],
        load_id: None,
        last_message_at: None,
        unread_count: 3,
    }
}

pub fn message(id: &str, thread_id: &str, body: &str) -> Message {
    serde_json::from_value(json!({
        "message_id": id,
        "thread_id": thread_id,
        "sender_uid": "shipper-1",
        "body": body,
        "created_at": "2026-05-01T10:00:00Z"
    }))
    .unwrap()
}

/// 内存版消息后端; 每次订阅生成一条可由测试推送的通道
#[derive(Default)]
pub struct FakeMessaging {
    pub threads: Vec<Thread>,
    history: Mutex<HashMap<String, Vec<Message>>>,
    senders: Mutex<HashMap<String, UnboundedSender<Result<Message>>>>,
    read_marks: Mutex<Vec<String>>,
    subscribes: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    unread_polls: AtomicUsize,
    unread: Mutex<UnreadSummary>,
}

impl FakeMessaging {
    pub fn new(threads: Vec<Thread>) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }

    pub fn set_history(&self, thread_id: &str, messages: Vec<Message>) {
        self.history
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), messages);
    }

    pub fn set_unread(&self, summary: UnreadSummary) {
        *self.unread.lock().unwrap() = summary;
    }

    /// 推送一条实时消息, 订阅已关闭时返回 false
    pub fn push(&self, thread_id: &str, msg: Message) -> bool {
        match self.senders.lock().unwrap().get(thread_id) {
            Some(tx) => tx.unbounded_send(Ok(msg)).is_ok(),
            None => false,
        }
    }

    pub fn subscription_closed(&self, thread_id: &str) -> bool {
        self.senders
            .lock()
            .unwrap()
            .get(thread_id)
            .map(|tx| tx.is_closed())
            .unwrap_or(true)
    }

    /// 让该线程的下一次订阅挂起, 直到返回的 sender 被触发
    pub fn hold_subscription(&self, thread_id: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(thread_id.to_string(), rx);
        tx
    }

    pub fn subscribe_count(&self, thread_id: &str) -> usize {
        self.subscribes
            .lock()
            .unwrap()
            .iter()
            .filter(|t| *t == thread_id)
            .count()
    }

    pub fn read_marks(&self) -> Vec<String> {
        self.read_marks.lock().unwrap().clone()
    }

    pub fn unread_polls(&self) -> usize {
        self.unread_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingBackend for FakeMessaging {
    async fn list_threads(&self) -> Result<Vec<Thread>> {
        Ok(self.threads.clone())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message> {
        Ok(message("sent-1", thread_id, body))
    }

    async fn mark_thread_read(&self, thread_id: &str) -> Result<()> {
        self.read_marks.lock().unwrap().push(thread_id.to_string());
        Ok(())
    }

    async fn unread_summary(&self) -> Result<UnreadSummary> {
        self.unread_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn subscribe_thread(&self, thread_id: &str) -> Result<MessageStream> {
        self.subscribes.lock().unwrap().push(thread_id.to_string());
        let gate = self.gates.lock().unwrap().remove(thread_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let (tx, rx) = mpsc::unbounded();
        self.senders
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), tx);
        Ok(rx.boxed())
    }
}

/// 等待条件成立 (最多 2 秒)
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
