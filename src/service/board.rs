use crate::client::{FinanceBackend, InvoiceQuery};
use crate::error::{FinanceError, Result};
use crate::models::{
    EmailDraft, FinanceForecast, FinanceSummary, Invoice, InvoiceAction, InvoiceStatus,
    PaymentRequest, Role,
};
use crate::service::export;
use crate::service::prompt::Confirm;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;

/// 回款预测默认天数
pub const DEFAULT_FORECAST_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(InvoiceStatus),
}

impl StatusFilter {
    /// "all"/空串 -> All; 其他按状态名大小写不敏感解析
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        InvoiceStatus::parse(trimmed)
            .map(Self::Only)
            .ok_or_else(|| FinanceError::validation(format!("Unknown invoice status: {trimmed}")))
    }

    pub fn matches(&self, status: InvoiceStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(s) => *s == status,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FactoringFilter {
    #[default]
    All,
    Factored,
    NotFactored,
}

/// 按当前用户在发票中的角色过滤
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartyFilter {
    #[default]
    All,
    IssuedByMe,
    BilledToMe,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    DueDate,
    Amount,
    Status,
    Customer,
    Created,
    Number,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardFilter {
    pub status: StatusFilter,
    pub factoring: FactoringFilter,
    pub party: PartyFilter,
    pub search: String,
    pub sort_key: SortKey,
    pub sort_dir: SortDirection,
}

impl BoardFilter {
    pub fn matches(&self, invoice: &Invoice, me: Option<&str>) -> bool {
        if !self.status.matches(invoice.status) {
            return false;
        }
        let factoring_ok = match self.factoring {
            FactoringFilter::All => true,
            FactoringFilter::Factored => invoice.factoring,
            FactoringFilter::NotFactored => !invoice.factoring,
        };
        if !factoring_ok {
            return false;
        }
        let party_ok = match self.party {
            PartyFilter::All => true,
            PartyFilter::IssuedByMe => me.is_some() && invoice.issuer_uid.as_deref() == me,
            PartyFilter::BilledToMe => me.is_some() && invoice.payer_uid.as_deref() == me,
        };
        if !party_ok {
            return false;
        }

        let term = self.search.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [
            invoice.invoice_number.as_deref(),
            Some(invoice.invoice_id.as_str()),
            invoice.load_id.as_deref(),
            Some(invoice.customer_name()),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&term))
    }

    fn compare(&self, a: &Invoice, b: &Invoice) -> Ordering {
        let primary = match self.sort_key {
            SortKey::DueDate => cmp_none_last(&a.due_date, &b.due_date),
            SortKey::Amount => a.amount_total.cmp(&b.amount_total),
            SortKey::Status => a.status.label().cmp(b.status.label()),
            SortKey::Customer => a
                .customer_name()
                .to_lowercase()
                .cmp(&b.customer_name().to_lowercase()),
            SortKey::Created => cmp_none_last(&a.created_at, &b.created_at),
            SortKey::Number => a.display_number().cmp(b.display_number()),
        };
        let primary = match self.sort_dir {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.invoice_id.cmp(&b.invoice_id))
    }

    /// 过滤并排序, 不修改原列表
    pub fn apply<'a>(&self, invoices: &'a [Invoice], me: Option<&str>) -> Vec<&'a Invoice> {
        let mut rows: Vec<&Invoice> = invoices.iter().filter(|i| self.matches(i, me)).collect();
        rows.sort_by(|a, b| self.compare(a, b));
        rows
    }
}

fn cmp_none_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// 看板状态, 只通过 `reduce` 修改
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    pub invoices: Vec<Invoice>,
    pub summary: Option<FinanceSummary>,
    pub forecast: Option<FinanceForecast>,
    pub filter: BoardFilter,
    pub loading: bool,
    pub busy_invoice: Option<String>,
    /// 可关闭的错误横幅
    pub error: Option<String>,
    pub notice: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum BoardAction {
    LoadStarted,
    Loaded {
        invoices: Vec<Invoice>,
        summary: Option<FinanceSummary>,
        forecast: Option<FinanceForecast>,
        at: DateTime<Utc>,
    },
    LoadFailed(String),
    SetStatusFilter(StatusFilter),
    SetFactoringFilter(FactoringFilter),
    SetPartyFilter(PartyFilter),
    SetSearch(String),
    /// 同一列再次点击切换方向
    SortBy(SortKey),
    SetSortDirection(SortDirection),
    ActionStarted(String),
    ActionSucceeded(String),
    ActionFailed(String),
    DismissError,
}

impl BoardState {
    pub fn reduce(&mut self, action: BoardAction) {
        match action {
            BoardAction::LoadStarted => {
                self.loading = true;
            }
            BoardAction::Loaded {
                invoices,
                summary,
                forecast,
                at,
            } => {
                self.loading = false;
                self.invoices = invoices;
                self.summary = summary;
                self.forecast = forecast;
                self.loaded_at = Some(at);
            }
            BoardAction::LoadFailed(msg) => {
                self.loading = false;
                self.error = Some(msg);
            }
            BoardAction::SetStatusFilter(s) => self.filter.status = s,
            BoardAction::SetFactoringFilter(f) => self.filter.factoring = f,
            BoardAction::SetPartyFilter(p) => self.filter.party = p,
            BoardAction::SetSearch(term) => self.filter.search = term,
            BoardAction::SortBy(key) => {
                if self.filter.sort_key == key {
                    self.filter.sort_dir = self.filter.sort_dir.flipped();
                } else {
                    self.filter.sort_key = key;
                    self.filter.sort_dir = SortDirection::Asc;
                }
            }
            BoardAction::SetSortDirection(dir) => self.filter.sort_dir = dir,
            BoardAction::ActionStarted(id) => {
                self.busy_invoice = Some(id);
                self.error = None;
                self.notice = None;
            }
            BoardAction::ActionSucceeded(notice) => {
                self.busy_invoice = None;
                self.notice = Some(notice);
            }
            BoardAction::ActionFailed(msg) => {
                self.busy_invoice = None;
                self.error = Some(msg);
            }
            BoardAction::DismissError => self.error = None,
        }
    }

    pub fn visible(&self, me: Option<&str>) -> Vec<&Invoice> {
        self.filter.apply(&self.invoices, me)
    }
}

/// 邮件发送结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent { issued_first: bool },
    /// 用户拒绝先开票
    Cancelled,
}

enum Call<'a> {
    Issue,
    Send,
    Void(Option<&'a str>),
    Dispute(&'a str),
    Resolve(&'a str),
    Payment(&'a PaymentRequest),
    Factoring,
}

impl Call<'_> {
    fn action(&self) -> InvoiceAction {
        match self {
            Call::Issue => InvoiceAction::Issue,
            Call::Send => InvoiceAction::Send,
            Call::Void(_) => InvoiceAction::Void,
            Call::Dispute(_) => InvoiceAction::Dispute,
            Call::Resolve(_) => InvoiceAction::ResolveDispute,
            Call::Payment(_) => InvoiceAction::RecordPayment,
            Call::Factoring => InvoiceAction::SubmitFactoring,
        }
    }
}

/// 发票看板 (承运方视图/托运方视图)
pub struct InvoiceBoard {
    api: Arc<dyn FinanceBackend>,
    role: Role,
    me: Option<String>,
    forecast_days: u32,
    state: BoardState,
}

impl InvoiceBoard {
    pub fn new(api: Arc<dyn FinanceBackend>, role: Role, me: Option<String>) -> Self {
        Self {
            api,
            role,
            me,
            forecast_days: DEFAULT_FORECAST_DAYS,
            state: BoardState::default(),
        }
    }

    pub fn with_forecast_days(mut self, days: u32) -> Self {
        self.forecast_days = days;
        self
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn dispatch(&mut self, action: BoardAction) {
        self.state.reduce(action);
    }

    pub fn visible(&self) -> Vec<&Invoice> {
        self.state.visible(self.me.as_deref())
    }

    pub fn find(&self, invoice_id: &str) -> Result<&Invoice> {
        self.state
            .invoices
            .iter()
            .find(|i| i.invoice_id == invoice_id || i.invoice_number.as_deref() == Some(invoice_id))
            .ok_or_else(|| FinanceError::validation(format!("Invoice {invoice_id} not found")))
    }

    /// 并发拉取发票/汇总/预测; 付款人视图只拉发票
    pub async fn refresh(&mut self) -> Result<()> {
        self.dispatch(BoardAction::LoadStarted);
        let api = Arc::clone(&self.api);
        let query = InvoiceQuery::default();

        let result = if self.role.is_payer_view() {
            api.list_payer_invoices(&query)
                .await
                .map(|invoices| (invoices, None, None))
        } else {
            futures::try_join!(
                api.list_invoices(&query),
                api.finance_summary(),
                api.finance_forecast(self.forecast_days),
            )
            .map(|(invoices, summary, forecast)| (invoices, Some(summary), Some(forecast)))
        };

        match result {
            Ok((invoices, summary, forecast)) => {
                tracing::info!("loaded {} invoices", invoices.len());
                self.dispatch(BoardAction::Loaded {
                    invoices,
                    summary,
                    forecast,
                    at: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!("invoice refresh failed: {}", e);
                self.dispatch(BoardAction::LoadFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// 本地门控: 角色, 状态转换表, POD
    fn guard(&self, invoice_id: &str, action: InvoiceAction) -> Result<&Invoice> {
        if !self.role.can_perform(action) {
            return Err(FinanceError::rule(format!(
                "{} is not available for your role",
                action.label()
            )));
        }
        let invoice = self.find(invoice_id)?;
        invoice.status.apply(action)?;
        if matches!(action, InvoiceAction::Issue | InvoiceAction::Send) && !invoice.has_pod() {
            return Err(FinanceError::rule(
                "Upload proof of delivery before issuing or sending this invoice",
            ));
        }
        Ok(invoice)
    }

    async fn run(&mut self, invoice_id: &str, call: Call<'_>) -> Result<()> {
        let result = self.try_run(invoice_id, call).await;
        if let Err(e) = &result {
            tracing::warn!("invoice {} action failed: {}", invoice_id, e);
            self.dispatch(BoardAction::ActionFailed(e.to_string()));
        }
        result
    }

    async fn try_run(&mut self, invoice_id: &str, call: Call<'_>) -> Result<()> {
        let action = call.action();
        let id = self.guard(invoice_id, action)?.invoice_id.clone();

        self.dispatch(BoardAction::ActionStarted(id.clone()));
        let api = Arc::clone(&self.api);
        match call {
            Call::Issue => api.issue_invoice(&id).await?,
            Call::Send => api.send_invoice(&id).await?,
            Call::Void(reason) => api.void_invoice(&id, reason).await?,
            Call::Dispute(reason) if self.role.is_payer_view() => {
                api.payer_dispute_invoice(&id, reason).await?
            }
            Call::Dispute(reason) => api.dispute_invoice(&id, reason).await?,
            Call::Resolve(resolution) => api.resolve_invoice_dispute(&id, resolution).await?,
            Call::Payment(payment) => api.record_invoice_payment(&id, payment).await?,
            Call::Factoring => api.submit_factoring(&id).await?,
        }
        tracing::info!("invoice {}: {} ok", id, action.label());
        self.dispatch(BoardAction::ActionSucceeded(format!(
            "{}: {}",
            action.label(),
            id
        )));
        self.refresh().await
    }

    pub async fn issue(&mut self, invoice_id: &str) -> Result<()> {
        self.run(invoice_id, Call::Issue).await
    }

    pub async fn send(&mut self, invoice_id: &str) -> Result<()> {
        self.run(invoice_id, Call::Send).await
    }

    pub async fn void(&mut self, invoice_id: &str, reason: Option<&str>) -> Result<()> {
        self.run(invoice_id, Call::Void(reason)).await
    }

    pub async fn dispute(&mut self, invoice_id: &str, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            return self
                .fail(FinanceError::validation("Enter a reason for the dispute"));
        }
        self.run(invoice_id, Call::Dispute(reason)).await
    }

    pub async fn resolve_dispute(&mut self, invoice_id: &str, resolution: &str) -> Result<()> {
        if resolution.trim().is_empty() {
            return self.fail(FinanceError::validation("Describe how the dispute was resolved"));
        }
        self.run(invoice_id, Call::Resolve(resolution)).await
    }

    pub async fn record_payment(
        &mut self,
        invoice_id: &str,
        amount: BigDecimal,
        method: Option<String>,
        reference: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<()> {
        if amount <= BigDecimal::zero() {
            return self.fail(FinanceError::validation(
                "Payment amount must be greater than zero",
            ));
        }
        let balance = self.find(invoice_id).ok().map(Invoice::balance_due);
        if matches!(&balance, Some(b) if amount > *b) {
            return self.fail(FinanceError::validation("Payment exceeds the balance due"));
        }
        let payment = PaymentRequest {
            amount,
            method,
            reference,
            paid_at,
        };
        self.run(invoice_id, Call::Payment(&payment)).await
    }

    pub async fn submit_factoring(&mut self, invoice_id: &str) -> Result<()> {
        if self.find(invoice_id).map(|i| i.factoring).unwrap_or(false) {
            return self.fail(FinanceError::rule(
                "Invoice has already been submitted for factoring",
            ));
        }
        self.run(invoice_id, Call::Factoring).await
    }

    /// 邮件发送. 草稿先确认再开票; 作废发票在任何请求之前被拒绝
    pub async fn email(
        &mut self,
        invoice_id: &str,
        draft: &EmailDraft,
        prompt: &dyn Confirm,
    ) -> Result<EmailOutcome> {
        let result = self.try_email(invoice_id, draft, prompt).await;
        if let Err(e) = &result {
            tracing::warn!("emailing invoice {} failed: {}", invoice_id, e);
            self.dispatch(BoardAction::ActionFailed(e.to_string()));
        }
        result
    }

    async fn try_email(
        &mut self,
        invoice_id: &str,
        draft: &EmailDraft,
        prompt: &dyn Confirm,
    ) -> Result<EmailOutcome> {
        if !self.role.can_perform(InvoiceAction::Send) {
            return Err(FinanceError::rule("Send is not available for your role"));
        }
        let invoice = self.find(invoice_id)?;
        let is_draft = invoice.status == InvoiceStatus::Draft;
        if !is_draft {
            invoice.status.apply(InvoiceAction::Send)?;
        }
        if !invoice.has_pod() {
            return Err(FinanceError::rule(
                "Upload proof of delivery before issuing or sending this invoice",
            ));
        }
        draft.validate()?;

        let id = invoice.invoice_id.clone();
        let number = invoice.display_number().to_string();

        if is_draft
            && !prompt.confirm(&format!(
                "Invoice {number} is still a draft. Issue it now and send it?"
            ))
        {
            return Ok(EmailOutcome::Cancelled);
        }

        self.dispatch(BoardAction::ActionStarted(id.clone()));
        let api = Arc::clone(&self.api);
        if is_draft {
            api.issue_invoice(&id).await?;
            tracing::info!("issued draft invoice {} before emailing", id);
        }
        if let Err(e) = api.email_invoice(&id, draft).await {
            // 已开票但邮件失败: 先同步状态, 重试时走已开票分支
            if is_draft {
                if let Err(refresh_err) = self.refresh().await {
                    tracing::warn!("refresh after partial email of {} failed: {}", id, refresh_err);
                }
            }
            return Err(e);
        }
        tracing::info!("emailed invoice {} to {}", id, draft.to.join(", "));
        self.dispatch(BoardAction::ActionSucceeded(format!("Invoice {number} sent")));
        self.refresh().await?;
        Ok(EmailOutcome::Sent {
            issued_first: is_draft,
        })
    }

    pub async fn download_package(&mut self, invoice_id: &str) -> Result<Vec<u8>> {
        let id = self.find(invoice_id).map(|i| i.invoice_id.clone());
        let id = match id {
            Ok(id) => id,
            Err(e) => return self.fail(e),
        };
        match self.api.download_invoice_package_zip(&id).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => self.fail(e),
        }
    }

    /// 导出当前可见行
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        export::write_invoices_csv(self.visible(), writer)
    }

    fn fail<T>(&mut self, e: FinanceError) -> Result<T> {
        self.dispatch(BoardAction::ActionFailed(e.to_string()));
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice(id: &str, status: &str, customer: &str, load: &str, amount: i64) -> Invoice {
        serde_json::from_value(json!({
            "invoice_id": id,
            "invoice_number": format!("INV-{id}"),
            "status": status,
            "amount_total": amount,
            "load_id": load,
            "issuer_uid": "carrier-1",
            "payer_uid": "shipper-1",
            "metadata": { "bill_to": { "name": customer } }
        }))
        .unwrap()
    }

    fn sample() -> Vec<Invoice> {
        vec![
            invoice("a1", "paid", "Acme Foods", "L-100", 900),
            invoice("b2", "sent", "Blue Freight", "L-200", 300),
            invoice("c3", "paid", "Cargo Co", "L-300", 500),
            invoice("d4", "draft", "Acme Foods", "L-400", 100),
        ]
    }

    #[test]
    fn status_filter_is_case_insensitive() {
        let invoices = sample();
        let filter = BoardFilter {
            status: StatusFilter::parse("Paid").unwrap(),
            ..Default::default()
        };
        let rows = filter.apply(&invoices, None);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status.as_str() == "paid"));
    }

    #[test]
    fn non_matching_search_yields_nothing() {
        let invoices = sample();
        let filter = BoardFilter {
            status: StatusFilter::parse("Paid").unwrap(),
            search: "zzz-nothing".into(),
            ..Default::default()
        };
        assert!(filter.apply(&invoices, None).is_empty());
    }

    #[test]
    fn search_covers_customer_id_number_and_load() {
        let invoices = sample();
        for (term, expected) in [("acme", 2), ("B2", 1), ("inv-c3", 1), ("l-400", 1)] {
            let filter = BoardFilter {
                search: term.into(),
                ..Default::default()
            };
            assert_eq!(filter.apply(&invoices, None).len(), expected, "{term}");
        }
    }

    #[test]
    fn party_filter_requires_known_user() {
        let invoices = sample();
        let filter = BoardFilter {
            party: PartyFilter::BilledToMe,
            ..Default::default()
        };
        assert_eq!(filter.apply(&invoices, Some("shipper-1")).len(), 4);
        assert!(filter.apply(&invoices, Some("carrier-1")).is_empty());
        assert!(filter.apply(&invoices, None).is_empty());
    }

    #[test]
    fn sort_by_same_key_toggles_direction() {
        let mut state = BoardState {
            invoices: sample(),
            ..Default::default()
        };
        state.reduce(BoardAction::SortBy(SortKey::Amount));
        let asc: Vec<_> = state.visible(None).iter().map(|i| i.invoice_id.clone()).collect();
        assert_eq!(asc, ["d4", "b2", "c3", "a1"]);

        state.reduce(BoardAction::SortBy(SortKey::Amount));
        assert_eq!(state.filter.sort_dir, SortDirection::Desc);
        let desc: Vec<_> = state.visible(None).iter().map(|i| i.invoice_id.clone()).collect();
        assert_eq!(desc, ["a1", "c3", "b2", "d4"]);
    }

    #[test]
    fn failures_set_dismissible_error() {
        let mut state = BoardState::default();
        state.reduce(BoardAction::ActionStarted("a1".into()));
        assert_eq!(state.busy_invoice.as_deref(), Some("a1"));
        state.reduce(BoardAction::ActionFailed("boom".into()));
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert!(state.busy_invoice.is_none());
        state.reduce(BoardAction::DismissError);
        assert!(state.error.is_none());
    }

    #[test]
    fn unknown_status_filter_is_rejected() {
        assert!(StatusFilter::parse("refunded").is_err());
        assert_eq!(StatusFilter::parse("ALL").unwrap(), StatusFilter::All);
    }
}
