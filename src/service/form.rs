use crate::client::FinanceBackend;
use crate::error::{FinanceError, Result};
use crate::models::{
    parse_amount, BillTo, Charges, CreateInvoiceRequest, EmailDraft, Invoice, InvoiceMetadata,
    LineItem, Load,
};
use crate::service::prompt::Confirm;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, Timelike, Utc};

pub const MIN_DUE_DAYS: u32 = 1;
pub const MAX_DUE_DAYS: u32 = 120;

/// 提交方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// 存草稿, 不要求 POD
    Draft,
    /// 创建并开票, 要求 POD
    Issue,
    /// 创建并开票, 随后进入发送邮件步骤
    IssueSend,
}

impl SubmitMode {
    pub fn requires_pod(&self) -> bool {
        !matches!(self, Self::Draft)
    }
}

/// 表单派生金额
#[derive(Debug, Clone, PartialEq)]
pub struct FormTotals {
    pub subtotal: BigDecimal,
    pub charges: BigDecimal,
    pub discount: BigDecimal,
    /// subtotal + charges - discount
    pub computed_total: BigDecimal,
    /// 实际提交金额 (启用且合法的覆盖值优先)
    pub total: BigDecimal,
    pub override_applied: bool,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Created {
        invoice: Invoice,
        issued: bool,
        /// IssueSend 模式下需要打开的邮件草稿
        email: Option<EmailDraft>,
    },
    /// 用户在 POD 提示中取消
    Cancelled,
}

/// 创建发票表单状态
#[derive(Debug, Clone)]
pub struct InvoiceForm {
    pub load: Option<Load>,
    pub bill_to: BillTo,
    pub line_items: Vec<LineItem>,
    pub fuel_surcharge: BigDecimal,
    pub other_charges: BigDecimal,
    pub discount: BigDecimal,
    pub override_enabled: bool,
    /// 原始输入
    pub total_override: String,
    /// 原始输入, 空串表示不设置
    pub due_in_days: String,
    pub currency: String,
    pub notes: String,
    pub error: Option<String>,
}

impl Default for InvoiceForm {
    fn default() -> Self {
        Self {
            load: None,
            bill_to: BillTo::default(),
            line_items: Vec::new(),
            fuel_surcharge: BigDecimal::zero(),
            other_charges: BigDecimal::zero(),
            discount: BigDecimal::zero(),
            override_enabled: false,
            total_override: String::new(),
            due_in_days: String::new(),
            currency: "USD".to_string(),
            notes: String::new(),
            error: None,
        }
    }
}

impl InvoiceForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 选择运单并预填账单抬头和运费行
    pub fn select_load(&mut self, load: Load) {
        if self.bill_to.name.is_empty() {
            self.bill_to.name = load.shipper_name.clone().unwrap_or_default();
        }
        if self.bill_to.email.is_none() {
            self.bill_to.email = load.shipper_email.clone();
        }
        if self.line_items.is_empty() {
            if let Some(rate) = &load.rate {
                self.line_items
                    .push(LineItem::new("Line Haul", BigDecimal::from(1), rate.clone()));
            }
        }
        self.load = Some(load);
    }

    pub fn add_line_item(&mut self, item: LineItem) {
        self.line_items.push(item);
    }

    pub fn set_override(&mut self, raw: Option<&str>) {
        match raw {
            Some(v) => {
                self.override_enabled = true;
                self.total_override = v.to_string();
            }
            None => {
                self.override_enabled = false;
                self.total_override.clear();
            }
        }
    }

    fn parsed_override(&self) -> Option<BigDecimal> {
        if !self.override_enabled {
            return None;
        }
        parse_amount(&self.total_override).filter(|v| *v > BigDecimal::zero())
    }

    pub fn totals(&self) -> FormTotals {
        let subtotal = self
            .line_items
            .iter()
            .fold(BigDecimal::zero(), |acc, li| acc + li.amount());
        let charges = &self.fuel_surcharge + &self.other_charges;
        let computed_total = &subtotal + &charges - &self.discount;
        let (total, override_applied) = match self.parsed_override() {
            Some(v) => (v, true),
            None => (computed_total.clone(), false),
        };
        FormTotals {
            subtotal,
            charges,
            discount: self.discount.clone(),
            computed_total,
            total,
            override_applied,
        }
    }

    /// 解析付款期限: 整数且在 [1, 120]
    pub fn parsed_due_days(&self) -> Result<Option<u32>> {
        let raw = self.due_in_days.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse::<u32>() {
            Ok(d) if (MIN_DUE_DAYS..=MAX_DUE_DAYS).contains(&d) => Ok(Some(d)),
            _ => Err(FinanceError::validation(format!(
                "Due in days must be a whole number between {MIN_DUE_DAYS} and {MAX_DUE_DAYS}"
            ))),
        }
    }

    /// 提交前校验, 通过后返回请求体; 不发任何网络请求
    pub fn build_request(&self, now: DateTime<Utc>) -> Result<CreateInvoiceRequest> {
        let load = self
            .load
            .as_ref()
            .ok_or_else(|| FinanceError::validation("Select a load to invoice"))?;

        let zero = BigDecimal::zero();
        if self
            .line_items
            .iter()
            .any(|li| li.quantity < zero || li.rate < zero)
        {
            return Err(FinanceError::validation(
                "Line item quantities and rates cannot be negative",
            ));
        }
        if !self.line_items.iter().any(LineItem::is_billable) {
            return Err(FinanceError::validation(
                "Add at least one line item with a positive quantity",
            ));
        }
        if self.fuel_surcharge < zero || self.other_charges < zero || self.discount < zero {
            return Err(FinanceError::validation(
                "Charges and discount cannot be negative",
            ));
        }

        let due_in_days = self.parsed_due_days()?;

        if self.override_enabled && self.parsed_override().is_none() {
            return Err(FinanceError::validation(
                "Total override must be a positive number",
            ));
        }
        let totals = self.totals();
        if totals.total <= zero {
            return Err(FinanceError::validation("Total must be greater than zero"));
        }

        Ok(CreateInvoiceRequest {
            load_id: load.load_id.clone(),
            currency: self.currency.clone(),
            amount_total: totals.total,
            due_date: due_in_days.map(|d| due_date_from(now, d)),
            due_in_days,
            metadata: InvoiceMetadata {
                bill_to: (!self.bill_to.name.trim().is_empty()).then(|| self.bill_to.clone()),
                line_items: self.line_items.clone(),
                charges: Charges {
                    fuel_surcharge: self.fuel_surcharge.clone(),
                    other_charges: self.other_charges.clone(),
                    discount: self.discount.clone(),
                },
                email_draft: None,
                notes: (!self.notes.trim().is_empty()).then(|| self.notes.clone()),
            },
        })
    }

    /// 提交. 校验失败/后端失败都会写入 `error`
    pub async fn submit<A>(
        &mut self,
        api: &A,
        mode: SubmitMode,
        prompt: &dyn Confirm,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome>
    where
        A: FinanceBackend + ?Sized,
    {
        self.error = None;
        let result = self.submit_inner(api, mode, prompt, now).await;
        if let Err(e) = &result {
            tracing::warn!("invoice submit failed: {}", e);
            self.error = Some(e.to_string());
        }
        result
    }

    async fn submit_inner<A>(
        &mut self,
        api: &A,
        mode: SubmitMode,
        prompt: &dyn Confirm,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome>
    where
        A: FinanceBackend + ?Sized,
    {
        let request = self.build_request(now)?;

        let has_pod = self.load.as_ref().map(|l| l.has_pod).unwrap_or(false);
        let mode = if mode.requires_pod() && !has_pod {
            let fallback = prompt.confirm(
                "Proof of delivery has not been uploaded for this load, so the invoice \
                 cannot be issued yet. Save it as a draft instead?",
            );
            if !fallback {
                return Ok(SubmitOutcome::Cancelled);
            }
            SubmitMode::Draft
        } else {
            mode
        };

        let invoice = api.create_invoice(&request).await?;
        tracing::info!(
            "created invoice {} for load {} ({:?})",
            invoice.invoice_id,
            request.load_id,
            mode
        );

        // 开票失败时发票已存在: 以草稿返回, 重新提交不会重复创建
        let issued = if mode.requires_pod() {
            match api.issue_invoice(&invoice.invoice_id).await {
                Ok(()) => {
                    tracing::info!("issued invoice {}", invoice.invoice_id);
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        "invoice {} created but issuing failed: {}",
                        invoice.invoice_id,
                        e
                    );
                    self.error = Some(format!(
                        "Invoice {} was saved as a draft but could not be issued: {}",
                        invoice.display_number(),
                        e
                    ));
                    false
                }
            }
        } else {
            false
        };

        let email = (mode == SubmitMode::IssueSend && issued).then(|| {
            let mut draft = EmailDraft::for_invoice(&invoice);
            if draft.to.is_empty() {
                draft.to.extend(self.bill_to.email.clone());
            }
            draft
        });

        Ok(SubmitOutcome::Created {
            invoice,
            issued,
            email,
        })
    }
}

/// now + N 天, 截断到整秒
pub fn due_date_from(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let due = now + Duration::days(i64::from(days));
    due.with_nanosecond(0).unwrap_or(due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn load(has_pod: bool) -> Load {
        serde_json::from_value(serde_json::json!({
            "load_id": "load_1",
            "has_pod": has_pod,
            "shipper_name": "Acme Foods",
            "shipper_email": "ap@acme.test",
            "rate": "500"
        }))
        .unwrap()
    }

    #[test]
    fn totals_follow_line_items_and_charges() {
        let mut form = InvoiceForm::new();
        form.add_line_item(LineItem::new("Line Haul", dec("1"), dec("500")));
        form.fuel_surcharge = dec("50");
        form.discount = dec("20");

        let t = form.totals();
        assert_eq!(t.subtotal, dec("500"));
        assert_eq!(t.charges, dec("50"));
        assert_eq!(t.total, dec("530"));
        assert!(!t.override_applied);
    }

    #[test]
    fn subtotal_sums_quantity_times_rate() {
        let mut form = InvoiceForm::new();
        form.add_line_item(LineItem::new("Line Haul", dec("2"), dec("412.50")));
        form.add_line_item(LineItem::new("Detention", dec("1.5"), dec("75")));
        form.add_line_item(LineItem::new("Lumper", dec("1"), dec("0")));
        form.other_charges = dec("10.25");

        let t = form.totals();
        assert_eq!(t.subtotal, dec("937.50"));
        assert_eq!(t.total, dec("947.75"));
    }

    #[test]
    fn valid_override_replaces_total() {
        let mut form = InvoiceForm::new();
        form.add_line_item(LineItem::new("Line Haul", dec("1"), dec("500")));
        form.set_override(Some("$1,000.00"));
        let t = form.totals();
        assert_eq!(t.total, dec("1000"));
        assert_eq!(t.computed_total, dec("500"));
        assert!(t.override_applied);

        form.set_override(Some("-5"));
        assert_eq!(form.totals().total, dec("500"));
    }

    #[test]
    fn due_days_must_be_in_range() {
        let mut form = InvoiceForm::new();
        for bad in ["0", "121", "7.5", "soon"] {
            form.due_in_days = bad.to_string();
            assert!(form.parsed_due_days().is_err(), "{bad}");
        }
        form.due_in_days = " 30 ".to_string();
        assert_eq!(form.parsed_due_days().unwrap(), Some(30));
        form.due_in_days.clear();
        assert_eq!(form.parsed_due_days().unwrap(), None);
    }

    #[test]
    fn due_date_truncates_to_whole_seconds() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 15).unwrap()
            + Duration::milliseconds(987);
        let due = due_date_from(now, 15);
        assert_eq!(due, Utc.with_ymd_and_hms(2026, 3, 16, 8, 30, 15).unwrap());
        assert_eq!(due.nanosecond(), 0);
    }

    #[test]
    fn build_request_validates_before_anything_else() {
        let now = Utc::now();
        let mut form = InvoiceForm::new();
        assert_eq!(
            form.build_request(now).unwrap_err().to_string(),
            "Select a load to invoice"
        );

        form.load = Some(load(true));
        assert!(form.build_request(now).is_err());

        form.add_line_item(LineItem::new("Line Haul", dec("0"), dec("500")));
        assert!(form.build_request(now).is_err());

        form.add_line_item(LineItem::new("Fuel", dec("1"), dec("-3")));
        assert_eq!(
            form.build_request(now).unwrap_err().to_string(),
            "Line item quantities and rates cannot be negative"
        );

        form.line_items = vec![LineItem::new("Line Haul", dec("1"), dec("100"))];
        form.discount = dec("150");
        assert_eq!(
            form.build_request(now).unwrap_err().to_string(),
            "Total must be greater than zero"
        );

        form.discount = dec("0");
        form.set_override(Some("abc"));
        assert_eq!(
            form.build_request(now).unwrap_err().to_string(),
            "Total override must be a positive number"
        );

        form.set_override(None);
        form.due_in_days = "15".into();
        let req = form.build_request(now).unwrap();
        assert_eq!(req.amount_total, dec("100"));
        assert_eq!(req.due_in_days, Some(15));
        assert_eq!(req.due_date, Some(due_date_from(now, 15)));
    }

    #[test]
    fn selecting_load_prefills_bill_to_and_line_haul() {
        let mut form = InvoiceForm::new();
        form.select_load(load(false));
        assert_eq!(form.bill_to.name, "Acme Foods");
        assert_eq!(form.bill_to.email.as_deref(), Some("ap@acme.test"));
        assert_eq!(form.line_items.len(), 1);
        assert_eq!(form.totals().total, dec("500"));
    }
}
