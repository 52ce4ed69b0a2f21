use super::status::InvoiceStatus;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

/// 发票 (服务端读模型)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub status: InvoiceStatus,
    pub amount_total: BigDecimal,
    #[serde(default)]
    pub amount_paid: BigDecimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub load_id: Option<String>,
    #[serde(default)]
    pub payer_uid: Option<String>,
    #[serde(default)]
    pub issuer_uid: Option<String>,
    #[serde(default, alias = "factoring_enabled")]
    pub factoring: bool,
    #[serde(default)]
    pub metadata: InvoiceMetadata,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// 展示用客户名: 账单抬头 -> 付款人 uid
    pub fn customer_name(&self) -> &str {
        self.metadata
            .bill_to
            .as_ref()
            .map(|b| b.name.as_str())
            .filter(|n| !n.is_empty())
            .or(self.payer_uid.as_deref())
            .unwrap_or("")
    }

    pub fn display_number(&self) -> &str {
        self.invoice_number.as_deref().unwrap_or(&self.invoice_id)
    }

    pub fn has_pod(&self) -> bool {
        self.attachments.iter().any(Attachment::is_pod)
    }

    pub fn balance_due(&self) -> BigDecimal {
        let due = &self.amount_total - &self.amount_paid;
        if due < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            due
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceMetadata {
    #[serde(default)]
    pub bill_to: Option<BillTo>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub charges: Charges,
    #[serde(default)]
    pub email_draft: Option<EmailDraft>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 账单抬头
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillTo {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// 发票明细行; amount 仅用于预览, 以服务端返回为准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: BigDecimal,
    pub rate: BigDecimal,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: BigDecimal, rate: BigDecimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            rate,
        }
    }

    pub fn amount(&self) -> BigDecimal {
        &self.quantity * &self.rate
    }

    /// 数量为正, 单价非负
    pub fn is_billable(&self) -> bool {
        self.quantity > BigDecimal::zero() && self.rate >= BigDecimal::zero()
    }
}

/// 附加费/折扣
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Charges {
    #[serde(default)]
    pub fuel_surcharge: BigDecimal,
    #[serde(default)]
    pub other_charges: BigDecimal,
    #[serde(default)]
    pub discount: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Attachment {
    pub fn is_pod(&self) -> bool {
        self.kind.eq_ignore_ascii_case("pod")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub actor_uid: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// 发送邮件草稿
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_true")]
    pub attach_pdf: bool,
}

impl EmailDraft {
    /// 以账单抬头邮箱预填
    pub fn for_invoice(invoice: &Invoice) -> Self {
        if let Some(draft) = &invoice.metadata.email_draft {
            return draft.clone();
        }
        let to = invoice
            .metadata
            .bill_to
            .as_ref()
            .and_then(|b| b.email.clone())
            .into_iter()
            .collect();
        Self {
            to,
            cc: Vec::new(),
            subject: format!("Invoice {}", invoice.display_number()),
            body: format!(
                "Please find attached invoice {} for {} {}.",
                invoice.display_number(),
                super::money::format_amount(&invoice.amount_total),
                invoice.currency
            ),
            attach_pdf: true,
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::FinanceError> {
        if self.to.is_empty() {
            return Err(crate::error::FinanceError::validation(
                "Add at least one recipient",
            ));
        }
        if let Some(bad) = self.to.iter().chain(&self.cc).find(|a| !looks_like_email(a)) {
            return Err(crate::error::FinanceError::validation(format!(
                "Invalid email address: {bad}"
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(crate::error::FinanceError::validation("Subject is required"));
        }
        Ok(())
    }
}

fn looks_like_email(addr: &str) -> bool {
    let addr = addr.trim();
    match addr.split_once('@') {
        Some((user, domain)) => !user.is_empty() && domain.contains('.') && !addr.contains(' '),
        None => false,
    }
}

/// 发票 PDF/预览上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePdfContext {
    pub invoice: Invoice,
    #[serde(default)]
    pub issuer: Option<PartyInfo>,
    #[serde(default)]
    pub payer: Option<PartyInfo>,
    #[serde(default)]
    pub load: Option<super::load::Load>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyInfo {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mc_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// 创建发票请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreateInvoiceRequest {
    pub load_id: String,
    pub currency: String,
    pub amount_total: BigDecimal,
    pub due_date: Option<DateTime<Utc>>,
    pub due_in_days: Option<u32>,
    pub metadata: InvoiceMetadata,
}

/// 收款登记
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub amount: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_sparse_invoice() {
        let inv: Invoice = serde_json::from_value(json!({
            "invoice_id": "inv_1",
            "status": "sent",
            "amount_total": 530,
            "factoring_enabled": true,
            "attachments": [{"kind": "POD", "filename": "pod.pdf"}]
        }))
        .unwrap();
        assert_eq!(inv.status, InvoiceStatus::Sent);
        assert_eq!(inv.currency, "USD");
        assert!(inv.factoring);
        assert!(inv.has_pod());
        assert_eq!(inv.display_number(), "inv_1");
        assert_eq!(inv.balance_due(), BigDecimal::from(530));
    }

    #[test]
    fn email_draft_requires_valid_recipient() {
        let mut draft = EmailDraft {
            to: vec![],
            subject: "Invoice 1".into(),
            ..Default::default()
        };
        assert_eq!(draft.validate().unwrap_err().to_string(), "Add at least one recipient");
        draft.to.push("ap@shipper".into());
        assert!(draft.validate().is_err());
        draft.to = vec!["ap@shipper.com".into()];
        assert!(draft.validate().is_ok());
    }
}
