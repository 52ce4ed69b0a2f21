use crate::error::FinanceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 发票状态 (服务端权威, 客户端只做按钮门控)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Sent,
    Disputed,
    Paid,
    Overdue,
    Void,
    PartiallyPaid,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 8] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Issued,
        InvoiceStatus::Sent,
        InvoiceStatus::Disputed,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Void,
        InvoiceStatus::PartiallyPaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Sent => "sent",
            Self::Disputed => "disputed",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Void => "void",
            Self::PartiallyPaid => "partially_paid",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Issued => "Issued",
            Self::Sent => "Sent",
            Self::Disputed => "Disputed",
            Self::Paid => "Paid",
            Self::Overdue => "Overdue",
            Self::Void => "Void",
            Self::PartiallyPaid => "Partially paid",
        }
    }

    /// 大小写不敏感, 接受 "Partially paid" / "partially_paid" / "partially-paid"
    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|st| st.as_str() == key)
    }

    /// 状态 × 操作 的完整转换表; Err 为操作被拒绝时展示给用户的原因
    pub fn apply(self, action: InvoiceAction) -> Result<Transition, FinanceError> {
        use InvoiceStatus::*;
        use Transition::*;

        let outcome = match action {
            InvoiceAction::Issue => match self {
                Draft => Ok(To(Issued)),
                Void => Err("Cannot issue a void invoice"),
                Issued | Sent | Disputed | Paid | Overdue | PartiallyPaid => {
                    Err("Invoice has already been issued")
                }
            },
            InvoiceAction::Send => match self {
                Issued => Ok(To(Sent)),
                Sent | Overdue | PartiallyPaid => Ok(Unchanged),
                Draft => Err("Issue the invoice before sending it"),
                Void => Err("Cannot email a void invoice"),
                Paid => Err("Cannot email a paid invoice"),
                Disputed => Err("Resolve the dispute before sending this invoice"),
            },
            InvoiceAction::Void => match self {
                Draft | Issued => Ok(To(Void)),
                InvoiceStatus::Void => Err("Invoice is already void"),
                Sent | Disputed | Paid | Overdue | PartiallyPaid => {
                    Err("Only draft or issued invoices can be voided")
                }
            },
            InvoiceAction::Dispute => match self {
                Sent | Overdue | PartiallyPaid => Ok(To(Disputed)),
                Void => Err("Cannot dispute a void invoice"),
                Paid => Err("Cannot dispute a paid invoice"),
                Disputed => Err("Invoice is already disputed"),
                Draft | Issued => Err("Only sent invoices can be disputed"),
            },
            InvoiceAction::ResolveDispute => match self {
                Disputed => Ok(To(Sent)),
                Draft | Issued | Sent | Paid | Overdue | Void | PartiallyPaid => {
                    Err("Invoice is not disputed")
                }
            },
            InvoiceAction::RecordPayment => match self {
                Issued | Sent | Overdue | PartiallyPaid => Ok(Payment),
                Draft => Err("Issue the invoice before recording a payment"),
                Disputed => Err("Resolve the dispute before recording a payment"),
                Paid => Err("Invoice is already paid"),
                Void => Err("Cannot record a payment on a void invoice"),
            },
            InvoiceAction::SubmitFactoring => match self {
                Issued | Sent => Ok(Unchanged),
                Draft | Disputed | Paid | Overdue | Void | PartiallyPaid => {
                    Err("Only issued or sent invoices can be submitted for factoring")
                }
            },
        };

        outcome.map_err(FinanceError::rule)
    }

    pub fn allows(self, action: InvoiceAction) -> bool {
        self.apply(action).is_ok()
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 生命周期操作 (每个对应一个后端端点)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceAction {
    Issue,
    Send,
    Void,
    Dispute,
    ResolveDispute,
    RecordPayment,
    SubmitFactoring,
}

impl InvoiceAction {
    pub const ALL: [InvoiceAction; 7] = [
        InvoiceAction::Issue,
        InvoiceAction::Send,
        InvoiceAction::Void,
        InvoiceAction::Dispute,
        InvoiceAction::ResolveDispute,
        InvoiceAction::RecordPayment,
        InvoiceAction::SubmitFactoring,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Issue => "Issue",
            Self::Send => "Send",
            Self::Void => "Void",
            Self::Dispute => "Dispute",
            Self::ResolveDispute => "Resolve dispute",
            Self::RecordPayment => "Record payment",
            Self::SubmitFactoring => "Submit for factoring",
        }
    }
}

/// 客户端预期的结果, 真实状态以刷新后的服务端数据为准
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(InvoiceStatus),
    /// 全额 -> paid, 部分 -> partially_paid
    Payment,
    Unchanged,
}

/// 登录角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 承运方, 开票人
    #[default]
    Carrier,
    /// 托运方, 付款人
    Shipper,
    Admin,
}

impl Role {
    /// 付款人视图走 /payer/invoices
    pub fn is_payer_view(&self) -> bool {
        matches!(self, Self::Shipper)
    }

    pub fn can_perform(&self, action: InvoiceAction) -> bool {
        match self {
            Self::Admin => true,
            Self::Carrier => action != InvoiceAction::Dispute,
            Self::Shipper => action == InvoiceAction::Dispute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let issued = InvoiceStatus::Draft.apply(InvoiceAction::Issue).unwrap();
        assert_eq!(issued, Transition::To(InvoiceStatus::Issued));
        let sent = InvoiceStatus::Issued.apply(InvoiceAction::Send).unwrap();
        assert_eq!(sent, Transition::To(InvoiceStatus::Sent));
        assert_eq!(
            InvoiceStatus::Sent.apply(InvoiceAction::Dispute).unwrap(),
            Transition::To(InvoiceStatus::Disputed)
        );
        assert_eq!(
            InvoiceStatus::Disputed.apply(InvoiceAction::ResolveDispute).unwrap(),
            Transition::To(InvoiceStatus::Sent)
        );
        assert_eq!(
            InvoiceStatus::Sent.apply(InvoiceAction::RecordPayment).unwrap(),
            Transition::Payment
        );
    }

    #[test]
    fn only_draft_and_issued_can_be_voided() {
        for status in InvoiceStatus::ALL {
            let allowed = status.allows(InvoiceAction::Void);
            let expected = matches!(status, InvoiceStatus::Draft | InvoiceStatus::Issued);
            assert_eq!(allowed, expected, "void from {status:?}");
        }
    }

    #[test]
    fn void_invoice_rejects_email_with_message() {
        let err = InvoiceStatus::Void.apply(InvoiceAction::Send).unwrap_err();
        assert_eq!(err.to_string(), "Cannot email a void invoice");
        assert!(err.is_client_side());
    }

    #[test]
    fn void_is_terminal() {
        for action in InvoiceAction::ALL {
            assert!(!InvoiceStatus::Void.allows(action), "{action:?} on void");
        }
    }

    #[test]
    fn draft_cannot_be_sent_directly() {
        assert!(!InvoiceStatus::Draft.allows(InvoiceAction::Send));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(InvoiceStatus::parse("Paid"), Some(InvoiceStatus::Paid));
        assert_eq!(
            InvoiceStatus::parse("Partially paid"),
            Some(InvoiceStatus::PartiallyPaid)
        );
        assert_eq!(InvoiceStatus::parse("refunded"), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let s: InvoiceStatus = serde_json::from_str("\"partially_paid\"").unwrap();
        assert_eq!(s, InvoiceStatus::PartiallyPaid);
        assert_eq!(serde_json::to_string(&InvoiceStatus::Void).unwrap(), "\"void\"");
    }

    #[test]
    fn shipper_can_only_dispute() {
        let allowed: Vec<_> = InvoiceAction::ALL
            .into_iter()
            .filter(|a| Role::Shipper.can_perform(*a))
            .collect();
        assert_eq!(allowed, vec![InvoiceAction::Dispute]);
    }
}
