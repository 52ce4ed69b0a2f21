use crate::client::FinanceBackend;
use crate::error::Result;
use crate::models::{format_currency, InvoiceAction, InvoicePdfContext, Role};
use bigdecimal::{BigDecimal, Zero};
use std::fmt::Write;

/// 单张发票详情/预览
#[derive(Debug, Clone)]
pub struct InvoiceDetail {
    pub context: InvoicePdfContext,
}

impl InvoiceDetail {
    pub async fn load<A>(api: &A, invoice_id: &str) -> Result<Self>
    where
        A: FinanceBackend + ?Sized,
    {
        let context = api.invoice_pdf_context(invoice_id).await?;
        Ok(Self { context })
    }

    /// 当前角色在当前状态下可用的操作按钮
    pub fn available_actions(&self, role: Role) -> Vec<InvoiceAction> {
        let invoice = &self.context.invoice;
        InvoiceAction::ALL
            .into_iter()
            .filter(|a| role.can_perform(*a) && invoice.status.allows(*a))
            .filter(|a| *a != InvoiceAction::SubmitFactoring || !invoice.factoring)
            .collect()
    }

    pub fn render_text(&self) -> String {
        let inv = &self.context.invoice;
        let cur = inv.currency.as_str();
        let mut out = String::new();

        let _ = writeln!(out, "Invoice {}  [{}]", inv.display_number(), inv.status);
        if let Some(issuer) = &self.context.issuer {
            let _ = writeln!(out, "From:    {}", issuer.name);
        }
        let bill_to = inv
            .metadata
            .bill_to
            .as_ref()
            .map(|b| b.name.clone())
            .or_else(|| self.context.payer.as_ref().map(|p| p.name.clone()))
            .unwrap_or_default();
        let _ = writeln!(out, "Bill to: {}", bill_to);
        if let Some(load) = &self.context.load {
            let _ = writeln!(out, "Load:    {} ({})", load.display_number(), load.route());
        } else if let Some(load_id) = &inv.load_id {
            let _ = writeln!(out, "Load:    {}", load_id);
        }
        if let Some(due) = inv.due_date {
            let _ = writeln!(out, "Due:     {}", due.format("%Y-%m-%d"));
        }
        out.push('\n');

        let mut subtotal = BigDecimal::zero();
        for li in &inv.metadata.line_items {
            let amount = li.amount();
            let _ = writeln!(
                out,
                "  {:<28} {:>8} x {:>12} = {:>14}",
                li.description,
                li.quantity,
                format_currency(&li.rate, cur),
                format_currency(&amount, cur)
            );
            subtotal += amount;
        }

        let charges = &inv.metadata.charges;
        let _ = writeln!(out, "\n  Subtotal  {:>14}", format_currency(&subtotal, cur));
        let fuel_and_other = &charges.fuel_surcharge + &charges.other_charges;
        if fuel_and_other != BigDecimal::zero() {
            let _ = writeln!(out, "  Charges   {:>14}", format_currency(&fuel_and_other, cur));
        }
        if charges.discount != BigDecimal::zero() {
            let _ = writeln!(out, "  Discount  {:>14}", format_currency(&-charges.discount.clone(), cur));
        }
        let _ = writeln!(out, "  Total     {:>14}", format_currency(&inv.amount_total, cur));
        if inv.amount_paid > BigDecimal::zero() {
            let _ = writeln!(out, "  Paid      {:>14}", format_currency(&inv.amount_paid, cur));
            let _ = writeln!(out, "  Balance   {:>14}", format_currency(&inv.balance_due(), cur));
        }

        if !inv.audit_log.is_empty() {
            out.push_str("\nHistory:\n");
            for entry in &inv.audit_log {
                let _ = writeln!(
                    out,
                    "  {}  {}{}",
                    entry.at.format("%Y-%m-%d %H:%M"),
                    entry.action,
                    entry
                        .note
                        .as_deref()
                        .map(|n| format!(" ({n})"))
                        .unwrap_or_default()
                );
            }
        }
        out
    }
}
