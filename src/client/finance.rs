use super::{decode_entity, decode_list, status_param, ApiClient, FinanceBackend};
use crate::error::Result;
use crate::models::{
    CreateInvoiceRequest, EmailDraft, FinanceForecast, FinanceSummary, Invoice, InvoicePdfContext,
    InvoiceStatus, Load, PaymentRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

/// 发票列表查询参数
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvoiceQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl InvoiceQuery {
    pub fn with_status(status: Option<InvoiceStatus>) -> Self {
        Self {
            status: status_param(status),
            ..Default::default()
        }
    }
}

#[async_trait]
impl FinanceBackend for ApiClient {
    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>> {
        let value = self.get_json(&["invoices"], Some(query)).await?;
        decode_list(value, "invoices")
    }

    async fn list_payer_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>> {
        let value = self.get_json(&["payer", "invoices"], Some(query)).await?;
        decode_list(value, "invoices")
    }

    async fn create_invoice(&self, req: &CreateInvoiceRequest) -> Result<Invoice> {
        let value = self.post_json(&["invoices"], Some(req)).await?;
        decode_entity(value, "invoice")
    }

    async fn issue_invoice(&self, invoice_id: &str) -> Result<()> {
        self.post_json::<()>(&["invoices", invoice_id, "issue"], None)
            .await?;
        Ok(())
    }

    async fn send_invoice(&self, invoice_id: &str) -> Result<()> {
        self.post_json::<()>(&["invoices", invoice_id, "send"], None)
            .await?;
        Ok(())
    }

    async fn void_invoice(&self, invoice_id: &str, reason: Option<&str>) -> Result<()> {
        let body = json!({ "reason": reason });
        self.post_json(&["invoices", invoice_id, "void"], Some(&body))
            .await?;
        Ok(())
    }

    async fn dispute_invoice(&self, invoice_id: &str, reason: &str) -> Result<()> {
        let body = json!({ "reason": reason });
        self.post_json(&["invoices", invoice_id, "dispute"], Some(&body))
            .await?;
        Ok(())
    }

    async fn payer_dispute_invoice(&self, invoice_id: &str, reason: &str) -> Result<()> {
        let body = json!({ "reason": reason });
        self.post_json(&["payer", "invoices", invoice_id, "dispute"], Some(&body))
            .await?;
        Ok(())
    }

    async fn resolve_invoice_dispute(&self, invoice_id: &str, resolution: &str) -> Result<()> {
        let body = json!({ "resolution": resolution });
        self.post_json(&["invoices", invoice_id, "dispute", "resolve"], Some(&body))
            .await?;
        Ok(())
    }

    async fn record_invoice_payment(
        &self,
        invoice_id: &str,
        payment: &PaymentRequest,
    ) -> Result<()> {
        self.post_json(&["invoices", invoice_id, "payments"], Some(payment))
            .await?;
        Ok(())
    }

    async fn email_invoice(&self, invoice_id: &str, draft: &EmailDraft) -> Result<()> {
        self.post_json(&["invoices", invoice_id, "email"], Some(draft))
            .await?;
        Ok(())
    }

    async fn submit_factoring(&self, invoice_id: &str) -> Result<()> {
        self.post_json::<()>(&["invoices", invoice_id, "submit-factoring"], None)
            .await?;
        Ok(())
    }

    async fn invoice_pdf_context(&self, invoice_id: &str) -> Result<InvoicePdfContext> {
        self.get_json::<_, ()>(&["invoices", invoice_id, "pdf-context"], None)
            .await
    }

    async fn download_invoice_package_zip(&self, invoice_id: &str) -> Result<Vec<u8>> {
        self.get_bytes(&["invoices", invoice_id, "package.zip"]).await
    }

    async fn finance_summary(&self) -> Result<FinanceSummary> {
        self.get_json::<_, ()>(&["finance", "summary"], None).await
    }

    async fn finance_forecast(&self, horizon_days: u32) -> Result<FinanceForecast> {
        self.get_json(&["finance", "forecast"], Some(&[("days", horizon_days)]))
            .await
    }

    async fn eligible_loads(&self) -> Result<Vec<Load>> {
        let value = self
            .get_json::<_, ()>(&["finance", "eligible-loads"], None)
            .await?;
        decode_list(value, "loads")
    }
}
