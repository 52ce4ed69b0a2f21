pub mod finance;
pub mod invoice;
pub mod load;
pub mod message;
pub mod money;
pub mod status;

pub use finance::{FinanceForecast, FinanceSummary, ForecastBucket};
pub use invoice::{
    Attachment, AuditEntry, BillTo, Charges, CreateInvoiceRequest, EmailDraft, Invoice,
    InvoiceMetadata, InvoicePdfContext, LineItem, PartyInfo, PaymentRequest,
};
pub use load::Load;
pub use message::{Message, NewMessage, Thread, UnreadSummary};
pub use money::{format_amount, format_currency, parse_amount};
pub use status::{InvoiceAction, InvoiceStatus, Role, Transition};
