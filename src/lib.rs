pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod service;

pub use client::{ApiClient, FinanceBackend, MessagingBackend};
pub use config::AppConfig;
pub use error::{FinanceError, Result};
pub use service::{InvoiceBoard, InvoiceForm, MessagingPanel};
