pub mod board;
pub mod detail;
pub mod export;
pub mod form;
pub mod messaging;
pub mod prompt;
pub mod tasks;

pub use board::{
    BoardAction, BoardFilter, BoardState, EmailOutcome, FactoringFilter, InvoiceBoard,
    PartyFilter, SortDirection, SortKey, StatusFilter,
};
pub use detail::InvoiceDetail;
pub use form::{FormTotals, InvoiceForm, SubmitMode, SubmitOutcome};
pub use messaging::{MessagingPanel, PanelState};
pub use prompt::{AssumeNo, AssumeYes, Confirm, ConfirmWith};
pub use tasks::TaskRegistry;
