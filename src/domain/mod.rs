//! Pure payment state machine: no I/O, no database, no network. Each
//! rule takes the current persisted state plus one event and returns the
//! new state and whatever outbox records must be committed alongside it
//! in the same transaction.

pub mod confirmation_rule;
pub mod credit_rule;
pub mod expiry_rule;
pub mod intent;
pub mod invoice;
pub mod outbox_record;
pub mod transfer;

pub use confirmation_rule::{check_confirmations, ConfirmationOutcome, FundingTransfer};
pub use credit_rule::{apply_credit, rebind_target, CreditOutcome};
pub use expiry_rule::{expire, ExpiryOutcome};
pub use intent::{IntentStatus, PaymentIntent};
pub use invoice::{AllowedOption, Invoice, InvoiceStatus};
pub use outbox_record::OutboxKind;
pub use transfer::{effective_confirmations, NormalizedTransferEvent, Transfer};
