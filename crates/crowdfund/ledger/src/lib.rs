//! # crowdfund-ledger
//!
//! Authoritative escrow ledger for goal-based fundraising campaigns.
//!
//! A creator registers a campaign with a goal and a deadline. Contributors
//! add funds while it is open. The campaign resolves exactly once: to
//! `Succeeded` the moment the goal is reached, or to `Failed` when someone
//! finalizes it after the deadline with the goal unmet. Succeeded funds go
//! to the creator (immediately or via [`CampaignLedger::withdraw`]); failed
//! campaigns refund each contributor on request.
//!
//! Every outflow goes through a [`TransferGateway`] as a two-phase
//! [`PayoutRecord`](crowdfund_types::PayoutRecord): escrow is debited and the
//! record written before the transfer is attempted, and a failed transfer
//! leaves the record pending for retry under the same idempotency key.

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod transfer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerConfig, PayoutMode, TextPolicy};
pub use error::{ConfigError, ErrorCategory, LedgerError};
pub use ledger::{CampaignLedger, ContributionReceipt, LedgerStats};
pub use notify::{
    BroadcastSink, FanoutSink, MemorySink, NotificationSink, NullSink, TracingSink,
};
pub use transfer::{
    InMemoryTransferGateway, TransferError, TransferGateway, TransferReceipt, TransferRequest,
};
