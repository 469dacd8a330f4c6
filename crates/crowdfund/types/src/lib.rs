//! # crowdfund-types
//!
//! Value types shared by the crowdfund campaign ledger:
//!
//! - [`CampaignId`] / [`IdentityRef`] -- campaign handles and opaque party identities
//! - [`Campaign`] / [`CampaignStatus`] -- the campaign record and its lifecycle
//! - [`PayoutRecord`] -- two-phase record for every outflow from escrow
//! - [`LedgerEvent`] -- notifications emitted for external indexers
//!
//! Amounts are unsigned minor units (`*_minor`). Nothing in this crate mutates
//! ledger state; the ledger crate owns all transitions.

#![deny(unsafe_code)]

pub mod campaign;
pub mod event;
pub mod ids;
pub mod payout;

pub use campaign::{Campaign, CampaignStatus};
pub use event::LedgerEvent;
pub use ids::{CampaignId, IdentityRef};
pub use payout::{PayoutKind, PayoutRecord, PayoutState};
