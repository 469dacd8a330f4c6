use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CampaignId, IdentityRef};

/// Observations published by the ledger for external indexing and UI.
///
/// Delivery is fire-and-forget; the ledger never reads these back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    CampaignRegistered {
        id: CampaignId,
        creator: IdentityRef,
        title: String,
        goal_minor: u64,
        deadline: DateTime<Utc>,
    },
    ContributionReceived {
        id: CampaignId,
        contributor: IdentityRef,
        amount_minor: u64,
    },
    CampaignSucceeded {
        id: CampaignId,
        total_raised_minor: u64,
    },
    CampaignFailed {
        id: CampaignId,
    },
    RefundIssued {
        id: CampaignId,
        contributor: IdentityRef,
        amount_minor: u64,
    },
    /// Success funds reached the creator.
    PayoutReleased {
        id: CampaignId,
        creator: IdentityRef,
        amount_minor: u64,
        reference: String,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CampaignRegistered { .. } => "campaign_registered",
            Self::ContributionReceived { .. } => "contribution_received",
            Self::CampaignSucceeded { .. } => "campaign_succeeded",
            Self::CampaignFailed { .. } => "campaign_failed",
            Self::RefundIssued { .. } => "refund_issued",
            Self::PayoutReleased { .. } => "payout_released",
        }
    }

    pub fn campaign_id(&self) -> CampaignId {
        match self {
            Self::CampaignRegistered { id, .. }
            | Self::ContributionReceived { id, .. }
            | Self::CampaignSucceeded { id, .. }
            | Self::CampaignFailed { id }
            | Self::RefundIssued { id, .. }
            | Self::PayoutReleased { id, .. } => *id,
        }
    }
}
