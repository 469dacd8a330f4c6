use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{CampaignId, IdentityRef};

/// Direction of an escrow outflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Raised funds released to the campaign creator.
    Release,
    /// A contributor's escrow entry returned after failure.
    Refund,
}

impl PayoutKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Refund => "refund",
        }
    }
}

/// Settlement progress of a payout record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PayoutState {
    Pending {
        attempts: u32,
        last_error: Option<String>,
    },
    Settled {
        reference: String,
        settled_at: DateTime<Utc>,
    },
}

/// Two-phase outflow record.
///
/// Amount and recipient are fixed when the record is created, before the
/// transfer is attempted. Retries reuse the same `payout_id` and amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub payout_id: Uuid,
    pub campaign_id: CampaignId,
    pub recipient: IdentityRef,
    pub amount_minor: u64,
    pub kind: PayoutKind,
    pub state: PayoutState,
    pub created_at: DateTime<Utc>,
}

impl PayoutRecord {
    pub fn pending(
        campaign_id: CampaignId,
        recipient: IdentityRef,
        amount_minor: u64,
        kind: PayoutKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            payout_id: Uuid::new_v4(),
            campaign_id,
            recipient,
            amount_minor,
            kind,
            state: PayoutState::Pending {
                attempts: 0,
                last_error: None,
            },
            created_at,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, PayoutState::Settled { .. })
    }

    pub fn attempts(&self) -> u32 {
        match &self.state {
            PayoutState::Pending { attempts, .. } => *attempts,
            PayoutState::Settled { .. } => 0,
        }
    }

    /// Count a failed transfer attempt. Settled records are left untouched.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        if let PayoutState::Pending {
            attempts,
            last_error,
        } = &mut self.state
        {
            *attempts += 1;
            *last_error = Some(error.into());
        }
    }

    pub fn settle(&mut self, reference: impl Into<String>, settled_at: DateTime<Utc>) {
        self.state = PayoutState::Settled {
            reference: reference.into(),
            settled_at,
        };
    }

    pub fn reference(&self) -> Option<&str> {
        match &self.state {
            PayoutState::Settled { reference, .. } => Some(reference),
            PayoutState::Pending { .. } => None,
        }
    }
}
