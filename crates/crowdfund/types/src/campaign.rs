use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CampaignId, IdentityRef};
use crate::payout::PayoutRecord;

/// Campaign lifecycle. `Succeeded` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Open,
    Succeeded,
    Failed,
}

impl CampaignStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single fundraising unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub creator: IdentityRef,
    pub title: String,
    pub description: String,
    pub goal_minor: u64,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Sum of every contribution ever accepted. Refunds do not decrement it.
    pub raised_minor: u64,
    pub refunded_minor: u64,
    pub status: CampaignStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Success payout to the creator, present once the campaign succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<PayoutRecord>,
}

impl Campaign {
    pub fn is_open(&self) -> bool {
        self.status == CampaignStatus::Open
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn goal_reached(&self) -> bool {
        self.raised_minor >= self.goal_minor
    }

    /// Whether contributions are still accepted at `now`.
    pub fn accepts_contributions_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now < self.deadline
    }

    pub fn released_minor(&self) -> u64 {
        self.release
            .as_ref()
            .filter(|release| release.is_settled())
            .map(|release| release.amount_minor)
            .unwrap_or(0)
    }

    /// Funds the ledger still holds for this campaign.
    pub fn escrow_minor(&self) -> u64 {
        self.raised_minor
            .saturating_sub(self.refunded_minor)
            .saturating_sub(self.released_minor())
    }
}
