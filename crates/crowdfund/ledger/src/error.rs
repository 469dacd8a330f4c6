use chrono::{DateTime, Utc};
use crowdfund_types::{CampaignId, CampaignStatus, IdentityRef};
use thiserror::Error;

use crate::transfer::TransferError;

/// Errors returned by ledger operations.
///
/// Everything except [`LedgerError::Transfer`] is raised before any state is
/// touched, so a rejected call has no observable effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // --- not found ---
    #[error("campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    // --- registration preconditions ---
    #[error("campaign goal must be greater than zero")]
    InvalidGoal,

    #[error("invalid campaign duration: {reason}")]
    InvalidDuration { reason: String },

    #[error("invalid campaign title: {reason}")]
    InvalidTitle { reason: String },

    #[error("invalid campaign description: {reason}")]
    InvalidDescription { reason: String },

    // --- lifecycle preconditions ---
    #[error("contribution amount must be greater than zero")]
    ZeroAmount,

    #[error("{id} is closed ({status})")]
    CampaignClosed { id: CampaignId, status: CampaignStatus },

    #[error("{id} expired at {deadline}")]
    CampaignExpired {
        id: CampaignId,
        deadline: DateTime<Utc>,
    },

    #[error("{id} cannot be finalized before {deadline}")]
    CampaignNotYetExpired {
        id: CampaignId,
        deadline: DateTime<Utc>,
    },

    #[error("{id} already finalized ({status})")]
    CampaignAlreadyFinalized { id: CampaignId, status: CampaignStatus },

    #[error("{id} has not failed ({status}); refunds unavailable")]
    CampaignNotFailed { id: CampaignId, status: CampaignStatus },

    #[error("nothing to refund for {contributor} on {id}")]
    NothingToRefund {
        id: CampaignId,
        contributor: IdentityRef,
    },

    #[error("{caller} is not the creator of {id}")]
    NotCreator { id: CampaignId, caller: IdentityRef },

    #[error("{id} has not succeeded ({status}); nothing to withdraw")]
    CampaignNotSucceeded { id: CampaignId, status: CampaignStatus },

    #[error("funds for {0} were already released")]
    AlreadyWithdrawn(CampaignId),

    // --- arithmetic ---
    #[error("amount overflow on {0}")]
    AmountOverflow(CampaignId),

    // --- boundary ---
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

/// Coarse error taxonomy for callers and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Precondition,
    Arithmetic,
    Transfer,
}

impl ErrorCategory {
    pub fn name(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Precondition => "precondition",
            Self::Arithmetic => "arithmetic",
            Self::Transfer => "transfer",
        }
    }
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CampaignNotFound(_) => ErrorCategory::NotFound,
            Self::AmountOverflow(_) => ErrorCategory::Arithmetic,
            Self::Transfer(_) => ErrorCategory::Transfer,
            _ => ErrorCategory::Precondition,
        }
    }

    /// True when repeating the same call may succeed without any other change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transfer(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
