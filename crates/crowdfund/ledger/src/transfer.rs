use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crowdfund_types::{CampaignId, IdentityRef, PayoutKind, PayoutRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the external transfer layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer rejected: {reason}")]
    Rejected { reason: String },

    #[error("transfer rail unavailable: {0}")]
    Unavailable(String),

    #[error("transfer timed out")]
    Timeout,
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }

    /// The rail may or may not have moved the value.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Instruction handed to the transfer layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Idempotency key. Retries of one payout always carry the same id.
    pub payout_id: Uuid,
    pub campaign_id: CampaignId,
    pub destination: IdentityRef,
    pub amount_minor: u64,
    pub kind: PayoutKind,
}

impl From<&PayoutRecord> for TransferRequest {
    fn from(record: &PayoutRecord) -> Self {
        Self {
            payout_id: record.payout_id,
            campaign_id: record.campaign_id,
            destination: record.recipient.clone(),
            amount_minor: record.amount_minor,
            kind: record.kind,
        }
    }
}

/// Proof that value left escrow, or was durably queued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
    pub completed_at: DateTime<Utc>,
}

/// Funds-transfer capability used to move value out of escrow.
///
/// The ledger calls this while holding the campaign lock and treats it as a
/// blocking, possibly failing boundary.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError>;
}

/// In-memory transfer layer for tests, simulation and embedding.
///
/// Credits per-identity balances and deduplicates on `payout_id`.
#[derive(Default)]
pub struct InMemoryTransferGateway {
    state: Mutex<GatewayState>,
}

#[derive(Default)]
struct GatewayState {
    balances: HashMap<IdentityRef, u64>,
    processed: HashMap<Uuid, TransferReceipt>,
    failure: Option<Failure>,
    attempts: u64,
}

#[derive(Clone)]
enum Failure {
    /// Nothing moves.
    Refuse(TransferError),
    /// Value moves and the payout id is recorded, but the caller sees an error.
    LoseReply(TransferError),
}

impl InMemoryTransferGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent transfer with `error` until cleared.
    pub fn fail_with(&self, error: TransferError) {
        self.state.lock().failure = Some(Failure::Refuse(error));
    }

    /// Settle every subsequent new transfer but report `error` to the caller,
    /// until cleared. Retries of a settled payout id still return its receipt.
    pub fn settle_then_fail_with(&self, error: TransferError) {
        self.state.lock().failure = Some(Failure::LoseReply(error));
    }

    pub fn clear_failure(&self) {
        self.state.lock().failure = None;
    }

    pub fn balance_of(&self, identity: &IdentityRef) -> u64 {
        self.state
            .lock()
            .balances
            .get(identity)
            .copied()
            .unwrap_or(0)
    }

    /// Distinct payouts that actually moved value.
    pub fn settled_count(&self) -> usize {
        self.state.lock().processed.len()
    }

    /// Every call, including failed and duplicate ones.
    pub fn attempt_count(&self) -> u64 {
        self.state.lock().attempts
    }
}

#[async_trait]
impl TransferGateway for InMemoryTransferGateway {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        let mut state = self.state.lock();
        state.attempts += 1;

        if let Some(receipt) = state.processed.get(&request.payout_id) {
            return Ok(receipt.clone());
        }
        let lost_reply = match state.failure.clone() {
            Some(Failure::Refuse(error)) => return Err(error),
            Some(Failure::LoseReply(error)) => Some(error),
            None => None,
        };

        let balance = state
            .balances
            .entry(request.destination.clone())
            .or_insert(0);
        *balance = balance
            .checked_add(request.amount_minor)
            .ok_or_else(|| TransferError::Rejected {
                reason: format!("balance overflow for {}", request.destination),
            })?;

        let receipt = TransferReceipt {
            reference: format!("mem-{}", request.payout_id.simple()),
            completed_at: Utc::now(),
        };
        state.processed.insert(request.payout_id, receipt.clone());
        match lost_reply {
            Some(error) => Err(error),
            None => Ok(receipt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: u64) -> TransferRequest {
        TransferRequest {
            payout_id: Uuid::new_v4(),
            campaign_id: CampaignId::new(1),
            destination: IdentityRef::new("creator"),
            amount_minor: amount,
            kind: PayoutKind::Release,
        }
    }

    #[tokio::test]
    async fn credits_destination() {
        let gateway = InMemoryTransferGateway::new();
        gateway.transfer(&request(110)).await.unwrap();
        assert_eq!(gateway.balance_of(&IdentityRef::new("creator")), 110);
        assert_eq!(gateway.settled_count(), 1);
    }

    #[tokio::test]
    async fn repeated_payout_id_is_not_credited_twice() {
        let gateway = InMemoryTransferGateway::new();
        let req = request(40);
        let first = gateway.transfer(&req).await.unwrap();
        let second = gateway.transfer(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.balance_of(&IdentityRef::new("creator")), 40);
        assert_eq!(gateway.attempt_count(), 2);
    }

    #[tokio::test]
    async fn injected_failure_moves_nothing() {
        let gateway = InMemoryTransferGateway::new();
        gateway.fail_with(TransferError::Timeout);
        let err = gateway.transfer(&request(10)).await.unwrap_err();
        assert_eq!(err, TransferError::Timeout);
        assert_eq!(gateway.balance_of(&IdentityRef::new("creator")), 0);

        gateway.clear_failure();
        assert!(gateway.transfer(&request(10)).await.is_ok());
    }

    #[tokio::test]
    async fn lost_reply_moves_value_once() {
        let gateway = InMemoryTransferGateway::new();
        gateway.settle_then_fail_with(TransferError::Timeout);
        let req = request(25);

        let err = gateway.transfer(&req).await.unwrap_err();
        assert!(err.is_ambiguous());
        assert_eq!(gateway.balance_of(&IdentityRef::new("creator")), 25);

        // Same payout id: the stored receipt comes back, nothing is credited.
        assert!(gateway.transfer(&req).await.is_ok());
        assert_eq!(gateway.balance_of(&IdentityRef::new("creator")), 25);
        assert_eq!(gateway.settled_count(), 1);
    }

    #[test]
    fn only_timeouts_are_ambiguous() {
        assert!(TransferError::Timeout.is_ambiguous());
        assert!(!TransferError::Unavailable("down".into()).is_ambiguous());
        assert!(!TransferError::Rejected { reason: "closed".into() }.is_ambiguous());
    }
}
