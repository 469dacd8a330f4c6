use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crowdfund_types::{
    Campaign, CampaignId, CampaignStatus, IdentityRef, LedgerEvent, PayoutKind, PayoutRecord,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, PayoutMode};
use crate::error::{ConfigError, LedgerError};
use crate::notify::{NotificationSink, NullSink};
use crate::transfer::{TransferGateway, TransferReceipt, TransferRequest};

/// Outcome of an accepted contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionReceipt {
    pub campaign_id: CampaignId,
    pub contributor: IdentityRef,
    pub amount_minor: u64,
    /// The contributor's escrow entry after this contribution.
    pub contributor_total_minor: u64,
    pub raised_minor: u64,
    pub status: CampaignStatus,
}

/// Point-in-time counts across all campaigns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub campaigns: u64,
    pub open: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub pending_payouts: u64,
}

/// Everything the ledger holds for one campaign. Guarded by one lock.
struct CampaignSlot {
    campaign: Campaign,
    contributions: BTreeMap<IdentityRef, u64>,
    /// Latest refund record per contributor.
    refunds: BTreeMap<IdentityRef, PayoutRecord>,
}

impl CampaignSlot {
    fn new(campaign: Campaign) -> Self {
        Self {
            campaign,
            contributions: BTreeMap::new(),
            refunds: BTreeMap::new(),
        }
    }

    fn pending_payouts(&self) -> u64 {
        let release = self
            .campaign
            .release
            .as_ref()
            .map(|r| u64::from(!r.is_settled()))
            .unwrap_or(0);
        let refunds = self.refunds.values().filter(|r| !r.is_settled()).count() as u64;
        release + refunds
    }
}

#[derive(Default)]
struct Registry {
    campaigns: HashMap<CampaignId, Arc<Mutex<CampaignSlot>>>,
    by_creator: HashMap<IdentityRef, Vec<CampaignId>>,
    count: u64,
}

/// The campaign ledger.
///
/// Owns every campaign record and escrow entry. Each campaign sits behind its
/// own async mutex that is held for the whole check-transition-transfer-commit
/// sequence, so operations on one campaign are linearizable while different
/// campaigns proceed in parallel. The registry lock is only taken for lookups
/// and inserts and is never held across an await.
pub struct CampaignLedger {
    registry: RwLock<Registry>,
    clock: Arc<dyn Clock>,
    transfers: Arc<dyn TransferGateway>,
    sink: Arc<dyn NotificationSink>,
    config: LedgerConfig,
}

impl CampaignLedger {
    /// Create a ledger on the system clock with no notification sink.
    pub fn new(
        config: LedgerConfig,
        transfers: Arc<dyn TransferGateway>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            registry: RwLock::new(Registry::default()),
            clock: Arc::new(SystemClock),
            transfers,
            sink: Arc::new(NullSink),
            config,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ── Mutating operations ────────────────────────────────────────────

    /// Register a new campaign, open until `now + duration`.
    ///
    /// Never awaits; async so every mutating operation shares one calling
    /// convention.
    pub async fn register(
        &self,
        creator: IdentityRef,
        title: impl Into<String>,
        description: impl Into<String>,
        goal_minor: u64,
        duration: Duration,
    ) -> Result<CampaignId, LedgerError> {
        let title = title.into();
        let description = description.into();

        if goal_minor == 0 {
            return Err(LedgerError::InvalidGoal);
        }
        if duration <= Duration::zero() {
            return Err(LedgerError::InvalidDuration {
                reason: "duration must be positive".into(),
            });
        }
        if let Some(max) = self.config.max_duration() {
            if duration > max {
                return Err(LedgerError::InvalidDuration {
                    reason: format!(
                        "{}s exceeds limit {}s",
                        duration.num_seconds(),
                        max.num_seconds()
                    ),
                });
            }
        }
        self.config.text.check(&title, &description)?;

        let now = self.clock.now();
        let deadline = now
            .checked_add_signed(duration)
            .ok_or_else(|| LedgerError::InvalidDuration {
                reason: "deadline out of range".into(),
            })?;

        let campaign = {
            let mut registry = self.registry.write();
            registry.count += 1;
            let id = CampaignId::new(registry.count);
            let campaign = Campaign {
                id,
                creator: creator.clone(),
                title,
                description,
                goal_minor,
                created_at: now,
                deadline,
                raised_minor: 0,
                refunded_minor: 0,
                status: CampaignStatus::Open,
                resolved_at: None,
                release: None,
            };
            registry
                .campaigns
                .insert(id, Arc::new(Mutex::new(CampaignSlot::new(campaign.clone()))));
            registry.by_creator.entry(creator).or_default().push(id);
            campaign
        };

        info!(
            campaign_id = %campaign.id,
            creator = %campaign.creator,
            goal = campaign.goal_minor,
            deadline = %campaign.deadline,
            "Campaign registered"
        );
        self.sink.publish(&LedgerEvent::CampaignRegistered {
            id: campaign.id,
            creator: campaign.creator.clone(),
            title: campaign.title.clone(),
            goal_minor: campaign.goal_minor,
            deadline: campaign.deadline,
        });

        Ok(campaign.id)
    }

    /// Add `amount_minor` to the contributor's escrow entry.
    ///
    /// Reaching the goal resolves the campaign to `Succeeded` in the same step.
    /// In immediate mode the release transfer runs before anything is
    /// committed; if it definitely fails the contribution is not recorded
    /// either. A timed-out release commits with the release pending.
    pub async fn contribute(
        &self,
        id: CampaignId,
        contributor: IdentityRef,
        amount_minor: u64,
    ) -> Result<ContributionReceipt, LedgerError> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock().await;
        let now = self.clock.now();

        let current = &slot.campaign;
        if !current.accepts_contributions_at(now) {
            return Err(if current.is_open() {
                LedgerError::CampaignExpired {
                    id,
                    deadline: current.deadline,
                }
            } else {
                LedgerError::CampaignClosed {
                    id,
                    status: current.status,
                }
            });
        }
        if amount_minor == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let raised = current
            .raised_minor
            .checked_add(amount_minor)
            .ok_or(LedgerError::AmountOverflow(id))?;
        let entry = slot
            .contributions
            .get(&contributor)
            .copied()
            .unwrap_or(0)
            .checked_add(amount_minor)
            .ok_or(LedgerError::AmountOverflow(id))?;

        let mut next = current.clone();
        next.raised_minor = raised;
        let mut events = vec![LedgerEvent::ContributionReceived {
            id,
            contributor: contributor.clone(),
            amount_minor,
        }];

        if next.goal_reached() {
            self.resolve_success(&mut next, now, &mut events).await?;
        }

        slot.campaign = next;
        slot.contributions.insert(contributor.clone(), entry);

        debug!(
            campaign_id = %id,
            contributor = %contributor,
            amount = amount_minor,
            raised = raised,
            "Contribution accepted"
        );
        self.emit(&events);

        Ok(ContributionReceipt {
            campaign_id: id,
            contributor,
            amount_minor,
            contributor_total_minor: entry,
            raised_minor: raised,
            status: slot.campaign.status,
        })
    }

    /// Resolve an expired, still-open campaign. Anyone may call this.
    pub async fn finalize(
        &self,
        id: CampaignId,
        caller: &IdentityRef,
    ) -> Result<CampaignStatus, LedgerError> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock().await;
        let now = self.clock.now();

        let current = &slot.campaign;
        if current.is_terminal() {
            return Err(LedgerError::CampaignAlreadyFinalized {
                id,
                status: current.status,
            });
        }
        if now < current.deadline {
            return Err(LedgerError::CampaignNotYetExpired {
                id,
                deadline: current.deadline,
            });
        }

        let mut next = current.clone();
        let mut events = Vec::new();
        if next.goal_reached() {
            self.resolve_success(&mut next, now, &mut events).await?;
        } else {
            next.status = CampaignStatus::Failed;
            next.resolved_at = Some(now);
            events.push(LedgerEvent::CampaignFailed { id });
            info!(
                campaign_id = %id,
                raised = next.raised_minor,
                goal = next.goal_minor,
                caller = %caller,
                "Campaign failed"
            );
        }

        let status = next.status;
        slot.campaign = next;
        self.emit(&events);
        Ok(status)
    }

    /// Return a contributor's escrow entry from a failed campaign.
    ///
    /// Phase one zeroes the entry and records a pending refund with the exact
    /// amount; phase two invokes the transfer. A failed transfer leaves the
    /// pending record in place and the next call retries it.
    pub async fn claim_refund(
        &self,
        id: CampaignId,
        contributor: &IdentityRef,
    ) -> Result<u64, LedgerError> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock().await;
        let now = self.clock.now();

        if slot.campaign.status != CampaignStatus::Failed {
            return Err(LedgerError::CampaignNotFailed {
                id,
                status: slot.campaign.status,
            });
        }

        let retry = slot
            .refunds
            .get(contributor)
            .filter(|record| !record.is_settled())
            .cloned();
        let mut record = match retry {
            Some(pending) => pending,
            None => {
                let amount = slot.contributions.get(contributor).copied().unwrap_or(0);
                if amount == 0 {
                    return Err(LedgerError::NothingToRefund {
                        id,
                        contributor: contributor.clone(),
                    });
                }
                let record = PayoutRecord::pending(
                    id,
                    contributor.clone(),
                    amount,
                    PayoutKind::Refund,
                    now,
                );
                slot.contributions.insert(contributor.clone(), 0);
                slot.refunds.insert(contributor.clone(), record.clone());
                record
            }
        };

        let outcome = self.execute_payout(&mut record).await;
        let amount = record.amount_minor;
        slot.refunds.insert(contributor.clone(), record);
        outcome?;

        slot.campaign.refunded_minor = slot.campaign.refunded_minor.saturating_add(amount);
        info!(
            campaign_id = %id,
            contributor = %contributor,
            amount = amount,
            "Refund issued"
        );
        self.sink.publish(&LedgerEvent::RefundIssued {
            id,
            contributor: contributor.clone(),
            amount_minor: amount,
        });
        Ok(amount)
    }

    /// Release a succeeded campaign's funds to its creator, at most once.
    ///
    /// The releasable amount was fixed in a pending record when the campaign
    /// succeeded; a failed transfer leaves that record pending for retry. In
    /// immediate mode there is only something to withdraw when the release
    /// at transition time timed out.
    pub async fn withdraw(&self, id: CampaignId, caller: &IdentityRef) -> Result<u64, LedgerError> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock().await;

        if &slot.campaign.creator != caller {
            return Err(LedgerError::NotCreator {
                id,
                caller: caller.clone(),
            });
        }
        if slot.campaign.status != CampaignStatus::Succeeded {
            return Err(LedgerError::CampaignNotSucceeded {
                id,
                status: slot.campaign.status,
            });
        }

        let mut record = match &slot.campaign.release {
            Some(release) if !release.is_settled() => release.clone(),
            _ => return Err(LedgerError::AlreadyWithdrawn(id)),
        };

        let outcome = self.execute_payout(&mut record).await;
        let amount = record.amount_minor;
        slot.campaign.release = Some(record);
        let receipt = outcome?;

        info!(campaign_id = %id, amount = amount, "Campaign funds withdrawn");
        self.sink.publish(&LedgerEvent::PayoutReleased {
            id,
            creator: caller.clone(),
            amount_minor: amount,
            reference: receipt.reference,
        });
        Ok(amount)
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub async fn campaign(&self, id: CampaignId) -> Result<Campaign, LedgerError> {
        let slot = self.slot(id)?;
        let slot = slot.lock().await;
        Ok(slot.campaign.clone())
    }

    /// Ids registered by `creator`, oldest first.
    pub fn campaigns_by_creator(&self, creator: &IdentityRef) -> Vec<CampaignId> {
        self.registry
            .read()
            .by_creator
            .get(creator)
            .cloned()
            .unwrap_or_default()
    }

    pub fn campaign_count(&self) -> u64 {
        self.registry.read().count
    }

    pub async fn contribution_of(
        &self,
        id: CampaignId,
        contributor: &IdentityRef,
    ) -> Result<u64, LedgerError> {
        let slot = self.slot(id)?;
        let slot = slot.lock().await;
        Ok(slot.contributions.get(contributor).copied().unwrap_or(0))
    }

    pub async fn contributions(
        &self,
        id: CampaignId,
    ) -> Result<BTreeMap<IdentityRef, u64>, LedgerError> {
        let slot = self.slot(id)?;
        let slot = slot.lock().await;
        Ok(slot.contributions.clone())
    }

    /// Release record (if any) followed by refund records.
    pub async fn payouts(&self, id: CampaignId) -> Result<Vec<PayoutRecord>, LedgerError> {
        let slot = self.slot(id)?;
        let slot = slot.lock().await;
        Ok(slot
            .campaign
            .release
            .iter()
            .chain(slot.refunds.values())
            .cloned()
            .collect())
    }

    pub async fn stats(&self) -> LedgerStats {
        let slots: Vec<_> = self.registry.read().campaigns.values().cloned().collect();
        let mut stats = LedgerStats::default();
        for slot in slots {
            let slot = slot.lock().await;
            stats.campaigns += 1;
            match slot.campaign.status {
                CampaignStatus::Open => stats.open += 1,
                CampaignStatus::Succeeded => stats.succeeded += 1,
                CampaignStatus::Failed => stats.failed += 1,
            }
            stats.pending_payouts += slot.pending_payouts();
        }
        stats
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn slot(&self, id: CampaignId) -> Result<Arc<Mutex<CampaignSlot>>, LedgerError> {
        self.registry
            .read()
            .campaigns
            .get(&id)
            .cloned()
            .ok_or(LedgerError::CampaignNotFound(id))
    }

    /// Transition `campaign` (a working copy) to `Succeeded` and fix its release.
    ///
    /// In immediate mode the transfer runs here. A definite transfer failure
    /// is returned and the caller discards the working copy. An ambiguous one
    /// (the value may have moved) commits the transition with the release
    /// left pending under its payout id, for `withdraw` to retry.
    async fn resolve_success(
        &self,
        campaign: &mut Campaign,
        now: DateTime<Utc>,
        events: &mut Vec<LedgerEvent>,
    ) -> Result<(), LedgerError> {
        let mut release = PayoutRecord::pending(
            campaign.id,
            campaign.creator.clone(),
            campaign.raised_minor,
            PayoutKind::Release,
            now,
        );

        let settled = match self.config.payout_mode {
            PayoutMode::Immediate => match self.execute_payout(&mut release).await {
                Ok(receipt) => Some(receipt),
                Err(LedgerError::Transfer(err)) if err.is_ambiguous() => {
                    warn!(
                        campaign_id = %campaign.id,
                        payout_id = %release.payout_id,
                        amount = release.amount_minor,
                        "Release outcome unknown, left pending for withdraw"
                    );
                    None
                }
                Err(err) => return Err(err),
            },
            PayoutMode::Deferred => None,
        };

        campaign.status = CampaignStatus::Succeeded;
        campaign.resolved_at = Some(now);
        campaign.release = Some(release);
        events.push(LedgerEvent::CampaignSucceeded {
            id: campaign.id,
            total_raised_minor: campaign.raised_minor,
        });
        if let Some(receipt) = settled {
            events.push(LedgerEvent::PayoutReleased {
                id: campaign.id,
                creator: campaign.creator.clone(),
                amount_minor: campaign.raised_minor,
                reference: receipt.reference,
            });
        }

        info!(
            campaign_id = %campaign.id,
            raised = campaign.raised_minor,
            goal = campaign.goal_minor,
            mode = ?self.config.payout_mode,
            "Campaign succeeded"
        );
        Ok(())
    }

    async fn execute_payout(
        &self,
        record: &mut PayoutRecord,
    ) -> Result<TransferReceipt, LedgerError> {
        let request = TransferRequest::from(&*record);
        match self.transfers.transfer(&request).await {
            Ok(receipt) => {
                record.settle(receipt.reference.clone(), receipt.completed_at);
                debug!(
                    payout_id = %record.payout_id,
                    campaign_id = %record.campaign_id,
                    kind = record.kind.name(),
                    amount = record.amount_minor,
                    reference = %receipt.reference,
                    "Payout settled"
                );
                Ok(receipt)
            }
            Err(err) => {
                record.record_failure(err.to_string());
                warn!(
                    payout_id = %record.payout_id,
                    campaign_id = %record.campaign_id,
                    kind = record.kind.name(),
                    amount = record.amount_minor,
                    attempts = record.attempts(),
                    error = %err,
                    "Payout transfer failed"
                );
                Err(err.into())
            }
        }
    }

    fn emit(&self, events: &[LedgerEvent]) {
        for event in events {
            self.sink.publish(event);
        }
    }
}
