//! Scripted simulations
//!
//! A script is a TOML file with an optional `[ledger]` table and a list of
//! `[[step]]` tables, each tagged by `action`. Steps run in order against a
//! fresh ledger on a manual clock and an in-memory transfer gateway. Ledger
//! errors are recorded per step; they do not stop the run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use crowdfund_ledger::{
    CampaignLedger, FanoutSink, InMemoryTransferGateway, LedgerConfig, LedgerError, LedgerStats,
    ManualClock, MemorySink, NotificationSink, TracingSink, TransferError,
};
use crowdfund_types::{Campaign, CampaignId, IdentityRef, LedgerEvent, PayoutRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    /// Overrides the configuration file when present.
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    /// Clock origin; defaults to the wall clock at load time.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let script: Script = toml::from_str(contents).context("invalid simulation script")?;
        if let Some(config) = &script.ledger {
            config.validate()?;
        }
        for (index, step) in script.steps.iter().enumerate() {
            if let Step::Register {
                duration_secs: secs,
                ..
            }
            | Step::Advance { secs } = step
            {
                if seconds(*secs).is_err() {
                    anyhow::bail!("step {}: {}s is out of range", index, secs);
                }
            }
        }
        Ok(script)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Register {
        creator: String,
        title: String,
        #[serde(default)]
        description: String,
        goal: u64,
        duration_secs: i64,
    },
    Contribute {
        campaign: u64,
        contributor: String,
        amount: u64,
    },
    Advance {
        secs: i64,
    },
    Finalize {
        campaign: u64,
        caller: String,
    },
    ClaimRefund {
        campaign: u64,
        contributor: String,
    },
    Withdraw {
        campaign: u64,
        caller: String,
    },
    /// Make every following transfer fail until `restore_transfers`.
    FailTransfers {
        #[serde(default = "default_failure_reason")]
        reason: String,
    },
    /// Transfers settle but the caller sees a timeout, until `restore_transfers`.
    LoseReplies,
    RestoreTransfers,
}

fn seconds(secs: i64) -> Result<Duration, LedgerError> {
    Duration::try_seconds(secs).ok_or_else(|| LedgerError::InvalidDuration {
        reason: format!("{}s is out of range", secs),
    })
}

fn default_failure_reason() -> String {
    "simulated outage".to_string()
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Register { .. } => "register",
            Step::Contribute { .. } => "contribute",
            Step::Advance { .. } => "advance",
            Step::Finalize { .. } => "finalize",
            Step::ClaimRefund { .. } => "claim_refund",
            Step::Withdraw { .. } => "withdraw",
            Step::FailTransfers { .. } => "fail_transfers",
            Step::LoseReplies => "lose_replies",
            Step::RestoreTransfers => "restore_transfers",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub campaigns: Vec<Campaign>,
    /// Release and refund records of every campaign, settled or pending.
    pub payouts: Vec<PayoutRecord>,
    pub stats: LedgerStats,
    /// Funds delivered by the transfer gateway, per identity.
    pub balances: BTreeMap<String, u64>,
    pub events: Vec<LedgerEvent>,
}

impl SimulationReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|step| !step.ok).count()
    }
}

pub struct Simulation {
    ledger: CampaignLedger,
    clock: Arc<ManualClock>,
    gateway: Arc<InMemoryTransferGateway>,
    events: Arc<MemorySink>,
    identities: BTreeSet<IdentityRef>,
}

impl Simulation {
    /// `observer` additionally receives every event, e.g. a broadcast sink.
    pub fn new(
        config: LedgerConfig,
        start: DateTime<Utc>,
        observer: Option<Arc<dyn NotificationSink>>,
    ) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let gateway = Arc::new(InMemoryTransferGateway::new());
        let events = Arc::new(MemorySink::new());

        let mut sink = FanoutSink::new()
            .with(events.clone())
            .with(Arc::new(TracingSink));
        if let Some(observer) = observer {
            sink = sink.with(observer);
        }

        let ledger = CampaignLedger::new(config, gateway.clone())?
            .with_clock(clock.clone())
            .with_sink(Arc::new(sink));

        Ok(Self {
            ledger,
            clock,
            gateway,
            events,
            identities: BTreeSet::new(),
        })
    }

    pub async fn run(&mut self, steps: &[Step]) -> SimulationReport {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let outcome = match self.apply(step).await {
                Ok(detail) => {
                    debug!(step = index, action = step.action(), %detail, "Step applied");
                    StepOutcome {
                        index,
                        action: step.action(),
                        ok: true,
                        detail,
                        error_category: None,
                    }
                }
                Err(err) => {
                    warn!(step = index, action = step.action(), error = %err, "Step rejected");
                    StepOutcome {
                        index,
                        action: step.action(),
                        ok: false,
                        detail: err.to_string(),
                        error_category: Some(err.category().name()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        self.report(outcomes).await
    }

    async fn apply(&mut self, step: &Step) -> Result<String, LedgerError> {
        match step {
            Step::Register {
                creator,
                title,
                description,
                goal,
                duration_secs,
            } => {
                let creator = self.identity(creator);
                let id = self
                    .ledger
                    .register(
                        creator,
                        title.as_str(),
                        description.as_str(),
                        *goal,
                        seconds(*duration_secs)?,
                    )
                    .await?;
                Ok(format!("registered {}", id))
            }
            Step::Contribute {
                campaign,
                contributor,
                amount,
            } => {
                let contributor = self.identity(contributor);
                let receipt = self
                    .ledger
                    .contribute(CampaignId::new(*campaign), contributor, *amount)
                    .await?;
                Ok(format!(
                    "raised {} (entry {}), status {}",
                    receipt.raised_minor, receipt.contributor_total_minor, receipt.status
                ))
            }
            Step::Advance { secs } => {
                let now = self.clock.advance(seconds(*secs)?).ok_or_else(|| {
                    LedgerError::InvalidDuration {
                        reason: format!("advancing {}s leaves the clock range", secs),
                    }
                })?;
                Ok(format!("clock advanced {}s to {}", secs, now))
            }
            Step::Finalize { campaign, caller } => {
                let caller = self.identity(caller);
                let status = self
                    .ledger
                    .finalize(CampaignId::new(*campaign), &caller)
                    .await?;
                Ok(format!("finalized as {}", status))
            }
            Step::ClaimRefund {
                campaign,
                contributor,
            } => {
                let contributor = self.identity(contributor);
                let amount = self
                    .ledger
                    .claim_refund(CampaignId::new(*campaign), &contributor)
                    .await?;
                Ok(format!("refunded {}", amount))
            }
            Step::Withdraw { campaign, caller } => {
                let caller = self.identity(caller);
                let amount = self
                    .ledger
                    .withdraw(CampaignId::new(*campaign), &caller)
                    .await?;
                Ok(format!("withdrew {}", amount))
            }
            Step::FailTransfers { reason } => {
                self.gateway
                    .fail_with(TransferError::Unavailable(reason.clone()));
                Ok(format!("transfers failing: {}", reason))
            }
            Step::LoseReplies => {
                self.gateway.settle_then_fail_with(TransferError::Timeout);
                Ok("transfers settle without replying".to_string())
            }
            Step::RestoreTransfers => {
                self.gateway.clear_failure();
                Ok("transfers restored".to_string())
            }
        }
    }

    fn identity(&mut self, name: &str) -> IdentityRef {
        let identity = IdentityRef::new(name);
        self.identities.insert(identity.clone());
        identity
    }

    async fn report(&self, steps: Vec<StepOutcome>) -> SimulationReport {
        let mut campaigns = Vec::new();
        let mut payouts = Vec::new();
        for id in 1..=self.ledger.campaign_count() {
            let id = CampaignId::new(id);
            if let Ok(campaign) = self.ledger.campaign(id).await {
                campaigns.push(campaign);
            }
            if let Ok(records) = self.ledger.payouts(id).await {
                payouts.extend(records);
            }
        }
        let balances = self
            .identities
            .iter()
            .map(|identity| (identity.to_string(), self.gateway.balance_of(identity)))
            .filter(|(_, balance)| *balance > 0)
            .collect();

        SimulationReport {
            steps,
            campaigns,
            payouts,
            stats: self.ledger.stats().await,
            balances,
            events: self.events.events(),
        }
    }
}
