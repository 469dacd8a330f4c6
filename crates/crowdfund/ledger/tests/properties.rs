use std::sync::Arc;

use chrono::Duration;
use crowdfund_ledger::{
    CampaignLedger, InMemoryTransferGateway, LedgerConfig, LedgerError, ManualClock, MemorySink,
    TransferError,
};
use crowdfund_types::{Campaign, CampaignStatus, IdentityRef, PayoutKind};
use proptest::prelude::*;

const BACKERS: u8 = 4;

#[derive(Debug, Clone)]
enum Op {
    Contribute { who: u8, amount: u64 },
    Advance(i64),
    Finalize,
    Refund { who: u8 },
    Withdraw,
    /// Transfers fail and nothing moves.
    Outage,
    /// Transfers move value but the ledger sees a timeout.
    LostReplies,
    Restore,
}

fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            6 => (0u8..BACKERS, 0u64..60).prop_map(|(who, amount)| Op::Contribute { who, amount }),
            1 => (1i64..8).prop_map(Op::Advance),
            1 => Just(Op::Finalize),
            2 => (0u8..BACKERS).prop_map(|who| Op::Refund { who }),
            1 => Just(Op::Withdraw),
            1 => Just(Op::Outage),
            1 => Just(Op::LostReplies),
            1 => Just(Op::Restore),
        ],
        0..48,
    )
}

fn backer(who: u8) -> IdentityRef {
    IdentityRef::new(format!("backer-{who}"))
}

struct Fixture {
    ledger: CampaignLedger,
    clock: Arc<ManualClock>,
    gateway: Arc<InMemoryTransferGateway>,
    sink: Arc<MemorySink>,
    creator: IdentityRef,
}

impl Fixture {
    fn paid_out(&self) -> u64 {
        let backers: u64 = (0..BACKERS)
            .map(|who| self.gateway.balance_of(&backer(who)))
            .sum();
        backers + self.gateway.balance_of(&self.creator)
    }
}

/// Checks that hold after every operation, whether or not transfers fail.
async fn check_accounting(fx: &Fixture, campaign: &Campaign) {
    let id = campaign.id;
    let entries: u64 = fx.ledger.contributions(id).await.unwrap().values().sum();
    let pending_refunds: u64 = fx
        .ledger
        .payouts(id)
        .await
        .unwrap()
        .iter()
        .filter(|p| p.kind == PayoutKind::Refund && !p.is_settled())
        .map(|p| p.amount_minor)
        .sum();

    match campaign.status {
        CampaignStatus::Failed => assert_eq!(
            entries + campaign.refunded_minor + pending_refunds,
            campaign.raised_minor
        ),
        _ => assert_eq!(entries, campaign.raised_minor),
    }
    if campaign.status == CampaignStatus::Succeeded {
        assert_eq!(campaign.refunded_minor, 0);
    }

    // Nothing is ever paid twice. A payout whose reply was lost has moved
    // without settling, so the ledger may still count it as escrow.
    let paid = fx.paid_out();
    assert!(paid <= campaign.raised_minor, "paid {} of {}", paid, campaign.raised_minor);
    assert!(paid + campaign.escrow_minor() >= campaign.raised_minor);

    assert!(fx.sink.count_of("campaign_succeeded") + fx.sink.count_of("campaign_failed") <= 1);
    assert!(fx.sink.count_of("payout_released") <= 1);
}

proptest! {
    #[test]
    fn escrow_accounting_holds_for_any_sequence(
        ops in op_strategy(),
        goal in 1u64..200,
        deferred in any::<bool>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        rt.block_on(async move {
            let config = if deferred {
                LedgerConfig::deferred()
            } else {
                LedgerConfig::default()
            };
            let clock = Arc::new(ManualClock::starting_now());
            let gateway = Arc::new(InMemoryTransferGateway::new());
            let sink = Arc::new(MemorySink::new());
            let ledger = CampaignLedger::new(config, gateway.clone())
                .unwrap()
                .with_clock(clock.clone())
                .with_sink(sink.clone());
            let fx = Fixture {
                ledger,
                clock,
                gateway,
                sink,
                creator: IdentityRef::new("creator"),
            };
            let cid = fx
                .ledger
                .register(fx.creator.clone(), "Prop", "", goal, Duration::seconds(20))
                .await
                .unwrap();

            let mut last_status = CampaignStatus::Open;
            for op in ops {
                let result = match op {
                    Op::Contribute { who, amount } => fx
                        .ledger
                        .contribute(cid, backer(who), amount)
                        .await
                        .map(|_| ()),
                    Op::Advance(secs) => {
                        fx.clock.advance(Duration::seconds(secs));
                        Ok(())
                    }
                    Op::Finalize => fx.ledger.finalize(cid, &fx.creator).await.map(|_| ()),
                    Op::Refund { who } => {
                        fx.ledger.claim_refund(cid, &backer(who)).await.map(|_| ())
                    }
                    Op::Withdraw => fx.ledger.withdraw(cid, &fx.creator).await.map(|_| ()),
                    Op::Outage => {
                        fx.gateway.fail_with(TransferError::Unavailable("outage".into()));
                        Ok(())
                    }
                    Op::LostReplies => {
                        fx.gateway.settle_then_fail_with(TransferError::Timeout);
                        Ok(())
                    }
                    Op::Restore => {
                        fx.gateway.clear_failure();
                        Ok(())
                    }
                };
                if let Err(err) = result {
                    assert!(!matches!(err, LedgerError::AmountOverflow(_)));
                }

                let campaign = fx.ledger.campaign(cid).await.unwrap();
                if last_status.is_terminal() {
                    assert_eq!(campaign.status, last_status);
                }
                last_status = campaign.status;
                check_accounting(&fx, &campaign).await;
            }

            // Once the rail recovers, every pending payout settles exactly once.
            fx.gateway.clear_failure();
            match last_status {
                CampaignStatus::Succeeded => {
                    let _ = fx.ledger.withdraw(cid, &fx.creator).await;
                }
                CampaignStatus::Failed => {
                    for who in 0..BACKERS {
                        let _ = fx.ledger.claim_refund(cid, &backer(who)).await;
                    }
                }
                CampaignStatus::Open => {}
            }

            let campaign = fx.ledger.campaign(cid).await.unwrap();
            check_accounting(&fx, &campaign).await;
            assert_eq!(fx.paid_out() + campaign.escrow_minor(), campaign.raised_minor);
            assert_eq!(fx.ledger.stats().await.pending_payouts, 0);
            match campaign.status {
                CampaignStatus::Succeeded => {
                    assert_eq!(campaign.escrow_minor(), 0);
                    assert_eq!(fx.sink.count_of("payout_released"), 1);
                }
                CampaignStatus::Failed => {
                    assert_eq!(campaign.escrow_minor(), 0);
                    assert_eq!(campaign.refunded_minor, campaign.raised_minor);
                }
                CampaignStatus::Open => assert_eq!(fx.paid_out(), 0),
            }
        });
    }
}
