use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use crowdfund_ledger::{
    CampaignLedger, LedgerConfig, LedgerError, ManualClock, MemorySink, TransferError,
    TransferGateway, TransferReceipt, TransferRequest,
};
use crowdfund_types::{CampaignStatus, IdentityRef};

/// Gateway that yields mid-transfer so contending tasks get scheduled while
/// the campaign lock is held.
#[derive(Default)]
struct SlowGateway {
    calls: AtomicU64,
    moved: AtomicU64,
}

#[async_trait]
impl TransferGateway for SlowGateway {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.moved.fetch_add(request.amount_minor, Ordering::SeqCst);
        Ok(TransferReceipt {
            reference: format!("slow-{}", request.payout_id),
            completed_at: Utc::now(),
        })
    }
}

fn ledger(gateway: Arc<SlowGateway>, sink: Arc<MemorySink>) -> Arc<CampaignLedger> {
    Arc::new(
        CampaignLedger::new(LedgerConfig::default(), gateway)
            .expect("valid config")
            .with_clock(Arc::new(ManualClock::starting_now()))
            .with_sink(sink),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_contributions_resolve_success_exactly_once() {
    let gateway = Arc::new(SlowGateway::default());
    let sink = Arc::new(MemorySink::new());
    let ledger = ledger(gateway.clone(), sink.clone());
    let cid = ledger
        .register(
            IdentityRef::new("creator"),
            "Shared kiln",
            "",
            100,
            Duration::hours(1),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .contribute(cid, IdentityRef::new(format!("backer-{i}")), 10)
                .await
        }));
    }

    let mut accepted = 0u64;
    let mut closed = 0u64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(LedgerError::CampaignClosed { .. }) => closed += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 10);
    assert_eq!(closed, 6);
    assert_eq!(sink.count_of("campaign_succeeded"), 1);
    assert_eq!(sink.count_of("payout_released"), 1);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.moved.load(Ordering::SeqCst), 100);

    let campaign = ledger.campaign(cid).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Succeeded);
    assert_eq!(campaign.raised_minor, 100);
    let entries: u64 = ledger.contributions(cid).await.unwrap().values().sum();
    assert_eq!(entries, campaign.raised_minor);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_campaigns_progress_in_parallel() {
    let gateway = Arc::new(SlowGateway::default());
    let sink = Arc::new(MemorySink::new());
    let ledger = ledger(gateway.clone(), sink.clone());

    let mut ids = Vec::new();
    for n in 0..8u64 {
        let cid = ledger
            .register(
                IdentityRef::new(format!("creator-{n}")),
                format!("Project {n}"),
                "",
                50,
                Duration::hours(1),
            )
            .await
            .unwrap();
        ids.push(cid);
    }

    let mut handles = Vec::new();
    for cid in ids.clone() {
        for backer in 0..5 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .contribute(cid, IdentityRef::new(format!("b{backer}")), 10)
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = ledger.stats().await;
    assert_eq!(stats.campaigns, 8);
    assert_eq!(stats.succeeded, 8);
    assert_eq!(stats.pending_payouts, 0);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 8);
    assert_eq!(gateway.moved.load(Ordering::SeqCst), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refund_claims_pay_once() {
    let gateway = Arc::new(SlowGateway::default());
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::starting_now());
    let ledger = Arc::new(
        CampaignLedger::new(LedgerConfig::default(), gateway.clone())
            .unwrap()
            .with_clock(clock.clone())
            .with_sink(sink.clone()),
    );
    let backer = IdentityRef::new("backer");
    let cid = ledger
        .register(IdentityRef::new("creator"), "Bridge", "", 1_000, Duration::seconds(5))
        .await
        .unwrap();
    ledger.contribute(cid, backer.clone(), 70).await.unwrap();
    clock.advance(Duration::seconds(5));
    ledger.finalize(cid, &backer).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let ledger = ledger.clone();
        let backer = backer.clone();
        handles.push(tokio::spawn(async move {
            ledger.claim_refund(cid, &backer).await
        }));
    }
    let mut paid = 0u64;
    for handle in handles {
        if let Ok(amount) = handle.await.unwrap() {
            paid += amount;
        }
    }

    assert_eq!(paid, 70);
    assert_eq!(gateway.moved.load(Ordering::SeqCst), 70);
    assert_eq!(sink.count_of("refund_issued"), 1);
}
