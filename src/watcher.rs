//! 👀 Address Watcher - polls one address for new incoming transfers
//!
//! Each cycle looks at the single newest signature for the address:
//! 1. Unseen signatures are marked seen *before* any processing, so a
//!    signature is attempted at most once even if fetching or delivery fails
//! 2. The transaction is fetched and its first transfer extracted
//! 3. A notification is delivered to the subscriber
//!
//! Only the newest signature is inspected, so several transactions landing
//! between two cycles produce one notification at most (the newest).
//! Every cycle ends with a jittered sleep to rate-limit the RPC node. The
//! loop only ends through its cancellation token.

use crate::extractor::extract_transfer;
use crate::ledger::Ledger;
use crate::notifier::NotificationSink;
use crate::seen_set::SeenSet;
use crate::types::{short_id, SubscriptionKey, TransferEvent};
use anyhow::{Context, Result};
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Base poll interval
pub const DEFAULT_POLL_BASE_MS: u64 = 5000;

/// Uniform jitter added on top of the base interval (exclusive upper bound)
pub const DEFAULT_POLL_JITTER_MS: u64 = 2000;

/// Sleep between cycles: `base + uniform[0, jitter)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub base: Duration,
    pub jitter: Duration,
}

impl PollSchedule {
    pub fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            jitter: Duration::from_millis(jitter_ms),
        }
    }

    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rng.gen_range(0..jitter_ms))
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_BASE_MS, DEFAULT_POLL_JITTER_MS)
    }
}

/// What one poll cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Node returned no signatures (or the call failed)
    NoSignatures,
    /// Newest signature was already handled by this watcher
    AlreadySeen,
    /// Transaction could not be fetched; it will not be retried
    TransactionUnavailable,
    /// Transaction has no usable transfer instruction
    NoTransfer,
    Notified(TransferEvent),
    /// Error caught at cycle level (delivery failure)
    Failed(String),
}

pub struct Watcher {
    key: SubscriptionKey,
    ledger: Arc<dyn Ledger>,
    sink: Arc<dyn NotificationSink>,
    seen: SeenSet,
    schedule: PollSchedule,
    rng: StdRng,
}

impl Watcher {
    pub fn new(
        key: SubscriptionKey,
        ledger: Arc<dyn Ledger>,
        sink: Arc<dyn NotificationSink>,
        seen: SeenSet,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            key,
            ledger,
            sink,
            seen,
            schedule,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Poll until `token` is cancelled. Cancellation is checked before each
    /// cycle and interrupts the sleep, but never an in-flight RPC call.
    pub async fn run(mut self, token: CancellationToken) {
        info!(
            "👀 Watching {} for subscriber {} (every {}ms + up to {}ms jitter)",
            self.key.address,
            self.key.subscriber,
            self.schedule.base.as_millis(),
            self.schedule.jitter.as_millis()
        );

        let mut cycles: u64 = 0;
        let mut notified: u64 = 0;

        while !token.is_cancelled() {
            if let CycleOutcome::Notified(_) = self.poll_once().await {
                notified += 1;
            }
            cycles += 1;

            let delay = self.schedule.next_delay(&mut self.rng);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!(
            "🛑 Stopped watching {} ({} cycles, {} notifications, {} signatures seen)",
            self.key,
            cycles,
            notified,
            self.seen.len()
        );
    }

    /// One poll cycle without the trailing sleep. Never fails: errors are
    /// logged and reported as `CycleOutcome::Failed`.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        match self.check_newest().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("❌ Error fetching transactions for {}: {:#}", self.key, e);
                CycleOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    async fn check_newest(&mut self) -> Result<CycleOutcome> {
        let signatures = self
            .ledger
            .list_recent_signatures(&self.key.address, None, 1)
            .await;

        let Some(signature) = signatures.into_iter().next() else {
            debug!("No new signatures for {}. Waiting before retrying...", self.key);
            return Ok(CycleOutcome::NoSignatures);
        };

        if self.seen.contains(&signature) {
            return Ok(CycleOutcome::AlreadySeen);
        }
        self.seen.mark_seen(signature.clone());
        debug!("🆕 New signature {} for {}", signature.short(), self.key);

        let Some(record) = self.ledger.fetch_transaction(&signature).await else {
            info!("⚠️  Transaction {} unavailable, skipping", signature.short());
            return Ok(CycleOutcome::TransactionUnavailable);
        };

        let Some(event) = extract_transfer(&record) else {
            debug!("Transaction {} has no transfer, skipping", signature.short());
            return Ok(CycleOutcome::NoTransfer);
        };

        self.sink
            .deliver(&self.key, &event.to_notification())
            .await
            .with_context(|| format!("Failed to deliver notification for {}", signature.short()))?;

        info!(
            "💸 {} SOL {} -> {} ({} @ slot {})",
            event.amount_sol(),
            short_id(&event.source),
            short_id(&event.destination),
            signature.short(),
            record.slot.map_or_else(|| "?".to_string(), |slot| slot.to_string())
        );
        Ok(CycleOutcome::Notified(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        address, non_transfer_record, transfer_record, RecordingSink, ScriptedLedger, DST, SRC,
    };
    use crate::types::SignatureRef;

    fn watcher(ledger: Arc<ScriptedLedger>, sink: Arc<RecordingSink>) -> Watcher {
        Watcher::new(
            SubscriptionKey::new("42", address(DST)),
            ledger,
            sink,
            SeenSet::unbounded(),
            PollSchedule::default(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_cycles() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        ledger.push_page(&["S1"]);
        ledger.push_page(&["S1"]);
        ledger.push_page(&["S2"]);
        ledger.push_page(&["S3"]);
        ledger.insert_transaction("S1", transfer_record(SRC, DST, 1_000_000_000));
        ledger.insert_transaction("S2", non_transfer_record());
        ledger.insert_transaction("S3", transfer_record(DST, SRC, 2_500_000_000));

        let mut watcher = watcher(ledger.clone(), sink.clone());

        // Cycle 1: unseen transfer
        let outcome = watcher.poll_once().await;
        assert!(matches!(outcome, CycleOutcome::Notified(ref e) if e.lamports == 1_000_000_000));
        assert_eq!(
            sink.texts(),
            vec![format!(
                "New Transaction!\nSource: {}\nDestination: {}\nAmount: 1 SOL",
                SRC, DST
            )]
        );
        assert_eq!(sink.delivered()[0].0.subscriber, "42");

        // Cycle 2: same newest signature
        assert_eq!(watcher.poll_once().await, CycleOutcome::AlreadySeen);
        assert_eq!(sink.texts().len(), 1);

        // Cycle 3: no transfer instruction
        assert_eq!(watcher.poll_once().await, CycleOutcome::NoTransfer);
        assert_eq!(sink.texts().len(), 1);

        // Cycle 4: loop still alive
        assert!(matches!(watcher.poll_once().await, CycleOutcome::Notified(_)));
        assert_eq!(sink.texts().len(), 2);
        assert!(sink.texts()[1].ends_with("Amount: 2.5 SOL"));

        // Only the newest signature is ever requested
        assert!(ledger.requests().iter().all(|req| *req == (None, 1)));
        assert_eq!(ledger.fetch_calls(), 3);
        assert_eq!(watcher.seen().len(), 3);
    }

    #[tokio::test]
    async fn test_node_reported_accounts_reach_the_subscriber() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        ledger.push_page(&["S1"]);
        ledger.push_page(&["S1"]);
        ledger.push_page(&["S2"]);
        ledger.insert_transaction("S1", transfer_record("A", "B", 1_000_000_000));
        ledger.insert_transaction("S2", non_transfer_record());

        let mut watcher = watcher(ledger.clone(), sink.clone());

        assert_eq!(
            watcher.poll_once().await,
            CycleOutcome::Notified(TransferEvent::new("A", "B", 1_000_000_000))
        );
        assert_eq!(watcher.poll_once().await, CycleOutcome::AlreadySeen);
        assert_eq!(watcher.poll_once().await, CycleOutcome::NoTransfer);
        assert_eq!(watcher.poll_once().await, CycleOutcome::AlreadySeen);

        assert_eq!(
            sink.texts(),
            vec!["New Transaction!\nSource: A\nDestination: B\nAmount: 1 SOL".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_signatures() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        let mut watcher = watcher(ledger.clone(), sink.clone());

        assert_eq!(watcher.poll_once().await, CycleOutcome::NoSignatures);
        assert_eq!(ledger.fetch_calls(), 0);
        assert!(watcher.seen().is_empty());
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_transaction_is_not_retried() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        ledger.push_page(&["S1"]);
        let mut watcher = watcher(ledger.clone(), sink.clone());

        assert_eq!(watcher.poll_once().await, CycleOutcome::TransactionUnavailable);
        // Shows up later, but the signature is already marked seen
        ledger.insert_transaction("S1", transfer_record(SRC, DST, 1));
        assert_eq!(watcher.poll_once().await, CycleOutcome::AlreadySeen);

        assert_eq!(ledger.fetch_calls(), 1);
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_at_most_once() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::failing());
        ledger.push_page(&["S1"]);
        ledger.insert_transaction("S1", transfer_record(SRC, DST, 1));
        let mut watcher = watcher(ledger.clone(), sink.clone());

        let outcome = watcher.poll_once().await;
        assert!(matches!(outcome, CycleOutcome::Failed(ref msg) if msg.contains("chat unavailable")));

        // Even once the sink recovers, the lost notification is not retried
        sink.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        for _ in 0..3 {
            assert_eq!(watcher.poll_once().await, CycleOutcome::AlreadySeen);
        }
        assert_eq!(sink.attempts(), 1);
        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_watchers_do_not_share_seen_signatures() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        ledger.push_page(&["S1"]);
        ledger.insert_transaction("S1", transfer_record(SRC, DST, 1));

        let mut first = watcher(ledger.clone(), sink.clone());
        let mut second = watcher(ledger.clone(), sink.clone());
        assert!(matches!(first.poll_once().await, CycleOutcome::Notified(_)));
        assert!(matches!(second.poll_once().await, CycleOutcome::Notified(_)));
        assert_eq!(sink.texts().len(), 2);
        assert!(first.seen().contains(&SignatureRef::new("S1")));
        assert!(second.seen().contains(&SignatureRef::new("S1")));
    }

    #[test]
    fn test_schedule_bounds() {
        let schedule = PollSchedule::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let delay = schedule.next_delay(&mut rng);
            assert!(delay >= Duration::from_millis(5000));
            assert!(delay < Duration::from_millis(7000));
        }

        let fixed = PollSchedule::new(250, 0);
        assert_eq!(fixed.next_delay(&mut rng), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_cancelled() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        ledger.push_page(&["S1"]);
        ledger.insert_transaction("S1", transfer_record(SRC, DST, 1_000_000_000));

        let token = CancellationToken::new();
        let task = tokio::spawn(watcher(ledger.clone(), sink.clone()).run(token.clone()));

        // Cycles start at 0s and then every 5-7s
        sleep(Duration::from_secs(20)).await;
        let calls = ledger.list_calls();
        assert!((3..=5).contains(&calls), "unexpected cycle count {}", calls);
        assert_eq!(sink.texts().len(), 1);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("watcher did not stop within one sleep")
            .unwrap();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(ledger.list_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_makes_no_calls() {
        let ledger = Arc::new(ScriptedLedger::new());
        let sink = Arc::new(RecordingSink::new());
        let token = CancellationToken::new();
        token.cancel();

        watcher(ledger.clone(), sink).run(token).await;
        assert_eq!(ledger.list_calls(), 0);
    }
}
