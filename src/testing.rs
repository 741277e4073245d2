//! In-memory ledger and sink used by the watcher and registry tests.

use crate::ledger::Ledger;
use crate::notifier::NotificationSink;
use crate::transaction::TransactionRecord;
use crate::types::{Address, SignatureRef, SubscriptionKey};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SRC: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const DST: &str = "So11111111111111111111111111111111111111112";

pub fn address(s: &str) -> Address {
    s.parse().unwrap()
}

pub fn transfer_record(source: &str, destination: &str, lamports: u64) -> TransactionRecord {
    serde_json::from_value(json!({
        "transaction": { "message": { "instructions": [{
            "program": "system",
            "parsed": {
                "type": "transfer",
                "info": { "source": source, "destination": destination, "lamports": lamports }
            }
        }]}}
    }))
    .unwrap()
}

pub fn non_transfer_record() -> TransactionRecord {
    serde_json::from_value(json!({
        "transaction": { "message": { "instructions": [
            { "program": "system", "parsed": { "type": "createAccount", "info": {} } }
        ]}}
    }))
    .unwrap()
}

/// Replays one signature page per `list_recent_signatures` call, then
/// repeats the last page forever.
#[derive(Default)]
pub struct ScriptedLedger {
    pages: Mutex<VecDeque<Vec<SignatureRef>>>,
    last_page: Mutex<Vec<SignatureRef>>,
    transactions: Mutex<HashMap<SignatureRef, TransactionRecord>>,
    requests: Mutex<Vec<(Option<SignatureRef>, usize)>>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, signatures: &[&str]) {
        self.pages
            .lock()
            .unwrap()
            .push_back(signatures.iter().map(|s| SignatureRef::new(*s)).collect());
    }

    pub fn insert_transaction(&self, signature: &str, record: TransactionRecord) {
        self.transactions
            .lock()
            .unwrap()
            .insert(SignatureRef::new(signature), record);
    }

    pub fn requests(&self) -> Vec<(Option<SignatureRef>, usize)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn list_recent_signatures(
        &self,
        _address: &Address,
        before: Option<&SignatureRef>,
        limit: usize,
    ) -> Vec<SignatureRef> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((before.cloned(), limit));

        let mut last = self.last_page.lock().unwrap();
        if let Some(page) = self.pages.lock().unwrap().pop_front() {
            *last = page;
        }
        last.iter().take(limit).cloned().collect()
    }

    async fn fetch_transaction(&self, signature: &SignatureRef) -> Option<TransactionRecord> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.transactions.lock().unwrap().get(signature).cloned()
    }
}

/// Records every delivery; can be switched to fail
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(SubscriptionKey, String)>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn delivered(&self) -> Vec<(SubscriptionKey, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.delivered().into_iter().map(|(_, text)| text).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, key: &SubscriptionKey, text: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("chat unavailable");
        }
        self.delivered
            .lock()
            .unwrap()
            .push((key.clone(), text.to_string()));
        Ok(())
    }
}
