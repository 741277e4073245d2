//! 👀 Solana transfer watcher
//!
//! Polls the newest signature of watched addresses over JSON-RPC and sends
//! one notification per new native SOL transfer.
//!
//! ## Pipeline
//! - `ledger`: `getSignaturesForAddress` / `getTransaction` client
//! - `seen_set`: per-watcher record of handled signatures
//! - `extractor`: first `transfer` instruction → `TransferEvent`
//! - `watcher`: polling loop with jittered sleep and cancellation
//! - `registry`: subscription key → running watchers
//! - `notifier`: Telegram / log delivery

pub mod config;
pub mod extractor;
pub mod ledger;
pub mod notifier;
pub mod registry;
pub mod seen_set;
pub mod transaction;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use extractor::extract_transfer;
pub use ledger::{Ledger, LedgerClient, LedgerError};
pub use notifier::{LogNotifier, NotificationSink, TelegramNotifier};
pub use registry::{DuplicatePolicy, RegistryError, WatcherHandle, WatcherRegistry, WatcherSettings};
pub use seen_set::SeenSet;
pub use transaction::{Instruction, TransactionRecord, TransferInfo};
pub use types::{Address, SignatureRef, SubscriptionKey, TransferEvent};
pub use watcher::{CycleOutcome, PollSchedule, Watcher};
