//! Core value types shared by the watcher pipeline.

use anyhow::{Context, Result};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

/// Validated Solana account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(Pubkey);

impl Address {
    pub fn pubkey(&self) -> &Pubkey {
        &self.0
    }

    /// First 12 chars, for log lines
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(12).collect()
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let pubkey = Pubkey::from_str(s.trim())
            .with_context(|| format!("Invalid Solana address: {}", s))?;
        Ok(Self(pubkey))
    }
}

impl From<Pubkey> for Address {
    fn from(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction signature as returned by the RPC node.
///
/// Only equality is meaningful; recency comes from the order the node
/// returns signatures in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureRef(String);

impl SignatureRef {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 chars, for log lines
    pub fn short(&self) -> &str {
        short_id(&self.0)
    }
}

/// First 12 chars of an id, for log lines
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

impl fmt::Display for SignatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who gets notified about which address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    /// Chat id the notification is delivered to
    pub subscriber: String,
    pub address: Address,
}

impl SubscriptionKey {
    pub fn new(subscriber: impl Into<String>, address: Address) -> Self {
        Self {
            subscriber: subscriber.into(),
            address,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subscriber, self.address.short())
    }
}

/// A native SOL transfer found in a transaction.
///
/// Source and destination are carried exactly as the node reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

impl TransferEvent {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, lamports: u64) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            lamports,
        }
    }

    /// Amount in SOL, full float precision
    pub fn amount_sol(&self) -> f64 {
        self.lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    /// Text delivered to the subscriber
    pub fn to_notification(&self) -> String {
        format!(
            "New Transaction!\nSource: {}\nDestination: {}\nAmount: {} SOL",
            self.source,
            self.destination,
            self.amount_sol()
        )
    }
}
