//! `jsonParsed` transaction model returned by `getTransaction`.
//!
//! Instructions decode into a closed set of variants. Anything the watcher
//! does not understand becomes `Instruction::Other` instead of failing the
//! whole record, so one odd instruction never hides a transfer.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    pub transaction: TransactionBody,
    #[serde(default)]
    pub slot: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBody {
    pub message: Message,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

/// `info` payload of a parsed `transfer` instruction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferInfo {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Transfer(TransferInfo),
    /// Tagged `transfer` but the fields did not match (e.g. SPL token transfers)
    MalformedTransfer(String),
    Other,
}

impl Instruction {
    pub fn is_transfer_tagged(&self) -> bool {
        matches!(self, Instruction::Transfer(_) | Instruction::MalformedTransfer(_))
    }
}

#[derive(Deserialize)]
struct RawInstruction {
    #[serde(default)]
    parsed: Option<Value>,
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Non-object entries fall back to an empty raw instruction
        let value = Value::deserialize(deserializer)?;
        let raw: RawInstruction = serde_json::from_value(value).unwrap_or(RawInstruction { parsed: None });
        Ok(Instruction::from(raw))
    }
}

impl From<RawInstruction> for Instruction {
    fn from(raw: RawInstruction) -> Self {
        let Some(Value::Object(mut parsed)) = raw.parsed else {
            return Instruction::Other;
        };

        if parsed.get("type").and_then(Value::as_str) != Some("transfer") {
            return Instruction::Other;
        }

        let info = parsed.remove("info").unwrap_or(Value::Null);
        match serde_json::from_value::<TransferInfo>(info) {
            Ok(info) => Instruction::Transfer(info),
            Err(e) => Instruction::MalformedTransfer(e.to_string()),
        }
    }
}
