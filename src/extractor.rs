//! Pulls the first native transfer out of a parsed transaction.

use crate::transaction::{Instruction, TransactionRecord, TransferInfo};
use crate::types::TransferEvent;
use log::{debug, warn};

/// First `transfer` instruction decides the result. A malformed one is
/// skipped with a warning rather than falling through to later instructions.
pub fn extract_transfer(record: &TransactionRecord) -> Option<TransferEvent> {
    let instruction = record
        .transaction
        .message
        .instructions
        .iter()
        .find(|ix| ix.is_transfer_tagged());

    match instruction {
        Some(Instruction::Transfer(info)) => Some(to_event(info)),
        Some(Instruction::MalformedTransfer(reason)) => {
            warn!("⚠️  Unexpected transfer shape, skipping: {}", reason);
            None
        }
        _ => {
            debug!(
                "No transfer among {} instructions",
                record.transaction.message.instructions.len()
            );
            None
        }
    }
}

fn to_event(info: &TransferInfo) -> TransferEvent {
    TransferEvent::new(info.source.as_str(), info.destination.as_str(), info.lamports)
}
