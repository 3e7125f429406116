//! # Block Stream Codec
//!
//! The node API answers block range requests with newline-delimited JSON,
//! one type-tagged item per line:
//!
//! ```text
//! {"type":"block","data":{...}}
//! {"type":"transaction","data":{...}}
//! {"type":"operation","data":{...}}
//! {"type":"error","data":{...}}
//! ```
//!
//! Items may arrive in any order. The parser reassembles one height from
//! them and rejects streams that are incomplete.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shared_types::{Block, Hash, Operation, Transaction};

use crate::domain::SyncError;

/// One line of the node API block stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamItem {
    /// A block header with its transaction list.
    Block(Block),
    /// A transaction referenced by a block.
    Transaction(Transaction),
    /// An operation referenced by a transaction.
    Operation(Operation),
    /// Error reported by the serving node mid-stream.
    Error(serde_json::Value),
}

/// One height reassembled from a block stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBundle {
    /// The block.
    pub block: Block,
    /// Its transactions, in block order.
    pub transactions: Vec<Transaction>,
    /// Their operations, in transaction order.
    pub operations: Vec<Operation>,
}

/// Parse the stream served for `height`.
///
/// Blank lines are skipped and items the block does not reference are
/// dropped. Everything else that is wrong with the stream is reported as
/// `SyncError::MalformedStream`.
pub fn parse_block_stream(height: u64, body: &str) -> Result<BlockBundle, SyncError> {
    let malformed = |reason: String| SyncError::MalformedStream { height, reason };

    let mut block: Option<Block> = None;
    let mut transactions: HashMap<Hash, Transaction> = HashMap::new();
    let mut operations: HashMap<Hash, Operation> = HashMap::new();

    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let item: StreamItem = serde_json::from_str(line)
            .map_err(|e| malformed(format!("line {}: {}", index + 1, e)))?;

        match item {
            StreamItem::Block(b) => {
                if block.is_some() {
                    return Err(malformed("more than one block in stream".to_string()));
                }
                block = Some(b);
            }
            StreamItem::Transaction(tx) => {
                transactions.insert(tx.hash, tx);
            }
            StreamItem::Operation(op) => {
                operations.insert(op.hash, op);
            }
            StreamItem::Error(detail) => {
                return Err(malformed(format!("peer reported error: {}", detail)));
            }
        }
    }

    let block = block.ok_or_else(|| malformed("no block in stream".to_string()))?;
    if block.height != height {
        return Err(malformed(format!("stream carries block {}", block.height)));
    }

    let mut ordered_txs = Vec::with_capacity(block.transactions.len());
    let mut ordered_ops = Vec::new();
    for tx_hash in &block.transactions {
        let tx = transactions
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| malformed(format!("transaction {} missing", tx_hash.short())))?;
        for op_hash in &tx.operations {
            let op = operations
                .get(op_hash)
                .cloned()
                .ok_or_else(|| malformed(format!("operation {} missing", op_hash.short())))?;
            ordered_ops.push(op);
        }
        ordered_txs.push(tx);
    }

    Ok(BlockBundle {
        block,
        transactions: ordered_txs,
        operations: ordered_ops,
    })
}

/// Encode one height as a block stream, block first.
pub fn encode_block_stream(
    block: &Block,
    transactions: &[Transaction],
    operations: &[Operation],
) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    let items = std::iter::once(StreamItem::Block(block.clone()))
        .chain(transactions.iter().cloned().map(StreamItem::Transaction))
        .chain(operations.iter().cloned().map(StreamItem::Operation));
    for item in items {
        out.push_str(&serde_json::to_string(&item)?);
        out.push('\n');
    }
    Ok(out)
}

/// Encode a stream that consists of a single error item.
pub fn encode_error_stream(message: &str) -> Result<String, serde_json::Error> {
    let item = StreamItem::Error(serde_json::json!({ "message": message }));
    Ok(format!("{}\n", serde_json::to_string(&item)?))
}
