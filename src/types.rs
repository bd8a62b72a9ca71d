//! Common types for the relay pipeline

use alloy::primitives::{Address, B256};
use std::fmt;

/// A raw contract log as observed on an origin chain.
///
/// Created by the chain subscription and consumed by one relay task; it is
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLogEntry {
    /// Emitting contract
    pub address: Address,
    /// Topic hashes, `topics[0]` is the event signature hash
    pub topics: Vec<B256>,
    /// ABI-encoded payload
    pub data: Vec<u8>,
    /// Block the log was included in
    pub block_number: u64,
    /// Transaction that emitted the log
    pub tx_hash: B256,
}

impl ChainLogEntry {
    /// The event signature topic, if present
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    /// Convert an alloy RPC log. Pending logs (no block or tx hash) are rejected.
    pub fn from_rpc_log(log: &alloy::rpc::types::Log) -> Option<Self> {
        Some(Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.to_vec(),
            block_number: log.block_number?,
            tx_hash: log.transaction_hash?,
        })
    }
}

/// Human-readable names for the mainnet chains the relay is deployed on.
const CHAIN_NAMES: &[(u64, &str)] = &[
    (1, "Ethereum"),
    (8453, "Base"),
    (137, "Polygon"),
    (10, "OP"),
    (42161, "Arbitrum"),
    (1868, "Soneium"),
];

/// Display name of an origin chain, falling back to its decimal id
pub fn chain_label(chain_id: u64) -> String {
    CHAIN_NAMES
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| chain_id.to_string())
}

/// Short identifier of a network used in log lines and metric labels
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkLabel {
    pub name: String,
    pub chain_id: u64,
}

impl fmt::Display for NetworkLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}
