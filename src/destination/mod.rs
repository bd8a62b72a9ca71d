//! Destination (Jackal) chain access
//!
//! `client` signs and broadcasts against a Jackal node; `queue` serializes
//! every submission from every network through one background worker.

use async_trait::async_trait;
use eyre::Result;

use crate::messages::ExecuteRequest;

pub mod client;
pub mod queue;

pub use client::JackalClient;
pub use queue::TxQueue;

/// Result of a broadcast the node accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    pub tx_hash: String,
    pub raw_log: String,
}

/// Raw chain operations the queue worker drives
#[async_trait]
pub trait DestinationClient: Send + Sync + 'static {
    /// Bech32 address of the signing account
    fn sender(&self) -> &str;

    async fn latest_height(&self) -> Result<u64>;

    /// Price of storing `size` bytes for `hours`, in the minimal native unit
    async fn storage_price(&self, size: u64, hours: u64) -> Result<u128>;

    /// Sign and broadcast one execute request. `Ok(None)` means the node
    /// returned no transaction.
    async fn execute(&self, request: &ExecuteRequest) -> Result<Option<SubmitResponse>>;
}

/// What the relay pipeline needs from the destination chain
#[async_trait]
pub trait DestinationQueue: Send + Sync {
    fn sender(&self) -> &str;

    async fn latest_height(&self) -> Result<u64>;

    async fn estimate_fee(&self, size: u64, hours: u64) -> Result<u128>;

    async fn submit(&self, request: ExecuteRequest) -> Result<Option<SubmitResponse>>;
}
