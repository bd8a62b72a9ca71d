//! Origin-chain completion callback
//!
//! After a relayed message lands on Jackal, the relay calls
//! `finishMessage(string)` on the origin contract. This is best-effort: the
//! destination mutation stands whether or not the callback goes through.

use alloy::primitives::Address;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::events::EventKind;
use crate::wallet::EvmKey;

pub mod cast;
pub mod native;

pub use cast::CastBroadcaster;
pub use native::NativeBroadcaster;

/// Function invoked on the origin contract
pub const FINISH_MESSAGE_SIGNATURE: &str = "finishMessage(string)";

/// Identifier passed to `finishMessage`: event kind, acting address and
/// origin block, concatenated.
pub fn message_id(kind: EventKind, evm_address: &str, block_number: u64) -> String {
    format!("{}{}{}", kind.as_str(), evm_address, block_number)
}

/// Everything a broadcaster needs to send one completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub rpc_url: String,
    pub key: EvmKey,
    pub contract: Address,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BroadcastOutcome {
    pub success: bool,
    pub tx_hash: Option<String>,
}

/// Sends `finishMessage(message_id)` to the origin contract
#[async_trait]
pub trait CompletionBroadcaster: Send + Sync {
    async fn broadcast(&self, request: &CompletionRequest) -> eyre::Result<BroadcastOutcome>;
}

#[async_trait]
impl<B: CompletionBroadcaster + ?Sized> CompletionBroadcaster for std::sync::Arc<B> {
    async fn broadcast(&self, request: &CompletionRequest) -> eyre::Result<BroadcastOutcome> {
        (**self).broadcast(request).await
    }
}

/// Final state of a completion callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Delivered { tx_hash: Option<String>, attempts: u32 },
    Failed { attempts: u32 },
}

/// Runs a broadcaster under a bounded retry policy
pub struct CompletionNotifier<B> {
    broadcaster: B,
    policy: BackoffPolicy,
}

impl<B: CompletionBroadcaster> CompletionNotifier<B> {
    pub fn new(broadcaster: B, policy: BackoffPolicy) -> Self {
        Self {
            broadcaster,
            policy,
        }
    }

    /// Broadcast until one attempt reports success or the policy runs out.
    /// A broadcaster error counts as an unsuccessful attempt.
    pub async fn notify(&self, request: &CompletionRequest) -> CallbackOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.broadcaster.broadcast(request).await {
                Ok(BroadcastOutcome {
                    success: true,
                    tx_hash,
                }) => {
                    info!(
                        message_id = %request.message_id,
                        tx_hash = ?tx_hash,
                        attempts = attempts,
                        "Completion callback delivered"
                    );
                    return CallbackOutcome::Delivered { tx_hash, attempts };
                }
                Ok(outcome) => warn!(
                    message_id = %request.message_id,
                    tx_hash = ?outcome.tx_hash,
                    attempt = attempts,
                    "Completion callback unsuccessful"
                ),
                Err(e) => warn!(
                    message_id = %request.message_id,
                    attempt = attempts,
                    error = %e,
                    "Completion callback failed"
                ),
            }

            if !self.policy.should_retry(attempts) {
                return CallbackOutcome::Failed { attempts };
            }
            tokio::time::sleep(self.policy.backoff_for_attempt(attempts - 1)).await;
        }
    }
}
