//! Origin-chain finality confirmation
//!
//! Polls a network until a transaction is buried under the configured number
//! of blocks, then hands the confirmed receipt to a one-shot continuation.

use alloy::primitives::B256;
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::types::NetworkLabel;

/// Chain-height queries a finality wait needs from an origin network
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Block the transaction was included in, `None` while no receipt exists
    async fn receipt_block(&self, tx_hash: B256) -> eyre::Result<Option<u64>>;

    /// Current head of the chain
    async fn block_number(&self) -> eyre::Result<u64>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FinalityError {
    #[error("cannot get receipt for {tx_hash} after {errors} consecutive errors")]
    ReceiptUnavailable { tx_hash: B256, errors: u32 },
}

/// Receipt facts passed to the continuation once finality is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub confirmations: u64,
}

/// A transaction waiting for finality together with what to do once it has it.
///
/// The continuation is `FnOnce` and consumed by [`FinalityWaiter::confirm`],
/// so it runs at most once.
pub struct PendingConfirmation<F> {
    pub tx_hash: B256,
    pub network: NetworkLabel,
    pub depth: u64,
    continuation: F,
}

impl<F> PendingConfirmation<F> {
    pub fn new<Fut>(tx_hash: B256, network: NetworkLabel, depth: u64, continuation: F) -> Self
    where
        F: FnOnce(ConfirmedReceipt) -> Fut,
        Fut: Future,
    {
        Self {
            tx_hash,
            network,
            depth,
            continuation,
        }
    }
}

/// Outcome of a single poll
enum Poll {
    Final(ConfirmedReceipt),
    Waiting(u64),
}

#[derive(Debug, Clone)]
pub struct FinalityWaiter {
    policy: BackoffPolicy,
}

impl FinalityWaiter {
    /// `policy` supplies the poll interval and the consecutive-error budget
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    /// Poll until `pending` is final, then run its continuation.
    ///
    /// A missing receipt or a failed query counts as an error; a clean poll
    /// resets the count. Once the budget is spent the continuation is dropped
    /// without running.
    pub async fn confirm<C, F, Fut, T>(
        &self,
        client: &C,
        pending: PendingConfirmation<F>,
    ) -> Result<T, FinalityError>
    where
        C: OriginClient + ?Sized,
        F: FnOnce(ConfirmedReceipt) -> Fut,
        Fut: Future<Output = T>,
    {
        let PendingConfirmation {
            tx_hash,
            network,
            depth,
            continuation,
        } = pending;

        let mut errors: u32 = 0;
        loop {
            if !self.policy.should_retry(errors) {
                return Err(FinalityError::ReceiptUnavailable { tx_hash, errors });
            }

            tokio::time::sleep(self.policy.backoff_for_attempt(errors)).await;

            match self.poll(client, tx_hash, depth).await {
                Ok(Poll::Final(receipt)) => return Ok(continuation(receipt).await),
                Ok(Poll::Waiting(remaining)) => {
                    errors = 0;
                    debug!(
                        network = %network,
                        tx_hash = %tx_hash,
                        remaining = remaining,
                        "Still waiting for more blocks"
                    );
                }
                Err(e) => {
                    errors += 1;
                    warn!(
                        network = %network,
                        tx_hash = %tx_hash,
                        errors = errors,
                        error = %e,
                        "Finality poll failed"
                    );
                }
            }
        }
    }

    async fn poll<C: OriginClient + ?Sized>(
        &self,
        client: &C,
        tx_hash: B256,
        depth: u64,
    ) -> eyre::Result<Poll> {
        let block_number = client
            .receipt_block(tx_hash)
            .await?
            .ok_or_else(|| eyre::eyre!("receipt not found"))?;
        let head = client.block_number().await?;

        let confirmations = head.saturating_sub(block_number);
        if confirmations >= depth {
            Ok(Poll::Final(ConfirmedReceipt {
                tx_hash,
                block_number,
                confirmations,
            }))
        } else {
            Ok(Poll::Waiting(depth - confirmations))
        }
    }
}
