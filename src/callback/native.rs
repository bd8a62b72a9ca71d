//! In-process completion broadcaster using alloy

use alloy::network::EthereumWallet;
use alloy::providers::ProviderBuilder;
use alloy::sol;
use async_trait::async_trait;
use eyre::{eyre, WrapErr};
use tracing::debug;

use super::{BroadcastOutcome, CompletionBroadcaster, CompletionRequest};

sol! {
    /// Storage contract entry point that marks a relayed message as done
    #[sol(rpc)]
    contract StorageCallback {
        function finishMessage(string messageId) external;
    }
}

/// Signs and sends `finishMessage` through the network's RPC endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBroadcaster;

#[async_trait]
impl CompletionBroadcaster for NativeBroadcaster {
    async fn broadcast(&self, request: &CompletionRequest) -> eyre::Result<BroadcastOutcome> {
        let wallet = EthereumWallet::from(request.key.signer()?);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(request.rpc_url.parse().wrap_err("Invalid RPC URL")?);

        let contract = StorageCallback::new(request.contract, &provider);

        let pending_tx = contract
            .finishMessage(request.message_id.clone())
            .send()
            .await
            .map_err(|e| eyre!("Failed to send finishMessage: {}", e))?;

        let tx_hash = *pending_tx.tx_hash();
        debug!(tx_hash = %tx_hash, "finishMessage sent, waiting for receipt");

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;

        Ok(BroadcastOutcome {
            success: receipt.status(),
            tx_hash: Some(tx_hash.to_string()),
        })
    }
}
