//! Per-network origin listener
//!
//! Dials a network's HTTP and WebSocket endpoints, subscribes to the storage
//! contract's logs and hands each log to its own finality-wait task. Any dial,
//! subscribe or stream failure drops the connection and starts over after the
//! reconnect delay, forever, until shutdown.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::NetworkConfig;
use crate::finality::{ConfirmedReceipt, FinalityWaiter, OriginClient, PendingConfirmation};
use crate::metrics;
use crate::relay::{Relay, RelayError};
use crate::types::{ChainLogEntry, NetworkLabel};

/// Contract logs as they arrive; the stream ending is itself a failure
pub type LogStream = BoxStream<'static, Result<ChainLogEntry>>;

/// Opens connections and log subscriptions to an origin network
#[async_trait]
pub trait OriginConnector: Send + Sync + 'static {
    /// One session's connections, dropped when the session ends
    type Client: Send + Sync + 'static;

    async fn dial(&self, network: &NetworkConfig) -> Result<Self::Client>;

    async fn subscribe(&self, client: &Self::Client, contract: Address) -> Result<LogStream>;

    /// Chain queries handed to finality waits. Must not hold the log
    /// subscription open.
    fn origin(&self, client: &Self::Client) -> Arc<dyn OriginClient>;
}

/// Receipt and head queries over HTTP
pub struct HttpOrigin {
    provider: RootProvider<Http<Client>>,
}

#[async_trait]
impl OriginClient for HttpOrigin {
    async fn receipt_block(&self, tx_hash: B256) -> Result<Option<u64>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .wrap_err("Failed to get transaction receipt")?;
        Ok(receipt.and_then(|r| r.block_number))
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }
}

/// HTTP provider for receipts and heights, WebSocket provider for the log feed
pub struct AlloyClient {
    http: Arc<HttpOrigin>,
    ws: RootProvider<PubSubFrontend>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlloyConnector;

#[async_trait]
impl OriginConnector for AlloyConnector {
    type Client = AlloyClient;

    async fn dial(&self, network: &NetworkConfig) -> Result<AlloyClient> {
        let url = network.rpc.parse().wrap_err("Failed to parse RPC URL")?;
        let http = Arc::new(HttpOrigin {
            provider: ProviderBuilder::new().on_http(url),
        });
        let ws = ProviderBuilder::new()
            .on_ws(WsConnect::new(network.ws.clone()))
            .await
            .wrap_err("Failed to connect WebSocket")?;
        Ok(AlloyClient { http, ws })
    }

    async fn subscribe(&self, client: &AlloyClient, contract: Address) -> Result<LogStream> {
        let filter = Filter::new().address(contract);
        let subscription = client
            .ws
            .subscribe_logs(&filter)
            .await
            .wrap_err("Failed to subscribe to logs")?;

        let logs = subscription
            .into_stream()
            .filter_map(|log| async move { accept_log(&log).map(Ok) });
        let closed = stream::once(async { Err::<ChainLogEntry, _>(eyre!("log subscription closed")) });

        Ok(logs.chain(closed).boxed())
    }

    fn origin(&self, client: &AlloyClient) -> Arc<dyn OriginClient> {
        client.http.clone()
    }
}

/// Drop logs that were reorged out or are not yet in a block
fn accept_log(log: &Log) -> Option<ChainLogEntry> {
    if log.removed {
        debug!(address = %log.address(), tx_hash = ?log.transaction_hash, "Skipping removed log");
        return None;
    }
    let entry = ChainLogEntry::from_rpc_log(log);
    if entry.is_none() {
        debug!(address = %log.address(), "Skipping pending log");
    }
    entry
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("dial failed: {0:#}")]
    Dial(eyre::Report),

    #[error("subscribe failed: {0:#}")]
    Subscribe(eyre::Report),

    #[error("subscription error: {0:#}")]
    Stream(eyre::Report),
}

/// Long-lived listener for one network
pub struct EvmListener<C: OriginConnector> {
    network: NetworkConfig,
    contract: Address,
    connector: Arc<C>,
    relay: Arc<Relay>,
    finality: FinalityWaiter,
    reconnect: BackoffPolicy,
    permits: Arc<Semaphore>,
    fatal: mpsc::UnboundedSender<RelayError>,
}

impl<C: OriginConnector> EvmListener<C> {
    pub fn new(
        network: NetworkConfig,
        connector: Arc<C>,
        relay: Arc<Relay>,
        finality: FinalityWaiter,
        reconnect: BackoffPolicy,
        fatal: mpsc::UnboundedSender<RelayError>,
    ) -> Result<Self> {
        let contract = Address::from_str(&network.contract)
            .wrap_err_with(|| format!("{}: invalid contract address", network.name))?;
        let permits = Arc::new(Semaphore::new(network.max_in_flight.max(1)));

        Ok(Self {
            network,
            contract,
            connector,
            relay,
            finality,
            reconnect,
            permits,
            fatal,
        })
    }

    pub fn label(&self) -> NetworkLabel {
        self.network.label()
    }

    /// Run until `shutdown` flips. Tasks already spawned for earlier logs keep
    /// running after this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> NetworkLabel {
        let label = self.label();
        let mut failures: u32 = 0;

        info!(network = %label, contract = %self.contract, "Starting listener");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.session(&mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    if matches!(e, ListenerError::Stream(_)) {
                        failures = 0;
                    }
                    failures = failures.saturating_add(1);
                    metrics::record_reconnect(&label.name);
                    warn!(
                        network = %label,
                        failures = failures,
                        error = %e,
                        "Listener disconnected, reconnecting"
                    );
                }
            }

            let delay = self.reconnect.backoff_for_attempt(failures - 1);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(network = %label, "Listener stopped");
        label
    }

    /// One dial/subscribe/consume cycle. `Ok` means shutdown was requested.
    async fn session(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ListenerError> {
        let label = self.label();

        let client = self
            .connector
            .dial(&self.network)
            .await
            .map_err(ListenerError::Dial)?;
        let origin = self.connector.origin(&client);

        let mut logs = self
            .connector
            .subscribe(&client, self.contract)
            .await
            .map_err(ListenerError::Subscribe)?;

        info!(network = %label, "Subscribed to contract logs");

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                next = logs.next() => match next {
                    Some(Ok(log)) => self.dispatch(origin.clone(), log),
                    Some(Err(e)) => return Err(ListenerError::Stream(e)),
                    None => return Err(ListenerError::Stream(eyre!("log stream ended"))),
                },
            }
        }
    }

    /// Spawn the finality wait and relay for one log without waiting on it
    fn dispatch(&self, origin: Arc<dyn OriginClient>, log: ChainLogEntry) {
        metrics::record_log_received(&self.network.name, log.block_number);
        info!(
            network = %self.network.label(),
            tx_hash = %log.tx_hash,
            block = log.block_number,
            "Log received"
        );

        let network = self.network.clone();
        let relay = self.relay.clone();
        let finality = self.finality.clone();
        let permits = self.permits.clone();
        let fatal = self.fatal.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            metrics::inc_in_flight(&network.name);

            let tx_hash = log.tx_hash;
            let relay = relay.as_ref();
            let net = &network;
            let pending = PendingConfirmation::new(
                tx_hash,
                network.label(),
                network.finality,
                move |receipt: ConfirmedReceipt| {
                    debug!(
                        network = %net.label(),
                        tx_hash = %receipt.tx_hash,
                        confirmations = receipt.confirmations,
                        "Transaction final"
                    );
                    relay.process_log(net, log)
                },
            );

            let outcome = finality.confirm(origin.as_ref(), pending).await;
            metrics::dec_in_flight(&network.name);

            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) if e.is_fatal() => {
                    let _ = fatal.send(e);
                }
                Ok(Err(_)) => {}
                Err(e) => {
                    metrics::record_failure(&network.name, "finality");
                    error!(network = %network.label(), error = %e, "Dropping event");
                }
            }
        });
    }
}
