//! Origin-chain watchers
//!
//! One [`EvmListener`] per configured network, all driven by the
//! [`WatcherManager`] until shutdown.

use std::collections::HashSet;
use std::sync::Arc;

use eyre::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::config::Config;
use crate::finality::FinalityWaiter;
use crate::relay::{Relay, RelayError};

pub mod evm;

pub use evm::{
    AlloyClient, AlloyConnector, EvmListener, HttpOrigin, ListenerError, LogStream, OriginConnector,
};

/// Runs one listener per configured network
pub struct WatcherManager<C: OriginConnector> {
    listeners: Vec<EvmListener<C>>,
}

impl<C: OriginConnector> WatcherManager<C> {
    pub fn new(
        config: &Config,
        connector: Arc<C>,
        relay: Arc<Relay>,
        fatal: mpsc::UnboundedSender<RelayError>,
    ) -> Result<Self> {
        let relay_config = &config.relay_config;
        let finality = FinalityWaiter::new(relay_config.finality_policy());

        let mut listeners = Vec::with_capacity(config.networks_config.len());
        let mut seen_chain_ids = HashSet::new();
        for network in &config.networks_config {
            if !seen_chain_ids.insert(network.chain_id) {
                return Err(eyre::eyre!(
                    "duplicate listener for chain {}",
                    network.chain_id
                ));
            }
            listeners.push(EvmListener::new(
                network.clone(),
                connector.clone(),
                relay.clone(),
                finality.clone(),
                relay_config.reconnect_policy(),
                fatal.clone(),
            )?);
        }

        info!(
            listeners = listeners.len(),
            chain_ids = ?seen_chain_ids,
            "Watcher manager created"
        );

        Ok(Self { listeners })
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Run every listener concurrently until shutdown. A listener only returns
    /// on shutdown, so any task failure here is a panic.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        for listener in self.listeners {
            join_set.spawn(listener.run(shutdown.clone()));
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(label) => info!(network = %label, "Listener exited"),
                Err(e) => {
                    error!("A listener task panicked: {:?}", e);
                    join_set.abort_all();
                    return Err(eyre::eyre!("listener task panicked: {}", e));
                }
            }
        }

        info!("All listeners stopped");
        Ok(())
    }
}
