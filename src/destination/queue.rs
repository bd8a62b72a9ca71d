//! Shared destination submission queue
//!
//! Every network hands its execute requests to one worker task, which signs
//! and broadcasts them one at a time so the account sequence never races.
//! Read-only queries bypass the worker.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{eyre, Result};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{DestinationClient, DestinationQueue, SubmitResponse};
use crate::messages::ExecuteRequest;

/// Requests buffered before submitters start waiting for space
const QUEUE_CAPACITY: usize = 256;

struct Job {
    request: ExecuteRequest,
    reply: oneshot::Sender<Result<Option<SubmitResponse>>>,
}

/// Cloneable handle to the submission worker
pub struct TxQueue<C> {
    client: Arc<C>,
    jobs: mpsc::Sender<Job>,
    pending: Arc<Mutex<Option<mpsc::Receiver<Job>>>>,
}

impl<C> Clone for TxQueue<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            jobs: self.jobs.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<C: DestinationClient> TxQueue<C> {
    pub fn new(client: C) -> Self {
        let (jobs, receiver) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            client: Arc::new(client),
            jobs,
            pending: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Spawn the background worker. Submissions made before this are held
    /// in the channel; calling it twice is an error.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        let mut receiver = self
            .pending
            .lock()
            .await
            .take()
            .ok_or_else(|| eyre!("Submission queue already started"))?;
        let client = self.client.clone();

        info!(sender = %client.sender(), "Submission queue started");

        Ok(tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let result = client.execute(&job.request).await;
                if job.reply.send(result).is_err() {
                    debug!("Submitter went away before its result arrived");
                }
            }
            info!("Submission queue stopped");
        }))
    }
}

#[async_trait]
impl<C: DestinationClient> DestinationQueue for TxQueue<C> {
    fn sender(&self) -> &str {
        self.client.sender()
    }

    async fn latest_height(&self) -> Result<u64> {
        self.client.latest_height().await
    }

    async fn estimate_fee(&self, size: u64, hours: u64) -> Result<u128> {
        self.client.storage_price(size, hours).await
    }

    async fn submit(&self, request: ExecuteRequest) -> Result<Option<SubmitResponse>> {
        let (reply, result) = oneshot::channel();
        self.jobs
            .send(Job { request, reply })
            .await
            .map_err(|_| eyre!("Submission queue closed"))?;
        result
            .await
            .map_err(|_| eyre!("Submission queue worker stopped"))?
    }
}
