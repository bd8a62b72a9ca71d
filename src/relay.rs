//! Per-event relay pipeline
//!
//! Takes one finalized origin log through decode, generation, fee
//! resolution and submission, then fires the completion callback. Every
//! intermediate value lives on this call's stack, so concurrent events never
//! share state.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::callback::{message_id, CallbackOutcome, CompletionBroadcaster, CompletionNotifier, CompletionRequest};
use crate::config::{JackalConfig, NetworkConfig};
use crate::destination::DestinationQueue;
use crate::events::{DecodeError, EventKind, EventRegistry, RegistryError};
use crate::generator::{fee_with_margin, GenerateError, GenerationContext};
use crate::messages::{ExecuteRequest, FactoryExecuteMsg, ValidationError};
use crate::metrics;
use crate::types::ChainLogEntry;
use crate::wallet::EvmKey;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("destination height query failed: {0:#}")]
    DestinationHeight(eyre::Report),

    #[error("fee estimate failed: {0:#}")]
    FeeEstimate(eyre::Report),

    #[error("failed to encode execute message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid execute request: {0}")]
    Validation(#[from] ValidationError),

    #[error("submission failed: {0:#}")]
    Submit(eyre::Report),

    #[error("submission returned no result")]
    EmptySubmission,
}

impl RelayError {
    /// Only an event the registry has never heard of stops the process: the
    /// deployed contract and this build disagree on the protocol.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Registry(RegistryError::UnknownSignature(_)))
    }

    /// Pipeline stage, used as a metric label
    pub fn stage(&self) -> &'static str {
        match self {
            RelayError::Registry(_) => "registry",
            RelayError::Decode(_) => "decode",
            RelayError::Generate(_) | RelayError::DestinationHeight(_) => "generate",
            RelayError::FeeEstimate(_) => "fee",
            RelayError::Encode(_) | RelayError::Validation(_) => "validate",
            RelayError::Submit(_) => "submit",
            RelayError::EmptySubmission => "empty",
        }
    }
}

/// What happened to one relayed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub kind: EventKind,
    pub evm_address: String,
    pub fee: u128,
    pub tx_hash: String,
    pub callback: CallbackOutcome,
}

/// Shared by every network; holds no per-event state
pub struct Relay {
    registry: EventRegistry,
    queue: Arc<dyn DestinationQueue>,
    notifier: CompletionNotifier<Arc<dyn CompletionBroadcaster>>,
    destination_contract: String,
    denom: String,
    evm_key: EvmKey,
}

impl Relay {
    pub fn new(
        jackal: &JackalConfig,
        queue: Arc<dyn DestinationQueue>,
        broadcaster: Arc<dyn CompletionBroadcaster>,
        callback_policy: BackoffPolicy,
        evm_key: EvmKey,
    ) -> Self {
        Self {
            registry: EventRegistry::new(),
            queue,
            notifier: CompletionNotifier::new(broadcaster, callback_policy),
            destination_contract: jackal.contract.clone(),
            denom: jackal.denom.clone(),
            evm_key,
        }
    }

    /// Relay one finalized log from `network`.
    ///
    /// Failures are logged and counted here; the caller only decides whether
    /// a returned error is fatal.
    pub async fn process_log(
        &self,
        network: &NetworkConfig,
        log: ChainLogEntry,
    ) -> Result<RelayReport, RelayError> {
        let tx_hash = log.tx_hash;
        let result = self.relay(network, log).await;

        match &result {
            Ok(report) => {
                metrics::record_callback(
                    &network.name,
                    matches!(report.callback, CallbackOutcome::Delivered { .. }),
                );
            }
            Err(e) if e.is_fatal() => {
                metrics::record_failure(&network.name, e.stage());
                error!(
                    network = %network.label(),
                    tx_hash = %tx_hash,
                    error = %e,
                    "Origin contract emitted an unknown event"
                );
            }
            Err(e) => {
                metrics::record_failure(&network.name, e.stage());
                warn!(
                    network = %network.label(),
                    tx_hash = %tx_hash,
                    stage = e.stage(),
                    error = %e,
                    "Event abandoned"
                );
            }
        }

        result
    }

    async fn relay(
        &self,
        network: &NetworkConfig,
        log: ChainLogEntry,
    ) -> Result<RelayReport, RelayError> {
        let started = Instant::now();

        let entry = self.registry.lookup(&log)?;
        let record = entry.decode(&log)?;

        let destination_height = if record.needs_destination_height() {
            let height = self
                .queue
                .latest_height()
                .await
                .map_err(RelayError::DestinationHeight)?;
            Some(height)
        } else {
            None
        };

        let ctx = GenerationContext {
            chain_id: network.chain_id,
            destination_height,
        };
        let generated = entry.generate(&record, &ctx)?;

        let estimate = self
            .queue
            .estimate_fee(generated.fee_basis.size, generated.fee_basis.hours)
            .await
            .map_err(RelayError::FeeEstimate)?;
        let fee = fee_with_margin(estimate);

        debug!(
            network = %network.label(),
            event = %entry.kind,
            evm_address = %generated.evm_address,
            estimate = %estimate,
            fee = %fee,
            "Generated destination message"
        );

        let envelope = FactoryExecuteMsg::call_bindings(generated.evm_address.clone(), generated.msg);
        let request = ExecuteRequest::new(
            self.queue.sender(),
            &self.destination_contract,
            &envelope,
            fee,
            &self.denom,
        )?;
        request.validate()?;

        let response = self
            .queue
            .submit(request)
            .await
            .map_err(RelayError::Submit)?
            .ok_or(RelayError::EmptySubmission)?;

        info!(
            network = %network.label(),
            event = %entry.kind,
            evm_address = %generated.evm_address,
            origin_tx = %log.tx_hash,
            tx_hash = %response.tx_hash,
            fee = %fee,
            "Relayed event to Jackal"
        );
        if !response.raw_log.is_empty() {
            debug!(tx_hash = %response.tx_hash, raw_log = %response.raw_log, "Destination log");
        }
        metrics::record_relayed(
            &network.name,
            entry.kind.as_str(),
            fee,
            started.elapsed().as_secs_f64(),
        );

        let completion = CompletionRequest {
            rpc_url: network.rpc.clone(),
            key: self.evm_key.clone(),
            contract: log.address,
            message_id: message_id(entry.kind, &generated.evm_address, log.block_number),
        };
        let callback = self.notifier.notify(&completion).await;

        Ok(RelayReport {
            kind: entry.kind,
            evm_address: generated.evm_address,
            fee,
            tx_hash: response.tx_hash,
            callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::BroadcastOutcome;
    use crate::destination::SubmitResponse;
    use crate::events::abi;
    use crate::messages::ExecuteMsg;
    use alloy::primitives::{Address, B256};
    use alloy::sol_types::SolEvent;
    use async_trait::async_trait;
    use cosmrs::AccountId;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeQueue {
        sender: String,
        price: u128,
        height: u64,
        respond: bool,
        submitted: Mutex<Vec<ExecuteRequest>>,
    }

    impl FakeQueue {
        fn new(respond: bool) -> Self {
            Self {
                sender: AccountId::new("jkl", &[9u8; 20]).unwrap().to_string(),
                price: 100,
                height: 1_000,
                respond,
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DestinationQueue for FakeQueue {
        fn sender(&self) -> &str {
            &self.sender
        }

        async fn latest_height(&self) -> eyre::Result<u64> {
            Ok(self.height)
        }

        async fn estimate_fee(&self, _size: u64, _hours: u64) -> eyre::Result<u128> {
            Ok(self.price)
        }

        async fn submit(&self, request: ExecuteRequest) -> eyre::Result<Option<SubmitResponse>> {
            self.submitted.lock().unwrap().push(request);
            Ok(self.respond.then(|| SubmitResponse {
                tx_hash: "ABCD".to_string(),
                raw_log: String::new(),
            }))
        }
    }

    struct Recorder {
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionBroadcaster for Recorder {
        async fn broadcast(&self, request: &CompletionRequest) -> eyre::Result<BroadcastOutcome> {
            self.ids.lock().unwrap().push(request.message_id.clone());
            Ok(BroadcastOutcome {
                success: true,
                tx_hash: Some("0xcafe".to_string()),
            })
        }
    }

    fn jackal() -> JackalConfig {
        let mut config = crate::config::Config::default().jackal_config;
        config.contract = AccountId::new("jkl", &[5u8; 32]).unwrap().to_string();
        config
    }

    fn network() -> NetworkConfig {
        crate::config::Config::default().networks_config[0].clone()
    }

    fn relay(queue: Arc<FakeQueue>, broadcaster: Arc<Recorder>) -> Relay {
        Relay::new(
            &jackal(),
            queue,
            broadcaster,
            BackoffPolicy::fixed(Duration::from_secs(10), 2),
            EvmKey::from_bytes([7u8; 32]).unwrap(),
        )
    }

    fn log_for<E: SolEvent>(event: &E) -> ChainLogEntry {
        let encoded = event.encode_log_data();
        ChainLogEntry {
            address: Address::repeat_byte(0x01),
            topics: encoded.topics().to_vec(),
            data: encoded.data.to_vec(),
            block_number: 77,
            tx_hash: B256::repeat_byte(0x02),
        }
    }

    #[tokio::test]
    async fn test_relays_posted_key_with_floor_fee() {
        let queue = Arc::new(FakeQueue::new(true));
        let recorder = Arc::new(Recorder {
            ids: Mutex::new(Vec::new()),
        });
        let relay = relay(queue.clone(), recorder.clone());
        let from = Address::repeat_byte(0x33);

        let report = relay
            .process_log(
                &network(),
                log_for(&abi::PostedKey {
                    from,
                    key: "pub".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(report.kind, EventKind::PostedKey);
        assert_eq!(report.fee, 120);
        assert_eq!(report.evm_address, from.to_checksum(None));

        let submitted = queue.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].funds[0].amount, 120);
        let envelope: FactoryExecuteMsg = serde_json::from_slice(&submitted[0].msg).unwrap();
        assert_eq!(
            envelope,
            FactoryExecuteMsg::call_bindings(
                from.to_checksum(None),
                ExecuteMsg::PostKey {
                    key: "pub".to_string()
                }
            )
        );

        let ids = recorder.ids.lock().unwrap();
        assert_eq!(*ids, vec![format!("PostedKey{}77", from.to_checksum(None))]);
    }

    /// One encoded log per storage event, with the execute message key it must produce
    fn every_event() -> Vec<(ChainLogEntry, &'static str)> {
        let s = |v: &str| v.to_string();
        let from = |n: u8| Address::repeat_byte(n);
        vec![
            (
                log_for(&abi::PostedFile {
                    from: from(1),
                    merkle: s("abcd"),
                    size: 10,
                    note: s(""),
                    expires: 0,
                }),
                "post_file",
            ),
            (
                log_for(&abi::BoughtStorage {
                    from: from(2),
                    for_address: s("jkl1buyer"),
                    duration_days: 30,
                    size_bytes: 1_000,
                    referral: s(""),
                }),
                "buy_storage",
            ),
            (
                log_for(&abi::DeletedFile {
                    from: from(3),
                    merkle: s("abcd"),
                    start: 5,
                }),
                "delete_file",
            ),
            (
                log_for(&abi::RequestedReportForm {
                    from: from(4),
                    prover: s("jkl1prover"),
                    merkle: s("abcd"),
                    owner: s("jkl1owner"),
                    start: 5,
                }),
                "request_report_form",
            ),
            (log_for(&abi::PostedKey { from: from(5), key: s("pub") }), "post_key"),
            (
                log_for(&abi::DeletedFileTree {
                    from: from(6),
                    hash_path: s("s/home"),
                    account: s("acct"),
                }),
                "delete_file_tree",
            ),
            (
                log_for(&abi::ProvisionedFileTree {
                    from: from(7),
                    editors: s("{}"),
                    viewers: s("{}"),
                    tracking_number: s("t1"),
                }),
                "provision_file_tree",
            ),
            (
                log_for(&abi::PostedFileTree {
                    from: from(8),
                    account: s("acct"),
                    hash_parent: s("parent"),
                    hash_child: s("child"),
                    contents: s("{}"),
                    viewers: s("{}"),
                    editors: s("{}"),
                    tracking_number: s("t2"),
                }),
                "post_file_tree",
            ),
            (
                log_for(&abi::AddedViewers {
                    from: from(9),
                    viewer_ids: s("v"),
                    viewer_keys: s("k"),
                    for_address: s("path"),
                    file_owner: s("owner"),
                }),
                "add_viewers",
            ),
            (
                log_for(&abi::RemovedViewers {
                    from: from(10),
                    viewer_ids: s("v"),
                    for_address: s("path"),
                    file_owner: s("owner"),
                }),
                "remove_viewers",
            ),
            (
                log_for(&abi::ResetViewers {
                    from: from(11),
                    for_address: s("path"),
                    file_owner: s("owner"),
                }),
                "reset_viewers",
            ),
            (
                log_for(&abi::ChangedOwner {
                    from: from(12),
                    for_address: s("path"),
                    file_owner: s("owner"),
                    new_owner: s("next"),
                }),
                "change_owner",
            ),
            (
                log_for(&abi::AddedEditors {
                    from: from(13),
                    editor_ids: s("e"),
                    editor_keys: s("k"),
                    for_address: s("path"),
                    file_owner: s("owner"),
                }),
                "add_editors",
            ),
            (
                log_for(&abi::RemovedEditors {
                    from: from(14),
                    editor_ids: s("e"),
                    for_address: s("path"),
                    file_owner: s("owner"),
                }),
                "remove_editors",
            ),
            (
                log_for(&abi::ResetEditors {
                    from: from(15),
                    for_address: s("path"),
                    file_owner: s("owner"),
                }),
                "reset_editors",
            ),
            (
                log_for(&abi::CreatedNotification {
                    from: from(16),
                    to: s("jkl1to"),
                    contents: s("{}"),
                    private_contents: s(""),
                }),
                "create_notification",
            ),
            (
                log_for(&abi::DeletedNotification {
                    from: from(17),
                    notification_from: s("jkl1sender"),
                    time: 42,
                }),
                "delete_notification",
            ),
            (
                log_for(&abi::BlockedSenders {
                    from: from(18),
                    to_block: vec![s("jkl1spam")],
                }),
                "block_senders",
            ),
        ]
    }

    #[tokio::test]
    async fn test_every_event_kind_relays_with_fee_floor() {
        let events = every_event();
        assert_eq!(events.len(), 18);

        for (log, key) in events {
            let mut queue = FakeQueue::new(true);
            queue.price = 0;
            let queue = Arc::new(queue);
            let recorder = Arc::new(Recorder {
                ids: Mutex::new(Vec::new()),
            });
            let relay = relay(queue.clone(), recorder.clone());

            let report = relay
                .process_log(&network(), log)
                .await
                .unwrap_or_else(|e| panic!("{key}: {e}"));

            assert_eq!(report.fee, 1, "{key}");
            assert!(!report.evm_address.is_empty(), "{key}");
            let parsed: Address = report.evm_address.parse().unwrap();
            assert_eq!(report.evm_address, parsed.to_checksum(None), "{key}");

            let submitted = queue.submitted.lock().unwrap();
            assert_eq!(submitted[0].funds[0].amount, 1, "{key}");
            let envelope: serde_json::Value = serde_json::from_slice(&submitted[0].msg).unwrap();
            let msg = envelope["call_bindings"]["msg"].as_object().unwrap();
            assert_eq!(msg.keys().map(String::as_str).collect::<Vec<_>>(), vec![key]);
            assert_eq!(envelope["call_bindings"]["evm_address"], report.evm_address.as_str());

            let ids = recorder.ids.lock().unwrap();
            assert_eq!(
                *ids,
                vec![format!("{}{}77", report.kind, report.evm_address)],
                "{key}"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_submission_is_not_fatal() {
        let queue = Arc::new(FakeQueue::new(false));
        let recorder = Arc::new(Recorder {
            ids: Mutex::new(Vec::new()),
        });
        let relay = relay(queue, recorder.clone());

        let err = relay
            .process_log(
                &network(),
                log_for(&abi::ResetViewers {
                    from: Address::repeat_byte(0x44),
                    for_address: "jkl1x".to_string(),
                    file_owner: "jkl1y".to_string(),
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::EmptySubmission));
        assert!(!err.is_fatal());
        assert!(recorder.ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_signature_is_fatal() {
        let queue = Arc::new(FakeQueue::new(true));
        let recorder = Arc::new(Recorder {
            ids: Mutex::new(Vec::new()),
        });
        let relay = relay(queue.clone(), recorder);

        let mut log = log_for(&abi::PostedKey {
            from: Address::ZERO,
            key: "k".to_string(),
        });
        log.topics[0] = B256::repeat_byte(0xee);

        let err = relay.process_log(&network(), log).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.stage(), "registry");
        assert!(queue.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_hex_is_recoverable() {
        let queue = Arc::new(FakeQueue::new(true));
        let recorder = Arc::new(Recorder {
            ids: Mutex::new(Vec::new()),
        });
        let relay = relay(queue.clone(), recorder);

        let err = relay
            .process_log(
                &network(),
                log_for(&abi::DeletedFile {
                    from: Address::ZERO,
                    merkle: "not-hex".to_string(),
                    start: 1,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Generate(GenerateError::InvalidHex { .. })));
        assert!(!err.is_fatal());
        assert!(queue.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expiring_file_uses_destination_height() {
        let queue = Arc::new(FakeQueue::new(true));
        let recorder = Arc::new(Recorder {
            ids: Mutex::new(Vec::new()),
        });
        let relay = relay(queue.clone(), recorder);

        relay
            .process_log(
                &network(),
                log_for(&abi::PostedFile {
                    from: Address::repeat_byte(0x12),
                    merkle: "abcd".to_string(),
                    size: 10,
                    note: String::new(),
                    expires: 1,
                }),
            )
            .await
            .unwrap();

        let submitted = queue.submitted.lock().unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&submitted[0].msg).unwrap();
        let expires = &envelope["call_bindings"]["msg"]["post_file"]["expires"];
        assert_eq!(expires.as_i64(), Some(1_000 + 14_400));
    }
}
