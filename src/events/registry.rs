//! Signature-keyed event registry
//!
//! Maps `keccak256(signature)` to the decoder and generator for that event,
//! so a log is dispatched by its first topic in one lookup.

use alloy::primitives::B256;
use alloy::sol_types::SolEvent;
use std::collections::HashMap;
use thiserror::Error;

use super::{abi, EventKind, EventRecord};
use crate::generator::{self, GenerateError, GenerationContext, Generated};
use crate::hash::event_signature_hash;
use crate::types::ChainLogEntry;

pub type DecodeFn = fn(&ChainLogEntry) -> Result<EventRecord, DecodeError>;
pub type GenerateFn = fn(&EventRecord, &GenerationContext) -> Result<Generated, GenerateError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode {kind} payload: {reason}")]
    Abi { kind: EventKind, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The contract emitted an event this build does not know
    #[error("unknown event signature {0}")]
    UnknownSignature(B256),

    #[error("log carries no signature topic")]
    NoTopics,
}

/// Decoder and generator for one event kind
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    pub kind: EventKind,
    /// Canonical signature, e.g. `PostedKey(address,string)`
    pub signature: &'static str,
    pub topic: B256,
    decode: DecodeFn,
    generate: GenerateFn,
}

impl RegistryEntry {
    pub fn decode(&self, log: &ChainLogEntry) -> Result<EventRecord, DecodeError> {
        (self.decode)(log)
    }

    pub fn generate(
        &self,
        record: &EventRecord,
        ctx: &GenerationContext,
    ) -> Result<Generated, GenerateError> {
        (self.generate)(record, ctx)
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .field("topic", &self.topic)
            .finish()
    }
}

macro_rules! entry {
    ($kind:ident, $signature:literal, $generate:path) => {
        RegistryEntry {
            kind: EventKind::$kind,
            signature: $signature,
            topic: B256::from(event_signature_hash($signature)),
            decode: |log| {
                <abi::$kind as SolEvent>::decode_raw_log(log.topics.iter().copied(), &log.data, true)
                    .map(|event| EventRecord::$kind(event.into()))
                    .map_err(|e| DecodeError::Abi {
                        kind: EventKind::$kind,
                        reason: e.to_string(),
                    })
            },
            generate: |record, ctx| match record {
                EventRecord::$kind(event) => $generate(event, ctx),
                other => Err(GenerateError::KindMismatch {
                    expected: EventKind::$kind,
                    found: other.kind(),
                }),
            },
        }
    };
}

/// Dispatch table over every event the storage contract emits
#[derive(Debug, Clone)]
pub struct EventRegistry {
    entries: HashMap<B256, RegistryEntry>,
}

impl EventRegistry {
    pub fn new() -> Self {
        let entries = [
            entry!(PostedFile, "PostedFile(address,string,uint64,string,uint64)", generator::posted_file),
            entry!(BoughtStorage, "BoughtStorage(address,string,uint64,uint64,string)", generator::bought_storage),
            entry!(DeletedFile, "DeletedFile(address,string,uint64)", generator::deleted_file),
            entry!(
                RequestedReportForm,
                "RequestedReportForm(address,string,string,string,uint64)",
                generator::requested_report_form
            ),
            entry!(PostedKey, "PostedKey(address,string)", generator::posted_key),
            entry!(DeletedFileTree, "DeletedFileTree(address,string,string)", generator::deleted_file_tree),
            entry!(
                ProvisionedFileTree,
                "ProvisionedFileTree(address,string,string,string)",
                generator::provisioned_file_tree
            ),
            entry!(
                PostedFileTree,
                "PostedFileTree(address,string,string,string,string,string,string,string)",
                generator::posted_file_tree
            ),
            entry!(AddedViewers, "AddedViewers(address,string,string,string,string)", generator::added_viewers),
            entry!(RemovedViewers, "RemovedViewers(address,string,string,string)", generator::removed_viewers),
            entry!(ResetViewers, "ResetViewers(address,string,string)", generator::reset_viewers),
            entry!(ChangedOwner, "ChangedOwner(address,string,string,string)", generator::changed_owner),
            entry!(AddedEditors, "AddedEditors(address,string,string,string,string)", generator::added_editors),
            entry!(RemovedEditors, "RemovedEditors(address,string,string,string)", generator::removed_editors),
            entry!(ResetEditors, "ResetEditors(address,string,string)", generator::reset_editors),
            entry!(
                CreatedNotification,
                "CreatedNotification(address,string,string,string)",
                generator::created_notification
            ),
            entry!(
                DeletedNotification,
                "DeletedNotification(address,string,uint64)",
                generator::deleted_notification
            ),
            entry!(BlockedSenders, "BlockedSenders(address,string[])", generator::blocked_senders),
        ];

        Self {
            entries: entries.into_iter().map(|e| (e.topic, e)).collect(),
        }
    }

    /// Find the entry for a log by its first topic
    pub fn lookup(&self, log: &ChainLogEntry) -> Result<&RegistryEntry, RegistryError> {
        let topic = log.signature().ok_or(RegistryError::NoTopics)?;
        self.entries
            .get(&topic)
            .ok_or(RegistryError::UnknownSignature(topic))
    }

    pub fn get(&self, topic: &B256) -> Option<&RegistryEntry> {
        self.entries.get(topic)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
