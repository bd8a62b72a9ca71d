//! Storage contract events
//!
//! Typed records for every event the origin contracts emit, plus the
//! signature-keyed registry that decodes raw logs into them.

use alloy::primitives::Address;
use std::fmt;

pub mod abi;
pub mod registry;

pub use registry::{DecodeError, EventRegistry, RegistryEntry, RegistryError};

/// Defines a record struct carrying the acting `from` address plus the
/// event's own fields, and its conversion from the ABI binding.
macro_rules! event_record {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $field:ident : $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Origin-chain account that made the call
            pub from: Address,
            $($(#[$fmeta])* pub $field: $ty,)*
        }

        impl From<abi::$name> for $name {
            fn from(event: abi::$name) -> Self {
                Self {
                    from: event.from,
                    $($field: event.$field,)*
                }
            }
        }
    };
}

event_record!(
    /// A file was posted for storage
    PostedFile {
        /// Merkle root, hex encoded
        merkle: String,
        /// File size in bytes
        size: u64,
        /// Free-form JSON note (may be empty)
        note: String,
        /// Storage duration in days, 0 for no expiry
        expires: u64,
    }
);

event_record!(
    /// Storage plan purchase
    BoughtStorage {
        for_address: String,
        duration_days: u64,
        size_bytes: u64,
        referral: String,
    }
);

event_record!(
    DeletedFile {
        merkle: String,
        start: u64,
    }
);

event_record!(
    RequestedReportForm {
        prover: String,
        merkle: String,
        owner: String,
        start: u64,
    }
);

event_record!(PostedKey { key: String });

event_record!(
    /// File-tree delete; `hash_path` is the human-readable path
    DeletedFileTree {
        hash_path: String,
        account: String,
    }
);

event_record!(
    ProvisionedFileTree {
        editors: String,
        viewers: String,
        tracking_number: String,
    }
);

event_record!(
    PostedFileTree {
        account: String,
        hash_parent: String,
        hash_child: String,
        contents: String,
        viewers: String,
        editors: String,
        tracking_number: String,
    }
);

event_record!(
    AddedViewers {
        viewer_ids: String,
        viewer_keys: String,
        for_address: String,
        file_owner: String,
    }
);

event_record!(
    RemovedViewers {
        viewer_ids: String,
        for_address: String,
        file_owner: String,
    }
);

event_record!(
    ResetViewers {
        for_address: String,
        file_owner: String,
    }
);

event_record!(
    ChangedOwner {
        for_address: String,
        file_owner: String,
        new_owner: String,
    }
);

event_record!(
    AddedEditors {
        editor_ids: String,
        editor_keys: String,
        for_address: String,
        file_owner: String,
    }
);

event_record!(
    RemovedEditors {
        editor_ids: String,
        for_address: String,
        file_owner: String,
    }
);

event_record!(
    ResetEditors {
        for_address: String,
        file_owner: String,
    }
);

event_record!(
    CreatedNotification {
        to: String,
        contents: String,
        private_contents: String,
    }
);

event_record!(
    DeletedNotification {
        /// Sender of the notification being deleted
        notification_from: String,
        time: u64,
    }
);

event_record!(BlockedSenders { to_block: Vec<String> });

/// Event kinds, one per registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PostedFile,
    BoughtStorage,
    DeletedFile,
    RequestedReportForm,
    PostedKey,
    DeletedFileTree,
    ProvisionedFileTree,
    PostedFileTree,
    AddedViewers,
    RemovedViewers,
    ResetViewers,
    ChangedOwner,
    AddedEditors,
    RemovedEditors,
    ResetEditors,
    CreatedNotification,
    DeletedNotification,
    BlockedSenders,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PostedFile => "PostedFile",
            EventKind::BoughtStorage => "BoughtStorage",
            EventKind::DeletedFile => "DeletedFile",
            EventKind::RequestedReportForm => "RequestedReportForm",
            EventKind::PostedKey => "PostedKey",
            EventKind::DeletedFileTree => "DeletedFileTree",
            EventKind::ProvisionedFileTree => "ProvisionedFileTree",
            EventKind::PostedFileTree => "PostedFileTree",
            EventKind::AddedViewers => "AddedViewers",
            EventKind::RemovedViewers => "RemovedViewers",
            EventKind::ResetViewers => "ResetViewers",
            EventKind::ChangedOwner => "ChangedOwner",
            EventKind::AddedEditors => "AddedEditors",
            EventKind::RemovedEditors => "RemovedEditors",
            EventKind::ResetEditors => "ResetEditors",
            EventKind::CreatedNotification => "CreatedNotification",
            EventKind::DeletedNotification => "DeletedNotification",
            EventKind::BlockedSenders => "BlockedSenders",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded origin-chain event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRecord {
    PostedFile(PostedFile),
    BoughtStorage(BoughtStorage),
    DeletedFile(DeletedFile),
    RequestedReportForm(RequestedReportForm),
    PostedKey(PostedKey),
    DeletedFileTree(DeletedFileTree),
    ProvisionedFileTree(ProvisionedFileTree),
    PostedFileTree(PostedFileTree),
    AddedViewers(AddedViewers),
    RemovedViewers(RemovedViewers),
    ResetViewers(ResetViewers),
    ChangedOwner(ChangedOwner),
    AddedEditors(AddedEditors),
    RemovedEditors(RemovedEditors),
    ResetEditors(ResetEditors),
    CreatedNotification(CreatedNotification),
    DeletedNotification(DeletedNotification),
    BlockedSenders(BlockedSenders),
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            EventRecord::PostedFile(_) => EventKind::PostedFile,
            EventRecord::BoughtStorage(_) => EventKind::BoughtStorage,
            EventRecord::DeletedFile(_) => EventKind::DeletedFile,
            EventRecord::RequestedReportForm(_) => EventKind::RequestedReportForm,
            EventRecord::PostedKey(_) => EventKind::PostedKey,
            EventRecord::DeletedFileTree(_) => EventKind::DeletedFileTree,
            EventRecord::ProvisionedFileTree(_) => EventKind::ProvisionedFileTree,
            EventRecord::PostedFileTree(_) => EventKind::PostedFileTree,
            EventRecord::AddedViewers(_) => EventKind::AddedViewers,
            EventRecord::RemovedViewers(_) => EventKind::RemovedViewers,
            EventRecord::ResetViewers(_) => EventKind::ResetViewers,
            EventRecord::ChangedOwner(_) => EventKind::ChangedOwner,
            EventRecord::AddedEditors(_) => EventKind::AddedEditors,
            EventRecord::RemovedEditors(_) => EventKind::RemovedEditors,
            EventRecord::ResetEditors(_) => EventKind::ResetEditors,
            EventRecord::CreatedNotification(_) => EventKind::CreatedNotification,
            EventRecord::DeletedNotification(_) => EventKind::DeletedNotification,
            EventRecord::BlockedSenders(_) => EventKind::BlockedSenders,
        }
    }

    /// The origin-chain account that made the call
    pub fn from(&self) -> Address {
        match self {
            EventRecord::PostedFile(e) => e.from,
            EventRecord::BoughtStorage(e) => e.from,
            EventRecord::DeletedFile(e) => e.from,
            EventRecord::RequestedReportForm(e) => e.from,
            EventRecord::PostedKey(e) => e.from,
            EventRecord::DeletedFileTree(e) => e.from,
            EventRecord::ProvisionedFileTree(e) => e.from,
            EventRecord::PostedFileTree(e) => e.from,
            EventRecord::AddedViewers(e) => e.from,
            EventRecord::RemovedViewers(e) => e.from,
            EventRecord::ResetViewers(e) => e.from,
            EventRecord::ChangedOwner(e) => e.from,
            EventRecord::AddedEditors(e) => e.from,
            EventRecord::RemovedEditors(e) => e.from,
            EventRecord::ResetEditors(e) => e.from,
            EventRecord::CreatedNotification(e) => e.from,
            EventRecord::DeletedNotification(e) => e.from,
            EventRecord::BlockedSenders(e) => e.from,
        }
    }

    /// Whether generation needs the destination chain's current height.
    /// Only a posted file with an expiry does.
    pub fn needs_destination_height(&self) -> bool {
        matches!(self, EventRecord::PostedFile(e) if e.expires != 0)
    }
}
