//! Storage contract event ABI
//!
//! Uses alloy's sol! macro to bind the events emitted by the Jackal storage
//! contract on every supported EVM chain. All parameters are non-indexed, so
//! the whole record lives in the log payload.

use alloy::sol;

sol! {
    event PostedFile(address from, string merkle, uint64 size, string note, uint64 expires);
    event BoughtStorage(address from, string for_address, uint64 duration_days, uint64 size_bytes, string referral);
    event DeletedFile(address from, string merkle, uint64 start);
    event RequestedReportForm(address from, string prover, string merkle, string owner, uint64 start);
    event PostedKey(address from, string key);
    event DeletedFileTree(address from, string hash_path, string account);
    event ProvisionedFileTree(address from, string editors, string viewers, string tracking_number);
    event PostedFileTree(address from, string account, string hash_parent, string hash_child, string contents, string viewers, string editors, string tracking_number);
    event AddedViewers(address from, string viewer_ids, string viewer_keys, string for_address, string file_owner);
    event RemovedViewers(address from, string viewer_ids, string for_address, string file_owner);
    event ResetViewers(address from, string for_address, string file_owner);
    event ChangedOwner(address from, string for_address, string file_owner, string new_owner);
    event AddedEditors(address from, string editor_ids, string editor_keys, string for_address, string file_owner);
    event RemovedEditors(address from, string editor_ids, string for_address, string file_owner);
    event ResetEditors(address from, string for_address, string file_owner);
    event CreatedNotification(address from, string to, string contents, string private_contents);
    event DeletedNotification(address from, string notification_from, uint64 time);
    event BlockedSenders(address from, string[] to_block);
}
