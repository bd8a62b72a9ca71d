//! Event to destination-message generation
//!
//! One pure function per event kind. Each returns the destination message,
//! the acting EVM address and the basis the storage fee is estimated from;
//! the fee itself is resolved by the relay against the destination chain.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::events::*;
use crate::hash::merkle_path;
use crate::messages::ExecuteMsg;
use crate::types::chain_label;

/// Proof window, in destination blocks, requested for every posted file
pub const PROOF_INTERVAL: i64 = 7200;
/// Proof type requested for every posted file
pub const PROOF_TYPE: i64 = 0;
/// Number of replicas proven for every posted file
pub const MAX_PROOFS: i64 = 3;
/// Denom storage purchases are paid in
pub const PAYMENT_DENOM: &str = "ujkl";
/// Destination chain block time in seconds
pub const BLOCK_TIME_SECS: u64 = 6;

const SECONDS_PER_DAY: u64 = 86_400;

/// Origin-side context a generation step may need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationContext {
    /// Origin chain id
    pub chain_id: u64,
    /// Latest destination height, fetched only when the record needs it
    pub destination_height: Option<u64>,
}

/// Inputs to the destination chain's storage price query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeBasis {
    /// Bytes stored (including replicas)
    pub size: u64,
    /// Storage duration in hours
    pub hours: u64,
}

/// Generation output before fee resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub msg: ExecuteMsg,
    /// EIP-55 address of the acting origin account
    pub evm_address: String,
    pub fee_basis: FeeBasis,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("field {field} is not valid hex: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("note is not valid JSON: {0}")]
    InvalidNote(String),

    #[error("note must be a JSON object")]
    NoteNotObject,

    #[error("destination height required but not provided")]
    MissingHeight,

    #[error("field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("generator for {expected} given a {found} record")]
    KindMismatch { expected: EventKind, found: EventKind },
}

/// Apply the 20% margin to a price estimate, rounding up, with a floor of
/// one minimal unit so release-only operations still pay.
pub fn fee_with_margin(estimate: u128) -> u128 {
    (estimate.saturating_mul(6).saturating_add(4) / 5).max(1)
}

/// Hex merkle root (optionally `0x`-prefixed) to standard base64
pub fn merkle_to_base64(field: &'static str, merkle: &str) -> Result<String, GenerateError> {
    let stripped = merkle.strip_prefix("0x").unwrap_or(merkle);
    let bytes = hex::decode(stripped).map_err(|e| GenerateError::InvalidHex {
        field,
        reason: e.to_string(),
    })?;
    Ok(STANDARD.encode(bytes))
}

/// Merge `relayed: {chain_id, for}` into a JSON object note.
/// An empty note is treated as `{}`.
pub fn augment_note(note: &str, chain_id: u64, evm_address: &str) -> Result<String, GenerateError> {
    let mut object = if note.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(note) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(GenerateError::NoteNotObject),
            Err(e) => return Err(GenerateError::InvalidNote(e.to_string())),
        }
    };

    object.insert(
        "relayed".to_string(),
        serde_json::json!({
            "chain_id": chain_label(chain_id),
            "for": evm_address,
        }),
    );

    Ok(Value::Object(object).to_string())
}

/// Destination block height at which a file stored for `days` expires
pub fn expiry_height(current_height: u64, days: u64) -> Result<u64, GenerateError> {
    days.checked_mul(SECONDS_PER_DAY / BLOCK_TIME_SECS)
        .and_then(|blocks| blocks.checked_add(current_height))
        .ok_or(GenerateError::OutOfRange {
            field: "expires",
            value: days,
        })
}

fn to_i64(field: &'static str, value: u64) -> Result<i64, GenerateError> {
    i64::try_from(value).map_err(|_| GenerateError::OutOfRange { field, value })
}

fn mul(field: &'static str, a: u64, b: u64) -> Result<u64, GenerateError> {
    a.checked_mul(b)
        .ok_or(GenerateError::OutOfRange { field, value: a })
}

fn flat(msg: ExecuteMsg, from: alloy::primitives::Address) -> Generated {
    Generated {
        msg,
        evm_address: from.to_checksum(None),
        fee_basis: FeeBasis::default(),
    }
}

pub fn posted_file(e: &PostedFile, ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let evm_address = e.from.to_checksum(None);
    let merkle = merkle_to_base64("merkle", &e.merkle)?;
    let note = augment_note(&e.note, ctx.chain_id, &evm_address)?;

    let expires = if e.expires > 0 {
        let height = ctx.destination_height.ok_or(GenerateError::MissingHeight)?;
        expiry_height(height, e.expires)?
    } else {
        0
    };

    let fee_basis = FeeBasis {
        size: mul("size", e.size, MAX_PROOFS as u64)?,
        hours: mul("expires", e.expires, 24)?,
    };

    Ok(Generated {
        msg: ExecuteMsg::PostFile {
            merkle,
            file_size: to_i64("size", e.size)?,
            proof_interval: PROOF_INTERVAL,
            proof_type: PROOF_TYPE,
            max_proofs: MAX_PROOFS,
            expires: to_i64("expires", expires)?,
            note,
        },
        evm_address,
        fee_basis,
    })
}

pub fn bought_storage(e: &BoughtStorage, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let fee_basis = FeeBasis {
        size: e.size_bytes,
        hours: mul("duration_days", e.duration_days, 24)?,
    };
    Ok(Generated {
        msg: ExecuteMsg::BuyStorage {
            for_address: e.for_address.clone(),
            duration_days: to_i64("duration_days", e.duration_days)?,
            bytes: to_i64("size_bytes", e.size_bytes)?,
            payment_denom: PAYMENT_DENOM.to_string(),
            referral: e.referral.clone(),
        },
        evm_address: e.from.to_checksum(None),
        fee_basis,
    })
}

pub fn deleted_file(e: &DeletedFile, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::DeleteFile {
        merkle: merkle_to_base64("merkle", &e.merkle)?,
        start: to_i64("start", e.start)?,
    };
    Ok(flat(msg, e.from))
}

pub fn requested_report_form(
    e: &RequestedReportForm,
    _ctx: &GenerationContext,
) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::RequestReportForm {
        prover: e.prover.clone(),
        merkle: merkle_to_base64("merkle", &e.merkle)?,
        owner: e.owner.clone(),
        start: to_i64("start", e.start)?,
    };
    Ok(flat(msg, e.from))
}

pub fn posted_key(e: &PostedKey, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    Ok(flat(ExecuteMsg::PostKey { key: e.key.clone() }, e.from))
}

pub fn deleted_file_tree(e: &DeletedFileTree, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::DeleteFileTree {
        hash_path: merkle_path(&e.hash_path),
        account: e.account.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn provisioned_file_tree(
    e: &ProvisionedFileTree,
    _ctx: &GenerationContext,
) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::ProvisionFileTree {
        editors: e.editors.clone(),
        viewers: e.viewers.clone(),
        tracking_number: e.tracking_number.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn posted_file_tree(e: &PostedFileTree, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::PostFileTree {
        account: e.account.clone(),
        hash_parent: e.hash_parent.clone(),
        hash_child: e.hash_child.clone(),
        contents: e.contents.clone(),
        viewers: e.viewers.clone(),
        editors: e.editors.clone(),
        tracking_number: e.tracking_number.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn added_viewers(e: &AddedViewers, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::AddViewers {
        viewer_ids: e.viewer_ids.clone(),
        viewer_keys: e.viewer_keys.clone(),
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn removed_viewers(e: &RemovedViewers, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::RemoveViewers {
        viewer_ids: e.viewer_ids.clone(),
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn reset_viewers(e: &ResetViewers, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::ResetViewers {
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn changed_owner(e: &ChangedOwner, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::ChangeOwner {
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
        new_owner: e.new_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn added_editors(e: &AddedEditors, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::AddEditors {
        editor_ids: e.editor_ids.clone(),
        editor_keys: e.editor_keys.clone(),
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn removed_editors(e: &RemovedEditors, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::RemoveEditors {
        editor_ids: e.editor_ids.clone(),
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn reset_editors(e: &ResetEditors, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::ResetEditors {
        address: e.for_address.clone(),
        file_owner: e.file_owner.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn created_notification(
    e: &CreatedNotification,
    _ctx: &GenerationContext,
) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::CreateNotification {
        to: e.to.clone(),
        contents: e.contents.clone(),
        private_contents: e.private_contents.clone(),
    };
    Ok(flat(msg, e.from))
}

pub fn deleted_notification(
    e: &DeletedNotification,
    _ctx: &GenerationContext,
) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::DeleteNotification {
        from: e.notification_from.clone(),
        time: to_i64("time", e.time)?,
    };
    Ok(flat(msg, e.from))
}

pub fn blocked_senders(e: &BlockedSenders, _ctx: &GenerationContext) -> Result<Generated, GenerateError> {
    let msg = ExecuteMsg::BlockedSenders {
        to_block: e.to_block.clone(),
    };
    Ok(flat(msg, e.from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn ctx(height: Option<u64>) -> GenerationContext {
        GenerationContext {
            chain_id: 8453,
            destination_height: height,
        }
    }

    fn posted(expires: u64, note: &str) -> PostedFile {
        PostedFile {
            from: Address::repeat_byte(0xab),
            merkle: "0xdeadbeef".to_string(),
            size: 1000,
            note: note.to_string(),
            expires,
        }
    }

    #[test]
    fn test_fee_margin_rounds_up() {
        assert_eq!(fee_with_margin(100), 120);
        assert_eq!(fee_with_margin(7), 9); // 8.4 -> 9
        assert_eq!(fee_with_margin(5), 6);
    }

    #[test]
    fn test_fee_floor_is_one() {
        assert_eq!(fee_with_margin(0), 1);
        assert_eq!(fee_with_margin(1), 2);
    }

    #[test]
    fn test_merkle_to_base64() {
        assert_eq!(merkle_to_base64("m", "deadbeef").unwrap(), "3q2+7w==");
        assert_eq!(merkle_to_base64("m", "0xdeadbeef").unwrap(), "3q2+7w==");
        assert!(matches!(
            merkle_to_base64("m", "xyz"),
            Err(GenerateError::InvalidHex { field: "m", .. })
        ));
    }

    #[test]
    fn test_augment_empty_note() {
        let note = augment_note("", 8453, "0xAbC").unwrap();
        let value: Value = serde_json::from_str(&note).unwrap();
        assert_eq!(value["relayed"]["chain_id"], "Base");
        assert_eq!(value["relayed"]["for"], "0xAbC");
    }

    #[test]
    fn test_augment_keeps_existing_fields() {
        let note = augment_note(r#"{"name":"cat.png"}"#, 99, "0x1").unwrap();
        let value: Value = serde_json::from_str(&note).unwrap();
        assert_eq!(value["name"], "cat.png");
        assert_eq!(value["relayed"]["chain_id"], "99");
    }

    #[test]
    fn test_augment_rejects_bad_notes() {
        assert!(matches!(
            augment_note("{broken", 1, "0x1"),
            Err(GenerateError::InvalidNote(_))
        ));
        assert_eq!(augment_note("[1,2]", 1, "0x1"), Err(GenerateError::NoteNotObject));
    }

    #[test]
    fn test_expiry_height() {
        assert_eq!(expiry_height(1000, 1).unwrap(), 1000 + 14_400);
        assert_eq!(expiry_height(0, 30).unwrap(), 432_000);
        assert!(expiry_height(0, u64::MAX).is_err());
    }

    #[test]
    fn test_posted_file_without_expiry() {
        let out = posted_file(&posted(0, ""), &ctx(None)).unwrap();
        match out.msg {
            ExecuteMsg::PostFile {
                merkle,
                file_size,
                proof_interval,
                max_proofs,
                expires,
                ..
            } => {
                assert_eq!(merkle, "3q2+7w==");
                assert_eq!(file_size, 1000);
                assert_eq!(proof_interval, 7200);
                assert_eq!(max_proofs, 3);
                assert_eq!(expires, 0);
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(out.fee_basis, FeeBasis { size: 3000, hours: 0 });
        assert_eq!(out.evm_address, Address::repeat_byte(0xab).to_checksum(None));
    }

    #[test]
    fn test_posted_file_with_expiry_uses_destination_height() {
        let out = posted_file(&posted(2, "{}"), &ctx(Some(500))).unwrap();
        match out.msg {
            ExecuteMsg::PostFile { expires, .. } => assert_eq!(expires, 500 + 2 * 14_400),
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(out.fee_basis.hours, 48);
    }

    #[test]
    fn test_posted_file_expiry_requires_height() {
        assert_eq!(
            posted_file(&posted(2, ""), &ctx(None)),
            Err(GenerateError::MissingHeight)
        );
    }

    #[test]
    fn test_bought_storage() {
        let e = BoughtStorage {
            from: Address::ZERO,
            for_address: "jkl1xyz".to_string(),
            duration_days: 30,
            size_bytes: 1 << 40,
            referral: String::new(),
        };
        let out = bought_storage(&e, &ctx(None)).unwrap();
        assert_eq!(
            out.fee_basis,
            FeeBasis {
                size: 1 << 40,
                hours: 720
            }
        );
        match out.msg {
            ExecuteMsg::BuyStorage { payment_denom, .. } => assert_eq!(payment_denom, "ujkl"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_deleted_file_tree_hashes_path() {
        let e = DeletedFileTree {
            from: Address::ZERO,
            hash_path: "s/home/photos/".to_string(),
            account: "acct".to_string(),
        };
        let out = deleted_file_tree(&e, &ctx(None)).unwrap();
        match out.msg {
            ExecuteMsg::DeleteFileTree { hash_path, account } => {
                assert_eq!(hash_path, merkle_path("s/home/photos"));
                assert_eq!(account, "acct");
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(out.fee_basis, FeeBasis::default());
    }

    #[test]
    fn test_deleted_notification_maps_sender() {
        let e = DeletedNotification {
            from: Address::ZERO,
            notification_from: "jkl1sender".to_string(),
            time: 42,
        };
        let out = deleted_notification(&e, &ctx(None)).unwrap();
        assert_eq!(
            out.msg,
            ExecuteMsg::DeleteNotification {
                from: "jkl1sender".to_string(),
                time: 42
            }
        );
    }

    #[test]
    fn test_out_of_range_integer() {
        let e = DeletedFile {
            from: Address::ZERO,
            merkle: "00".to_string(),
            start: u64::MAX,
        };
        assert_eq!(
            deleted_file(&e, &ctx(None)),
            Err(GenerateError::OutOfRange {
                field: "start",
                value: u64::MAX
            })
        );
    }
}
