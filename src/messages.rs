//! Jackal storage contract message definitions
//!
//! Defines the CosmWasm execute messages relayed to the destination
//! contract. Every relayed message is wrapped in a `call_bindings` envelope
//! that names the EVM account which authorized it.

use cosmrs::{AccountId, Denom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execute messages understood by the storage contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    PostKey {
        key: String,
    },
    PostFile {
        /// Merkle root (base64)
        merkle: String,
        file_size: i64,
        proof_interval: i64,
        proof_type: i64,
        max_proofs: i64,
        /// Expiry block height, 0 for none
        expires: i64,
        /// JSON note
        note: String,
    },
    BuyStorage {
        for_address: String,
        duration_days: i64,
        bytes: i64,
        payment_denom: String,
        referral: String,
    },
    DeleteFile {
        merkle: String,
        start: i64,
    },
    RequestReportForm {
        prover: String,
        merkle: String,
        owner: String,
        start: i64,
    },
    DeleteFileTree {
        hash_path: String,
        account: String,
    },
    ProvisionFileTree {
        editors: String,
        viewers: String,
        tracking_number: String,
    },
    PostFileTree {
        account: String,
        hash_parent: String,
        hash_child: String,
        contents: String,
        viewers: String,
        editors: String,
        tracking_number: String,
    },
    AddViewers {
        viewer_ids: String,
        viewer_keys: String,
        address: String,
        file_owner: String,
    },
    RemoveViewers {
        viewer_ids: String,
        address: String,
        file_owner: String,
    },
    ResetViewers {
        address: String,
        file_owner: String,
    },
    ChangeOwner {
        address: String,
        file_owner: String,
        new_owner: String,
    },
    AddEditors {
        editor_ids: String,
        editor_keys: String,
        address: String,
        file_owner: String,
    },
    RemoveEditors {
        editor_ids: String,
        address: String,
        file_owner: String,
    },
    ResetEditors {
        address: String,
        file_owner: String,
    },
    CreateNotification {
        to: String,
        contents: String,
        private_contents: String,
    },
    DeleteNotification {
        from: String,
        time: i64,
    },
    #[serde(rename = "block_senders")]
    BlockedSenders {
        to_block: Vec<String>,
    },
}

/// Factory-level envelope binding a storage message to its EVM author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactoryExecuteMsg {
    CallBindings {
        /// EIP-55 address of the origin-chain caller
        evm_address: String,
        msg: ExecuteMsg,
    },
}

impl FactoryExecuteMsg {
    pub fn call_bindings(evm_address: impl Into<String>, msg: ExecuteMsg) -> Self {
        FactoryExecuteMsg::CallBindings {
            evm_address: evm_address.into(),
            msg,
        }
    }
}

/// A single coin of attached funds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Funds {
    pub denom: String,
    pub amount: u128,
}

/// Reasons an execute request is rejected before broadcast
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid sender address {0}")]
    InvalidSender(String),
    #[error("invalid contract address {0}")]
    InvalidContract(String),
    #[error("empty execute message")]
    EmptyMsg,
    #[error("execute message is not valid JSON: {0}")]
    MalformedMsg(String),
    #[error("invalid denom {0}")]
    InvalidDenom(String),
    #[error("zero amount of {0} attached")]
    ZeroFunds(String),
    #[error("duplicate denom {0} in funds")]
    DuplicateDenom(String),
}

/// A MsgExecuteContract in plain form, ready for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub sender: String,
    pub contract: String,
    /// JSON-encoded execute message
    pub msg: Vec<u8>,
    pub funds: Vec<Funds>,
}

impl ExecuteRequest {
    /// Build a request that relays `envelope` with `fee` attached in `denom`
    pub fn new(
        sender: impl Into<String>,
        contract: impl Into<String>,
        envelope: &FactoryExecuteMsg,
        fee: u128,
        denom: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            sender: sender.into(),
            contract: contract.into(),
            msg: serde_json::to_vec(envelope)?,
            funds: vec![Funds {
                denom: denom.into(),
                amount: fee,
            }],
        })
    }

    /// Stateless well-formedness checks, the same ones the chain runs before
    /// accepting the message.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.sender
            .parse::<AccountId>()
            .map_err(|_| ValidationError::InvalidSender(self.sender.clone()))?;
        self.contract
            .parse::<AccountId>()
            .map_err(|_| ValidationError::InvalidContract(self.contract.clone()))?;

        if self.msg.is_empty() {
            return Err(ValidationError::EmptyMsg);
        }
        serde_json::from_slice::<serde_json::Value>(&self.msg)
            .map_err(|e| ValidationError::MalformedMsg(e.to_string()))?;

        let mut seen = Vec::with_capacity(self.funds.len());
        for coin in &self.funds {
            coin.denom
                .parse::<Denom>()
                .map_err(|_| ValidationError::InvalidDenom(coin.denom.clone()))?;
            if coin.amount == 0 {
                return Err(ValidationError::ZeroFunds(coin.denom.clone()));
            }
            if seen.contains(&coin.denom.as_str()) {
                return Err(ValidationError::DuplicateDenom(coin.denom.clone()));
            }
            seen.push(coin.denom.as_str());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> String {
        AccountId::new("jkl", &[1u8; 20]).unwrap().to_string()
    }

    fn contract() -> String {
        AccountId::new("jkl", &[2u8; 32]).unwrap().to_string()
    }

    #[test]
    fn test_call_bindings_wire_format() {
        let envelope = FactoryExecuteMsg::call_bindings(
            "0x0000000000000000000000000000000000000001",
            ExecuteMsg::PostKey {
                key: "abc".to_string(),
            },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "call_bindings": {
                    "evm_address": "0x0000000000000000000000000000000000000001",
                    "msg": {"post_key": {"key": "abc"}}
                }
            })
        );
    }

    #[test]
    fn test_blocked_senders_tag() {
        let msg = ExecuteMsg::BlockedSenders {
            to_block: vec!["jkl1a".to_string()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with("{\"block_senders\""));
    }

    #[test]
    fn test_delete_notification_field_names() {
        let msg = ExecuteMsg::DeleteNotification {
            from: "jkl1a".to_string(),
            time: 5,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["delete_notification"]["from"], "jkl1a");
        assert_eq!(json["delete_notification"]["time"], 5);
    }

    fn request(fee: u128) -> ExecuteRequest {
        let envelope = FactoryExecuteMsg::call_bindings(
            "0x0000000000000000000000000000000000000001",
            ExecuteMsg::ResetViewers {
                address: "a".to_string(),
                file_owner: "b".to_string(),
            },
        );
        ExecuteRequest::new(sender(), contract(), &envelope, fee, "ujkl").unwrap()
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        assert_eq!(request(10).validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_zero_funds() {
        assert_eq!(
            request(0).validate(),
            Err(ValidationError::ZeroFunds("ujkl".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_addresses() {
        let mut req = request(1);
        req.sender = "not-bech32".to_string();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidSender(_))
        ));

        let mut req = request(1);
        req.contract = String::new();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidContract(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_msg() {
        let mut req = request(1);
        req.msg = Vec::new();
        assert_eq!(req.validate(), Err(ValidationError::EmptyMsg));

        req.msg = b"{not json".to_vec();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::MalformedMsg(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_denoms() {
        let mut req = request(1);
        req.funds.push(Funds {
            denom: "ujkl".to_string(),
            amount: 2,
        });
        assert_eq!(
            req.validate(),
            Err(ValidationError::DuplicateDenom("ujkl".to_string()))
        );
    }
}
