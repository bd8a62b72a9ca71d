//! Jackal node client for transaction signing and broadcasting
//!
//! Account state and storage prices come from the LCD REST API; signed
//! transactions go out through Tendermint RPC `broadcast_tx_sync`.

use std::time::Duration;

use async_trait::async_trait;
use cosmrs::{
    cosmwasm::MsgExecuteContract,
    tendermint::chain,
    tx::{self, Fee, Msg, SignDoc, SignerInfo},
    AccountId, Coin, Denom,
};
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use tendermint_rpc::{Client as _, HttpClient};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DestinationClient, SubmitResponse};
use crate::config::JackalConfig;
use crate::messages::ExecuteRequest;
use crate::wallet::JackalSigner;

/// Gas limit before adjustment for a single execute message
pub const BASE_GAS_LIMIT: u64 = 500_000;

/// Account info from LCD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub sequence: u64,
    pub account_number: u64,
}

/// Jackal client holding the relay's destination signer
pub struct JackalClient {
    lcd_url: String,
    rpc: HttpClient,
    http: Client,
    chain_id: chain::Id,
    signer: JackalSigner,
    sender: String,
    gas_limit: u64,
    fee_amount: u128,
    fee_denom: Denom,
    /// Cached account state; the sequence is bumped locally after each
    /// accepted broadcast and refetched after any failure.
    account: Mutex<Option<AccountInfo>>,
}

impl JackalClient {
    pub fn new(config: &JackalConfig, signer: JackalSigner) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let rpc = HttpClient::new(config.rpc.as_str())
            .map_err(|e| eyre!("Invalid Jackal RPC url {}: {}", config.rpc, e))?;

        let chain_id = config
            .chain_id
            .parse()
            .map_err(|e| eyre!("Invalid chain ID {}: {}", config.chain_id, e))?;

        let fee_denom = config
            .denom
            .parse()
            .map_err(|e| eyre!("Invalid denom {}: {}", config.denom, e))?;

        let (gas_limit, fee_amount) = gas_and_fee(config.gas_adjustment, config.gas_price);
        let sender = signer.address.to_string();

        info!(
            address = %sender,
            chain_id = %config.chain_id,
            gas_limit = gas_limit,
            "Jackal client initialized"
        );

        Ok(Self {
            lcd_url: config.lcd.trim_end_matches('/').to_string(),
            rpc,
            http,
            chain_id,
            signer,
            sender,
            gas_limit,
            fee_amount,
            fee_denom,
            account: Mutex::new(None),
        })
    }

    /// Get account info (sequence and account number)
    pub async fn get_account_info(&self) -> Result<AccountInfo> {
        let url = format!(
            "{}/cosmos/auth/v1beta1/accounts/{}",
            self.lcd_url, self.sender
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query account info")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Account query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let data: serde_json::Value = response.json().await?;
        parse_account_info(&data)
    }

    fn build_tx(&self, request: &ExecuteRequest, account: AccountInfo) -> Result<Vec<u8>> {
        let funds = request
            .funds
            .iter()
            .map(|coin| -> Result<Coin> {
                Ok(Coin {
                    denom: coin
                        .denom
                        .parse()
                        .map_err(|e| eyre!("Invalid denom {}: {}", coin.denom, e))?,
                    amount: coin.amount,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let execute_msg = MsgExecuteContract {
            sender: request
                .sender
                .parse::<AccountId>()
                .map_err(|e| eyre!("Invalid sender address: {}", e))?,
            contract: request
                .contract
                .parse::<AccountId>()
                .map_err(|e| eyre!("Invalid contract address: {}", e))?,
            msg: request.msg.clone(),
            funds,
        };

        let body = tx::Body::new(
            vec![execute_msg
                .to_any()
                .map_err(|e| eyre!("Failed to convert message: {}", e))?],
            "",
            0u32,
        );

        let signer_info =
            SignerInfo::single_direct(Some(self.signer.signing_key.public_key()), account.sequence);
        let fee = Fee::from_amount_and_gas(
            Coin {
                denom: self.fee_denom.clone(),
                amount: self.fee_amount,
            },
            self.gas_limit,
        );
        let auth_info = signer_info.auth_info(fee);

        let sign_doc = SignDoc::new(&body, &auth_info, &self.chain_id, account.account_number)
            .map_err(|e| eyre!("Failed to create sign doc: {}", e))?;

        let tx_raw = sign_doc
            .sign(&self.signer.signing_key)
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;

        tx_raw
            .to_bytes()
            .map_err(|e| eyre!("Failed to serialize transaction: {}", e))
    }

    async fn account_state(&self) -> Result<AccountInfo> {
        let mut cached = self.account.lock().await;
        if let Some(account) = *cached {
            return Ok(account);
        }
        let account = self.get_account_info().await?;
        *cached = Some(account);
        Ok(account)
    }

    async fn record_outcome(&self, accepted: bool) {
        let mut cached = self.account.lock().await;
        match (accepted, cached.as_mut()) {
            (true, Some(account)) => account.sequence += 1,
            _ => *cached = None,
        }
    }
}

#[async_trait]
impl DestinationClient for JackalClient {
    fn sender(&self) -> &str {
        &self.sender
    }

    async fn latest_height(&self) -> Result<u64> {
        let info = self
            .rpc
            .abci_info()
            .await
            .wrap_err("Failed to query ABCI info")?;
        Ok(info.last_block_height.value())
    }

    async fn storage_price(&self, size: u64, hours: u64) -> Result<u128> {
        let url = format!(
            "{}/jackal/canine-chain/storage/price_check/{}h/{}",
            self.lcd_url, hours, size
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query storage price")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Price query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let data: serde_json::Value = response.json().await?;
        parse_price(&data)
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<Option<SubmitResponse>> {
        let account = self.account_state().await?;
        let tx_bytes = self.build_tx(request, account)?;

        debug!(
            sequence = account.sequence,
            contract = %request.contract,
            "Broadcasting transaction"
        );

        let response = match self.rpc.broadcast_tx_sync(tx_bytes).await {
            Ok(response) => response,
            Err(e) => {
                self.record_outcome(false).await;
                return Err(eyre!("Broadcast failed: {}", e));
            }
        };

        if response.code.is_err() {
            self.record_outcome(false).await;
            warn!(
                code = response.code.value(),
                raw_log = %response.log,
                "Transaction rejected"
            );
            return Err(eyre!(
                "Transaction failed (code {}): {}",
                response.code.value(),
                response.log
            ));
        }

        self.record_outcome(true).await;

        let tx_hash = response.hash.to_string();
        if tx_hash.is_empty() {
            return Ok(None);
        }

        Ok(Some(SubmitResponse {
            tx_hash,
            raw_log: response.log,
        }))
    }
}

/// Gas limit after adjustment and the fee paid for it
fn gas_and_fee(gas_adjustment: f64, gas_price: f64) -> (u64, u128) {
    let gas_limit = (BASE_GAS_LIMIT as f64 * gas_adjustment).ceil() as u64;
    let fee_amount = (gas_limit as f64 * gas_price).ceil() as u128;
    (gas_limit, fee_amount)
}

/// Account number and sequence from an `auth/v1beta1/accounts` response.
/// Vesting accounts nest both under `base_account`.
fn parse_account_info(data: &serde_json::Value) -> Result<AccountInfo> {
    let account = data
        .get("account")
        .ok_or_else(|| eyre!("Missing 'account' field in response"))?;

    let field = |name: &str| -> Result<u64> {
        let value = account
            .get(name)
            .or_else(|| account.get("base_account").and_then(|b| b.get(name)))
            .and_then(|v| v.as_str())
            .ok_or_else(|| eyre!("Missing '{}' in account response", name))?;
        value
            .parse()
            .map_err(|e| eyre!("Invalid '{}' {}: {}", name, value, e))
    };

    Ok(AccountInfo {
        sequence: field("sequence")?,
        account_number: field("account_number")?,
    })
}

fn parse_price(data: &serde_json::Value) -> Result<u128> {
    let price = data
        .get("price")
        .ok_or_else(|| eyre!("Missing 'price' field in response: {}", data))?;

    match price {
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|e| eyre!("Invalid price {}: {}", s, e)),
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| eyre!("Invalid price {}", n)),
        other => Err(eyre!("Invalid price {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_and_fee() {
        let (gas, fee) = gas_and_fee(1.5, 0.02);
        assert_eq!(gas, 750_000);
        assert_eq!(fee, 15_000);
    }

    #[test]
    fn test_parse_base_account() {
        let data = serde_json::json!({
            "account": {
                "@type": "/cosmos.auth.v1beta1.BaseAccount",
                "address": "jkl1...",
                "account_number": "42",
                "sequence": "7"
            }
        });
        assert_eq!(
            parse_account_info(&data).unwrap(),
            AccountInfo {
                sequence: 7,
                account_number: 42
            }
        );
    }

    #[test]
    fn test_parse_vesting_account() {
        let data = serde_json::json!({
            "account": {
                "base_account": {"account_number": "3", "sequence": "9"}
            }
        });
        let info = parse_account_info(&data).unwrap();
        assert_eq!(info.account_number, 3);
        assert_eq!(info.sequence, 9);
    }

    #[test]
    fn test_parse_account_missing() {
        assert!(parse_account_info(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_parse_account_without_sequence() {
        let data = serde_json::json!({
            "account": {"account_number": "42"}
        });
        let err = parse_account_info(&data).unwrap_err();
        assert!(err.to_string().contains("sequence"), "{err}");
    }

    #[test]
    fn test_parse_account_malformed_number() {
        let data = serde_json::json!({
            "account": {"account_number": "forty-two", "sequence": "7"}
        });
        let err = parse_account_info(&data).unwrap_err();
        assert!(err.to_string().contains("account_number"), "{err}");
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(&serde_json::json!({"price": "1200"})).unwrap(), 1200);
        assert_eq!(parse_price(&serde_json::json!({"price": 5})).unwrap(), 5);
        assert!(parse_price(&serde_json::json!({"price": "abc"})).is_err());
        assert!(parse_price(&serde_json::json!({})).is_err());
    }
}
