//! Relay configuration
//!
//! Loaded from `config.yaml` in the relay home directory, with `MULBERRY__`
//! environment overrides on top. A default file is written on first run.

use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::types::NetworkLabel;

/// File name of the relay configuration inside the home directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Prefix for environment overrides, e.g. `MULBERRY__JACKAL_CONFIG__RPC`
pub const ENV_PREFIX: &str = "MULBERRY";

/// Main configuration for the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub jackal_config: JackalConfig,
    pub networks_config: Vec<NetworkConfig>,
    #[serde(default)]
    pub relay_config: RelayConfig,
}

/// Destination (Jackal) chain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackalConfig {
    /// Tendermint RPC endpoint
    pub rpc: String,
    /// REST endpoint for account and storage price queries
    #[serde(default = "default_lcd")]
    pub lcd: String,
    /// gRPC endpoint, kept for operators' reference
    #[serde(default)]
    pub grpc: String,
    /// Seed phrase file, relative to the home directory
    pub seed_file: String,
    /// Storage factory contract the relay executes against
    pub contract: String,
    #[serde(default = "default_jackal_chain_id")]
    pub chain_id: String,
    #[serde(default = "default_gas_price")]
    pub gas_price: f64,
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    #[serde(default = "default_denom")]
    pub denom: String,
}

/// One origin EVM network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc: String,
    pub ws: String,
    /// Storage contract address on this network
    pub contract: String,
    pub chain_id: u64,
    /// Confirmation depth before an event is relayed
    pub finality: u64,
    /// Upper bound on concurrent per-log tasks for this network
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl NetworkConfig {
    pub fn label(&self) -> NetworkLabel {
        NetworkLabel {
            name: self.name.clone(),
            chain_id: self.chain_id,
        }
    }
}

/// Which completion broadcaster to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BroadcasterKind {
    #[default]
    Native,
    Cast,
}

/// Retry timings and process options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_receipt_errors")]
    pub max_receipt_errors: u32,
    #[serde(default = "default_callback_retry_delay")]
    pub callback_retry_delay_secs: u64,
    #[serde(default = "default_callback_attempts")]
    pub callback_attempts: u32,
    #[serde(default)]
    pub callback_broadcaster: BroadcasterKind,
    /// Port for `/health` and `/metrics`, 0 disables the server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            poll_interval_secs: default_poll_interval(),
            max_receipt_errors: default_max_receipt_errors(),
            callback_retry_delay_secs: default_callback_retry_delay(),
            callback_attempts: default_callback_attempts(),
            callback_broadcaster: BroadcasterKind::default(),
            api_port: default_api_port(),
        }
    }
}

impl RelayConfig {
    /// Listener dial/subscribe retry, unbounded
    pub fn reconnect_policy(&self) -> BackoffPolicy {
        BackoffPolicy::forever(Duration::from_secs(self.reconnect_delay_secs))
    }

    /// Finality poll interval and consecutive-error budget
    pub fn finality_policy(&self) -> BackoffPolicy {
        BackoffPolicy::fixed(
            Duration::from_secs(self.poll_interval_secs),
            self.max_receipt_errors,
        )
    }

    /// Completion callback attempts and delay between them
    pub fn callback_policy(&self) -> BackoffPolicy {
        BackoffPolicy::fixed(
            Duration::from_secs(self.callback_retry_delay_secs),
            self.callback_attempts,
        )
    }
}

/// Default functions
fn default_lcd() -> String {
    "https://testnet-api.jackalprotocol.com".to_string()
}

fn default_jackal_chain_id() -> String {
    "lupulella-2".to_string()
}

fn default_gas_price() -> f64 {
    0.02
}

fn default_gas_adjustment() -> f64 {
    1.5
}

fn default_denom() -> String {
    "ujkl".to_string()
}

fn default_max_in_flight() -> usize {
    64
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    3
}

fn default_max_receipt_errors() -> u32 {
    30
}

fn default_callback_retry_delay() -> u64 {
    10
}

fn default_callback_attempts() -> u32 {
    2
}

fn default_api_port() -> u16 {
    9090
}

fn testnet(name: &str, host: &str, contract: &str, chain_id: u64) -> NetworkConfig {
    NetworkConfig {
        name: name.to_string(),
        rpc: format!("https://{host}"),
        ws: format!("wss://{host}"),
        contract: contract.to_string(),
        chain_id,
        finality: 2,
        max_in_flight: default_max_in_flight(),
    }
}

impl Default for Config {
    /// Jackal testnet plus the six EVM testnets the storage contract is live on
    fn default() -> Self {
        Self {
            jackal_config: JackalConfig {
                rpc: "https://testnet-rpc.jackalprotocol.com:443".to_string(),
                lcd: default_lcd(),
                grpc: "jackal-testnet-grpc.polkachu.com:17590".to_string(),
                seed_file: "seed.json".to_string(),
                contract: "jkl163jzm5mmy29ke6ecn4m5evqk9lfhxwne3vzjpe3lpyc33yz5uy0skhhxm8"
                    .to_string(),
                chain_id: default_jackal_chain_id(),
                gas_price: default_gas_price(),
                gas_adjustment: default_gas_adjustment(),
                denom: default_denom(),
            },
            networks_config: vec![
                testnet(
                    "Sepolia",
                    "ethereum-sepolia-rpc.publicnode.com",
                    "0x093BB75ba20F4fe05c31a63ac42B93252C31aE02",
                    11155111,
                ),
                testnet(
                    "Base Sepolia",
                    "base-sepolia-rpc.publicnode.com",
                    "0x5d26f092717A538B446A301C2121D6C68157467C",
                    84532,
                ),
                testnet(
                    "OP Sepolia",
                    "optimism-sepolia-rpc.publicnode.com",
                    "0xA3FF0a3e8edCd1c1BefBa6e48e847DB9feF82CA2",
                    11155420,
                ),
                testnet(
                    "Polygon Amoy",
                    "polygon-amoy-bor-rpc.publicnode.com",
                    "0x5d26f092717A538B446A301C2121D6C68157467C",
                    80002,
                ),
                testnet(
                    "Arbitrum Sepolia",
                    "arbitrum-sepolia-rpc.publicnode.com",
                    "0xA3FF0a3e8edCd1c1BefBa6e48e847DB9feF82CA2",
                    421614,
                ),
                testnet(
                    "Soneium Minato",
                    "soneium-sepolia-rpc.publicnode.com",
                    "0xA3FF0a3e8edCd1c1BefBa6e48e847DB9feF82CA2",
                    1946,
                ),
            ],
            relay_config: RelayConfig::default(),
        }
    }
}

/// `~/.mulberry`, or `./.mulberry` when no home directory is known
pub fn default_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mulberry")
}

impl Config {
    /// Load `config.yaml` from `home`, creating the directory and a default
    /// config on first run. `.env` and `MULBERRY__*` variables override the file.
    pub fn load(home: &Path) -> Result<Self> {
        // .env is optional
        let _ = dotenvy::dotenv();

        let path = Self::ensure_file(home)?;

        let config: Config = config::Config::builder()
            .add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .wrap_err_with(|| format!("Failed to read config at {}", path.display()))?
            .try_deserialize()
            .wrap_err("Failed to parse config")?;

        config.validate()?;
        Ok(config)
    }

    /// Create the home directory and default config file if missing
    pub fn ensure_file(home: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(home)
            .wrap_err_with(|| format!("Cannot create home directory at {}", home.display()))?;

        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            let yaml = serde_yaml::to_string(&Config::default())
                .wrap_err("Cannot export the default config")?;
            std::fs::write(&path, yaml)
                .wrap_err_with(|| format!("Cannot write default config to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote default config");
        }
        Ok(path)
    }

    /// Path to the seed phrase file
    pub fn seed_path(&self, home: &Path) -> PathBuf {
        home.join(&self.jackal_config.seed_file)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let jackal = &self.jackal_config;

        if jackal.rpc.is_empty() {
            return Err(eyre!("jackal_config.rpc cannot be empty"));
        }

        if jackal.lcd.is_empty() {
            return Err(eyre!("jackal_config.lcd cannot be empty"));
        }

        if jackal.contract.is_empty() {
            return Err(eyre!("jackal_config.contract cannot be empty"));
        }

        if jackal.seed_file.is_empty() {
            return Err(eyre!("jackal_config.seed_file cannot be empty"));
        }

        if jackal.gas_price < 0.0 || jackal.gas_adjustment <= 0.0 {
            return Err(eyre!(
                "jackal_config.gas_price must be >= 0 and gas_adjustment > 0"
            ));
        }

        if self.networks_config.is_empty() {
            return Err(eyre!("networks_config must list at least one network"));
        }

        let mut seen = HashSet::new();
        for network in &self.networks_config {
            if !seen.insert(network.chain_id) {
                return Err(eyre!(
                    "chain id {} appears more than once in networks_config",
                    network.chain_id
                ));
            }

            if network.rpc.is_empty() {
                return Err(eyre!("{}: rpc cannot be empty", network.name));
            }

            if !(network.ws.starts_with("ws://") || network.ws.starts_with("wss://")) {
                return Err(eyre!(
                    "{}: ws must be a ws:// or wss:// URL, got {}",
                    network.name,
                    network.ws
                ));
            }

            if network.contract.len() != 42 || !network.contract.starts_with("0x") {
                return Err(eyre!(
                    "{}: contract must be a valid hex address (42 chars with 0x prefix)",
                    network.name
                ));
            }

            if network.max_in_flight == 0 {
                return Err(eyre!("{}: max_in_flight must be at least 1", network.name));
            }
        }

        if self.relay_config.callback_attempts == 0 {
            return Err(eyre!("relay_config.callback_attempts must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_home(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mulberry-config-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_relay_defaults() {
        let relay = RelayConfig::default();
        assert_eq!(relay.reconnect_delay_secs, 5);
        assert_eq!(relay.poll_interval_secs, 3);
        assert_eq!(relay.max_receipt_errors, 30);
        assert_eq!(relay.callback_retry_delay_secs, 10);
        assert_eq!(relay.callback_attempts, 2);
        assert_eq!(relay.callback_broadcaster, BroadcasterKind::Native);
        assert_eq!(relay.api_port, 9090);
    }

    #[test]
    fn test_policies_follow_config() {
        let relay = RelayConfig::default();
        assert_eq!(relay.finality_policy().max_attempts, Some(30));
        assert_eq!(
            relay.callback_policy().backoff_for_attempt(0),
            Duration::from_secs(10)
        );
        assert_eq!(relay.reconnect_policy().max_attempts, None);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.networks_config.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_network_validation() {
        let mut config = Config::default();
        config.networks_config[0].contract = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.networks_config[0].ws = "https://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.networks_config[1].chain_id = config.networks_config[0].chain_id;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("11155111"), "{}", err);

        let mut config = Config::default();
        config.networks_config.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jackal_validation() {
        let mut config = Config::default();
        config.jackal_config.contract = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay_config.callback_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_first_run_writes_defaults() {
        let home = scratch_home("first-run");
        let config = Config::load(&home).unwrap();
        assert!(home.join(CONFIG_FILE).exists());
        assert_eq!(config.jackal_config.chain_id, "lupulella-2");
        assert_eq!(config.networks_config[1].name, "Base Sepolia");
        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn test_partial_yaml_gets_defaults() {
        let home = scratch_home("partial");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(
            home.join(CONFIG_FILE),
            r#"
jackal_config:
  rpc: http://localhost:26657
  seed_file: seed.json
  contract: jkl1contract
networks_config:
  - name: Local
    rpc: http://localhost:8545
    ws: ws://localhost:8546
    contract: "0x0000000000000000000000000000000000000001"
    chain_id: 31337
    finality: 0
"#,
        )
        .unwrap();

        let config = Config::load(&home).unwrap();
        assert_eq!(config.jackal_config.denom, "ujkl");
        assert_eq!(config.jackal_config.gas_adjustment, 1.5);
        assert_eq!(config.networks_config[0].max_in_flight, 64);
        assert_eq!(config.relay_config, RelayConfig::default());
        assert_eq!(config.seed_path(&home), home.join("seed.json"));
        let _ = std::fs::remove_dir_all(&home);
    }
}
