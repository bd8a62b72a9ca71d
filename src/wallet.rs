//! Relay key material
//!
//! One BIP-39 seed backs both identities: the Jackal signer that pays for
//! relayed messages and the EVM key that reports completion on origin chains.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use bip39::Mnemonic;
use cosmrs::{
    bip32::{DerivationPath, XPrv},
    crypto::secp256k1::SigningKey,
    AccountId,
};
use eyre::{eyre, Result, WrapErr};
use std::path::Path;
use tracing::info;

use crate::redact::Redacted;

/// Cosmos derivation path used by Jackal
pub const JACKAL_DERIVATION_PATH: &str = "m/44'/118'/0'/0/0";

/// Standard Ethereum derivation path
pub const EVM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

pub const JACKAL_PREFIX: &str = "jkl";

const MNEMONIC_WORDS: usize = 24;

/// Destination-chain signer
pub struct JackalSigner {
    pub signing_key: SigningKey,
    pub address: AccountId,
}

/// Origin-chain key used for completion callbacks
#[derive(Clone)]
pub struct EvmKey {
    key: Redacted<[u8; 32]>,
    pub address: Address,
}

impl EvmKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| eyre!("Invalid EVM private key: {}", e))?;
        Ok(Self {
            key: Redacted(bytes),
            address: signer.address(),
        })
    }

    pub fn signer(&self) -> Result<PrivateKeySigner> {
        PrivateKeySigner::from_slice(self.key.expose())
            .map_err(|e| eyre!("Invalid EVM private key: {}", e))
    }

    /// `0x`-prefixed hex, for tools that take the key on the command line
    pub fn to_hex(&self) -> Redacted<String> {
        Redacted(format!("0x{}", hex::encode(self.key.expose())))
    }
}

impl std::fmt::Debug for EvmKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmKey")
            .field("key", &self.key)
            .field("address", &self.address)
            .finish()
    }
}

pub struct Wallet {
    pub jackal: JackalSigner,
    pub evm: EvmKey,
}

impl Wallet {
    /// Derive both identities from a mnemonic
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic =
            Mnemonic::parse(phrase.trim()).map_err(|e| eyre!("Invalid mnemonic: {}", e))?;
        let seed = mnemonic.to_seed("");

        let jackal_path: DerivationPath = JACKAL_DERIVATION_PATH
            .parse()
            .map_err(|e| eyre!("Invalid derivation path: {:?}", e))?;
        let signing_key = SigningKey::derive_from_path(seed, &jackal_path)
            .map_err(|e| eyre!("Failed to derive signing key: {}", e))?;
        let address = signing_key
            .public_key()
            .account_id(JACKAL_PREFIX)
            .map_err(|e| eyre!("Failed to get account ID: {}", e))?;

        let evm_path: DerivationPath = EVM_DERIVATION_PATH
            .parse()
            .map_err(|e| eyre!("Invalid derivation path: {:?}", e))?;
        let xprv = XPrv::derive_from_path(seed, &evm_path)
            .map_err(|e| eyre!("Failed to derive EVM key: {}", e))?;
        let mut evm_bytes = [0u8; 32];
        evm_bytes.copy_from_slice(&xprv.private_key().to_bytes());
        let evm = EvmKey::from_bytes(evm_bytes)?;

        Ok(Self {
            jackal: JackalSigner {
                signing_key,
                address,
            },
            evm,
        })
    }

    /// Read the seed file, generating a fresh 24-word phrase on first run
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mnemonic = Mnemonic::generate(MNEMONIC_WORDS)
                .map_err(|e| eyre!("Cannot generate seed phrase: {}", e))?;
            std::fs::write(path, mnemonic.to_string())
                .wrap_err_with(|| format!("Cannot write seed file {}", path.display()))?;
            restrict_permissions(path)?;
            println!(
                "You have just generated a new seed phrase for this relay at {}",
                path.display()
            );
        }

        let phrase = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Cannot read seed file {}", path.display()))?;
        let wallet = Self::from_mnemonic(&phrase)?;

        info!(
            jackal_address = %wallet.jackal.address,
            evm_address = %wallet.evm.address,
            "Wallet loaded"
        );
        Ok(wallet)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .wrap_err("Cannot restrict seed file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
