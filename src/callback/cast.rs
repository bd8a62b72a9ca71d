//! Completion broadcaster that shells out to Foundry's `cast send`

use async_trait::async_trait;
use eyre::{eyre, WrapErr};
use tokio::process::Command;
use tracing::debug;

use super::{BroadcastOutcome, CompletionBroadcaster, CompletionRequest, FINISH_MESSAGE_SIGNATURE};

#[derive(Debug, Clone)]
pub struct CastBroadcaster {
    program: String,
}

impl Default for CastBroadcaster {
    fn default() -> Self {
        Self {
            program: "cast".to_string(),
        }
    }
}

impl CastBroadcaster {
    /// Use a specific `cast` binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CompletionBroadcaster for CastBroadcaster {
    async fn broadcast(&self, request: &CompletionRequest) -> eyre::Result<BroadcastOutcome> {
        let key = request.key.to_hex();
        let contract = request.contract.to_checksum(None);

        debug!(
            program = %self.program,
            rpc_url = %request.rpc_url,
            contract = %contract,
            message_id = %request.message_id,
            "Running cast send"
        );

        let output = Command::new(&self.program)
            .arg("send")
            .arg("--rpc-url")
            .arg(&request.rpc_url)
            .arg("--private-key")
            .arg(key.expose())
            .arg(&contract)
            .arg(FINISH_MESSAGE_SIGNATURE)
            .arg(&request.message_id)
            .output()
            .await
            .wrap_err_with(|| format!("Failed to run {}", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(eyre!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(parse_cast_output(&stdout))
    }
}

/// Read the `status` and `transactionHash` lines of a `cast send` receipt
pub fn parse_cast_output(output: &str) -> BroadcastOutcome {
    let mut outcome = BroadcastOutcome::default();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("status") => outcome.success = fields.next() == Some("1"),
            Some("transactionHash") => outcome.tx_hash = fields.next().map(str::to_string),
            _ => {}
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_successful_receipt() {
        let output = "\
blockHash            0x5c1f
blockNumber          7712
status               1 (success)
transactionHash      0xfeed
type                 2
";
        assert_eq!(
            parse_cast_output(output),
            BroadcastOutcome {
                success: true,
                tx_hash: Some("0xfeed".to_string())
            }
        );
    }

    #[test]
    fn test_parse_reverted_receipt() {
        let output = "status               0 (failed)\ntransactionHash      0xdead\n";
        let outcome = parse_cast_output(output);
        assert!(!outcome.success);
        assert_eq!(outcome.tx_hash.as_deref(), Some("0xdead"));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_cast_output("Error: nonce too low"), BroadcastOutcome::default());
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let broadcaster = CastBroadcaster::with_program("definitely-not-a-real-cast-binary");
        let request = CompletionRequest {
            rpc_url: "http://localhost:8545".to_string(),
            key: crate::wallet::EvmKey::from_bytes([7u8; 32]).unwrap(),
            contract: alloy::primitives::Address::ZERO,
            message_id: "x".to_string(),
        };
        assert!(broadcaster.broadcast(&request).await.is_err());
    }
}
