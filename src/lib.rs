//! Mulberry: relays storage-contract events from EVM chains to Jackal.

pub mod api;
pub mod backoff;
pub mod callback;
pub mod config;
pub mod destination;
pub mod events;
pub mod finality;
pub mod generator;
pub mod hash;
pub mod messages;
pub mod metrics;
pub mod redact;
pub mod relay;
pub mod types;
pub mod wallet;
pub mod watchers;
