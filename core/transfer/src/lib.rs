// sentinel/core/transfer/src/lib.rs

// Peer-to-peer exchange of sealed log files
pub mod auth;
pub mod bandwidth;
pub mod client;
pub mod error;
pub mod ledger;
pub mod replay;
pub mod server;
pub mod store;

#[cfg(test)]
mod service_tests;

pub use auth::{AuthContext, Authenticator, AuthorizedPeers};
pub use bandwidth::{BandwidthConfig, BandwidthTracker};
pub use client::PeerClient;
pub use error::TransferError;
pub use ledger::{LedgerClient, LedgerConfig, LedgerReceipt};
pub use replay::ReplayCache;
pub use server::{TransferConfig, TransferService, UploadResponse};
pub use store::{LogStore, StoreConfig, StoredLog};
