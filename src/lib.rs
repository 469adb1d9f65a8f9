#![deny(missing_docs)]

//! A threshold Ed25519 cosigner for high-availability validator block
//! signing.
//!
//! A quorum of cosigner processes holds Shamir shares of one Ed25519
//! signing key; any `t`-of-`n` subset can jointly sign a block vote, while
//! fewer learn nothing usable. Each round the cosigners freshly deal Shamir
//! shares of ephemeral nonces, exchange the parts under RSA-OAEP encryption
//! and RSA-PSS authentication, and emit partial signatures that combine
//! into a standard RFC 8032 signature. A durable height/round/step record
//! makes double-signing impossible across crashes and restarts.
//!
//! The RPC transport that moves envelopes between processes, leader
//! election, and key provisioning are external collaborators; this crate is
//! the signing engine they drive.

mod cosigner;
mod error;
mod hsm;
mod sign_state;

pub mod curve;
pub mod messages;
pub mod shamir;
pub mod threshold;
pub mod vote;

pub use cosigner::{Cosigner, CosignerKey, CosignerPeer, LocalCosigner};
pub use error::Error;
pub use hsm::HsmCosigner;
pub use sign_state::{SignState, SignStateConsensus};
