// -*- mode: rust; -*-
//
// This file is part of cosigner.
// Copyright (c) 2025-2026 Cosigner Developers
// See LICENSE for licensing information.

use thiserror::Error;

use crate::vote::{HrsKey, HrstKey};

/// An error arising from threshold cosigning.
///
/// Protocol failures are always returned, never panicked; only violations of
/// programmer invariants (such as a peer id outside the configured range
/// slipping past construction-time validation) may abort.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested height/round/step is strictly behind the persisted
    /// sign state. Signing again at an earlier coordinate is a double-sign
    /// risk; callers must treat this as fatal and never retry.
    #[error("sign state regression: persisted {persisted}, requested {requested}")]
    Regression {
        /// The height/round/step of the last durable record.
        persisted: HrsKey,
        /// The height/round/step that was requested.
        requested: HrsKey,
    },

    /// Two sign requests at the same height/round/step differ in a field
    /// other than the timestamp. Fatal: producing both signatures would be
    /// slashable.
    #[error("conflicting sign bytes at the same height/round/step")]
    ConflictingData,

    /// The record being saved is identical (same height/round/step, same
    /// sign bytes) to the persisted one. A non-fatal sentinel: `sign`
    /// treats it as "no change" and returns the persisted signature.
    #[error("sign state unchanged for this height/round/step")]
    SameHrs,

    /// `sign` was called before any ephemeral shares were dealt for the
    /// round. Recoverable by restarting the round's share exchange.
    #[error("no ephemeral share metadata for {0}")]
    NoMetadataForHrs(HrstKey),

    /// Fewer peer share slots are populated than the signing threshold
    /// requires. Recoverable by completing the round's share exchange.
    #[error("insufficient ephemeral shares: have {have}, need {need}")]
    InsufficientShares {
        /// Populated peer slots.
        have: usize,
        /// The configured threshold.
        need: usize,
    },

    /// The aggregated ephemeral share is not a canonical Ed25519 scalar
    /// (or is not exactly 32 bytes). Recoverable by restarting the round.
    #[error("ephemeral share is not a canonical scalar")]
    EphemeralShareOutOfBounds,

    /// The peer id is not part of the configured cosigner set.
    #[error("unknown peer id {0}")]
    UnknownPeer(u8),

    /// The envelope's RSA-PSS signature did not verify under the claimed
    /// source peer's public key. The message must be dropped.
    #[error("peer authentication failed for claimed source id {0}")]
    PeerAuth(u8),

    /// The envelope carries no source signature.
    #[error("envelope is missing its source signature")]
    MissingSignature,

    /// A signature fragment passed to combination was malformed.
    #[error("malformed signature fragment: {0}")]
    MalformedSignatureShare(&'static str),

    /// The sign bytes could not be decoded as a canonical block vote.
    #[error("malformed vote sign bytes: {0}")]
    MalformedSignBytes(serde_json::Error),

    /// An RSA or Ed25519 primitive failed.
    #[error("cryptographic primitive failure: {0}")]
    Crypto(String),

    /// The cosigner set, threshold, or share set is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// Serializing or deserializing an envelope or state record failed.
    #[error("serialization failure")]
    Serialization(#[from] serde_json::Error),

    /// Reading or durably writing the sign state file failed.
    #[error("sign state i/o failure")]
    Io(#[from] std::io::Error),
}

impl From<rsa::Error> for Error {
    fn from(e: rsa::Error) -> Self {
        Error::Crypto(e.to_string())
    }
}
