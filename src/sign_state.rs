// -*- mode: rust; -*-
//
// This file is part of cosigner.
// Copyright (c) 2025-2026 Cosigner Developers
// See LICENSE for licensing information.

//! The durable last-signed record.
//!
//! At most one [`SignStateConsensus`] record exists per cosigner. It only
//! ever moves forward in height/round/step order, and it is made durable
//! (write-temp, fsync, rename) before a signature is released to peers. On
//! crash the file is the source of truth.

use std::io::Write;
use std::path::{Path, PathBuf};

use atomicwrites::{AtomicFile, OverwriteBehavior::AllowOverwrite};
use serde::{Deserialize, Serialize};

use crate::vote::{HrsKey, HrstKey, Vote};
use crate::Error;

/// The last fully-signed record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignStateConsensus {
    /// Height of the last signed vote.
    pub height: i64,
    /// Round of the last signed vote.
    pub round: i64,
    /// Step of the last signed vote.
    pub step: u8,
    /// The partial signature that was emitted.
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// The exact sign bytes that were signed.
    #[serde(with = "hex::serde")]
    pub sign_bytes: Vec<u8>,
    /// The aggregate ephemeral public point the signature commits to.
    #[serde(with = "hex::serde")]
    pub ephemeral_public: Vec<u8>,
}

impl SignStateConsensus {
    /// The height/round/step coordinate of this record.
    pub fn hrs_key(&self) -> HrsKey {
        HrsKey {
            height: self.height,
            round: self.round,
            step: self.step,
        }
    }
}

/// Durable sign state backed by a file.
pub struct SignState {
    consensus: SignStateConsensus,
    path: PathBuf,
}

impl SignState {
    /// Open the sign state at `path`, creating an initial height-zero
    /// record (and the file) if none exists yet.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<SignState, Error> {
        let path = path.as_ref().to_path_buf();
        match std::fs::read(&path) {
            Ok(bytes) => {
                let consensus: SignStateConsensus = serde_json::from_slice(&bytes)?;
                Ok(SignState { consensus, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut state = SignState {
                    consensus: SignStateConsensus::default(),
                    path,
                };
                state.persist()?;
                Ok(state)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The current record.
    pub fn consensus(&self) -> &SignStateConsensus {
        &self.consensus
    }

    /// The persisted height/round/step coordinate.
    pub fn hrs_key(&self) -> HrsKey {
        self.consensus.hrs_key()
    }

    /// Compare `hrst` against the persisted coordinate.
    ///
    /// Returns `true` if the height/round/step is identical, `false` if it
    /// is strictly greater, and [`Error::Regression`] if it is strictly
    /// less (double-sign risk; fatal, never retried).
    pub fn check_hrs(&self, hrst: &HrstKey) -> Result<bool, Error> {
        let requested = hrst.hrs();
        let persisted = self.hrs_key();
        if requested < persisted {
            return Err(Error::Regression {
                persisted,
                requested,
            });
        }
        Ok(requested == persisted)
    }

    /// Check that `candidate` differs from the persisted sign bytes only in
    /// its timestamp field.
    ///
    /// This is the sole permitted source of two signatures at the same
    /// height/round/step: a proposer re-timestamping an otherwise identical
    /// vote. Any other difference is [`Error::ConflictingData`].
    pub fn only_differ_by_timestamp(&self, candidate: &[u8]) -> Result<(), Error> {
        let mut candidate = Vote::decode(candidate)?;
        let mut persisted = Vote::decode(&self.consensus.sign_bytes)?;
        candidate.timestamp = 0;
        persisted.timestamp = 0;
        if candidate != persisted {
            return Err(Error::ConflictingData);
        }
        Ok(())
    }

    /// Atomically persist `record`, replacing the current one.
    ///
    /// A record at the same height/round/step with identical sign bytes is
    /// [`Error::SameHrs`] (the caller treats it as "no change"); one at a
    /// strictly lower coordinate is [`Error::Regression`]. The record is on
    /// disk, fsynced, before this returns.
    pub fn save(&mut self, record: SignStateConsensus) -> Result<(), Error> {
        let requested = record.hrs_key();
        let persisted = self.hrs_key();
        if requested < persisted {
            return Err(Error::Regression {
                persisted,
                requested,
            });
        }
        if requested == persisted && record.sign_bytes == self.consensus.sign_bytes {
            return Err(Error::SameHrs);
        }

        self.consensus = record;
        self.persist()
    }

    fn persist(&mut self) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(&self.consensus)?;
        AtomicFile::new(&self.path, AllowOverwrite)
            .write(|f| f.write_all(&bytes))
            .map_err(|e| match e {
                atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => Error::Io(e),
            })
    }
}
