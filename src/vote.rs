//! The canonical block-vote payload and its consensus coordinates.
//!
//! A vote is identified by its height/round/step (HRS) coordinates; the
//! timestamp is a secondary tag that keys per-round ephemeral state (HRST)
//! but never participates in monotonicity comparisons. Sign bytes are the
//! canonical JSON encoding of [`Vote`] with struct-declaration field order;
//! the field names are part of the signed surface and must stay byte-stable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Height, round and step of a vote, totally ordered lexicographically.
///
/// This is the coordinate used for sign-state monotonicity: a cosigner never
/// signs at an `HrsKey` below its persisted one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HrsKey {
    /// Block height.
    pub height: i64,
    /// Consensus round within the height.
    pub round: i64,
    /// Vote step (prevote, precommit, ...).
    pub step: u8,
}

impl fmt::Display for HrsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.height, self.round, self.step)
    }
}

/// An [`HrsKey`] tagged with the vote timestamp, keying per-round ephemeral
/// share state.
///
/// Equality and hashing include the timestamp (a re-timestamped vote gets a
/// fresh nonce exchange); ordering questions always go through [`Self::hrs`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HrstKey {
    /// Block height.
    pub height: i64,
    /// Consensus round within the height.
    pub round: i64,
    /// Vote step.
    pub step: u8,
    /// Vote timestamp, nanoseconds since the Unix epoch.
    pub timestamp: i64,
}

impl HrstKey {
    /// The timestamp-free coordinate used for monotonicity.
    pub fn hrs(&self) -> HrsKey {
        HrsKey {
            height: self.height,
            round: self.round,
            step: self.step,
        }
    }
}

impl fmt::Display for HrstKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.height, self.round, self.step, self.timestamp
        )
    }
}

/// The canonical block-vote payload a cosigner is asked to sign.
///
/// Serialized field names and order are consensus-critical: two votes are
/// "the same" for double-sign purposes exactly when their encodings agree
/// in every field but `Timestamp`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Block height.
    #[serde(rename = "Height")]
    pub height: i64,
    /// Consensus round.
    #[serde(rename = "Round")]
    pub round: i64,
    /// Vote step.
    #[serde(rename = "Step")]
    pub step: u8,
    /// Hash of the proposed block, empty for nil votes.
    #[serde(rename = "BlockID", with = "hex::serde")]
    pub block_id: Vec<u8>,
    /// Chain identifier.
    #[serde(rename = "ChainID")]
    pub chain_id: String,
    /// Vote timestamp, nanoseconds since the Unix epoch.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
}

impl Vote {
    /// The canonical sign bytes for this vote.
    pub fn sign_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode canonical sign bytes back into a vote.
    pub fn decode(sign_bytes: &[u8]) -> Result<Vote, Error> {
        serde_json::from_slice(sign_bytes).map_err(Error::MalformedSignBytes)
    }

    /// The ephemeral-state key for this vote.
    pub fn hrst(&self) -> HrstKey {
        HrstKey {
            height: self.height,
            round: self.round,
            step: self.step,
            timestamp: self.timestamp,
        }
    }
}

/// Recover the height/round/step/timestamp coordinates from sign bytes.
pub fn unpack_hrst(sign_bytes: &[u8]) -> Result<HrstKey, Error> {
    Ok(Vote::decode(sign_bytes)?.hrst())
}
