//! The cosigner protocol envelopes.
//!
//! These are the semantic payloads moved between cosigner processes by an
//! external RPC transport. Serialization is canonical JSON with the struct
//! declaration order as the field order; serialized field names are part of
//! the envelope's authenticated surface and must stay byte-stable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::vote::HrstKey;
use crate::Error;

/// A request for our Shamir share-part of this round's ephemeral nonce.
///
/// `id` is the index of the peer asking, i.e. the destination the share
/// will be encrypted to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetEphemeralSecretPartRequest {
    /// Block height.
    #[serde(rename = "Height")]
    pub height: i64,
    /// Consensus round.
    #[serde(rename = "Round")]
    pub round: i64,
    /// Vote step.
    #[serde(rename = "Step")]
    pub step: u8,
    /// Vote timestamp, nanoseconds since the Unix epoch.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    /// The id of the requesting peer.
    #[serde(rename = "ID")]
    pub id: u8,
}

impl GetEphemeralSecretPartRequest {
    /// The ephemeral-state key this request addresses.
    pub fn hrst(&self) -> HrstKey {
        HrstKey {
            height: self.height,
            round: self.round,
            step: self.step,
            timestamp: self.timestamp,
        }
    }
}

/// One cosigner's encrypted share-part of its ephemeral nonce, destined for
/// a single peer.
///
/// The tuple `{SourceID, SourceEphemeralSecretPublicKey, EncryptedSharePart}`
/// is the surface covered by `SourceSig`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralSecretPart {
    /// The id of the cosigner that dealt this share.
    #[serde(rename = "SourceID")]
    pub source_id: u8,
    /// The source's `secret·B`, its contribution to the aggregate nonce
    /// point.
    #[serde(rename = "SourceEphemeralSecretPublicKey")]
    pub source_ephemeral_secret_public_key: [u8; 32],
    /// The share-part, RSA-OAEP-SHA256 encrypted to the destination peer.
    #[serde(rename = "EncryptedSharePart", with = "hex::serde")]
    pub encrypted_share_part: Vec<u8>,
    /// RSA-PSS-SHA256 signature by the source over the signed surface.
    #[serde(rename = "SourceSig", with = "hex::serde")]
    pub source_sig: Vec<u8>,
    /// The id of the peer this share is encrypted to.
    #[serde(rename = "DestinationID")]
    pub destination_id: u8,
}

/// Delivery of a peer's [`EphemeralSecretPart`] to us, tagged with the
/// round coordinates it belongs to.
///
/// The height/round/step/timestamp fields are routing metadata outside the
/// signed surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEphemeralSecretPartRequest {
    /// The id of the cosigner that dealt this share.
    #[serde(rename = "SourceID")]
    pub source_id: u8,
    /// The source's contribution to the aggregate nonce point.
    #[serde(rename = "SourceEphemeralSecretPublicKey")]
    pub source_ephemeral_secret_public_key: [u8; 32],
    /// The share-part, encrypted to us.
    #[serde(rename = "EncryptedSharePart", with = "hex::serde")]
    pub encrypted_share_part: Vec<u8>,
    /// RSA-PSS-SHA256 signature by the source over the signed surface.
    #[serde(rename = "SourceSig", with = "hex::serde")]
    pub source_sig: Vec<u8>,
    /// Block height.
    #[serde(rename = "Height")]
    pub height: i64,
    /// Consensus round.
    #[serde(rename = "Round")]
    pub round: i64,
    /// Vote step.
    #[serde(rename = "Step")]
    pub step: u8,
    /// Vote timestamp, nanoseconds since the Unix epoch.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
}

impl SetEphemeralSecretPartRequest {
    /// The ephemeral-state key this delivery addresses.
    pub fn hrst(&self) -> HrstKey {
        HrstKey {
            height: self.height,
            round: self.round,
            step: self.step,
            timestamp: self.timestamp,
        }
    }
}

impl From<(EphemeralSecretPart, HrstKey)> for SetEphemeralSecretPartRequest {
    fn from((part, hrst): (EphemeralSecretPart, HrstKey)) -> Self {
        SetEphemeralSecretPartRequest {
            source_id: part.source_id,
            source_ephemeral_secret_public_key: part.source_ephemeral_secret_public_key,
            encrypted_share_part: part.encrypted_share_part,
            source_sig: part.source_sig,
            height: hrst.height,
            round: hrst.round,
            step: hrst.step,
            timestamp: hrst.timestamp,
        }
    }
}

/// A request to produce our partial signature over the given sign bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Canonical vote sign bytes.
    #[serde(rename = "SignBytes", with = "hex::serde")]
    pub sign_bytes: Vec<u8>,
}

/// Our partial signature and the aggregate nonce point it commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    /// The aggregate ephemeral public point `R`.
    #[serde(rename = "EphemeralPublic")]
    pub ephemeral_public: [u8; 32],
    /// The partial signature fragment `R ‖ s_i`.
    #[serde(rename = "Signature", with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// The authenticated surface of a share-part envelope, in canonical field
/// order.
#[derive(Serialize)]
struct SignedSurface<'a> {
    #[serde(rename = "SourceID")]
    source_id: u8,
    #[serde(rename = "SourceEphemeralSecretPublicKey")]
    source_ephemeral_secret_public_key: &'a [u8; 32],
    #[serde(rename = "EncryptedSharePart", with = "hex::serde")]
    encrypted_share_part: &'a [u8],
}

/// SHA-256 digest of the canonical serialization of a share-part envelope's
/// signed surface. Both the sender (before RSA-PSS signing) and the receiver
/// (before verification) compute exactly this.
pub fn share_part_digest(
    source_id: u8,
    source_ephemeral_secret_public_key: &[u8; 32],
    encrypted_share_part: &[u8],
) -> Result<[u8; 32], Error> {
    let surface = SignedSurface {
        source_id,
        source_ephemeral_secret_public_key,
        encrypted_share_part,
    };
    let bytes = serde_json::to_vec(&surface)?;
    Ok(Sha256::digest(&bytes).into())
}
