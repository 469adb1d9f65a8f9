// -*- mode: rust; -*-
//
// This file is part of cosigner.
// Copyright (c) 2025-2026 Cosigner Developers
// See LICENSE for licensing information.

//! The per-round cosigning engine.
//!
//! A [`LocalCosigner`] holds this process's permanent signing share and
//! drives the two-phase ephemeral-nonce protocol: deal a fresh nonce once
//! per height/round/step/timestamp, exchange authenticated share-parts with
//! peers, then emit a partial signature once enough peer slots are
//! populated. All public operations are serialized by one mutex; the fsync
//! inside [`SignState::save`] happens under that lock so that no partial
//! signature is released before the record protecting it is durable.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand_core::RngCore;
use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::curve::{self, Scalar};
use crate::messages::{
    share_part_digest, EphemeralSecretPart, GetEphemeralSecretPartRequest,
    SetEphemeralSecretPartRequest, SignRequest, SignResponse,
};
use crate::shamir;
use crate::sign_state::{SignState, SignStateConsensus};
use crate::threshold;
use crate::vote::{self, HrstKey};
use crate::Error;

/// The capability a cosigner variant must provide.
///
/// [`LocalCosigner`] implements it in software; an HSM-backed variant
/// forwards the same four operations to external hardware.
pub trait Cosigner {
    /// This cosigner's id within the set (`1..=n`).
    fn id(&self) -> u8;

    /// Ensure ephemeral nonce shares are dealt for `hrst`. Idempotent: a
    /// round's shares are dealt exactly once and reused afterwards.
    fn deal_shares(&self, hrst: &HrstKey) -> Result<(), Error>;

    /// Produce our encrypted, signed share-part for the requesting peer.
    fn get_ephemeral_secret_part(
        &self,
        req: &GetEphemeralSecretPartRequest,
    ) -> Result<EphemeralSecretPart, Error>;

    /// Verify, decrypt and store a share-part dealt to us by a peer.
    fn set_ephemeral_secret_part(&self, req: &SetEphemeralSecretPartRequest) -> Result<(), Error>;

    /// Produce our partial signature over the given sign bytes.
    fn sign(&self, req: &SignRequest) -> Result<SignResponse, Error>;
}

/// This cosigner's permanent key material, provisioned out of band.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CosignerKey {
    /// Our id within the cosigner set (`1..=n`).
    #[serde(rename = "ID")]
    pub id: u8,
    /// Our Shamir share of the group Ed25519 signing key.
    #[serde(rename = "ShareKey", with = "hex::serde")]
    pub share_key: [u8; 32],
    /// The group public key `A` the combined signatures verify under.
    #[serde(rename = "GroupPubKey", with = "hex::serde")]
    pub group_public: [u8; 32],
}

impl fmt::Debug for CosignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosignerKey")
            .field("id", &self.id)
            .field("group_public", &hex::encode(self.group_public))
            .finish_non_exhaustive()
    }
}

/// A member of the cosigner set and the RSA key that authenticates it.
#[derive(Clone, Debug)]
pub struct CosignerPeer {
    /// The peer's id (`1..=n`).
    pub id: u8,
    /// The peer's RSA public key, used for OAEP share encryption and PSS
    /// envelope verification.
    pub public_key: RsaPublicKey,
}

/// One peer's slot within a round's metadata.
///
/// A slot is explicitly empty until the peer's share-part arrives; an empty
/// slot is never conflated with a dealt zero scalar.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
struct PeerSlot {
    /// The peer's Shamir share-part of this round's aggregate nonce, as
    /// dealt to us.
    share: Option<[u8; 32]>,
    /// The peer's `secret·B` contribution to the aggregate nonce point.
    ephemeral_secret_public_key: Option<[u8; 32]>,
}

/// Per-round nonce state, created lazily on the first share request for a
/// height/round/step/timestamp and discarded once a later round signs.
#[derive(Zeroize, ZeroizeOnDrop)]
struct HrsMetadata {
    /// Our locally generated 32-byte ephemeral nonce for this round.
    secret: [u8; 32],
    /// Our Shamir split of `secret`, one share per cosigner.
    dealt_shares: Vec<[u8; 32]>,
    /// Share-parts received so far, index `i` for the cosigner with id
    /// `i + 1`.
    peers: Vec<PeerSlot>,
}

struct EngineState {
    hrs_meta: HashMap<HrstKey, HrsMetadata>,
    last_sign_state: SignState,
}

/// The software cosigner engine.
pub struct LocalCosigner {
    key: CosignerKey,
    rsa_key: RsaPrivateKey,
    peers: HashMap<u8, RsaPublicKey>,
    threshold: u8,
    total: u8,
    state: Mutex<EngineState>,
}

impl LocalCosigner {
    /// Build an engine from provisioned key material.
    ///
    /// `peers` must contain every member of the set, ourselves included,
    /// with ids exactly `1..=n`. The sign state at `state_path` is loaded,
    /// or created at height zero.
    pub fn new(
        key: CosignerKey,
        rsa_key: RsaPrivateKey,
        peers: Vec<CosignerPeer>,
        threshold: u8,
        state_path: impl AsRef<Path>,
    ) -> Result<LocalCosigner, Error> {
        let total = peers.len() as u8;
        let mut peer_keys = HashMap::with_capacity(peers.len());
        for peer in peers {
            if peer.id < 1 || peer.id > total {
                return Err(Error::InvalidConfiguration(
                    "peer ids must be contiguous from 1",
                ));
            }
            if peer_keys.insert(peer.id, peer.public_key).is_some() {
                return Err(Error::InvalidConfiguration("duplicate peer id"));
            }
        }
        if !peer_keys.contains_key(&key.id) {
            return Err(Error::InvalidConfiguration(
                "our own id is not in the peer set",
            ));
        }
        if threshold < 2 || threshold > total {
            return Err(Error::InvalidConfiguration(
                "threshold must be in 2..=total",
            ));
        }

        let last_sign_state = SignState::load_or_create(state_path)?;
        Ok(LocalCosigner {
            key,
            rsa_key,
            peers: peer_keys,
            threshold,
            total,
            state: Mutex::new(EngineState {
                hrs_meta: HashMap::new(),
                last_sign_state,
            }),
        })
    }

    /// The last durably signed record.
    pub fn last_sign_state(&self) -> SignStateConsensus {
        self.state.lock().last_sign_state.consensus().clone()
    }

    /// The height/round/step/timestamp keys with live ephemeral metadata,
    /// oldest first.
    pub fn metadata_keys(&self) -> Vec<HrstKey> {
        let state = self.state.lock();
        let mut keys: Vec<HrstKey> = state.hrs_meta.keys().copied().collect();
        keys.sort_by_key(|k| (k.height, k.round, k.step, k.timestamp));
        keys
    }

    fn peer_key(&self, id: u8) -> Result<&RsaPublicKey, Error> {
        self.peers.get(&id).ok_or(Error::UnknownPeer(id))
    }

    /// Get-or-insert the round's metadata under the held lock. Dealing is
    /// randomized, so an existing entry is always reused (re-dealing would
    /// desynchronize peers).
    fn deal_if_missing<'a>(
        &self,
        hrs_meta: &'a mut HashMap<HrstKey, HrsMetadata>,
        hrst: HrstKey,
    ) -> Result<&'a mut HrsMetadata, Error> {
        match hrs_meta.entry(hrst) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let mut rng = OsRng;
                let mut secret = [0u8; 32];
                rng.fill_bytes(&mut secret);
                let dealt_shares =
                    shamir::deal_shares(&secret, self.threshold, self.total, &mut rng)?;
                debug!(hrst = %hrst, "dealt ephemeral nonce shares");
                Ok(slot.insert(HrsMetadata {
                    secret,
                    dealt_shares,
                    peers: vec![PeerSlot::default(); self.total as usize],
                }))
            }
        }
    }
}

impl Cosigner for LocalCosigner {
    fn id(&self) -> u8 {
        self.key.id
    }

    fn deal_shares(&self, hrst: &HrstKey) -> Result<(), Error> {
        let mut state = self.state.lock();
        self.deal_if_missing(&mut state.hrs_meta, *hrst).map(|_| ())
    }

    fn get_ephemeral_secret_part(
        &self,
        req: &GetEphemeralSecretPartRequest,
    ) -> Result<EphemeralSecretPart, Error> {
        let hrst = req.hrst();
        let mut state = self.state.lock();
        let meta = self.deal_if_missing(&mut state.hrs_meta, hrst)?;

        // Our own slot is populated on the way out, so a later sign call
        // sees our contribution alongside the peers'.
        let our_public = curve::scalar_multiply_base(&meta.secret);
        let self_index = (self.key.id - 1) as usize;
        meta.peers[self_index] = PeerSlot {
            share: Some(meta.dealt_shares[self_index]),
            ephemeral_secret_public_key: Some(our_public),
        };

        let peer_key = self.peer_key(req.id)?;
        let plaintext = meta.dealt_shares[(req.id - 1) as usize];

        let mut rng = OsRng;
        let encrypted_share_part =
            peer_key.encrypt(&mut rng, Oaep::new::<Sha256>(), &plaintext)?;
        let digest = share_part_digest(self.key.id, &our_public, &encrypted_share_part)?;
        let source_sig = self
            .rsa_key
            .sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)?;

        debug!(hrst = %hrst, peer = req.id, "issued ephemeral share part");
        Ok(EphemeralSecretPart {
            source_id: self.key.id,
            source_ephemeral_secret_public_key: our_public,
            encrypted_share_part,
            source_sig,
            destination_id: req.id,
        })
    }

    fn set_ephemeral_secret_part(&self, req: &SetEphemeralSecretPartRequest) -> Result<(), Error> {
        if req.source_sig.is_empty() {
            return Err(Error::MissingSignature);
        }

        let source_key = self.peer_key(req.source_id)?;
        let digest = share_part_digest(
            req.source_id,
            &req.source_ephemeral_secret_public_key,
            &req.encrypted_share_part,
        )?;
        if source_key
            .verify(Pss::new::<Sha256>(), &digest, &req.source_sig)
            .is_err()
        {
            warn!(claimed_source = req.source_id, "dropping share part with bad signature");
            return Err(Error::PeerAuth(req.source_id));
        }

        let hrst = req.hrst();
        let mut state = self.state.lock();
        let meta = self.deal_if_missing(&mut state.hrs_meta, hrst)?;

        let mut plaintext = self.rsa_key.decrypt(Oaep::new::<Sha256>(), &req.encrypted_share_part)?;
        let share: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| Error::Crypto("decrypted share part is not 32 bytes".into()))?;
        plaintext.zeroize();

        meta.peers[(req.source_id - 1) as usize] = PeerSlot {
            share: Some(share),
            ephemeral_secret_public_key: Some(req.source_ephemeral_secret_public_key),
        };
        debug!(hrst = %hrst, peer = req.source_id, "stored ephemeral share part");
        Ok(())
    }

    fn sign(&self, req: &SignRequest) -> Result<SignResponse, Error> {
        let hrst = vote::unpack_hrst(&req.sign_bytes)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let same_hrs = state.last_sign_state.check_hrs(&hrst).map_err(|e| {
            warn!(hrst = %hrst, "refusing to sign behind persisted state");
            e
        })?;
        if same_hrs {
            let consensus = state.last_sign_state.consensus();
            if req.sign_bytes == consensus.sign_bytes {
                // Idempotent replay of an already-signed vote.
                let ephemeral_public: [u8; 32] = consensus
                    .ephemeral_public
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Crypto("persisted ephemeral public is malformed".into()))?;
                return Ok(SignResponse {
                    ephemeral_public,
                    signature: consensus.signature.clone(),
                });
            }
            state.last_sign_state.only_differ_by_timestamp(&req.sign_bytes).map_err(|e| {
                warn!(hrst = %hrst, "refusing conflicting sign bytes at signed coordinate");
                e
            })?;
        }

        let meta = state
            .hrs_meta
            .get(&hrst)
            .ok_or(Error::NoMetadataForHrs(hrst))?;

        let mut shares: Vec<[u8; 32]> = Vec::with_capacity(meta.peers.len());
        let mut publics: Vec<[u8; 32]> = Vec::with_capacity(meta.peers.len());
        for slot in &meta.peers {
            if let (Some(share), Some(public)) = (slot.share, slot.ephemeral_secret_public_key) {
                shares.push(share);
                publics.push(public);
            }
        }
        if shares.len() < self.threshold as usize {
            return Err(Error::InsufficientShares {
                have: shares.len(),
                need: self.threshold as usize,
            });
        }

        // Every stored share must already be canonical; the sum then is by
        // construction, and sign_with_share revalidates it.
        let mut aggregate = Scalar::ZERO;
        for share in &shares {
            aggregate += curve::decode_canonical_scalar(share)
                .ok_or(Error::EphemeralShareOutOfBounds)?;
        }
        let mut ephemeral_share = aggregate.to_bytes();
        let ephemeral_public = curve::add_elements(&publics)?;

        let signature = threshold::sign_with_share(
            &req.sign_bytes,
            &self.key.share_key,
            &ephemeral_share,
            &self.key.group_public,
            &ephemeral_public,
        )?;
        ephemeral_share.zeroize();

        match state.last_sign_state.save(SignStateConsensus {
            height: hrst.height,
            round: hrst.round,
            step: hrst.step,
            signature: signature.to_vec(),
            sign_bytes: req.sign_bytes.clone(),
            ephemeral_public: ephemeral_public.to_vec(),
        }) {
            Ok(()) | Err(Error::SameHrs) => {}
            Err(e) => return Err(e),
        }

        // Earlier rounds can no longer be signed; their nonce state is
        // dropped (and zeroized) now.
        let hrs = hrst.hrs();
        state.hrs_meta.retain(|key, _| key.hrs() >= hrs);

        info!(hrst = %hrst, shares = shares.len(), "produced partial signature");
        Ok(SignResponse {
            ephemeral_public,
            signature: signature.to_vec(),
        })
    }
}
