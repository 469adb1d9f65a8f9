// -*- mode: rust; -*-
//
// This file is part of cosigner.
// Copyright (c) 2025-2026 Cosigner Developers
// See LICENSE for licensing information.

//! The threshold Ed25519 signing primitive.
//!
//! Each cosigner holds a Shamir share `a_i` of the group signing key and, per
//! round, assembles a Shamir share `r_i` of an aggregate ephemeral nonce. A
//! partial signature is the fragment `(R, s_i)` with
//! `s_i = r_i + c·a_i` and the standard Ed25519 challenge
//! `c = SHA-512(R ‖ A ‖ M) mod ℓ`. Combining `t` fragments with their
//! Lagrange coefficients yields `(R, s)`, a signature verifiable under the
//! group public key with plain RFC 8032 verification.

use ed25519_dalek::{Verifier, VerifyingKey};
use sha2::{Digest, Sha512};

use crate::curve::{self, Scalar};
use crate::shamir::lagrange_coefficient;
use crate::Error;

/// Length in bytes of a signature or signature fragment (`R ‖ s`).
pub const SIGNATURE_LEN: usize = 64;

/// The Ed25519 challenge scalar `SHA-512(R ‖ A ‖ M) mod ℓ`.
fn challenge(r: &[u8; 32], a: &[u8; 32], message: &[u8]) -> Scalar {
    let hash = Sha512::new()
        .chain_update(r)
        .chain_update(a)
        .chain_update(message);

    let mut output = [0u8; 64];
    output.copy_from_slice(&hash.finalize());
    Scalar::from_bytes_mod_order_wide(&output)
}

/// Produce a partial Ed25519 signature over `message`.
///
/// `signing_share` is this cosigner's permanent share of the group key;
/// `ephemeral_share` its assembled share of this round's aggregate nonce;
/// `group_public` is `A` and `ephemeral_public` the aggregate `R`. The
/// fragment is `R ‖ s_i`; fragments from `t` distinct cosigners combine via
/// [`combine_signatures`] into a valid signature under `A`.
///
/// The ephemeral share must be exactly 32 bytes and a canonical scalar;
/// anything else is refused with [`Error::EphemeralShareOutOfBounds`].
pub fn sign_with_share(
    message: &[u8],
    signing_share: &[u8; 32],
    ephemeral_share: &[u8],
    group_public: &[u8; 32],
    ephemeral_public: &[u8; 32],
) -> Result<[u8; 64], Error> {
    let ephemeral_share: [u8; 32] = ephemeral_share
        .try_into()
        .map_err(|_| Error::EphemeralShareOutOfBounds)?;
    let r_i = curve::decode_canonical_scalar(&ephemeral_share)
        .ok_or(Error::EphemeralShareOutOfBounds)?;

    let a_i = Scalar::from_bytes_mod_order(*signing_share);
    let c = challenge(ephemeral_public, group_public, message);
    let s_i = r_i + c * a_i;

    let mut fragment = [0u8; SIGNATURE_LEN];
    fragment[..32].copy_from_slice(ephemeral_public);
    fragment[32..].copy_from_slice(&s_i.to_bytes());
    Ok(fragment)
}

/// Combine partial signatures from the participating set `ids` into a full
/// Ed25519 signature.
///
/// `ids[i]` is the cosigner id that produced `fragments[i]`. All fragments
/// must carry the same `R`; the response scalars are summed with the
/// Lagrange coefficient of each participant folded in. At least the dealing
/// threshold of distinct participants is required for the result to verify.
pub fn combine_signatures(ids: &[u8], fragments: &[[u8; 64]]) -> Result<[u8; 64], Error> {
    if ids.len() != fragments.len() || ids.is_empty() {
        return Err(Error::MalformedSignatureShare(
            "fragment and id sets must be non-empty and of equal length",
        ));
    }

    let mut r = [0u8; 32];
    r.copy_from_slice(&fragments[0][..32]);
    let mut s = Scalar::ZERO;
    for (&id, fragment) in ids.iter().zip(fragments) {
        if fragment[..32] != r {
            return Err(Error::MalformedSignatureShare(
                "fragments disagree on the aggregate nonce point",
            ));
        }
        let mut s_i = [0u8; 32];
        s_i.copy_from_slice(&fragment[32..]);
        let s_i = curve::decode_canonical_scalar(&s_i)
            .ok_or(Error::MalformedSignatureShare("non-canonical response scalar"))?;
        s += lagrange_coefficient(id, ids)? * s_i;
    }

    let mut signature = [0u8; SIGNATURE_LEN];
    signature[..32].copy_from_slice(&r);
    signature[32..].copy_from_slice(&s.to_bytes());
    Ok(signature)
}

/// Verify a combined signature under the group public key using the
/// reference RFC 8032 implementation.
pub fn verify(message: &[u8], public_key: &[u8; 32], signature: &[u8; 64]) -> Result<(), Error> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|e| Error::Crypto(e.to_string()))?;
    let signature = ed25519_dalek::Signature::from_bytes(signature);
    key.verify(message, &signature)
        .map_err(|e| Error::Crypto(e.to_string()))
}
