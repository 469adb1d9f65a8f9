// -*- mode: rust; -*-
//
// This file is part of cosigner.
// Copyright (c) 2025-2026 Cosigner Developers
// See LICENSE for licensing information.

//! Shamir secret sharing over the Ed25519 scalar field.
//!
//! The dealer is used for two kinds of secret: the long-lived signing key is
//! split once at provisioning time (out of band), and each signing round every
//! cosigner freshly deals its 32-byte ephemeral nonce to the whole set. The
//! dealer itself is oblivious to which kind it is splitting and never retains
//! the secret.

use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::curve::{self, Scalar};
use crate::Error;

/// Split a 32-byte secret into `total` shares with reconstruction
/// threshold `threshold`.
///
/// The secret is interpreted as a little-endian integer and reduced mod `ℓ`.
/// A random polynomial `f` of degree `threshold - 1` is sampled with
/// `f(0) = secret`; the share for the cosigner with id `i` (ids run
/// `1..=total`) is `f(i)`. Any `threshold` shares recombine to the secret
/// via [`reconstruct_secret`], which folds the interpolation coefficients
/// into a plain weighted sum.
///
/// Dealing is randomized: two calls on the same secret produce unrelated
/// share vectors, which is why a round's shares must be dealt exactly once
/// and reused (re-dealing would desynchronize the peer set).
pub fn deal_shares<R: RngCore + CryptoRng>(
    secret: &[u8; 32],
    threshold: u8,
    total: u8,
    rng: &mut R,
) -> Result<Vec<[u8; 32]>, Error> {
    if threshold < 2 {
        return Err(Error::InvalidConfiguration("threshold must be at least 2"));
    }
    if threshold > total {
        return Err(Error::InvalidConfiguration(
            "threshold cannot exceed the number of shares",
        ));
    }

    let numcoeffs = (threshold - 1) as usize;
    let mut coefficients: Vec<Scalar> = Vec::with_capacity(numcoeffs);
    for _ in 0..numcoeffs {
        coefficients.push(curve::random_scalar(rng));
    }

    let constant = Scalar::from_bytes_mod_order(*secret);
    let mut shares: Vec<[u8; 32]> = Vec::with_capacity(total as usize);

    // Evaluate the polynomial with the secret as the constant term and
    // `coefficients` as the other coefficients at the point x=share_index,
    // using Horner's method.
    for index in 1..=total {
        let scalar_index = Scalar::from(index as u64);
        let mut value = Scalar::ZERO;
        for coeff in coefficients.iter().rev() {
            value += coeff;
            value *= scalar_index;
        }
        value += constant;
        shares.push(value.to_bytes());
    }

    for mut coeff in coefficients {
        coeff.zeroize();
    }

    Ok(shares)
}

/// The Lagrange coefficient at zero for participant `id` within the
/// participating set `ids`.
pub(crate) fn lagrange_coefficient(id: u8, ids: &[u8]) -> Result<Scalar, Error> {
    let mut num = Scalar::ONE;
    let mut den = Scalar::ONE;
    for &other in ids {
        if other == id {
            continue;
        }
        num *= Scalar::from(other as u64);
        den *= Scalar::from(other as u64) - Scalar::from(id as u64);
    }

    if den == Scalar::ZERO {
        return Err(Error::InvalidConfiguration("duplicate participant ids"));
    }

    Ok(num * den.invert())
}

/// Recombine shares into the dealt secret.
///
/// `ids[i]` is the id the share `shares[i]` was dealt to. At least
/// `threshold` distinct shares are required; with fewer the result is an
/// unrelated field element.
pub fn reconstruct_secret(ids: &[u8], shares: &[[u8; 32]]) -> Result<[u8; 32], Error> {
    if ids.len() != shares.len() || ids.is_empty() {
        return Err(Error::InvalidConfiguration(
            "share and id sets must be non-empty and of equal length",
        ));
    }

    let mut secret = Scalar::ZERO;
    for (&id, share) in ids.iter().zip(shares) {
        let value = curve::decode_canonical_scalar(share)
            .ok_or(Error::EphemeralShareOutOfBounds)?;
        secret += lagrange_coefficient(id, ids)? * value;
    }

    Ok(secret.to_bytes())
}
