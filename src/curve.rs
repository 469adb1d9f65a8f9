//! Ed25519 scalar-field and curve-element primitives.
//!
//! Everything here is a thin wrapper over `curve25519-dalek`, whose scalar
//! and point arithmetic is constant-time with respect to secret operands.
//! The public functions speak in 32-byte encodings (little-endian scalars,
//! compressed Edwards points); the typed `Scalar`/`Element` API is used
//! internally by the dealer and the threshold signer.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::traits::Identity;
use rand_core::{CryptoRng, RngCore};

use crate::Error;

pub(crate) use curve25519_dalek::edwards::EdwardsPoint as Element;
pub(crate) use curve25519_dalek::scalar::Scalar;

/// Length in bytes of an encoded scalar or compressed curve element.
pub const SCALAR_LEN: usize = 32;

/// Draw a uniformly random scalar, reduced from 64 bytes of rng output.
pub(crate) fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order_wide(&bytes)
}

/// Decode a canonical scalar, rejecting encodings `>= ℓ`.
pub(crate) fn decode_canonical_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_canonical_bytes(*bytes))
}

/// Decode a compressed Edwards point.
pub(crate) fn decode_element(bytes: &[u8; 32]) -> Result<Element, Error> {
    CompressedEdwardsY(*bytes)
        .decompress()
        .ok_or_else(|| Error::Crypto("point decompression failed".into()))
}

/// Whether `bytes` is a canonical scalar, i.e. strictly less than the
/// Ed25519 group order `ℓ` as a little-endian integer.
pub fn is_canonical_scalar(bytes: &[u8; 32]) -> bool {
    decode_canonical_scalar(bytes).is_some()
}

/// Sum a set of scalars mod `ℓ`. The result is always canonical.
pub fn add_scalars(parts: &[[u8; 32]]) -> [u8; 32] {
    let sum: Scalar = parts
        .iter()
        .map(|b| Scalar::from_bytes_mod_order(*b))
        .sum();
    sum.to_bytes()
}

/// Sum a set of compressed curve elements.
pub fn add_elements(parts: &[[u8; 32]]) -> Result<[u8; 32], Error> {
    let mut sum = Element::identity();
    for part in parts {
        sum += decode_element(part)?;
    }
    Ok(sum.compress().to_bytes())
}

/// Multiply the Ed25519 basepoint by a scalar, returning the compressed
/// result. The scalar encoding is reduced mod `ℓ` first.
pub fn scalar_multiply_base(scalar: &[u8; 32]) -> [u8; 32] {
    let s = Scalar::from_bytes_mod_order(*scalar);
    (ED25519_BASEPOINT_POINT * s).compress().to_bytes()
}
