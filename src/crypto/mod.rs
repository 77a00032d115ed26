// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Crypto backend dispatch.
//!
//! https://datatracker.ietf.org/doc/html/rfc8152#section-8
//!
//! The signing and verification engines never touch primitives directly. They
//! go through a [`Backend`], which maps a key's (algorithm, curve) pair onto a
//! concrete scheme. [`Software`] is the built-in backend over the primitive
//! wrappers compiled in by cargo features; hardware backends plug in by
//! implementing the same trait.

use crate::error::{Error, Result};
use crate::key::Key;

/// Algorithm is a COSE algorithm identifier known to the dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// EdDSA signatures.
    EdDSA,
    /// ECDSA with SHA-256.
    ES256,
    /// ECDSA with SHA-384.
    ES384,
    /// ChaCha20/Poly1305 with a 256 bit key and 128 bit tag.
    ChaCha20Poly1305,
    /// AES-GCM with a 128 bit key and 128 bit tag.
    A128Gcm,
}

impl Algorithm {
    /// id returns the registered COSE identifier.
    pub const fn id(self) -> i64 {
        match self {
            Algorithm::EdDSA => -8,
            Algorithm::ES256 => -7,
            Algorithm::ES384 => -35,
            Algorithm::ChaCha20Poly1305 => 24,
            Algorithm::A128Gcm => 1,
        }
    }

    /// from_id looks up an algorithm by its registered COSE identifier.
    pub const fn from_id(id: i64) -> Option<Self> {
        match id {
            -8 => Some(Algorithm::EdDSA),
            -7 => Some(Algorithm::ES256),
            -35 => Some(Algorithm::ES384),
            24 => Some(Algorithm::ChaCha20Poly1305),
            1 => Some(Algorithm::A128Gcm),
            _ => None,
        }
    }
}

/// Curve is a COSE elliptic curve identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    P256,
    X25519,
    Ed25519,
    Ed448,
}

impl Curve {
    /// id returns the registered COSE identifier.
    pub const fn id(self) -> i64 {
        match self {
            Curve::P256 => 1,
            Curve::X25519 => 4,
            Curve::Ed25519 => 6,
            Curve::Ed448 => 7,
        }
    }

    /// from_id looks up a curve by its registered COSE identifier.
    pub const fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Curve::P256),
            4 => Some(Curve::X25519),
            6 => Some(Curve::Ed25519),
            7 => Some(Curve::Ed448),
            _ => None,
        }
    }
}

/// Scheme is a concrete primitive an (algorithm, curve) pair resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Ed25519,
    ChaCha20Poly1305,
}

// Dispatch table of the supported (algorithm, curve) pairs. Symmetric schemes
// have no curve.
const SCHEMES: &[(Algorithm, Option<Curve>, Scheme)] = &[
    (Algorithm::EdDSA, Some(Curve::Ed25519), Scheme::Ed25519),
    (Algorithm::ChaCha20Poly1305, None, Scheme::ChaCha20Poly1305),
];

/// resolve maps an algorithm and curve onto the scheme implementing them.
pub fn resolve(algorithm: Algorithm, curve: Option<Curve>) -> Result<Scheme> {
    SCHEMES
        .iter()
        .find(|(alg, crv, _)| *alg == algorithm && *crv == curve)
        .map(|(_, _, scheme)| *scheme)
        .ok_or(Error::UnsupportedAlgorithm(algorithm.id()))
}

/// Backend is the primitive set the COSE engines are generic over.
///
/// Any failure to check a signature, including malformed keys or signatures,
/// must be reported as `VerificationFailed` so callers cannot tell them apart.
pub trait Backend {
    /// signature_size returns the exact number of bytes a signature made with
    /// the key occupies.
    fn signature_size(&self, key: &Key<'_>) -> Result<usize>;

    /// sign signs the message with the key's secret half into the signature
    /// slice, which is exactly `signature_size` long.
    fn sign(&self, key: &Key<'_>, message: &[u8], signature: &mut [u8]) -> Result<()>;

    /// verify checks a signature over the message against the key's public half.
    fn verify(&self, key: &Key<'_>, message: &[u8], signature: &[u8]) -> Result<()>;

    /// seal encrypts the buffer in place and writes the detached tag.
    fn seal(
        &self,
        key: &Key<'_>,
        _nonce: &[u8],
        _aad: &[u8],
        _buffer: &mut [u8],
        _tag: &mut [u8],
    ) -> Result<()> {
        Err(Error::UnsupportedAlgorithm(key.algorithm().id()))
    }

    /// open authenticates and decrypts the buffer in place.
    fn open(
        &self,
        key: &Key<'_>,
        _nonce: &[u8],
        _aad: &[u8],
        _buffer: &mut [u8],
        _tag: &[u8],
    ) -> Result<()> {
        Err(Error::UnsupportedAlgorithm(key.algorithm().id()))
    }
}

/// Software is the backend over the primitive wrappers compiled into the crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Software;

impl Backend for Software {
    fn signature_size(&self, key: &Key<'_>) -> Result<usize> {
        match resolve(key.algorithm(), key.curve())? {
            #[cfg(feature = "eddsa")]
            Scheme::Ed25519 => Ok(crate::eddsa::SIGNATURE_SIZE),
            #[allow(unreachable_patterns)]
            _ => Err(Error::UnsupportedAlgorithm(key.algorithm().id())),
        }
    }

    #[allow(unused_variables)]
    fn sign(&self, key: &Key<'_>, message: &[u8], signature: &mut [u8]) -> Result<()> {
        match resolve(key.algorithm(), key.curve())? {
            #[cfg(feature = "eddsa")]
            Scheme::Ed25519 => {
                let secret: &[u8; crate::eddsa::SECRET_KEY_SIZE] = key
                    .secret()
                    .ok_or(Error::InvalidParam("signing key has no secret"))?
                    .try_into()
                    .map_err(|_| Error::InvalidParam("ed25519 secret key must be 32 bytes"))?;
                if signature.len() != crate::eddsa::SIGNATURE_SIZE {
                    return Err(Error::InvalidParam("ed25519 signature must be 64 bytes"));
                }
                let secret = crate::eddsa::SecretKey::from_bytes(secret);
                signature.copy_from_slice(&secret.sign(message));
                Ok(())
            }
            #[allow(unreachable_patterns)]
            _ => Err(Error::UnsupportedAlgorithm(key.algorithm().id())),
        }
    }

    #[allow(unused_variables)]
    fn verify(&self, key: &Key<'_>, message: &[u8], signature: &[u8]) -> Result<()> {
        match resolve(key.algorithm(), key.curve())? {
            #[cfg(feature = "eddsa")]
            Scheme::Ed25519 => {
                let public: &[u8; crate::eddsa::PUBLIC_KEY_SIZE] = key
                    .public()
                    .try_into()
                    .map_err(|_| Error::VerificationFailed)?;
                let signature: &[u8; crate::eddsa::SIGNATURE_SIZE] =
                    signature.try_into().map_err(|_| Error::VerificationFailed)?;
                crate::eddsa::PublicKey::from_bytes(public)
                    .and_then(|public| public.verify(message, signature))
                    .map_err(|_| Error::VerificationFailed)
            }
            #[allow(unreachable_patterns)]
            _ => Err(Error::UnsupportedAlgorithm(key.algorithm().id())),
        }
    }

    #[allow(unused_variables)]
    fn seal(
        &self,
        key: &Key<'_>,
        nonce: &[u8],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &mut [u8],
    ) -> Result<()> {
        match resolve(key.algorithm(), key.curve())? {
            #[cfg(feature = "chacha20poly1305")]
            Scheme::ChaCha20Poly1305 => {
                let (secret, nonce) = aead_params(key, nonce)?;
                if tag.len() != crate::aead::TAG_SIZE {
                    return Err(Error::InvalidParam("aead tag must be 16 bytes"));
                }
                let sealed = crate::aead::seal(secret, nonce, aad, buffer)
                    .map_err(|_| Error::Crypto("chacha20poly1305 seal failed"))?;
                tag.copy_from_slice(&sealed);
                Ok(())
            }
            #[allow(unreachable_patterns)]
            _ => Err(Error::UnsupportedAlgorithm(key.algorithm().id())),
        }
    }

    #[allow(unused_variables)]
    fn open(
        &self,
        key: &Key<'_>,
        nonce: &[u8],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8],
    ) -> Result<()> {
        match resolve(key.algorithm(), key.curve())? {
            #[cfg(feature = "chacha20poly1305")]
            Scheme::ChaCha20Poly1305 => {
                let (secret, nonce) = aead_params(key, nonce)?;
                let tag: &[u8; crate::aead::TAG_SIZE] =
                    tag.try_into().map_err(|_| Error::VerificationFailed)?;
                crate::aead::open(secret, nonce, aad, buffer, tag)
                    .map_err(|_| Error::VerificationFailed)
            }
            #[allow(unreachable_patterns)]
            _ => Err(Error::UnsupportedAlgorithm(key.algorithm().id())),
        }
    }
}

// aead_params checks and converts the symmetric key and nonce sizes.
#[cfg(feature = "chacha20poly1305")]
fn aead_params<'k>(
    key: &Key<'k>,
    nonce: &'k [u8],
) -> Result<(&'k [u8; crate::aead::KEY_SIZE], &'k [u8; crate::aead::NONCE_SIZE])> {
    let secret = key
        .secret()
        .ok_or(Error::InvalidParam("aead key has no secret"))?
        .try_into()
        .map_err(|_| Error::InvalidParam("aead key must be 32 bytes"))?;
    let nonce = nonce
        .try_into()
        .map_err(|_| Error::InvalidParam("aead nonce must be 12 bytes"))?;
    Ok((secret, nonce))
}
