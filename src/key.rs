// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::crypto::{Algorithm, Curve};
use core::fmt;

/// Key is a borrowed view over externally stored key material, tagged with the
/// COSE algorithm it is meant for. Asymmetric keys carry a curve and a public
/// half, with the secret half present only on the signing side. Symmetric keys
/// carry just the secret.
#[derive(Clone, Copy)]
pub struct Key<'a> {
    algorithm: Algorithm,
    curve: Option<Curve>,
    public: &'a [u8],
    secret: Option<&'a [u8]>,
    kid: Option<&'a [u8]>,
}

impl<'a> Key<'a> {
    /// new creates an asymmetric key. Verification only keys pass no secret.
    pub const fn new(
        algorithm: Algorithm,
        curve: Curve,
        public: &'a [u8],
        secret: Option<&'a [u8]>,
    ) -> Self {
        Self {
            algorithm,
            curve: Some(curve),
            public,
            secret,
            kid: None,
        }
    }

    /// symmetric creates a secret key without a public half or curve.
    pub const fn symmetric(algorithm: Algorithm, secret: &'a [u8]) -> Self {
        Self {
            algorithm,
            curve: None,
            public: &[],
            secret: Some(secret),
            kid: None,
        }
    }

    /// with_kid attaches a key identifier, which signers publish in the kid
    /// header of their signature.
    pub const fn with_kid(mut self, kid: &'a [u8]) -> Self {
        self.kid = Some(kid);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn curve(&self) -> Option<Curve> {
        self.curve
    }

    pub fn public(&self) -> &'a [u8] {
        self.public
    }

    pub fn secret(&self) -> Option<&'a [u8]> {
        self.secret
    }

    pub fn kid(&self) -> Option<&'a [u8]> {
        self.kid
    }
}

impl fmt::Debug for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("algorithm", &self.algorithm)
            .field("curve", &self.curve)
            .field("public", &self.public)
            .field("secret", &self.secret.map(|_| "<redacted>"))
            .field("kid", &self.kid)
            .finish()
    }
}
