// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::cbor;

/// Error is the failures that can occur while building, encoding, decoding or
/// verifying COSE signing structures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("header or signer capacity exceeded")]
    CapacityExceeded,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),
    #[error("malformed input: {0}")]
    MalformedInput(cbor::Error),
    #[error("too many signatures: {0}, max {1}")]
    TooManySignatures(u64, usize),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
    #[error("crypto backend failure: {0}")]
    Crypto(&'static str),
}

impl From<cbor::Error> for Error {
    fn from(err: cbor::Error) -> Self {
        match err {
            cbor::Error::BufferTooSmall => Error::BufferTooSmall,
            err => Error::MalformedInput(err),
        }
    }
}

/// Result is the crate wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
