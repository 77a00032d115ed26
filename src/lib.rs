// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! COSE_Sign and COSE_Sign1 signing structures for constrained devices.
//!
//! https://datatracker.ietf.org/doc/html/rfc8152
//!
//! All working state lives in fixed-capacity arrays and caller supplied
//! buffers; the crate never allocates. Decoded messages borrow their byte
//! strings from the input and verify against the protected header bytes
//! exactly as received.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod cbor;
pub mod crypto;
pub mod header;
pub mod sign;

mod error;
mod key;

#[cfg(feature = "chacha20poly1305")]
pub mod aead;
#[cfg(feature = "eddsa")]
pub mod eddsa;

pub use crypto::{Algorithm, Backend, Curve, Software};
pub use error::{Error, Result};
pub use header::{Header, HeaderBucket, HeaderValue, Protection};
pub use key::Key;
pub use sign::{Context, Kind, SigStructure, Sign, Signature};

/// Maximum number of message level headers of a `Sign`.
pub const SIGN_HEADERS_MAX: usize = 8;

/// Maximum number of headers per signature of a `Sign`.
pub const SIGNATURE_HEADERS_MAX: usize = 4;

/// Maximum number of signatures of a `Sign`.
pub const SIGNATURES_MAX: usize = 4;
