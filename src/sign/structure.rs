// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Sig_structure construction.

use crate::cbor::{self, Encoder};
use crate::error::{Error, Result};

/// Context is the label that domain separates the different signing uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Context {
    /// A signer of a COSE_Sign message.
    Signature,
    /// The single signer of a COSE_Sign1 message.
    Signature1,
    /// A counter signature over a message.
    CounterSignature,
}

impl Context {
    pub const fn label(self) -> &'static str {
        match self {
            Context::Signature => "Signature",
            Context::Signature1 => "Signature1",
            Context::CounterSignature => "CounterSignature",
        }
    }
}

/// SigStructure is the authentication context that is actually signed,
/// per RFC 8152 Section 4.4.
///
/// ```text
/// Sig_structure = [
///     context:        "Signature" / "Signature1" / "CounterSignature",
///     body_protected: bstr,
///     sign_protected: bstr, ; omitted for "Signature1"
///     external_aad:   bstr,
///     payload:        bstr
/// ]
/// ```
///
/// The protected fields hold the content of the respective protected header
/// byte strings, not their CBOR wrapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigStructure<'m> {
    pub context: Context,
    pub body_protected: &'m [u8],
    pub sign_protected: Option<&'m [u8]>,
    pub external_aad: &'m [u8],
    pub payload: &'m [u8],
}

impl SigStructure<'_> {
    /// encoded_len returns the exact size of the encoded structure.
    pub fn encoded_len(&self) -> usize {
        let items = if self.sign_protected.is_some() { 5 } else { 4 };
        cbor::header_len(items)
            + cbor::bytes_len(self.context.label().len())
            + cbor::bytes_len(self.body_protected.len())
            + self.sign_protected.map_or(0, |p| cbor::bytes_len(p.len()))
            + cbor::bytes_len(self.external_aad.len())
            + cbor::bytes_len(self.payload.len())
    }

    /// encode writes the structure to the head of buf and returns its length.
    /// Nothing is written if buf cannot hold the whole structure.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        // Signature1 contexts have no signer, the others need one
        match (self.context, self.sign_protected) {
            (Context::Signature1, None) => {}
            (Context::Signature | Context::CounterSignature, Some(_)) => {}
            (Context::Signature1, Some(_)) => {
                return Err(Error::InvalidParam("Signature1 context takes no signer headers"));
            }
            _ => return Err(Error::InvalidParam("signer protected headers missing")),
        }
        if self.encoded_len() > buf.len() {
            return Err(Error::BufferTooSmall);
        }
        let mut enc = Encoder::new(buf);
        enc.encode_array_header(if self.sign_protected.is_some() { 5 } else { 4 })?;
        enc.encode_text(self.context.label())?;
        enc.encode_bytes(self.body_protected)?;
        if let Some(protected) = self.sign_protected {
            enc.encode_bytes(protected)?;
        }
        enc.encode_bytes(self.external_aad)?;
        enc.encode_bytes(self.payload)?;
        Ok(enc.finish())
    }
}
