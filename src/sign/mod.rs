// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! COSE_Sign and COSE_Sign1 messages.
//!
//! https://datatracker.ietf.org/doc/html/rfc8152#section-4
//!
//! ```text
//! COSE_Sign = [
//!     protected:   bstr,
//!     unprotected: header_map,
//!     payload:     bstr / nil,
//!     signatures:  [+ [protected: bstr, unprotected: header_map, signature: bstr]]
//! ]
//!
//! COSE_Sign1 = [
//!     protected:   bstr,
//!     unprotected: header_map,
//!     payload:     bstr / nil,
//!     signature:   bstr
//! ]
//! ```
//!
//! A [`Sign`] is either populated by the caller and encoded, or decoded from
//! wire bytes and verified. Decoded messages borrow every byte string from the
//! input and keep the original protected header encodings, which are what the
//! signatures are checked against.

mod decode;
mod encode;
mod structure;

pub use structure::{Context, SigStructure};

use crate::error::{Error, Result};
use crate::header::{
    HEADER_ALGORITHM, HEADER_CONTENT_TYPE, HEADER_KEY_ID, Header, HeaderBucket, HeaderValue,
    Protection,
};
use crate::key::Key;
use crate::{SIGN_HEADERS_MAX, SIGNATURE_HEADERS_MAX, SIGNATURES_MAX};

/// CBOR tag of a COSE_Sign message.
pub const TAG_SIGN: u64 = 98;

/// CBOR tag of a COSE_Sign1 message.
pub const TAG_SIGN1: u64 = 18;

/// Kind selects between the multi-signer and single-signer message shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Sign,
    Sign1,
}

impl Kind {
    /// tag returns the CBOR tag identifying the message shape.
    pub const fn tag(self) -> u64 {
        match self {
            Kind::Sign => TAG_SIGN,
            Kind::Sign1 => TAG_SIGN1,
        }
    }

    /// context returns the Sig_structure label signers of this shape use.
    pub const fn context(self) -> Context {
        match self {
            Kind::Sign => Context::Signature,
            Kind::Sign1 => Context::Signature1,
        }
    }
}

/// Signature is one signer slot of a message.
#[derive(Clone, Debug)]
pub struct Signature<'a> {
    // Verbatim protected header content when decoded
    protected: Option<&'a [u8]>,
    signature: &'a [u8],
    signer: Option<Key<'a>>,
    headers: HeaderBucket<'a, SIGNATURE_HEADERS_MAX>,
}

impl<'a> Signature<'a> {
    const fn new() -> Self {
        Self {
            protected: None,
            signature: &[],
            signer: None,
            headers: HeaderBucket::new(),
        }
    }

    /// headers returns the signature scoped header bucket.
    pub fn headers(&self) -> &HeaderBucket<'a, SIGNATURE_HEADERS_MAX> {
        &self.headers
    }

    /// signature returns the raw signature bytes of a decoded slot.
    pub fn signature(&self) -> &'a [u8] {
        self.signature
    }

    /// signer returns the key registered for signing, if any.
    pub fn signer(&self) -> Option<&Key<'a>> {
        self.signer.as_ref()
    }
}

/// Sign is a COSE_Sign or COSE_Sign1 message with fixed-capacity header and
/// signer storage.
#[derive(Clone, Debug)]
pub struct Sign<'a> {
    kind: Kind,
    tagged: bool,
    detached: bool,
    payload: Option<&'a [u8]>,
    external_aad: &'a [u8],
    headers: HeaderBucket<'a, SIGN_HEADERS_MAX>,
    // Verbatim body protected header content when decoded
    protected: Option<&'a [u8]>,
    signatures: [Signature<'a>; SIGNATURES_MAX],
    count: usize,
}

impl<'a> Sign<'a> {
    /// new creates an empty, tagged message with an attached payload.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            tagged: true,
            detached: false,
            payload: None,
            external_aad: &[],
            headers: HeaderBucket::new(),
            protected: None,
            signatures: core::array::from_fn(|_| Signature::new()),
            count: 0,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn payload(&self) -> Option<&'a [u8]> {
        self.payload
    }

    pub fn external_aad(&self) -> &'a [u8] {
        self.external_aad
    }

    /// set_tagged selects whether the message is wrapped in its CBOR tag.
    pub fn set_tagged(&mut self, tagged: bool) {
        self.tagged = tagged;
    }

    /// set_detached selects whether the payload is carried in the message or
    /// replaced by nil and transported out of band. Detached payloads are still
    /// signed over.
    pub fn set_detached(&mut self, detached: bool) {
        self.detached = detached;
    }

    /// set_payload sets the content to sign, or for a decoded detached message,
    /// the out of band content to verify against.
    pub fn set_payload(&mut self, payload: &'a [u8]) {
        self.payload = Some(payload);
    }

    /// set_external_aad sets application data that is signed over but never
    /// transmitted.
    pub fn set_external_aad(&mut self, aad: &'a [u8]) {
        self.external_aad = aad;
    }

    /// add_signer registers a signing key and returns its slot index. The key's
    /// algorithm is recorded as a protected header and its key id, if any, as
    /// an unprotected one. COSE_Sign1 messages take a single signer whose
    /// headers go into the body buckets.
    ///
    /// Nothing is modified when the signer or its headers do not fit.
    pub fn add_signer(&mut self, key: Key<'a>) -> Result<usize> {
        let needed = if key.kid().is_some() { 2 } else { 1 };
        let index = self.count;

        match self.kind {
            Kind::Sign1 => {
                if self.count > 0 || self.headers.remaining() < needed {
                    return Err(Error::CapacityExceeded);
                }
                record_signer(&mut self.headers, &key)?;
            }
            Kind::Sign => {
                if self.count >= SIGNATURES_MAX {
                    return Err(Error::CapacityExceeded);
                }
                let mut slot = Signature::new();
                if slot.headers.remaining() < needed {
                    return Err(Error::CapacityExceeded);
                }
                record_signer(&mut slot.headers, &key)?;
                self.signatures[index] = slot;
            }
        }
        self.signatures[index].signer = Some(key);
        self.count += 1;

        log::debug!(
            "cose: added signer {} (kind={:?}, alg={})",
            index,
            self.kind,
            key.algorithm().id()
        );
        Ok(index)
    }

    /// add_header adds a message level header. Duplicate keys are not detected.
    pub fn add_header(
        &mut self,
        key: i64,
        value: HeaderValue<'a>,
        protection: Protection,
    ) -> Result<()> {
        self.headers.add(key, value, protection)
    }

    /// add_signature_header adds a header to a registered COSE_Sign signer.
    pub fn add_signature_header(
        &mut self,
        index: usize,
        key: i64,
        value: HeaderValue<'a>,
        protection: Protection,
    ) -> Result<()> {
        if self.kind == Kind::Sign1 {
            return Err(Error::InvalidParam("COSE_Sign1 has no signature headers"));
        }
        self.slot_mut(index)?.headers.add(key, value, protection)
    }

    /// set_content_type sets or overwrites the protected content type header.
    pub fn set_content_type(&mut self, value: HeaderValue<'a>) -> Result<()> {
        self.headers
            .set(HEADER_CONTENT_TYPE, value, Protection::Protected)
    }

    /// headers returns the message level header bucket.
    pub fn headers(&self) -> &HeaderBucket<'a, SIGN_HEADERS_MAX> {
        &self.headers
    }

    /// header looks up a message level header in either map.
    pub fn header(&self, key: i64) -> Option<&Header<'a>> {
        self.headers.get(key)
    }

    /// protected looks up a message level protected header.
    pub fn protected(&self, key: i64) -> Option<&Header<'a>> {
        self.headers.get_protected(key)
    }

    /// unprotected looks up a message level unprotected header.
    pub fn unprotected(&self, key: i64) -> Option<&Header<'a>> {
        self.headers.get_unprotected(key)
    }

    /// signature_header looks up a header of a COSE_Sign signer in either map.
    /// Out of range slots and COSE_Sign1 messages have none.
    pub fn signature_header(&self, index: usize, key: i64) -> Option<&Header<'a>> {
        self.signature_headers(index)?.get(key)
    }

    /// signature_protected looks up a protected header of a COSE_Sign signer.
    pub fn signature_protected(&self, index: usize, key: i64) -> Option<&Header<'a>> {
        self.signature_headers(index)?.get_protected(key)
    }

    /// signature_unprotected looks up an unprotected header of a COSE_Sign signer.
    pub fn signature_unprotected(&self, index: usize, key: i64) -> Option<&Header<'a>> {
        self.signature_headers(index)?.get_unprotected(key)
    }

    /// kid returns the key identifier published by a signer, looking in the
    /// body headers for COSE_Sign1 messages.
    pub fn kid(&self, index: usize) -> Result<Option<&'a [u8]>> {
        let slot = self.slot(index)?;
        let header = match self.kind {
            Kind::Sign1 => self.headers.get(HEADER_KEY_ID),
            Kind::Sign => slot.headers.get(HEADER_KEY_ID),
        };
        Ok(header.and_then(|h| h.value.as_bytes()))
    }

    /// signature returns a signer slot.
    pub fn signature(&self, index: usize) -> Result<&Signature<'a>> {
        self.slot(index)
    }

    /// signature_count returns the number of occupied signer slots.
    pub fn signature_count(&self) -> usize {
        self.count
    }

    // algorithm returns the protected alg header a signer is pinned to.
    fn algorithm(&self, index: usize) -> Result<Option<&Header<'a>>> {
        let slot = self.slot(index)?;
        Ok(match self.kind {
            Kind::Sign1 => self.headers.get_protected(HEADER_ALGORITHM),
            Kind::Sign => slot.headers.get_protected(HEADER_ALGORITHM),
        })
    }

    fn signature_headers(&self, index: usize) -> Option<&HeaderBucket<'a, SIGNATURE_HEADERS_MAX>> {
        if self.kind == Kind::Sign1 || index >= self.count {
            return None;
        }
        Some(&self.signatures[index].headers)
    }

    fn slot(&self, index: usize) -> Result<&Signature<'a>> {
        if index >= self.count {
            return Err(Error::InvalidParam("signature index out of range"));
        }
        Ok(&self.signatures[index])
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Signature<'a>> {
        if index >= self.count {
            return Err(Error::InvalidParam("signature index out of range"));
        }
        Ok(&mut self.signatures[index])
    }
}

// record_signer stores the algorithm and key id headers describing a signer.
fn record_signer<'a, const N: usize>(
    headers: &mut HeaderBucket<'a, N>,
    key: &Key<'a>,
) -> Result<()> {
    headers.add(
        HEADER_ALGORITHM,
        HeaderValue::Int(key.algorithm().id()),
        Protection::Protected,
    )?;
    if let Some(kid) = key.kid() {
        headers.add(HEADER_KEY_ID, HeaderValue::Bytes(kid), Protection::Unprotected)?;
    }
    Ok(())
}
