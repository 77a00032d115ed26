// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Bounded COSE header buckets.
//!
//! https://datatracker.ietf.org/doc/html/rfc8152#section-3
//!
//! A bucket is a fixed-capacity, insertion ordered list of header entries. Each
//! entry is flagged protected or unprotected; the protected ones are encoded as
//! a CBOR map wrapped in a byte string, the unprotected ones as a plain map.
//!
//! Keys are expected to be unique within a bucket, but this is not enforced:
//! adding the same key twice stores both entries and lookups return the first.

use crate::cbor::{self, Decoder, Encoder, Type};
use crate::error::{Error, Result};
use core::ops::Range;

/// Header label of the signing algorithm.
pub const HEADER_ALGORITHM: i64 = 1;

/// Header label of the critical headers list.
pub const HEADER_CRITICAL: i64 = 2;

/// Header label of the payload content type.
pub const HEADER_CONTENT_TYPE: i64 = 3;

/// Header label of the key identifier.
pub const HEADER_KEY_ID: i64 = 4;

/// Header label of the full initialization vector.
pub const HEADER_IV: i64 = 5;

/// Header label of the partial initialization vector.
pub const HEADER_PARTIAL_IV: i64 = 6;

/// Header label of an embedded counter signature.
pub const HEADER_COUNTER_SIGNATURE: i64 = 7;

/// Protection selects which of the two header maps an entry is encoded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    Protected,
    Unprotected,
}

/// HeaderValue is the value of a single header entry. Strings and raw CBOR are
/// borrowed, never copied into the bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderValue<'a> {
    Int(i64),
    Text(&'a str),
    Bytes(&'a [u8]),
    /// An already encoded CBOR item, written out verbatim. It must hold exactly
    /// one well-formed item. Decoding only yields it for items that none of the
    /// typed variants cover, so an integer or string wrapped here comes back as
    /// `Int`, `Text` or `Bytes`.
    Cbor(&'a [u8]),
}

impl<'a> HeaderValue<'a> {
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            HeaderValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            HeaderValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            HeaderValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_cbor(&self) -> Option<&'a [u8]> {
        match *self {
            HeaderValue::Cbor(v) => Some(v),
            _ => None,
        }
    }

    /// encoded_len returns the number of bytes the value occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match *self {
            HeaderValue::Int(v) => cbor::int_len(v),
            HeaderValue::Text(v) => cbor::bytes_len(v.len()),
            HeaderValue::Bytes(v) => cbor::bytes_len(v.len()),
            HeaderValue::Cbor(v) => v.len(),
        }
    }

    // check ensures that raw CBOR holds exactly one well-formed item, so that
    // whatever gets signed can also be decoded again.
    fn check(&self) -> Result<()> {
        if let HeaderValue::Cbor(v) = *self {
            let mut dec = Decoder::relaxed(v);
            if dec.decode_raw().is_err() || dec.finish().is_err() {
                return Err(Error::InvalidParam("raw header value is not a single CBOR item"));
            }
        }
        Ok(())
    }

    fn encode(&self, enc: &mut Encoder<'_>) -> Result<()> {
        match *self {
            HeaderValue::Int(v) => enc.encode_int(v)?,
            HeaderValue::Text(v) => enc.encode_text(v)?,
            HeaderValue::Bytes(v) => enc.encode_bytes(v)?,
            HeaderValue::Cbor(v) => enc.extend(v)?,
        }
        Ok(())
    }

    // decode reads the next item as a header value. Integers and strings map to
    // their typed variants, everything else is kept as raw CBOR.
    fn decode(dec: &mut Decoder<'a>) -> Result<Self> {
        Ok(match dec.peek_type()? {
            Type::Uint | Type::Nint => HeaderValue::Int(dec.decode_int()?),
            Type::Text => HeaderValue::Text(dec.decode_text()?),
            Type::Bytes => HeaderValue::Bytes(dec.decode_bytes()?),
            _ => HeaderValue::Cbor(dec.decode_raw()?),
        })
    }
}

/// Header is a single labelled entry in a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header<'a> {
    pub key: i64,
    pub protection: Protection,
    pub value: HeaderValue<'a>,
}

impl<'a> Header<'a> {
    pub fn new(key: i64, value: HeaderValue<'a>, protection: Protection) -> Self {
        Self {
            key,
            protection,
            value,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.protection == Protection::Protected
    }

    fn encoded_len(&self) -> usize {
        cbor::int_len(self.key) + self.value.encoded_len()
    }
}

/// HeaderBucket is a fixed-capacity ordered collection of header entries.
#[derive(Clone, Debug)]
pub struct HeaderBucket<'a, const N: usize> {
    entries: [Option<Header<'a>>; N],
    len: usize,
}

impl<const N: usize> Default for HeaderBucket<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const N: usize> HeaderBucket<'a, N> {
    /// new creates an empty bucket.
    pub const fn new() -> Self {
        Self {
            entries: [None; N],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// remaining returns how many more entries fit into the bucket.
    pub fn remaining(&self) -> usize {
        N - self.len
    }

    /// add appends an entry, failing with `CapacityExceeded` if the bucket is
    /// full and with `InvalidParam` if a raw CBOR value is not a single item.
    /// Duplicate keys are not rejected.
    pub fn add(&mut self, key: i64, value: HeaderValue<'a>, protection: Protection) -> Result<()> {
        value.check()?;
        let slot = self.entries.get_mut(self.len).ok_or(Error::CapacityExceeded)?;
        *slot = Some(Header::new(key, value, protection));
        self.len += 1;
        Ok(())
    }

    /// set overwrites the first entry with the given key in place, or appends a
    /// new one if the key is not present yet.
    pub fn set(&mut self, key: i64, value: HeaderValue<'a>, protection: Protection) -> Result<()> {
        value.check()?;
        for entry in self.entries[..self.len].iter_mut().flatten() {
            if entry.key == key {
                *entry = Header::new(key, value, protection);
                return Ok(());
            }
        }
        self.add(key, value, protection)
    }

    /// get returns the first entry with the given key, whichever map it is in.
    pub fn get(&self, key: i64) -> Option<&Header<'a>> {
        self.iter().find(|h| h.key == key)
    }

    /// get_protected returns the first protected entry with the given key.
    pub fn get_protected(&self, key: i64) -> Option<&Header<'a>> {
        self.iter()
            .find(|h| h.key == key && h.protection == Protection::Protected)
    }

    /// get_unprotected returns the first unprotected entry with the given key.
    pub fn get_unprotected(&self, key: i64) -> Option<&Header<'a>> {
        self.iter()
            .find(|h| h.key == key && h.protection == Protection::Unprotected)
    }

    /// iter walks the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Header<'a>> {
        self.entries[..self.len].iter().flatten()
    }

    /// count returns the number of entries flagged with the given protection.
    pub fn count(&self, protection: Protection) -> usize {
        self.iter().filter(|h| h.protection == protection).count()
    }

    /// map_len returns the encoded size of the CBOR map holding the entries of
    /// the given protection. For protected entries this excludes the byte
    /// string wrapper.
    pub fn map_len(&self, protection: Protection) -> usize {
        let mut size = cbor::header_len(self.count(protection) as u64);
        for header in self.iter().filter(|h| h.protection == protection) {
            size += header.encoded_len();
        }
        size
    }

    /// protected_len returns the encoded size of the protected map content
    /// as wrapped into the byte string. Empty buckets wrap nothing at all.
    pub fn protected_len(&self) -> usize {
        if self.count(Protection::Protected) == 0 {
            0
        } else {
            self.map_len(Protection::Protected)
        }
    }

    /// encode_map writes the entries of the given protection as a CBOR map.
    pub fn encode_map(&self, enc: &mut Encoder<'_>, protection: Protection) -> Result<()> {
        enc.encode_map_header(self.count(protection))?;
        for header in self.iter().filter(|h| h.protection == protection) {
            enc.encode_int(header.key)?;
            header.value.encode(enc)?;
        }
        Ok(())
    }

    /// encode_protected writes the protected entries as a byte string wrapped
    /// map and returns the range of the byte string content within the output.
    /// An empty protected set encodes as a zero-length byte string.
    pub fn encode_protected(&self, enc: &mut Encoder<'_>) -> Result<Range<usize>> {
        let len = self.protected_len();
        enc.encode_bytes_header(len)?;

        let start = enc.position();
        if len > 0 {
            self.encode_map(enc, Protection::Protected)?;
        }
        Ok(start..enc.position())
    }

    /// encode_unprotected writes the unprotected entries as a plain map.
    pub fn encode_unprotected(&self, enc: &mut Encoder<'_>) -> Result<()> {
        self.encode_map(enc, Protection::Unprotected)
    }

    /// decode_map reads a CBOR map from the decoder and appends its entries with
    /// the given protection. Labels must be integers.
    pub fn decode_map(&mut self, dec: &mut Decoder<'a>, protection: Protection) -> Result<()> {
        let count = dec.decode_map_header()?;
        if count > self.remaining() as u64 {
            return Err(Error::CapacityExceeded);
        }
        for _ in 0..count {
            let key = dec.decode_int()?;
            let value = HeaderValue::decode(dec)?;
            self.add(key, value, protection)?;
        }
        Ok(())
    }

    /// decode_protected parses the content of a protected header byte string
    /// into the bucket. A zero-length string holds no headers.
    pub fn decode_protected(&mut self, bytes: &'a [u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::relaxed(bytes);
        self.decode_map(&mut dec, Protection::Protected)?;
        dec.finish()?;
        Ok(())
    }
}
