// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Tiny heap-free CBOR encoder and decoder.
//!
//! https://datatracker.ietf.org/doc/html/rfc8949
//!
//! This is a cursor based implementation of the handful of CBOR items the COSE
//! structures are built from. The encoder writes into a caller supplied slice
//! and the decoder hands out slices borrowed from its input, so neither side
//! ever touches an allocator. The following items are supported:
//! - Booleans and null:       true, false, null
//! - 64bit positive integers: u64
//! - 64bit signed integers:   i64
//! - UTF-8 text strings:      &str (definite length)
//! - Byte strings:            &[u8] (definite length)
//! - Arrays and maps:         headers only, items follow inline
//! - Tags:                    header only, the tagged item follows inline
//! - Raw:                     any nesting of the above, passed through verbatim

// Supported CBOR major types
const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

// Additional info values
const INFO_UINT8: u8 = 24;
const INFO_UINT16: u8 = 25;
const INFO_UINT32: u8 = 26;
const INFO_UINT64: u8 = 27;

// Simple values (major type 7)
const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;

/// Maximum nesting depth for CBOR arrays, maps and tags. Inputs nested deeper
/// than this are rejected to prevent stack overflow from recursive parsing.
const MAX_DEPTH: usize = 32;

/// Error is the failures that can occur while encoding or decoding CBOR data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("output buffer too small")]
    BufferTooSmall,
    #[error("invalid major type: {0}, want {1}")]
    InvalidMajorType(u8, u8),
    #[error("invalid additional info: {0}")]
    InvalidAdditionalInfo(u8),
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("non-canonical encoding")]
    NonCanonical,
    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,
    #[error("unexpected trailing bytes")]
    TrailingBytes,
    #[error("unexpected item count: {0}, want {1}")]
    UnexpectedItemCount(u64, usize),
    #[error("unexpected tag: {0}, want {1}")]
    UnexpectedTag(u64, u64),
    #[error("unsupported type: {0}")]
    UnsupportedType(u8),
    #[error("{sign} integer overflow: {value} exceeds max {max}", sign = if *.0 { "negative" } else { "positive" }, value = .1, max = .2)]
    IntegerOverflow(bool, u64, u64),
    #[error("nesting depth exceeds maximum of {0}")]
    MaxDepthExceeded(usize),
}

/// Type is the kind of the next item waiting in a decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Uint,
    Nint,
    Bytes,
    Text,
    Array,
    Map,
    Tag,
    Simple,
}

/// header_len returns the encoded size of an item header carrying the given
/// integer value or length, using the canonical shortest form.
pub const fn header_len(value: u64) -> usize {
    if value < 24 {
        1
    } else if value <= u8::MAX as u64 {
        2
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// int_len returns the encoded size of a signed integer.
pub const fn int_len(value: i64) -> usize {
    if value >= 0 {
        header_len(value as u64)
    } else {
        header_len((-1 - value) as u64)
    }
}

/// bytes_len returns the encoded size of a byte or text string of the given
/// content length.
pub const fn bytes_len(len: usize) -> usize {
    header_len(len as u64) + len
}

// Encoder is the low level implementation of the CBOR encoder, writing items
// sequentially into a borrowed output slice.
pub struct Encoder<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Encoder<'b> {
    // new creates a CBOR encoder that starts writing at the head of buf.
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    // position returns the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    // finish terminates encoding and returns the number of bytes written.
    pub fn finish(self) -> usize {
        self.pos
    }

    // extend appends raw, already encoded bytes to the output.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.claim(bytes.len())?;
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    // reserve skips over len bytes of the output, returning the offset where
    // the hole starts. The caller fills it in after encoding finishes.
    pub fn reserve(&mut self, len: usize) -> Result<usize, Error> {
        let start = self.pos;
        self.pos = self.claim(len)?;
        Ok(start)
    }

    // encode_uint encodes a positive integer into its canonical shortest-form.
    pub fn encode_uint(&mut self, value: u64) -> Result<(), Error> {
        self.encode_length(MAJOR_UINT, value)
    }

    // encode_int encodes a signed integer into its canonical shortest-form.
    pub fn encode_int(&mut self, value: i64) -> Result<(), Error> {
        if value >= 0 {
            self.encode_length(MAJOR_UINT, value as u64)
        } else {
            self.encode_length(MAJOR_NINT, (-1 - value) as u64)
        }
    }

    // encode_bytes encodes an opaque byte string.
    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<(), Error> {
        self.claim(bytes_len(value.len()))?;
        self.encode_bytes_header(value.len())?;
        self.extend(value)
    }

    // encode_bytes_header encodes only the header of a byte string, leaving the
    // content to be appended or reserved afterwards.
    pub fn encode_bytes_header(&mut self, len: usize) -> Result<(), Error> {
        self.encode_length(MAJOR_BYTES, len as u64)
    }

    // encode_text encodes a UTF-8 text string.
    pub fn encode_text(&mut self, value: &str) -> Result<(), Error> {
        self.claim(bytes_len(value.len()))?;
        self.encode_length(MAJOR_TEXT, value.len() as u64)?;
        self.extend(value.as_bytes())
    }

    // encode_array_header encodes an array size.
    pub fn encode_array_header(&mut self, len: usize) -> Result<(), Error> {
        self.encode_length(MAJOR_ARRAY, len as u64)
    }

    // encode_map_header encodes a map size.
    pub fn encode_map_header(&mut self, len: usize) -> Result<(), Error> {
        self.encode_length(MAJOR_MAP, len as u64)
    }

    // encode_tag encodes a semantic tag for the item that follows.
    pub fn encode_tag(&mut self, tag: u64) -> Result<(), Error> {
        self.encode_length(MAJOR_TAG, tag)
    }

    // encode_bool encodes a CBOR boolean value.
    pub fn encode_bool(&mut self, value: bool) -> Result<(), Error> {
        self.extend(&[MAJOR_SIMPLE << 5 | if value { SIMPLE_TRUE } else { SIMPLE_FALSE }])
    }

    // encode_null encodes a CBOR null value.
    pub fn encode_null(&mut self) -> Result<(), Error> {
        self.extend(&[MAJOR_SIMPLE << 5 | SIMPLE_NULL])
    }

    // encode_length encodes a major type with an unsigned integer, which defines
    // the length for most types, or the value itself for integers.
    fn encode_length(&mut self, major_type: u8, len: u64) -> Result<(), Error> {
        let major = major_type << 5;
        if len < 24 {
            self.extend(&[major | len as u8])
        } else if len <= u8::MAX as u64 {
            self.extend(&[major | INFO_UINT8, len as u8])
        } else if len <= u16::MAX as u64 {
            let [a, b] = (len as u16).to_be_bytes();
            self.extend(&[major | INFO_UINT16, a, b])
        } else if len <= u32::MAX as u64 {
            let [a, b, c, d] = (len as u32).to_be_bytes();
            self.extend(&[major | INFO_UINT32, a, b, c, d])
        } else {
            let [a, b, c, d, e, f, g, h] = len.to_be_bytes();
            self.extend(&[major | INFO_UINT64, a, b, c, d, e, f, g, h])
        }
    }

    // claim checks that len more bytes fit into the output and returns the end
    // offset they would occupy. Nothing is written.
    fn claim(&self, len: usize) -> Result<usize, Error> {
        match self.pos.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(end),
            _ => Err(Error::BufferTooSmall),
        }
    }
}

// Decoder is the low level implementation of the CBOR decoder. Strings are
// returned as slices of the input, never copied.
#[derive(Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    strict: bool,
}

impl<'a> Decoder<'a> {
    // new creates a decoder around a data blob, rejecting any integer or length
    // that is not in its canonical shortest-form.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            strict: true,
        }
    }

    // relaxed creates a decoder around a data blob that accepts non-shortest
    // integer and length encodings. Wire formats that are authenticated over
    // the original bytes (COSE) use this mode.
    pub fn relaxed(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            strict: false,
        }
    }

    // position returns the number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    // finish terminates decoding and returns an error if trailing bytes remain.
    pub fn finish(self) -> Result<(), Error> {
        if self.pos != self.data.len() {
            return Err(Error::TrailingBytes);
        }
        Ok(())
    }

    // peek_type returns the type of the next item without consuming it.
    pub fn peek_type(&self) -> Result<Type, Error> {
        let byte = *self.data.get(self.pos).ok_or(Error::UnexpectedEof)?;
        Ok(match byte >> 5 {
            MAJOR_UINT => Type::Uint,
            MAJOR_NINT => Type::Nint,
            MAJOR_BYTES => Type::Bytes,
            MAJOR_TEXT => Type::Text,
            MAJOR_ARRAY => Type::Array,
            MAJOR_MAP => Type::Map,
            MAJOR_TAG => Type::Tag,
            _ => Type::Simple,
        })
    }

    // decode_uint decodes a positive integer.
    pub fn decode_uint(&mut self) -> Result<u64, Error> {
        let (major, value) = self.decode_header()?;
        if major != MAJOR_UINT {
            return Err(Error::InvalidMajorType(major, MAJOR_UINT));
        }
        Ok(value)
    }

    // decode_int decodes a signed integer (major type 0 or 1).
    pub fn decode_int(&mut self) -> Result<i64, Error> {
        let (major, value) = self.decode_header()?;
        match major {
            MAJOR_UINT => {
                if value > i64::MAX as u64 {
                    return Err(Error::IntegerOverflow(false, value, i64::MAX as u64));
                }
                Ok(value as i64)
            }
            MAJOR_NINT => {
                if value > i64::MAX as u64 {
                    return Err(Error::IntegerOverflow(true, value, i64::MAX as u64));
                }
                Ok(-1 - value as i64)
            }
            _ => Err(Error::InvalidMajorType(major, MAJOR_UINT)),
        }
    }

    // decode_bytes decodes a byte string, borrowing its content from the input.
    pub fn decode_bytes(&mut self) -> Result<&'a [u8], Error> {
        // Extract the field type and attached length
        let (major, len) = self.decode_header()?;
        if major != MAJOR_BYTES {
            return Err(Error::InvalidMajorType(major, MAJOR_BYTES));
        }
        // Retrieve the blob and return as is
        self.read_bytes(len)
    }

    // decode_text decodes a UTF-8 text string, borrowing it from the input.
    pub fn decode_text(&mut self) -> Result<&'a str, Error> {
        // Extract the field type and attached length
        let (major, len) = self.decode_header()?;
        if major != MAJOR_TEXT {
            return Err(Error::InvalidMajorType(major, MAJOR_TEXT));
        }
        // Retrieve the blob and reinterpret as UTF-8
        let bytes = self.read_bytes(len)?;
        core::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    // decode_array_header decodes an array header, returning its length.
    pub fn decode_array_header(&mut self) -> Result<u64, Error> {
        let (major, len) = self.decode_header()?;
        if major != MAJOR_ARRAY {
            return Err(Error::InvalidMajorType(major, MAJOR_ARRAY));
        }
        Ok(len)
    }

    // decode_map_header decodes a map header, returning the number of key-value pairs.
    pub fn decode_map_header(&mut self) -> Result<u64, Error> {
        let (major, len) = self.decode_header()?;
        if major != MAJOR_MAP {
            return Err(Error::InvalidMajorType(major, MAJOR_MAP));
        }
        Ok(len)
    }

    // decode_tag decodes a semantic tag, returning its number. The tagged item
    // is left in place for the next decode call.
    pub fn decode_tag(&mut self) -> Result<u64, Error> {
        let (major, tag) = self.decode_header()?;
        if major != MAJOR_TAG {
            return Err(Error::InvalidMajorType(major, MAJOR_TAG));
        }
        Ok(tag)
    }

    // decode_bool decodes a CBOR boolean value.
    pub fn decode_bool(&mut self) -> Result<bool, Error> {
        let byte = *self.data.get(self.pos).ok_or(Error::UnexpectedEof)?;
        match byte {
            b if b == (MAJOR_SIMPLE << 5 | SIMPLE_FALSE) => {
                self.pos += 1;
                Ok(false)
            }
            b if b == (MAJOR_SIMPLE << 5 | SIMPLE_TRUE) => {
                self.pos += 1;
                Ok(true)
            }
            _ => Err(Error::InvalidMajorType(byte >> 5, MAJOR_SIMPLE)),
        }
    }

    // decode_null decodes a CBOR null value.
    pub fn decode_null(&mut self) -> Result<(), Error> {
        let byte = *self.data.get(self.pos).ok_or(Error::UnexpectedEof)?;
        if byte != (MAJOR_SIMPLE << 5 | SIMPLE_NULL) {
            return Err(Error::InvalidMajorType(byte >> 5, MAJOR_SIMPLE));
        }
        self.pos += 1;
        Ok(())
    }

    // peek_null checks if the next value is null without consuming it.
    pub fn peek_null(&self) -> bool {
        self.data.get(self.pos) == Some(&(MAJOR_SIMPLE << 5 | SIMPLE_NULL))
    }

    // decode_raw skips over the next item, however deeply nested, and returns
    // its full encoding as a slice of the input.
    pub fn decode_raw(&mut self) -> Result<&'a [u8], Error> {
        let start = self.pos;
        skip_object(self, MAX_DEPTH)?;
        Ok(&self.data[start..self.pos])
    }

    // decode_header extracts the major type for the next field and the integer
    // value embedded as the additional info.
    fn decode_header(&mut self) -> Result<(u8, u64), Error> {
        // Ensure there's still data left in the buffer
        let byte = *self.data.get(self.pos).ok_or(Error::UnexpectedEof)?;
        self.pos += 1;

        let major = byte >> 5;
        let info = byte & 0x1f;

        // Extract the integer embedded in the info
        let value = match info {
            0..=23 => info as u64,
            INFO_UINT8 => self.read_bytes(1)?[0] as u64,
            INFO_UINT16 => {
                let bytes = self.read_bytes(2)?;
                u16::from_be_bytes([bytes[0], bytes[1]]) as u64
            }
            INFO_UINT32 => {
                let bytes = self.read_bytes(4)?;
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
            }
            INFO_UINT64 => {
                let bytes = self.read_bytes(8)?;
                u64::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ])
            }
            _ => return Err(Error::InvalidAdditionalInfo(info)),
        };

        // Ensure it was canonical in the first place
        if self.strict
            && !match info {
                0..=23 => value < 24,
                INFO_UINT8 => value >= 24,
                INFO_UINT16 => value > u8::MAX as u64,
                INFO_UINT32 => value > u16::MAX as u64,
                INFO_UINT64 => value > u32::MAX as u64,
                _ => false,
            }
        {
            return Err(Error::NonCanonical);
        }
        Ok((major, value))
    }

    // read_bytes retrieves the next handful of bytes from the buffer.
    fn read_bytes(&mut self, len: u64) -> Result<&'a [u8], Error> {
        let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof)?;
        let end = match self.pos.checked_add(len) {
            Some(end) if end <= self.data.len() => end,
            _ => return Err(Error::UnexpectedEof),
        };
        // Retrieve the bytes and move the cursor forward
        let bytes = &self.data[self.pos..end];
        self.pos = end;

        Ok(bytes)
    }
}

// skip_object advances the decoder past one CBOR item. It does some minimal
// type checks as walking the CBOR does require walking all the inner fields
// too. The depth parameter limits nesting to prevent stack overflow from
// malicious inputs.
fn skip_object(decoder: &mut Decoder<'_>, depth: usize) -> Result<(), Error> {
    if depth == 0 {
        return Err(Error::MaxDepthExceeded(MAX_DEPTH));
    }
    let start = decoder.pos;
    let (major, value) = decoder.decode_header()?;
    match major {
        MAJOR_UINT | MAJOR_NINT => Ok(()),
        MAJOR_BYTES => {
            decoder.read_bytes(value)?;
            Ok(())
        }
        MAJOR_TEXT => {
            let bytes = decoder.read_bytes(value)?;
            core::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
            Ok(())
        }
        MAJOR_ARRAY => {
            for _ in 0..value {
                skip_object(decoder, depth - 1)?;
            }
            Ok(())
        }
        MAJOR_MAP => {
            for _ in 0..value {
                skip_object(decoder, depth - 1)?;
                skip_object(decoder, depth - 1)?;
            }
            Ok(())
        }
        MAJOR_TAG => skip_object(decoder, depth - 1),
        // Simple values below 32 are only well-formed in the one byte form
        MAJOR_SIMPLE
            if decoder.pos - start == 1
                && (value == SIMPLE_FALSE as u64
                    || value == SIMPLE_TRUE as u64
                    || value == SIMPLE_NULL as u64) =>
        {
            Ok(())
        }
        _ => Err(Error::UnsupportedType(major)),
    }
}
