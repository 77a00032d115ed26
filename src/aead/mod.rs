// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! ChaCha20-Poly1305 authenticated encryption in place.
//!
//! https://datatracker.ietf.org/doc/html/rfc8439

use chacha20poly1305::aead::AeadInPlace;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce, Tag};

/// Size of the symmetric key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the detached authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// seal encrypts the buffer in place and returns the detached authentication
/// tag covering both the ciphertext and the additional data.
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    buffer: &mut [u8],
) -> Result<[u8; TAG_SIZE], chacha20poly1305::Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let tag = cipher.encrypt_in_place_detached(Nonce::from_slice(nonce), aad, buffer)?;
    Ok(tag.into())
}

/// open authenticates and decrypts the buffer in place. On failure the buffer
/// is left as ciphertext.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_SIZE],
) -> Result<(), chacha20poly1305::Error> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher.decrypt_in_place_detached(
        Nonce::from_slice(nonce),
        aad,
        buffer,
        Tag::from_slice(tag),
    )
}
