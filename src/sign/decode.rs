// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Kind, SigStructure, Sign, Signature};
use crate::SIGNATURES_MAX;
use crate::cbor::{self, Decoder, Encoder, Type};
use crate::crypto::Backend;
use crate::error::{Error, Result};
use crate::header::Protection;
use crate::key::Key;

impl<'a> Sign<'a> {
    /// decode parses a COSE_Sign or COSE_Sign1 message, with or without its
    /// tag. The shape is told apart by the last array item, and a tag, if
    /// present, must match it. Every byte string of the result borrows the
    /// input, and the protected header encodings are kept verbatim.
    ///
    /// A nil payload marks the message detached; the content to verify against
    /// must then be supplied with `set_payload`.
    pub fn decode(data: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::relaxed(data);

        let tag = match dec.peek_type()? {
            Type::Tag => Some(dec.decode_tag()?),
            _ => None,
        };
        let items = dec.decode_array_header()?;
        if items != 4 {
            return Err(cbor::Error::UnexpectedItemCount(items, 4).into());
        }
        // Body headers and payload are common to both shapes
        let mut msg = Sign::new(Kind::Sign);
        msg.tagged = tag.is_some();

        let protected = dec.decode_bytes()?;
        msg.headers.decode_protected(protected)?;
        msg.protected = Some(protected);
        msg.headers.decode_map(&mut dec, Protection::Unprotected)?;

        if dec.peek_null() {
            dec.decode_null()?;
            msg.detached = true;
        } else {
            msg.payload = Some(dec.decode_bytes()?);
        }
        // A bare signature makes a COSE_Sign1, anything else must be the
        // COSE_Sign signature list
        if dec.peek_type()? == Type::Bytes {
            msg.kind = Kind::Sign1;
            msg.signatures[0].signature = dec.decode_bytes()?;
            msg.count = 1;
        } else {
            let count = dec.decode_array_header()?;
            if count == 0 {
                return Err(cbor::Error::UnexpectedItemCount(0, 1).into());
            }
            if count > SIGNATURES_MAX as u64 {
                return Err(Error::TooManySignatures(count, SIGNATURES_MAX));
            }
            for i in 0..count as usize {
                msg.signatures[i] = decode_signature(&mut dec)?;
                msg.count += 1;
            }
        }
        if let Some(tag) = tag {
            if tag != msg.kind.tag() {
                return Err(cbor::Error::UnexpectedTag(tag, msg.kind.tag()).into());
            }
        }
        dec.finish()?;

        log::debug!(
            "cose: decoded {:?} with {} signature(s), detached={}",
            msg.kind,
            msg.count,
            msg.detached
        );
        Ok(msg)
    }

    /// sig_structure builds the exact bytes a signer signs into scratch. For
    /// decoded messages the protected headers are taken verbatim from the wire,
    /// for locally built ones they are serialized at the head of scratch first.
    pub fn sig_structure<'s>(&self, index: usize, scratch: &'s mut [u8]) -> Result<&'s [u8]> {
        let slot = self.slot(index)?;
        let payload = self.payload.ok_or(Error::InvalidParam("missing payload"))?;

        let mut enc = Encoder::new(&mut *scratch);
        let body = match self.protected {
            Some(_) => 0..0,
            None => self.headers.encode_protected(&mut enc)?,
        };
        let sign = match (self.kind, slot.protected) {
            (Kind::Sign, None) => slot.headers.encode_protected(&mut enc)?,
            _ => 0..0,
        };
        let used = enc.finish();
        let (head, tail) = scratch.split_at_mut(used);

        let context = SigStructure {
            context: self.kind.context(),
            body_protected: self.protected.unwrap_or(&head[body]),
            sign_protected: match self.kind {
                Kind::Sign => Some(slot.protected.unwrap_or(&head[sign])),
                Kind::Sign1 => None,
            },
            external_aad: self.external_aad,
            payload,
        };
        let len = context.encode(tail)?;
        Ok(&tail[..len])
    }

    /// verify checks signature slot index against the given key. A protected
    /// algorithm header that names a different algorithm than the key is a
    /// verification failure. The signature is checked by the backend either
    /// way, so a mismatch costs the same work as a bad signature.
    pub fn verify<B: Backend>(
        &self,
        backend: &B,
        key: &Key<'_>,
        index: usize,
        scratch: &mut [u8],
    ) -> Result<()> {
        let pinned = match self.algorithm(index)? {
            Some(alg) => alg.value.as_int() == Some(key.algorithm().id()),
            None => true,
        };
        let context = self.sig_structure(index, scratch)?;
        log::trace!("cose: signature {} context is {} bytes", index, context.len());

        let result = backend.verify(key, context, self.signatures[index].signature);
        if !pinned {
            log::debug!("cose: signature {} algorithm does not match key", index);
            return Err(Error::VerificationFailed);
        }
        log::debug!("cose: signature {} verified: {}", index, result.is_ok());
        result
    }
}

// decode_signature parses one COSE_Signature of a COSE_Sign signature list.
fn decode_signature<'a>(dec: &mut Decoder<'a>) -> Result<Signature<'a>> {
    let items = dec.decode_array_header()?;
    if items != 3 {
        return Err(cbor::Error::UnexpectedItemCount(items, 3).into());
    }
    let mut slot = Signature::new();

    let protected = dec.decode_bytes()?;
    slot.headers.decode_protected(protected)?;
    slot.protected = Some(protected);
    slot.headers.decode_map(dec, Protection::Unprotected)?;
    slot.signature = dec.decode_bytes()?;

    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Algorithm;
    use crate::header::{HEADER_ALGORITHM, HEADER_KEY_ID, HeaderValue};
    use core::cell::Cell;
    use std::vec::Vec;

    // A COSE_Sign SUIT manifest signed by one EdDSA signer.
    const SIGNED_MANIFEST: &str = concat!(
        "d8628444a103182aa058cd8a02a4016e5468697320697320612074657374026e",
        "412074657374207061796c6f6164036f412073616d706c652076656e646f7204",
        "75416e206578706572696d656e74616c206d6f64656c50aabc3aed65e1e32026",
        "1fbc5025d499fc1a5abb97f7828202501492af1425695e48bf429b2d51f2ab45",
        "820150fa6b4a53d5ad5fdfbe9de663e4d41ffef6f6f6f68781011043666f6f81",
        "826e687474703a2f2f666f6f2e636f6d018101a1015820c31211d1ff88f77a5a",
        "af653677895bfca769f06da198a8fa71156aa64acd695df681835818a2012704",
        "53536f6d657468696e6740736f6d657768657265a05840c55f03496cb112295c",
        "930fa641f5dbbe631a060fdaa2d600d06d4666fc45f91047482a971c969f09d4",
        "f4010577050bd8db00148a7daa91f1b4bb272d5b6ff80c",
    );

    // Public key of the manifest signer.
    const MANIFEST_SIGNER: &str = "73c1c7598f86583acc84b4bdf4b37a79c0b9f59bd34d2fe7e7047106a25ce35a";

    // Tests that the known manifest decodes into the expected headers and
    // verifies against its signer.
    #[cfg(feature = "eddsa")]
    #[test]
    fn test_signed_manifest() {
        use crate::crypto::{Curve, Software};
        use crate::header::HEADER_CONTENT_TYPE;

        let data = hex::decode(SIGNED_MANIFEST).unwrap();
        assert_eq!(data.len(), 311);
        let public = hex::decode(MANIFEST_SIGNER).unwrap();
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, None);

        let msg = Sign::decode(&data).unwrap();
        assert_eq!(msg.kind(), Kind::Sign);
        assert!(msg.is_tagged());
        assert_eq!(msg.signature_count(), 1);
        assert_eq!(msg.header(HEADER_CONTENT_TYPE).unwrap().value.as_int(), Some(42));
        assert_eq!(msg.payload().unwrap().len(), 205);

        let kid = msg.kid(0).unwrap().unwrap();
        assert_eq!(kid, b"Something@somewhere");
        assert_eq!(kid.as_ptr(), data[data.len() - 86..].as_ptr());
        assert_eq!(
            msg.signature_protected(0, HEADER_ALGORITHM).unwrap().value.as_int(),
            Some(-8)
        );
        let payload = msg.payload().unwrap();
        assert!(payload.windows(14).any(|w| w == b"This is a test"));

        let mut scratch = [0u8; 512];
        assert_eq!(msg.sig_structure(0, &mut scratch).unwrap().len(), 250);
        msg.verify(&Software, &key, 0, &mut scratch).unwrap();

        // Flipping any byte of the signature breaks it
        let mut tampered = data.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x80;
        let msg = Sign::decode(&tampered).unwrap();
        assert_eq!(
            msg.verify(&Software, &key, 0, &mut scratch),
            Err(Error::VerificationFailed)
        );
    }

    // Tests that verification runs over the protected bytes as received, even
    // when they are not in their shortest form and a re-encoding would differ.
    #[cfg(feature = "eddsa")]
    #[test]
    fn test_verbatim_protected() {
        use crate::crypto::{Curve, Software};
        use crate::header::HEADER_CONTENT_TYPE;
        use crate::eddsa;

        let secret = eddsa::SecretKey::from_bytes(&[0x33; 32]);
        let public = secret.public_key().to_bytes();
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, None);

        // {3: 42} with the value needlessly encoded in 16 bits
        let body: &[u8] = &[0xa1, 0x03, 0x19, 0x00, 0x2a];
        let context = SigStructure {
            context: crate::sign::Context::Signature1,
            body_protected: body,
            sign_protected: None,
            external_aad: &[],
            payload: b"payload",
        };
        let mut buf = [0u8; 64];
        let len = context.encode(&mut buf).unwrap();
        let signature = secret.sign(&buf[..len]);

        let mut wire = Vec::new();
        wire.extend_from_slice(&[0xd2, 0x84, 0x45]);
        wire.extend_from_slice(body);
        wire.extend_from_slice(&[0xa0, 0x47]);
        wire.extend_from_slice(b"payload");
        wire.extend_from_slice(&[0x58, 0x40]);
        wire.extend_from_slice(&signature);

        let mut msg = Sign::decode(&wire).unwrap();
        assert_eq!(msg.kind(), Kind::Sign1);
        assert_eq!(msg.protected(HEADER_CONTENT_TYPE).unwrap().value.as_int(), Some(42));

        let mut scratch = [0u8; 64];
        msg.verify(&Software, &key, 0, &mut scratch).unwrap();

        // Re-serializing the parsed headers canonically would not verify
        msg.protected = None;
        assert_eq!(
            msg.verify(&Software, &key, 0, &mut scratch),
            Err(Error::VerificationFailed)
        );
    }

    // Tests that a signature list beyond the slot capacity is refused rather
    // than truncated.
    #[test]
    fn test_too_many_signatures() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0x84, 0x40, 0xa0, 0x41, 0x00]);
        wire.push(0x80 | (SIGNATURES_MAX as u8 + 1));
        for _ in 0..=SIGNATURES_MAX {
            wire.extend_from_slice(&[0x83, 0x40, 0xa0, 0x41, 0x00]);
        }
        assert_eq!(
            Sign::decode(&wire).unwrap_err(),
            Error::TooManySignatures(SIGNATURES_MAX as u64 + 1, SIGNATURES_MAX)
        );

        // Exactly at capacity is fine
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0x84, 0x40, 0xa0, 0x41, 0x00]);
        wire.push(0x80 | SIGNATURES_MAX as u8);
        for _ in 0..SIGNATURES_MAX {
            wire.extend_from_slice(&[0x83, 0x40, 0xa0, 0x41, 0x00]);
        }
        let msg = Sign::decode(&wire).unwrap();
        assert_eq!(msg.signature_count(), SIGNATURES_MAX);
        assert!(!msg.is_tagged());
    }

    // Tests that structurally broken messages are rejected as malformed.
    #[test]
    fn test_malformed() {
        struct TestCase {
            data: &'static str,
            err: Error,
        }
        let tests = [
            // Empty input
            TestCase {
                data: "",
                err: Error::MalformedInput(cbor::Error::UnexpectedEof),
            },
            // Three items instead of four
            TestCase {
                data: "8340a040",
                err: Error::MalformedInput(cbor::Error::UnexpectedItemCount(3, 4)),
            },
            // COSE_Sign1 carrying the COSE_Sign tag
            TestCase {
                data: "d8628440a0404100",
                err: Error::MalformedInput(cbor::Error::UnexpectedTag(98, 18)),
            },
            // COSE_Sign carrying the COSE_Sign1 tag
            TestCase {
                data: "d28440a040818340a04100",
                err: Error::MalformedInput(cbor::Error::UnexpectedTag(18, 98)),
            },
            // Empty signature list
            TestCase {
                data: "8440a04080",
                err: Error::MalformedInput(cbor::Error::UnexpectedItemCount(0, 1)),
            },
            // Signature with two items
            TestCase {
                data: "8440a040818240a0",
                err: Error::MalformedInput(cbor::Error::UnexpectedItemCount(2, 3)),
            },
            // Payload that is neither bytes nor nil
            TestCase {
                data: "8440a0614140",
                err: Error::MalformedInput(cbor::Error::InvalidMajorType(3, 2)),
            },
            // Text header label
            TestCase {
                data: "8440a1616101404100",
                err: Error::MalformedInput(cbor::Error::InvalidMajorType(3, 0)),
            },
            // Trailing garbage
            TestCase {
                data: "8440a040410000",
                err: Error::MalformedInput(cbor::Error::TrailingBytes),
            },
        ];
        for (i, tt) in tests.iter().enumerate() {
            let data = hex::decode(tt.data).unwrap();
            assert_eq!(Sign::decode(&data).unwrap_err(), tt.err, "test {}", i);
        }
    }

    // Tests that slot accessors reject indices past the decoded signatures.
    #[test]
    fn test_index_out_of_range() {
        let data = hex::decode("8440a04041aa").unwrap();
        let msg = Sign::decode(&data).unwrap();
        assert_eq!(msg.kind(), Kind::Sign1);
        assert_eq!(msg.signature(0).unwrap().signature(), &[0xaa]);

        let mut scratch = [0u8; 64];
        assert!(matches!(
            msg.sig_structure(1, &mut scratch),
            Err(Error::InvalidParam(_))
        ));
        assert!(matches!(msg.kid(1), Err(Error::InvalidParam(_))));
        assert!(msg.signature(1).is_err());
    }

    // Accepting counts verifications and accepts every signature.
    struct Accepting {
        calls: Cell<usize>,
    }

    impl Backend for Accepting {
        fn signature_size(&self, _key: &Key<'_>) -> Result<usize> {
            Ok(1)
        }

        fn sign(&self, _key: &Key<'_>, _message: &[u8], _signature: &mut [u8]) -> Result<()> {
            Ok(())
        }

        fn verify(&self, _key: &Key<'_>, _message: &[u8], _signature: &[u8]) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    // Tests that a decoded slot pinned to one algorithm refuses a key of
    // another even if the signature checks out, and that the signature is
    // still checked so both failures cost the same.
    #[test]
    fn test_algorithm_pinning() {
        // 18([h'a10127', {}, h'', h'00'])
        let data = hex::decode("d28443a10127a0404100").unwrap();
        let msg = Sign::decode(&data).unwrap();
        assert_eq!(msg.protected(HEADER_ALGORITHM).unwrap().value, HeaderValue::Int(-8));
        assert!(msg.protected(HEADER_KEY_ID).is_none());

        let backend = Accepting {
            calls: Cell::new(0),
        };
        let secret = [0u8; 32];
        let key = Key::symmetric(Algorithm::ChaCha20Poly1305, &secret);
        let mut scratch = [0u8; 64];
        assert_eq!(
            msg.verify(&backend, &key, 0, &mut scratch),
            Err(Error::VerificationFailed)
        );
        assert_eq!(backend.calls.get(), 1);

        // Without the algorithm header any key is handed to the backend
        let data = hex::decode("d28440a0404100").unwrap();
        let msg = Sign::decode(&data).unwrap();
        assert_eq!(msg.verify(&backend, &key, 0, &mut scratch), Ok(()));
        assert_eq!(backend.calls.get(), 2);
    }
}
