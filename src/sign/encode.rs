// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Kind, Sign, SigStructure};
use crate::SIGNATURES_MAX;
use crate::cbor::Encoder;
use crate::crypto::Backend;
use crate::error::{Error, Result};
use core::ops::Range;

impl Sign<'_> {
    /// encode signs the message with every registered signer and serializes it
    /// into buf, returning the number of bytes written and the offset of the
    /// first byte of the message within buf.
    ///
    /// The message is laid out from the head of buf with holes left for the
    /// signatures. The space behind it is scratch: each signer's Sig_structure
    /// is built at its tail and signed straight into the signer's hole. If the
    /// scratch cannot hold a context the encode fails with `BufferTooSmall`.
    /// Any signer failing aborts the encode, and the buffer content is then
    /// undefined.
    pub fn encode<B: Backend>(&self, backend: &B, buf: &mut [u8]) -> Result<(usize, usize)> {
        let payload = self.payload.ok_or(Error::InvalidParam("missing payload"))?;
        if self.count == 0 {
            return Err(Error::InvalidParam("no signers registered"));
        }
        // Size the signature holes up front
        let mut sizes = [0usize; SIGNATURES_MAX];
        for (i, size) in sizes.iter_mut().enumerate().take(self.count) {
            let signer = self.signatures[i]
                .signer
                .as_ref()
                .ok_or(Error::InvalidParam("signature slot has no signing key"))?;
            *size = backend.signature_size(signer)?;
        }
        // Lay out the message skeleton, recording where the pieces landed
        let mut enc = Encoder::new(&mut *buf);
        if self.tagged {
            enc.encode_tag(self.kind.tag())?;
        }
        enc.encode_array_header(4)?;
        let body = self.headers.encode_protected(&mut enc)?;
        self.headers.encode_unprotected(&mut enc)?;
        if self.detached {
            enc.encode_null()?;
        } else {
            enc.encode_bytes(payload)?;
        }
        let mut protected: [Range<usize>; SIGNATURES_MAX] = Default::default();
        let mut holes: [Range<usize>; SIGNATURES_MAX] = Default::default();

        match self.kind {
            Kind::Sign1 => {
                enc.encode_bytes_header(sizes[0])?;
                let start = enc.reserve(sizes[0])?;
                holes[0] = start..start + sizes[0];
            }
            Kind::Sign => {
                enc.encode_array_header(self.count)?;
                for i in 0..self.count {
                    let slot = &self.signatures[i];

                    enc.encode_array_header(3)?;
                    protected[i] = slot.headers.encode_protected(&mut enc)?;
                    slot.headers.encode_unprotected(&mut enc)?;
                    enc.encode_bytes_header(sizes[i])?;
                    let start = enc.reserve(sizes[i])?;
                    holes[i] = start..start + sizes[i];
                }
            }
        }
        let written = enc.finish();

        log::debug!(
            "cose: encoding {:?} with {} signer(s), {} bytes of output",
            self.kind,
            self.count,
            written
        );
        // Split off the scratch so contexts can never overlap the output
        let (out, scratch) = buf.split_at_mut(written);
        for i in 0..self.count {
            let context = SigStructure {
                context: self.kind.context(),
                body_protected: &out[body.clone()],
                sign_protected: match self.kind {
                    Kind::Sign => Some(&out[protected[i].clone()]),
                    Kind::Sign1 => None,
                },
                external_aad: self.external_aad,
                payload,
            };
            let size = context.encoded_len();
            if size > scratch.len() {
                log::debug!(
                    "cose: scratch too small for signer {}: have {}, want {}",
                    i,
                    scratch.len(),
                    size
                );
                return Err(Error::BufferTooSmall);
            }
            let start = scratch.len() - size;
            context.encode(&mut scratch[start..])?;
            log::trace!("cose: signer {} context is {} bytes", i, size);

            let signer = self.signatures[i]
                .signer
                .as_ref()
                .ok_or(Error::InvalidParam("signature slot has no signing key"))?;
            backend.sign(signer, &scratch[start..], &mut out[holes[i].clone()])?;
        }
        Ok((written, 0))
    }
}

#[cfg(all(test, feature = "eddsa"))]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, Curve, Software};
    use crate::eddsa;
    use crate::header::{HEADER_CONTENT_TYPE, HeaderValue, Protection};
    use crate::key::Key;
    use core::cell::Cell;
    use std::vec::Vec;

    // keypair derives a deterministic Ed25519 key pair from a seed byte.
    fn keypair(seed: u8) -> ([u8; 32], [u8; 32]) {
        let secret = [seed; eddsa::SECRET_KEY_SIZE];
        let public = eddsa::SecretKey::from_bytes(&secret).public_key().to_bytes();
        (secret, public)
    }

    // find returns the offset of the first occurrence of needle in haystack.
    fn find(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap()
    }

    // Tests that a multi-signer message survives a round trip with its
    // headers, payload, key ids and signatures intact.
    #[test]
    fn test_roundtrip() {
        let (s1, p1) = keypair(1);
        let (s2, p2) = keypair(2);
        let alice = Key::new(Algorithm::EdDSA, Curve::Ed25519, &p1, Some(&s1)).with_kid(b"alice");
        let bob = Key::new(Algorithm::EdDSA, Curve::Ed25519, &p2, Some(&s2)).with_kid(b"bob");

        let mut msg = Sign::new(Kind::Sign);
        msg.set_payload(b"This is the content.");
        msg.set_external_aad(b"context");
        msg.set_content_type(HeaderValue::Int(42)).unwrap();
        msg.add_header(33, HeaderValue::Text("hello"), Protection::Unprotected)
            .unwrap();
        msg.add_signer(alice).unwrap();
        msg.add_signer(bob).unwrap();
        msg.add_signature_header(1, 34, HeaderValue::Bytes(b"extra"), Protection::Protected)
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, start) = msg.encode(&Software, &mut buf).unwrap();
        assert_eq!(start, 0);
        assert_eq!(&buf[..2], &[0xd8, 0x62]);

        let wire = &buf[start..start + len];
        let mut decoded = Sign::decode(wire).unwrap();
        decoded.set_external_aad(b"context");

        assert_eq!(decoded.kind(), Kind::Sign);
        assert!(decoded.is_tagged());
        assert_eq!(decoded.payload(), Some(&b"This is the content."[..]));
        assert_eq!(
            decoded.protected(HEADER_CONTENT_TYPE).unwrap().value.as_int(),
            Some(42)
        );
        assert_eq!(decoded.unprotected(33).unwrap().value.as_text(), Some("hello"));
        assert_eq!(decoded.signature_count(), 2);
        assert_eq!(decoded.kid(0), Ok(Some(&b"alice"[..])));
        assert_eq!(decoded.kid(1), Ok(Some(&b"bob"[..])));
        assert_eq!(
            decoded.signature_protected(1, 34).unwrap().value.as_bytes(),
            Some(&b"extra"[..])
        );

        let mut scratch = [0u8; 256];
        decoded.verify(&Software, &alice, 0, &mut scratch).unwrap();
        decoded.verify(&Software, &bob, 1, &mut scratch).unwrap();
        assert_eq!(
            decoded.verify(&Software, &bob, 0, &mut scratch),
            Err(Error::VerificationFailed)
        );
        // The locally built message yields the same contexts as the decoded one
        let mut other = [0u8; 256];
        assert_eq!(
            msg.sig_structure(1, &mut other).unwrap(),
            decoded.sig_structure(1, &mut scratch).unwrap()
        );
        // Without the external data nothing verifies
        decoded.set_external_aad(b"");
        assert_eq!(
            decoded.verify(&Software, &alice, 0, &mut scratch),
            Err(Error::VerificationFailed)
        );
    }

    // Tests that modifying any signed part of a message breaks exactly the
    // signers that cover it.
    #[test]
    fn test_tamper_sensitivity() {
        let (s1, p1) = keypair(3);
        let (s2, p2) = keypair(4);
        let alice = Key::new(Algorithm::EdDSA, Curve::Ed25519, &p1, Some(&s1));
        let bob = Key::new(Algorithm::EdDSA, Curve::Ed25519, &p2, Some(&s2));

        let mut msg = Sign::new(Kind::Sign);
        msg.set_payload(b"PAYLOAD-PAYLOAD");
        msg.add_header(35, HeaderValue::Bytes(b"BODYBODY"), Protection::Protected)
            .unwrap();
        msg.add_signer(alice).unwrap();
        msg.add_signer(bob).unwrap();
        msg.add_signature_header(0, 36, HeaderValue::Bytes(b"SIGNSIGN"), Protection::Protected)
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = msg.encode(&Software, &mut buf).unwrap();
        let wire: Vec<u8> = buf[..len].to_vec();

        // Locate the first signature within the wire bytes
        let sig0 = {
            let decoded = Sign::decode(&wire).unwrap();
            decoded.signature(0).unwrap().signature().as_ptr() as usize - wire.as_ptr() as usize
        };
        // (offset to flip, alice still valid, bob still valid)
        let cases = [
            (find(&wire, b"PAYLOAD"), false, false),
            (find(&wire, b"BODYBODY"), false, false),
            (find(&wire, b"SIGNSIGN"), false, true),
            (sig0 + 10, false, true),
        ];
        for (i, (offset, alice_ok, bob_ok)) in cases.into_iter().enumerate() {
            let mut tampered = wire.clone();
            tampered[offset] ^= 0x01;

            let decoded = Sign::decode(&tampered).unwrap();
            let mut scratch = [0u8; 256];
            assert_eq!(
                decoded.verify(&Software, &alice, 0, &mut scratch).is_ok(),
                alice_ok,
                "case {}",
                i
            );
            assert_eq!(
                decoded.verify(&Software, &bob, 1, &mut scratch).is_ok(),
                bob_ok,
                "case {}",
                i
            );
        }
    }

    // Tests the single signer shape: tag 18, a bare signature and the
    // "Signature1" context.
    #[test]
    fn test_sign1() {
        let (secret, public) = keypair(5);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret))
            .with_kid(b"11");

        let mut msg = Sign::new(Kind::Sign1);
        msg.set_payload(b"This is the content.");
        msg.add_signer(key).unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = msg.encode(&Software, &mut buf).unwrap();
        // 18([h'a10127', {4: h'3131'}, h'..', h'<64 bytes>'])
        assert_eq!(hex::encode(&buf[..14]), "d28443a10127a104423131545468");
        assert_eq!(&buf[len - 66..len - 64], &[0x58, 0x40]);

        let decoded = Sign::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.kind(), Kind::Sign1);
        assert_eq!(decoded.kid(0), Ok(Some(&b"11"[..])));

        let mut scratch = [0u8; 128];
        let context = decoded.sig_structure(0, &mut scratch).unwrap();
        assert_eq!(&context[..12], b"\x84\x6aSignature1");
        decoded.verify(&Software, &key, 0, &mut scratch).unwrap();

        // The Signature1 context verifies as a plain Ed25519 signature
        let signature: [u8; 64] = decoded.signature(0).unwrap().signature().try_into().unwrap();
        let context = decoded.sig_structure(0, &mut scratch).unwrap();
        eddsa::PublicKey::from_bytes(&public)
            .unwrap()
            .verify(context, &signature)
            .unwrap();
    }

    // Tests that untagged output omits the tag and still decodes.
    #[test]
    fn test_untagged() {
        let (secret, public) = keypair(6);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret));

        let mut msg = Sign::new(Kind::Sign);
        msg.set_tagged(false);
        msg.set_payload(b"x");
        msg.add_signer(key).unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = msg.encode(&Software, &mut buf).unwrap();
        assert_eq!(buf[0], 0x84);

        let decoded = Sign::decode(&buf[..len]).unwrap();
        assert!(!decoded.is_tagged());
        let mut scratch = [0u8; 128];
        decoded.verify(&Software, &key, 0, &mut scratch).unwrap();
    }

    // Tests that a detached message carries nil but signs the same context as
    // the attached one.
    #[test]
    fn test_detached() {
        let (secret, public) = keypair(7);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret));
        let payload = b"transported out of band";

        let mut attached = Sign::new(Kind::Sign);
        attached.set_payload(payload);
        attached.add_signer(key).unwrap();

        let mut detached = attached.clone();
        detached.set_detached(true);

        let mut buf = [0u8; 256];
        let (len, _) = detached.encode(&Software, &mut buf).unwrap();
        let mut decoded = Sign::decode(&buf[..len]).unwrap();
        assert!(decoded.is_detached());
        assert_eq!(decoded.payload(), None);

        let mut scratch = [0u8; 128];
        assert!(matches!(
            decoded.verify(&Software, &key, 0, &mut scratch),
            Err(Error::InvalidParam(_))
        ));
        decoded.set_payload(payload);
        decoded.verify(&Software, &key, 0, &mut scratch).unwrap();

        let mut other = [0u8; 128];
        assert_eq!(
            attached.sig_structure(0, &mut other).unwrap(),
            decoded.sig_structure(0, &mut scratch).unwrap()
        );
    }

    // Tests that both the output and the scratch region are bounds checked.
    #[test]
    fn test_buffer_too_small() {
        let (secret, public) = keypair(8);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret));

        let mut msg = Sign::new(Kind::Sign1);
        msg.set_payload(&[0x55; 100]);
        msg.add_signer(key).unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = msg.encode(&Software, &mut buf).unwrap();

        // Output alone does not fit
        assert_eq!(
            msg.encode(&Software, &mut buf[..len - 1]),
            Err(Error::BufferTooSmall)
        );
        // Output fits, but the context does not fit behind it
        let mut scratch = [0u8; 512];
        let context = msg.sig_structure(0, &mut scratch).unwrap().len();
        assert_eq!(
            msg.encode(&Software, &mut buf[..len + context - 1]),
            Err(Error::BufferTooSmall)
        );
        assert!(msg.encode(&Software, &mut buf[..len + context]).is_ok());
    }

    // Tests that nothing is encoded without a payload or signers.
    #[test]
    fn test_incomplete() {
        let (secret, public) = keypair(9);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret));
        let mut buf = [0u8; 256];

        let mut msg = Sign::new(Kind::Sign);
        msg.add_signer(key).unwrap();
        assert!(matches!(
            msg.encode(&Software, &mut buf),
            Err(Error::InvalidParam(_))
        ));

        let mut msg = Sign::new(Kind::Sign);
        msg.set_payload(b"x");
        assert!(matches!(
            msg.encode(&Software, &mut buf),
            Err(Error::InvalidParam(_))
        ));
    }

    // Failing signs with a fixed pattern, failing on the nth call only.
    struct Failing {
        calls: Cell<usize>,
        fail_at: usize,
    }

    impl Backend for Failing {
        fn signature_size(&self, _key: &Key<'_>) -> Result<usize> {
            Ok(8)
        }

        fn sign(&self, _key: &Key<'_>, _message: &[u8], signature: &mut [u8]) -> Result<()> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == self.fail_at {
                return Err(Error::Crypto("device unavailable"));
            }
            signature.fill(0xee);
            Ok(())
        }

        fn verify(&self, _key: &Key<'_>, _message: &[u8], _signature: &[u8]) -> Result<()> {
            Err(Error::VerificationFailed)
        }
    }

    // Tests that a failing signer aborts the whole encode with its error.
    #[test]
    fn test_signer_failure() {
        let (secret, public) = keypair(10);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret));

        let mut msg = Sign::new(Kind::Sign);
        msg.set_payload(b"x");
        for _ in 0..3 {
            msg.add_signer(key).unwrap();
        }
        let mut buf = [0u8; 256];

        let backend = Failing {
            calls: Cell::new(0),
            fail_at: 1,
        };
        assert_eq!(
            msg.encode(&backend, &mut buf),
            Err(Error::Crypto("device unavailable"))
        );
        assert_eq!(backend.calls.get(), 2);

        let backend = Failing {
            calls: Cell::new(0),
            fail_at: usize::MAX,
        };
        let (len, _) = msg.encode(&backend, &mut buf).unwrap();
        assert_eq!(&buf[len - 8..len], &[0xee; 8]);
    }

    // Tests that raw CBOR headers are checked on insertion, so that everything
    // an encode signs also decodes and verifies again.
    #[test]
    fn test_raw_headers() {
        let (secret, public) = keypair(11);
        let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &public, Some(&secret));

        let mut msg = Sign::new(Kind::Sign);
        msg.set_payload(b"raw");
        let malformed: [&[u8]; 3] = [&[], &[0x01, 0x02], &[0x82, 0x01]];
        for raw in malformed {
            assert!(matches!(
                msg.add_header(40, HeaderValue::Cbor(raw), Protection::Protected),
                Err(Error::InvalidParam(_))
            ));
        }
        assert!(msg.headers().is_empty());

        msg.add_header(40, HeaderValue::Cbor(&[0x82, 0x01, 0x02]), Protection::Protected)
            .unwrap();
        msg.add_signer(key).unwrap();
        let map = HeaderValue::Cbor(&[0xa1, 0x01, 0xf5]);
        msg.add_signature_header(0, 41, map, Protection::Unprotected)
            .unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = msg.encode(&Software, &mut buf).unwrap();
        let decoded = Sign::decode(&buf[..len]).unwrap();
        assert_eq!(
            decoded.protected(40).unwrap().value.as_cbor(),
            Some(&[0x82, 0x01, 0x02][..])
        );
        assert_eq!(
            decoded.signature_unprotected(0, 41).unwrap().value.as_cbor(),
            Some(&[0xa1, 0x01, 0xf5][..])
        );
        let mut scratch = [0u8; 128];
        decoded.verify(&Software, &key, 0, &mut scratch).unwrap();
    }
}
