// cose-rs: heap-free COSE signing structures
// Copyright 2025 Dark Bio AG. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![no_main]

use darkbio_cose::{Algorithm, Curve, Key, Sign, Software};
use libfuzzer_sys::fuzz_target;

// Arbitrary public key to run verification against. Verification is expected
// to fail, but it must fail gracefully.
const PUBLIC: [u8; 32] = [0x42; 32];

fuzz_target!(|data: &[u8]| {
    let Ok(mut msg) = Sign::decode(data) else {
        return;
    };
    if msg.payload().is_none() {
        msg.set_payload(b"detached");
    }
    let key = Key::new(Algorithm::EdDSA, Curve::Ed25519, &PUBLIC, None);

    let mut scratch = [0u8; 4096];
    for i in 0..msg.signature_count() {
        // Contexts of decoded messages must rebuild from the wire bytes alone
        let payload = msg.payload().map_or(0, |p| p.len());
        if let Ok(context) = msg.sig_structure(i, &mut scratch) {
            assert!(context.len() > payload);
        }
        let _ = msg.verify(&Software, &key, i, &mut scratch);
        let _ = msg.kid(i).expect("decoded slot index must be valid");
    }
});
