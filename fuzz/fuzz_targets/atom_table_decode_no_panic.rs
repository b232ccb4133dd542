// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

use cla_unify::{
    AtomTableArtifact, PayloadCodec, decode_artifact, validate_atom_table_schema_version,
};
use libfuzzer_sys::fuzz_target;

fn codec_for(seed: u8) -> PayloadCodec {
    if seed & 1 == 0 {
        PayloadCodec::Json
    } else {
        PayloadCodec::Bincode
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };

    if let Ok(artifact) = decode_artifact(body) {
        let _ = validate_atom_table_schema_version(artifact.schema_version);
        let _ = artifact.into_stored();
    }

    // Raw payload bytes behind a well-formed envelope exercise the payload decoders.
    let artifact = AtomTableArtifact {
        schema_version: 1,
        engine_fingerprint: "fuzz".to_string(),
        config_key: "0".repeat(64),
        created_at_ns: 0,
        payload_crc32: crc32fast::hash(body),
        payload_codec: codec_for(selector),
        payload: body.to_vec(),
    };
    let _ = artifact.into_stored();
});

