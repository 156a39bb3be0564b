use bytes::Bytes;
use lazy_static::lazy_static;
use std::sync::Arc;

use crate::{PseudoFile, TracedFile};

pub const HELLOWORLD_CONTENTS: &[u8] = b"module.exports = () => 'Hello World!';\n";

lazy_static! {
    // ~12KB of compressible javascript, shared by several fixture pages.
    pub static ref SHARED_JS: Bytes = b"export function shared(a, b) { return a + b; }\n"
        .repeat(256)
        .into();
}

/// Returns `len` bytes of deterministic, incompressible noise.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    // xorshift64*, seeded so the state is never zero.
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        out.extend_from_slice(&state.wrapping_mul(0x2545_F491_4F6C_DD1D).to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Compresses `data` into a regular pseudo-file, bypassing any cache.
pub fn pseudo_file(data: &[u8]) -> Arc<PseudoFile> {
    let source = TracedFile::regular(Bytes::copy_from_slice(data));
    Arc::new(PseudoFile::compress(source, data).expect("in-memory compression can't fail"))
}
