use bytes::Bytes;
use flate2::{write::DeflateEncoder, Compression};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::TracedFile;

/// The compressed representation of one traced file.
///
/// Regular files carry their raw-deflate compressed bytes (maximum
/// compression) plus the CRC32 and length of the *uncompressed* bytes, which
/// is everything a ZIP writer needs to emit the entry without recompressing.
/// Symlinks only carry their resolved target.
#[derive(Debug)]
pub enum PseudoFile {
    Regular {
        source: TracedFile,
        compressed: Bytes,
        uncompressed_size: u64,
        crc32: u32,
    },
    Symlink {
        source: TracedFile,
        target: PathBuf,
    },
}

impl PseudoFile {
    /// Compresses `data` (the full contents of `source`).
    pub fn compress(source: TracedFile, data: &[u8]) -> std::io::Result<Self> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        Ok(PseudoFile::Regular {
            source,
            compressed: compressed.into(),
            uncompressed_size: data.len() as u64,
            crc32: crc32fast::hash(data),
        })
    }

    pub fn symlink(source: TracedFile, target: impl Into<PathBuf>) -> Self {
        PseudoFile::Symlink {
            source,
            target: target.into(),
        }
    }

    pub fn source(&self) -> &TracedFile {
        match self {
            PseudoFile::Regular { source, .. } => source,
            PseudoFile::Symlink { source, .. } => source,
        }
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, PseudoFile::Symlink { .. })
    }

    /// Compressed byte length. Symlinks don't count towards any budget.
    pub fn compressed_size(&self) -> u64 {
        match self {
            PseudoFile::Regular { compressed, .. } => compressed.len() as u64,
            PseudoFile::Symlink { .. } => 0,
        }
    }

    pub fn uncompressed_size(&self) -> u64 {
        match self {
            PseudoFile::Regular {
                uncompressed_size, ..
            } => *uncompressed_size,
            PseudoFile::Symlink { .. } => 0,
        }
    }

    pub fn compressed(&self) -> Option<&Bytes> {
        match self {
            PseudoFile::Regular { compressed, .. } => Some(compressed),
            PseudoFile::Symlink { .. } => None,
        }
    }

    pub fn crc32(&self) -> Option<u32> {
        match self {
            PseudoFile::Regular { crc32, .. } => Some(*crc32),
            PseudoFile::Symlink { .. } => None,
        }
    }

    pub fn symlink_target(&self) -> Option<&Path> {
        match self {
            PseudoFile::Regular { .. } => None,
            PseudoFile::Symlink { target, .. } => Some(target),
        }
    }
}
