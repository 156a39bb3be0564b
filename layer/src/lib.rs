//! Compressed, path-addressed file layers shared across function bundles.
//!
//! A [PseudoLayer] maps output-relative paths to [PseudoFile]s. Every
//! pseudo-file is produced once per build by the [LayerBuilder] (through the
//! build-scoped [LayerCache]) and shared by reference between all layers that
//! include it.

mod builder;
mod cache;
mod errors;
mod file;
mod layer;
mod pseudo;
mod trace;

pub mod fixtures;
pub mod fs;

pub use builder::LayerBuilder;
pub use cache::LayerCache;
pub use errors::Error;
pub use file::{FileContent, TracedFile, S_IFLNK, S_IFMT, S_IFREG};
pub use layer::PseudoLayer;
pub use pseudo::PseudoFile;
pub use trace::{Reason, ReasonGraph, ReasonKind, Trace};

/// Default bound for concurrent stat/readlink/read calls.
pub const DEFAULT_IO_CONCURRENCY: usize = 25;
