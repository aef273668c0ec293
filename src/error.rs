//! Error taxonomy for the store.
//!
//! Open-time failures are terminal for that call: no partial handle is ever
//! returned, and everything acquired up to the failing step (descriptor,
//! provisional mapping) is released before the error surfaces. `Exhausted` is
//! the only error a live handle can produce; it leaves the handle's
//! bookkeeping untouched and is recoverable by the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be opened or inspected.
    #[error("failed to open store file '{}': {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// The backing path names something other than a regular file.
    #[error("store file '{}' is not a regular file", path.display())]
    NotRegularFile { path: PathBuf },

    /// The backing file is smaller than one page, leaving no usable capacity.
    #[error("store file '{}' has no page-aligned capacity", path.display())]
    EmptyStore { path: PathBuf },

    /// The reserved mapping address lies below the current program break, so
    /// future heap growth could collide with the mapping.
    #[error("fixed mapping address {addr:#x} lies below the program break {brk:#x}")]
    AddressUnavailable { addr: usize, brk: usize },

    /// The kernel could not place the mapping exactly at the reserved address.
    #[error("failed to map store at {addr:#x}: {source}")]
    MappingFailed { addr: usize, source: io::Error },

    /// The header signature does not identify this file as a store.
    #[error("store signature mismatch: found {found:#x}, expected {expected:#x}")]
    InvalidSignature { found: u64, expected: u64 },

    /// The header checksum does not match the recomputed value.
    #[error("store metadata checksum mismatch: stored {stored:#x}, computed {computed:#x}")]
    IntegrityError { stored: u64, computed: u64 },

    /// The bump allocator ran out of arena space.
    #[error("store exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted { requested: usize, remaining: usize },
}
