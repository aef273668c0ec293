//! # scmem - Persistent Storage-Class Memory
//!
//! scmem maps a regular file into the process address space at a fixed,
//! reproducible virtual address and bump-allocates byte ranges out of it.
//! Because the mapping reappears at the same address on every open, raw
//! pointers recorded *inside* the region stay valid across process restarts,
//! which makes the store a minimal building block for persistent in-memory
//! data structures (lists, trees) whose nodes reference each other by direct
//! address rather than by file offset.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scmem::Store;
//!
//! let mut store = Store::open("data.scm", true)?;
//! let greeting = store.strdup("hello")?;
//! store.close();
//!
//! // Later, in another process:
//! let store = Store::open("data.scm", false)?;
//! assert_eq!(store.utilized(), 6);
//! // `greeting` points at the same bytes again.
//! ```
//!
//! ## Architecture
//!
//! Three layers, leaves first:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Store (open/close, alloc)     │
//! ├─────────────────────────────────────┤
//! │   Fixed-Address Mapping (mmap/msync) │
//! ├─────────────────────────────────────┤
//! │   Metadata Record (zerocopy codec)   │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! Offset 0:   metadata record (24 bytes: size, signature, checksum)
//! Offset 24:  usable region, consumer-defined content
//! ```
//!
//! The layout uses native-width little-endian fields and is not portable
//! across architectures by design.
//!
//! ## Module Overview
//!
//! - [`meta`]: self-describing header record validated by an XOR checksum
//! - `mmap`: fixed-address mapping lifecycle over the backing file
//! - `store`: the handle, the open/close protocol and the bump allocator
//! - `error`: the [`StoreError`] taxonomy
//!
//! ## Deliberate Omissions
//!
//! No deallocation or free-list, no multi-step transactions, no concurrent
//! writers, no growth of the backing file. The allocator is an append log
//! over the mapped region, not a general-purpose heap.

mod error;
pub mod meta;
mod mmap;
mod store;

pub use error::StoreError;
pub use meta::{StoreMeta, META_SIZE, STORE_SIGNATURE};
pub use mmap::page_size;
pub use store::Store;
