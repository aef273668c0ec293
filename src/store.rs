//! # Store Handle and Bump Allocator
//!
//! `Store` ties the pieces together: it runs the open protocol (file checks,
//! fixed-address mapping, metadata initialization or validation), carves out
//! sub-regions of the mapped space with a linear allocator, and persists its
//! bookkeeping back into the header on close.
//!
//! ## Region Layout
//!
//! ```text
//! mapping base                 usable base
//! |                            |
//! +----------------------------+----------------------------------+
//! | metadata record (24 bytes) | usable region (allocator arena)  |
//! +----------------------------+----------------------------------+
//! ```
//!
//! `capacity` is the page-aligned size of the backing file, fixed at open
//! time; `utilized` is the allocation cursor over the usable region and the
//! only state the allocator mutates.
//!
//! ## Allocation Model
//!
//! The allocator is append-only for the lifetime of one open handle: a
//! monotonically increasing cursor over a contiguous arena, O(1) per call,
//! no per-allocation metadata, no deallocation, no alignment padding beyond
//! byte addressing. Freed space is never reclaimed; callers wanting reuse
//! must truncate and rebuild. This keeps allocation trivially fast and
//! leaves no free-list to keep crash-consistent.
//!
//! ## Concurrency
//!
//! Single-threaded and synchronous. Exactly one handle owns a backing file
//! at a time; the fixed mapping address is a process-wide singleton, so at
//! most one store can be open per process. The only blocking operations are
//! the one-time open-time zero-fill and the close-time `msync`.

use std::fs::OpenOptions;
use std::path::Path;
use std::ptr::NonNull;

use crate::error::StoreError;
use crate::meta::{StoreMeta, META_SIZE};
use crate::mmap::{fixed_map_target, page_size, zero_fill, MappedRegion};

/// One backing file together with its fixed-address mapping and bookkeeping.
#[derive(Debug)]
pub struct Store {
    region: MappedRegion,
    utilized: usize,
    capacity: usize,
}

impl Store {
    /// Opens a store over the regular file at `path`.
    ///
    /// With `truncate` the file content is zero-filled and a fresh metadata
    /// record is written; without it the existing record is validated and the
    /// previous allocation cursor restored. Capacity is the file size rounded
    /// down to a whole number of pages and stays fixed for the lifetime of
    /// the handle.
    ///
    /// On any failure the descriptor and any provisional mapping are released
    /// before the error is returned; no partial handle escapes.
    pub fn open<P: AsRef<Path>>(path: P, truncate: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let metadata = file.metadata().map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        if !metadata.file_type().is_file() {
            return Err(StoreError::NotRegularFile {
                path: path.to_path_buf(),
            });
        }

        let page = page_size();
        let capacity = (metadata.len() as usize / page) * page;

        if capacity == 0 {
            return Err(StoreError::EmptyStore {
                path: path.to_path_buf(),
            });
        }

        let target = fixed_map_target()?;

        if truncate {
            zero_fill(&file, metadata.len()).map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let mut region = MappedRegion::map(file, capacity, target)?;

        let utilized = if truncate {
            region.as_mut_slice()[..META_SIZE].copy_from_slice(&StoreMeta::new().to_bytes());
            0
        } else {
            let mut raw = [0u8; META_SIZE];
            raw.copy_from_slice(&region.as_slice()[..META_SIZE]);
            StoreMeta::from_bytes(raw).validate()? as usize
        };

        Ok(Self {
            region,
            utilized,
            capacity,
        })
    }

    /// Page-aligned size of the backing file, fixed at open time.
    ///
    /// Counts the full mapped span, metadata record included, matching the
    /// on-disk accounting. Since the usable region starts `META_SIZE` bytes
    /// past the mapping base, the final `META_SIZE` bytes of nominal
    /// capacity lie beyond the end of the mapping: allocation is pure
    /// bookkeeping there, but writes through pointers handed out near
    /// exhaustion must stay within the mapping.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes allocated so far from the usable region.
    pub fn utilized(&self) -> usize {
        self.utilized
    }

    /// Base address of the usable region, just past the metadata record.
    ///
    /// This address is reproducible across restarts, which is the point:
    /// pointers into the region recorded inside the region itself stay valid
    /// after close and reopen.
    pub fn base(&self) -> NonNull<u8> {
        // SAFETY: capacity is at least one page, so the metadata record and
        // the byte past it are within the mapping.
        unsafe { self.region.base().add(META_SIZE) }
    }

    /// Bump-allocates `n` bytes from the usable region.
    ///
    /// Returns the address `usable_base + utilized` and advances the cursor.
    /// O(1), never scans or compacts, no per-allocation metadata; the caller
    /// is responsible for remembering sizes. Fails with
    /// [`StoreError::Exhausted`] when the arena cannot fit `n` more bytes,
    /// leaving `utilized` untouched.
    pub fn alloc(&mut self, n: usize) -> Result<NonNull<u8>, StoreError> {
        match self.utilized.checked_add(n) {
            Some(end) if end <= self.capacity => {
                // SAFETY: the cursor stays within the arena, so the offset is
                // within the mapping established at open.
                let ptr = unsafe { self.base().add(self.utilized) };
                self.utilized = end;
                Ok(ptr)
            }
            // Saturating: a checksum-valid header can carry a cursor larger
            // than the current capacity (e.g. the backing file shrank between
            // sessions); such a handle reports zero remaining, it never
            // panics.
            _ => Err(StoreError::Exhausted {
                requested: n,
                remaining: self.capacity.saturating_sub(self.utilized),
            }),
        }
    }

    /// Copies `s` plus a NUL terminator into a fresh allocation of
    /// `s.len() + 1` bytes.
    pub fn strdup(&mut self, s: &str) -> Result<NonNull<u8>, StoreError> {
        let bytes = s.as_bytes();
        let dst = self.alloc(bytes.len() + 1)?;

        // SAFETY: alloc returned len + 1 writable bytes inside the mapping,
        // and `bytes` cannot overlap a region we only just handed out.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len());
            dst.as_ptr().add(bytes.len()).write(0);
        }

        Ok(dst)
    }

    /// Closes the store: writes the allocation cursor back into the metadata
    /// record, flushes the mapping synchronously to the backing file, then
    /// unmaps and closes the descriptor.
    ///
    /// Flush and unmap failures are traced but never abort teardown;
    /// reclaiming the mapping and descriptor takes priority over strict
    /// error propagation at shutdown. Dropping the handle performs the same
    /// teardown, so `close` exists as the explicit, documented form.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let mut raw = [0u8; META_SIZE];
        raw.copy_from_slice(&self.region.as_slice()[..META_SIZE]);

        let mut meta = StoreMeta::from_bytes(raw);
        meta.update(self.utilized as u64);
        self.region.as_mut_slice()[..META_SIZE].copy_from_slice(&meta.to_bytes());

        if let Err(err) = self.region.flush() {
            log::warn!("synchronous flush of store mapping failed: {err}");
        }

        // The region drops after this body: munmap, then fd close.
    }
}
