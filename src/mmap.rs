//! # Fixed-Address File Mapping
//!
//! This module turns a backing file into a page-aligned, read-write memory
//! mapping placed at a fixed, process-wide virtual address, and reverses that
//! mapping cleanly.
//!
//! ## Why a Fixed Address
//!
//! The store exists so that raw pointers recorded *inside* the mapped region
//! stay valid across process restarts. That only works if the mapping
//! reappears at the same virtual address every time the file is reopened, so
//! the mapping target is a well-known constant rather than an address chosen
//! by the kernel. The constant is a singleton reservation: only one store may
//! be mapped at a time in a given process.
//!
//! ## Placement Guard
//!
//! Before mapping, the target address is checked against the current program
//! break (`sbrk(0)`). A target below the break would let future heap growth
//! collide with the mapping, so such opens fail with `AddressUnavailable`
//! instead of producing a mapping that is only accidentally safe.
//!
//! ## Platform Behavior
//!
//! - Linux: `MAP_FIXED_NOREPLACE` makes the kernel fail the map rather than
//!   clobber an existing mapping at the target.
//! - Other Unix: plain `MAP_FIXED` plus a post-map address verification.
//!
//! Writes go through `MAP_SHARED`, so they are visible to and persisted by
//! the backing file; `flush` issues a blocking `msync(MS_SYNC)`.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::ptr::NonNull;
use std::slice;

use crate::error::StoreError;

/// Process-wide virtual address reserved for the store mapping. Rounded down
/// to a page boundary before use.
pub(crate) const FIXED_MAP_ADDR: usize = 0x6000_0000_0003;

const ZERO_CHUNK: usize = 4096;

/// OS page granularity.
pub fn page_size() -> usize {
    // SAFETY: sysconf is a pure query with no pointer arguments.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as usize
    } else {
        4096
    }
}

/// Computes the page-aligned mapping target and verifies it sits above the
/// current program break.
pub(crate) fn fixed_map_target() -> Result<usize, StoreError> {
    let page = page_size();
    let target = (FIXED_MAP_ADDR / page) * page;

    // SAFETY: sbrk(0) queries the current program break without moving it.
    let brk = unsafe { libc::sbrk(0) } as usize;

    if target < brk {
        return Err(StoreError::AddressUnavailable { addr: target, brk });
    }

    Ok(target)
}

/// Overwrites the first `len` bytes of the file with zeros, so no stale data
/// is visible through a fresh mapping. Runs before the file is mapped; cost
/// is proportional to file size.
pub(crate) fn zero_fill(mut file: &File, len: u64) -> io::Result<()> {
    let zeros = [0u8; ZERO_CHUNK];

    file.seek(SeekFrom::Start(0))?;

    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(ZERO_CHUNK as u64) as usize;
        file.write_all(&zeros[..n])?;
        remaining -= n as u64;
    }

    Ok(())
}

/// A fixed-address, read-write, shared mapping over an open file.
///
/// Owns both the descriptor and the mapped range. Dropping the region unmaps
/// it and closes the file; unmap failures are traced, never propagated, so
/// teardown always runs to completion.
#[derive(Debug)]
pub(crate) struct MappedRegion {
    file: File,
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the region exclusively owns its mapping; the raw base pointer is
// only dereferenced through &self/&mut self accessors.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Maps `len` bytes of `file` read-write at exactly `target`.
    ///
    /// Fails with [`StoreError::MappingFailed`] if the kernel cannot satisfy
    /// the fixed placement, e.g. when the address range is already occupied
    /// by another mapping.
    pub fn map(file: File, len: usize, target: usize) -> Result<Self, StoreError> {
        #[cfg(target_os = "linux")]
        let flags = libc::MAP_SHARED | libc::MAP_FIXED_NOREPLACE;
        #[cfg(not(target_os = "linux"))]
        let flags = libc::MAP_SHARED | libc::MAP_FIXED;

        // SAFETY: mmap is safe to call with these arguments because:
        // 1. `target` is page-aligned and was checked against the program break
        // 2. `len` does not exceed the page-aligned size of the backing file,
        //    so faulting pages in stays within the file
        // 3. On Linux, MAP_FIXED_NOREPLACE refuses to clobber existing mappings
        // 4. The mapping's lifetime is tied to MappedRegion, which unmaps once
        let addr = unsafe {
            libc::mmap(
                target as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                file.as_raw_fd(),
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(StoreError::MappingFailed {
                addr: target,
                source: io::Error::last_os_error(),
            });
        }

        let Some(base) = NonNull::new(addr.cast::<u8>()) else {
            return Err(StoreError::MappingFailed {
                addr: target,
                source: io::Error::from(io::ErrorKind::AddrNotAvailable),
            });
        };

        if base.as_ptr() as usize != target {
            // The kernel placed the mapping elsewhere. A relocated mapping
            // would break pointer stability, so undo it and fail.
            // SAFETY: addr/len describe the mapping just established above.
            unsafe {
                libc::munmap(addr, len);
            }
            return Err(StoreError::MappingFailed {
                addr: target,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }

        Ok(Self { file, base, len })
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is valid for `len` bytes for the lifetime of
        // self, and &self prevents concurrent mutation through this handle.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Blocking flush of the mapped bytes to stable storage. Does not return
    /// until the kernel acknowledges the sync.
    pub fn flush(&self) -> io::Result<()> {
        // SAFETY: base/len describe a live mapping owned by self.
        let rc = unsafe { libc::msync(self.base.as_ptr().cast(), self.len, libc::MS_SYNC) };

        if rc == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: the mapping was established by `map` and is unmapped
        // exactly once, here.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };

        if rc == -1 {
            log::warn!(
                "munmap of store mapping at {:p} failed: {}",
                self.base.as_ptr(),
                io::Error::last_os_error()
            );
        }

        // `file` drops after this body, closing the descriptor.
    }
}
