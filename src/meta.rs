//! # Store Metadata Record
//!
//! The first [`META_SIZE`] bytes of every store file hold a fixed-size,
//! self-describing metadata record: how many bytes of the usable region are
//! allocated, a signature identifying the file format, and a checksum tying
//! the two together.
//!
//! ## Record Layout
//!
//! ```text
//! Offset 0:   size       (u64 LE)  bytes allocated from the usable region
//! Offset 8:   signature  (u64 LE)  STORE_SIGNATURE constant
//! Offset 16:  checksum   (u64 LE)  size XOR signature
//! ```
//!
//! ## Integrity Model
//!
//! The checksum is `size XOR signature`: deliberately cheap, order-insensitive
//! and pure, so validation is trivially unit-testable in isolation from the
//! mapping machinery. It is a tripwire against foreign or uninitialized
//! headers, not a cryptographic guarantee; corruption that preserves the XOR
//! relation (swapped fields, compensating bit flips) goes undetected.
//!
//! ## Zerocopy Safety
//!
//! The record derives the zerocopy traits (`FromBytes`, `IntoBytes`,
//! `Immutable`, `KnownLayout`, `Unaligned`) so it converts to and from its
//! 24-byte wire form with compile-time size verification and no unsafe code.
//! Multi-byte fields use little-endian encoding via `U64<LittleEndian>`.

use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::StoreError;

/// Size in bytes of the metadata record reserved at the front of the mapping.
pub const META_SIZE: usize = 24;

/// Constant identifying a file as a store of this format.
pub const STORE_SIGNATURE: u64 = 0xDEED_BEED;

/// Verification value tying `size` and `signature` together.
pub fn checksum(size: u64, signature: u64) -> u64 {
    size ^ signature
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct StoreMeta {
    size: U64,
    signature: U64,
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<StoreMeta>() == META_SIZE);

impl StoreMeta {
    /// Fresh record for a newly truncated store: nothing allocated yet.
    pub fn new() -> Self {
        Self {
            size: U64::new(0),
            signature: U64::new(STORE_SIGNATURE),
            checksum: U64::new(checksum(0, STORE_SIGNATURE)),
        }
    }

    pub fn from_bytes(bytes: [u8; META_SIZE]) -> Self {
        zerocopy::transmute!(bytes)
    }

    pub fn to_bytes(self) -> [u8; META_SIZE] {
        zerocopy::transmute!(self)
    }

    /// Validates the record and returns the stored allocation size.
    ///
    /// Fails with [`StoreError::InvalidSignature`] if the signature does not
    /// match [`STORE_SIGNATURE`], and with [`StoreError::IntegrityError`] if
    /// the stored checksum disagrees with the recomputed one. A corrupt or
    /// foreign header is never silently accepted.
    pub fn validate(&self) -> Result<u64, StoreError> {
        let signature = self.signature.get();

        if signature != STORE_SIGNATURE {
            return Err(StoreError::InvalidSignature {
                found: signature,
                expected: STORE_SIGNATURE,
            });
        }

        let stored = self.checksum.get();
        let computed = checksum(self.size.get(), signature);

        if stored != computed {
            return Err(StoreError::IntegrityError { stored, computed });
        }

        Ok(self.size.get())
    }

    /// Rewrites the allocation size and recomputes the checksum. Called once,
    /// at close, to persist the handle's final `utilized` count.
    pub fn update(&mut self, utilized: u64) {
        self.size = U64::new(utilized);
        self.checksum = U64::new(checksum(utilized, self.signature.get()));
    }

    pub fn size(&self) -> u64 {
        self.size.get()
    }

    pub fn signature(&self) -> u64 {
        self.signature.get()
    }

    pub fn checksum_value(&self) -> u64 {
        self.checksum.get()
    }
}

impl Default for StoreMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_record_size_is_24() {
        assert_eq!(std::mem::size_of::<StoreMeta>(), META_SIZE);
    }

    #[test]
    fn fresh_record_validates_to_zero() {
        let meta = StoreMeta::new();

        assert_eq!(meta.validate().unwrap(), 0);
        assert_eq!(meta.signature(), STORE_SIGNATURE);
    }

    #[test]
    fn checksum_is_xor_of_fields() {
        assert_eq!(checksum(0, STORE_SIGNATURE), STORE_SIGNATURE);
        assert_eq!(checksum(0xFF, 0xF0), 0x0F);
        assert_eq!(checksum(u64::MAX, u64::MAX), 0);
    }

    #[test]
    fn checksum_recompute_is_idempotent() {
        let mut meta = StoreMeta::new();
        meta.update(4096);

        let first = meta.checksum_value();
        meta.update(4096);

        assert_eq!(meta.checksum_value(), first);
    }

    #[test]
    fn update_then_validate_roundtrip() {
        for utilized in [0u64, 1, 6, 4095, 4096, 1 << 40, u64::MAX] {
            let mut meta = StoreMeta::new();
            meta.update(utilized);

            assert_eq!(meta.validate().unwrap(), utilized);
        }
    }

    #[test]
    fn byte_roundtrip_preserves_record() {
        let mut meta = StoreMeta::new();
        meta.update(777);

        let parsed = StoreMeta::from_bytes(meta.to_bytes());

        assert_eq!(parsed.size(), 777);
        assert_eq!(parsed.signature(), STORE_SIGNATURE);
        assert_eq!(parsed.validate().unwrap(), 777);
    }

    #[test]
    fn rejects_foreign_signature() {
        let mut bytes = StoreMeta::new().to_bytes();
        bytes[8..16].copy_from_slice(&0xBAAD_F00Du64.to_le_bytes());

        let err = StoreMeta::from_bytes(bytes).validate().unwrap_err();

        assert!(matches!(
            err,
            StoreError::InvalidSignature {
                found: 0xBAAD_F00D,
                expected: STORE_SIGNATURE,
            }
        ));
    }

    #[test]
    fn rejects_corrupt_checksum() {
        let mut meta = StoreMeta::new();
        meta.update(64);

        let mut bytes = meta.to_bytes();
        // Flip the size field without recomputing the checksum.
        bytes[0..8].copy_from_slice(&65u64.to_le_bytes());

        let err = StoreMeta::from_bytes(bytes).validate().unwrap_err();

        assert!(matches!(err, StoreError::IntegrityError { .. }));
    }

    #[test]
    fn rejects_zeroed_header() {
        let err = StoreMeta::from_bytes([0u8; META_SIZE]).validate().unwrap_err();

        assert!(matches!(err, StoreError::InvalidSignature { found: 0, .. }));
    }

    #[test]
    fn compensating_corruption_is_undetected() {
        // Documented limitation: corruption preserving the XOR relation
        // passes validation.
        let mut meta = StoreMeta::new();
        meta.update(100);

        let mut bytes = meta.to_bytes();
        let forged = 200u64;
        bytes[0..8].copy_from_slice(&forged.to_le_bytes());
        bytes[16..24].copy_from_slice(&(forged ^ STORE_SIGNATURE).to_le_bytes());

        assert_eq!(StoreMeta::from_bytes(bytes).validate().unwrap(), forged);
    }
}
