//! Crate-specific error types for disk-region.

use std::io;
use thiserror::Error;

/// Result alias for disk-region operations.
pub type Result<T> = std::result::Result<T, DiskIoError>;

/// Error type covering device naming, region lifecycle, copy contracts, and I/O.
///
/// `CapacityExceeded`, `NotOpen`, `InvalidState` and `LengthMismatch` signal
/// a broken caller contract; callers that treat them as fatal may panic on them.
#[derive(Debug, Error)]
pub enum DiskIoError {
    /// Wrapper for `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The device identifier is not `disk:<path>` or `disk:shm:<name>`.
    #[error("invalid device identifier: {0}")]
    InvalidDevice(String),

    /// The region is already mapped with a smaller capacity and cannot grow.
    #[error("can't reopen region with larger size: opened with {capacity}, tried to open with {requested}")]
    CapacityExceeded {
        /// Size requested by the caller.
        requested: u64,
        /// Capacity pinned by the first open.
        capacity: u64,
    },

    /// The region has no active mapping (use after free, or use before open).
    #[error("region is not open")]
    NotOpen,

    /// A lifecycle transition was requested from the wrong state.
    #[error("invalid region state: {0}")]
    InvalidState(&'static str),

    /// Source and destination of a copy differ in length.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Size of the slice.
        expected: u64,
        /// Length of the caller's buffer.
        actual: u64,
    },

    /// Error when a requested offset/length pair is out of bounds.
    #[error("range out of bounds: offset={offset}, len={len}, total={total}")]
    OutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Total size of the mapped region.
        total: u64,
    },

    /// The range overlaps a live view it may not alias.
    #[error("range busy: offset={offset}, len={len} overlaps a live view")]
    Busy {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
    },

    /// A region cannot be opened with zero capacity.
    #[error("size must be greater than zero")]
    ZeroSize,

    /// The backing kind is not available on this platform.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),
}
