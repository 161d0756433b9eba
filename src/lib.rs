//! # disk-region: reference-counted memory-mapped storage regions
//!
//! A [`BackingRegion`] maps one file (`disk:<path>`) or one POSIX shared-memory
//! object (`disk:shm:<name>`) the first time a user asks for it, pins its
//! capacity for as long as it stays open, and tears it down when the last user
//! leaves. A [`SliceAllocator`] hands out [`RegionSlice`]s, fixed-size windows
//! into the region addressed by absolute offset.
//!
//! ## Quick Start
//!
//! ```no_run
//! use disk_region::{BufferOptions, SliceAllocator};
//!
//! let alloc = SliceAllocator::open("disk:/tmp/tensor.bin")?;
//! let opts = BufferOptions::default();
//!
//! // Opens the file and maps 1 KiB of it
//! let whole = alloc.allocate(1024, &opts)?;
//! let header = alloc.derive(&whole, 16, 0)?;
//! alloc.write_in(&header, b"0123456789abcdef")?;
//!
//! // Last free unmaps and closes the file
//! alloc.free(whole, &opts)?;
//! # Ok::<(), disk_region::DiskIoError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error taxonomy for region operations
//! - [`device`]: Device identifier parsing
//! - [`options`]: Open-time configuration
//! - [`platform`]: Capability detection (direct I/O, huge pages, readback path)
//! - [`region`]: The region lifecycle and zero-copy views
//! - [`slice`]: Offset-addressed slices
//! - [`allocator`]: Allocator trait and the slice allocator
//!
//! ## Feature Flags
//!
//! - `hugepages` (default): apply `MADV_HUGEPAGE` to new mappings where supported

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]

pub mod allocator;
pub mod device;
pub mod errors;
pub mod options;
pub mod platform;
pub mod region;
#[cfg(unix)]
pub mod shm;
pub mod slice;
pub mod utils;

pub use allocator::{Allocator, BufferOptions, SliceAllocator};
pub use device::ResourceName;
pub use errors::{DiskIoError, Result};
pub use options::{ReadbackMode, RegionOptions};
pub use platform::PlatformCaps;
pub use region::{BackingRegion, RegionView, RegionViewMut};
pub use slice::RegionSlice;
