//! Offset-addressed views into a backing region.

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::region::{BackingRegion, RegionView, RegionViewMut};

/// An `(offset, size)` window into a [`BackingRegion`].
///
/// A slice does not keep the mapping alive: the region's refcount does. Once
/// the allocate call that issued it has been matched by a free and the region
/// has closed, every new view through the slice fails with `NotOpen`. Views
/// taken before the close stay readable until dropped.
#[derive(Clone)]
pub struct RegionSlice {
    region: Arc<BackingRegion>,
    size: u64,
    offset: u64,
}

impl RegionSlice {
    /// Construct a slice; bounds are the caller's responsibility.
    #[must_use]
    pub fn new(region: Arc<BackingRegion>, size: u64, offset: u64) -> Self {
        Self {
            region,
            size,
            offset,
        }
    }

    /// Shared view of this slice's bytes.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` if the region is closed,
    /// `DiskIoError::OutOfBounds` if the slice exceeds the mapping, or
    /// `DiskIoError::Busy` if it overlaps a live exclusive view.
    pub fn view(&self) -> Result<RegionView> {
        self.region.view(self.offset, self.size)
    }

    /// Exclusive view of this slice's bytes.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` if the region is closed,
    /// `DiskIoError::OutOfBounds` if the slice exceeds the mapping, or
    /// `DiskIoError::Busy` if it overlaps any live view.
    pub fn view_mut(&self) -> Result<RegionViewMut> {
        self.region.view_mut(self.offset, self.size)
    }

    /// Size of the slice in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Length of the slice; alias of [`size`](Self::size).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Check if the slice is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Absolute offset of the slice in the region.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Region the slice points into.
    #[must_use]
    pub fn region(&self) -> &Arc<BackingRegion> {
        &self.region
    }
}

impl fmt::Debug for RegionSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionSlice")
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish()
    }
}
