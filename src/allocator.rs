//! Allocator surface: hands out slices of one backing region.

use std::ops::DerefMut;
use std::sync::Arc;

use crate::errors::{DiskIoError, Result};
use crate::options::RegionOptions;
use crate::region::{BackingRegion, RegionViewMut};
use crate::slice::RegionSlice;
use crate::utils::ensure_in_bounds;

/// Per-buffer hints passed by the device framework. Disk regions ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferOptions {
    /// Buffer should bypass device caches.
    pub uncached: bool,
    /// Buffer must be accessible from the CPU.
    pub cpu_access: bool,
    /// Buffer lives in host memory.
    pub host: bool,
}

/// Contract a device allocator exposes to the framework above it.
pub trait Allocator {
    /// Handle to one allocated buffer.
    type Buffer;

    /// Writable zero-copy view of a buffer's bytes.
    type View<'a>: DerefMut<Target = [u8]>
    where
        Self: 'a;

    /// Allocate a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn alloc(&self, size: u64, options: &BufferOptions) -> Result<Self::Buffer>;

    /// Free a buffer returned by [`alloc`](Self::alloc).
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn free(&self, buf: Self::Buffer, options: &BufferOptions) -> Result<()>;

    /// Expose a buffer's bytes without copying.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn as_buffer<'a>(&'a self, buf: &'a Self::Buffer) -> Result<Self::View<'a>>;

    /// Copy host bytes into a buffer.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn copyin(&self, dest: &Self::Buffer, src: &[u8]) -> Result<()>;

    /// Copy a buffer's bytes out to host memory.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn copyout(&self, dest: &mut [u8], src: &Self::Buffer) -> Result<()>;

    /// Derive a buffer at an absolute `offset` sharing `buf`'s storage.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn offset(&self, buf: &Self::Buffer, size: u64, offset: u64) -> Result<Self::Buffer>;
}

/// Allocator over a single [`BackingRegion`].
///
/// Every [`allocate`](Self::allocate) registers a user of the region (opening
/// it on the first call) and must be matched by one [`free`](Self::free).
///
/// # Examples
///
/// ```no_run
/// use disk_region::{BufferOptions, SliceAllocator};
///
/// let alloc = SliceAllocator::open("disk:/tmp/cache.bin")?;
/// let opts = BufferOptions::default();
/// let buf = alloc.allocate(1024, &opts)?;
/// alloc.write_in(&buf, &[0xAB; 1024])?;
///
/// let mut out = vec![0u8; 1024];
/// alloc.read_out(&mut out, &buf)?;
/// assert!(out.iter().all(|&b| b == 0xAB));
/// alloc.free(buf, &opts)?;
/// # Ok::<(), disk_region::DiskIoError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SliceAllocator {
    region: Arc<BackingRegion>,
}

impl SliceAllocator {
    /// Allocator over an existing region.
    #[must_use]
    pub fn new(region: Arc<BackingRegion>) -> Self {
        Self { region }
    }

    /// Allocator over a fresh, closed region named by a `disk:` identifier.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::InvalidDevice` for malformed identifiers.
    pub fn open(device: &str) -> Result<Self> {
        Self::with_options(device, RegionOptions::default())
    }

    /// Like [`open`](Self::open) with explicit region options.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::InvalidDevice` for malformed identifiers.
    pub fn with_options(device: &str, options: RegionOptions) -> Result<Self> {
        Ok(Self::new(Arc::new(BackingRegion::with_options(device, options)?)))
    }

    /// Region this allocator slices.
    #[must_use]
    pub fn region(&self) -> &Arc<BackingRegion> {
        &self.region
    }

    /// Allocate `[0, size)` of the region, opening it at `size` bytes if closed.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`BackingRegion::ensure_open`].
    pub fn allocate(&self, size: u64, _options: &BufferOptions) -> Result<RegionSlice> {
        self.region.ensure_open(size)?;
        Ok(RegionSlice::new(Arc::clone(&self.region), size, 0))
    }

    /// Give back one allocation; the last one closes the region.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`BackingRegion::release`].
    pub fn free(&self, slice: RegionSlice, _options: &BufferOptions) -> Result<()> {
        drop(slice);
        self.region.release()
    }

    /// Writable zero-copy view over a slice.
    ///
    /// The view does not block the allocator: allocate, free, and copies into
    /// other slices proceed while it is held. Copies or views overlapping its
    /// range fail with `DiskIoError::Busy` until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` if the region is closed, or
    /// `DiskIoError::Busy` if the slice overlaps another live view.
    pub fn export_view(&self, slice: &RegionSlice) -> Result<RegionViewMut> {
        slice.view_mut()
    }

    /// Copy `src` into `dest`; lengths must match exactly.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::LengthMismatch`, `DiskIoError::NotOpen`, or
    /// `DiskIoError::Busy` if `dest` overlaps a live view.
    pub fn write_in(&self, dest: &RegionSlice, src: &[u8]) -> Result<()> {
        check_len(dest, src.len())?;
        dest.region().write_at(dest.offset(), src)
    }

    /// Copy `src` out into `dest`; lengths must match exactly.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::LengthMismatch`, `DiskIoError::NotOpen`, or
    /// `DiskIoError::Io` when reading through the file descriptor fails.
    pub fn read_out(&self, dest: &mut [u8], src: &RegionSlice) -> Result<()> {
        check_len(src, dest.len())?;
        src.region().read_at(src.offset(), dest)
    }

    /// A new slice of `size` bytes at absolute `offset` in `base`'s region.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` if the region is closed, or
    /// `DiskIoError::OutOfBounds` if the slice would end past the capacity.
    pub fn derive(&self, base: &RegionSlice, size: u64, offset: u64) -> Result<RegionSlice> {
        let region = base.region();
        let capacity = region.capacity().ok_or(DiskIoError::NotOpen)?;
        ensure_in_bounds(offset, size, capacity)?;
        Ok(RegionSlice::new(Arc::clone(region), size, offset))
    }

    /// Flush a slice's bytes to disk. No-op for shared memory.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` or `DiskIoError::Io`.
    pub fn flush(&self, slice: &RegionSlice) -> Result<()> {
        slice.region().flush_range(slice.offset(), slice.size())
    }
}

fn check_len(slice: &RegionSlice, actual: usize) -> Result<()> {
    let actual = actual as u64;
    if actual != slice.size() {
        return Err(DiskIoError::LengthMismatch {
            expected: slice.size(),
            actual,
        });
    }
    Ok(())
}

impl Allocator for SliceAllocator {
    type Buffer = RegionSlice;
    type View<'a> = RegionViewMut;

    fn alloc(&self, size: u64, options: &BufferOptions) -> Result<RegionSlice> {
        self.allocate(size, options)
    }

    fn free(&self, buf: RegionSlice, options: &BufferOptions) -> Result<()> {
        SliceAllocator::free(self, buf, options)
    }

    fn as_buffer<'a>(&'a self, buf: &'a RegionSlice) -> Result<RegionViewMut> {
        self.export_view(buf)
    }

    fn copyin(&self, dest: &RegionSlice, src: &[u8]) -> Result<()> {
        self.write_in(dest, src)
    }

    fn copyout(&self, dest: &mut [u8], src: &RegionSlice) -> Result<()> {
        self.read_out(dest, src)
    }

    fn offset(&self, buf: &RegionSlice, size: u64, offset: u64) -> Result<RegionSlice> {
        self.derive(buf, size, offset)
    }
}
