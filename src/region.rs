//! Reference-counted backing region: one file or shared-memory object, mapped
//! on first use and released when the last user leaves.
//!
//! Two layers of synchronization are kept apart. The lifecycle lock guards
//! the refcount, capacity and current mapping and is only held for the
//! duration of a single call. Byte access is arbitrated per range: every view
//! and every copy registers the range it touches with the mapping, and a range
//! that overlaps an incompatible live view is refused with
//! [`DiskIoError::Busy`] rather than waited on.

use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace, warn};
use memmap2::{MmapOptions, MmapRaw};
use parking_lot::{Mutex, RwLock};

use crate::device::ResourceName;
use crate::errors::{DiskIoError, Result};
use crate::options::RegionOptions;
use crate::platform::{advise_huge_pages, PlatformCaps};
#[cfg(unix)]
use crate::shm::SharedMemory;
use crate::utils::{ensure_in_bounds, slice_range};

#[derive(Default)]
struct RegionState {
    capacity: Option<u64>,
    refcount: u64,
    mapping: Option<Arc<Mapping>>,
}

/// One open session's mapping. Unmapped and closed when the last `Arc` to it
/// goes away: the region's own reference on close, or the last live view.
struct Mapping {
    map: MmapRaw,
    backing: Backing,
    caps: PlatformCaps,
    borrows: Mutex<Borrows>,
}

enum Backing {
    File(File),
    #[cfg(unix)]
    Shm(SharedMemory),
}

#[derive(Default)]
struct Borrows {
    next_id: u64,
    active: Vec<Borrow>,
}

struct Borrow {
    id: u64,
    start: usize,
    end: usize,
    exclusive: bool,
}

impl Mapping {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    /// Register `[start, end)`; exclusive ranges may not overlap anything live,
    /// shared ranges may not overlap a live exclusive one.
    fn borrow(&self, start: usize, end: usize, exclusive: bool) -> Result<u64> {
        let mut borrows = self.borrows.lock();
        let id = borrows.next_id;
        borrows.next_id += 1;
        if start == end {
            return Ok(id);
        }
        let conflict = borrows
            .active
            .iter()
            .any(|b| b.start < end && start < b.end && (exclusive || b.exclusive));
        if conflict {
            return Err(DiskIoError::Busy {
                offset: start as u64,
                len: (end - start) as u64,
            });
        }
        borrows.active.push(Borrow {
            id,
            start,
            end,
            exclusive,
        });
        Ok(id)
    }

    fn unborrow(&self, id: u64) {
        let mut borrows = self.borrows.lock();
        if let Some(pos) = borrows.active.iter().position(|b| b.id == id) {
            borrows.active.swap_remove(pos);
        }
    }

    /// Remove the shared-memory name. The memory itself goes with the last mapping.
    fn unlink(&self) -> io::Result<()> {
        match &self.backing {
            Backing::File(_) => Ok(()),
            #[cfg(unix)]
            Backing::Shm(shm) => shm.unlink(),
        }
    }
}

/// A registered byte range of a mapping; keeps the mapping alive.
struct RangeBorrow {
    mapping: Arc<Mapping>,
    id: u64,
    start: usize,
    end: usize,
}

impl RangeBorrow {
    fn new(mapping: Arc<Mapping>, offset: u64, size: u64, exclusive: bool) -> Result<Self> {
        let (start, end) = slice_range(offset, size, mapping.len())?;
        let id = mapping.borrow(start, end, exclusive)?;
        Ok(Self {
            mapping,
            id,
            start,
            end,
        })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the range lies inside the live mapping held by `self.mapping`,
        // and no exclusive borrow overlaps it while this one is registered.
        unsafe {
            std::slice::from_raw_parts(self.mapping.map.as_ptr().add(self.start), self.end - self.start)
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: the range lies inside the live mapping held by `self.mapping`,
        // and it was registered exclusively, so no other borrow overlaps it.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.mapping.map.as_mut_ptr().add(self.start),
                self.end - self.start,
            )
        }
    }
}

impl Drop for RangeBorrow {
    fn drop(&mut self) {
        self.mapping.unborrow(self.id);
    }
}

/// Shared, zero-copy view of mapped bytes.
///
/// The view pins the mapping it was taken from: the bytes stay readable even
/// if the region closes meanwhile. Overlapping shared views may coexist.
pub struct RegionView {
    range: RangeBorrow,
}

impl Deref for RegionView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.range.bytes()
    }
}

impl std::fmt::Debug for RegionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionView")
            .field("start", &self.range.start)
            .field("end", &self.range.end)
            .finish()
    }
}

/// Exclusive, zero-copy view of mapped bytes.
///
/// Pins the mapping like [`RegionView`]. While it lives, any other view or copy
/// overlapping its range fails with `DiskIoError::Busy`; disjoint ranges and
/// lifecycle operations are unaffected.
pub struct RegionViewMut {
    range: RangeBorrow,
}

impl Deref for RegionViewMut {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.range.bytes()
    }
}

impl DerefMut for RegionViewMut {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.range.bytes_mut()
    }
}

impl std::fmt::Debug for RegionViewMut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionViewMut")
            .field("start", &self.range.start)
            .field("end", &self.range.end)
            .finish()
    }
}

/// One lazily-opened mapped region shared by every slice allocated from it.
///
/// The region is closed while its refcount is zero. The first
/// [`ensure_open`](Self::ensure_open) maps it and pins its capacity; the
/// matching last [`release`](Self::release) drops the region's hold on the
/// mapping and forgets the capacity so the next session may choose another
/// size.
///
/// # Examples
///
/// ```no_run
/// use disk_region::BackingRegion;
///
/// let region = BackingRegion::new("disk:/tmp/weights.bin")?;
/// region.ensure_open(4096)?;
/// region.view_mut(0, 4)?.copy_from_slice(b"abcd");
/// assert_eq!(&*region.view(0, 4)?, b"abcd");
/// region.release()?;
/// assert!(!region.is_open());
/// # Ok::<(), disk_region::DiskIoError>(())
/// ```
pub struct BackingRegion {
    name: ResourceName,
    options: RegionOptions,
    state: RwLock<RegionState>,
}

impl std::fmt::Debug for BackingRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("BackingRegion")
            .field("name", &self.name)
            .field("capacity", &state.capacity)
            .field("refcount", &state.refcount)
            .finish()
    }
}

impl BackingRegion {
    /// Create a closed region for a `disk:` device identifier with default options.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::InvalidDevice` for malformed identifiers.
    pub fn new(device: &str) -> Result<Self> {
        Self::with_options(device, RegionOptions::default())
    }

    /// Create a closed region for a `disk:` device identifier.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::InvalidDevice` for malformed identifiers.
    pub fn with_options(device: &str, options: RegionOptions) -> Result<Self> {
        Ok(Self::from_name(ResourceName::parse(device)?, options))
    }

    /// Create a closed region for an already-resolved resource.
    #[must_use]
    pub fn from_name(name: ResourceName, options: RegionOptions) -> Self {
        Self {
            name,
            options,
            state: RwLock::new(RegionState::default()),
        }
    }

    /// Register one more user, opening the region at `requested` bytes if closed.
    ///
    /// On failure the refcount and capacity are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::CapacityExceeded` if the region is open with a
    /// smaller capacity, `DiskIoError::ZeroSize` when opening at zero bytes,
    /// or `DiskIoError::Io` if the file or shared-memory object cannot be
    /// created or mapped.
    pub fn ensure_open(&self, requested: u64) -> Result<()> {
        let mut state = self.state.write();
        if let Some(capacity) = state.capacity {
            if requested > capacity {
                return Err(DiskIoError::CapacityExceeded { requested, capacity });
            }
            state.refcount += 1;
            return Ok(());
        }
        if requested == 0 {
            return Err(DiskIoError::ZeroSize);
        }

        let mapping = self.acquire(requested)?;
        debug!(
            "opened {} with capacity {} (direct_io={}, huge_page_hint={}, readback_via_file={})",
            self.name,
            requested,
            mapping.caps.direct_io,
            mapping.caps.huge_page_hint,
            mapping.caps.readback_via_file
        );
        state.mapping = Some(Arc::new(mapping));
        state.capacity = Some(requested);
        state.refcount = 1;
        Ok(())
    }

    /// Drop one user; the last one closes the region.
    ///
    /// Closing unlinks a shared-memory object immediately. The mapping itself
    /// is unmapped once no view taken from it is alive.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::InvalidState` if the refcount is already zero.
    /// Returns `DiskIoError::Io` if unlinking shared memory fails; the region
    /// is closed regardless.
    pub fn release(&self) -> Result<()> {
        let mapping = {
            let mut state = self.state.write();
            if state.refcount == 0 {
                return Err(DiskIoError::InvalidState("release without a matching open"));
            }
            state.refcount -= 1;
            if state.refcount > 0 {
                return Ok(());
            }
            state.capacity = None;
            state.mapping.take()
        };
        if let Some(mapping) = mapping {
            debug!("closing {}", self.name);
            mapping.unlink()?;
        }
        Ok(())
    }

    /// Shared view of `[offset, offset + size)`.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` if the region is closed,
    /// `DiskIoError::OutOfBounds` if the range exceeds the mapping, or
    /// `DiskIoError::Busy` if it overlaps a live exclusive view.
    pub fn view(&self, offset: u64, size: u64) -> Result<RegionView> {
        let range = RangeBorrow::new(self.mapping()?, offset, size, false)?;
        Ok(RegionView { range })
    }

    /// Exclusive view of `[offset, offset + size)`.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` if the region is closed,
    /// `DiskIoError::OutOfBounds` if the range exceeds the mapping, or
    /// `DiskIoError::Busy` if it overlaps any live view.
    pub fn view_mut(&self, offset: u64, size: u64) -> Result<RegionViewMut> {
        let range = RangeBorrow::new(self.mapping()?, offset, size, true)?;
        Ok(RegionViewMut { range })
    }

    /// Copy `dest.len()` bytes starting at `offset` into `dest`.
    ///
    /// File-backed regions whose caps select file readback use a positioned
    /// read on the region's descriptor rather than the mapping.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen`, `DiskIoError::OutOfBounds`,
    /// `DiskIoError::Busy`, or `DiskIoError::Io` from the file readback path.
    pub fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let mapping = self.mapping()?;
        let len = dest.len() as u64;
        ensure_in_bounds(offset, len, mapping.len())?;
        match &mapping.backing {
            Backing::File(file) if mapping.caps.readback_via_file => {
                trace!("reading {len} bytes at {offset} from {} through its descriptor", self.name);
                read_exact_at(file, dest, offset)?;
            }
            _ => {
                let range = RangeBorrow::new(Arc::clone(&mapping), offset, len, false)?;
                dest.copy_from_slice(range.bytes());
            }
        }
        Ok(())
    }

    /// Copy `src` into the mapping starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen`, `DiskIoError::OutOfBounds`, or
    /// `DiskIoError::Busy` if the range overlaps a live view.
    pub fn write_at(&self, offset: u64, src: &[u8]) -> Result<()> {
        self.view_mut(offset, src.len() as u64)?.copy_from_slice(src);
        Ok(())
    }

    /// Flush the whole mapping to disk. No-op for shared memory.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen` or `DiskIoError::Io` if msync fails.
    pub fn flush(&self) -> Result<()> {
        let mapping = self.mapping()?;
        let total = mapping.len();
        self.flush_mapping(&mapping, 0, total)
    }

    /// Flush `[offset, offset + len)` to disk. No-op for shared memory.
    ///
    /// # Errors
    ///
    /// Returns `DiskIoError::NotOpen`, `DiskIoError::OutOfBounds`, or
    /// `DiskIoError::Io` if msync fails.
    pub fn flush_range(&self, offset: u64, len: u64) -> Result<()> {
        let mapping = self.mapping()?;
        self.flush_mapping(&mapping, offset, len)
    }

    fn flush_mapping(&self, mapping: &Mapping, offset: u64, len: u64) -> Result<()> {
        let (start, end) = slice_range(offset, len, mapping.len())?;
        match mapping.backing {
            Backing::File(_) if end > start => {
                trace!("flushing {} bytes at {} of {}", end - start, start, self.name);
                mapping.map.flush_range(start, end - start)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Resource this region maps.
    #[must_use]
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Options the region opens with.
    #[must_use]
    pub fn options(&self) -> &RegionOptions {
        &self.options
    }

    /// Capacity pinned by the current open session, if any.
    #[must_use]
    pub fn capacity(&self) -> Option<u64> {
        self.state.read().capacity
    }

    /// Number of outstanding users.
    #[must_use]
    pub fn refcount(&self) -> u64 {
        self.state.read().refcount
    }

    /// Whether the region holds a mapping.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.read().mapping.is_some()
    }

    /// Capabilities resolved for the current open session.
    #[must_use]
    pub fn caps(&self) -> Option<PlatformCaps> {
        self.state.read().mapping.as_ref().map(|m| m.caps)
    }

    fn mapping(&self) -> Result<Arc<Mapping>> {
        self.state.read().mapping.clone().ok_or(DiskIoError::NotOpen)
    }

    fn acquire(&self, size: u64) -> Result<Mapping> {
        let caps = PlatformCaps::detect(&self.options, &self.name);
        let len = usize::try_from(size).map_err(|_| DiskIoError::OutOfBounds {
            offset: 0,
            len: size,
            total: usize::MAX as u64,
        })?;
        let (backing, map) = match &self.name {
            ResourceName::Shm(name) => map_shm(name, size, len)?,
            ResourceName::File(path) => {
                let file = open_file(path, caps.open_flags())?;
                if file.metadata()?.len() < size {
                    file.set_len(size)?;
                }
                let map = MmapOptions::new().len(len).map_raw(&file)?;
                (Backing::File(file), map)
            }
        };
        if caps.huge_page_hint {
            if let Err(e) = advise_huge_pages(&map) {
                debug!("huge page hint rejected for {}: {e}", self.name);
            }
        }
        Ok(Mapping {
            map,
            backing,
            caps,
            borrows: Mutex::new(Borrows::default()),
        })
    }
}

impl Drop for BackingRegion {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(mapping) = state.mapping.take() {
            debug!("closing {} with {} outstanding users", self.name, state.refcount);
            if let Err(e) = mapping.unlink() {
                warn!("failed to release {}: {e}", self.name);
            }
        }
    }
}

/// Open read-write, creating if absent. Non-zero `extra_flags` (e.g. `O_DIRECT`)
/// are tried first; if the OS rejects them the file is opened without them.
#[cfg_attr(not(unix), allow(unused_variables))]
fn open_file(path: &Path, extra_flags: libc::c_int) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if extra_flags != 0 {
            match opts.clone().custom_flags(extra_flags).open(path) {
                Ok(file) => return Ok(file),
                Err(e) => warn!(
                    "open of {} with flags {extra_flags:#x} failed ({e}); falling back to buffered mode",
                    path.display()
                ),
            }
        }
    }
    opts.open(path)
}

/// Positioned read that leaves the descriptor's file offset untouched.
#[cfg(unix)]
fn read_exact_at(file: &File, dest: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(dest, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut dest: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !dest.is_empty() {
        match file.seek_read(dest, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                let rest = dest;
                dest = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn read_exact_at(_file: &File, _dest: &mut [u8], _offset: u64) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positioned reads are not available on this platform",
    ))
}

#[cfg(unix)]
fn map_shm(name: &str, size: u64, len: usize) -> Result<(Backing, MmapRaw)> {
    let shm = SharedMemory::create(name, size)?;
    match MmapOptions::new().len(len).map_raw(shm.file()) {
        Ok(map) => Ok((Backing::Shm(shm), map)),
        Err(e) => {
            let _ = shm.unlink();
            Err(e.into())
        }
    }
}

#[cfg(not(unix))]
fn map_shm(_name: &str, _size: u64, _len: usize) -> Result<(Backing, MmapRaw)> {
    Err(DiskIoError::Unsupported("shared-memory regions require a Unix platform"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn file_region(path: &Path) -> BackingRegion {
        BackingRegion::new(&format!("disk:{}", path.display())).expect("device")
    }

    #[test]
    fn open_pins_capacity_and_counts_users() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("count.bin"));
        assert!(!region.is_open());
        assert_eq!(region.capacity(), None);

        region.ensure_open(4096).expect("first open");
        region.ensure_open(1024).expect("smaller open");
        region.ensure_open(4096).expect("equal open");
        assert_eq!(region.capacity(), Some(4096));
        assert_eq!(region.refcount(), 3);

        let err = region.ensure_open(4097).expect_err("grow must fail");
        assert!(matches!(
            err,
            DiskIoError::CapacityExceeded { requested: 4097, capacity: 4096 }
        ));
        assert_eq!(region.refcount(), 3);

        for _ in 0..3 {
            assert!(region.is_open());
            region.release().expect("release");
        }
        assert!(!region.is_open());
        assert_eq!(region.capacity(), None);
        assert_eq!(region.refcount(), 0);
    }

    #[test]
    fn unbalanced_release_is_invalid_state() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("unbalanced.bin"));
        assert!(matches!(region.release(), Err(DiskIoError::InvalidState(_))));

        region.ensure_open(64).expect("open");
        region.release().expect("release");
        assert!(matches!(region.release(), Err(DiskIoError::InvalidState(_))));
    }

    #[test]
    fn reopen_after_close_may_choose_larger_capacity() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("grow.bin");
        let region = file_region(&path);

        region.ensure_open(1024).expect("open small");
        region.release().expect("close");
        region.ensure_open(8192).expect("open larger");
        assert_eq!(region.capacity(), Some(8192));
        assert_eq!(fs::metadata(&path).expect("meta").len(), 8192);
        region.release().expect("close");
    }

    #[test]
    fn file_is_extended_but_never_truncated() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("existing.bin");
        fs::write(&path, vec![7u8; 8192]).expect("prefill");

        let region = file_region(&path);
        region.ensure_open(1024).expect("open");
        assert_eq!(fs::metadata(&path).expect("meta").len(), 8192);
        assert_eq!(&*region.view(0, 4).expect("view"), &[7, 7, 7, 7]);
        // the mapping only covers the requested capacity
        assert!(matches!(
            region.view(1020, 8),
            Err(DiskIoError::OutOfBounds { total: 1024, .. })
        ));
        region.release().expect("close");
    }

    #[test]
    fn failed_open_leaves_region_closed() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("zero.bin"));
        assert!(matches!(region.ensure_open(0), Err(DiskIoError::ZeroSize)));
        assert_eq!(region.refcount(), 0);

        let missing = file_region(&dir.path().join("no/such/dir/file.bin"));
        assert!(matches!(missing.ensure_open(64), Err(DiskIoError::Io(_))));
        assert_eq!(missing.refcount(), 0);
        assert_eq!(missing.capacity(), None);
        assert!(!missing.is_open());
    }

    #[test]
    fn views_fail_when_closed() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("closed.bin"));
        assert!(matches!(region.view(0, 1), Err(DiskIoError::NotOpen)));

        region.ensure_open(16).expect("open");
        region.write_at(0, &[1, 2, 3]).expect("write");
        region.release().expect("close");

        assert!(matches!(region.view(0, 1), Err(DiskIoError::NotOpen)));
        assert!(matches!(region.view_mut(0, 1), Err(DiskIoError::NotOpen)));
        let mut buf = [0u8; 3];
        assert!(matches!(region.read_at(0, &mut buf), Err(DiskIoError::NotOpen)));
        assert!(matches!(region.flush(), Err(DiskIoError::NotOpen)));
    }

    #[test]
    fn exclusive_views_refuse_overlap_only() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("overlap.bin"));
        region.ensure_open(128).expect("open");

        let mut head = region.view_mut(0, 64).expect("exclusive head");
        head[..3].copy_from_slice(b"abc");

        assert!(matches!(region.view(32, 8), Err(DiskIoError::Busy { offset: 32, len: 8 })));
        assert!(matches!(region.view_mut(63, 2), Err(DiskIoError::Busy { .. })));
        assert!(matches!(region.write_at(10, &[0; 4]), Err(DiskIoError::Busy { .. })));
        let mut buf = [0u8; 4];
        assert!(matches!(region.read_at(60, &mut buf), Err(DiskIoError::Busy { .. })));

        // disjoint ranges proceed, and zero-length ranges never conflict
        region.write_at(64, b"tail").expect("disjoint write");
        region.read_at(64, &mut buf).expect("disjoint read");
        assert_eq!(&buf, b"tail");
        assert!(region.view(10, 0).expect("empty view").is_empty());

        drop(head);
        assert_eq!(&*region.view(0, 3).expect("after drop"), b"abc");
        region.release().expect("close");
    }

    #[test]
    fn shared_views_coexist() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("shared.bin"));
        region.ensure_open(64).expect("open");
        region.write_at(0, &[9; 64]).expect("fill");

        let a = region.view(0, 32).expect("view a");
        let b = region.view(16, 32).expect("overlapping view b");
        assert_eq!(a[16], b[0]);
        assert!(matches!(region.view_mut(20, 1), Err(DiskIoError::Busy { .. })));
        drop((a, b));
        region.view_mut(20, 1).expect("free again")[0] = 1;
        region.release().expect("close");
    }

    #[test]
    fn view_pins_mapping_across_release() {
        let dir = tempdir().expect("tempdir");
        let region = file_region(&dir.path().join("pinned.bin"));
        region.ensure_open(16).expect("open");
        region.write_at(0, b"0123456789abcdef").expect("fill");

        let view = region.view(4, 4).expect("view");
        region.release().expect("release does not wait for the view");
        assert!(!region.is_open());
        assert!(matches!(region.view(0, 1), Err(DiskIoError::NotOpen)));
        assert_eq!(&*view, b"4567");

        region.ensure_open(16).expect("new session while old view is alive");
        assert_eq!(&*region.view(4, 4).expect("new view"), b"4567");
        drop(view);
        region.release().expect("close");
    }

    #[test]
    fn file_readback_sees_mapped_writes() {
        let dir = tempdir().expect("tempdir");
        let device = format!("disk:{}", dir.path().join("readback.bin").display());
        let region = BackingRegion::with_options(
            &device,
            RegionOptions::new().readback(crate::options::ReadbackMode::File),
        )
        .expect("device");

        region.ensure_open(4096).expect("open");
        assert_eq!(region.caps().map(|c| c.readback_via_file), Some(true));
        region.write_at(100, b"through-the-fd").expect("write");
        region.flush_range(100, 14).expect("flush");

        let mut buf = [0u8; 14];
        region.read_at(100, &mut buf).expect("read twice");
        region.read_at(100, &mut buf).expect("descriptor still open");
        assert_eq!(&buf, b"through-the-fd");
        region.release().expect("close");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn rejected_open_flags_fall_back_to_buffered_open() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("fallback.bin");
        fs::write(&path, b"plain").expect("prefill");

        // O_DIRECTORY on a regular file is always refused by the kernel
        let file = open_file(&path, libc::O_DIRECTORY).expect("buffered fallback");
        let mut buf = [0u8; 5];
        read_exact_at(&file, &mut buf, 0).expect("read");
        assert_eq!(&buf, b"plain");

        let missing = dir.path().join("no/such/dir/file.bin");
        assert!(open_file(&missing, libc::O_DIRECTORY).is_err());
        assert!(open_file(&missing, 0).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn dropping_open_shm_region_unlinks_it() {
        let name = format!("disk_region_drop_{}", std::process::id());
        let device = format!("disk:shm:{name}");
        let region = BackingRegion::new(&device).expect("device");
        region.ensure_open(4096).expect("open");
        drop(region);

        let region = BackingRegion::new(&device).expect("device");
        region.ensure_open(4096).expect("object name is free again");
        region.release().expect("close");
    }
}
