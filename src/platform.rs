//! Platform capability detection, performed once per region open.
//!
//! Everything platform-conditional about a region (direct I/O flag, huge page
//! hint, readback path) is decided here and recorded in [`PlatformCaps`], so
//! the read/write paths only consult the record.

use memmap2::MmapRaw;

use crate::device::ResourceName;
use crate::options::{ReadbackMode, RegionOptions};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        const DIRECT_IO_FLAG: Option<libc::c_int> = Some(libc::O_DIRECT);
    } else {
        const DIRECT_IO_FLAG: Option<libc::c_int> = None;
    }
}

/// Capabilities resolved for one open session of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformCaps {
    /// Open the file with `O_DIRECT` first, falling back to buffered mode.
    pub direct_io: bool,
    /// Apply `MADV_HUGEPAGE` to the mapping.
    pub huge_page_hint: bool,
    /// `copyout` reads through the file descriptor instead of the mapping.
    pub readback_via_file: bool,
}

impl PlatformCaps {
    /// Resolve capabilities for `name` under `opts` on the current platform.
    #[must_use]
    pub fn detect(opts: &RegionOptions, name: &ResourceName) -> Self {
        let file_backed = !name.is_shm();
        let readback_via_file = file_backed
            && match opts.readback_mode() {
                ReadbackMode::Auto => cfg!(target_os = "macos"),
                ReadbackMode::Mapping => false,
                ReadbackMode::File => true,
            };
        // Unaligned reads through an O_DIRECT descriptor fail, so file readback
        // always uses a buffered descriptor.
        let direct_io = file_backed
            && opts.direct_io_requested()
            && !readback_via_file
            && DIRECT_IO_FLAG.is_some();
        let huge_page_hint = opts.huge_pages_requested()
            && cfg!(feature = "hugepages")
            && cfg!(any(target_os = "linux", target_os = "android"));
        Self {
            direct_io,
            huge_page_hint,
            readback_via_file,
        }
    }

    /// Extra `open(2)` flags for the first open attempt.
    #[must_use]
    pub fn open_flags(&self) -> libc::c_int {
        match DIRECT_IO_FLAG {
            Some(flag) if self.direct_io => flag,
            _ => 0,
        }
    }
}

/// Best-effort transparent huge page hint for the whole mapping.
///
/// # Errors
///
/// Returns the OS error if `madvise` rejects the hint. Callers ignore it.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn advise_huge_pages(map: &MmapRaw) -> std::io::Result<()> {
    if map.len() == 0 {
        return Ok(());
    }
    // SAFETY: the pointer and length describe a live mapping owned by `map`.
    let result = unsafe {
        libc::madvise(
            map.as_mut_ptr().cast::<libc::c_void>(),
            map.len(),
            libc::MADV_HUGEPAGE,
        )
    };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Best-effort transparent huge page hint; no such hint exists on this platform.
///
/// # Errors
///
/// Never fails.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn advise_huge_pages(_map: &MmapRaw) -> std::io::Result<()> {
    Ok(())
}
