//! Open-time configuration for a backing region.

/// How `copyout` reads bytes back from a file-backed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadbackMode {
    /// Read through the file descriptor on macOS, from the mapping elsewhere.
    #[default]
    Auto,
    /// Always copy from the mapping.
    Mapping,
    /// Always read through the file descriptor (file-backed regions only).
    File,
}

/// Options applied when a region is first opened.
///
/// # Examples
///
/// ```
/// use disk_region::{ReadbackMode, RegionOptions};
///
/// let opts = RegionOptions::new()
///     .direct_io(false)
///     .readback(ReadbackMode::Mapping);
/// assert!(!opts.direct_io_requested());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOptions {
    direct_io: bool,
    huge_pages: bool,
    readback: ReadbackMode,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            direct_io: true,
            huge_pages: true,
            readback: ReadbackMode::Auto,
        }
    }
}

impl RegionOptions {
    /// Platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request uncached I/O (`O_DIRECT`) for file-backed regions where supported.
    #[must_use]
    pub fn direct_io(mut self, enabled: bool) -> Self {
        self.direct_io = enabled;
        self
    }

    /// Request the transparent huge page hint on the mapping.
    /// Only takes effect with the `hugepages` feature.
    #[must_use]
    pub fn huge_pages(mut self, enabled: bool) -> Self {
        self.huge_pages = enabled;
        self
    }

    /// Select the readback path used by `copyout`.
    #[must_use]
    pub fn readback(mut self, mode: ReadbackMode) -> Self {
        self.readback = mode;
        self
    }

    /// Whether direct I/O was requested.
    #[must_use]
    pub fn direct_io_requested(&self) -> bool {
        self.direct_io
    }

    /// Whether the huge page hint was requested.
    #[must_use]
    pub fn huge_pages_requested(&self) -> bool {
        self.huge_pages
    }

    /// Requested readback mode.
    #[must_use]
    pub fn readback_mode(&self) -> ReadbackMode {
        self.readback
    }
}
