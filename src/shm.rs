//! POSIX shared-memory objects backing `disk:shm:` regions.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;

/// A freshly created shared-memory object, sized and opened read-write.
///
/// Dropping the handle closes the local descriptor only; the object itself
/// lives until [`SharedMemory::unlink`] is called.
#[derive(Debug)]
pub struct SharedMemory {
    name: CString,
    file: File,
}

impl SharedMemory {
    /// Create (exclusively) a shared-memory object of exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if an object with this name exists, `InvalidInput`
    /// for names containing NUL, or the OS error from `shm_open`/`ftruncate`.
    pub fn create(name: &str, size: u64) -> io::Result<Self> {
        let name = object_name(name)?;
        let flags = libc::O_CREAT | libc::O_EXCL | libc::O_RDWR;

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        // SAFETY: `name` is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(name.as_ptr(), flags, 0o600 as libc::c_uint) };
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        // SAFETY: `name` is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(name.as_ptr(), flags, 0o600 as libc::mode_t) };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` was just returned by shm_open and is owned by nobody else.
        let file = unsafe { File::from_raw_fd(fd) };
        let shm = Self { name, file };
        if let Err(e) = shm.file.set_len(size) {
            let _ = shm.unlink();
            return Err(e);
        }
        Ok(shm)
    }

    /// Descriptor of the object, for mapping.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Remove the object name; its memory is freed once every mapping is gone.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `shm_unlink`.
    pub fn unlink(&self) -> io::Result<()> {
        // SAFETY: `self.name` is a valid NUL-terminated string.
        if unsafe { libc::shm_unlink(self.name.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// POSIX object names start with a single slash.
fn object_name(name: &str) -> io::Result<CString> {
    let full = if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("/{name}")
    };
    CString::new(full).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}
