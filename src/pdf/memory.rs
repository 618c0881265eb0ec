//! Raw pixel memory backing pooled buffers
//!
//! On unix the memory is an anonymous private mapping, so the address stays
//! fixed for the lifetime of the block and can be handed across the native
//! boundary. Other targets fall back to a boxed slice.

use std::io;

/// An owned, zero-initialized block of pixel memory with a stable address.
pub struct PixelMemory {
    #[cfg(unix)]
    ptr: *mut u8,
    #[cfg(not(unix))]
    data: Box<[u8]>,
    len: usize,
}

// SAFETY: PixelMemory exclusively owns its mapping; access goes through
// &self / &mut self like any other owned allocation.
#[cfg(unix)]
unsafe impl Send for PixelMemory {}
#[cfg(unix)]
unsafe impl Sync for PixelMemory {}

impl PixelMemory {
    /// Allocates `len` bytes. Zero-length requests are rejected.
    #[cfg(unix)]
    pub fn allocate(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot allocate an empty pixel block",
            ));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr.cast::<u8>(),
            len,
        })
    }

    #[cfg(not(unix))]
    pub fn allocate(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot allocate an empty pixel block",
            ));
        }
        Ok(Self {
            data: vec![0u8; len].into_boxed_slice(),
            len,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start address, as passed across the boundary.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.as_ptr() as u64
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        #[cfg(unix)]
        {
            self.ptr
        }
        #[cfg(not(unix))]
        {
            self.data.as_ptr()
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        #[cfg(unix)]
        {
            // SAFETY: ptr covers len mapped, readable bytes owned by self.
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
        #[cfg(not(unix))]
        {
            &self.data
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        #[cfg(unix)]
        {
            // SAFETY: ptr covers len mapped, writable bytes; &mut self is exclusive.
            unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
        }
        #[cfg(not(unix))]
        {
            &mut self.data
        }
    }
}

#[cfg(unix)]
impl Drop for PixelMemory {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

impl std::fmt::Debug for PixelMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelMemory")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len)
            .finish()
    }
}
