//! Executable memory for finished code.
//!
//! Pages are mapped read/write/execute in one step and the code copied
//! in before the buffer is ever callable, so no re-protection pass is
//! needed; the VM finalises every function before the first call into
//! any of them.

use opal_core::{OpalError, OpalResult};

/// An owned, executable copy of finished machine code.
pub struct ExecutableBuffer {
    ptr: *mut u8,
    len: usize,
}

impl ExecutableBuffer {
    /// Map executable pages and copy `code` into them.
    pub fn from_code(code: &[u8]) -> OpalResult<Self> {
        if code.is_empty() {
            return Err(OpalError::internal(
                "cannot create executable region for empty code",
            ));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                code.len(),
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(OpalError::internal(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let ptr = ptr as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
        }

        Ok(ExecutableBuffer {
            ptr,
            len: code.len(),
        })
    }

    /// Code size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; empty code is rejected at construction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Get the entry point as a function pointer.
    ///
    /// # Safety
    /// The caller must ensure the code was emitted for `F`'s exact
    /// calling convention and argument types.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut u8>());
        unsafe { std::mem::transmute_copy(&self.ptr) }
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}
