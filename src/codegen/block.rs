//! Executable memory blocks.
//!
//! A block starts life writable and is turned read+execute exactly once by
//! [`WritableBlock::finalize`]. There is no way back.

use std::ptr::NonNull;

use crate::codegen::error::CodegenError;

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

fn round_to_pages(len: usize) -> usize {
    let page = page_size();
    len.max(1).div_ceil(page) * page
}

/// Owned anonymous mapping; unmapped on drop.
#[derive(Debug)]
struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mapping {
    fn map(len: usize, hint: usize) -> Result<Self, CodegenError> {
        let len = round_to_pages(len);
        // SAFETY: anonymous private mapping, no file descriptor involved.
        let ptr = unsafe {
            libc::mmap(
                hint as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(CodegenError::block_allocation(format!("mmap of {len} bytes")));
        }
        match NonNull::new(ptr.cast::<u8>()) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(CodegenError::block_allocation("mmap returned null")),
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe a mapping this value owns exclusively.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// A block in its write phase.
#[derive(Debug)]
pub struct WritableBlock {
    mapping: Mapping,
}

impl WritableBlock {
    /// Maps at least `len` writable bytes anywhere in the address space.
    pub fn allocate(len: usize) -> Result<Self, CodegenError> {
        Self::allocate_near(len, 0)
    }

    /// Maps at least `len` writable bytes, preferring addresses near `hint`.
    pub fn allocate_near(len: usize, hint: usize) -> Result<Self, CodegenError> {
        Ok(Self {
            mapping: Mapping::map(len, hint)?,
        })
    }

    /// Returns the address of the first byte.
    pub fn base(&self) -> usize {
        self.mapping.ptr.as_ptr() as usize
    }

    /// Returns the mapped length, a whole number of pages.
    pub fn len(&self) -> usize {
        self.mapping.len
    }

    /// Always `false`; mappings are at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the writable contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is readable and writable until finalize.
        unsafe { std::slice::from_raw_parts_mut(self.mapping.ptr.as_ptr(), self.mapping.len) }
    }

    /// Copies `bytes` to the start of the block.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), CodegenError> {
        let slice = self.as_mut_slice();
        if bytes.len() > slice.len() {
            return Err(CodegenError::encode(format!(
                "{} bytes do not fit in a {} byte block",
                bytes.len(),
                slice.len()
            )));
        }
        slice[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Switches the block to read+execute.
    pub fn finalize(self) -> Result<ExecBlock, CodegenError> {
        let block = ExecBlock {
            mapping: self.mapping,
        };
        // SAFETY: the range is exactly the owned mapping.
        let rc = unsafe {
            libc::mprotect(
                block.mapping.ptr.as_ptr().cast(),
                block.mapping.len,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if rc != 0 {
            return Err(CodegenError::block_protect(format!(
                "mprotect of {} bytes",
                block.mapping.len
            )));
        }
        Ok(block)
    }
}

/// A finalized, read+execute block.
#[derive(Debug)]
pub struct ExecBlock {
    mapping: Mapping,
}

impl ExecBlock {
    /// Returns the address of the first byte.
    pub fn base(&self) -> usize {
        self.mapping.ptr.as_ptr() as usize
    }

    /// Returns the mapped length.
    pub fn len(&self) -> usize {
        self.mapping.len
    }

    /// Always `false`; mappings are at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` when `address` lies inside the block.
    pub fn contains(&self, address: usize) -> bool {
        address >= self.base() && address < self.base() + self.len()
    }

    /// Returns the block contents.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping stays readable for the block's lifetime.
        unsafe { std::slice::from_raw_parts(self.mapping.ptr.as_ptr(), self.mapping.len) }
    }
}
