//! Shared-memory pools and buffers
//!
//! Pools wrap the file descriptor a client passed with wl_shm.create_pool.
//! Buffers keep their pool alive through an `Arc`, so destroying the pool
//! object does not invalidate buffers created from it.

use crate::protocol::*;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::collections::HashSet;
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::{AsFd, OwnedFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A client-provided shared memory pool
#[derive(Debug)]
pub struct ShmPool {
    fd: OwnedFd,
    size: AtomicUsize,
}

impl ShmPool {
    /// Wrap `fd`, checking that `size` bytes of it can be mapped
    pub fn new(fd: OwnedFd, size: usize) -> nix::Result<Self> {
        let pool = ShmPool {
            fd,
            size: AtomicUsize::new(size),
        };
        pool.map()?;
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Grow the pool. Shrinking is refused by the caller before we get here.
    pub fn resize(&self, size: usize) -> nix::Result<()> {
        let previous = self.size.swap(size, Ordering::AcqRel);
        if let Err(err) = self.map() {
            self.size.store(previous, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }

    /// Map the whole pool read-only
    pub fn map(&self) -> nix::Result<ShmMapping> {
        let len = NonZeroUsize::new(self.size()).ok_or(nix::errno::Errno::EINVAL)?;
        // SAFETY: the fd is owned by the pool and outlives the call; the
        // mapping is read-only and unmapped on drop.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                self.fd.as_fd(),
                0,
            )?
        };
        Ok(ShmMapping {
            ptr,
            len: len.get(),
        })
    }
}

/// Read-only view of a pool's memory
#[derive(Debug)]
pub struct ShmMapping {
    ptr: NonNull<c_void>,
    len: usize,
}

impl ShmMapping {
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is PROT_READ, `len` bytes long and lives as
        // long as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len come from a successful mmap call
        if let Err(err) = unsafe { munmap(self.ptr, self.len) } {
            log::warn!("munmap of shm mapping failed: {}", err);
        }
    }
}

/// Description of a buffer's pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub offset: i32,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: PixelFormat,
}

impl BufferLayout {
    /// Number of bytes the buffer spans inside its pool
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Handle given to the render backend: layout plus shared access to the
/// pixel memory
#[derive(Debug, Clone)]
pub struct BufferHandle {
    pub id: BufferId,
    pub layout: BufferLayout,
    pool: Arc<ShmPool>,
}

impl BufferHandle {
    pub fn width(&self) -> i32 {
        self.layout.width
    }

    pub fn height(&self) -> i32 {
        self.layout.height
    }

    pub fn format(&self) -> PixelFormat {
        self.layout.format
    }

    /// Map the pool and return the mapping together with the byte range of
    /// this buffer inside it
    pub fn map(&self) -> nix::Result<(ShmMapping, std::ops::Range<usize>)> {
        let mapping = self.pool.map()?;
        let start = self.layout.offset as usize;
        let end = start + self.layout.byte_len();
        if end > mapping.len() {
            return Err(nix::errno::Errno::EFAULT);
        }
        Ok((mapping, start..end))
    }
}

/// A wl_buffer
#[derive(Debug)]
pub struct Buffer {
    pub id: BufferId,
    pub layout: BufferLayout,
    pool: Arc<ShmPool>,
    /// Surfaces that reference this buffer in pending, cached or current state
    holders: HashSet<ObjectId>,
}

impl Buffer {
    pub fn new(id: BufferId, layout: BufferLayout, pool: Arc<ShmPool>) -> Self {
        Buffer {
            id,
            layout,
            pool,
            holders: HashSet::new(),
        }
    }

    pub fn handle(&self) -> BufferHandle {
        BufferHandle {
            id: self.id,
            layout: self.layout,
            pool: self.pool.clone(),
        }
    }

    pub fn size(&self) -> (i32, i32) {
        (self.layout.width, self.layout.height)
    }

    /// Reference count: number of distinct surfaces holding the buffer
    pub fn ref_count(&self) -> usize {
        self.holders.len()
    }

    pub fn is_held_by(&self, surface: ObjectId) -> bool {
        self.holders.contains(&surface)
    }

    /// Add a holder. Returns false if the surface already held the buffer.
    pub(crate) fn retain(&mut self, surface: ObjectId) -> bool {
        self.holders.insert(surface)
    }

    /// Drop a holder. Returns true when this dropped the last reference.
    pub(crate) fn release(&mut self, surface: ObjectId) -> bool {
        self.holders.remove(&surface) && self.holders.is_empty()
    }

    pub(crate) fn holders(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.holders.iter().copied()
    }
}

/// Validate wl_shm_pool.create_buffer parameters against the pool size
pub fn validate_layout(layout: &BufferLayout, pool_size: usize) -> Result<(), &'static str> {
    if layout.width <= 0 || layout.height <= 0 {
        return Err("buffer dimensions must be positive");
    }
    if layout.offset < 0 {
        return Err("negative buffer offset");
    }
    let min_stride = layout.width as i64 * layout.format.bytes_per_pixel() as i64;
    if (layout.stride as i64) < min_stride {
        return Err("stride is smaller than a row of pixels");
    }
    let end = layout.offset as i64 + layout.stride as i64 * layout.height as i64;
    if end > pool_size as i64 {
        return Err("buffer extends past the end of the pool");
    }
    Ok(())
}
