//! Pixel buffer pool
//!
//! Page buffers are reused by capacity: a free buffer whose allocation is at
//! least as large as the request is reshaped and handed out again. Viewport
//! buffers are reused only while their dimensions cover the composite; free
//! ones that are too small are disposed before a larger one is allocated.
//! A viewport buffer that is not free is on screen, so the next composite
//! always goes into a different one. `free` only marks a buffer reusable;
//! `dispose` releases its memory for good.

use log::{debug, warn};

use super::error::BufferError;
use super::memory::PixelMemory;
use super::types::{BufferDimensions, BufferInfo, ByteSize, PageTransform, transforms_size};

/// Stable handle to a pooled buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferClass {
    Page,
    Viewport,
}

/// A reusable block of BGRA pixel memory.
#[derive(Debug)]
pub struct PixelBuffer {
    id: BufferId,
    class: BufferClass,
    memory: Option<PixelMemory>,
    /// Dimensions the memory was allocated for
    allocated: BufferDimensions,
    /// Dimensions of the current contents
    dimensions: BufferDimensions,
    free: bool,
}

impl PixelBuffer {
    fn allocate(
        id: BufferId,
        class: BufferClass,
        width: i32,
        height: i32,
    ) -> Result<Self, BufferError> {
        if width <= 0 || height <= 0 {
            return Err(BufferError::InvalidDimensions { width, height });
        }
        let dimensions = BufferDimensions::packed(width, height);
        let bytes = dimensions.byte_len();
        let memory = PixelMemory::allocate(bytes).map_err(|e| BufferError::Allocation {
            bytes,
            detail: e.to_string(),
        })?;
        debug!(
            "Allocated {class:?} buffer {} {width}x{height} ({})",
            id.0,
            ByteSize(bytes as u64)
        );
        Ok(Self {
            id,
            class,
            memory: Some(memory),
            allocated: dimensions,
            dimensions,
            free: false,
        })
    }

    #[must_use]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[must_use]
    pub fn class(&self) -> BufferClass {
        self.class
    }

    /// Allocated size in bytes, zero once disposed.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.memory.as_ref().map_or(0, PixelMemory::len)
    }

    #[must_use]
    pub fn dimensions(&self) -> BufferDimensions {
        self.dimensions
    }

    /// Descriptor for handing the buffer to the rasterizer.
    #[must_use]
    pub fn info(&self) -> Option<BufferInfo> {
        self.memory
            .as_ref()
            .map(|memory| self.dimensions.with_address(memory.address()))
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.free
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.memory.is_none()
    }

    /// Marks the buffer reusable. The memory is kept.
    pub fn free(&mut self) {
        self.free = true;
    }

    pub fn set_unfree(&mut self) {
        self.free = false;
    }

    /// Releases the memory. A disposed buffer is never handed out again.
    pub fn dispose(&mut self) {
        if let Some(memory) = self.memory.take() {
            debug!(
                "Disposed {:?} buffer {} ({})",
                self.class,
                self.id.0,
                ByteSize(memory.len() as u64)
            );
        }
        self.free = false;
    }

    /// True if the allocation has room for `width` x `height` packed pixels.
    #[must_use]
    pub fn holds(&self, width: i32, height: i32) -> bool {
        !self.is_disposed() && self.capacity() >= ByteSize::for_pixels(width, height).bytes() as usize
    }

    /// Like [`PixelBuffer::holds`], and the allocated dimensions cover
    /// `width` x `height` too.
    #[must_use]
    pub fn fits(&self, width: i32, height: i32) -> bool {
        self.holds(width, height) && self.allocated.width >= width && self.allocated.height >= height
    }

    fn reshape(&mut self, width: i32, height: i32) {
        self.dimensions = BufferDimensions::packed(width, height);
    }

    /// Pixel rows of the current contents.
    pub fn pixels(&self) -> Result<&[u8], BufferError> {
        let len = self.dimensions.byte_len();
        self.memory
            .as_ref()
            .map(|memory| &memory.as_slice()[..len])
            .ok_or(BufferError::Disposed(self.id.0))
    }

    pub fn pixels_mut(&mut self) -> Result<&mut [u8], BufferError> {
        let len = self.dimensions.byte_len();
        let id = self.id.0;
        self.memory
            .as_mut()
            .map(|memory| &mut memory.as_mut_slice()[..len])
            .ok_or(BufferError::Disposed(id))
    }
}

/// Pool of page buffers and viewport buffers.
#[derive(Debug, Default)]
pub struct BufferPool {
    next_id: u64,
    pages: Vec<PixelBuffer>,
    viewports: Vec<PixelBuffer>,
    soft_limit: Option<ByteSize>,
}

impl BufferPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs a warning whenever the pool grows beyond `limit`.
    #[must_use]
    pub fn with_soft_limit(mut self, limit: ByteSize) -> Self {
        self.soft_limit = Some(limit);
        self
    }

    fn next_id(&mut self) -> BufferId {
        self.next_id += 1;
        BufferId(self.next_id)
    }

    /// Hands out a buffer for the slice described by `transform`.
    ///
    /// Reuses the first free page buffer with enough capacity for the
    /// slice, whatever its previous shape, otherwise allocates one of
    /// exactly the slice size.
    pub fn acquire_page_buffer(&mut self, transform: &PageTransform) -> Result<BufferId, BufferError> {
        let (width, height) = transform.slice_size();
        if width <= 0 || height <= 0 {
            return Err(BufferError::InvalidDimensions { width, height });
        }

        if let Some(buffer) = self
            .pages
            .iter_mut()
            .find(|b| b.is_free() && b.holds(width, height))
        {
            buffer.reshape(width, height);
            buffer.set_unfree();
            return Ok(buffer.id());
        }

        let id = self.next_id();
        let buffer = PixelBuffer::allocate(id, BufferClass::Page, width, height)?;
        self.pages.push(buffer);
        self.check_limit();
        Ok(id)
    }

    /// Hands out a viewport buffer sized for `transforms` stacked with gaps.
    ///
    /// Buffers still in use are never returned, so the composite on screen
    /// survives a failed render into the next one.
    pub fn acquire_viewport_buffer(
        &mut self,
        transforms: &[PageTransform],
    ) -> Result<BufferId, BufferError> {
        let (width, height) = transforms_size(transforms);
        if width <= 0 || height <= 0 {
            return Err(BufferError::InvalidDimensions { width, height });
        }

        if let Some(buffer) = self
            .viewports
            .iter_mut()
            .find(|b| b.is_free() && b.fits(width, height))
        {
            buffer.reshape(width, height);
            buffer.set_unfree();
            return Ok(buffer.id());
        }

        // Every free viewport buffer is too small for this composite.
        self.viewports.retain_mut(|buffer| {
            if buffer.is_free() {
                buffer.dispose();
                false
            } else {
                true
            }
        });

        let id = self.next_id();
        let buffer = PixelBuffer::allocate(id, BufferClass::Viewport, width, height)?;
        self.viewports.push(buffer);
        self.check_limit();
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: BufferId) -> Option<&PixelBuffer> {
        self.viewports
            .iter()
            .chain(self.pages.iter())
            .find(|b| b.id() == id)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut PixelBuffer> {
        self.viewports
            .iter_mut()
            .chain(self.pages.iter_mut())
            .find(|b| b.id() == id)
    }

    /// Marks a buffer reusable.
    pub fn free(&mut self, id: BufferId) -> Result<(), BufferError> {
        let buffer = self.get_mut(id).ok_or(BufferError::Unknown(id.0))?;
        if buffer.is_disposed() {
            return Err(BufferError::Disposed(id.0));
        }
        buffer.free();
        Ok(())
    }

    /// Disposes and forgets every free page buffer, returning how many.
    pub fn release_free_page_buffers(&mut self) -> usize {
        let before = self.pages.len();
        self.pages.retain_mut(|buffer| {
            if buffer.is_free() {
                buffer.dispose();
                false
            } else {
                true
            }
        });
        before - self.pages.len()
    }

    #[must_use]
    pub fn page_buffer_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn viewport_buffer_count(&self) -> usize {
        self.viewports.len()
    }

    /// Bytes currently held by live buffers.
    #[must_use]
    pub fn total_bytes(&self) -> ByteSize {
        let bytes: usize = self
            .viewports
            .iter()
            .chain(self.pages.iter())
            .map(PixelBuffer::capacity)
            .sum();
        ByteSize(bytes as u64)
    }

    /// Disposes every buffer.
    pub fn dispose_all(&mut self) {
        let total = self.total_bytes();
        for buffer in self.viewports.iter_mut().chain(self.pages.iter_mut()) {
            buffer.dispose();
        }
        self.pages.clear();
        self.viewports.clear();
        if total > ByteSize::ZERO {
            debug!("Buffer pool released {total}");
        }
    }

    fn check_limit(&self) {
        if let Some(limit) = self.soft_limit {
            let total = self.total_bytes();
            if total > limit {
                warn!("Buffer pool holds {total}, above the configured {limit}");
            }
        }
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
