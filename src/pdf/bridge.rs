//! Synchronous boundary between the viewer and the native rasterizer
//!
//! `NativeBridge` is the native side: every entry point takes packed bytes
//! and returns a packed result envelope, never panicking across the
//! boundary. `RenderBridge` is the caller side and speaks typed values.
//! Destination pixels are never copied: the request carries the buffer's
//! address and the rasterizer writes into it in place.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, AssertUnwindSafe};

use log::error;

use super::buffer::PixelBuffer;
use super::document::{Document, DocumentSource, DocumentState, NativeDocument};
use super::error::{BufferError, OpenError, RenderError};
use super::rasterizer::{Bitmap, composite};
use super::request::{RenderRequest, RenderResponse};
use super::types::PageTransform;
use super::wire::{self, FloatList, NativeFault, Pack};

/// Opens documents from a source.
pub trait Backend: Send + Sync {
    fn open(&self, source: &DocumentSource) -> Result<NativeDocument, OpenError>;
}

/// Native side of the boundary for one document.
pub struct NativeBridge {
    backend: Box<dyn Backend>,
    document: Document,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native rasterizer panicked".to_string()
    }
}

fn trace() -> String {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => backtrace.to_string(),
        _ => String::new(),
    }
}

/// Runs `f`, turning panics into faults, and packs the envelope.
fn guarded<T: Pack>(what: &str, f: impl FnOnce() -> Result<T, NativeFault>) -> Vec<u8> {
    let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Native {what} panicked: {message}");
            Err(NativeFault::render(message, trace()))
        }
    };
    if let Err(fault) = &result {
        error!("Native {what} failed (code {}): {}", fault.code, fault.message);
    }
    wire::pack_result(&result)
}

fn render_fault(err: &RenderError) -> NativeFault {
    let mut fault = NativeFault::from(err);
    if fault.trace.is_empty() {
        fault.trace = trace();
    }
    fault
}

impl NativeBridge {
    #[must_use]
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            document: Document::new(),
        }
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Opens the document described by a packed `DocumentSource`.
    pub fn open_packed(&self, source: &[u8]) -> Vec<u8> {
        guarded("open", || {
            let source: DocumentSource =
                wire::from_bytes(source).map_err(|e| NativeFault::render(e.to_string(), ""))?;
            self.document
                .open_with(|| self.backend.open(&source))
                .map_err(|e| NativeFault::from(&e))
        })
    }

    pub fn page_count_packed(&self) -> Vec<u8> {
        guarded("page count", || {
            self.document
                .page_count()
                .map(|count| count as i32)
                .map_err(|e| render_fault(&e))
        })
    }

    /// Page aspect ratios as a raw float list.
    pub fn page_ratios_packed(&self) -> Vec<u8> {
        guarded("page ratios", || {
            self.document
                .page_ratios()
                .map(FloatList)
                .map_err(|e| render_fault(&e))
        })
    }

    /// Renders a packed `RenderRequest` into the buffer it points at.
    ///
    /// # Safety
    ///
    /// The request's buffer address must point to `stride * height`
    /// writable bytes that nothing else reads or writes until this returns.
    pub unsafe fn render_packed(&self, request: &[u8]) -> Vec<u8> {
        guarded("render", || {
            let request: RenderRequest =
                wire::from_bytes(request).map_err(|e| render_fault(&RenderError::from(e)))?;
            // SAFETY: forwarded from the caller's contract.
            unsafe { self.render(&request) }.map_err(|e| render_fault(&e))
        })
    }

    unsafe fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        let info = request.buffer;
        if info.address == 0 {
            return Err(RenderError::InvalidAddress);
        }
        let len = info.dimensions.byte_len();
        if len == 0 {
            return Err(RenderError::EmptyTarget);
        }
        // SAFETY: the caller guarantees `len` exclusive writable bytes at the address.
        let pixels = unsafe { std::slice::from_raw_parts_mut(info.address as *mut u8, len) };
        let mut target = Bitmap::new(pixels, info.dimensions)?;
        self.document
            .with_native(|native| composite(native, request, &mut target))
    }

    pub fn close(&self) -> bool {
        self.document.close()
    }
}

/// Caller side of the boundary.
pub struct RenderBridge {
    native: NativeBridge,
}

impl RenderBridge {
    #[must_use]
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            native: NativeBridge::new(backend),
        }
    }

    #[must_use]
    pub fn state(&self) -> DocumentState {
        self.native.document().state()
    }

    pub fn open(&self, source: &DocumentSource) -> Result<(), OpenError> {
        let reply = self.native.open_packed(&wire::to_bytes(source));
        match wire::unpack_result::<()>(&reply) {
            Ok(result) => result.map_err(OpenError::from),
            Err(e) => Err(OpenError::Unknown(e.to_string())),
        }
    }

    pub fn page_count(&self) -> Result<usize, RenderError> {
        let reply = self.native.page_count_packed();
        let count = wire::unpack_result::<i32>(&reply)??;
        Ok(count.max(0) as usize)
    }

    pub fn page_ratios(&self) -> Result<Vec<f32>, RenderError> {
        let reply = self.native.page_ratios_packed();
        Ok(wire::unpack_result::<FloatList>(&reply)??.0)
    }

    /// Renders into the raw buffer described by `request`.
    ///
    /// # Safety
    ///
    /// Same contract as [`NativeBridge::render_packed`].
    pub unsafe fn render(&self, request: &RenderRequest) -> Result<RenderResponse, RenderError> {
        // SAFETY: forwarded from the caller's contract.
        let reply = unsafe { self.native.render_packed(&wire::to_bytes(request)) };
        Ok(wire::unpack_result::<RenderResponse>(&reply)??)
    }

    /// Renders `transforms` stacked into `buffer`.
    pub fn render_into(
        &self,
        transforms: Vec<PageTransform>,
        page_spacing: i32,
        top_offset: i32,
        buffer: &mut PixelBuffer,
    ) -> Result<RenderResponse, RenderError> {
        let info = buffer
            .info()
            .ok_or(BufferError::Disposed(buffer.id().0))?;
        let request = RenderRequest {
            transforms,
            page_spacing,
            top_offset,
            buffer: info,
        };
        // SAFETY: `buffer` is borrowed mutably for the whole call, so its
        // memory is live and not aliased while the rasterizer writes.
        unsafe { self.render(&request) }
    }

    pub fn close(&self) -> bool {
        self.native.close()
    }
}
