//! Viewport rendering infrastructure

mod bridge;
mod buffer;
mod cache;
mod document;
mod error;
mod layout;
mod memory;
#[cfg(feature = "pdf")]
mod mupdf_backend;
mod rasterizer;
mod request;
mod service;
mod state;
mod types;
mod visibility;
pub mod wire;
mod worker;
mod zoom;

pub use bridge::{Backend, NativeBridge, RenderBridge};
pub use buffer::{BufferClass, BufferId, BufferPool, PixelBuffer};
pub use cache::{BasePage, BasePageCache, CacheKey};
pub use document::{
    Document, DocumentSource, DocumentState, NativeDocument, UNREADABLE_PAGE_ASPECT_RATIO,
};
pub use error::{BufferError, OpenError, RenderError, SharedViewError, ViewError, WireError};
pub use layout::{FALLBACK_ASPECT_RATIO, PageLayout, most_visible_page};
pub use memory::PixelMemory;
#[cfg(feature = "pdf")]
pub use mupdf_backend::{MupdfBackend, MupdfDocument};
pub use rasterizer::{BACKGROUND, Bitmap, ClipRect, PAGE_FILL, PageRasterizer, composite};
pub use request::{Job, JobResult, RenderRequest, RenderResponse, RequestId};
pub use service::{DisplayState, LoadedImage, RenderService, ServiceConfig, ViewEvent};
pub use state::{Command, Effect, ViewState};
pub use types::*;
pub use visibility::{VisiblePageInfo, compute_visible, scaled_spacing};
pub use worker::{WorkerConfig, render_worker};
pub use zoom::*;
