//! Render request and response types

use super::buffer::BufferId;
use super::error::RenderError;
use super::types::{BufferDimensions, BufferInfo, PageTransform};

/// Unique identifier for render jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Request handed to the rasterizer across the bridge.
///
/// `buffer.address` is borrowed for the duration of one call only.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    pub transforms: Vec<PageTransform>,
    pub page_spacing: i32,
    /// Gap above the first slice, the same value as its `top_gap`
    pub top_offset: i32,
    pub buffer: BufferInfo,
}

impl RenderRequest {
    #[must_use]
    pub fn new(transforms: Vec<PageTransform>, buffer: BufferInfo) -> Self {
        Self {
            transforms,
            page_spacing: 0,
            top_offset: 0,
            buffer,
        }
    }
}

/// Transforms the rasterizer actually painted, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderResponse {
    pub transforms: Vec<PageTransform>,
}

impl RenderResponse {
    /// True when every requested transform was painted.
    #[must_use]
    pub fn is_complete_for(&self, requested: &[PageTransform]) -> bool {
        self.transforms == requested
    }
}

/// Work sent to the render worker
#[derive(Debug)]
pub enum Job {
    /// Composite the visible slices into the viewport buffer
    Viewport {
        id: RequestId,
        transforms: Vec<PageTransform>,
        page_spacing: i32,
        top_offset: i32,
    },

    /// Render one uncut page into a page buffer
    Page {
        id: RequestId,
        transform: PageTransform,
    },

    /// Shutdown the worker
    Shutdown,
}

impl Job {
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Viewport { id, .. } | Self::Page { id, .. } => Some(*id),
            Self::Shutdown => None,
        }
    }
}

/// Result of one job, sent back from the worker
#[derive(Debug)]
pub enum JobResult {
    /// Viewport composite written to `buffer`
    Viewport {
        id: RequestId,
        requested: Vec<PageTransform>,
        response: RenderResponse,
        buffer: BufferId,
        info: BufferInfo,
    },

    /// Single page written to `buffer`
    Page {
        id: RequestId,
        transform: PageTransform,
        buffer: BufferId,
        dimensions: BufferDimensions,
    },

    /// Rendering failed, nothing usable was produced
    Failed { id: RequestId, error: RenderError },

    /// A newer job replaced this one before it ran
    Superseded(RequestId),
}

impl JobResult {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Viewport { id, .. }
            | Self::Page { id, .. }
            | Self::Failed { id, .. }
            | Self::Superseded(id) => *id,
        }
    }
}
