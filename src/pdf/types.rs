//! Core geometry types for viewport rendering

use std::fmt;
use std::ops::{Add, Sub};

/// Bytes per pixel in every buffer (BGRA, 8 bits per channel).
pub const BYTES_PER_PIXEL: i32 = 4;

/// Viewport size in device pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
}

impl ViewportSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when nothing can be shown in this viewport.
    #[must_use]
    pub fn is_empty(self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    #[must_use]
    pub fn center(self) -> Offset {
        Offset::new(self.width / 2.0, self.height / 2.0)
    }
}

/// A 2D offset in pixels, used for pan deltas and zoom centroids.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Offset {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Offset {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A byte count, displayed in whole megabytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn from_mb(mb: u64) -> Self {
        Self(mb.saturating_mul(1024 * 1024))
    }

    /// Byte size of a `width` x `height` pixel area, zero for degenerate areas.
    #[must_use]
    pub fn for_pixels(width: i32, height: i32) -> Self {
        if width <= 0 || height <= 0 {
            return Self::ZERO;
        }
        Self(width as u64 * height as u64 * BYTES_PER_PIXEL as u64)
    }
}

impl Add for ByteSize {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MB", self.0 / 1024 / 1024)
    }
}

/// How one page maps onto the composite output buffer.
///
/// Cutoffs are the parts of the scaled page lying outside the viewport on
/// each side; `top_gap` is the blank space preceding the slice in a
/// vertically stacked composite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageTransform {
    pub page_index: i32,
    pub top_cutoff: i32,
    pub bottom_cutoff: i32,
    pub left_cutoff: i32,
    pub right_cutoff: i32,
    pub scaled_width: i32,
    pub scaled_height: i32,
    pub top_gap: i32,
    pub scale: f32,
}

impl PageTransform {
    /// Full, uncut page of `width` pixels with the given aspect ratio.
    #[must_use]
    pub fn full_page(page_index: i32, width: i32, aspect_ratio: f32, scale: f32) -> Self {
        let height = if aspect_ratio > 0.0 {
            (width as f32 / aspect_ratio) as i32
        } else {
            width
        };
        Self {
            page_index,
            top_cutoff: 0,
            bottom_cutoff: 0,
            left_cutoff: 0,
            right_cutoff: 0,
            scaled_width: width,
            scaled_height: height,
            top_gap: 0,
            scale,
        }
    }

    /// Width and height of the visible slice.
    #[must_use]
    pub fn slice_size(&self) -> (i32, i32) {
        (
            self.scaled_width - self.left_cutoff - self.right_cutoff,
            self.scaled_height - self.top_cutoff - self.bottom_cutoff,
        )
    }

    /// True when the slice has a positive area and can be rasterized.
    #[must_use]
    pub fn has_visible_slice(&self) -> bool {
        let (width, height) = self.slice_size();
        width > 0 && height > 0
    }

    /// Bytes needed to hold the slice alone.
    #[must_use]
    pub fn buffer_size(&self) -> ByteSize {
        let (width, height) = self.slice_size();
        ByteSize::for_pixels(width, height)
    }

    /// Bytes needed to hold the slice plus the gap above it.
    #[must_use]
    pub fn buffer_size_with_gap(&self) -> ByteSize {
        let (width, height) = self.slice_size();
        ByteSize::for_pixels(width, height + self.top_gap)
    }

    /// Same transform with every cutoff zeroed.
    #[must_use]
    pub fn uncut(&self) -> Self {
        Self {
            top_cutoff: 0,
            bottom_cutoff: 0,
            left_cutoff: 0,
            right_cutoff: 0,
            ..*self
        }
    }
}

/// Size of a composite holding `transforms` stacked vertically with gaps.
///
/// Width is the widest slice, height the sum of slice heights and gaps.
#[must_use]
pub fn transforms_size(transforms: &[PageTransform]) -> (i32, i32) {
    transforms.iter().fold((0, 0), |(width, height), t| {
        let (w, h) = t.slice_size();
        (width.max(w), height + h + t.top_gap)
    })
}

/// Pixel layout of a destination buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDimensions {
    pub width: i32,
    pub height: i32,
    /// Bytes per row.
    pub stride: i32,
}

impl BufferDimensions {
    /// Tightly packed BGRA layout.
    #[must_use]
    pub const fn packed(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            stride: width * BYTES_PER_PIXEL,
        }
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        if self.height <= 0 || self.stride <= 0 {
            return 0;
        }
        self.stride as usize * self.height as usize
    }

    #[must_use]
    pub const fn with_address(self, address: u64) -> BufferInfo {
        BufferInfo {
            dimensions: self,
            address,
        }
    }
}

/// A destination buffer descriptor: layout plus a borrowed raw address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    pub dimensions: BufferDimensions,
    pub address: u64,
}
