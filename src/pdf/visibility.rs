//! Visible page calculation
//!
//! Turns an absolute scroll position, the viewport size and the zoom factor
//! into the ordered list of page slices that intersect the viewport.
//! Every page is laid out at `viewport.width * scale` pixels wide, with its
//! height driven by its aspect ratio, and pages are stacked top to bottom
//! with `page_spacing * scale` pixels between them.

use super::types::{PageTransform, ViewportSize};

/// Visibility record for one page intersecting the viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct VisiblePageInfo {
    pub page_index: usize,
    /// How much of the page (px) is above the top of the viewport.
    pub top_cutoff: f32,
    /// How much of the page (px) is below the bottom of the viewport.
    pub bottom_cutoff: f32,
    /// How much of the page (px) lies left of the viewport's left edge.
    pub left_cutoff: i32,
    /// How much of the page (px) lies right of the viewport's right edge.
    pub right_cutoff: i32,
    /// Scaled page width. Can be wider than the viewport.
    pub scaled_width: f32,
    /// Scaled page height. Can be taller than the viewport.
    pub scaled_height: f32,
    /// Blank space preceding this slice in the composite.
    pub top_gap: i32,
}

impl VisiblePageInfo {
    /// Builds a record, panicking when the cutoffs exceed the page height.
    ///
    /// A negative visible height can only come from a calculation bug, so
    /// it is treated as a programmer error rather than clamped.
    #[must_use]
    #[expect(
        clippy::too_many_arguments,
        reason = "Mirrors the flat record layout"
    )]
    pub fn new(
        page_index: usize,
        top_cutoff: f32,
        bottom_cutoff: f32,
        left_cutoff: i32,
        right_cutoff: i32,
        scaled_width: f32,
        scaled_height: f32,
        top_gap: i32,
    ) -> Self {
        let info = Self {
            page_index,
            top_cutoff,
            bottom_cutoff,
            left_cutoff,
            right_cutoff,
            scaled_width,
            scaled_height,
            top_gap,
        };
        assert!(
            scaled_height as i32 - top_cutoff as i32 - bottom_cutoff as i32 >= 0,
            "Invalid visible page parameters {info:?}"
        );
        info
    }

    /// Fraction of the page height inside the viewport.
    #[must_use]
    pub fn visibility_h(&self) -> f32 {
        if self.scaled_height <= 0.0 {
            return 0.0;
        }
        (self.scaled_height - self.top_cutoff - self.bottom_cutoff) / self.scaled_height
    }

    /// Fraction of the page width inside the viewport.
    #[must_use]
    pub fn visibility_w(&self) -> f32 {
        if self.scaled_width <= 0.0 {
            return 0.0;
        }
        (self.scaled_width - self.left_cutoff as f32 - self.right_cutoff as f32) / self.scaled_width
    }

    /// Render transform for this slice at `scale`.
    #[must_use]
    pub fn to_transform(&self, scale: f32) -> PageTransform {
        PageTransform {
            page_index: self.page_index as i32,
            top_cutoff: self.top_cutoff as i32,
            bottom_cutoff: self.bottom_cutoff as i32,
            left_cutoff: self.left_cutoff,
            right_cutoff: self.right_cutoff,
            scaled_width: self.scaled_width as i32,
            scaled_height: self.scaled_height as i32,
            top_gap: self.top_gap,
            scale,
        }
    }
}

/// Page spacing in pixels at `scale`.
#[must_use]
pub fn scaled_spacing(page_spacing: i32, scale: f32) -> i32 {
    (page_spacing as f32 * scale) as i32
}

/// Computes the pages intersecting `[scroll_y, scroll_y + viewport.height)`.
///
/// Page indices are positions in `aspect_ratios`. The walk stops at the
/// first page starting below the viewport.
#[must_use]
pub fn compute_visible(
    scroll_y: f32,
    scroll_x: f32,
    viewport: ViewportSize,
    scale: f32,
    aspect_ratios: &[f32],
    page_spacing: i32,
) -> Vec<VisiblePageInfo> {
    if aspect_ratios.is_empty() || viewport.is_empty() {
        return Vec::new();
    }

    let scaled_width = viewport.width * scale;
    let spacing = scaled_spacing(page_spacing, scale);
    let viewport_bottom = scroll_y + viewport.height;

    let mut visible: Vec<VisiblePageInfo> = Vec::new();
    let mut accumulated = 0.0f32;

    for (index, &ratio) in aspect_ratios.iter().enumerate() {
        let page_height = scaled_width / ratio;
        let page_top = accumulated;
        let page_bottom = page_top + page_height;

        if page_bottom > scroll_y && page_top < viewport_bottom {
            let top_cutoff = (scroll_y - page_top).max(0.0);
            let bottom_cutoff = (page_bottom - viewport_bottom).max(0.0);
            let left_cutoff = scroll_x.clamp(0.0, scaled_width);
            let right_cutoff = (scaled_width - (scroll_x + viewport.width)).max(0.0);

            let top_gap = if visible.is_empty() {
                (page_top - scroll_y).max(0.0) as i32
            } else {
                spacing
            };

            visible.push(VisiblePageInfo::new(
                index,
                top_cutoff,
                bottom_cutoff,
                left_cutoff as i32,
                right_cutoff as i32,
                scaled_width,
                page_height,
                top_gap,
            ));
        }

        accumulated += page_height + spacing as f32;
        if accumulated > viewport_bottom {
            break;
        }
    }

    visible
}
