//! Document layout: page heights, offsets and the layout-index mapping

use std::ops::RangeInclusive;

use super::types::ViewportSize;
use super::visibility::{VisiblePageInfo, compute_visible, scaled_spacing};

/// Aspect ratio used when a page reports non-positive dimensions.
pub const FALLBACK_ASPECT_RATIO: f32 = 1.0;

/// Vertical stack of pages as laid out for display.
///
/// Holds a contiguous run of document pages starting at `first_page`,
/// each with its width/height ratio, plus the unscaled inter-page spacing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageLayout {
    first_page: usize,
    ratios: Vec<f32>,
    page_spacing: i32,
}

impl PageLayout {
    /// Layout over every page of the document.
    #[must_use]
    pub fn new(ratios: Vec<f32>, page_spacing: i32) -> Self {
        Self {
            first_page: 0,
            ratios: ratios.into_iter().map(sanitize_ratio).collect(),
            page_spacing: page_spacing.max(0),
        }
    }

    /// Layout restricted to `range`, clamped to the pages that exist.
    #[must_use]
    pub fn with_range(ratios: &[f32], range: RangeInclusive<usize>, page_spacing: i32) -> Self {
        let start = (*range.start()).min(ratios.len());
        let end = range.end().saturating_add(1).min(ratios.len()).max(start);
        Self {
            first_page: start,
            ratios: ratios[start..end].iter().copied().map(sanitize_ratio).collect(),
            page_spacing: page_spacing.max(0),
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.ratios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    /// Document page indices shown by this layout.
    #[must_use]
    pub fn page_range(&self) -> Option<RangeInclusive<usize>> {
        if self.ratios.is_empty() {
            None
        } else {
            Some(self.first_page..=self.first_page + self.ratios.len() - 1)
        }
    }

    #[must_use]
    pub fn page_spacing(&self) -> i32 {
        self.page_spacing
    }

    #[must_use]
    pub fn aspect_ratio(&self, page: usize) -> Option<f32> {
        page.checked_sub(self.first_page)
            .and_then(|slot| self.ratios.get(slot).copied())
    }

    /// Scaled spacing between pages, truncated to whole pixels.
    #[must_use]
    pub fn scaled_spacing(&self, scale: f32) -> i32 {
        scaled_spacing(self.page_spacing, scale)
    }

    /// Scaled height of every laid out page, in order.
    fn heights(&self, scaled_width: f32) -> impl Iterator<Item = f32> + '_ {
        self.ratios.iter().map(move |ratio| scaled_width / ratio)
    }

    /// Total scaled content height including spacing between pages.
    #[must_use]
    pub fn total_height(&self, viewport: ViewportSize, scale: f32) -> f32 {
        if self.ratios.is_empty() {
            return 0.0;
        }
        let pages: f32 = self.heights(viewport.width * scale).sum();
        let gaps = (self.ratios.len() - 1) as f32 * self.scaled_spacing(scale) as f32;
        pages + gaps
    }

    /// Largest vertical scroll offset that keeps the viewport filled.
    #[must_use]
    pub fn max_scroll_y(&self, viewport: ViewportSize, scale: f32) -> f32 {
        (self.total_height(viewport, scale) - viewport.height).max(0.0)
    }

    /// Absolute Y of the top of document page `page`.
    ///
    /// Pages past the end map to the end of the content.
    #[must_use]
    pub fn page_offset_y(&self, page: usize, viewport: ViewportSize, scale: f32) -> f32 {
        let spacing = self.scaled_spacing(scale) as f32;
        let count = page.saturating_sub(self.first_page).min(self.ratios.len());
        self.heights(viewport.width * scale)
            .take(count)
            .map(|height| height + spacing)
            .sum()
    }

    /// Maps an absolute Y to `(page, offset within page)`.
    ///
    /// Offsets in the spacing after a page stay attributed to that page,
    /// capped at its height. An empty layout yields `(0, 0)`.
    #[must_use]
    pub fn map_absolute_y(&self, abs_y: f32, viewport: ViewportSize, scale: f32) -> (usize, i32) {
        let spacing = self.scaled_spacing(scale) as f32;
        let mut accumulated = 0.0f32;

        for (slot, height) in self.heights(viewport.width * scale).enumerate() {
            if accumulated + height + spacing > abs_y {
                let offset = (abs_y - accumulated) as i32;
                return (self.first_page + slot, offset.min(height as i32));
            }
            accumulated += height + spacing;
        }
        (0, 0)
    }

    /// Visible pages for the given scroll state, with document page indices.
    #[must_use]
    pub fn visible_pages(
        &self,
        scroll_y: f32,
        scroll_x: f32,
        viewport: ViewportSize,
        scale: f32,
    ) -> Vec<VisiblePageInfo> {
        let mut visible = compute_visible(
            scroll_y,
            scroll_x,
            viewport,
            scale,
            &self.ratios,
            self.page_spacing,
        );
        for info in &mut visible {
            info.page_index += self.first_page;
        }
        visible
    }
}

/// The page with the largest visible fraction of its height.
#[must_use]
pub fn most_visible_page(visible: &[VisiblePageInfo]) -> Option<usize> {
    visible
        .iter()
        .max_by(|a, b| {
            a.visibility_h()
                .partial_cmp(&b.visibility_h())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|info| info.page_index)
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        FALLBACK_ASPECT_RATIO
    }
}
