//! Zoom and scroll state for continuous document viewing
//!
//! Owns the absolute scroll position (document pixels at the current zoom)
//! and the zoom factor. Pan and zoom input is applied here with clamping,
//! and positions are converted to and from the external scroll container's
//! "item index + local offset" coordinates.

use std::time::{Duration, Instant};

use super::layout::PageLayout;
use super::types::{Offset, PageTransform, ViewportSize};
use super::visibility::VisiblePageInfo;

/// Scroll and zoom state for one open document.
#[derive(Clone, Debug)]
pub struct Zoom {
    layout: PageLayout,
    viewport: ViewportSize,

    /// Current zoom factor (1.0 = page width matches viewport width)
    factor: f32,

    /// Horizontal scroll offset in scaled pixels
    scroll_x: f32,

    /// Vertical scroll offset in scaled pixels from the document top
    scroll_y: f32,

    min_scale: f32,
    max_scale: f32,

    /// Layout sync is ignored for this long after a pan or zoom.
    sync_quiet: Duration,
    last_gesture: Option<Instant>,
}

impl Zoom {
    /// Smallest allowed zoom factor
    pub const MIN_SCALE: f32 = 1.0;
    /// Largest allowed zoom factor
    pub const MAX_SCALE: f32 = 5.0;
    /// Quiet period after a gesture before external layout sync is honoured
    pub const DEFAULT_SYNC_QUIET: Duration = Duration::from_millis(200);

    #[must_use]
    pub fn new(layout: PageLayout, viewport: ViewportSize) -> Self {
        Self {
            layout,
            viewport,
            factor: 1.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            min_scale: Self::MIN_SCALE,
            max_scale: Self::MAX_SCALE,
            sync_quiet: Self::DEFAULT_SYNC_QUIET,
            last_gesture: None,
        }
    }

    /// Overrides the zoom limits. `max` is raised to `min` if smaller.
    #[must_use]
    pub fn with_limits(mut self, min: f32, max: f32) -> Self {
        self.min_scale = if min.is_finite() && min > 0.0 {
            min
        } else {
            Self::MIN_SCALE
        };
        self.max_scale = if max.is_finite() { max } else { Self::MAX_SCALE }.max(self.min_scale);
        self.factor = self.clamp_factor(self.factor);
        self
    }

    #[must_use]
    pub fn with_sync_quiet(mut self, quiet: Duration) -> Self {
        self.sync_quiet = quiet;
        self
    }

    #[must_use]
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Zoom factor as a rounded percentage (100, 150, ...).
    #[must_use]
    pub fn percent(&self) -> i32 {
        (self.factor * 100.0).round() as i32
    }

    #[must_use]
    pub fn scroll_x(&self) -> f32 {
        self.scroll_x
    }

    #[must_use]
    pub fn scroll_y(&self) -> f32 {
        self.scroll_y
    }

    #[must_use]
    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    #[must_use]
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Replaces the viewport size, keeping the scroll position in range.
    pub fn set_viewport(&mut self, viewport: ViewportSize) -> bool {
        if self.viewport == viewport {
            return false;
        }
        self.viewport = viewport;
        self.clamp_scroll();
        true
    }

    #[must_use]
    pub fn max_scroll_x(&self) -> f32 {
        (self.viewport.width * self.factor - self.viewport.width).max(0.0)
    }

    #[must_use]
    pub fn max_scroll_y(&self) -> f32 {
        self.layout.max_scroll_y(self.viewport, self.factor)
    }

    /// Total scaled document height, including page spacing.
    #[must_use]
    pub fn document_height(&self) -> f32 {
        self.layout.total_height(self.viewport, self.factor)
    }

    /// Applies a drag delta and returns the part that could not be applied.
    ///
    /// Dragging content down (positive delta) scrolls towards the top.
    pub fn pan(&mut self, delta: Offset) -> Offset {
        self.pan_at(delta, Instant::now())
    }

    pub fn pan_at(&mut self, delta: Offset, now: Instant) -> Offset {
        let new_x = (self.scroll_x - delta.x).clamp(0.0, self.max_scroll_x());
        let new_y = (self.scroll_y - delta.y).clamp(0.0, self.max_scroll_y());

        let applied = Offset::new(self.scroll_x - new_x, self.scroll_y - new_y);
        self.scroll_x = new_x;
        self.scroll_y = new_y;
        self.last_gesture = Some(now);

        delta - applied
    }

    /// Multiplies the zoom by `factor`, keeping the point under `centroid`
    /// (viewport coordinates) stationary. Returns false if nothing changed.
    pub fn zoom(&mut self, factor: f32, centroid: Offset) -> bool {
        self.zoom_at(factor, centroid, Instant::now())
    }

    pub fn zoom_at(&mut self, factor: f32, centroid: Offset, now: Instant) -> bool {
        let current = self.factor;
        let new_scale = self.clamp_factor(current * factor);
        if new_scale == current {
            return false;
        }

        let ratio = new_scale / current;
        let new_y = (self.scroll_y + centroid.y) * ratio - centroid.y;
        let new_x = if new_scale == self.min_scale {
            0.0
        } else {
            (self.scroll_x + centroid.x) * ratio - centroid.x
        };

        self.factor = new_scale;
        self.scroll_y = new_y.max(0.0);
        self.scroll_x = new_x.max(0.0);
        self.clamp_scroll();
        self.last_gesture = Some(now);
        true
    }

    /// Sets an absolute zoom factor, anchored at the viewport center.
    pub fn set_zoom(&mut self, target: f32) -> bool {
        if !target.is_finite() || target <= 0.0 {
            return false;
        }
        let center = self.viewport.center();
        self.zoom(target / self.factor, center)
    }

    /// Scrolls so that `page` starts at the top of the viewport.
    pub fn scroll_to_page(&mut self, page: usize) {
        self.scroll_y = self.layout.page_offset_y(page, self.viewport, self.factor);
        self.clamp_scroll();
    }

    /// Follows a position reported by the external scroll container.
    ///
    /// Ignored while a pan or zoom happened within the quiet period, since
    /// the container is then echoing positions this state commanded.
    /// Returns true when the position was taken over.
    pub fn sync_from_external_layout(
        &mut self,
        page: usize,
        local_offset: i32,
        scroll_x: f32,
        now: Instant,
    ) -> bool {
        if let Some(last) = self.last_gesture {
            if now.saturating_duration_since(last) < self.sync_quiet {
                return false;
            }
        }

        let page_top = self.layout.page_offset_y(page, self.viewport, self.factor);
        self.scroll_y = page_top + local_offset as f32;
        self.scroll_x = scroll_x;
        self.clamp_scroll();
        true
    }

    /// Maps an absolute Y at `scale` to `(page, offset within page)`.
    #[must_use]
    pub fn map_absolute_y_to_layout(&self, abs_y: f32, scale: f32) -> (usize, i32) {
        self.layout.map_absolute_y(abs_y, self.viewport, scale)
    }

    /// External layout position matching the current scroll state.
    #[must_use]
    pub fn layout_position(&self) -> (usize, i32) {
        self.map_absolute_y_to_layout(self.scroll_y, self.factor)
    }

    #[must_use]
    pub fn visible_pages(&self) -> Vec<VisiblePageInfo> {
        self.layout
            .visible_pages(self.scroll_y, self.scroll_x, self.viewport, self.factor)
    }

    /// Render transforms for the visible slices.
    ///
    /// Slices truncated to nothing by integer rounding are dropped.
    #[must_use]
    pub fn transforms(&self) -> Vec<PageTransform> {
        self.visible_pages()
            .iter()
            .map(|info| info.to_transform(self.factor))
            .filter(PageTransform::has_visible_slice)
            .collect()
    }

    /// Clamp factor to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp_factor(&self, factor: f32) -> f32 {
        if !factor.is_finite() {
            self.factor
        } else {
            factor.clamp(self.min_scale, self.max_scale)
        }
    }

    fn clamp_scroll(&mut self) {
        self.scroll_x = self.scroll_x.clamp(0.0, self.max_scroll_x());
        self.scroll_y = self.scroll_y.clamp(0.0, self.max_scroll_y());
    }
}
