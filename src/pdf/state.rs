//! View state management
//!
//! Upstream input arrives as `Command`s; applying one mutates the scroll
//! and zoom state and returns the `Effect`s the service has to carry out.

use std::time::Instant;

use super::layout::{PageLayout, most_visible_page};
use super::types::{Offset, PageTransform, ViewportSize};
use super::visibility::VisiblePageInfo;
use super::zoom::Zoom;

/// Current view state for an open document
#[derive(Clone, Debug)]
pub struct ViewState {
    zoom: Zoom,
    /// Transforms of the last viewport render requested
    requested: Vec<PageTransform>,
}

impl ViewState {
    #[must_use]
    pub fn new(zoom: Zoom) -> Self {
        Self {
            zoom,
            requested: Vec::new(),
        }
    }

    #[must_use]
    pub fn zoom(&self) -> &Zoom {
        &self.zoom
    }

    #[must_use]
    pub fn layout(&self) -> &PageLayout {
        self.zoom.layout()
    }

    #[must_use]
    pub fn visible_pages(&self) -> Vec<VisiblePageInfo> {
        self.zoom.visible_pages()
    }

    #[must_use]
    pub fn current_page(&self) -> Option<usize> {
        most_visible_page(&self.visible_pages())
    }

    /// Transforms of the latest viewport render request.
    #[must_use]
    pub fn requested_transforms(&self) -> &[PageTransform] {
        &self.requested
    }

    /// Apply a command and return resulting effects
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        self.apply_at(cmd, Instant::now())
    }

    pub fn apply_at(&mut self, cmd: Command, now: Instant) -> Vec<Effect> {
        match cmd {
            Command::SetViewport(viewport) => {
                let width_changed = self.zoom.viewport().width != viewport.width;
                if !self.zoom.set_viewport(viewport) {
                    return vec![];
                }
                let mut effects = Vec::new();
                if width_changed {
                    effects.push(Effect::ReleaseBasePages);
                }
                effects.extend(self.rerender(false));
                effects
            }

            Command::Pan(delta) => {
                let before = (self.zoom.scroll_x(), self.zoom.scroll_y());
                self.zoom.pan_at(delta, now);
                if before == (self.zoom.scroll_x(), self.zoom.scroll_y()) {
                    vec![]
                } else {
                    self.rerender(false)
                }
            }

            Command::Zoom { factor, centroid } => {
                if self.zoom.zoom_at(factor, centroid, now) {
                    self.rerender(true)
                } else {
                    vec![]
                }
            }

            Command::SetZoom(target) => {
                if self.zoom.set_zoom(target) {
                    self.rerender(true)
                } else {
                    vec![]
                }
            }

            Command::ScrollToPage(page) => {
                let before = self.zoom.scroll_y();
                self.zoom.scroll_to_page(page);
                if before == self.zoom.scroll_y() {
                    vec![]
                } else {
                    self.rerender(false)
                }
            }

            Command::SyncLayout {
                page,
                offset,
                scroll_x,
            } => {
                if self
                    .zoom
                    .sync_from_external_layout(page, offset, scroll_x, now)
                {
                    self.rerender_without_echo()
                } else {
                    vec![]
                }
            }

            Command::Refresh => {
                self.requested.clear();
                self.rerender(false)
            }
        }
    }

    fn viewport_effect(&mut self) -> Option<Effect> {
        let transforms = self.zoom.transforms();
        if transforms == self.requested {
            return None;
        }
        self.requested.clone_from(&transforms);
        if transforms.is_empty() {
            Some(Effect::ClearViewport)
        } else {
            Some(Effect::RequestViewport(transforms))
        }
    }

    fn layout_effect(&self) -> Effect {
        let (page, offset) = self.zoom.layout_position();
        Effect::ScrollExternalLayout {
            page,
            offset,
            scroll_x: self.zoom.scroll_x(),
        }
    }

    fn rerender(&mut self, scale_changed: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if scale_changed {
            let pages: Vec<usize> = self
                .visible_pages()
                .iter()
                .map(|info| info.page_index)
                .collect();
            if !pages.is_empty() {
                effects.push(Effect::RequestBasePages(pages));
            }
        }
        effects.extend(self.viewport_effect());
        effects.push(self.layout_effect());
        effects
    }

    /// Position came from the external layout, so it is not echoed back.
    fn rerender_without_echo(&mut self) -> Vec<Effect> {
        self.viewport_effect().into_iter().collect()
    }
}

/// Commands that modify view state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Viewport was resized
    SetViewport(ViewportSize),
    /// Drag by a delta in viewport pixels
    Pan(Offset),
    /// Pinch zoom by `factor` around `centroid`
    Zoom { factor: f32, centroid: Offset },
    /// Set an absolute zoom factor
    SetZoom(f32),
    /// Jump to the top of a page
    ScrollToPage(usize),
    /// External scroll container reported a position
    SyncLayout {
        page: usize,
        offset: i32,
        scroll_x: f32,
    },
    /// Re-request the viewport even if nothing moved
    Refresh,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Render these slices into the viewport buffer
    RequestViewport(Vec<PageTransform>),
    /// Nothing is visible any more
    ClearViewport,
    /// Render uncut pages at scale 1 for interim display
    RequestBasePages(Vec<usize>),
    /// Base pages were fitted to a different viewport width
    ReleaseBasePages,
    /// Move the external scroll container
    ScrollExternalLayout {
        page: usize,
        offset: i32,
        scroll_x: f32,
    },
}
