//! Render service - owns the document, the buffer pool and the worker
//!
//! Upstream commands go through `ViewState`; the resulting effects become
//! worker jobs. Finished renders come back over a channel and are published
//! as `ViewEvent`s only if they still match what was last requested.

use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use super::bridge::{Backend, RenderBridge};
use super::buffer::{BufferId, BufferPool};
use super::cache::{BasePage, BasePageCache, CacheKey};
use super::document::{DocumentSource, DocumentState};
use super::error::{BufferError, SharedViewError, ViewError};
use super::layout::PageLayout;
use super::request::{Job, JobResult, RequestId};
use super::state::{Command, Effect, ViewState};
use super::types::{BufferDimensions, BufferInfo, ByteSize, PageTransform, ViewportSize};
use super::visibility::VisiblePageInfo;
use super::worker::{WorkerConfig, render_worker};
use super::zoom::Zoom;
use crate::settings::Settings;

/// Tuning for one service instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub page_spacing: i32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub worker: WorkerConfig,
    pub layout_sync_quiet: Duration,
    pub base_page_cache: usize,
    pub buffer_soft_limit: Option<ByteSize>,
    /// Show only these document pages
    pub page_range: Option<RangeInclusive<usize>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            page_spacing: 0,
            min_zoom: Zoom::MIN_SCALE,
            max_zoom: Zoom::MAX_SCALE,
            worker: WorkerConfig::default(),
            layout_sync_quiet: Zoom::DEFAULT_SYNC_QUIET,
            base_page_cache: BasePageCache::DEFAULT_CAPACITY,
            buffer_soft_limit: None,
            page_range: None,
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let (min_zoom, max_zoom) = settings.zoom_limits();
        Self {
            page_spacing: settings.page_spacing,
            min_zoom,
            max_zoom,
            worker: WorkerConfig::with_debounce(Duration::from_millis(settings.render_debounce_ms)),
            layout_sync_quiet: Duration::from_millis(settings.layout_sync_quiet_ms),
            base_page_cache: settings.base_page_cache,
            buffer_soft_limit: settings.max_buffer_mb.map(ByteSize::from_mb),
            page_range: None,
        }
    }

    #[must_use]
    pub fn with_page_range(mut self, range: RangeInclusive<usize>) -> Self {
        self.page_range = Some(range);
        self
    }
}

/// What the view is showing right now.
#[derive(Clone, Debug)]
pub enum DisplayState {
    /// No document loaded yet
    Initializing,
    /// Document open, nothing rendered yet
    Ready,
    Displaying(Vec<VisiblePageInfo>),
    Error(SharedViewError),
    /// Nothing visible, or the service was closed
    Idle,
}

impl DisplayState {
    #[must_use]
    pub fn error(&self) -> Option<&ViewError> {
        match self {
            Self::Error(err) => Some(&**err),
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        self.error().is_some_and(ViewError::is_terminal)
    }
}

/// A finished viewport composite, ready for display.
///
/// The buffer stays untouched while this image is current. Once the next
/// `ImageLoaded` replaces it the buffer goes back to the pool, where it can
/// be repainted or disposed, so `info.address` is only valid until then.
/// Reading through [`RenderService::with_pixels`] is always checked.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedImage {
    pub buffer: BufferId,
    pub info: BufferInfo,
    /// Slices actually painted, top to bottom
    pub transforms: Vec<PageTransform>,
}

/// Notifications for the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum ViewEvent {
    ImageLoaded(LoadedImage),
    BasePageLoaded {
        page: usize,
        base: BasePage,
    },
    /// Move the external scroll container to this position
    ScrollLayoutTo {
        page: usize,
        offset: i32,
        scroll_x: f32,
    },
}

/// Drives rendering for one document
pub struct RenderService {
    config: ServiceConfig,
    bridge: Arc<RenderBridge>,
    pool: Arc<Mutex<BufferPool>>,
    job_tx: Sender<Job>,
    result_rx: Receiver<JobResult>,
    worker: Option<JoinHandle<()>>,
    state: Option<ViewState>,
    display: DisplayState,
    next_request_id: RequestId,
    latest_viewport: Option<RequestId>,
    /// Newest viewport request that got a result, good or bad
    answered: Option<RequestId>,
    current_image: Option<LoadedImage>,
    base_pages: BasePageCache,
    pending_pages: HashMap<RequestId, CacheKey>,
    events: VecDeque<ViewEvent>,
}

impl RenderService {
    /// Spawns the worker. The document is opened by [`RenderService::load`].
    #[must_use]
    pub fn new(backend: Box<dyn Backend>, config: ServiceConfig) -> Self {
        let bridge = Arc::new(RenderBridge::new(backend));
        let mut pool = BufferPool::new();
        if let Some(limit) = config.buffer_soft_limit {
            pool = pool.with_soft_limit(limit);
        }
        let pool = Arc::new(Mutex::new(pool));

        let (job_tx, job_rx) = flume::unbounded();
        let (result_tx, result_rx) = flume::unbounded();

        let worker_bridge = Arc::clone(&bridge);
        let worker_pool = Arc::clone(&pool);
        let worker_config = config.worker;
        let worker = std::thread::Builder::new()
            .name("pdfslice-render".into())
            .spawn(move || {
                render_worker(worker_bridge, worker_pool, job_rx, result_tx, worker_config);
            })
            .map_err(|e| warn!("Failed to spawn render worker: {e}"))
            .ok();

        Self {
            base_pages: BasePageCache::new(config.base_page_cache),
            config,
            bridge,
            pool,
            job_tx,
            result_rx,
            worker,
            state: None,
            display: DisplayState::Initializing,
            next_request_id: RequestId::new(1),
            latest_viewport: None,
            answered: None,
            current_image: None,
            pending_pages: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    /// Opens `source` and requests the first viewport.
    ///
    /// On failure the display state becomes a terminal error.
    pub fn load(&mut self, source: &DocumentSource, viewport: ViewportSize) -> Result<(), SharedViewError> {
        if let Err(err) = self.bridge.open(source) {
            warn!("Failed to open {source:?}: {err}");
            let err = Arc::new(ViewError::from(err));
            self.display = DisplayState::Error(Arc::clone(&err));
            return Err(err);
        }

        let ratios = match self.bridge.page_ratios() {
            Ok(ratios) => ratios,
            Err(err) => {
                warn!("Could not read page ratios: {err}");
                let err = Arc::new(ViewError::Render {
                    id: RequestId::new(0),
                    source: err,
                });
                self.display = DisplayState::Error(Arc::clone(&err));
                return Err(err);
            }
        };

        let layout = match &self.config.page_range {
            Some(range) => PageLayout::with_range(&ratios, range.clone(), self.config.page_spacing),
            None => PageLayout::new(ratios, self.config.page_spacing),
        };
        info!(
            "Loaded document with {} pages ({} shown)",
            self.bridge.page_count().unwrap_or_default(),
            layout.page_count()
        );

        let zoom = Zoom::new(layout, viewport)
            .with_limits(self.config.min_zoom, self.config.max_zoom)
            .with_sync_quiet(self.config.layout_sync_quiet);
        self.state = Some(ViewState::new(zoom));
        self.display = DisplayState::Ready;
        self.apply_command(Command::Refresh);
        Ok(())
    }

    #[must_use]
    pub fn display_state(&self) -> &DisplayState {
        &self.display
    }

    #[must_use]
    pub fn document_state(&self) -> DocumentState {
        self.bridge.state()
    }

    #[must_use]
    pub fn view_state(&self) -> Option<&ViewState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn visible_pages(&self) -> Vec<VisiblePageInfo> {
        self.state
            .as_ref()
            .map(ViewState::visible_pages)
            .unwrap_or_default()
    }

    /// Last published viewport composite
    #[must_use]
    pub fn current_image(&self) -> Option<&LoadedImage> {
        self.current_image.as_ref()
    }

    /// Cached base page for `page` at the current viewport width
    pub fn base_page(&mut self, page: usize) -> Option<BasePage> {
        let key = self.base_key(page)?;
        self.base_pages.get(&key)
    }

    /// Apply a command to the view state
    pub fn apply_command(&mut self, cmd: Command) {
        if self.display.is_terminal() {
            return;
        }
        let Some(state) = self.state.as_mut() else {
            debug!("Ignoring {cmd:?} before the document is loaded");
            return;
        };
        let effects = state.apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RequestViewport(transforms) => {
                    let id = self.next_id();
                    self.latest_viewport = Some(id);
                    let top_offset = transforms.first().map_or(0, |t| t.top_gap);
                    let _ = self.job_tx.send(Job::Viewport {
                        id,
                        transforms,
                        page_spacing: self.config.page_spacing,
                        top_offset,
                    });
                }

                Effect::ClearViewport => {
                    self.latest_viewport = None;
                    if let Some(image) = self.current_image.take() {
                        self.free_buffer(image.buffer);
                    }
                    self.display = DisplayState::Idle;
                }

                Effect::RequestBasePages(pages) => {
                    for page in pages {
                        self.request_base_page(page);
                    }
                }

                Effect::ReleaseBasePages => {
                    self.pending_pages.clear();
                    for buffer in self.base_pages.invalidate_all() {
                        self.free_buffer(buffer);
                    }
                    // Sized for the old width, unlikely to be reused.
                    let released = self
                        .pool
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .release_free_page_buffers();
                    if released > 0 {
                        debug!("Released {released} page buffers after a width change");
                    }
                }

                Effect::ScrollExternalLayout {
                    page,
                    offset,
                    scroll_x,
                } => {
                    self.events.push_back(ViewEvent::ScrollLayoutTo {
                        page,
                        offset,
                        scroll_x,
                    });
                }
            }
        }
    }

    fn base_key(&self, page: usize) -> Option<CacheKey> {
        let state = self.state.as_ref()?;
        Some(CacheKey {
            page,
            width: state.zoom().viewport().width as i32,
        })
    }

    fn request_base_page(&mut self, page: usize) {
        let Some(key) = self.base_key(page) else {
            return;
        };
        if self.base_pages.contains(&key) || self.pending_pages.values().any(|k| *k == key) {
            return;
        }
        let Some(ratio) = self.state.as_ref().and_then(|s| s.layout().aspect_ratio(page)) else {
            return;
        };

        let id = self.next_id();
        let transform = PageTransform::full_page(page as i32, key.width, ratio, 1.0);
        let _ = self.job_tx.send(Job::Page { id, transform });
        self.pending_pages.insert(id, key);
    }

    /// Drain finished renders and return the events they produced.
    pub fn poll(&mut self) -> Vec<ViewEvent> {
        while let Ok(result) = self.result_rx.try_recv() {
            self.handle_result(result);
        }
        self.events.drain(..).collect()
    }

    /// Like [`RenderService::poll`], waiting up to `timeout` for the first result.
    pub fn poll_blocking(&mut self, timeout: Duration) -> Vec<ViewEvent> {
        if self.events.is_empty() {
            match self.result_rx.recv_timeout(timeout) {
                Ok(result) => self.handle_result(result),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
            }
        }
        self.poll()
    }

    /// True while a viewport or base page render is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        let viewport_pending = self
            .latest_viewport
            .is_some_and(|id| self.answered != Some(id));
        viewport_pending || !self.pending_pages.is_empty()
    }

    fn handle_result(&mut self, result: JobResult) {
        match result {
            JobResult::Viewport {
                id,
                requested,
                response,
                buffer,
                info,
            } => {
                let latest = self
                    .state
                    .as_ref()
                    .is_some_and(|s| s.requested_transforms() == requested.as_slice());
                if self.latest_viewport != Some(id) || !latest {
                    debug!("Dropping stale viewport render {id:?}");
                    self.free_buffer(buffer);
                    return;
                }

                let complete = response.is_complete_for(&requested);
                let painted = response.transforms.len();
                let image = LoadedImage {
                    buffer,
                    info,
                    transforms: response.transforms,
                };
                self.answered = Some(id);
                if let Some(previous) = self.current_image.replace(image.clone()) {
                    if previous.buffer != buffer {
                        self.free_buffer(previous.buffer);
                    }
                }
                self.events.push_back(ViewEvent::ImageLoaded(image));

                self.display = if complete {
                    DisplayState::Displaying(self.visible_pages())
                } else {
                    warn!("Viewport render {id:?} painted {painted} of {} slices", requested.len());
                    DisplayState::Error(Arc::new(ViewError::Partial {
                        painted,
                        requested: requested.len(),
                    }))
                };
            }

            JobResult::Page {
                id,
                transform,
                buffer,
                dimensions,
            } => {
                let Some(key) = self.pending_pages.remove(&id) else {
                    debug!("Dropping released base page {}", transform.page_index);
                    self.free_buffer(buffer);
                    return;
                };
                let base = BasePage { buffer, dimensions };
                if let Some(unused) = self.base_pages.insert(key, base) {
                    self.free_buffer(unused);
                }
                self.events.push_back(ViewEvent::BasePageLoaded {
                    page: key.page,
                    base,
                });
            }

            JobResult::Failed { id, error } => {
                if let Some(key) = self.pending_pages.remove(&id) {
                    warn!("Base page {} failed: {error}", key.page);
                } else if self.latest_viewport == Some(id) {
                    // The worker painted into a spare buffer, the last good
                    // image is intact.
                    self.answered = Some(id);
                    self.display = DisplayState::Error(Arc::new(ViewError::Render { id, source: error }));
                } else {
                    debug!("Ignoring failure of stale render {id:?}: {error}");
                }
            }

            JobResult::Superseded(id) => {
                debug!("Render {id:?} superseded");
            }
        }
    }

    /// Borrow the pixels of a pooled buffer.
    pub fn with_pixels<R>(
        &self,
        buffer: BufferId,
        f: impl FnOnce(&[u8], BufferDimensions) -> R,
    ) -> Result<R, BufferError> {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = pool.get(buffer).ok_or(BufferError::Unknown(buffer.0))?;
        Ok(f(buffer.pixels()?, buffer.dimensions()))
    }

    fn free_buffer(&self, buffer: BufferId) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = pool.free(buffer) {
            debug!("Could not free buffer {buffer:?}: {e}");
        }
    }

    /// Stops the worker, closes the document and disposes every buffer.
    pub fn close(&mut self) {
        let _ = self.job_tx.send(Job::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Render worker panicked");
            }
        }
        if self.bridge.close() {
            debug!("Render service released its document");
        }
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispose_all();
        self.current_image = None;
        self.latest_viewport = None;
        self.pending_pages.clear();
        self.base_pages.invalidate_all();
        if !self.display.is_terminal() {
            self.display = DisplayState::Idle;
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id = id.next();
        id
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.close();
    }
}
