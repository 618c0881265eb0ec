//! Document lifecycle and serialized native access
//!
//! `Closed -> Opening -> Open | Failed`, then `Open -> Closed` on close.
//! All native calls for a document go through one mutex, and the native
//! handle is dropped exactly once no matter how many threads close.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use super::error::{OpenError, RenderError};
use super::rasterizer::PageRasterizer;

/// Aspect ratio reported for a page that cannot be loaded (roughly A4).
pub const UNREADABLE_PAGE_ASPECT_RATIO: f32 = 0.707;

/// Where document bytes come from.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Handle to an opened native document.
pub type NativeDocument = Box<dyn PageRasterizer + Send>;

/// Observable lifecycle state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentState {
    Closed,
    Opening,
    Open,
    Failed(OpenError),
}

enum Slot {
    Closed { was_opened: bool },
    Opening { close_requested: bool },
    Open(NativeDocument),
    Failed(OpenError),
}

/// One document instance. Not reopenable once closed or failed.
pub struct Document {
    slot: Mutex<Slot>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Closed { was_opened: false }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> DocumentState {
        match &*self.lock() {
            Slot::Closed { .. } => DocumentState::Closed,
            Slot::Opening { .. } => DocumentState::Opening,
            Slot::Open(_) => DocumentState::Open,
            Slot::Failed(err) => DocumentState::Failed(err.clone()),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(&*self.lock(), Slot::Open(_))
    }

    /// Opens the document with `opener`, which runs without the lock held.
    ///
    /// A close arriving while the opener runs wins: the fresh handle is
    /// dropped and `AlreadyClosed` is returned.
    pub fn open_with<F>(&self, opener: F) -> Result<(), OpenError>
    where
        F: FnOnce() -> Result<NativeDocument, OpenError>,
    {
        {
            let mut slot = self.lock();
            match &*slot {
                Slot::Closed { was_opened: false } => {}
                Slot::Closed { was_opened: true } => return Err(OpenError::AlreadyClosed),
                Slot::Opening { .. } => {
                    return Err(OpenError::Unknown("open already in progress".into()));
                }
                Slot::Open(_) => return Ok(()),
                Slot::Failed(err) => return Err(OpenError::Failed(Box::new(err.clone()))),
            }
            *slot = Slot::Opening {
                close_requested: false,
            };
        }

        let opened = opener();

        let mut slot = self.lock();
        if matches!(
            *slot,
            Slot::Opening {
                close_requested: true
            }
        ) {
            *slot = Slot::Closed { was_opened: true };
            drop(slot);
            if opened.is_ok() {
                debug!("Document closed while opening, dropping native handle");
            }
            return Err(OpenError::AlreadyClosed);
        }

        match opened {
            Ok(native) => {
                info!("Document opened with {} pages", native.page_count());
                *slot = Slot::Open(native);
                Ok(())
            }
            Err(err) => {
                warn!("Document failed to open: {err}");
                *slot = Slot::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Runs `f` against the native document under the document lock.
    pub fn with_native<R>(
        &self,
        f: impl FnOnce(&mut dyn PageRasterizer) -> Result<R, RenderError>,
    ) -> Result<R, RenderError> {
        let mut slot = self.lock();
        match &mut *slot {
            Slot::Open(native) => f(native.as_mut()),
            _ => Err(RenderError::NotOpen),
        }
    }

    pub fn page_count(&self) -> Result<usize, RenderError> {
        self.with_native(|native| Ok(native.page_count()))
    }

    /// Width/height ratio of `page`.
    ///
    /// Non-positive dimensions give 1.0, an unreadable page 0.707.
    pub fn aspect_ratio(&self, page: usize) -> Result<f32, RenderError> {
        self.with_native(|native| Ok(ratio_of(native, page)))
    }

    /// Aspect ratio of every page, in order.
    pub fn page_ratios(&self) -> Result<Vec<f32>, RenderError> {
        self.with_native(|native| {
            let native: &dyn PageRasterizer = native;
            Ok((0..native.page_count())
                .map(|page| ratio_of(native, page))
                .collect())
        })
    }

    /// Closes the document. Returns true for the call that released the
    /// native handle; later calls are no-ops.
    pub fn close(&self) -> bool {
        let released = {
            let mut slot = self.lock();
            if let Slot::Opening { close_requested } = &mut *slot {
                *close_requested = true;
                return false;
            }
            if !matches!(*slot, Slot::Open(_)) {
                return false;
            }
            std::mem::replace(&mut *slot, Slot::Closed { was_opened: true })
        };

        drop(released);
        info!("Document closed");
        true
    }
}

fn ratio_of(native: &dyn PageRasterizer, page: usize) -> f32 {
    match native.page_size(page) {
        Ok((width, height)) if width > 0.0 && height > 0.0 => width / height,
        Ok(_) => 1.0,
        Err(err) => {
            warn!("Failed to read size of page {page}: {err}");
            UNREADABLE_PAGE_ASPECT_RATIO
        }
    }
}
