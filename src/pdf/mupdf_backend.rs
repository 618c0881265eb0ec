//! MuPDF rasterizer
//!
//! Pages are drawn through a draw device into an RGB pixmap covering only
//! the clip rectangle, then converted to BGRA into the target rows.

use std::path::Path;

use log::debug;
use mupdf::{Colorspace, Device, Document, IRect, Matrix, Pixmap};
use rayon::prelude::*;

use super::bridge::Backend;
use super::document::{DocumentSource, NativeDocument};
use super::error::{OpenError, RenderError};
use super::rasterizer::{Bitmap, ClipRect, PageRasterizer};

/// Clips with fewer pixels than this are converted on the calling thread.
const PARALLEL_BLIT_MIN_PIXELS: i32 = 256 * 256;

/// Opens documents with MuPDF.
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfBackend;

impl Backend for MupdfBackend {
    fn open(&self, source: &DocumentSource) -> Result<NativeDocument, OpenError> {
        let doc = match source {
            DocumentSource::Path(path) => open_path(path)?,
            DocumentSource::Bytes(bytes) => {
                Document::from_bytes(bytes, "application/pdf").map_err(classify_open_error)?
            }
        };

        if doc.needs_password().map_err(classify_open_error)? {
            return Err(OpenError::Password);
        }

        let page_count = doc.page_count().map_err(classify_open_error)?;
        debug!("MuPDF opened {source:?} with {page_count} pages");

        Ok(Box::new(MupdfDocument {
            doc,
            page_count: page_count.max(0) as usize,
        }))
    }
}

fn open_path(path: &Path) -> Result<Document, OpenError> {
    if let Err(e) = std::fs::metadata(path) {
        return Err(OpenError::File(format!("{}: {e}", path.display())));
    }
    Document::open(path.to_string_lossy().as_ref()).map_err(classify_open_error)
}

fn classify_open_error(err: mupdf::error::Error) -> OpenError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("password") {
        OpenError::Password
    } else if lower.contains("security") || lower.contains("encrypt") {
        OpenError::UnsupportedSecurityScheme
    } else if lower.contains("cannot open") || lower.contains("no such file") {
        OpenError::File(message)
    } else {
        OpenError::Format(message)
    }
}

fn page_error(page: usize, err: mupdf::error::Error) -> RenderError {
    RenderError::Page {
        page,
        detail: err.to_string(),
    }
}

/// An open MuPDF document.
pub struct MupdfDocument {
    doc: Document,
    page_count: usize,
}

// SAFETY: MuPDF objects are only touched through the owning `Document`
// wrapper, which serializes every call behind its mutex.
unsafe impl Send for MupdfDocument {}

impl MupdfDocument {
    fn check_page(&self, page: usize) -> Result<i32, RenderError> {
        if page >= self.page_count {
            return Err(RenderError::Page {
                page,
                detail: format!("document has {} pages", self.page_count),
            });
        }
        Ok(page as i32)
    }
}

impl PageRasterizer for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Result<(f32, f32), RenderError> {
        let index = self.check_page(page)?;
        let loaded = self.doc.load_page(index).map_err(|e| page_error(page, e))?;
        let bounds = loaded.bounds().map_err(|e| page_error(page, e))?;
        Ok((bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn paint_page(
        &mut self,
        page: usize,
        scaled: (i32, i32),
        origin: (i32, i32),
        clip: ClipRect,
        target: &mut Bitmap<'_>,
    ) -> Result<(), RenderError> {
        let clip = clip.intersect(&target.bounds());
        if clip.is_empty() {
            return Ok(());
        }

        let index = self.check_page(page)?;
        let loaded = self.doc.load_page(index).map_err(|e| page_error(page, e))?;
        let bounds = loaded.bounds().map_err(|e| page_error(page, e))?;
        let page_w = bounds.x1 - bounds.x0;
        let page_h = bounds.y1 - bounds.y0;
        if page_w <= 0.0 || page_h <= 0.0 {
            return Ok(());
        }

        // Page space to target space: scale to the slice size, then move the
        // page's top-left corner to `origin`.
        let sx = scaled.0 as f32 / page_w;
        let sy = scaled.1 as f32 / page_h;
        let ctm = Matrix::new(
            sx,
            0.0,
            0.0,
            sy,
            origin.0 as f32 - bounds.x0 * sx,
            origin.1 as f32 - bounds.y0 * sy,
        );

        let rect = IRect::new(clip.x, clip.y, clip.right(), clip.bottom());
        let mut pixmap = Pixmap::new_with_rect(&Colorspace::device_rgb(), rect, false)
            .map_err(|e| page_error(page, e))?;
        pixmap.clear_with(255).map_err(|e| page_error(page, e))?;
        {
            let device = Device::from_pixmap(&pixmap).map_err(|e| page_error(page, e))?;
            loaded.run(&device, &ctm).map_err(|e| page_error(page, e))?;
        }

        blit_rgb_to_bgra(&pixmap, clip, target);
        Ok(())
    }
}

/// Copies an RGB(A) pixmap covering `clip` into `target` as opaque BGRA.
fn blit_rgb_to_bgra(pixmap: &Pixmap, clip: ClipRect, target: &mut Bitmap<'_>) {
    let n = pixmap.n() as usize;
    let src_stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let dst_stride = target.stride();
    let x0 = clip.x as usize * 4;
    let width = clip.width as usize;

    let start = clip.y as usize * dst_stride;
    let end = clip.bottom() as usize * dst_stride;
    let rows = &mut target.pixels_mut()[start..end];

    let copy_row = |(dst, src): (&mut [u8], &[u8])| {
        let dst = &mut dst[x0..x0 + width * 4];
        for (out, px) in dst.chunks_exact_mut(4).zip(src.chunks_exact(n)) {
            out[0] = px[2];
            out[1] = px[1];
            out[2] = px[0];
            out[3] = 0xFF;
        }
    };

    if clip.width * clip.height >= PARALLEL_BLIT_MIN_PIXELS {
        rows.par_chunks_mut(dst_stride)
            .zip(samples.par_chunks(src_stride))
            .for_each(copy_row);
    } else {
        rows.chunks_mut(dst_stride)
            .zip(samples.chunks(src_stride))
            .for_each(copy_row);
    }
}
