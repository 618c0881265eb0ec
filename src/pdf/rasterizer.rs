//! Compositing page slices into one destination buffer
//!
//! The destination is cleared to the background, then every slice is
//! stacked top to bottom: advance by the slice's gap, fill the slice area
//! with the page colour and paint the page shifted up and left by its
//! cutoffs, clipped to the slice.

use log::warn;

use super::error::RenderError;
use super::request::{RenderRequest, RenderResponse};
use super::types::{BYTES_PER_PIXEL, BufferDimensions, PageTransform, transforms_size};

/// Fill for everything outside page slices (transparent black, BGRA).
pub const BACKGROUND: u32 = 0x0000_0000;

/// Fill under every page slice (opaque white, BGRA).
pub const PAGE_FILL: u32 = 0xFFFF_FFFF;

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ClipRect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[must_use]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    #[must_use]
    pub fn intersect(&self, other: &ClipRect) -> ClipRect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        ClipRect::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }
}

/// Mutable view of BGRA pixel rows.
#[derive(Debug)]
pub struct Bitmap<'a> {
    pixels: &'a mut [u8],
    dimensions: BufferDimensions,
}

impl<'a> Bitmap<'a> {
    /// Wraps `pixels`, checking they can hold `dimensions`.
    pub fn new(pixels: &'a mut [u8], dimensions: BufferDimensions) -> Result<Self, RenderError> {
        let BufferDimensions {
            width,
            height,
            stride,
        } = dimensions;
        if width <= 0 || height <= 0 {
            return Err(RenderError::EmptyTarget);
        }
        if stride < width * BYTES_PER_PIXEL || pixels.len() < dimensions.byte_len() {
            return Err(RenderError::TargetTooSmall {
                width,
                height,
                stride,
                needed_width: width,
                needed_height: height,
            });
        }
        Ok(Self { pixels, dimensions })
    }

    #[must_use]
    pub fn dimensions(&self) -> BufferDimensions {
        self.dimensions
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.dimensions.width
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.dimensions.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.dimensions.stride as usize
    }

    /// All rows, including any stride padding.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels[..self.dimensions.byte_len()]
    }

    #[must_use]
    pub fn bounds(&self) -> ClipRect {
        ClipRect::new(0, 0, self.width(), self.height())
    }

    /// Pixel bytes of row `y`, `width * 4` long.
    pub fn row_mut(&mut self, y: i32) -> &mut [u8] {
        let stride = self.dimensions.stride as usize;
        let start = y as usize * stride;
        &mut self.pixels[start..start + self.dimensions.width as usize * BYTES_PER_PIXEL as usize]
    }

    pub fn fill(&mut self, color: u32) {
        let bounds = self.bounds();
        self.fill_rect(bounds, color);
    }

    /// Fills `rect`, clipped to the bitmap.
    pub fn fill_rect(&mut self, rect: ClipRect, color: u32) {
        let rect = rect.intersect(&self.bounds());
        if rect.is_empty() {
            return;
        }
        let bytes = color.to_le_bytes();
        let bpp = BYTES_PER_PIXEL as usize;
        for y in rect.y..rect.bottom() {
            let row = self.row_mut(y);
            for px in row[rect.x as usize * bpp..rect.right() as usize * bpp].chunks_exact_mut(bpp) {
                px.copy_from_slice(&bytes);
            }
        }
    }

    /// Pixel at `(x, y)` as a BGRA word.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> u32 {
        let offset = y as usize * self.dimensions.stride as usize + x as usize * 4;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.pixels[offset..offset + 4]);
        u32::from_le_bytes(word)
    }
}

/// Draws document pages into bitmaps.
pub trait PageRasterizer {
    fn page_count(&self) -> usize;

    /// Unscaled page size in points.
    fn page_size(&self, page: usize) -> Result<(f32, f32), RenderError>;

    /// Paints `page` scaled to `scaled` pixels with its top-left corner at
    /// `origin` in target coordinates. Pixels outside `clip` are untouched.
    fn paint_page(
        &mut self,
        page: usize,
        scaled: (i32, i32),
        origin: (i32, i32),
        clip: ClipRect,
        target: &mut Bitmap<'_>,
    ) -> Result<(), RenderError>;
}

/// Checks every slice is drawable and returns the composite size.
fn validate(request: &RenderRequest) -> Result<(i32, i32), RenderError> {
    for t in &request.transforms {
        let (width, height) = t.slice_size();
        if t.page_index < 0 || width <= 0 || height <= 0 {
            return Err(RenderError::InvalidSlice {
                page: t.page_index,
                width,
                height,
            });
        }
    }
    let (width, height) = transforms_size(&request.transforms);
    if width <= 0 || height <= 0 {
        return Err(RenderError::EmptyTarget);
    }
    Ok((width, height))
}

/// Paints every slice of `request` into `target`.
///
/// When a page fails after at least one slice was painted, the painted
/// prefix is returned and nothing below the failed slice is drawn.
pub fn composite(
    rasterizer: &mut dyn PageRasterizer,
    request: &RenderRequest,
    target: &mut Bitmap<'_>,
) -> Result<RenderResponse, RenderError> {
    let (needed_width, needed_height) = validate(request)?;
    let dims = target.dimensions();
    if dims.width < needed_width || dims.height < needed_height {
        return Err(RenderError::TargetTooSmall {
            width: dims.width,
            height: dims.height,
            stride: dims.stride,
            needed_width,
            needed_height,
        });
    }

    target.fill(BACKGROUND);

    let mut painted: Vec<PageTransform> = Vec::with_capacity(request.transforms.len());
    // `top_offset` repeats the first slice's gap, it is not an extra shift.
    let mut current_y = 0;

    for t in &request.transforms {
        current_y += t.top_gap;
        let (width, height) = t.slice_size();
        let slice = ClipRect::new(0, current_y, width, height).intersect(&target.bounds());
        target.fill_rect(slice, PAGE_FILL);

        let origin = (-t.left_cutoff, current_y - t.top_cutoff);
        let scaled = (t.scaled_width, t.scaled_height);
        if let Err(err) = rasterizer.paint_page(t.page_index as usize, scaled, origin, slice, target) {
            if painted.is_empty() {
                return Err(err);
            }
            warn!(
                "Page {} failed after {} painted slices: {err}",
                t.page_index,
                painted.len()
            );
            break;
        }

        painted.push(*t);
        current_y += height;
    }

    Ok(RenderResponse { transforms: painted })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paints page `n` as solid colour `0xFF000000 | n`, failing on `fail_on`.
    struct SolidPages {
        count: usize,
        fail_on: Option<usize>,
        calls: Vec<((i32, i32), (i32, i32), ClipRect)>,
    }

    impl SolidPages {
        fn new(count: usize) -> Self {
            Self {
                count,
                fail_on: None,
                calls: Vec::new(),
            }
        }
    }

    impl PageRasterizer for SolidPages {
        fn page_count(&self) -> usize {
            self.count
        }

        fn page_size(&self, _page: usize) -> Result<(f32, f32), RenderError> {
            Ok((100.0, 100.0))
        }

        fn paint_page(
            &mut self,
            page: usize,
            scaled: (i32, i32),
            origin: (i32, i32),
            clip: ClipRect,
            target: &mut Bitmap<'_>,
        ) -> Result<(), RenderError> {
            if self.fail_on == Some(page) {
                return Err(RenderError::Page {
                    page,
                    detail: "broken".into(),
                });
            }
            self.calls.push((scaled, origin, clip));
            let area = ClipRect::new(origin.0, origin.1, scaled.0, scaled.1).intersect(&clip);
            target.fill_rect(area, 0xFF00_0000 | page as u32);
            Ok(())
        }
    }

    fn slice(page: i32, size: i32, top: i32, bottom: i32, gap: i32) -> PageTransform {
        PageTransform {
            top_cutoff: top,
            bottom_cutoff: bottom,
            top_gap: gap,
            ..PageTransform::full_page(page, size, 1.0, 1.0)
        }
    }

    fn render(
        pages: &mut SolidPages,
        transforms: Vec<PageTransform>,
    ) -> (Result<RenderResponse, RenderError>, Vec<u8>, BufferDimensions) {
        let (w, h) = transforms_size(&transforms);
        let dims = BufferDimensions::packed(w.max(1), h.max(1));
        let mut pixels = vec![0xAAu8; dims.byte_len()];
        let request = RenderRequest::new(transforms, dims.with_address(0));
        let result = {
            let mut target = Bitmap::new(&mut pixels, dims).unwrap();
            composite(pages, &request, &mut target)
        };
        (result, pixels, dims)
    }

    fn pixel_at(pixels: &mut [u8], dims: BufferDimensions, x: i32, y: i32) -> u32 {
        Bitmap::new(pixels, dims).unwrap().pixel(x, y)
    }

    #[test]
    fn slices_stack_with_gaps() {
        let mut pages = SolidPages::new(3);
        let transforms = vec![slice(0, 10, 6, 0, 0), slice(1, 10, 0, 4, 3)];
        let (result, mut pixels, dims) = render(&mut pages, transforms.clone());
        assert_eq!(result.unwrap().transforms, transforms);
        assert_eq!(dims.height, 4 + 3 + 6);

        assert_eq!(pixel_at(&mut pixels, dims, 0, 0), 0xFF00_0000);
        assert_eq!(pixel_at(&mut pixels, dims, 9, 3), 0xFF00_0000);
        for y in 4..7 {
            assert_eq!(pixel_at(&mut pixels, dims, 5, y), BACKGROUND);
        }
        assert_eq!(pixel_at(&mut pixels, dims, 0, 7), 0xFF00_0001);
        assert_eq!(pixel_at(&mut pixels, dims, 9, 12), 0xFF00_0001);

        // Page 0 is shifted up by its top cutoff.
        assert_eq!(pages.calls[0].1, (0, -6));
        assert_eq!(pages.calls[1].1, (0, 7));
        assert_eq!(pages.calls[1].2, ClipRect::new(0, 7, 10, 6));
    }

    #[test]
    fn leading_gap_is_counted_once() {
        let mut pages = SolidPages::new(2);
        let transforms = vec![slice(1, 10, 0, 2, 5)];
        let (w, h) = transforms_size(&transforms);
        let dims = BufferDimensions::packed(w, h);
        let mut pixels = vec![0xAAu8; dims.byte_len()];
        let mut request = RenderRequest::new(transforms.clone(), dims.with_address(0));
        request.top_offset = transforms[0].top_gap;

        let result = {
            let mut target = Bitmap::new(&mut pixels, dims).unwrap();
            composite(&mut pages, &request, &mut target)
        };
        assert_eq!(result.unwrap().transforms, transforms);
        assert_eq!(dims.height, 13);
        assert_eq!(pixel_at(&mut pixels, dims, 0, 4), BACKGROUND);
        assert_eq!(pixel_at(&mut pixels, dims, 0, 5), 0xFF00_0001);
        assert_eq!(pixel_at(&mut pixels, dims, 9, 12), 0xFF00_0001);
    }

    #[test]
    fn horizontal_cutoff_shifts_origin() {
        let mut pages = SolidPages::new(1);
        let mut t = PageTransform::full_page(0, 20, 1.0, 2.0);
        t.left_cutoff = 5;
        t.right_cutoff = 5;
        let (result, _, dims) = render(&mut pages, vec![t]);
        assert!(result.is_ok());
        assert_eq!(dims.width, 10);
        assert_eq!(pages.calls[0], ((20, 20), (-5, 0), ClipRect::new(0, 0, 10, 20)));
    }

    #[test]
    fn narrower_slice_leaves_background_on_the_right() {
        let mut pages = SolidPages::new(2);
        let (result, mut pixels, dims) =
            render(&mut pages, vec![slice(0, 10, 0, 0, 0), slice(1, 6, 0, 0, 0)]);
        assert!(result.is_ok());
        assert_eq!(pixel_at(&mut pixels, dims, 5, 12), 0xFF00_0001);
        assert_eq!(pixel_at(&mut pixels, dims, 8, 12), BACKGROUND);
    }

    #[test]
    fn failure_after_first_page_returns_prefix() {
        let mut pages = SolidPages::new(3);
        pages.fail_on = Some(1);
        let transforms = vec![slice(0, 10, 0, 0, 0), slice(1, 10, 0, 0, 2)];
        let (result, mut pixels, dims) = render(&mut pages, transforms.clone());
        assert_eq!(result.unwrap().transforms, vec![transforms[0]]);
        // The failed slice keeps the white page fill.
        assert_eq!(pixel_at(&mut pixels, dims, 0, 15), PAGE_FILL);
    }

    #[test]
    fn failure_on_first_page_is_an_error() {
        let mut pages = SolidPages::new(3);
        pages.fail_on = Some(0);
        let (result, _, _) = render(&mut pages, vec![slice(0, 10, 0, 0, 0)]);
        assert!(matches!(result, Err(RenderError::Page { page: 0, .. })));
    }

    #[test]
    fn invalid_slices_are_rejected() {
        let mut pages = SolidPages::new(1);
        let (result, _, _) = render(&mut pages, vec![slice(0, 10, 6, 4, 0)]);
        assert_eq!(
            result,
            Err(RenderError::InvalidSlice {
                page: 0,
                width: 10,
                height: 0
            })
        );
        let (result, _, _) = render(&mut pages, vec![]);
        assert_eq!(result, Err(RenderError::EmptyTarget));
    }

    #[test]
    fn small_target_is_rejected() {
        let mut pages = SolidPages::new(1);
        let dims = BufferDimensions::packed(5, 5);
        let mut pixels = vec![0u8; dims.byte_len()];
        let mut target = Bitmap::new(&mut pixels, dims).unwrap();
        let request = RenderRequest::new(vec![slice(0, 10, 0, 0, 0)], dims.with_address(0));
        assert!(matches!(
            composite(&mut pages, &request, &mut target),
            Err(RenderError::TargetTooSmall {
                needed_width: 10,
                needed_height: 10,
                ..
            })
        ));
    }

    #[test]
    fn bitmap_checks_length_and_stride() {
        let mut short = vec![0u8; 10];
        assert!(Bitmap::new(&mut short, BufferDimensions::packed(2, 2)).is_err());
        let mut pixels = vec![0u8; 64];
        let padded = BufferDimensions {
            width: 2,
            height: 2,
            stride: 16,
        };
        let mut bitmap = Bitmap::new(&mut pixels, padded).unwrap();
        bitmap.fill(PAGE_FILL);
        assert_eq!(bitmap.pixel(1, 1), PAGE_FILL);
        // Row padding is left alone.
        assert_eq!(pixels[8..16], [0u8; 8]);
    }

    #[test]
    fn clip_intersection() {
        let a = ClipRect::new(0, 0, 10, 10);
        assert_eq!(a.intersect(&ClipRect::new(5, -5, 10, 10)), ClipRect::new(5, 0, 5, 5));
        assert!(a.intersect(&ClipRect::new(20, 20, 5, 5)).is_empty());
    }
}
