use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pdfslice::pdf::{
    BACKGROUND, Backend, Bitmap, ClipRect, DocumentSource, LoadedImage, NativeDocument, OpenError,
    PageRasterizer, RenderError, ViewError, ViewportSize, WorkerConfig,
};
use pdfslice::{Command, DisplayState, RenderService, ServiceConfig, ViewEvent};

const NO_FAILURE: usize = usize::MAX;

/// Page `n` is a solid 100x100 square of color `page_color(n)`.
struct ColoredPages {
    pages: usize,
    failing_page: Arc<AtomicUsize>,
}

fn page_color(page: usize) -> u32 {
    0xFF00_0000 | (page as u32 + 1) * 0x10
}

impl PageRasterizer for ColoredPages {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_size(&self, _page: usize) -> Result<(f32, f32), RenderError> {
        Ok((100.0, 100.0))
    }

    fn paint_page(
        &mut self,
        page: usize,
        _scaled: (i32, i32),
        _origin: (i32, i32),
        clip: ClipRect,
        target: &mut Bitmap<'_>,
    ) -> Result<(), RenderError> {
        if page == self.failing_page.load(Ordering::SeqCst) {
            return Err(RenderError::Page {
                page,
                detail: "damaged content stream".into(),
            });
        }
        target.fill_rect(clip, page_color(page));
        Ok(())
    }
}

struct ColoredBackend {
    failing_page: Arc<AtomicUsize>,
}

impl Backend for ColoredBackend {
    fn open(&self, source: &DocumentSource) -> Result<NativeDocument, OpenError> {
        match source {
            DocumentSource::Path(path) => Err(OpenError::File(path.display().to_string())),
            DocumentSource::Bytes(_) => Ok(Box::new(ColoredPages {
                pages: 10,
                failing_page: Arc::clone(&self.failing_page),
            })),
        }
    }
}

struct Fixture {
    service: RenderService,
    failing_page: Arc<AtomicUsize>,
}

fn open_service(failing_page: usize) -> Fixture {
    let failing_page = Arc::new(AtomicUsize::new(failing_page));
    let config = ServiceConfig {
        page_spacing: 10,
        worker: WorkerConfig::with_debounce(Duration::from_millis(5)),
        ..ServiceConfig::default()
    };
    let mut service = RenderService::new(
        Box::new(ColoredBackend {
            failing_page: Arc::clone(&failing_page),
        }),
        config,
    );
    service
        .load(
            &DocumentSource::Bytes(b"%PDF-1.7".to_vec()),
            ViewportSize::new(100.0, 150.0),
        )
        .unwrap();
    Fixture {
        service,
        failing_page,
    }
}

/// Polls until no render is outstanding, returning every event seen.
fn settle(service: &mut RenderService) -> Vec<ViewEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    loop {
        events.extend(service.poll_blocking(Duration::from_millis(20)));
        if !service.is_busy() {
            events.extend(service.poll());
            return events;
        }
        assert!(Instant::now() < deadline, "renders did not settle");
    }
}

fn loaded_images(events: &[ViewEvent]) -> Vec<&LoadedImage> {
    events
        .iter()
        .filter_map(|e| match e {
            ViewEvent::ImageLoaded(image) => Some(image),
            _ => None,
        })
        .collect()
}

fn pixel(service: &RenderService, image: &LoadedImage, x: usize, y: usize) -> u32 {
    service
        .with_pixels(image.buffer, |pixels, dims| {
            let offset = y * dims.stride as usize + x * 4;
            u32::from_le_bytes([
                pixels[offset],
                pixels[offset + 1],
                pixels[offset + 2],
                pixels[offset + 3],
            ])
        })
        .unwrap()
}

#[test]
fn first_viewport_is_composited_with_gaps() {
    let Fixture { mut service, .. } = open_service(NO_FAILURE);
    let events = settle(&mut service);

    assert!(events.contains(&ViewEvent::ScrollLayoutTo {
        page: 0,
        offset: 0,
        scroll_x: 0.0
    }));
    let images = loaded_images(&events);
    assert_eq!(images.len(), 1);
    let image = images[0];

    // 100px of page 0, a 10px gap, then the top 40px of page 1.
    assert_eq!(image.info.dimensions.width, 100);
    assert_eq!(image.info.dimensions.height, 150);
    assert_eq!(image.transforms[1].top_gap, 10);
    assert_eq!(image.transforms[1].bottom_cutoff, 60);

    assert_eq!(pixel(&service, image, 0, 0), page_color(0));
    assert_eq!(pixel(&service, image, 99, 99), page_color(0));
    assert_eq!(pixel(&service, image, 50, 105), BACKGROUND);
    assert_eq!(pixel(&service, image, 50, 110), page_color(1));
    assert_eq!(pixel(&service, image, 50, 149), page_color(1));

    match service.display_state() {
        DisplayState::Displaying(pages) => {
            let indices: Vec<usize> = pages.iter().map(|p| p.page_index).collect();
            assert_eq!(indices, vec![0, 1]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn rapid_pans_publish_only_the_latest_position() {
    let Fixture { mut service, .. } = open_service(NO_FAILURE);
    settle(&mut service);

    for _ in 0..10 {
        service.apply_command(Command::Pan(pdfslice::pdf::Offset::new(0.0, -3.0)));
    }
    let events = settle(&mut service);

    let image = service.current_image().unwrap();
    assert_eq!(image.transforms[0].top_cutoff, 30);
    assert_eq!(
        image.transforms,
        service.view_state().unwrap().requested_transforms()
    );
    for published in loaded_images(&events) {
        assert_eq!(published.transforms, image.transforms);
    }
}

#[test]
fn failed_render_keeps_the_last_image() {
    let Fixture {
        mut service,
        failing_page,
    } = open_service(NO_FAILURE);
    settle(&mut service);
    let good = service.current_image().unwrap().clone();
    assert_eq!(pixel(&service, &good, 0, 0), page_color(0));

    failing_page.store(3, Ordering::SeqCst);
    service.apply_command(Command::ScrollToPage(3));
    let events = settle(&mut service);

    assert!(loaded_images(&events).is_empty());
    assert_eq!(service.current_image(), Some(&good));
    // The failed composite went into another buffer.
    assert_eq!(pixel(&service, &good, 0, 0), page_color(0));
    assert_eq!(pixel(&service, &good, 50, 105), BACKGROUND);
    assert_eq!(pixel(&service, &good, 50, 149), page_color(1));
    match service.display_state().error() {
        Some(ViewError::Render { source, .. }) => {
            assert!(source.to_string().contains("damaged"));
        }
        other => panic!("unexpected {other:?}"),
    }

    failing_page.store(NO_FAILURE, Ordering::SeqCst);
    service.apply_command(Command::ScrollToPage(5));
    settle(&mut service);
    assert!(matches!(service.display_state(), DisplayState::Displaying(_)));
    assert_eq!(service.current_image().unwrap().transforms[0].page_index, 5);
}

#[test]
fn scrolling_into_the_spacing_renders_the_leading_gap() {
    let Fixture { mut service, .. } = open_service(NO_FAILURE);
    settle(&mut service);

    service.apply_command(Command::Pan(pdfslice::pdf::Offset::new(0.0, -105.0)));
    settle(&mut service);

    assert!(matches!(service.display_state(), DisplayState::Displaying(_)));
    let image = service.current_image().unwrap().clone();
    let pages: Vec<usize> = image.transforms.iter().map(|t| t.page_index as usize).collect();
    assert_eq!(pages, vec![1, 2]);
    assert_eq!(image.transforms[0].top_gap, 5);
    assert_eq!(image.info.dimensions.height, 150);

    for y in 0..5 {
        assert_eq!(pixel(&service, &image, 50, y), BACKGROUND);
    }
    assert_eq!(pixel(&service, &image, 50, 5), page_color(1));
    assert_eq!(pixel(&service, &image, 50, 104), page_color(1));
    assert_eq!(pixel(&service, &image, 50, 110), BACKGROUND);
    assert_eq!(pixel(&service, &image, 50, 115), page_color(2));
}

#[test]
fn partial_render_is_shown_with_an_error() {
    let Fixture { mut service, .. } = open_service(1);
    let events = settle(&mut service);

    let images = loaded_images(&events);
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].transforms.len(), 1);
    assert_eq!(images[0].transforms[0].page_index, 0);
    assert!(matches!(
        service.display_state().error(),
        Some(ViewError::Partial {
            painted: 1,
            requested: 2
        })
    ));
}

#[test]
fn open_failure_blocks_further_commands() {
    let mut service = RenderService::new(
        Box::new(ColoredBackend {
            failing_page: Arc::new(AtomicUsize::new(NO_FAILURE)),
        }),
        ServiceConfig::default(),
    );
    let err = service
        .load(
            &DocumentSource::Path("/missing.pdf".into()),
            ViewportSize::new(100.0, 150.0),
        )
        .unwrap_err();
    assert!(matches!(*err, ViewError::Open(OpenError::File(_))));

    service.apply_command(Command::ScrollToPage(2));
    assert!(service.poll().is_empty());
    assert!(!service.is_busy());
    assert!(service.view_state().is_none());
}

#[test]
fn zooming_pre_renders_base_pages() {
    let Fixture { mut service, .. } = open_service(NO_FAILURE);
    settle(&mut service);

    service.apply_command(Command::Zoom {
        factor: 2.0,
        centroid: pdfslice::pdf::Offset::ZERO,
    });
    let events = settle(&mut service);

    let base_pages: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ViewEvent::BasePageLoaded { page, .. } => Some(*page),
            _ => None,
        })
        .collect();
    assert_eq!(base_pages, vec![0]);

    let image = service.current_image().unwrap();
    assert_eq!(image.transforms.len(), 1);
    assert_eq!(image.transforms[0].scaled_width, 200);
    assert_eq!(image.transforms[0].right_cutoff, 100);
    assert_eq!(image.transforms[0].bottom_cutoff, 50);

    // Same width, so the cached base page is reused.
    service.apply_command(Command::SetZoom(3.0));
    let events = settle(&mut service);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ViewEvent::BasePageLoaded { .. }))
    );
    assert!(service.base_page(0).is_some());

    service.apply_command(Command::SetViewport(ViewportSize::new(80.0, 150.0)));
    assert!(service.base_page(0).is_none());
}
