use pdfslice::pdf::wire::{self, FloatList};
use pdfslice::pdf::{
    BufferDimensions, Offset, PageLayout, PageTransform, RenderRequest, ViewportSize, Zoom,
};
use proptest::prelude::*;

const EPS: f32 = 2.0;

fn layout_strategy() -> impl Strategy<Value = (Vec<f32>, i32)> {
    (prop::collection::vec(0.3f32..3.0, 1..30), 0i32..40)
}

proptest! {
    #[test]
    fn visible_slices_tile_the_viewport(
        (ratios, spacing) in layout_strategy(),
        width in 50f32..800.0,
        height in 50f32..1200.0,
        scale in 1f32..5.0,
        scroll_fraction in 0f32..=1.0,
    ) {
        let layout = PageLayout::new(ratios.clone(), spacing);
        let viewport = ViewportSize::new(width, height);
        let y = layout.max_scroll_y(viewport, scale) * scroll_fraction;
        let visible = layout.visible_pages(y, 0.0, viewport, scale);
        prop_assert!(!visible.is_empty());

        let scaled_spacing = layout.scaled_spacing(scale) as f32;
        let mut previous_bottom: Option<f32> = None;
        for (i, info) in visible.iter().enumerate() {
            if i > 0 {
                prop_assert_eq!(info.page_index, visible[i - 1].page_index + 1);
            }
            let page_top = layout.page_offset_y(info.page_index, viewport, scale);
            let slice_top = page_top + info.top_cutoff;
            let slice_bottom = page_top + info.scaled_height - info.bottom_cutoff;
            prop_assert!(slice_bottom > slice_top);
            prop_assert!(slice_top >= y - EPS);
            prop_assert!(slice_bottom <= y + height + EPS);

            match previous_bottom {
                None => {
                    let expected_gap = (page_top - y).max(0.0);
                    prop_assert!((info.top_gap as f32 - expected_gap).abs() < EPS);
                }
                Some(bottom) => {
                    prop_assert_eq!(info.top_gap as f32, scaled_spacing);
                    prop_assert!((slice_top - bottom - scaled_spacing).abs() < EPS);
                }
            }
            previous_bottom = Some(slice_bottom);
        }

        let last = visible.last().unwrap();
        let last_bottom = layout.page_offset_y(last.page_index, viewport, scale) + last.scaled_height;
        let covered_to = previous_bottom.unwrap();
        prop_assert!((covered_to - (y + height).min(last_bottom)).abs() < EPS);
        if last.page_index + 1 < ratios.len() {
            let next_top = layout.page_offset_y(last.page_index + 1, viewport, scale);
            prop_assert!(next_top >= y + height - EPS);
        }
    }

    #[test]
    fn zoom_by_one_changes_nothing(
        (ratios, spacing) in layout_strategy(),
        scale in 1f32..5.0,
        scroll_fraction in 0f32..=1.0,
        cx in -500f32..1500.0,
        cy in -500f32..1500.0,
    ) {
        let mut zoom = Zoom::new(PageLayout::new(ratios, spacing), ViewportSize::new(600.0, 900.0));
        zoom.set_zoom(scale);
        zoom.pan(Offset::new(0.0, -zoom.max_scroll_y() * scroll_fraction));
        let before = (zoom.factor(), zoom.scroll_x(), zoom.scroll_y());

        prop_assert!(!zoom.zoom(1.0, Offset::new(cx, cy)));
        prop_assert_eq!(before, (zoom.factor(), zoom.scroll_x(), zoom.scroll_y()));
    }

    #[test]
    fn zoom_stays_in_limits(factors in prop::collection::vec(0.1f32..10.0, 1..20)) {
        let mut zoom = Zoom::new(PageLayout::new(vec![0.7; 5], 8), ViewportSize::new(600.0, 900.0));
        for factor in factors {
            zoom.zoom(factor, Offset::new(300.0, 450.0));
            prop_assert!((Zoom::MIN_SCALE..=Zoom::MAX_SCALE).contains(&zoom.factor()));
            prop_assert!(zoom.scroll_y() <= zoom.max_scroll_y() + 0.01);
            prop_assert!(zoom.scroll_x() <= zoom.max_scroll_x() + 0.01);
        }
    }

    #[test]
    fn uncut_is_idempotent(transform in transform_strategy()) {
        prop_assert_eq!(transform.uncut().uncut(), transform.uncut());
        prop_assert_eq!(transform.uncut().slice_size(), (transform.scaled_width, transform.scaled_height));
    }

    #[test]
    fn transforms_survive_the_wire(transform in transform_strategy()) {
        let decoded: PageTransform = wire::from_bytes(&wire::to_bytes(&transform)).unwrap();
        prop_assert_eq!(decoded, transform);
    }

    #[test]
    fn requests_survive_the_wire(
        transforms in prop::collection::vec(transform_strategy(), 0..6),
        page_spacing in any::<i32>(),
        top_offset in any::<i32>(),
        address in any::<u64>(),
        width in 0i32..5000,
        height in 0i32..5000,
    ) {
        let request = RenderRequest {
            transforms,
            page_spacing,
            top_offset,
            buffer: BufferDimensions::packed(width, height).with_address(address),
        };
        let decoded: RenderRequest = wire::from_bytes(&wire::to_bytes(&request)).unwrap();
        prop_assert_eq!(decoded, request);
    }

    #[test]
    fn float_lists_survive_the_wire(values in prop::collection::vec(-1.0e6f32..1.0e6, 0..64)) {
        let bytes = wire::pack_floats(&values);
        prop_assert_eq!(bytes.len(), values.len() * 4);
        prop_assert_eq!(wire::unpack_floats(&bytes).unwrap(), values.clone());
        let list: FloatList = wire::from_bytes(&bytes).unwrap();
        prop_assert_eq!(list.0, values);
    }

    #[test]
    fn truncated_requests_are_rejected(
        transforms in prop::collection::vec(transform_strategy(), 1..4),
        cut in 1usize..16,
    ) {
        let request = RenderRequest::new(transforms, BufferDimensions::packed(10, 10).with_address(64));
        let bytes = wire::to_bytes(&request);
        let truncated = &bytes[..bytes.len() - cut.min(bytes.len())];
        prop_assert!(wire::from_bytes::<RenderRequest>(truncated).is_err());
    }
}

fn transform_strategy() -> impl Strategy<Value = PageTransform> {
    (
        any::<i32>(),
        any::<[i32; 7]>(),
        prop::num::f32::NORMAL | prop::num::f32::ZERO,
    )
        .prop_map(|(page_index, v, scale)| PageTransform {
            page_index,
            top_cutoff: v[0],
            bottom_cutoff: v[1],
            left_cutoff: v[2],
            right_cutoff: v[3],
            scaled_width: v[4],
            scaled_height: v[5],
            top_gap: v[6],
            scale,
        })
}
