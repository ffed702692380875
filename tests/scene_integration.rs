//! Integration tests for damage tracking and the paint cycle of the scene

use std::cell::RefCell;
use std::rc::Rc;

use tessera::geometry::{PointF, Rect, RectF, Region, Size, SizeF};
use tessera::renderer::{OutputFrame, PaintOutcome, RenderTarget, SoftwareRenderer};
use tessera::scene::{
    view_damage, BufferFormat, GraphicsBuffer, ItemId, ItemKind, Scene, SceneEvent,
    SceneSettings, SurfaceItem, ViewId,
};

fn scene() -> Scene {
    Scene::new(Box::new(SoftwareRenderer::new()), SceneSettings::default())
}

fn buffer(size: Size, rgba: [u8; 4]) -> Rc<GraphicsBuffer> {
    Rc::new(GraphicsBuffer::solid(size, BufferFormat::Xrgb8888, rgba))
}

/// Maps a window holding a single surface of `size` at `position`
fn map_window(scene: &mut Scene, position: PointF, size: Size, rgba: [u8; 4]) -> (ItemId, ItemId) {
    let root = scene.tree().root();
    let window = scene.create_item(root, ItemKind::Container).unwrap();
    let surface = scene
        .create_item(window, ItemKind::Surface(SurfaceItem::new()))
        .unwrap();
    scene.set_position(window, position).unwrap();
    scene.set_size(window, SizeF::from(size)).unwrap();
    scene.set_size(surface, SizeF::from(size)).unwrap();
    scene
        .commit_buffer(surface, Some(buffer(size, rgba)), &Region::from_rect(Rect::from_size(size)))
        .unwrap();
    (window, surface)
}

fn run_frame(scene: &mut Scene, view: ViewId, target: &mut RenderTarget) -> (Region, PaintOutcome) {
    let region = scene.pre_paint(view).unwrap();
    let outcome = scene.paint(view, target, &region).unwrap();
    scene.post_paint(view).unwrap();
    scene.frame(view, &OutputFrame::default()).unwrap();
    (region, outcome)
}

#[test]
fn test_damage_at_matching_scale_is_not_padded() {
    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 200.0, 200.0), 1.0)
        .unwrap();
    let (_, surface) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(100, 100), [255, 0, 0, 255]);
    let mut target = RenderTarget::new(200, 200).unwrap();
    run_frame(&mut scene, view, &mut target);

    scene
        .add_surface_damage(surface, &Region::from_rect(Rect::new(0, 0, 50, 50)))
        .unwrap();

    let repaints = scene.item(surface).unwrap().device_repaints(view).unwrap();
    assert_eq!(repaints.rects(), &[Rect::new(0, 0, 50, 50)]);

    let region = scene.pre_paint(view).unwrap();
    assert_eq!(region.rects(), &[Rect::new(0, 0, 50, 50)]);
}

#[test]
fn test_damage_padded_on_scale_mismatch() {
    let damage = Region::from_rect(Rect::new(0, 0, 50, 50));
    assert_eq!(view_damage(&damage, 1.5, (1.0, 1.0)).rects(), &[Rect::new(-1, -1, 52, 52)]);
    assert_eq!(view_damage(&damage, 1.0, (1.0, 1.0)), damage);

    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 200.0, 200.0), 1.5)
        .unwrap();
    let (_, surface) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(100, 100), [255, 0, 0, 255]);
    let mut target = RenderTarget::new(300, 300).unwrap();
    run_frame(&mut scene, view, &mut target);

    scene.add_surface_damage(surface, &damage).unwrap();

    // (-1, -1, 52, 52) logical is (-2, -2, 79, 79) in device pixels,
    // clipped to the output
    let repaints = scene.item(surface).unwrap().device_repaints(view).unwrap();
    assert_eq!(repaints.rects(), &[Rect::new(0, 0, 77, 77)]);

    // Fractional scales pad once more when the frame is collected
    let region = scene.pre_paint(view).unwrap();
    assert_eq!(region.bounding_rect(), Rect::new(0, 0, 78, 78));
}

#[test]
fn test_surface_content_is_composited() {
    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 100.0, 100.0), 1.0)
        .unwrap();
    map_window(&mut scene, PointF::new(10.0, 10.0), Size::new(40, 40), [0, 255, 0, 255]);
    let mut target = RenderTarget::new(100, 100).unwrap();

    let (region, outcome) = run_frame(&mut scene, view, &mut target);
    assert_eq!(region.rects(), &[Rect::new(0, 0, 100, 100)]);
    assert_eq!(outcome, PaintOutcome::Composited { nodes: 1 });
    assert_eq!(target.pixel(20, 20), Some([0, 255, 0, 255]));
    assert_eq!(target.pixel(5, 5), Some([0, 0, 0, 255]));

    // Nothing changed, nothing to repaint
    let (region, _) = run_frame(&mut scene, view, &mut target);
    assert!(region.is_empty());
    assert!(scene.views_needing_repaint().is_empty());
}

#[test]
fn test_partial_commit_repaints_only_damage() {
    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 100.0, 100.0), 1.0)
        .unwrap();
    let (_, surface) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(100, 100), [255, 0, 0, 255]);
    let mut target = RenderTarget::new(100, 100).unwrap();
    run_frame(&mut scene, view, &mut target);

    let damage = Region::from_rect(Rect::new(0, 0, 10, 10));
    scene
        .commit_buffer(surface, Some(buffer(Size::new(100, 100), [0, 0, 255, 255])), &damage)
        .unwrap();
    let (region, _) = run_frame(&mut scene, view, &mut target);

    assert_eq!(region.rects(), &[Rect::new(0, 0, 10, 10)]);
    // The same texture was refreshed inside the damage only
    assert_eq!(target.pixel(5, 5), Some([0, 0, 255, 255]));
    assert_eq!(target.pixel(50, 50), Some([255, 0, 0, 255]));
    let surface_item = scene.surface(surface).unwrap();
    assert!(surface_item.previous_pixmap().is_none());
    assert!(surface_item.damage().is_empty());
}

#[test]
fn test_resized_buffer_keeps_previous_pixmap_until_replaced() {
    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 100.0, 100.0), 1.0)
        .unwrap();
    let (_, surface) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(50, 50), [255, 0, 0, 255]);
    let mut target = RenderTarget::new(100, 100).unwrap();
    run_frame(&mut scene, view, &mut target);

    let resized = Size::new(60, 60);
    scene.set_size(surface, SizeF::from(resized)).unwrap();
    scene
        .commit_buffer(surface, Some(buffer(resized, [0, 255, 0, 255])), &Region::from_rect(Rect::from_size(resized)))
        .unwrap();

    {
        let surface_item = scene.surface(surface).unwrap();
        assert!(surface_item.current_pixmap().is_none());
        let previous = surface_item.previous_pixmap().unwrap();
        assert!(previous.is_discarded());
        assert_eq!(previous.size(), Size::new(50, 50));
        // Until the new buffer is uploaded, the old contents stand in
        assert_eq!(surface_item.pixmap().unwrap().size(), Size::new(50, 50));
    }

    // A transition holds on to the old contents
    scene.reference_previous_pixmap(surface).unwrap();
    assert_eq!(scene.surface(surface).unwrap().previous_pixmap_references(), 2);

    run_frame(&mut scene, view, &mut target);
    let surface_item = scene.surface(surface).unwrap();
    assert_eq!(surface_item.current_pixmap().unwrap().size(), resized);
    assert_eq!(surface_item.previous_pixmap_references(), 1);
    assert!(surface_item.previous_pixmap().is_some());
    assert_eq!(target.pixel(55, 55), Some([0, 255, 0, 255]));

    scene.unreference_previous_pixmap(surface).unwrap();
    assert!(scene.surface(surface).unwrap().previous_pixmap().is_none());
}

#[test]
fn test_unsupported_buffer_reports_failure() {
    let mut scene = scene();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    scene.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 64.0, 64.0), 1.0)
        .unwrap();
    let root = scene.tree().root();
    let surface = scene
        .create_item(root, ItemKind::Surface(SurfaceItem::new()))
        .unwrap();
    scene.set_size(surface, SizeF::new(32.0, 32.0)).unwrap();
    let dmabuf = GraphicsBuffer::dmabuf(Size::new(32, 32), BufferFormat::Argb8888);
    scene
        .commit_buffer(surface, Some(Rc::new(dmabuf)), &Region::from_rect(Rect::new(0, 0, 32, 32)))
        .unwrap();

    let mut target = RenderTarget::new(64, 64).unwrap();
    let (_, outcome) = run_frame(&mut scene, view, &mut target);

    // The surface has nothing to draw, the frame still completes
    assert_eq!(outcome, PaintOutcome::Composited { nodes: 0 });
    let surface_item = scene.surface(surface).unwrap();
    assert!(!surface_item.current_pixmap().unwrap().is_valid());
    assert!(surface_item.build_quads(&[RectF::new(0.0, 0.0, 32.0, 32.0)]).is_empty());
    assert!(events
        .borrow()
        .iter()
        .any(|event| matches!(event, SceneEvent::PixmapFailed { item, .. } if *item == surface)));

    // A never-valid pixmap leaves no previous pixmap behind
    scene.discard_pixmap(surface).unwrap();
    let surface_item = scene.surface(surface).unwrap();
    assert!(surface_item.current_pixmap().is_none());
    assert!(surface_item.previous_pixmap().is_none());
}

#[test]
fn test_frame_callbacks_follow_painted_surfaces() {
    let mut scene = scene();
    let painted = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&painted);
    scene.subscribe(move |event| {
        if let SceneEvent::FramePainted { item, frame, .. } = event {
            sink.borrow_mut().push((*item, frame.sequence));
        }
    });

    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 200.0, 100.0), 1.0)
        .unwrap();
    let (_, left) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(50, 50), [255, 0, 0, 255]);
    let (_, right) = map_window(&mut scene, PointF::new(100.0, 0.0), Size::new(50, 50), [0, 255, 0, 255]);
    let mut target = RenderTarget::new(200, 100).unwrap();

    let region = scene.pre_paint(view).unwrap();
    scene.paint(view, &mut target, &region).unwrap();
    scene.post_paint(view).unwrap();
    scene.frame(view, &OutputFrame::new(1, Default::default())).unwrap();
    assert_eq!(*painted.borrow(), vec![(left, 1), (right, 1)]);

    painted.borrow_mut().clear();
    scene
        .add_surface_damage(right, &Region::from_rect(Rect::new(0, 0, 5, 5)))
        .unwrap();
    let region = scene.pre_paint(view).unwrap();
    scene.paint(view, &mut target, &region).unwrap();
    scene.post_paint(view).unwrap();
    scene.frame(view, &OutputFrame::new(2, Default::default())).unwrap();
    assert_eq!(*painted.borrow(), vec![(right, 2)]);
}

#[test]
fn test_direct_scanout_of_fullscreen_surface() {
    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 64.0, 64.0), 1.0)
        .unwrap();
    let (_, surface) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(64, 64), [9, 9, 9, 255]);
    scene
        .set_opaque_region(surface, Region::from_rect(Rect::new(0, 0, 64, 64)))
        .unwrap();

    let mut target = RenderTarget::new(64, 64).unwrap();
    target.set_allows_scanout(true);
    let (_, outcome) = run_frame(&mut scene, view, &mut target);
    assert_eq!(outcome, PaintOutcome::DirectScanout(surface));
    // Nothing was drawn into the target
    assert_eq!(target.pixel(10, 10), Some([0, 0, 0, 0]));

    // A window on top breaks the candidate
    map_window(&mut scene, PointF::new(10.0, 10.0), Size::new(8, 8), [255, 255, 255, 255]);
    let (_, outcome) = run_frame(&mut scene, view, &mut target);
    assert!(matches!(outcome, PaintOutcome::Composited { .. }));
}

#[test]
fn test_moving_window_repaints_old_and_new_area() {
    let mut scene = scene();
    let view = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 200.0, 200.0), 1.0)
        .unwrap();
    let (window, _) = map_window(&mut scene, PointF::new(0.0, 0.0), Size::new(20, 20), [255, 0, 0, 255]);
    let mut target = RenderTarget::new(200, 200).unwrap();
    run_frame(&mut scene, view, &mut target);

    scene.set_position(window, PointF::new(100.0, 100.0)).unwrap();
    let (region, _) = run_frame(&mut scene, view, &mut target);

    assert!(region.contains_rect(&Rect::new(0, 0, 20, 20)));
    assert!(region.contains_rect(&Rect::new(100, 100, 20, 20)));
    assert_eq!(target.pixel(5, 5), Some([0, 0, 0, 255]));
    assert_eq!(target.pixel(105, 105), Some([255, 0, 0, 255]));
}
