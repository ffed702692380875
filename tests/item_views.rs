//! Integration tests for item tree views carved out of an output view

use std::cell::RefCell;
use std::rc::Rc;

use tessera::geometry::{PointF, Rect, RectF, Region, Size, SizeF};
use tessera::renderer::{OutputFrame, RenderTarget, SoftwareRenderer};
use tessera::scene::{
    BufferFormat, GraphicsBuffer, ItemId, ItemKind, Scene, SceneEvent, SceneSettings,
    SceneView, SurfaceItem, ViewId,
};
use tessera::SceneError;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

struct Fixture {
    scene: Scene,
    output: ViewId,
    window: ItemId,
    surface: ItemId,
}

/// An output with one red 40x40 window at (20, 30)
fn fixture() -> Fixture {
    let mut scene = Scene::new(Box::new(SoftwareRenderer::new()), SceneSettings::default());
    let output = scene
        .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 200.0, 200.0), 1.0)
        .unwrap();
    let root = scene.tree().root();
    let window = scene.create_item(root, ItemKind::Container).unwrap();
    let surface = scene
        .create_item(window, ItemKind::Surface(SurfaceItem::new()))
        .unwrap();
    scene.set_position(window, PointF::new(20.0, 30.0)).unwrap();
    scene.set_size(window, SizeF::new(40.0, 40.0)).unwrap();
    scene.set_size(surface, SizeF::new(40.0, 40.0)).unwrap();
    let buffer = GraphicsBuffer::solid(Size::new(40, 40), BufferFormat::Xrgb8888, RED);
    scene
        .commit_buffer(surface, Some(Rc::new(buffer)), &Region::from_rect(Rect::new(0, 0, 40, 40)))
        .unwrap();
    Fixture {
        scene,
        output,
        window,
        surface,
    }
}

fn run_frame(scene: &mut Scene, view: ViewId, target: &mut RenderTarget) -> Region {
    let region = scene.pre_paint(view).unwrap();
    scene.paint(view, target, &region).unwrap();
    scene.post_paint(view).unwrap();
    scene.frame(view, &OutputFrame::default()).unwrap();
    region
}

#[test]
fn test_item_view_renders_subtree_in_own_space() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let thumbnail = scene.add_item_tree_view(output, window).unwrap();
    assert!(scene.has_item_view_for(window));

    let mut target = RenderTarget::new(40, 40).unwrap();
    let region = run_frame(&mut scene, thumbnail, &mut target);

    assert_eq!(region.rects(), &[Rect::new(0, 0, 40, 40)]);
    assert_eq!(target.pixel(0, 0), Some(RED));
    assert_eq!(target.pixel(39, 39), Some(RED));
}

#[test]
fn test_surface_damage_reaches_every_view() {
    let Fixture {
        mut scene,
        output,
        window,
        surface,
    } = fixture();
    let thumbnail = scene.add_item_tree_view(output, window).unwrap();
    let mut output_target = RenderTarget::new(200, 200).unwrap();
    let mut thumbnail_target = RenderTarget::new(40, 40).unwrap();
    run_frame(&mut scene, output, &mut output_target);
    run_frame(&mut scene, thumbnail, &mut thumbnail_target);

    scene
        .add_surface_damage(surface, &Region::from_rect(Rect::new(0, 0, 5, 5)))
        .unwrap();

    assert_eq!(run_frame(&mut scene, output, &mut output_target).rects(), &[Rect::new(20, 30, 5, 5)]);
    assert_eq!(run_frame(&mut scene, thumbnail, &mut thumbnail_target).rects(), &[Rect::new(0, 0, 5, 5)]);
}

#[test]
fn test_one_item_view_per_item() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let thumbnail = scene.add_item_tree_view(output, window).unwrap();

    assert_eq!(
        scene.add_item_tree_view(output, window),
        Err(SceneError::ItemViewExists(window))
    );
    assert!(matches!(
        scene.add_item_tree_view(thumbnail, window),
        Err(SceneError::WrongViewKind(view, _)) if view == thumbnail
    ));
}

#[test]
fn test_exclusive_view_takes_item_from_output() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let mut target = RenderTarget::new(200, 200).unwrap();
    run_frame(&mut scene, output, &mut target);
    assert_eq!(target.pixel(30, 40), Some(RED));

    let layer = scene.add_item_tree_view(output, window).unwrap();
    scene.set_item_view_exclusive(layer, true).unwrap();
    let main = scene.view(output).unwrap().as_main().unwrap();
    assert!(main.is_exclusive_item(window));

    let region = run_frame(&mut scene, output, &mut target);
    assert!(region.contains_rect(&Rect::new(20, 30, 40, 40)));
    assert_eq!(target.pixel(30, 40), Some(BLACK));

    scene.set_item_view_exclusive(layer, false).unwrap();
    run_frame(&mut scene, output, &mut target);
    assert_eq!(target.pixel(30, 40), Some(RED));
}

#[test]
fn test_removing_exclusive_view_shows_item_again() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let mut target = RenderTarget::new(200, 200).unwrap();
    let layer = scene.add_item_tree_view(output, window).unwrap();
    scene.set_item_view_exclusive(layer, true).unwrap();
    run_frame(&mut scene, output, &mut target);
    assert_eq!(target.pixel(30, 40), Some(BLACK));

    scene.remove_view(layer).unwrap();
    run_frame(&mut scene, output, &mut target);
    assert_eq!(target.pixel(30, 40), Some(RED));
}

#[test]
fn test_removing_item_removes_its_view() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let removed = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&removed);
    scene.subscribe(move |event| {
        if let SceneEvent::DelegateRemoved(view) = event {
            sink.borrow_mut().push(*view);
        }
    });
    let thumbnail = scene.add_item_tree_view(output, window).unwrap();

    scene.remove_item(window).unwrap();

    assert!(matches!(scene.view(thumbnail), Err(SceneError::UnknownView(_))));
    assert!(!scene.has_item_view_for(window));
    let main = scene.view(output).unwrap().as_main().unwrap();
    assert!(main.item_views().is_empty());
    assert_eq!(*removed.borrow(), vec![thumbnail]);

    // The vacated area is repainted on the output
    let mut target = RenderTarget::new(200, 200).unwrap();
    let region = run_frame(&mut scene, output, &mut target);
    assert!(region.contains_rect(&Rect::new(20, 30, 40, 40)));
}

#[test]
fn test_removing_output_removes_item_views() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let thumbnail = scene.add_item_tree_view(output, window).unwrap();

    scene.remove_view(output).unwrap();

    assert!(scene.view(thumbnail).is_err());
    assert_eq!(scene.view_ids().count(), 0);
    assert!(!scene.has_item_view_for(window));
}

#[test]
fn test_output_scale_propagates_to_item_views() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let thumbnail = scene.add_item_tree_view(output, window).unwrap();

    scene.set_view_scale(output, 2.0).unwrap();

    let view = scene.view(thumbnail).unwrap().as_scene_view();
    assert_eq!(view.scale(), 2.0);
    assert_eq!(view.device_size(scene.tree()), Size::new(80, 80));
}

#[test]
fn test_underlay_view_leaves_item_area_transparent() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let mut target = RenderTarget::new(200, 200).unwrap();
    let layer = scene.add_item_tree_view(output, window).unwrap();
    scene.set_item_view_exclusive(layer, true).unwrap();
    scene.set_item_view_underlay(layer, true).unwrap();
    let main = scene.view(output).unwrap().as_main().unwrap();
    assert_eq!(main.underlays(), &[layer]);

    let region = run_frame(&mut scene, output, &mut target);
    assert!(region.contains_rect(&Rect::new(20, 30, 40, 40)));
    assert_eq!(target.pixel(30, 40), Some([0, 0, 0, 0]));
    assert_eq!(target.pixel(5, 5), Some(BLACK));

    // Back on the primary layer the area is covered with background again
    scene.set_item_view_underlay(layer, false).unwrap();
    let region = run_frame(&mut scene, output, &mut target);
    assert!(region.contains_rect(&Rect::new(20, 30, 40, 40)));
    assert_eq!(target.pixel(30, 40), Some(BLACK));
}

#[test]
fn test_underlay_without_exclusivity_paints_item() {
    let Fixture {
        mut scene,
        output,
        window,
        ..
    } = fixture();
    let mut target = RenderTarget::new(200, 200).unwrap();
    let layer = scene.add_item_tree_view(output, window).unwrap();
    scene.set_item_view_underlay(layer, true).unwrap();

    run_frame(&mut scene, output, &mut target);
    assert_eq!(target.pixel(30, 40), Some(RED));
}

#[test]
fn test_viewport_change_repaints_whole_output() {
    let Fixture {
        mut scene, output, ..
    } = fixture();
    let mut target = RenderTarget::new(200, 200).unwrap();
    run_frame(&mut scene, output, &mut target);
    assert!(run_frame(&mut scene, output, &mut target).is_empty());

    scene
        .set_view_viewport(output, RectF::new(100.0, 0.0, 300.0, 150.0))
        .unwrap();
    let view = scene.view(output).unwrap().as_scene_view();
    assert_eq!(view.device_rect(scene.tree()), Rect::new(0, 0, 300, 150));

    let mut target = RenderTarget::new(300, 150).unwrap();
    let region = run_frame(&mut scene, output, &mut target);
    assert_eq!(region.rects(), &[Rect::new(0, 0, 300, 150)]);
    // The window now lies left of the viewport
    assert_eq!(target.pixel(30, 40), Some(BLACK));
}
