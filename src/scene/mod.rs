//! Damage-tracked scene graph
//!
//! The [`Scene`] owns the item tree, every view onto it and the renderer.
//! It is the single place where the tree is mutated, so every mutation can
//! turn into device repaints on exactly the views that render the item.
//!
//! # Paint cycle
//!
//! Each view goes through the same sequence every frame:
//!
//! ```text
//! pre_paint -> paint -> post_paint -> frame
//! ```
//!
//! The first `pre_paint` of a frame refreshes surface pixmaps. `post_paint`
//! is only accepted once every view that joined the frame has painted, and
//! a new frame starts only after all of them have post-painted. Calls out of
//! order fail with [`SceneError::OutOfOrder`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tessera::geometry::{PointF, Rect, RectF, Region, Size, SizeF};
//! use tessera::renderer::{RenderTarget, SoftwareRenderer};
//! use tessera::scene::{BufferFormat, GraphicsBuffer, ItemKind, Scene, SceneSettings, SurfaceItem};
//!
//! let mut scene = Scene::new(Box::new(SoftwareRenderer::new()), SceneSettings::default());
//! let output = scene
//!     .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 200.0, 200.0), 1.0)
//!     .unwrap();
//!
//! let window = scene.create_item(scene.tree().root(), ItemKind::Container).unwrap();
//! let surface = scene
//!     .create_item(window, ItemKind::Surface(SurfaceItem::new()))
//!     .unwrap();
//! scene.set_position(window, PointF::new(20.0, 20.0)).unwrap();
//! scene.set_size(surface, SizeF::new(100.0, 100.0)).unwrap();
//!
//! let buffer = GraphicsBuffer::solid(Size::new(100, 100), BufferFormat::Argb8888, [255, 0, 0, 255]);
//! scene
//!     .commit_buffer(surface, Some(Rc::new(buffer)), &Region::from_rect(Rect::new(0, 0, 100, 100)))
//!     .unwrap();
//!
//! let mut target = RenderTarget::new(200, 200).unwrap();
//! let region = scene.pre_paint(output).unwrap();
//! scene.paint(output, &mut target, &region).unwrap();
//! scene.post_paint(output).unwrap();
//! assert_eq!(target.pixel(50, 50), Some([255, 0, 0, 255]));
//! ```

pub mod buffer;
pub mod item;
pub mod pixmap;
pub mod surface;
pub mod view;

pub use buffer::{BufferFormat, BufferOrigin, BufferStorage, GraphicsBuffer};
pub use item::{
    Borders, ColorDescription, DecorationContent, Item, ItemContent, ItemId, ItemKind, ItemTree,
    ShadowContent,
};
pub use pixmap::{SurfacePixmap, SurfaceTexture};
pub use surface::{view_damage, PixmapUpdate, SurfaceItem};
pub use view::{ItemTreeView, MainSceneView, PaintPhase, SceneView, View, ViewId, WindowFilter};

use crate::error::{SceneError, SceneResult, TextureError};
use crate::geometry::{
    BufferMatrix, BufferTransform, Point, PointF, Rect, RectF, Region, Size, SizeF,
};
use crate::renderer::{
    ItemRenderer, OutputFrame, PaintOutcome, RenderNode, RenderTarget, RenderViewport,
};
use log::{debug, info, trace};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

/// Scene-wide behaviour switches
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    /// Pad accumulated repaints by one device pixel on fractional scales
    pub fractional_damage_padding: bool,
    pub direct_scanout: bool,
    pub max_scanout_candidates: usize,
    /// Straight RGBA colour behind all items
    pub background: [u8; 4],
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            fractional_damage_padding: true,
            direct_scanout: true,
            max_scanout_candidates: 1,
            background: [0, 0, 0, 255],
        }
    }
}

/// Notifications delivered to [`Scene::subscribe`]rs
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A surface received damage, in surface-local coordinates
    Damaged { item: ItemId, region: Region },
    ViewAdded(ViewId),
    DelegateRemoved(ViewId),
    /// A surface painted on `view` made it to the output
    FramePainted {
        view: ViewId,
        item: ItemId,
        frame: OutputFrame,
    },
    PixmapFailed { item: ItemId, error: TextureError },
}

pub type SceneObserver = Box<dyn FnMut(&SceneEvent)>;

/// Bookkeeping of the frame in progress
#[derive(Debug, Default)]
struct FrameState {
    /// Views that pre-painted in this frame
    participants: BTreeSet<ViewId>,
    /// Surface damage uploaded by this frame's preprocess
    consumed: HashMap<ItemId, Region>,
}

/// Item tree, views and renderer of one compositor instance
pub struct Scene {
    tree: ItemTree,
    views: BTreeMap<ViewId, View>,
    next_view: u32,
    renderer: Box<dyn ItemRenderer>,
    settings: SceneSettings,
    geometry: Rect,
    frame: FrameState,
    observers: Vec<SceneObserver>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("items", &self.tree.len())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("renderer", &self.renderer.name())
            .field("settings", &self.settings)
            .field("geometry", &self.geometry)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Scene {
    pub fn new(renderer: Box<dyn ItemRenderer>, settings: SceneSettings) -> Self {
        info!("🎬 Creating scene with {} renderer", renderer.name());
        Self {
            tree: ItemTree::new(),
            views: BTreeMap::new(),
            next_view: 1,
            renderer,
            settings,
            geometry: Rect::default(),
            frame: FrameState::default(),
            observers: Vec::new(),
        }
    }

    pub fn tree(&self) -> &ItemTree {
        &self.tree
    }

    pub fn item(&self, id: ItemId) -> SceneResult<&Item> {
        self.tree.item(id)
    }

    pub fn surface(&self, id: ItemId) -> SceneResult<&SurfaceItem> {
        self.tree.item(id)?.surface().ok_or(SceneError::NotASurface(id))
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    pub fn renderer(&self) -> &dyn ItemRenderer {
        self.renderer.as_ref()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&SceneEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, event: SceneEvent) {
        trace!("📣 {:?}", event);
        for observer in &mut self.observers {
            observer(&event);
        }
    }

    // ---- items ------------------------------------------------------------

    pub fn create_item(&mut self, parent: ItemId, kind: ItemKind) -> SceneResult<ItemId> {
        let id = self.tree.insert(parent, kind)?;
        trace!("Created {} under {}", id, parent);
        Ok(id)
    }

    /// Removes an item with its subtree; item views showing any of the
    /// removed items go away with it
    pub fn remove_item(&mut self, id: ItemId) -> SceneResult<()> {
        if id == self.tree.root() {
            return Err(SceneError::RootItem);
        }
        self.tree.item(id)?;
        self.repaint_area_in_views(id);
        let removed = self.tree.remove(id)?;

        let orphaned: Vec<ViewId> = self
            .views
            .values()
            .filter_map(View::as_item_tree)
            .filter(|view| removed.contains(&view.item()))
            .map(|view| view.id())
            .collect();
        for view in orphaned {
            self.remove_view(view)?;
        }
        for removed_id in &removed {
            self.frame.consumed.remove(removed_id);
        }
        for view in self.views.values_mut() {
            view.as_scene_view_mut()
                .state_mut()
                .painted_surfaces
                .retain(|item| !removed.contains(item));
        }
        debug!("🗑️ Removed {} item(s) starting at {}", removed.len(), id);
        Ok(())
    }

    pub fn reparent_item(&mut self, id: ItemId, parent: ItemId) -> SceneResult<()> {
        self.schedule_full_repaint(id);
        self.tree.set_parent(id, parent)?;
        self.schedule_full_repaint(id);
        Ok(())
    }

    pub fn set_position(&mut self, id: ItemId, position: PointF) -> SceneResult<()> {
        if self.tree.item(id)?.position() == position {
            return Ok(());
        }
        self.schedule_full_repaint(id);
        self.tree.item_mut(id)?.set_position(position);
        self.schedule_full_repaint(id);
        Ok(())
    }

    /// Resizes an item; a surface's matrix is rebuilt for the new size
    pub fn set_size(&mut self, id: ItemId, size: SizeF) -> SceneResult<()> {
        if self.tree.item(id)?.size() == size {
            return Ok(());
        }
        self.schedule_full_repaint(id);
        let item = self.tree.item_mut(id)?;
        item.set_size(size);
        if let Some(surface) = item.surface_mut() {
            surface.update_surface_to_buffer_matrix(size);
        }
        self.schedule_full_repaint(id);
        Ok(())
    }

    pub fn set_z(&mut self, id: ItemId, z: i32) -> SceneResult<()> {
        if self.tree.item(id)?.z() == z {
            return Ok(());
        }
        self.tree.set_z(id, z)?;
        self.schedule_full_repaint(id);
        Ok(())
    }

    pub fn set_opacity(&mut self, id: ItemId, opacity: f64) -> SceneResult<()> {
        let item = self.tree.item_mut(id)?;
        let previous = item.opacity();
        item.set_opacity(opacity);
        if item.opacity() != previous {
            self.schedule_full_repaint(id);
        }
        Ok(())
    }

    pub fn set_visible(&mut self, id: ItemId, visible: bool) -> SceneResult<()> {
        if self.tree.item(id)?.explicit_visible() == visible {
            return Ok(());
        }
        // Repaint while still visible, then again once shown
        self.schedule_full_repaint(id);
        self.tree.set_visible(id, visible)?;
        self.schedule_full_repaint(id);
        Ok(())
    }

    /// Marks an item as being transformed by an effect; views showing it
    /// repaint fully while the flag is set
    pub fn set_transformed(&mut self, id: ItemId, transformed: bool) -> SceneResult<()> {
        if self.tree.item(id)?.is_transformed() == transformed {
            return Ok(());
        }
        self.schedule_full_repaint(id);
        self.tree.item_mut(id)?.set_transformed(transformed);
        self.schedule_full_repaint(id);
        Ok(())
    }

    pub fn set_opaque_region(&mut self, id: ItemId, region: Region) -> SceneResult<()> {
        let item = self.tree.item_mut(id)?;
        if item.opaque() == region {
            return Ok(());
        }
        item.set_opaque(region);
        self.schedule_full_repaint(id);
        Ok(())
    }

    pub fn set_color_description(
        &mut self,
        id: ItemId,
        color: ColorDescription,
    ) -> SceneResult<()> {
        let item = self.tree.item_mut(id)?;
        if *item.color_description() == color {
            return Ok(());
        }
        item.set_color_description(color);
        self.schedule_full_repaint(id);
        Ok(())
    }

    /// Schedules a repaint of `region` (item-local, logical) on every view
    /// that renders the item
    pub fn schedule_repaint(&mut self, id: ItemId, region: &Region) -> SceneResult<()> {
        self.tree.item(id)?;
        self.schedule_repaint_internal(id, region);
        Ok(())
    }

    fn schedule_full_repaint(&mut self, id: ItemId) {
        self.schedule_repaint_internal(id, &Region::infinite());
    }

    fn schedule_repaint_internal(&mut self, id: ItemId, region: &Region) {
        let Scene { tree, views, .. } = self;
        if !tree.get(id).is_some_and(Item::is_visible) {
            return;
        }
        for view in views.values() {
            let view = view.as_scene_view();
            if !view.should_render_item(tree, id) {
                continue;
            }
            let device = tree.painted_device_region(id, region, view);
            if device.is_empty() {
                continue;
            }
            if let Some(item) = tree.get_mut(id) {
                item.add_device_repaint(view.id(), &device);
            }
        }
    }

    /// Adds the item's current area to the view-level repaints of every view
    /// rendering it; used when the item itself is about to go away
    fn repaint_area_in_views(&mut self, id: ItemId) {
        let Scene { tree, views, .. } = self;
        if !tree.get(id).is_some_and(Item::is_visible) {
            return;
        }
        let bounds = tree.bounding_rect(id);
        for view in views.values_mut() {
            let view = view.as_scene_view_mut();
            if !view.should_render_item(tree, id) {
                continue;
            }
            let area = tree.painted_device_area(id, bounds, &*view);
            view.state_mut().repaints.add_rect(area);
        }
    }

    // ---- surfaces ---------------------------------------------------------

    fn surface_mut(&mut self, id: ItemId) -> SceneResult<&mut SurfaceItem> {
        self.tree
            .item_mut(id)?
            .surface_mut()
            .ok_or(SceneError::NotASurface(id))
    }

    /// Reports client damage in buffer coordinates.
    ///
    /// The damage is accumulated on the surface and repainted on every view
    /// showing it, padded on views whose scale does not match the scale the
    /// client rendered at.
    pub fn add_surface_damage(&mut self, id: ItemId, buffer_region: &Region) -> SceneResult<()> {
        let item = self.tree.item_mut(id)?;
        let size = item.size();
        let surface = item.surface_mut().ok_or(SceneError::NotASurface(id))?;
        if buffer_region.is_empty() {
            return Ok(());
        }
        let surface_damage = surface.add_damage(buffer_region);
        let buffer_scale = surface.source_box_scale(size);

        let Scene { tree, views, .. } = self;
        if tree.get(id).is_some_and(Item::is_visible) {
            for view in views.values() {
                let view = view.as_scene_view();
                if !view.should_render_item(tree, id) {
                    continue;
                }
                let damage = view_damage(&surface_damage, view.scale(), buffer_scale);
                let device = tree.painted_device_region(id, &damage, view);
                if let Some(item) = tree.get_mut(id) {
                    item.add_device_repaint(view.id(), &device);
                }
            }
        }

        self.emit(SceneEvent::Damaged {
            item: id,
            region: surface_damage,
        });
        Ok(())
    }

    /// Attaches a committed buffer along with its damage.
    ///
    /// The pixmap is retired when the new buffer cannot be uploaded into
    /// the existing texture (different size or alpha, or no buffer at all);
    /// otherwise only the damaged part is refreshed at the next frame.
    pub fn commit_buffer(
        &mut self,
        id: ItemId,
        buffer: Option<Rc<GraphicsBuffer>>,
        damage: &Region,
    ) -> SceneResult<()> {
        let item = self.tree.item_mut(id)?;
        let size = item.size();
        let surface = item.surface_mut().ok_or(SceneError::NotASurface(id))?;

        let needs_new_texture = match (&buffer, surface.current_pixmap()) {
            (Some(buffer), Some(pixmap)) => {
                !pixmap.is_valid()
                    || pixmap.size() != buffer.size()
                    || pixmap.has_alpha_channel() != buffer.has_alpha_channel()
            }
            _ => true,
        };
        surface.attach_buffer(buffer);
        if needs_new_texture {
            surface.discard_pixmap();
        }
        surface.update_surface_to_buffer_matrix(size);
        item.discard_quads();
        self.add_surface_damage(id, damage)
    }

    /// Retires the current pixmap of a surface, keeping it as the previous
    /// pixmap while it is referenced
    pub fn discard_pixmap(&mut self, id: ItemId) -> SceneResult<()> {
        self.surface_mut(id)?.discard_pixmap();
        self.tree.item_mut(id)?.discard_quads();
        Ok(())
    }

    pub fn reference_previous_pixmap(&mut self, id: ItemId) -> SceneResult<()> {
        self.surface_mut(id)?.reference_previous_pixmap();
        Ok(())
    }

    pub fn unreference_previous_pixmap(&mut self, id: ItemId) -> SceneResult<()> {
        let surface = self.surface_mut(id)?;
        let had_previous = surface.previous_pixmap().is_some();
        surface.unreference_previous_pixmap();
        // Quads may have been sampling the freed pixmap
        if had_previous && surface.previous_pixmap().is_none() {
            self.tree.item_mut(id)?.discard_quads();
        }
        Ok(())
    }

    fn update_buffer_geometry<F>(&mut self, id: ItemId, update: F) -> SceneResult<()>
    where
        F: FnOnce(&mut SurfaceItem, SizeF),
    {
        let item = self.tree.item_mut(id)?;
        let size = item.size();
        let surface = item.surface_mut().ok_or(SceneError::NotASurface(id))?;
        update(surface, size);
        item.discard_quads();
        self.schedule_full_repaint(id);
        Ok(())
    }

    pub fn set_buffer_size(&mut self, id: ItemId, size: Size) -> SceneResult<()> {
        self.update_buffer_geometry(id, |surface, surface_size| {
            surface.set_buffer_size(size);
            surface.update_surface_to_buffer_matrix(surface_size);
        })
    }

    pub fn set_buffer_transform(&mut self, id: ItemId, transform: BufferTransform) -> SceneResult<()> {
        self.update_buffer_geometry(id, |surface, surface_size| {
            surface.set_buffer_transform(transform);
            surface.update_surface_to_buffer_matrix(surface_size);
        })
    }

    pub fn set_buffer_source_box(&mut self, id: ItemId, source_box: RectF) -> SceneResult<()> {
        self.update_buffer_geometry(id, |surface, surface_size| {
            surface.set_buffer_source_box(source_box);
            surface.update_surface_to_buffer_matrix(surface_size);
        })
    }

    /// Overrides the computed surface-to-buffer matrix
    pub fn set_surface_to_buffer_matrix(&mut self, id: ItemId, matrix: BufferMatrix) -> SceneResult<()> {
        self.update_buffer_geometry(id, |surface, _| {
            surface.set_surface_to_buffer_matrix(matrix);
        })
    }

    // ---- views ------------------------------------------------------------

    pub fn view(&self, id: ViewId) -> SceneResult<&View> {
        self.views.get(&id).ok_or(SceneError::UnknownView(id))
    }

    fn view_mut(&mut self, id: ViewId) -> SceneResult<&mut View> {
        self.views.get_mut(&id).ok_or(SceneError::UnknownView(id))
    }

    pub fn view_ids(&self) -> impl Iterator<Item = ViewId> + '_ {
        self.views.keys().copied()
    }

    fn allocate_view_id(&mut self) -> ViewId {
        let id = ViewId(self.next_view);
        self.next_view += 1;
        id
    }

    /// Adds a view of the whole scene for an output
    pub fn add_main_view(
        &mut self,
        output_name: &str,
        viewport: RectF,
        scale: f64,
    ) -> SceneResult<ViewId> {
        check_scale(scale)?;
        let id = self.allocate_view_id();
        let mut view = MainSceneView::new(id, output_name, viewport, scale);
        view.state.repaints = Region::from_rect(view.device_rect(&self.tree));
        info!(
            "🖥️ Added {} for {} ({}x{} @ {})",
            id, output_name, viewport.width, viewport.height, scale
        );
        self.views.insert(id, View::Main(view));
        self.emit(SceneEvent::ViewAdded(id));
        Ok(id)
    }

    /// Carves `item` and its descendants out of `parent` into their own view
    pub fn add_item_tree_view(&mut self, parent: ViewId, item: ItemId) -> SceneResult<ViewId> {
        let scale = match self.view(parent)? {
            View::Main(main) => main.scale(),
            View::ItemTree(_) => {
                return Err(SceneError::WrongViewKind(parent, "main scene view"));
            }
        };
        self.tree.item(item)?;
        if self.has_item_view_for(item) {
            return Err(SceneError::ItemViewExists(item));
        }

        let id = self.allocate_view_id();
        let mut view = ItemTreeView::new(id, parent, item, scale);
        view.state.repaints = Region::from_rect(view.device_rect(&self.tree));
        self.views.insert(id, View::ItemTree(view));
        if let Some(main) = self.view_mut(parent)?.as_main_mut() {
            main.add_item_view(id);
        }
        debug!("🧩 Added {} for {} in {}", id, item, parent);
        self.emit(SceneEvent::ViewAdded(id));
        Ok(id)
    }

    pub fn has_item_view_for(&self, item: ItemId) -> bool {
        self.views
            .values()
            .filter_map(View::as_item_tree)
            .any(|view| view.item() == item)
    }

    /// Removes a view; removing a main view removes its item views too
    pub fn remove_view(&mut self, id: ViewId) -> SceneResult<()> {
        let view = self.views.remove(&id).ok_or(SceneError::UnknownView(id))?;
        match view {
            View::Main(main) => {
                for child in main.item_views().to_vec() {
                    if self.views.contains_key(&child) {
                        self.remove_view(child)?;
                    }
                }
            }
            View::ItemTree(tree_view) => {
                let parent = tree_view.parent_view();
                if let Some(main) = self.views.get_mut(&parent).and_then(View::as_main_mut) {
                    main.remove_item_view(id);
                }
                if tree_view.is_exclusive() {
                    // The item is rendered by the parent again
                    self.schedule_full_repaint(tree_view.item());
                }
            }
        }

        for item_id in self.tree.ids().collect::<Vec<_>>() {
            if let Some(item) = self.tree.get_mut(item_id) {
                item.remove_repaints(id);
            }
        }
        self.frame.participants.remove(&id);
        if self.frame_can_complete() {
            self.complete_frame();
        }
        info!("🗑️ Removed {}", id);
        self.emit(SceneEvent::DelegateRemoved(id));
        Ok(())
    }

    fn item_tree_view_mut(&mut self, id: ViewId) -> SceneResult<&mut ItemTreeView> {
        self.view_mut(id)?
            .as_item_tree_mut()
            .ok_or(SceneError::WrongViewKind(id, "item tree view"))
    }

    fn main_view_mut(&mut self, id: ViewId) -> SceneResult<&mut MainSceneView> {
        self.view_mut(id)?
            .as_main_mut()
            .ok_or(SceneError::WrongViewKind(id, "main scene view"))
    }

    /// Makes an item view the only place its subtree is painted.
    ///
    /// Enabling hides the subtree from the parent view: whatever the parent
    /// still had pending for it, and the area it covered, get repainted
    /// there. Disabling shows it in the parent again.
    pub fn set_item_view_exclusive(&mut self, id: ViewId, exclusive: bool) -> SceneResult<()> {
        let view = self.item_tree_view_mut(id)?;
        if view.is_exclusive() == exclusive {
            return Ok(());
        }
        let (parent, item) = (view.parent_view(), view.item());

        if exclusive {
            let Scene { tree, views, .. } = self;
            let mut pending = Region::new();
            for descendant in tree.subtree(item) {
                if let Some(entry) = tree.get_mut(descendant) {
                    pending |= &entry.take_device_repaints(parent);
                }
            }
            if let Some(main) = views.get_mut(&parent).and_then(View::as_main_mut) {
                if tree.get(item).is_some_and(Item::is_visible) {
                    let area = tree.painted_device_area(item, tree.bounding_rect(item), &*main);
                    pending.add_rect(area);
                }
                main.state.repaints |= &pending;
                main.add_exclusive_view(id, item);
            }
            self.item_tree_view_mut(id)?.set_exclusive_flag(true);
        } else {
            self.item_tree_view_mut(id)?.set_exclusive_flag(false);
            self.main_view_mut(parent)?.remove_exclusive_view(id);
            self.schedule_full_repaint(item);
        }
        debug!("🧩 {} exclusive: {}", id, exclusive);
        Ok(())
    }

    /// Places an exclusive item view below the parent's primary layer
    pub fn set_item_view_underlay(&mut self, id: ViewId, underlay: bool) -> SceneResult<()> {
        let view = self.item_tree_view_mut(id)?;
        if view.is_underlay() == underlay {
            return Ok(());
        }
        view.set_underlay_flag(underlay);
        let (parent, item) = (view.parent_view(), view.item());
        let Scene { tree, views, .. } = self;
        if let Some(main) = views.get_mut(&parent).and_then(View::as_main_mut) {
            if underlay {
                main.add_underlay(id);
            } else {
                main.remove_underlay(id);
            }
            // The parent has to punch through or cover the layer area
            if tree.contains(item) {
                let area = tree.painted_device_area(item, tree.bounding_rect(item), &*main);
                main.state.repaints.add_rect(area);
            }
        }
        Ok(())
    }

    /// Sets the scale of a main view and of the item views carved out of it
    pub fn set_view_scale(&mut self, id: ViewId, scale: f64) -> SceneResult<()> {
        check_scale(scale)?;
        let main = self.main_view_mut(id)?;
        if main.scale() == scale {
            return Ok(());
        }
        main.set_scale(scale);
        let children = main.item_views().to_vec();
        for child in &children {
            if let Some(view) = self.views.get_mut(child).and_then(View::as_item_tree_mut) {
                view.set_scale(scale);
            }
        }
        // Pending item repaints were computed for the old scale
        for view in std::iter::once(id).chain(children) {
            self.reset_view_repaints(view);
        }
        Ok(())
    }

    pub fn set_view_viewport(&mut self, id: ViewId, viewport: RectF) -> SceneResult<()> {
        self.main_view_mut(id)?.set_viewport(viewport);
        self.reset_view_repaints(id);
        Ok(())
    }

    pub fn set_render_offset(&mut self, id: ViewId, offset: Point) -> SceneResult<()> {
        match self.view_mut(id)? {
            View::Main(view) => view.set_render_offset(offset),
            View::ItemTree(view) => view.set_render_offset(offset),
        }
        self.reset_view_repaints(id);
        Ok(())
    }

    /// Hides top-level windows for which `filter` returns true from a
    /// main view
    pub fn add_window_filter<F>(&mut self, id: ViewId, filter: F) -> SceneResult<()>
    where
        F: Fn(ItemId, &Item) -> bool + 'static,
    {
        self.main_view_mut(id)?.add_window_filter(Box::new(filter));
        self.reset_view_repaints(id);
        Ok(())
    }

    /// Drops per-item repaints of a view in favour of a full repaint
    fn reset_view_repaints(&mut self, id: ViewId) {
        for item_id in self.tree.ids().collect::<Vec<_>>() {
            if let Some(item) = self.tree.get_mut(item_id) {
                item.remove_repaints(id);
            }
        }
        let Scene { tree, views, .. } = self;
        if let Some(view) = views.get_mut(&id) {
            let view = view.as_scene_view_mut();
            let full = view.device_rect(tree);
            view.state_mut().repaints = Region::from_rect(full);
        }
    }

    // ---- scene-level repaints ---------------------------------------------

    /// Repaints every view completely
    pub fn add_repaint_full(&mut self) {
        let Scene { tree, views, .. } = self;
        for view in views.values_mut() {
            let view = view.as_scene_view_mut();
            let full = view.device_rect(tree);
            view.state_mut().repaints.add_rect(full);
        }
    }

    /// Repaints a region given in scene coordinates on every view
    pub fn add_logical_repaint(&mut self, region: &Region) {
        let ids: Vec<ViewId> = self.views.keys().copied().collect();
        for id in ids {
            self.add_logical_repaint_internal(id, region);
        }
    }

    pub fn add_logical_repaint_view(&mut self, id: ViewId, region: &Region) -> SceneResult<()> {
        self.view(id)?;
        self.add_logical_repaint_internal(id, region);
        Ok(())
    }

    fn add_logical_repaint_internal(&mut self, id: ViewId, region: &Region) {
        let Scene { tree, views, .. } = self;
        if let Some(view) = views.get_mut(&id) {
            let view = view.as_scene_view_mut();
            let device = &view.map_to_device_region(tree, region) & &Region::from_rect(view.device_rect(tree));
            view.state_mut().repaints |= &device;
        }
    }

    /// Repaints a region given in the view's device pixels
    pub fn add_device_repaint(&mut self, id: ViewId, region: &Region) -> SceneResult<()> {
        self.view_mut(id)?.as_scene_view_mut().state_mut().repaints |= region;
        Ok(())
    }

    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    /// Sets the bounding rect of all outputs; a change repaints everything
    pub fn set_geometry(&mut self, geometry: Rect) {
        if self.geometry == geometry {
            return;
        }
        debug!("📐 Scene geometry {:?} -> {:?}", self.geometry, geometry);
        self.geometry = geometry;
        self.add_repaint_full();
    }

    /// Views with anything to repaint
    pub fn views_needing_repaint(&self) -> Vec<ViewId> {
        self.views
            .values()
            .map(View::as_scene_view)
            .filter(|view| {
                let id = view.id();
                !view.state().repaints.is_empty()
                    || self.rendered_items(*view).into_iter().any(|item| {
                        self.tree.get(item).is_some_and(|entry| {
                            entry.has_repaints(id) || (entry.is_visible() && entry.is_transformed())
                        })
                    })
            })
            .map(|view| view.id())
            .collect()
    }

    /// Items of the view's subtree that the view renders, in paint order
    fn rendered_items(&self, view: &dyn SceneView) -> Vec<ItemId> {
        let root = view.root_item(&self.tree);
        self.tree
            .paint_order(root)
            .into_iter()
            .filter(|id| view.should_render_item(&self.tree, *id))
            .collect()
    }

    fn has_transformed_items(&self, view: &dyn SceneView) -> bool {
        self.rendered_items(view).into_iter().any(|id| {
            self.tree
                .get(id)
                .is_some_and(|item| item.is_visible() && item.is_transformed())
        })
    }

    // ---- queries ----------------------------------------------------------

    /// Surfaces that could be shown on an output plane without compositing.
    ///
    /// Only the top-most window intersecting the view is considered. It
    /// qualifies when it is fully opaque, untransformed, and covers the view
    /// with its top-most surface, which must be placed at the window origin,
    /// be opaque over the whole view and have a valid pixmap.
    pub fn scanout_candidates(&self, id: ViewId, max_count: usize) -> SceneResult<Vec<ItemId>> {
        let view = self.view(id)?;
        let main = view
            .as_main()
            .ok_or(SceneError::WrongViewKind(id, "main scene view"))?;
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let tree = &self.tree;
        let device_rect = main.device_rect(tree);

        let windows = tree.sorted_children(tree.root());
        for window in windows.into_iter().rev() {
            let Some(entry) = tree.get(window) else {
                continue;
            };
            if !entry.is_visible() || !main.should_render_item(tree, window) {
                continue;
            }
            let area = tree.painted_device_area(window, tree.bounding_rect(window), main);
            if area.is_empty() {
                continue;
            }
            if area != device_rect
                || tree.effective_opacity(window) < 1.0
                || tree.paint_order(window).iter().any(|id| {
                    tree.get(*id).is_some_and(|item| item.is_visible() && item.is_transformed())
                })
            {
                return Ok(Vec::new());
            }
            return Ok(self.window_scanout_surface(window, main).into_iter().collect());
        }
        Ok(Vec::new())
    }

    fn window_scanout_surface(&self, window: ItemId, view: &MainSceneView) -> Option<ItemId> {
        let tree = &self.tree;
        // Last item in the window that draws anything
        let top = tree.paint_order(window).into_iter().rev().find(|id| {
            tree.get(*id).is_some_and(|item| {
                item.is_visible()
                    && view.should_render_item(tree, *id)
                    && !matches!(item.kind(), ItemKind::Container)
            })
        })?;
        let item = tree.get(top)?;
        let surface = item.surface()?;
        if tree.scene_position(top) != tree.scene_position(window) {
            return None;
        }
        let device_rect = view.device_rect(tree);
        if tree.painted_device_area(top, item.rect(), view) != device_rect {
            return None;
        }
        let opaque = tree.contained_device_region(top, &item.opaque(), view);
        if !opaque.contains_rect(&device_rect) {
            return None;
        }
        surface.pixmap()?;
        Some(top)
    }

    /// Largest HDR headroom any visible item on the view asks for
    pub fn desired_hdr_headroom(&self, id: ViewId) -> SceneResult<f64> {
        let view = self.view(id)?.as_scene_view();
        Ok(self
            .rendered_items(view)
            .into_iter()
            .filter_map(|item| self.tree.get(item))
            .filter(|item| item.is_visible())
            .map(|item| item.color_description().headroom())
            .fold(1.0, f64::max))
    }

    // ---- paint cycle ------------------------------------------------------

    fn out_of_order(view: ViewId, operation: &'static str, phase: PaintPhase) -> SceneError {
        SceneError::OutOfOrder {
            view,
            operation,
            phase: phase.as_str(),
        }
    }

    /// Computes the device region of `view` that must be repainted this
    /// frame and consumes the pending repaints that make it up
    pub fn pre_paint(&mut self, id: ViewId) -> SceneResult<Region> {
        let phase = self.view(id)?.as_scene_view().phase();
        let may_start = matches!(phase, PaintPhase::Idle | PaintPhase::PostPainted);
        if !may_start || self.frame.participants.contains(&id) || self.frame_post_painting() {
            return Err(Self::out_of_order(id, "pre_paint", phase));
        }

        if self.frame.participants.is_empty() {
            self.preprocess();
        }
        self.frame.participants.insert(id);

        let is_main = matches!(self.view(id)?, View::Main(_));
        let region = if is_main {
            self.collect_main_repaints(id)
        } else {
            self.collect_tree_repaints(id)
        };
        let state = self.view_mut(id)?.as_scene_view_mut().state_mut();
        state.phase = PaintPhase::PrePainted;
        state.paint_region = region.clone();
        state.painted_surfaces.clear();
        trace!("🖌️ {} pre-paint {:?}", id, region.bounding_rect());
        Ok(region)
    }

    /// Brings pixmaps of visible surfaces up to date before the first view
    /// of a frame paints
    fn preprocess(&mut self) {
        let ids: Vec<ItemId> = self.tree.ids().collect();
        let mut failures = Vec::new();
        let Scene {
            tree,
            renderer,
            frame,
            ..
        } = self;
        for id in ids {
            let Some(item) = tree.get_mut(id) else {
                continue;
            };
            let visible = item.is_visible();
            let Some(surface) = item.surface_mut() else {
                continue;
            };
            if !visible || surface.buffer().is_none() {
                continue;
            }
            let damaged = !surface.damage().is_empty();
            if !damaged && surface.current_pixmap().is_some() {
                continue;
            }
            if damaged {
                frame.consumed.insert(id, surface.damage().clone());
            }
            match surface.update_pixmap(|| renderer.create_texture()) {
                PixmapUpdate::Created => item.discard_quads(),
                PixmapUpdate::Updated => {}
                PixmapUpdate::Failed(error) => failures.push((id, error)),
            }
        }
        for (item, error) in failures {
            self.emit(SceneEvent::PixmapFailed { item, error });
        }
    }

    fn collect_main_repaints(&mut self, id: ViewId) -> Region {
        let Scene {
            tree,
            views,
            settings,
            ..
        } = self;
        let Some(View::Main(view)) = views.get_mut(&id) else {
            return Region::new();
        };
        let device_rect = view.device_rect(tree);
        let scale = view.scale();
        let pad = settings.fractional_damage_padding && scale.fract() != 0.0;

        let mut transformed = false;
        let mut region = Region::new();
        let mut opaque = Region::new();
        let root = tree.root();
        region |= &tree
            .get_mut(root)
            .map(|item| item.take_device_repaints(id))
            .unwrap_or_default();

        // Top-down, so damage below opaque windows can be dropped
        for window in tree.sorted_children(root).into_iter().rev() {
            if !view.should_render_item(tree, window) {
                // Hidden windows keep no stale repaints for this view
                for item in tree.subtree(window) {
                    if let Some(entry) = tree.get_mut(item) {
                        entry.remove_repaints(id);
                    }
                }
                continue;
            }
            let subtree = tree.subtree(window);
            let mut damage = Region::new();
            let mut window_transformed = false;
            for item in &subtree {
                if let Some(entry) = tree.get_mut(*item) {
                    damage |= &entry.take_device_repaints(id);
                    window_transformed |= entry.is_visible() && entry.is_transformed();
                }
            }
            transformed |= window_transformed;
            if pad && !damage.is_empty() {
                damage = damage.padded(1);
            }
            region |= &(&damage - &opaque);

            if window_transformed {
                continue;
            }
            for item in &subtree {
                let Some(entry) = tree.get(*item) else {
                    continue;
                };
                if !entry.is_visible()
                    || !view.should_render_item(tree, *item)
                    || tree.effective_opacity(*item) < 1.0
                {
                    continue;
                }
                let item_opaque = entry.opaque();
                if !item_opaque.is_empty() {
                    opaque |= &tree.contained_device_region(*item, &item_opaque, &*view);
                }
            }
        }

        region |= &std::mem::take(&mut view.state.repaints);
        if transformed {
            return Region::from_rect(device_rect);
        }
        region.intersected_rect(device_rect)
    }

    fn collect_tree_repaints(&mut self, id: ViewId) -> Region {
        let Scene { tree, views, .. } = self;
        let Some(View::ItemTree(view)) = views.get_mut(&id) else {
            return Region::new();
        };
        let device_rect = view.device_rect(tree);
        let mut region = std::mem::take(&mut view.state.repaints);
        let mut transformed = false;
        for item in tree.subtree(view.item()) {
            if let Some(entry) = tree.get_mut(item) {
                region |= &entry.take_device_repaints(id);
                transformed |= entry.is_visible() && entry.is_transformed();
            }
        }
        if transformed {
            return Region::from_rect(device_rect);
        }
        region.intersected_rect(device_rect)
    }

    /// Paints `region` (device pixels) of a view into `target`
    pub fn paint(
        &mut self,
        id: ViewId,
        target: &mut RenderTarget,
        region: &Region,
    ) -> SceneResult<PaintOutcome> {
        let phase = self.view(id)?.as_scene_view().phase();
        if phase != PaintPhase::PrePainted {
            return Err(Self::out_of_order(id, "paint", phase));
        }

        if let Some(candidate) = self.direct_scanout_candidate(id, target)? {
            let state = self.view_mut(id)?.as_scene_view_mut().state_mut();
            state.painted_surfaces.push(candidate);
            state.phase = PaintPhase::Painted;
            debug!("📺 {} scanning out {}", id, candidate);
            return Ok(PaintOutcome::DirectScanout(candidate));
        }

        let order: Vec<ItemId> = {
            let view = self.view(id)?.as_scene_view();
            self.rendered_items(view)
                .into_iter()
                .filter(|item| {
                    self.tree.get(*item).is_some_and(Item::is_visible)
                        && self.tree.effective_opacity(*item) > 0.0
                })
                .collect()
        };
        for item in &order {
            if let Some(entry) = self.tree.get_mut(*item) {
                entry.quads();
            }
        }
        let underlays: Vec<ItemId> = self
            .view(id)?
            .as_main()
            .map(|main| {
                main.underlay_items()
                    .filter(|item| self.tree.get(*item).is_some_and(Item::is_visible))
                    .collect()
            })
            .unwrap_or_default();

        let Scene {
            tree,
            views,
            renderer,
            ..
        } = self;
        let view = views
            .get_mut(&id)
            .ok_or(SceneError::UnknownView(id))?
            .as_scene_view_mut();
        let device_rect = view.device_rect(tree);
        let viewport = RenderViewport {
            device_rect,
            scale: view.scale(),
        };
        let region = region.intersected_rect(device_rect);

        let mut painted = Vec::new();
        let mut nodes = 0;
        renderer.begin_frame(target, &viewport);
        renderer.render_background(target, &viewport, &region);
        if !underlays.is_empty() {
            let mut holes = Region::new();
            for item in &underlays {
                holes.add_rect(tree.painted_device_area(*item, tree.bounding_rect(*item), &*view));
            }
            renderer.clear_region(target, &viewport, &(&region & &holes));
        }
        for item in order {
            let Some(node) = render_node(tree, item, &*view) else {
                continue;
            };
            let bounds = tree.painted_device_area(item, node.quads.bounding_rect(), &*view);
            let clip = region.intersected_rect(bounds);
            if clip.is_empty() {
                continue;
            }
            renderer.render_node(target, &viewport, &node, &clip);
            nodes += 1;
            if node.texture.is_some() {
                painted.push(item);
            }
        }
        renderer.end_frame(target);

        let state = view.state_mut();
        trace!("🖌️ {} painted {} node(s), {} surface(s)", id, nodes, painted.len());
        state.painted_surfaces = painted;
        state.phase = PaintPhase::Painted;
        Ok(PaintOutcome::Composited { nodes })
    }

    fn direct_scanout_candidate(
        &self,
        id: ViewId,
        target: &RenderTarget,
    ) -> SceneResult<Option<ItemId>> {
        let view = self.view(id)?;
        if !target.allows_scanout() || !self.settings.direct_scanout || view.as_main().is_none() {
            return Ok(None);
        }
        if self.has_transformed_items(view.as_scene_view()) {
            return Ok(None);
        }
        let candidates = self.scanout_candidates(id, self.settings.max_scanout_candidates)?;
        Ok(match candidates.as_slice() {
            [candidate] => Some(*candidate),
            _ => None,
        })
    }

    /// Finishes a view's frame. Returns whether the view has to be painted
    /// again right away because something on it is being animated.
    pub fn post_paint(&mut self, id: ViewId) -> SceneResult<bool> {
        let phase = self.view(id)?.as_scene_view().phase();
        if phase != PaintPhase::Painted {
            return Err(Self::out_of_order(id, "post_paint", phase));
        }
        // Every view of this frame has to be painted first
        let waiting = self.frame.participants.iter().any(|participant| {
            self.views
                .get(participant)
                .is_some_and(|view| view.as_scene_view().phase() == PaintPhase::PrePainted)
        });
        if waiting {
            return Err(Self::out_of_order(id, "post_paint", phase));
        }

        let painted = self
            .view(id)?
            .as_scene_view()
            .state()
            .painted_surfaces
            .clone();
        for item in painted {
            let Some(consumed) = self.frame.consumed.remove(&item) else {
                continue;
            };
            if let Some(surface) = self.tree.get_mut(item).and_then(Item::surface_mut) {
                surface.consume_damage(&consumed);
            }
        }

        let animating = self.has_transformed_items(self.view(id)?.as_scene_view());
        self.view_mut(id)?.as_scene_view_mut().state_mut().phase = PaintPhase::PostPainted;
        if self.frame_can_complete() {
            self.complete_frame();
        }
        Ok(animating)
    }

    /// Delivers frame feedback for every surface painted on the view
    pub fn frame(&mut self, id: ViewId, frame: &OutputFrame) -> SceneResult<()> {
        let phase = self.view(id)?.as_scene_view().phase();
        if phase != PaintPhase::PostPainted {
            return Err(Self::out_of_order(id, "frame", phase));
        }
        let state = self.view_mut(id)?.as_scene_view_mut().state_mut();
        state.phase = PaintPhase::Idle;
        let painted = std::mem::take(&mut state.painted_surfaces);
        for item in painted {
            self.emit(SceneEvent::FramePainted {
                view: id,
                item,
                frame: *frame,
            });
        }
        Ok(())
    }

    fn frame_post_painting(&self) -> bool {
        self.frame.participants.iter().any(|participant| {
            self.views
                .get(participant)
                .is_some_and(|view| view.as_scene_view().phase() == PaintPhase::PostPainted)
        })
    }

    fn frame_can_complete(&self) -> bool {
        self.frame.participants.iter().all(|participant| {
            self.views
                .get(participant)
                .map_or(true, |view| view.as_scene_view().phase() == PaintPhase::PostPainted)
        })
    }

    /// Damage uploaded this frame but not painted anywhere is consumed too
    fn complete_frame(&mut self) {
        for (item, consumed) in self.frame.consumed.drain() {
            if let Some(surface) = self.tree.get_mut(item).and_then(Item::surface_mut) {
                surface.consume_damage(&consumed);
            }
        }
        self.frame.participants.clear();
        trace!("✅ Frame complete");
    }
}

fn check_scale(scale: f64) -> SceneResult<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(SceneError::InvalidScale(scale))
    }
}

/// Resolves an item into what the renderer needs, if it draws anything
fn render_node<'a>(tree: &'a ItemTree, id: ItemId, view: &dyn SceneView) -> Option<RenderNode<'a>> {
    let item = tree.get(id)?;
    let quads = item.cached_quads()?;
    if quads.is_empty() {
        return None;
    }
    let (texture, fill) = match item.kind() {
        ItemKind::Container => return None,
        ItemKind::Surface(surface) => (Some(surface.pixmap()?.texture()), None),
        ItemKind::Content(content) => (None, Some(content.color())),
    };
    Some(RenderNode {
        item: id,
        quads,
        texture,
        fill,
        device_origin: tree.device_origin(id, view),
        opacity: tree.effective_opacity(id),
    })
}
