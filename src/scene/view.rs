//! Scene views
//!
//! A view is one renderer's window onto the scene. There is one
//! [`MainSceneView`] per output, rendering the whole item tree, and any
//! number of [`ItemTreeView`]s carving a subtree out for separate
//! composition on an output layer (cursor, overlays).
//!
//! The views only hold geometry and bookkeeping; the paint cycle itself is
//! driven by [`crate::scene::Scene`], which enforces the phase ordering.

use super::item::{Item, ItemId, ItemTree};
use crate::geometry::{Point, PointF, Rect, RectF, Region, Size};
use std::fmt;

/// Handle to a view in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub(crate) u32);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Where a view is in the per-frame paint cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintPhase {
    #[default]
    Idle,
    PrePainted,
    Painted,
    PostPainted,
}

impl PaintPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaintPhase::Idle => "idle",
            PaintPhase::PrePainted => "pre-painted",
            PaintPhase::Painted => "painted",
            PaintPhase::PostPainted => "post-painted",
        }
    }
}

/// Per-view paint bookkeeping shared by both view kinds
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub(crate) phase: PaintPhase,
    /// Device repaints not tied to an item
    pub(crate) repaints: Region,
    /// Region returned by the last pre-paint
    pub(crate) paint_region: Region,
    /// Surfaces painted in the current frame, for frame callbacks
    pub(crate) painted_surfaces: Vec<ItemId>,
}

/// Common contract of all views
pub trait SceneView {
    fn id(&self) -> ViewId;

    fn kind_name(&self) -> &'static str;

    /// Logical area of the scene this view shows
    fn viewport(&self, tree: &ItemTree) -> RectF;

    fn scale(&self) -> f64;

    fn render_offset(&self) -> Point;

    /// Top of the subtree this view renders
    fn root_item(&self, tree: &ItemTree) -> ItemId;

    fn should_render_item(&self, tree: &ItemTree, item: ItemId) -> bool;

    fn state(&self) -> &ViewState;

    fn state_mut(&mut self) -> &mut ViewState;

    fn phase(&self) -> PaintPhase {
        self.state().phase
    }

    fn device_size(&self, tree: &ItemTree) -> Size {
        let viewport = self.viewport(tree);
        let scale = self.scale();
        Size::new(
            (viewport.width * scale).round() as i32,
            (viewport.height * scale).round() as i32,
        )
    }

    fn device_rect(&self, tree: &ItemTree) -> Rect {
        let offset = self.render_offset();
        let size = self.device_size(tree);
        Rect::new(offset.x, offset.y, size.width, size.height)
    }

    /// Maps a logical scene rectangle into device pixels of this view
    fn map_to_device(&self, tree: &ItemTree, logical: RectF) -> RectF {
        let viewport = self.viewport(tree);
        let offset = self.render_offset();
        logical
            .translated(PointF::new(-viewport.x, -viewport.y))
            .scaled(self.scale())
            .translated(PointF::new(offset.x as f64, offset.y as f64))
    }

    fn map_to_device_region(&self, tree: &ItemTree, logical: &Region) -> Region {
        logical
            .iter()
            .map(|rect| self.map_to_device(tree, rect.to_f64()).to_aligned_rect())
            .collect()
    }
}

/// Predicate hiding top-level windows from a main view
pub type WindowFilter = Box<dyn Fn(ItemId, &Item) -> bool>;

/// View of the whole scene on one output
pub struct MainSceneView {
    id: ViewId,
    output_name: String,
    viewport: RectF,
    scale: f64,
    render_offset: Point,
    item_views: Vec<ViewId>,
    exclusive: Vec<(ViewId, ItemId)>,
    underlays: Vec<ViewId>,
    window_filters: Vec<WindowFilter>,
    pub(crate) state: ViewState,
}

impl fmt::Debug for MainSceneView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainSceneView")
            .field("id", &self.id)
            .field("output_name", &self.output_name)
            .field("viewport", &self.viewport)
            .field("scale", &self.scale)
            .field("item_views", &self.item_views)
            .field("exclusive", &self.exclusive)
            .field("window_filters", &self.window_filters.len())
            .field("phase", &self.state.phase)
            .finish()
    }
}

impl MainSceneView {
    pub fn new(id: ViewId, output_name: impl Into<String>, viewport: RectF, scale: f64) -> Self {
        Self {
            id,
            output_name: output_name.into(),
            viewport,
            scale,
            render_offset: Point::default(),
            item_views: Vec::new(),
            exclusive: Vec::new(),
            underlays: Vec::new(),
            window_filters: Vec::new(),
            state: ViewState::default(),
        }
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub(crate) fn set_viewport(&mut self, viewport: RectF) {
        self.viewport = viewport;
    }

    pub(crate) fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub(crate) fn set_render_offset(&mut self, offset: Point) {
        self.render_offset = offset;
    }

    /// Item views carved out of this view
    pub fn item_views(&self) -> &[ViewId] {
        &self.item_views
    }

    pub(crate) fn add_item_view(&mut self, view: ViewId) {
        self.item_views.push(view);
    }

    pub(crate) fn remove_item_view(&mut self, view: ViewId) {
        self.item_views.retain(|v| *v != view);
        self.remove_exclusive_view(view);
        self.remove_underlay(view);
    }

    pub(crate) fn add_exclusive_view(&mut self, view: ViewId, item: ItemId) {
        if !self.exclusive.iter().any(|(v, _)| *v == view) {
            self.exclusive.push((view, item));
        }
    }

    pub(crate) fn remove_exclusive_view(&mut self, view: ViewId) {
        self.exclusive.retain(|(v, _)| *v != view);
    }

    pub(crate) fn add_underlay(&mut self, view: ViewId) {
        if !self.underlays.contains(&view) {
            self.underlays.push(view);
        }
    }

    pub(crate) fn remove_underlay(&mut self, view: ViewId) {
        self.underlays.retain(|v| *v != view);
    }

    /// Item views flagged to be composited below this view
    pub fn underlays(&self) -> &[ViewId] {
        &self.underlays
    }

    /// Items of exclusive underlay views. Their area is left transparent
    /// so the layer below shows through.
    pub fn underlay_items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.exclusive
            .iter()
            .filter(|(view, _)| self.underlays.contains(view))
            .map(|(_, item)| *item)
    }

    pub fn is_exclusive_item(&self, item: ItemId) -> bool {
        self.exclusive.iter().any(|(_, i)| *i == item)
    }

    pub(crate) fn add_window_filter(&mut self, filter: WindowFilter) {
        self.window_filters.push(filter);
    }

    pub fn should_hide_window(&self, id: ItemId, window: &Item) -> bool {
        self.window_filters.iter().any(|filter| filter(id, window))
    }
}

impl SceneView for MainSceneView {
    fn id(&self) -> ViewId {
        self.id
    }

    fn kind_name(&self) -> &'static str {
        "main scene view"
    }

    fn viewport(&self, _tree: &ItemTree) -> RectF {
        self.viewport
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn render_offset(&self) -> Point {
        self.render_offset
    }

    fn root_item(&self, tree: &ItemTree) -> ItemId {
        tree.root()
    }

    /// Everything except subtrees carved out by exclusive item views and
    /// windows hidden by a filter
    fn should_render_item(&self, tree: &ItemTree, item: ItemId) -> bool {
        let carved_out = self
            .exclusive
            .iter()
            .any(|(_, exclusive)| *exclusive == item || tree.is_ancestor_of(*exclusive, item));
        if carved_out {
            return false;
        }
        if self.window_filters.is_empty() {
            return true;
        }
        let window = top_level_ancestor(tree, item);
        match window.and_then(|id| tree.get(id).map(|w| (id, w))) {
            Some((id, window)) => !self.should_hide_window(id, window),
            None => true,
        }
    }

    fn state(&self) -> &ViewState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ViewState {
        &mut self.state
    }
}

/// The direct child of the root containing `item`
pub(crate) fn top_level_ancestor(tree: &ItemTree, item: ItemId) -> Option<ItemId> {
    let root = tree.root();
    let mut current = item;
    loop {
        let parent = tree.get(current)?.parent()?;
        if parent == root {
            return Some(current);
        }
        current = parent;
    }
}

/// View of one item and its descendants
#[derive(Debug)]
pub struct ItemTreeView {
    id: ViewId,
    parent: ViewId,
    item: ItemId,
    scale: f64,
    render_offset: Point,
    exclusive: bool,
    underlay: bool,
    pub(crate) state: ViewState,
}

impl ItemTreeView {
    pub fn new(id: ViewId, parent: ViewId, item: ItemId, scale: f64) -> Self {
        Self {
            id,
            parent,
            item,
            scale,
            render_offset: Point::default(),
            exclusive: false,
            underlay: false,
            state: ViewState::default(),
        }
    }

    pub fn parent_view(&self) -> ViewId {
        self.parent
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub(crate) fn set_exclusive_flag(&mut self, exclusive: bool) {
        self.exclusive = exclusive;
    }

    pub fn is_underlay(&self) -> bool {
        self.underlay
    }

    pub(crate) fn set_underlay_flag(&mut self, underlay: bool) {
        self.underlay = underlay;
    }

    pub(crate) fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub(crate) fn set_render_offset(&mut self, offset: Point) {
        self.render_offset = offset;
    }
}

impl SceneView for ItemTreeView {
    fn id(&self) -> ViewId {
        self.id
    }

    fn kind_name(&self) -> &'static str {
        "item tree view"
    }

    /// Bounding rect of the item in scene coordinates, snapped to the
    /// device pixel grid
    fn viewport(&self, tree: &ItemTree) -> RectF {
        if !tree.contains(self.item) {
            return RectF::default();
        }
        let scale = self.scale;
        let bounds = tree
            .bounding_rect(self.item)
            .translated(tree.scene_position(self.item));
        let device = bounds.scaled(scale).rounded();
        device.scaled(1.0 / scale)
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn render_offset(&self) -> Point {
        self.render_offset
    }

    fn root_item(&self, _tree: &ItemTree) -> ItemId {
        self.item
    }

    fn should_render_item(&self, tree: &ItemTree, item: ItemId) -> bool {
        item == self.item || tree.is_ancestor_of(self.item, item)
    }

    fn state(&self) -> &ViewState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ViewState {
        &mut self.state
    }
}

/// A view of either kind
#[derive(Debug)]
pub enum View {
    Main(MainSceneView),
    ItemTree(ItemTreeView),
}

impl View {
    pub fn as_scene_view(&self) -> &dyn SceneView {
        match self {
            View::Main(view) => view,
            View::ItemTree(view) => view,
        }
    }

    pub fn as_scene_view_mut(&mut self) -> &mut dyn SceneView {
        match self {
            View::Main(view) => view,
            View::ItemTree(view) => view,
        }
    }

    pub fn as_main(&self) -> Option<&MainSceneView> {
        match self {
            View::Main(view) => Some(view),
            View::ItemTree(_) => None,
        }
    }

    pub fn as_main_mut(&mut self) -> Option<&mut MainSceneView> {
        match self {
            View::Main(view) => Some(view),
            View::ItemTree(_) => None,
        }
    }

    pub fn as_item_tree(&self) -> Option<&ItemTreeView> {
        match self {
            View::ItemTree(view) => Some(view),
            View::Main(_) => None,
        }
    }

    pub fn as_item_tree_mut(&mut self) -> Option<&mut ItemTreeView> {
        match self {
            View::ItemTree(view) => Some(view),
            View::Main(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SizeF;
    use crate::scene::item::ItemKind;

    #[test]
    fn test_main_view_device_mapping() {
        let view = MainSceneView::new(ViewId(1), "DP-1", RectF::new(1920.0, 0.0, 1280.0, 720.0), 1.5);
        let tree = ItemTree::new();

        assert_eq!(view.device_rect(&tree), Rect::new(0, 0, 1920, 1080));
        let mapped = view.map_to_device(&tree, RectF::new(1930.0, 10.0, 20.0, 20.0));
        assert_eq!(mapped, RectF::new(15.0, 15.0, 30.0, 30.0));
    }

    #[test]
    fn test_exclusive_item_hidden_from_main_view() {
        let mut tree = ItemTree::new();
        let cursor = tree.insert(tree.root(), ItemKind::Container).expect("cursor");
        let child = tree.insert(cursor, ItemKind::Container).expect("child");
        let other = tree.insert(tree.root(), ItemKind::Container).expect("other");

        let mut view = MainSceneView::new(ViewId(1), "DP-1", RectF::new(0.0, 0.0, 100.0, 100.0), 1.0);
        view.add_exclusive_view(ViewId(2), cursor);

        assert!(!view.should_render_item(&tree, cursor));
        assert!(!view.should_render_item(&tree, child));
        assert!(view.should_render_item(&tree, other));

        view.remove_exclusive_view(ViewId(2));
        assert!(view.should_render_item(&tree, child));
    }

    #[test]
    fn test_underlay_items_need_exclusivity() {
        let mut tree = ItemTree::new();
        let video = tree.insert(tree.root(), ItemKind::Container).expect("video");

        let mut view = MainSceneView::new(ViewId(1), "DP-1", RectF::new(0.0, 0.0, 100.0, 100.0), 1.0);
        view.add_item_view(ViewId(2));
        view.add_underlay(ViewId(2));
        assert_eq!(view.underlay_items().count(), 0);

        view.add_exclusive_view(ViewId(2), video);
        assert_eq!(view.underlay_items().collect::<Vec<_>>(), vec![video]);

        view.remove_exclusive_view(ViewId(2));
        assert_eq!(view.underlays(), &[ViewId(2)]);
        assert_eq!(view.underlay_items().count(), 0);

        view.remove_item_view(ViewId(2));
        assert!(view.underlays().is_empty());
    }

    #[test]
    fn test_window_filter() {
        let mut tree = ItemTree::new();
        let hidden = tree.insert(tree.root(), ItemKind::Container).expect("hidden");
        let surface = tree.insert(hidden, ItemKind::Container).expect("surface");
        let shown = tree.insert(tree.root(), ItemKind::Container).expect("shown");

        let mut view = MainSceneView::new(ViewId(1), "DP-1", RectF::new(0.0, 0.0, 100.0, 100.0), 1.0);
        view.add_window_filter(Box::new(move |id, _| id == hidden));

        assert!(!view.should_render_item(&tree, surface));
        assert!(view.should_render_item(&tree, shown));
    }

    #[test]
    fn test_item_tree_view_viewport_snaps() {
        let mut tree = ItemTree::new();
        let cursor = tree.insert(tree.root(), ItemKind::Container).expect("cursor");
        let item = tree.item_mut(cursor).expect("cursor");
        item.set_position(PointF::new(10.3, 20.0));
        item.set_size(SizeF::new(24.0, 24.0));

        let view = ItemTreeView::new(ViewId(2), ViewId(1), cursor, 2.0);
        assert_eq!(view.viewport(&tree), RectF::new(10.5, 20.0, 24.0, 24.0));
        assert_eq!(view.device_rect(&tree), Rect::new(0, 0, 48, 48));
        assert!(view.should_render_item(&tree, cursor));
        assert!(!view.should_render_item(&tree, tree.root()));
    }
}
