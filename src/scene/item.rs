//! The item tree
//!
//! Everything the scene renders is an `Item`: window containers, client
//! surfaces, decorations and shadows. Items live in an arena (`ItemTree`)
//! and refer to each other by `ItemId`. Positions are relative to the parent
//! item, in logical coordinates.
//!
//! Item kinds plug their geometry in through [`ItemContent::shape`]; surface
//! items get theirs from the attached buffer.

use super::surface::SurfaceItem;
use super::view::{SceneView, ViewId};
use crate::error::SceneError;
use crate::geometry::{PointF, Rect, RectF, Region, SizeF};
use crate::quads::{rect_quad, WindowQuadList, WindowQuadType};
use std::collections::HashMap;
use std::fmt;

/// Handle to an item in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Luminance levels of an item's content, used for HDR headroom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorDescription {
    /// Luminance of reference white in nits
    pub reference_luminance: f64,
    /// Peak luminance the content uses, if it goes beyond reference white
    pub max_hdr_luminance: Option<f64>,
}

impl Default for ColorDescription {
    fn default() -> Self {
        Self {
            reference_luminance: 203.0,
            max_hdr_luminance: None,
        }
    }
}

impl ColorDescription {
    /// Ratio of peak to reference luminance (1.0 for SDR content)
    pub fn headroom(&self) -> f64 {
        if self.reference_luminance <= 0.0 {
            return 1.0;
        }
        self.max_hdr_luminance.unwrap_or(self.reference_luminance) / self.reference_luminance
    }
}

/// Geometry provider for non-surface items
pub trait ItemContent: fmt::Debug {
    fn quad_type(&self) -> WindowQuadType;

    /// Visible rectangles in item-local coordinates
    fn shape(&self, size: SizeF) -> Vec<RectF>;

    /// Fill colour (straight RGBA) for renderers without a texture
    fn color(&self) -> [u8; 4];

    fn build_quads(&self, size: SizeF) -> WindowQuadList {
        self.shape(size)
            .into_iter()
            .filter(|rect| !rect.is_empty())
            .map(|rect| rect_quad(self.quad_type(), rect))
            .collect()
    }

    /// Part of the item that is fully opaque, item-local
    fn opaque(&self, _size: SizeF) -> Region {
        Region::new()
    }
}

/// Border widths of a server-side decoration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Borders {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Borders {
    pub fn uniform(width: f64) -> Self {
        Self {
            left: width,
            top: width,
            right: width,
            bottom: width,
        }
    }
}

/// Window frame drawn around the client surface
#[derive(Debug, Clone, PartialEq)]
pub struct DecorationContent {
    pub borders: Borders,
    pub color: [u8; 4],
}

impl ItemContent for DecorationContent {
    fn quad_type(&self) -> WindowQuadType {
        WindowQuadType::Decoration
    }

    fn shape(&self, size: SizeF) -> Vec<RectF> {
        let b = self.borders;
        let inner_height = size.height - b.top - b.bottom;
        vec![
            RectF::new(0.0, 0.0, size.width, b.top),
            RectF::new(0.0, b.top, b.left, inner_height),
            RectF::new(size.width - b.right, b.top, b.right, inner_height),
            RectF::new(0.0, size.height - b.bottom, size.width, b.bottom),
        ]
    }

    fn color(&self) -> [u8; 4] {
        self.color
    }

    fn opaque(&self, size: SizeF) -> Region {
        if self.color[3] != 0xff {
            return Region::new();
        }
        self.shape(size)
            .into_iter()
            .map(|rect| rect.to_aligned_rect())
            .filter(|rect| !rect.is_empty())
            .collect()
    }
}

/// Drop shadow extending `radius` beyond the window on every side
///
/// The item is expected to cover the window plus the shadow margin; the
/// window area in the middle is left out of the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowContent {
    pub radius: f64,
    pub color: [u8; 4],
}

impl ItemContent for ShadowContent {
    fn quad_type(&self) -> WindowQuadType {
        WindowQuadType::Shadow
    }

    fn shape(&self, size: SizeF) -> Vec<RectF> {
        let r = self.radius;
        let inner_w = size.width - 2.0 * r;
        let inner_h = size.height - 2.0 * r;
        let (right, bottom) = (size.width - r, size.height - r);
        vec![
            // corners
            RectF::new(0.0, 0.0, r, r),
            RectF::new(right, 0.0, r, r),
            RectF::new(right, bottom, r, r),
            RectF::new(0.0, bottom, r, r),
            // edges
            RectF::new(r, 0.0, inner_w, r),
            RectF::new(right, r, r, inner_h),
            RectF::new(r, bottom, inner_w, r),
            RectF::new(0.0, r, r, inner_h),
        ]
    }

    fn color(&self) -> [u8; 4] {
        self.color
    }
}

/// What an item renders
#[derive(Debug)]
pub enum ItemKind {
    /// Groups children, renders nothing itself (window items, the root)
    Container,
    Surface(SurfaceItem),
    Content(Box<dyn ItemContent>),
}

/// A node of the scene graph
#[derive(Debug)]
pub struct Item {
    parent: Option<ItemId>,
    children: Vec<ItemId>,
    kind: ItemKind,
    position: PointF,
    size: SizeF,
    z: i32,
    opacity: f64,
    explicit_visible: bool,
    effective_visible: bool,
    transformed: bool,
    opaque: Region,
    color: ColorDescription,
    repaints: HashMap<ViewId, Region>,
    quads: Option<WindowQuadList>,
}

impl Item {
    fn new(parent: Option<ItemId>, kind: ItemKind) -> Self {
        Self {
            parent,
            children: Vec::new(),
            kind,
            position: PointF::default(),
            size: SizeF::default(),
            z: 0,
            opacity: 1.0,
            explicit_visible: true,
            effective_visible: true,
            transformed: false,
            opaque: Region::new(),
            color: ColorDescription::default(),
            repaints: HashMap::new(),
            quads: None,
        }
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn surface(&self) -> Option<&SurfaceItem> {
        match &self.kind {
            ItemKind::Surface(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn surface_mut(&mut self) -> Option<&mut SurfaceItem> {
        match &mut self.kind {
            ItemKind::Surface(surface) => Some(surface),
            _ => None,
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self.kind, ItemKind::Surface(_))
    }

    pub fn position(&self) -> PointF {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: PointF) {
        self.position = position;
    }

    pub fn size(&self) -> SizeF {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: SizeF) {
        self.size = size;
        self.quads = None;
    }

    /// Item-local rectangle
    pub fn rect(&self) -> RectF {
        RectF::from_size(self.size)
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub(crate) fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    /// Visibility requested for this item alone
    pub fn explicit_visible(&self) -> bool {
        self.explicit_visible
    }

    /// Visible itself and all of its ancestors visible
    pub fn is_visible(&self) -> bool {
        self.effective_visible
    }

    /// An effect is transforming or animating this item
    pub fn is_transformed(&self) -> bool {
        self.transformed
    }

    pub(crate) fn set_transformed(&mut self, transformed: bool) {
        self.transformed = transformed;
    }

    /// Opaque part of the item, item-local
    pub fn opaque(&self) -> Region {
        match &self.kind {
            ItemKind::Content(content) => &self.opaque | &content.opaque(self.size),
            _ => self.opaque.clone(),
        }
    }

    pub(crate) fn set_opaque(&mut self, region: Region) {
        self.opaque = region;
    }

    pub fn color_description(&self) -> &ColorDescription {
        &self.color
    }

    pub(crate) fn set_color_description(&mut self, color: ColorDescription) {
        self.color = color;
    }

    /// Visible rectangles in item-local coordinates
    pub fn shape(&self) -> Vec<RectF> {
        match &self.kind {
            ItemKind::Container => Vec::new(),
            ItemKind::Surface(_) => vec![self.rect()],
            ItemKind::Content(content) => content.shape(self.size),
        }
    }

    pub fn build_quads(&self) -> WindowQuadList {
        match &self.kind {
            ItemKind::Container => WindowQuadList::new(),
            ItemKind::Surface(surface) => surface.build_quads(&self.shape()),
            ItemKind::Content(content) => content.build_quads(self.size),
        }
    }

    /// Cached quads, built on first use
    pub fn quads(&mut self) -> &WindowQuadList {
        let quads = match self.quads.take() {
            Some(quads) => quads,
            None => self.build_quads(),
        };
        self.quads.insert(quads)
    }

    pub fn cached_quads(&self) -> Option<&WindowQuadList> {
        self.quads.as_ref()
    }

    pub fn discard_quads(&mut self) {
        self.quads = None;
    }

    /// Pending device repaints for a view
    pub fn has_repaints(&self, view: ViewId) -> bool {
        self.repaints.get(&view).is_some_and(|r| !r.is_empty())
    }

    pub fn device_repaints(&self, view: ViewId) -> Option<&Region> {
        self.repaints.get(&view)
    }

    pub(crate) fn add_device_repaint(&mut self, view: ViewId, region: &Region) {
        *self.repaints.entry(view).or_default() |= region;
    }

    pub fn take_device_repaints(&mut self, view: ViewId) -> Region {
        self.repaints.remove(&view).unwrap_or_default()
    }

    pub(crate) fn remove_repaints(&mut self, view: ViewId) {
        self.repaints.remove(&view);
    }
}

/// Arena owning every item of a scene
#[derive(Debug)]
pub struct ItemTree {
    items: Vec<Option<Item>>,
    root: ItemId,
}

impl Default for ItemTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemTree {
    pub fn new() -> Self {
        Self {
            items: vec![Some(Item::new(None, ItemKind::Container))],
            root: ItemId(0),
        }
    }

    pub fn root(&self) -> ItemId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        // The root always exists
        false
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn item(&self, id: ItemId) -> Result<&Item, SceneError> {
        self.get(id).ok_or(SceneError::UnknownItem(id))
    }

    pub fn item_mut(&mut self, id: ItemId) -> Result<&mut Item, SceneError> {
        self.get_mut(id).ok_or(SceneError::UnknownItem(id))
    }

    /// All live item ids
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| ItemId(index as u32))
    }

    pub fn insert(&mut self, parent: ItemId, kind: ItemKind) -> Result<ItemId, SceneError> {
        let parent_visible = self.item(parent)?.effective_visible;
        let id = ItemId(self.items.len() as u32);
        let mut item = Item::new(Some(parent), kind);
        item.effective_visible = parent_visible;
        self.items.push(Some(item));
        self.item_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Removes an item and its whole subtree, returning the removed ids
    pub fn remove(&mut self, id: ItemId) -> Result<Vec<ItemId>, SceneError> {
        if id == self.root {
            return Err(SceneError::RootItem);
        }
        let parent = self.item(id)?.parent;
        let removed = self.subtree(id);
        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.children.retain(|child| *child != id);
        }
        for removed_id in &removed {
            if let Some(slot) = self.items.get_mut(removed_id.0 as usize) {
                *slot = None;
            }
        }
        Ok(removed)
    }

    pub fn set_parent(&mut self, id: ItemId, parent: ItemId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootItem);
        }
        self.item(parent)?;
        if id == parent || self.is_ancestor_of(id, parent) {
            return Err(SceneError::CyclicParent { item: id, parent });
        }
        let old_parent = self.item(id)?.parent;
        if old_parent == Some(parent) {
            return Ok(());
        }
        if let Some(old) = old_parent.and_then(|p| self.get_mut(p)) {
            old.children.retain(|child| *child != id);
        }
        self.item_mut(parent)?.children.push(id);
        self.item_mut(id)?.parent = Some(parent);
        self.update_effective_visibility(id);
        Ok(())
    }

    pub fn set_z(&mut self, id: ItemId, z: i32) -> Result<(), SceneError> {
        self.item_mut(id)?.z = z;
        Ok(())
    }

    pub fn set_visible(&mut self, id: ItemId, visible: bool) -> Result<(), SceneError> {
        self.item_mut(id)?.explicit_visible = visible;
        self.update_effective_visibility(id);
        Ok(())
    }

    fn update_effective_visibility(&mut self, id: ItemId) {
        let parent_visible = self
            .get(id)
            .and_then(|item| item.parent)
            .and_then(|parent| self.get(parent))
            .map_or(true, |parent| parent.effective_visible);
        let mut stack = vec![(id, parent_visible)];
        while let Some((current, parent_visible)) = stack.pop() {
            let Some(item) = self.get_mut(current) else {
                continue;
            };
            item.effective_visible = parent_visible && item.explicit_visible;
            let visible = item.effective_visible;
            stack.extend(item.children.iter().map(|child| (*child, visible)));
        }
    }

    /// Children in insertion order
    pub fn children(&self, id: ItemId) -> &[ItemId] {
        self.get(id).map_or(&[], |item| item.children.as_slice())
    }

    /// Children sorted by z; equal z keeps insertion order
    pub fn sorted_children(&self, id: ItemId) -> Vec<ItemId> {
        let mut children = self.children(id).to_vec();
        children.sort_by_key(|child| self.get(*child).map_or(0, Item::z));
        children
    }

    /// Bottom-to-top painting order of the subtree rooted at `id`.
    ///
    /// Children with negative z are painted below their parent.
    pub fn paint_order(&self, id: ItemId) -> Vec<ItemId> {
        let mut order = Vec::new();
        self.collect_paint_order(id, &mut order);
        order
    }

    fn collect_paint_order(&self, id: ItemId, order: &mut Vec<ItemId>) {
        let children = self.sorted_children(id);
        let split = children
            .iter()
            .position(|child| self.get(*child).map_or(0, Item::z) >= 0)
            .unwrap_or(children.len());
        for child in &children[..split] {
            self.collect_paint_order(*child, order);
        }
        order.push(id);
        for child in &children[split..] {
            self.collect_paint_order(*child, order);
        }
    }

    /// The item and all of its descendants, parents first
    pub fn subtree(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    pub fn is_ancestor_of(&self, ancestor: ItemId, item: ItemId) -> bool {
        let mut current = self.get(item).and_then(|i| i.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|i| i.parent);
        }
        false
    }

    /// Position of the item's origin in scene coordinates
    pub fn scene_position(&self, id: ItemId) -> PointF {
        let mut position = PointF::default();
        let mut current = Some(id);
        while let Some(item) = current.and_then(|id| self.get(id)) {
            position = position + item.position;
            current = item.parent;
        }
        position
    }

    /// Product of the opacities of the item and its ancestors
    pub fn effective_opacity(&self, id: ItemId) -> f64 {
        let mut opacity = 1.0;
        let mut current = Some(id);
        while let Some(item) = current.and_then(|id| self.get(id)) {
            opacity *= item.opacity;
            current = item.parent;
        }
        opacity
    }

    /// Whether the item or one of its ancestors is transformed
    pub fn is_effectively_transformed(&self, id: ItemId) -> bool {
        let mut current = Some(id);
        while let Some(item) = current.and_then(|id| self.get(id)) {
            if item.transformed {
                return true;
            }
            current = item.parent;
        }
        false
    }

    /// Item rectangle united with the bounding rects of all children,
    /// item-local
    pub fn bounding_rect(&self, id: ItemId) -> RectF {
        let Some(item) = self.get(id) else {
            return RectF::default();
        };
        item.children.iter().fold(item.rect(), |acc, child| {
            let child_position = self.get(*child).map_or(PointF::default(), Item::position);
            acc.united(&self.bounding_rect(*child).translated(child_position))
        })
    }

    /// Device pixels covered by `rect` (item-local) when painted in `view`.
    ///
    /// The rect is scaled and rounded first, then every ancestor position is
    /// added snapped to the device pixel grid, matching how the renderer
    /// places items. The result is clipped to the view.
    pub fn painted_device_area(&self, id: ItemId, rect: RectF, view: &dyn SceneView) -> Rect {
        if rect.is_empty() {
            return Rect::default();
        }
        let scale = view.scale();
        let mut snapped = rect.scaled(scale).rounded();
        let mut current = Some(id);
        while let Some(item) = current.and_then(|id| self.get(id)) {
            let offset = PointF::new(
                (item.position.x * scale).round(),
                (item.position.y * scale).round(),
            );
            snapped = snapped.translated(offset);
            current = item.parent;
        }
        let device = view.map_to_device(self, snapped.scaled(1.0 / scale));
        device
            .to_aligned_rect()
            .intersection(&view.device_rect(self))
            .unwrap_or_default()
    }

    /// Device position of the item's origin in `view`, snapped the same
    /// way as [`painted_device_area`](Self::painted_device_area)
    pub fn device_origin(&self, id: ItemId, view: &dyn SceneView) -> PointF {
        let scale = view.scale();
        let mut origin = PointF::default();
        let mut current = Some(id);
        while let Some(item) = current.and_then(|id| self.get(id)) {
            origin = origin
                + PointF::new(
                    (item.position.x * scale).round(),
                    (item.position.y * scale).round(),
                );
            current = item.parent;
        }
        let viewport = view.viewport(self);
        let offset = view.render_offset();
        PointF::new(
            origin.x - viewport.x * scale + offset.x as f64,
            origin.y - viewport.y * scale + offset.y as f64,
        )
    }

    pub fn painted_device_region(&self, id: ItemId, region: &Region, view: &dyn SceneView) -> Region {
        if region.is_infinite() {
            return Region::from_rect(self.painted_device_area(id, self.bounding_rect(id), view));
        }
        region
            .iter()
            .map(|rect| self.painted_device_area(id, rect.to_f64(), view))
            .collect()
    }

    /// Device pixels fully inside `region` (item-local): edges are rounded
    /// inward so partially covered pixels are left out
    pub fn contained_device_region(&self, id: ItemId, region: &Region, view: &dyn SceneView) -> Region {
        let origin = self.scene_position(id);
        region
            .iter()
            .filter_map(|rect| {
                let device = view.map_to_device(self, rect.to_f64().translated(origin));
                let left = device.left().ceil();
                let top = device.top().ceil();
                let right = device.right().floor();
                let bottom = device.bottom().floor();
                if right <= left || bottom <= top {
                    return None;
                }
                Some(Rect::new(
                    left as i32,
                    top as i32,
                    (right - left) as i32,
                    (bottom - top) as i32,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::scene::view::{MainSceneView, ViewId};

    fn main_view(scale: f64) -> MainSceneView {
        MainSceneView::new(ViewId(0), "test", RectF::new(0.0, 0.0, 1000.0, 1000.0), scale)
    }

    #[test]
    fn test_insert_and_remove_subtree() {
        let mut tree = ItemTree::new();
        let root = tree.root();
        let window = tree.insert(root, ItemKind::Container).expect("window");
        let surface = tree
            .insert(window, ItemKind::Surface(SurfaceItem::new()))
            .expect("surface");

        assert_eq!(tree.len(), 3);
        assert!(tree.is_ancestor_of(window, surface));
        assert!(!tree.is_ancestor_of(surface, window));

        let removed = tree.remove(window).expect("remove");
        assert_eq!(removed, vec![window, surface]);
        assert_eq!(tree.len(), 1);
        assert!(tree.children(root).is_empty());
        assert!(matches!(tree.remove(root), Err(SceneError::RootItem)));
    }

    #[test]
    fn test_cyclic_parent_rejected() {
        let mut tree = ItemTree::new();
        let a = tree.insert(tree.root(), ItemKind::Container).expect("a");
        let b = tree.insert(a, ItemKind::Container).expect("b");
        assert!(matches!(
            tree.set_parent(a, b),
            Err(SceneError::CyclicParent { .. })
        ));
    }

    #[test]
    fn test_paint_order_respects_z() {
        let mut tree = ItemTree::new();
        let root = tree.root();
        let a = tree.insert(root, ItemKind::Container).expect("a");
        let b = tree.insert(root, ItemKind::Container).expect("b");
        let below = tree.insert(a, ItemKind::Container).expect("below");
        tree.set_z(below, -1).expect("z");
        tree.set_z(a, 5).expect("z");

        assert_eq!(tree.paint_order(root), vec![root, b, below, a]);
    }

    #[test]
    fn test_effective_visibility_follows_parent() {
        let mut tree = ItemTree::new();
        let window = tree.insert(tree.root(), ItemKind::Container).expect("window");
        let child = tree.insert(window, ItemKind::Container).expect("child");

        tree.set_visible(window, false).expect("hide");
        assert!(!tree.item(child).expect("child").is_visible());
        assert!(tree.item(child).expect("child").explicit_visible());

        tree.set_visible(window, true).expect("show");
        assert!(tree.item(child).expect("child").is_visible());
    }

    #[test]
    fn test_bounding_rect_includes_children() {
        let mut tree = ItemTree::new();
        let window = tree.insert(tree.root(), ItemKind::Container).expect("window");
        tree.item_mut(window).expect("window").set_size(SizeF::new(100.0, 100.0));
        let shadow = tree.insert(window, ItemKind::Container).expect("shadow");
        let item = tree.item_mut(shadow).expect("shadow");
        item.set_position(PointF::new(-10.0, -10.0));
        item.set_size(SizeF::new(120.0, 120.0));

        assert_eq!(
            tree.bounding_rect(window),
            RectF::new(-10.0, -10.0, 120.0, 120.0)
        );
    }

    #[test]
    fn test_painted_device_area_snaps_positions() {
        let mut tree = ItemTree::new();
        let window = tree.insert(tree.root(), ItemKind::Container).expect("window");
        tree.item_mut(window)
            .expect("window")
            .set_position(PointF::new(10.4, 20.0));

        let view = main_view(1.0);
        let area = tree.painted_device_area(window, RectF::new(0.0, 0.0, 50.0, 50.0), &view);
        assert_eq!(area, Rect::new(10, 20, 50, 50));

        let view = main_view(2.0);
        let area = tree.painted_device_area(window, RectF::new(0.0, 0.0, 50.0, 50.0), &view);
        assert_eq!(area, Rect::new(21, 40, 100, 100));
    }

    #[test]
    fn test_device_area_clipped_to_view() {
        let tree = ItemTree::new();
        let view = MainSceneView::new(ViewId(0), "small", RectF::new(0.0, 0.0, 30.0, 30.0), 1.0);
        let area = tree.painted_device_area(tree.root(), RectF::new(-5.0, 10.0, 100.0, 5.0), &view);
        assert_eq!(area, Rect::new(0, 10, 30, 5));
    }

    #[test]
    fn test_decoration_shape() {
        let decoration = DecorationContent {
            borders: Borders {
                left: 2.0,
                top: 20.0,
                right: 2.0,
                bottom: 2.0,
            },
            color: [40, 40, 40, 255],
        };
        let shape = decoration.shape(SizeF::new(104.0, 122.0));
        assert_eq!(shape.len(), 4);
        assert_eq!(shape[0], RectF::new(0.0, 0.0, 104.0, 20.0));
        assert_eq!(shape[2], RectF::new(102.0, 20.0, 2.0, 100.0));

        let quads = decoration.build_quads(SizeF::new(104.0, 122.0));
        assert!(quads.iter().all(|q| q.quad_type() == WindowQuadType::Decoration));
        assert_eq!(decoration.opaque(SizeF::new(104.0, 122.0)).area(), 104 * 122 - 100 * 100);
    }

    #[test]
    fn test_shadow_shape_leaves_center() {
        let shadow = ShadowContent {
            radius: 10.0,
            color: [0, 0, 0, 80],
        };
        let shape = shadow.shape(SizeF::new(120.0, 120.0));
        assert_eq!(shape.len(), 8);
        let covered: Region = shape.iter().map(|r| r.to_aligned_rect()).collect();
        assert_eq!(covered.area(), 120 * 120 - 100 * 100);
        assert!(!covered.contains_point(60, 60));
    }

    #[test]
    fn test_hdr_headroom() {
        let sdr = ColorDescription::default();
        assert_eq!(sdr.headroom(), 1.0);
        let hdr = ColorDescription {
            reference_luminance: 200.0,
            max_hdr_luminance: Some(1000.0),
        };
        assert_eq!(hdr.headroom(), 5.0);
    }

    #[test]
    fn test_surface_quads_cached() {
        let mut tree = ItemTree::new();
        let id = tree
            .insert(tree.root(), ItemKind::Surface(SurfaceItem::new()))
            .expect("surface");
        let item = tree.item_mut(id).expect("surface");
        item.set_size(SizeF::from(Size::new(10, 10)));
        assert!(item.cached_quads().is_none());
        assert!(item.quads().is_empty());
        assert!(item.cached_quads().is_some());
        item.discard_quads();
        assert!(item.cached_quads().is_none());
    }
}
