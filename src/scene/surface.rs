//! Surface items: damage tracking, pixmaps and quads for one client surface
//!
//! # Damage
//!
//! Clients report damage in buffer pixels. [`SurfaceItem::add_damage`] maps
//! it into surface-local coordinates through the inverse surface-to-buffer
//! matrix and accumulates it until the damage has been consumed by a paint.
//!
//! # Pixmap lifecycle
//!
//! ```text
//! absent --update_pixmap--> valid --discard_pixmap--> discarded --last unref--> freed
//!    \--update_pixmap (create fails)--> absent
//! ```
//!
//! A discarded pixmap stays around as the *previous pixmap* so consumers
//! that still sample the old contents (partial repaints, a scanout plane)
//! keep working. Discarding takes one reference itself, which is released
//! once the replacement pixmap has been created successfully.

use super::buffer::{BufferOrigin, GraphicsBuffer};
use super::pixmap::{SurfacePixmap, SurfaceTexture};
use crate::error::TextureError;
use crate::geometry::{BufferMatrix, BufferTransform, PointF, RectF, Region, Size, SizeF};
use crate::quads::{WindowQuad, WindowQuadList, WindowQuadType, WindowVertex};
use log::{debug, trace, warn};
use std::rc::Rc;

/// Scale mismatches smaller than this are treated as equal
const SCALE_EPSILON: f64 = 1e-9;

/// Outcome of [`SurfaceItem::update_pixmap`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixmapUpdate {
    /// A new texture was created; cached quads are stale
    Created,
    /// The existing texture was refreshed
    Updated,
    /// Creating or refreshing the texture failed
    Failed(TextureError),
}

/// Renderable state of one client surface
#[derive(Debug, Default)]
pub struct SurfaceItem {
    buffer: Option<Rc<GraphicsBuffer>>,
    buffer_size: Size,
    buffer_source_box: RectF,
    buffer_transform: BufferTransform,
    surface_to_buffer: BufferMatrix,
    damage: Region,
    pixmap: Option<SurfacePixmap>,
    previous_pixmap: Option<SurfacePixmap>,
    reference_pixmap_counter: u32,
    failure_logged: bool,
}

impl SurfaceItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new client buffer; the buffer size follows the buffer
    pub fn attach_buffer(&mut self, buffer: Option<Rc<GraphicsBuffer>>) {
        if let Some(buffer) = &buffer {
            self.buffer_size = buffer.size();
        }
        self.buffer = buffer;
    }

    pub fn buffer(&self) -> Option<&Rc<GraphicsBuffer>> {
        self.buffer.as_ref()
    }

    pub fn buffer_size(&self) -> Size {
        self.buffer_size
    }

    pub fn set_buffer_size(&mut self, size: Size) {
        self.buffer_size = size;
    }

    /// Part of the buffer that is sampled, in raw buffer pixels
    pub fn buffer_source_box(&self) -> RectF {
        self.buffer_source_box
    }

    pub fn set_buffer_source_box(&mut self, source_box: RectF) {
        self.buffer_source_box = source_box;
    }

    pub fn buffer_transform(&self) -> BufferTransform {
        self.buffer_transform
    }

    pub fn set_buffer_transform(&mut self, transform: BufferTransform) {
        self.buffer_transform = transform;
    }

    pub fn surface_to_buffer_matrix(&self) -> &BufferMatrix {
        &self.surface_to_buffer
    }

    /// Replaces the matrix and its inverse together
    pub fn set_surface_to_buffer_matrix(&mut self, matrix: BufferMatrix) {
        self.surface_to_buffer = matrix;
    }

    /// Rebuilds the matrix from the buffer size, source box and transform
    pub fn update_surface_to_buffer_matrix(&mut self, surface_size: SizeF) {
        self.surface_to_buffer = BufferMatrix::surface_to_buffer(
            surface_size,
            self.buffer_source_box,
            self.buffer_transform,
            self.buffer_size,
        );
    }

    pub fn map_from_buffer(&self, region: &Region) -> Region {
        self.surface_to_buffer.map_from_buffer(region)
    }

    /// Source box size after the buffer transform, relative to the surface.
    ///
    /// This is the scale the client rendered at, e.g. 2.0 for a buffer with
    /// twice as many pixels as the surface has logical units.
    pub fn source_box_scale(&self, surface_size: SizeF) -> (f64, f64) {
        if surface_size.is_empty() {
            return (1.0, 1.0);
        }
        let buffer_size = SizeF::from(self.buffer_size);
        let source = if self.buffer_source_box.is_empty() {
            RectF::from_size(buffer_size)
        } else {
            self.buffer_source_box
        };
        let transformed = self.buffer_transform.map_rect(source, buffer_size);
        (
            transformed.width / surface_size.width,
            transformed.height / surface_size.height,
        )
    }

    /// Accumulates buffer-local damage and returns it in surface-local
    /// coordinates. Empty damage is ignored.
    pub fn add_damage(&mut self, buffer_region: &Region) -> Region {
        if buffer_region.is_empty() {
            return Region::new();
        }
        let surface_damage = self.map_from_buffer(buffer_region);
        self.damage |= &surface_damage;
        trace!("🩹 Surface damage now {:?}", self.damage.bounding_rect());
        surface_damage
    }

    pub fn damage(&self) -> &Region {
        &self.damage
    }

    pub fn reset_damage(&mut self) {
        self.damage = Region::new();
    }

    /// Removes damage that has been consumed, keeping anything added since
    pub fn consume_damage(&mut self, consumed: &Region) {
        self.damage -= consumed;
    }

    /// The pixmap to render: the current one if valid, otherwise the
    /// previous one while it is still alive
    pub fn pixmap(&self) -> Option<&SurfacePixmap> {
        self.pixmap
            .as_ref()
            .filter(|pixmap| pixmap.is_valid())
            .or_else(|| self.previous_pixmap.as_ref().filter(|pixmap| pixmap.is_valid()))
    }

    pub fn current_pixmap(&self) -> Option<&SurfacePixmap> {
        self.pixmap.as_ref()
    }

    pub fn previous_pixmap(&self) -> Option<&SurfacePixmap> {
        self.previous_pixmap.as_ref()
    }

    pub fn previous_pixmap_references(&self) -> u32 {
        self.reference_pixmap_counter
    }

    /// Brings the pixmap up to date with the attached buffer
    pub fn update_pixmap<F>(&mut self, create_texture: F) -> PixmapUpdate
    where
        F: FnOnce() -> Box<dyn SurfaceTexture>,
    {
        let buffer_damage = self.surface_to_buffer.map_to_buffer(&self.damage);
        let buffer = self.buffer.clone();
        let pixmap = self
            .pixmap
            .get_or_insert_with(|| SurfacePixmap::new(create_texture()));

        if pixmap.is_valid() {
            let size_before = pixmap.size();
            return match pixmap.update(buffer, &buffer_damage) {
                // A resized buffer got a new texture, texture coordinates changed
                Ok(()) if pixmap.size() != size_before => PixmapUpdate::Created,
                Ok(()) => PixmapUpdate::Updated,
                Err(err) => self.report_failure(err),
            };
        }

        match pixmap.create(buffer) {
            Ok(()) if pixmap.is_valid() => {
                debug!("🖼️ Created pixmap {:?}", pixmap.size());
                self.failure_logged = false;
                self.unreference_previous_pixmap();
                PixmapUpdate::Created
            }
            Ok(()) => self.report_failure(TextureError::Backend(
                "texture reported success but is not valid".to_string(),
            )),
            Err(err) => self.report_failure(err),
        }
    }

    fn report_failure(&mut self, err: TextureError) -> PixmapUpdate {
        if !self.failure_logged {
            warn!("⚠️ Failed to create surface pixmap: {}", err);
            self.failure_logged = true;
        }
        PixmapUpdate::Failed(err)
    }

    /// Retires the current pixmap after a new buffer has been committed
    pub fn discard_pixmap(&mut self) {
        let Some(mut pixmap) = self.pixmap.take() else {
            return;
        };
        if !pixmap.is_valid() {
            trace!("Dropping never-valid pixmap");
            return;
        }
        // Outstanding references carry over to the replacement
        if self.previous_pixmap.is_some() {
            debug!(
                "🗑️ Replacing previous pixmap still holding {} reference(s)",
                self.reference_pixmap_counter
            );
        }
        pixmap.mark_as_discarded();
        self.previous_pixmap = Some(pixmap);
        self.reference_previous_pixmap();
    }

    pub fn reference_previous_pixmap(&mut self) {
        if self
            .previous_pixmap
            .as_ref()
            .is_some_and(SurfacePixmap::is_discarded)
        {
            self.reference_pixmap_counter += 1;
        }
    }

    pub fn unreference_previous_pixmap(&mut self) {
        if !self
            .previous_pixmap
            .as_ref()
            .is_some_and(SurfacePixmap::is_discarded)
        {
            return;
        }
        self.reference_pixmap_counter = self.reference_pixmap_counter.saturating_sub(1);
        if self.reference_pixmap_counter == 0 {
            debug!("🗑️ Freed previous pixmap");
            self.previous_pixmap = None;
        }
    }

    /// Builds one textured quad per shape rectangle.
    ///
    /// Corners are mapped into buffer pixels, rounded to whole pixels and
    /// normalized by the texture size. Without a valid pixmap there is
    /// nothing to sample and the list is empty.
    pub fn build_quads(&self, shape: &[RectF]) -> WindowQuadList {
        let Some(pixmap) = self.pixmap() else {
            return WindowQuadList::new();
        };
        let texture_size = pixmap.size();
        if texture_size.is_empty() {
            return WindowQuadList::new();
        }
        let (width, height) = (texture_size.width as f64, texture_size.height as f64);
        let flip_y = pixmap.buffer_origin() == BufferOrigin::BottomLeft;

        let mut quads = WindowQuadList::with_capacity(shape.len());
        for rect in shape.iter().filter(|rect| !rect.is_empty()) {
            let corners = [
                rect.top_left(),
                rect.top_right(),
                rect.bottom_right(),
                rect.bottom_left(),
            ];
            let mut verts = [WindowVertex::default(); 4];
            for (vertex, corner) in verts.iter_mut().zip(corners) {
                let buffer_pos: PointF = self.surface_to_buffer.map_point(corner);
                let u = buffer_pos.x.round() / width;
                let mut v = buffer_pos.y.round() / height;
                if flip_y {
                    v = 1.0 - v;
                }
                *vertex = WindowVertex::new(corner.x, corner.y, u, v);
            }
            quads.push(WindowQuad::new(WindowQuadType::Contents, verts));
        }
        quads
    }
}

/// Damage a view has to repaint for a surface rendered at `view_scale`.
///
/// When the view scale differs from the scale the client rendered at,
/// device pixel boundaries do not line up with logical ones and rounding
/// can leave a thin unrepainted seam. The damage is padded by
/// `ceil(0.5 / view_scale)` logical pixels on each side in that case.
pub fn view_damage(surface_damage: &Region, view_scale: f64, buffer_scale: (f64, f64)) -> Region {
    if surface_damage.is_empty() {
        return Region::new();
    }
    let (x_scale, y_scale) = buffer_scale;
    let mismatch = (x_scale - view_scale).abs() > SCALE_EPSILON
        || (y_scale - view_scale).abs() > SCALE_EPSILON;
    if !mismatch || view_scale <= 0.0 {
        return surface_damage.clone();
    }
    let padding = (0.5 / view_scale).ceil() as i32;
    surface_damage.padded(padding)
}
