//! Window quads: textured render geometry
//!
//! A `WindowQuad` is four vertices, clockwise from the top-left corner, each
//! carrying a surface-local position and a normalized texture coordinate.
//! Quads are tagged with the kind of item that produced them so renderers
//! can batch shadows, decorations and contents separately (see
//! [`splitter::QuadSplitter`]).
//!
//! # Example
//!
//! ```
//! use tessera::quads::{WindowQuad, WindowQuadList, WindowQuadType, WindowVertex};
//!
//! let quad = WindowQuad::new(
//!     WindowQuadType::Contents,
//!     [
//!         WindowVertex::new(0.0, 0.0, 0.0, 0.0),
//!         WindowVertex::new(100.0, 0.0, 1.0, 0.0),
//!         WindowVertex::new(100.0, 100.0, 1.0, 1.0),
//!         WindowVertex::new(0.0, 100.0, 0.0, 1.0),
//!     ],
//! );
//!
//! let mut list = WindowQuadList::new();
//! list.push(quad);
//!
//! // Split into a 2x2 grid for effects deforming the window
//! assert_eq!(list.make_grid(50).len(), 4);
//! ```

pub mod splitter;

pub use splitter::QuadSplitter;

use crate::geometry::RectF;
use bytemuck::{Pod, Zeroable};
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// Category of a window quad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowQuadType {
    Shadow,
    Decoration,
    Contents,
    /// Quads generated by effects; not part of any batching category
    Effect(u16),
}

/// One corner of a window quad
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowVertex {
    /// Surface-local position
    pub x: f64,
    pub y: f64,
    /// Normalized texture coordinate
    pub u: f64,
    pub v: f64,
}

impl WindowVertex {
    pub const fn new(x: f64, y: f64, u: f64, v: f64) -> Self {
        Self { x, y, u, v }
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

/// Vertex layout uploaded to the GPU (two triangles per quad)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 2],
    pub texcoord: [f32; 2],
}

/// How vertex positions are converted to device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexSnapping {
    #[default]
    None,
    Round,
}

/// Textured quadrilateral
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowQuad {
    verts: [WindowVertex; 4],
    quad_type: WindowQuadType,
}

impl WindowQuad {
    pub fn new(quad_type: WindowQuadType, verts: [WindowVertex; 4]) -> Self {
        Self { verts, quad_type }
    }

    pub fn quad_type(&self) -> WindowQuadType {
        self.quad_type
    }

    pub fn vertices(&self) -> &[WindowVertex; 4] {
        &self.verts
    }

    pub fn left(&self) -> f64 {
        self.verts.iter().map(|v| v.x).fold(f64::INFINITY, f64::min)
    }

    pub fn right(&self) -> f64 {
        self.verts.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn top(&self) -> f64 {
        self.verts.iter().map(|v| v.y).fold(f64::INFINITY, f64::min)
    }

    pub fn bottom(&self) -> f64 {
        self.verts.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn bounding_rect(&self) -> RectF {
        let left = self.left();
        let top = self.top();
        RectF::new(left, top, self.right() - left, self.bottom() - top)
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for vertex in &mut self.verts {
            vertex.move_by(dx, dy);
        }
    }

    /// Whether the quad needs a smoothing (filtered) texture lookup
    ///
    /// True when a vertex is off the pixel grid or the quad is no longer
    /// axis aligned.
    pub fn smooth_needed(&self) -> bool {
        let off_grid = self
            .verts
            .iter()
            .any(|v| v.x.fract() != 0.0 || v.y.fract() != 0.0);
        let [tl, tr, br, bl] = self.verts;
        let axis_aligned = tl.y == tr.y && bl.y == br.y && tl.x == bl.x && tr.x == br.x;
        off_grid || !axis_aligned
    }

    /// Cuts out the part of the quad between the given coordinates.
    ///
    /// Texture coordinates are bilinearly interpolated from the corners, so
    /// the sub quad samples the same texels it covers.
    pub fn make_sub_quad(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> WindowQuad {
        debug_assert!(x1 < x2 && y1 < y2);
        debug_assert!(x1 >= self.left() && x2 <= self.right());
        debug_assert!(y1 >= self.top() && y2 <= self.bottom());

        let x_origin = self.left();
        let y_origin = self.top();
        let width_reciprocal = 1.0 / (self.right() - x_origin);
        let height_reciprocal = 1.0 / (self.bottom() - y_origin);

        let positions = [(x1, y1), (x2, y1), (x2, y2), (x1, y2)];
        let src = &self.verts;
        let mut verts = [WindowVertex::default(); 4];
        for (vertex, (px, py)) in verts.iter_mut().zip(positions) {
            let w1 = (px - x_origin) * width_reciprocal;
            let w2 = (py - y_origin) * height_reciprocal;
            let bilinear = |a: f64, b: f64, c: f64, d: f64| {
                (1.0 - w1) * (1.0 - w2) * a + w1 * (1.0 - w2) * b + w1 * w2 * c + (1.0 - w1) * w2 * d
            };
            *vertex = WindowVertex::new(
                px,
                py,
                bilinear(src[0].u, src[1].u, src[2].u, src[3].u),
                bilinear(src[0].v, src[1].v, src[2].v, src[3].v),
            );
        }
        WindowQuad {
            verts,
            quad_type: self.quad_type,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.left() == self.right() || self.top() == self.bottom()
    }
}

impl Index<usize> for WindowQuad {
    type Output = WindowVertex;

    fn index(&self, index: usize) -> &WindowVertex {
        &self.verts[index]
    }
}

impl IndexMut<usize> for WindowQuad {
    fn index_mut(&mut self, index: usize) -> &mut WindowVertex {
        &mut self.verts[index]
    }
}

/// Ordered list of window quads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowQuadList(Vec<WindowQuad>);

impl WindowQuadList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Splits every quad crossing the vertical line `x` in two
    pub fn split_at_x(&self, x: f64) -> WindowQuadList {
        let mut ret = WindowQuadList::with_capacity(self.len());
        for quad in self.iter() {
            let whole_left = quad.verts.iter().all(|v| v.x <= x);
            let whole_right = quad.verts.iter().all(|v| v.x >= x);
            if whole_left || whole_right || quad.is_degenerate() {
                ret.push(*quad);
                continue;
            }
            ret.push(quad.make_sub_quad(quad.left(), quad.top(), x, quad.bottom()));
            ret.push(quad.make_sub_quad(x, quad.top(), quad.right(), quad.bottom()));
        }
        ret
    }

    /// Splits every quad crossing the horizontal line `y` in two
    pub fn split_at_y(&self, y: f64) -> WindowQuadList {
        let mut ret = WindowQuadList::with_capacity(self.len());
        for quad in self.iter() {
            let whole_top = quad.verts.iter().all(|v| v.y <= y);
            let whole_bottom = quad.verts.iter().all(|v| v.y >= y);
            if whole_top || whole_bottom || quad.is_degenerate() {
                ret.push(*quad);
                continue;
            }
            ret.push(quad.make_sub_quad(quad.left(), quad.top(), quad.right(), y));
            ret.push(quad.make_sub_quad(quad.left(), y, quad.right(), quad.bottom()));
        }
        ret
    }

    /// Subdivides the quads along a grid of `max_quad_size` cells anchored
    /// at the top-left of the list's bounding rectangle
    pub fn make_grid(&self, max_quad_size: u32) -> WindowQuadList {
        if self.is_empty() || max_quad_size == 0 {
            return self.clone();
        }
        let bounds = self.bounding_rect();
        let step = max_quad_size as f64;
        self.subdivide(bounds, step, step)
    }

    /// Subdivides the list's bounding rectangle into `x_subdivisions` by
    /// `y_subdivisions` equal cells
    pub fn make_regular_grid(&self, x_subdivisions: u32, y_subdivisions: u32) -> WindowQuadList {
        if self.is_empty() || x_subdivisions == 0 || y_subdivisions == 0 {
            return self.clone();
        }
        let bounds = self.bounding_rect();
        let x_step = bounds.width / x_subdivisions as f64;
        let y_step = bounds.height / y_subdivisions as f64;
        if x_step <= 0.0 || y_step <= 0.0 {
            return self.clone();
        }
        self.subdivide(bounds, x_step, y_step)
    }

    fn subdivide(&self, bounds: RectF, x_step: f64, y_step: f64) -> WindowQuadList {
        let mut ret = WindowQuadList::new();
        for quad in self.iter() {
            if quad.is_degenerate() {
                ret.push(*quad);
                continue;
            }
            let (quad_left, quad_right) = (quad.left(), quad.right());
            let (quad_top, quad_bottom) = (quad.top(), quad.bottom());

            let x_begin = bounds.x + ((quad_left - bounds.x) / x_step).floor() * x_step;
            let y_begin = bounds.y + ((quad_top - bounds.y) / y_step).floor() * y_step;

            let mut y = y_begin;
            while y < quad_bottom {
                let y0 = y.max(quad_top);
                let y1 = quad_bottom.min(y + y_step);
                let mut x = x_begin;
                while x < quad_right {
                    let x0 = x.max(quad_left);
                    let x1 = quad_right.min(x + x_step);
                    if x0 < x1 && y0 < y1 {
                        ret.push(quad.make_sub_quad(x0, y0, x1, y1));
                    }
                    x += x_step;
                }
                y += y_step;
            }
        }
        ret
    }

    /// Quads of the given type only
    pub fn select(&self, quad_type: WindowQuadType) -> WindowQuadList {
        self.iter()
            .filter(|quad| quad.quad_type == quad_type)
            .copied()
            .collect()
    }

    /// All quads except those of the given type
    pub fn filter_out(&self, quad_type: WindowQuadType) -> WindowQuadList {
        self.iter()
            .filter(|quad| quad.quad_type != quad_type)
            .copied()
            .collect()
    }

    pub fn smooth_needed(&self) -> bool {
        self.iter().any(WindowQuad::smooth_needed)
    }

    pub fn bounding_rect(&self) -> RectF {
        self.iter()
            .fold(RectF::default(), |acc, quad| acc.united(&quad.bounding_rect()))
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for quad in self.0.iter_mut() {
            quad.translate(dx, dy);
        }
    }

    /// Appends the quads as triangles (top-left, bottom-left, top-right,
    /// then top-right, bottom-left, bottom-right) scaled to device pixels
    pub fn make_interleaved_arrays(
        &self,
        out: &mut Vec<GpuVertex>,
        device_scale: f64,
        snapping: VertexSnapping,
    ) {
        append_interleaved(self.iter(), out, device_scale, snapping);
    }

    pub fn into_inner(self) -> Vec<WindowQuad> {
        self.0
    }
}

pub(crate) fn append_interleaved<'a>(
    quads: impl IntoIterator<Item = &'a WindowQuad>,
    out: &mut Vec<GpuVertex>,
    device_scale: f64,
    snapping: VertexSnapping,
) {
    let to_gpu = |vertex: &WindowVertex| {
        let (mut x, mut y) = (vertex.x * device_scale, vertex.y * device_scale);
        if snapping == VertexSnapping::Round {
            x = x.round();
            y = y.round();
        }
        GpuVertex {
            position: [x as f32, y as f32],
            texcoord: [vertex.u as f32, vertex.v as f32],
        }
    };
    for quad in quads {
        let v = &quad.verts;
        out.extend_from_slice(&[
            to_gpu(&v[0]),
            to_gpu(&v[3]),
            to_gpu(&v[1]),
            to_gpu(&v[1]),
            to_gpu(&v[3]),
            to_gpu(&v[2]),
        ]);
    }
}

impl Deref for WindowQuadList {
    type Target = Vec<WindowQuad>;

    fn deref(&self) -> &Vec<WindowQuad> {
        &self.0
    }
}

impl DerefMut for WindowQuadList {
    fn deref_mut(&mut self) -> &mut Vec<WindowQuad> {
        &mut self.0
    }
}

impl FromIterator<WindowQuad> for WindowQuadList {
    fn from_iter<I: IntoIterator<Item = WindowQuad>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<WindowQuad>> for WindowQuadList {
    fn from(quads: Vec<WindowQuad>) -> Self {
        Self(quads)
    }
}

impl<'a> IntoIterator for &'a WindowQuadList {
    type Item = &'a WindowQuad;
    type IntoIter = std::slice::Iter<'a, WindowQuad>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Axis-aligned quad covering `rect` and sampling the whole texture
pub fn rect_quad(quad_type: WindowQuadType, rect: RectF) -> WindowQuad {
    WindowQuad::new(
        quad_type,
        [
            WindowVertex::new(rect.left(), rect.top(), 0.0, 0.0),
            WindowVertex::new(rect.right(), rect.top(), 1.0, 0.0),
            WindowVertex::new(rect.right(), rect.bottom(), 1.0, 1.0),
            WindowVertex::new(rect.left(), rect.bottom(), 0.0, 1.0),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> WindowQuad {
        rect_quad(WindowQuadType::Contents, RectF::new(0.0, 0.0, 100.0, 50.0))
    }

    #[test]
    fn test_sub_quad_interpolates_texcoords() {
        let sub = unit_quad().make_sub_quad(25.0, 0.0, 75.0, 25.0);
        assert_eq!(sub[0], WindowVertex::new(25.0, 0.0, 0.25, 0.0));
        assert_eq!(sub[2], WindowVertex::new(75.0, 25.0, 0.75, 0.5));
        assert_eq!(sub.quad_type(), WindowQuadType::Contents);
    }

    #[test]
    fn test_split_at_x() {
        let list: WindowQuadList = vec![unit_quad()].into();
        let split = list.split_at_x(40.0);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].right(), 40.0);
        assert_eq!(split[1].left(), 40.0);

        // Line outside the quad leaves it untouched
        assert_eq!(list.split_at_x(200.0), list);
    }

    #[test]
    fn test_split_at_y() {
        let list: WindowQuadList = vec![unit_quad()].into();
        let split = list.split_at_y(10.0);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].bottom(), 10.0);
        assert_eq!(split[1].top(), 10.0);
    }

    #[test]
    fn test_make_grid() {
        let list: WindowQuadList = vec![unit_quad()].into();
        let grid = list.make_grid(30);
        // 4 columns (30, 30, 30, 10) by 2 rows (30, 20)
        assert_eq!(grid.len(), 8);
        assert_eq!(grid.bounding_rect(), RectF::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(list.make_grid(0), list);
    }

    #[test]
    fn test_make_regular_grid() {
        let list: WindowQuadList = vec![unit_quad()].into();
        let grid = list.make_regular_grid(4, 2);
        assert_eq!(grid.len(), 8);
        assert!(grid.iter().all(|q| q.bounding_rect().width == 25.0));
    }

    #[test]
    fn test_select_and_filter_out() {
        let shadow = rect_quad(WindowQuadType::Shadow, RectF::new(0.0, 0.0, 10.0, 10.0));
        let list: WindowQuadList = vec![unit_quad(), shadow, unit_quad()].into();
        assert_eq!(list.select(WindowQuadType::Contents).len(), 2);
        assert_eq!(list.filter_out(WindowQuadType::Contents).len(), 1);
    }

    #[test]
    fn test_smooth_needed() {
        let mut quad = unit_quad();
        assert!(!quad.smooth_needed());
        quad.translate(0.5, 0.0);
        assert!(quad.smooth_needed());
    }

    #[test]
    fn test_interleaved_arrays() {
        let list: WindowQuadList = vec![unit_quad()].into();
        let mut out = Vec::new();
        list.make_interleaved_arrays(&mut out, 2.0, VertexSnapping::Round);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].position, [0.0, 0.0]);
        assert_eq!(out[1].position, [0.0, 100.0]);
        assert_eq!(out[2].position, [200.0, 0.0]);
        assert_eq!(out[5].texcoord, [1.0, 1.0]);

        let bytes: &[u8] = bytemuck::cast_slice(&out);
        assert_eq!(bytes.len(), 6 * std::mem::size_of::<GpuVertex>());
    }
}
