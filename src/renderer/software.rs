//! CPU renderer built on tiny-skia
//!
//! Surface textures are premultiplied RGBA pixmaps. Uploads after the first
//! one copy only the damaged rectangles. Nodes are drawn quad by quad in
//! batching order (shadows, decorations, contents): every quad goes through
//! the same interleaved vertex layout a GPU backend would upload, and is
//! then filled rectangle by rectangle inside the clip region.

use super::{ItemRenderer, RenderNode, RenderTarget, RenderViewport};
use crate::error::TextureError;
use crate::geometry::{PointF, Rect, Region, Size};
use crate::quads::{append_interleaved, GpuVertex, QuadSplitter, VertexSnapping, WindowQuadType};
use crate::scene::buffer::{decode_pixel, GraphicsBuffer};
use crate::scene::SurfaceTexture;
use cgmath::{Matrix2, SquareMatrix, Vector2};
use log::{debug, trace};
use serde::Serialize;
use std::any::Any;
use tiny_skia::{
    BlendMode, FilterQuality, Paint, Pattern, Pixmap, SpreadMode, Transform,
};

/// Texture held in system memory
#[derive(Debug, Default)]
pub struct SoftwareTexture {
    pixmap: Option<Pixmap>,
    uploaded_pixels: u64,
}

impl SoftwareTexture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    /// Pixels copied from client buffers so far
    pub fn uploaded_pixels(&self) -> u64 {
        self.uploaded_pixels
    }
}

/// Checks that `buffer` is CPU readable and long enough for its size
fn readable_data(buffer: &GraphicsBuffer) -> Result<(&[u8], usize), TextureError> {
    let (data, stride) = buffer
        .shm_data()
        .ok_or(TextureError::MissingData(buffer.id()))?;
    let size = buffer.size();
    let row = size.width as usize * 4;
    let expected = stride * (size.height as usize).saturating_sub(1) + row;
    if stride < row || data.len() < expected {
        return Err(TextureError::ShortData {
            id: buffer.id(),
            expected,
            actual: data.len(),
        });
    }
    Ok((data, stride))
}

/// Copies `rect` of the buffer into the pixmap; returns the pixel count
fn upload_rect(pixmap: &mut Pixmap, buffer: &GraphicsBuffer, rect: Rect) -> Result<u64, TextureError> {
    let (data, stride) = readable_data(buffer)?;
    let format = buffer.format();
    let width = pixmap.width() as usize;
    let out = pixmap.data_mut();
    for y in rect.top()..rect.bottom() {
        for x in rect.left()..rect.right() {
            let src = y as usize * stride + x as usize * 4;
            let dst = (y as usize * width + x as usize) * 4;
            let (Some(bytes), Some(pixel)) = (data.get(src..src + 4), out.get_mut(dst..dst + 4)) else {
                continue;
            };
            pixel.copy_from_slice(&decode_pixel(format, [bytes[0], bytes[1], bytes[2], bytes[3]]));
        }
    }
    Ok(rect.area() as u64)
}

impl SurfaceTexture for SoftwareTexture {
    fn is_valid(&self) -> bool {
        self.pixmap.is_some()
    }

    fn create(&mut self, buffer: &GraphicsBuffer) -> Result<(), TextureError> {
        let size = buffer.size();
        if size.is_empty() {
            return Err(TextureError::ZeroSize(buffer.id()));
        }
        let mut pixmap = Pixmap::new(size.width as u32, size.height as u32).ok_or_else(|| {
            TextureError::Backend(format!("cannot allocate {}x{} pixmap", size.width, size.height))
        })?;
        let uploaded = upload_rect(&mut pixmap, buffer, Rect::from_size(size))?;
        self.uploaded_pixels += uploaded;
        self.pixmap = Some(pixmap);
        debug!("🖼️ Uploaded buffer {} ({}x{})", buffer.id(), size.width, size.height);
        Ok(())
    }

    fn update(&mut self, buffer: &GraphicsBuffer, damage: &Region) -> Result<(), TextureError> {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return self.create(buffer);
        };
        let bounds = Rect::from_size(buffer.size());
        if pixmap.width() as i32 != bounds.width || pixmap.height() as i32 != bounds.height {
            return self.create(buffer);
        }
        let damage = damage.intersected_rect(bounds);
        for rect in damage.iter() {
            self.uploaded_pixels += upload_rect(pixmap, buffer, *rect)?;
        }
        trace!("Updated {} rect(s) of buffer {}", damage.rect_count(), buffer.id());
        Ok(())
    }

    fn size(&self) -> Size {
        self.pixmap.as_ref().map_or(Size::default(), |pixmap| {
            Size::new(pixmap.width() as i32, pixmap.height() as i32)
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Counters of a software renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub frames: u64,
    pub nodes: u64,
    pub quads: u64,
    /// Bytes of interleaved vertex data produced
    pub vertex_bytes: u64,
    /// Quads of a type the renderer does not batch
    pub dropped_quads: u64,
}

/// Renderer drawing into tiny-skia pixmaps
#[derive(Debug)]
pub struct SoftwareRenderer {
    background: [u8; 4],
    vertices: Vec<GpuVertex>,
    stats: RenderStats,
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::with_background([0, 0, 0, 255])
    }

    /// Renderer clearing repainted areas to a straight RGBA colour
    pub fn with_background(background: [u8; 4]) -> Self {
        Self {
            background,
            vertices: Vec::new(),
            stats: RenderStats::default(),
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }
}

fn tiny_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_xywh(
        rect.x as f32,
        rect.y as f32,
        rect.width as f32,
        rect.height as f32,
    )
}

fn target_bounds(target: &RenderTarget) -> Rect {
    Rect::new(0, 0, target.width() as i32, target.height() as i32)
}

/// Affine map from texture pixels to device pixels for one quad, given as
/// six interleaved vertices (two triangles)
fn texture_transform(
    triangles: &[GpuVertex],
    texture: &Pixmap,
    origin: PointF,
) -> Option<Transform> {
    let (tw, th) = (texture.width() as f32, texture.height() as f32);
    let texel = |v: &GpuVertex| Vector2::new(v.texcoord[0] * tw, v.texcoord[1] * th);
    let device = |v: &GpuVertex| {
        Vector2::new(
            v.position[0] + origin.x as f32,
            v.position[1] + origin.y as f32,
        )
    };
    // Vertex order: top-left, bottom-left, top-right, ...
    let (top_left, bottom_left, top_right) = (&triangles[0], &triangles[1], &triangles[2]);
    let tex = Matrix2::from_cols(
        texel(top_right) - texel(top_left),
        texel(bottom_left) - texel(top_left),
    );
    let dev = Matrix2::from_cols(
        device(top_right) - device(top_left),
        device(bottom_left) - device(top_left),
    );
    let m = dev * tex.invert()?;
    let t = device(top_left) - m * texel(top_left);
    Some(Transform::from_row(m.x.x, m.x.y, m.y.x, m.y.y, t.x, t.y))
}

/// Device bounding rect of one quad
fn quad_device_rect(triangles: &[GpuVertex], origin: PointF) -> Rect {
    let (mut left, mut top) = (f32::MAX, f32::MAX);
    let (mut right, mut bottom) = (f32::MIN, f32::MIN);
    for vertex in triangles {
        left = left.min(vertex.position[0]);
        top = top.min(vertex.position[1]);
        right = right.max(vertex.position[0]);
        bottom = bottom.max(vertex.position[1]);
    }
    Rect::from_corners(
        (left as f64 + origin.x).floor() as i32,
        (top as f64 + origin.y).floor() as i32,
        (right as f64 + origin.x).ceil() as i32,
        (bottom as f64 + origin.y).ceil() as i32,
    )
}

fn fill_clipped(pixmap: &mut Pixmap, area: Rect, clip: &Region, paint: &Paint<'_>) {
    for rect in clip.intersected_rect(area).iter() {
        if let Some(rect) = tiny_rect(*rect) {
            pixmap.fill_rect(rect, paint, Transform::identity(), None);
        }
    }
}

impl ItemRenderer for SoftwareRenderer {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_texture(&self) -> Box<dyn SurfaceTexture> {
        Box::new(SoftwareTexture::new())
    }

    fn begin_frame(&mut self, target: &mut RenderTarget, viewport: &RenderViewport) {
        self.stats.frames += 1;
        trace!(
            "🎨 Frame {} on {}x{} target, viewport {:?}",
            self.stats.frames,
            target.width(),
            target.height(),
            viewport.device_rect
        );
    }

    fn render_background(
        &mut self,
        target: &mut RenderTarget,
        viewport: &RenderViewport,
        region: &Region,
    ) {
        let [r, g, b, a] = self.background;
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.blend_mode = BlendMode::Source;
        paint.anti_alias = false;
        let area = viewport
            .device_rect
            .intersection(&target_bounds(target))
            .unwrap_or_default();
        fill_clipped(target.pixmap_mut(), area, region, &paint);
    }

    fn clear_region(&mut self, target: &mut RenderTarget, viewport: &RenderViewport, region: &Region) {
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 0);
        paint.blend_mode = BlendMode::Source;
        paint.anti_alias = false;
        let area = viewport
            .device_rect
            .intersection(&target_bounds(target))
            .unwrap_or_default();
        fill_clipped(target.pixmap_mut(), area, region, &paint);
    }

    fn render_node(
        &mut self,
        target: &mut RenderTarget,
        viewport: &RenderViewport,
        node: &RenderNode<'_>,
        clip: &Region,
    ) {
        let clip = clip.intersected_rect(target_bounds(target));
        let splitter = QuadSplitter::new(node.quads);
        self.stats.nodes += 1;
        self.stats.quads += splitter.len() as u64;
        self.stats.dropped_quads += splitter.dropped() as u64;

        let texture = node
            .texture
            .and_then(|texture| texture.as_any().downcast_ref::<SoftwareTexture>())
            .and_then(SoftwareTexture::pixmap);
        let opacity = node.opacity.clamp(0.0, 1.0);

        self.vertices.clear();
        self.vertices.reserve(splitter.max_quad_count() * 6);
        for (quad_type, quads) in splitter.passes() {
            if quads.is_empty() {
                continue;
            }
            self.vertices.clear();
            append_interleaved(quads, &mut self.vertices, viewport.scale, VertexSnapping::Round);
            self.stats.vertex_bytes += bytemuck::cast_slice::<GpuVertex, u8>(&self.vertices).len() as u64;

            for triangles in self.vertices.chunks_exact(6) {
                let area = quad_device_rect(triangles, node.device_origin);
                let mut paint = Paint::default();
                paint.anti_alias = false;
                match (quad_type, texture, node.fill) {
                    (WindowQuadType::Contents, Some(pixmap), _) => {
                        let Some(transform) = texture_transform(triangles, pixmap, node.device_origin)
                        else {
                            continue;
                        };
                        paint.shader = Pattern::new(
                            pixmap.as_ref(),
                            SpreadMode::Pad,
                            FilterQuality::Nearest,
                            opacity as f32,
                            transform,
                        );
                    }
                    (_, _, Some([r, g, b, a])) => {
                        paint.set_color_rgba8(r, g, b, (a as f64 * opacity).round() as u8);
                    }
                    _ => continue,
                }
                fill_clipped(target.pixmap_mut(), area, &clip, &paint);
            }
        }
    }

    fn end_frame(&mut self, _target: &mut RenderTarget) {
        trace!("🎨 Frame {} done", self.stats.frames);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
