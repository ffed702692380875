//! Rendering backends for the scene
//!
//! The scene does not draw anything itself. For every view it resolves the
//! items to paint into [`RenderNode`]s and hands them to an [`ItemRenderer`]
//! together with the region that needs repainting. Backends own the surface
//! textures (`create_texture`) and the pixels of the [`RenderTarget`].
//!
//! # Backends
//!
//! - [`software::SoftwareRenderer`]: CPU rasterizer on tiny-skia, used by the
//!   headless compositor and the tests
//!
//! # Example
//!
//! ```
//! use tessera::renderer::{RenderTarget, SoftwareRenderer};
//! use tessera::scene::{Scene, SceneSettings};
//! use tessera::geometry::RectF;
//!
//! let mut scene = Scene::new(Box::new(SoftwareRenderer::new()), SceneSettings::default());
//! let view = scene
//!     .add_main_view("HEADLESS-1", RectF::new(0.0, 0.0, 64.0, 64.0), 1.0)
//!     .unwrap();
//!
//! let mut target = RenderTarget::new(64, 64).unwrap();
//! let region = scene.pre_paint(view).unwrap();
//! scene.paint(view, &mut target, &region).unwrap();
//! scene.post_paint(view).unwrap();
//! ```

pub mod software;
pub mod swap_profiler;

pub use software::{RenderStats, SoftwareRenderer, SoftwareTexture};
pub use swap_profiler::{BufferingMode, SwapProfiler};

use crate::geometry::{PointF, Rect, Region};
use crate::quads::WindowQuadList;
use crate::scene::{ItemId, SurfaceTexture};
use std::any::Any;
use std::time::Duration;

/// Device-space description of the view being painted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderViewport {
    /// Device pixels covered by the view on the target
    pub device_rect: Rect,
    /// Device pixels per logical pixel
    pub scale: f64,
}

/// One item, resolved for painting
#[derive(Debug, Clone, Copy)]
pub struct RenderNode<'a> {
    pub item: ItemId,
    /// Item-local quads, in logical coordinates
    pub quads: &'a WindowQuadList,
    /// Texture for `Contents` quads, when the item is a surface
    pub texture: Option<&'a dyn SurfaceTexture>,
    /// Solid colour for items without a texture
    pub fill: Option<[u8; 4]>,
    /// Snapped device position of the item's origin
    pub device_origin: PointF,
    pub opacity: f64,
}

/// Pixels a view is painted into
pub struct RenderTarget {
    pixmap: tiny_skia::Pixmap,
    allows_scanout: bool,
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("allows_scanout", &self.allows_scanout)
            .finish()
    }
}

impl RenderTarget {
    /// Creates a transparent target; `None` for a zero size
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            pixmap: tiny_skia::Pixmap::new(width, height)?,
            allows_scanout: false,
        })
    }

    /// Whether a surface may be handed to the output instead of compositing
    pub fn allows_scanout(&self) -> bool {
        self.allows_scanout
    }

    pub fn set_allows_scanout(&mut self, allowed: bool) {
        self.allows_scanout = allowed;
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Premultiplied RGBA value of a pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let pixel = self.pixmap.pixel(x, y)?;
        Some([pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()])
    }

    pub fn pixmap(&self) -> &tiny_skia::Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut tiny_skia::Pixmap {
        &mut self.pixmap
    }
}

/// Presentation feedback for one output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFrame {
    pub sequence: u64,
    /// Time since the compositor started, when the frame was presented
    pub presentation_time: Duration,
}

impl OutputFrame {
    pub fn new(sequence: u64, presentation_time: Duration) -> Self {
        Self {
            sequence,
            presentation_time,
        }
    }
}

/// What a call to `Scene::paint` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    /// Nodes were drawn into the target
    Composited { nodes: usize },
    /// The target was left untouched; the surface of this item is to be
    /// scanned out directly
    DirectScanout(ItemId),
}

/// Backend drawing resolved items
pub trait ItemRenderer {
    fn name(&self) -> &'static str;

    /// New, invalid texture for a surface pixmap
    fn create_texture(&self) -> Box<dyn SurfaceTexture>;

    fn begin_frame(&mut self, target: &mut RenderTarget, viewport: &RenderViewport);

    /// Clears `region` (device pixels) to the background colour
    fn render_background(
        &mut self,
        target: &mut RenderTarget,
        viewport: &RenderViewport,
        region: &Region,
    );

    /// Clears `region` (device pixels) to fully transparent, exposing
    /// whatever is composited below the target
    fn clear_region(&mut self, target: &mut RenderTarget, viewport: &RenderViewport, region: &Region);

    /// Draws one item, touching only pixels inside `clip`
    fn render_node(
        &mut self,
        target: &mut RenderTarget,
        viewport: &RenderViewport,
        node: &RenderNode<'_>,
        clip: &Region,
    );

    fn end_frame(&mut self, target: &mut RenderTarget);

    fn as_any(&self) -> &dyn Any;
}
