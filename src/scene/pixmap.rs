//! Surface pixmaps: renderer-side copies of client buffers
//!
//! A `SurfacePixmap` pairs the buffer a client attached with the texture the
//! renderer uploaded from it. When a new buffer replaces it, the old pixmap
//! is kept as the surface item's *previous pixmap* for as long as something
//! still references it (see [`crate::scene::surface::SurfaceItem`]).

use super::buffer::{BufferOrigin, GraphicsBuffer};
use crate::error::TextureError;
use crate::geometry::{Region, Size};
use std::any::Any;
use std::rc::Rc;

/// Backend texture holding the contents of one buffer
///
/// Implemented by each renderer. `create` uploads the whole buffer,
/// `update` refreshes only the damaged part.
pub trait SurfaceTexture: std::fmt::Debug {
    fn is_valid(&self) -> bool;

    fn create(&mut self, buffer: &GraphicsBuffer) -> Result<(), TextureError>;

    fn update(&mut self, buffer: &GraphicsBuffer, damage: &Region) -> Result<(), TextureError>;

    /// Texture size in pixels
    fn size(&self) -> Size;

    fn as_any(&self) -> &dyn Any;
}

/// Texture plus the buffer state it was built from
#[derive(Debug)]
pub struct SurfacePixmap {
    texture: Box<dyn SurfaceTexture>,
    buffer: Option<Rc<GraphicsBuffer>>,
    size: Size,
    has_alpha_channel: bool,
    buffer_origin: BufferOrigin,
    discarded: bool,
}

impl SurfacePixmap {
    pub fn new(texture: Box<dyn SurfaceTexture>) -> Self {
        Self {
            texture,
            buffer: None,
            size: Size::default(),
            has_alpha_channel: false,
            buffer_origin: BufferOrigin::TopLeft,
            discarded: false,
        }
    }

    /// Uploads `buffer` into a fresh texture
    ///
    /// On failure the pixmap stays invalid and keeps no buffer reference.
    pub fn create(&mut self, buffer: Option<Rc<GraphicsBuffer>>) -> Result<(), TextureError> {
        let Some(buffer) = buffer else {
            return Err(TextureError::MissingData(0));
        };
        if buffer.size().is_empty() {
            return Err(TextureError::ZeroSize(buffer.id()));
        }
        if !buffer.format().is_supported() {
            return Err(TextureError::UnsupportedFormat {
                id: buffer.id(),
                format: buffer.format().to_string(),
            });
        }
        self.texture.create(&buffer)?;
        self.size = buffer.size();
        self.has_alpha_channel = buffer.has_alpha_channel();
        self.buffer_origin = buffer.origin();
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Refreshes the damaged part of the texture from the latest buffer
    pub fn update(
        &mut self,
        buffer: Option<Rc<GraphicsBuffer>>,
        damage: &Region,
    ) -> Result<(), TextureError> {
        let Some(buffer) = buffer else {
            return Ok(());
        };
        if buffer.size() != self.size {
            // A resized buffer needs a new texture
            return self.create(Some(buffer));
        }
        self.texture.update(&buffer, damage)?;
        self.has_alpha_channel = buffer.has_alpha_channel();
        self.buffer_origin = buffer.origin();
        self.buffer = Some(buffer);
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.texture.is_valid()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn mark_as_discarded(&mut self) {
        self.discarded = true;
    }

    pub fn texture(&self) -> &dyn SurfaceTexture {
        self.texture.as_ref()
    }

    pub fn buffer(&self) -> Option<&Rc<GraphicsBuffer>> {
        self.buffer.as_ref()
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn has_alpha_channel(&self) -> bool {
        self.has_alpha_channel
    }

    pub fn buffer_origin(&self) -> BufferOrigin {
        self.buffer_origin
    }
}
