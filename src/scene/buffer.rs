//! Client graphics buffers
//!
//! A `GraphicsBuffer` is what a client attaches to its surface. Buffers are
//! shared between the surface (current state), the pixmaps built from them
//! and any direct scanout path, so they travel as `Rc<GraphicsBuffer>`.

use crate::geometry::Size;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Pixel layout of a buffer (DRM fourcc naming, little endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferFormat {
    /// Memory order B, G, R, A
    Argb8888,
    /// Memory order B, G, R, X
    Xrgb8888,
    /// Memory order R, G, B, A
    Abgr8888,
    /// Memory order R, G, B, X
    Xbgr8888,
    /// Any fourcc the compositor cannot sample from
    Other(u32),
}

impl BufferFormat {
    pub fn has_alpha_channel(&self) -> bool {
        matches!(self, BufferFormat::Argb8888 | BufferFormat::Abgr8888)
    }

    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            BufferFormat::Other(_) => None,
            _ => Some(4),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.bytes_per_pixel().is_some()
    }
}

impl std::fmt::Display for BufferFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferFormat::Other(fourcc) => write!(f, "fourcc {:#010x}", fourcc),
            known => write!(f, "{:?}", known),
        }
    }
}

/// Where row 0 of the buffer is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferOrigin {
    #[default]
    TopLeft,
    BottomLeft,
}

/// Pixel storage of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferStorage {
    /// CPU visible shared memory, `stride` bytes per row
    Shm { data: Vec<u8>, stride: usize },
    /// Device memory the CPU cannot read
    Dmabuf,
}

/// A buffer attached by a client
#[derive(Debug)]
pub struct GraphicsBuffer {
    id: u64,
    size: Size,
    format: BufferFormat,
    origin: BufferOrigin,
    storage: BufferStorage,
}

impl GraphicsBuffer {
    /// Shared memory buffer; `data` holds premultiplied pixels
    pub fn shm(size: Size, format: BufferFormat, data: Vec<u8>) -> Self {
        let stride = format.bytes_per_pixel().unwrap_or(4) * size.width.max(0) as usize;
        Self::new(size, format, BufferStorage::Shm { data, stride })
    }

    /// Shared memory buffer filled with one premultiplied RGBA colour
    pub fn solid(size: Size, format: BufferFormat, rgba: [u8; 4]) -> Self {
        let pixel = encode_pixel(format, rgba);
        let pixels = (size.width.max(0) as usize) * (size.height.max(0) as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&pixel);
        }
        Self::shm(size, format, data)
    }

    /// Buffer living in device memory only
    pub fn dmabuf(size: Size, format: BufferFormat) -> Self {
        Self::new(size, format, BufferStorage::Dmabuf)
    }

    fn new(size: Size, format: BufferFormat, storage: BufferStorage) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            size,
            format,
            origin: BufferOrigin::TopLeft,
            storage,
        }
    }

    pub fn with_origin(mut self, origin: BufferOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn has_alpha_channel(&self) -> bool {
        self.format.has_alpha_channel()
    }

    pub fn origin(&self) -> BufferOrigin {
        self.origin
    }

    pub fn storage(&self) -> &BufferStorage {
        &self.storage
    }

    /// Raw bytes and stride of a shared memory buffer
    pub fn shm_data(&self) -> Option<(&[u8], usize)> {
        match &self.storage {
            BufferStorage::Shm { data, stride } => Some((data.as_slice(), *stride)),
            BufferStorage::Dmabuf => None,
        }
    }

    /// Premultiplied RGBA value of the pixel at (x, y), if readable
    pub fn pixel_rgba(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel()?;
        let (data, stride) = self.shm_data()?;
        let offset = y as usize * stride + x as usize * bpp;
        let bytes = data.get(offset..offset + bpp)?;
        Some(decode_pixel(self.format, [bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn encode_pixel(format: BufferFormat, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
    match format {
        BufferFormat::Argb8888 => [b, g, r, a],
        BufferFormat::Xrgb8888 => [b, g, r, 0xff],
        BufferFormat::Abgr8888 | BufferFormat::Other(_) => [r, g, b, a],
        BufferFormat::Xbgr8888 => [r, g, b, 0xff],
    }
}

/// Converts stored bytes into premultiplied RGBA
pub fn decode_pixel(format: BufferFormat, bytes: [u8; 4]) -> [u8; 4] {
    match format {
        BufferFormat::Argb8888 => [bytes[2], bytes[1], bytes[0], bytes[3]],
        BufferFormat::Xrgb8888 => [bytes[2], bytes[1], bytes[0], 0xff],
        BufferFormat::Abgr8888 | BufferFormat::Other(_) => bytes,
        BufferFormat::Xbgr8888 => [bytes[0], bytes[1], bytes[2], 0xff],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_ids_are_unique() {
        let a = GraphicsBuffer::dmabuf(Size::new(10, 10), BufferFormat::Argb8888);
        let b = GraphicsBuffer::dmabuf(Size::new(10, 10), BufferFormat::Argb8888);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_solid_buffer_pixels() {
        let buffer = GraphicsBuffer::solid(Size::new(4, 2), BufferFormat::Argb8888, [10, 20, 30, 255]);
        assert_eq!(buffer.pixel_rgba(3, 1), Some([10, 20, 30, 255]));
        assert_eq!(buffer.pixel_rgba(4, 0), None);
        let (data, stride) = buffer.shm_data().expect("shm buffer");
        assert_eq!(stride, 16);
        assert_eq!(&data[0..4], &[30, 20, 10, 255]);
    }

    #[test]
    fn test_opaque_formats_ignore_alpha() {
        let buffer = GraphicsBuffer::solid(Size::new(1, 1), BufferFormat::Xbgr8888, [1, 2, 3, 0]);
        assert!(!buffer.has_alpha_channel());
        assert_eq!(buffer.pixel_rgba(0, 0), Some([1, 2, 3, 255]));
    }

    #[test]
    fn test_unsupported_format() {
        let format = BufferFormat::Other(0x3231_564e);
        assert!(!format.is_supported());
        assert_eq!(format.to_string(), "fourcc 0x3231564e");
    }
}
