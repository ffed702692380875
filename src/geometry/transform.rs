//! Buffer transforms and the surface-to-buffer matrix
//!
//! Clients may attach buffers that are rotated or flipped relative to the
//! surface, cropped by a source box, and scaled. `BufferMatrix` carries the
//! affine matrix mapping surface-local coordinates into raw buffer pixels
//! together with its inverse; both are always set together.

use super::{PointF, Rect, RectF, Region, Size, SizeF};
use crate::error::SceneError;
use cgmath::{Matrix3, SquareMatrix, Vector3};
use serde::{Deserialize, Serialize};

/// Rotation/flip applied by the client to its buffer contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferTransform {
    #[default]
    Normal,
    Rotated90,
    Rotated180,
    Rotated270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl BufferTransform {
    pub const ALL: [BufferTransform; 8] = [
        BufferTransform::Normal,
        BufferTransform::Rotated90,
        BufferTransform::Rotated180,
        BufferTransform::Rotated270,
        BufferTransform::Flipped,
        BufferTransform::Flipped90,
        BufferTransform::Flipped180,
        BufferTransform::Flipped270,
    ];

    /// Whether the transform swaps width and height
    pub fn transposes(&self) -> bool {
        matches!(
            self,
            BufferTransform::Rotated90
                | BufferTransform::Rotated270
                | BufferTransform::Flipped90
                | BufferTransform::Flipped270
        )
    }

    /// Matrix mapping raw buffer coordinates into transformed (surface
    /// oriented) coordinates, for a buffer of `buffer_size` pixels
    pub fn matrix(&self, buffer_size: SizeF) -> Matrix3<f64> {
        let (w, h) = (buffer_size.width, buffer_size.height);
        match self {
            BufferTransform::Normal => affine(1.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            BufferTransform::Rotated90 => affine(0.0, -1.0, h, 1.0, 0.0, 0.0),
            BufferTransform::Rotated180 => affine(-1.0, 0.0, w, 0.0, -1.0, h),
            BufferTransform::Rotated270 => affine(0.0, 1.0, 0.0, -1.0, 0.0, w),
            BufferTransform::Flipped => affine(-1.0, 0.0, w, 0.0, 1.0, 0.0),
            BufferTransform::Flipped90 => affine(0.0, 1.0, 0.0, 1.0, 0.0, 0.0),
            BufferTransform::Flipped180 => affine(1.0, 0.0, 0.0, 0.0, -1.0, h),
            BufferTransform::Flipped270 => affine(0.0, -1.0, h, -1.0, 0.0, w),
        }
    }

    /// Maps a rectangle given in raw buffer coordinates into transformed space
    pub fn map_rect(&self, rect: RectF, buffer_size: SizeF) -> RectF {
        map_rect_with(&self.matrix(buffer_size), rect)
    }

    pub fn map_size(&self, size: Size) -> Size {
        if self.transposes() {
            size.transposed()
        } else {
            size
        }
    }
}

/// Builds `[a b tx; c d ty; 0 0 1]` (cgmath is column-major)
fn affine(a: f64, b: f64, tx: f64, c: f64, d: f64, ty: f64) -> Matrix3<f64> {
    Matrix3::new(a, c, 0.0, b, d, 0.0, tx, ty, 1.0)
}

fn map_point_with(matrix: &Matrix3<f64>, point: PointF) -> PointF {
    let v = *matrix * Vector3::new(point.x, point.y, 1.0);
    PointF::new(v.x, v.y)
}

fn map_rect_with(matrix: &Matrix3<f64>, rect: RectF) -> RectF {
    let corners = [
        map_point_with(matrix, rect.top_left()),
        map_point_with(matrix, rect.top_right()),
        map_point_with(matrix, rect.bottom_right()),
        map_point_with(matrix, rect.bottom_left()),
    ];
    let (mut left, mut top) = (f64::INFINITY, f64::INFINITY);
    let (mut right, mut bottom) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for corner in corners {
        left = left.min(corner.x);
        top = top.min(corner.y);
        right = right.max(corner.x);
        bottom = bottom.max(corner.y);
    }
    RectF::new(left, top, right - left, bottom - top)
}

/// Surface-to-buffer affine matrix paired with its inverse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferMatrix {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Default for BufferMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl BufferMatrix {
    pub fn identity() -> Self {
        Self {
            forward: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }

    /// Wraps an arbitrary matrix, computing its inverse
    pub fn from_matrix(forward: Matrix3<f64>) -> Result<Self, SceneError> {
        let inverse = forward.invert().ok_or(SceneError::SingularMatrix)?;
        Ok(Self { forward, inverse })
    }

    /// Builds the standard surface-to-buffer matrix.
    ///
    /// `source_box` is the cropped part of the buffer in raw buffer pixels;
    /// an empty box samples the whole buffer. The surface is stretched over
    /// the source box after the buffer transform has been applied to it.
    pub fn surface_to_buffer(
        surface_size: SizeF,
        source_box: RectF,
        transform: BufferTransform,
        buffer_size: Size,
    ) -> Self {
        let buffer_size_f = SizeF::from(buffer_size);
        let source = if source_box.is_empty() {
            RectF::from_size(buffer_size_f)
        } else {
            source_box
        };
        if surface_size.is_empty() || source.is_empty() {
            return Self::identity();
        }

        let to_transformed = transform.matrix(buffer_size_f);
        let box_in_surface_space = map_rect_with(&to_transformed, source);
        let sx = box_in_surface_space.width / surface_size.width;
        let sy = box_in_surface_space.height / surface_size.height;

        let crop = affine(
            sx,
            0.0,
            box_in_surface_space.x,
            0.0,
            sy,
            box_in_surface_space.y,
        );
        let from_transformed = to_transformed.invert().unwrap_or_else(Matrix3::identity);
        let forward = from_transformed * crop;
        match forward.invert() {
            Some(inverse) => Self { forward, inverse },
            None => Self::identity(),
        }
    }

    pub fn forward(&self) -> &Matrix3<f64> {
        &self.forward
    }

    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn inverted(&self) -> Self {
        Self {
            forward: self.inverse,
            inverse: self.forward,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.forward == Matrix3::identity()
    }

    /// Maps a surface-local point to buffer pixels
    pub fn map_point(&self, point: PointF) -> PointF {
        map_point_with(&self.forward, point)
    }

    /// Maps a buffer point back to surface-local coordinates
    pub fn map_point_from_buffer(&self, point: PointF) -> PointF {
        map_point_with(&self.inverse, point)
    }

    /// Bounding rectangle of `rect` mapped into buffer pixels
    pub fn map_rect(&self, rect: RectF) -> RectF {
        map_rect_with(&self.forward, rect)
    }

    pub fn map_rect_from_buffer(&self, rect: RectF) -> RectF {
        map_rect_with(&self.inverse, rect)
    }

    /// Maps a buffer-local region into surface-local coordinates.
    ///
    /// Each rectangle is mapped through the inverse matrix and grown to
    /// whole pixels, so the result always covers the original damage.
    pub fn map_from_buffer(&self, region: &Region) -> Region {
        if self.inverse == Matrix3::identity() {
            return region.clone();
        }
        region
            .iter()
            .map(|rect| self.map_rect_from_buffer(rect.to_f64()).to_aligned_rect())
            .collect()
    }

    pub fn map_to_buffer(&self, region: &Region) -> Region {
        region
            .iter()
            .map(|rect: &Rect| self.map_rect(rect.to_f64()).to_aligned_rect())
            .collect()
    }
}
