//! Geometry primitives for the scene graph
//!
//! Integer rectangles (`Rect`) describe device pixels and damage, floating
//! point rectangles (`RectF`) describe logical item geometry. Rectangles are
//! half-open: `right()` and `bottom()` are exclusive.
//!
//! # Example
//!
//! ```
//! use tessera::geometry::{Rect, RectF};
//!
//! let rect = Rect::new(10, 10, 50, 50);
//! assert_eq!(rect.area(), 2500);
//!
//! // Aligned conversion grows outward to whole pixels
//! let aligned = RectF::new(0.5, 0.5, 10.0, 10.0).to_aligned_rect();
//! assert_eq!(aligned, Rect::new(0, 0, 11, 11));
//! ```

pub mod region;
pub mod transform;

pub use region::Region;
pub use transform::{BufferMatrix, BufferTransform};

use serde::{Deserialize, Serialize};

/// Integer point (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Floating point position in logical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_null(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Snaps the point to the device pixel grid of the given scale
    pub fn snap_to_pixels(&self, scale: f64) -> PointF {
        PointF::new(
            (self.x * scale).round() / scale,
            (self.y * scale).round() / scale,
        )
    }

    pub fn rounded(&self) -> Point {
        Point::new(self.x.round() as i32, self.y.round() as i32)
    }
}

impl std::ops::Add for PointF {
    type Output = PointF;

    fn add(self, rhs: PointF) -> PointF {
        PointF::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for PointF {
    type Output = PointF;

    fn sub(self, rhs: PointF) -> PointF {
        PointF::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Integer size (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// A size is empty if either dimension is zero or negative
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn transposed(&self) -> Size {
        Size::new(self.height, self.width)
    }
}

/// Floating point size in logical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f64,
    pub height: f64,
}

impl SizeF {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

impl From<Size> for SizeF {
    fn from(size: Size) -> Self {
        SizeF::new(size.width as f64, size.height as f64)
    }
}

/// Axis-aligned integer rectangle
///
/// Used for device-space damage and buffer-space regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// X coordinate (pixels)
    pub x: i32,
    /// Y coordinate (pixels)
    pub y: i32,
    /// Width (pixels)
    pub width: i32,
    /// Height (pixels)
    pub height: i32,
}

impl Rect {
    /// Rectangle large enough to stand in for "everything"
    pub const INFINITE: Rect = Rect {
        x: i32::MIN / 2,
        y: i32::MIN / 2,
        width: i32::MAX,
        height: i32::MAX,
    };

    /// Creates a new rectangle
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle from two corners, in any order
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        let x = x1.min(x2);
        let y = y1.min(y2);
        Self {
            x,
            y,
            width: x1.max(x2).saturating_sub(x),
            height: y1.max(y2).saturating_sub(y),
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    /// Exclusive right edge, saturating at `i32::MAX`
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `i32::MAX`
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns the area of this rectangle in pixels
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Checks if this rectangle shares any pixels with another
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.is_empty()
            || other.is_empty()
            || self.right() <= other.x
            || other.right() <= self.x
            || self.bottom() <= other.y
            || other.bottom() <= self.y)
    }

    /// Computes the intersection of two rectangles
    ///
    /// Returns `None` if the rectangles don't intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Smallest rectangle containing both; empty rectangles are ignored
    pub fn united(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Moves the edges by the given deltas (like `QRect::adjusted`)
    pub fn adjusted(&self, dx1: i32, dy1: i32, dx2: i32, dy2: i32) -> Rect {
        Rect::from_corners(
            self.x.saturating_add(dx1),
            self.y.saturating_add(dy1),
            self.right().saturating_add(dx2),
            self.bottom().saturating_add(dy2),
        )
    }

    /// Checks if this rectangle contains a point
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Checks if this rectangle completely contains another rectangle
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    pub fn to_f64(&self) -> RectF {
        RectF::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

/// Axis-aligned floating point rectangle in logical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_points(top_left: PointF, bottom_right: PointF) -> Self {
        Self::new(
            top_left.x,
            top_left.y,
            bottom_right.x - top_left.x,
            bottom_right.y - top_left.y,
        )
    }

    pub fn from_size(size: SizeF) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn top_left(&self) -> PointF {
        PointF::new(self.x, self.y)
    }

    pub fn top_right(&self) -> PointF {
        PointF::new(self.right(), self.y)
    }

    pub fn bottom_right(&self) -> PointF {
        PointF::new(self.right(), self.bottom())
    }

    pub fn bottom_left(&self) -> PointF {
        PointF::new(self.x, self.bottom())
    }

    pub fn size(&self) -> SizeF {
        SizeF::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn translated(&self, offset: PointF) -> RectF {
        RectF::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    pub fn scaled(&self, scale: f64) -> RectF {
        RectF::new(
            self.x * scale,
            self.y * scale,
            self.width * scale,
            self.height * scale,
        )
    }

    /// Rounds every edge to the nearest integer
    pub fn rounded(&self) -> RectF {
        let left = self.left().round();
        let top = self.top().round();
        RectF::new(
            left,
            top,
            self.right().round() - left,
            self.bottom().round() - top,
        )
    }

    /// Smallest integer rectangle containing this rectangle
    pub fn to_aligned_rect(&self) -> Rect {
        let left = self.left().floor();
        let top = self.top().floor();
        let right = self.right().ceil();
        let bottom = self.bottom().ceil();
        Rect::new(
            clamp_coord(left),
            clamp_coord(top),
            clamp_coord(right - left),
            clamp_coord(bottom - top),
        )
    }

    pub fn united(&self, other: &RectF) -> RectF {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        RectF::new(
            left,
            top,
            self.right().max(other.right()) - left,
            self.bottom().max(other.bottom()) - top,
        )
    }

    pub fn intersected(&self, other: &RectF) -> RectF {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return RectF::default();
        }
        RectF::new(left, top, right - left, bottom - top)
    }

    pub fn contains_rect(&self, other: &RectF) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

impl From<Rect> for RectF {
    fn from(rect: Rect) -> Self {
        rect.to_f64()
    }
}

fn clamp_coord(value: f64) -> i32 {
    value.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersection() {
        let r1 = Rect::new(0, 0, 100, 100);
        let r2 = Rect::new(50, 50, 100, 100);

        assert!(r1.intersects(&r2));
        assert_eq!(r1.intersection(&r2), Some(Rect::new(50, 50, 50, 50)));

        let r3 = Rect::new(200, 200, 50, 50);
        assert!(!r1.intersects(&r3));
        assert!(r1.intersection(&r3).is_none());
    }

    #[test]
    fn test_touching_rects_do_not_intersect() {
        let left = Rect::new(0, 0, 10, 10);
        let right = Rect::new(10, 0, 10, 10);
        assert!(!left.intersects(&right));
    }

    #[test]
    fn test_rect_united_ignores_empty() {
        let r = Rect::new(5, 5, 10, 10);
        assert_eq!(r.united(&Rect::default()), r);
        assert_eq!(Rect::default().united(&r), r);
        assert_eq!(
            r.united(&Rect::new(20, 0, 5, 5)),
            Rect::new(5, 0, 20, 15)
        );
    }

    #[test]
    fn test_rect_edges_saturate() {
        let far = Rect::new(i32::MAX - 10, i32::MAX - 5, 100, 100);
        assert_eq!(far.right(), i32::MAX);
        assert_eq!(far.bottom(), i32::MAX);
        assert!(far.contains_point(i32::MAX - 1, i32::MAX - 1));

        let near = Rect::new(i32::MAX - 20, i32::MAX - 20, 20, 20);
        assert_eq!(
            far.intersection(&near),
            Some(Rect::new(i32::MAX - 10, i32::MAX - 5, 10, 5))
        );
        assert_eq!(far.translated(50, 0).left(), i32::MAX);
        assert_eq!(Rect::from_corners(i32::MIN, 0, i32::MAX, 1).width, i32::MAX);
    }

    #[test]
    fn test_rect_from_corners_reversed() {
        let rect = Rect::from_corners(110, 70, 10, 20);
        assert_eq!(rect, Rect::new(10, 20, 100, 50));
    }

    #[test]
    fn test_rect_adjusted() {
        let rect = Rect::new(0, 0, 50, 50).adjusted(-1, -1, 1, 1);
        assert_eq!(rect, Rect::new(-1, -1, 52, 52));
    }

    #[test]
    fn test_rect_contains() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains_point(0, 0));
        assert!(outer.contains_point(99, 99));
        assert!(!outer.contains_point(100, 100));
        assert!(outer.contains_rect(&Rect::new(10, 10, 50, 50)));
        assert!(!outer.contains_rect(&Rect::new(50, 50, 100, 100)));
    }

    #[test]
    fn test_rectf_aligned_grows_outward() {
        let rect = RectF::new(0.25, 1.75, 10.0, 2.0);
        assert_eq!(rect.to_aligned_rect(), Rect::new(0, 1, 11, 3));
    }

    #[test]
    fn test_rectf_rounded() {
        let rect = RectF::new(0.4, 0.6, 9.2, 9.8).rounded();
        assert_eq!(rect, RectF::new(0.0, 1.0, 10.0, 9.0));
    }

    #[test]
    fn test_snap_to_pixels() {
        let p = PointF::new(10.3, 7.7).snap_to_pixels(2.0);
        assert_eq!(p, PointF::new(10.5, 7.5));
    }
}
