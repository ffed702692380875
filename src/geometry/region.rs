//! Rectangle regions for damage tracking
//!
//! A `Region` is a set of pixels stored as a list of non-overlapping
//! rectangles in y-x banded form: rectangles are grouped in horizontal bands
//! sharing the same top and bottom, bands are sorted top to bottom and the
//! rectangles of a band left to right. Touching rectangles inside a band are
//! merged and vertically adjacent bands with identical spans are coalesced,
//! so two regions covering the same pixels always compare equal.
//!
//! # Example
//!
//! ```
//! use tessera::geometry::{Rect, Region};
//!
//! let mut damage = Region::new();
//! damage |= Rect::new(0, 0, 50, 50);
//! damage |= Rect::new(25, 25, 50, 50);
//!
//! assert_eq!(damage.bounding_rect(), Rect::new(0, 0, 75, 75));
//! assert_eq!(damage.area(), 2500 + 2500 - 625);
//! ```

use super::Rect;
use std::ops::{BitAnd, BitOr, BitOrAssign, BitXor, Sub, SubAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Union,
    Intersect,
    Subtract,
    Xor,
}

impl Op {
    fn apply(self, in_a: bool, in_b: bool) -> bool {
        match self {
            Op::Union => in_a || in_b,
            Op::Intersect => in_a && in_b,
            Op::Subtract => in_a && !in_b,
            Op::Xor => in_a != in_b,
        }
    }
}

/// A set of pixels described by banded, non-overlapping rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// Creates an empty region
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// Creates a region covering a single rectangle
    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::new()
        } else {
            Self { rects: vec![rect] }
        }
    }

    /// Region standing in for "repaint everything"
    pub fn infinite() -> Self {
        Self::from_rect(Rect::INFINITE)
    }

    pub fn is_infinite(&self) -> bool {
        self.rects.len() == 1 && self.rects[0] == Rect::INFINITE
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The normalized rectangles making up this region
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rect> {
        self.rects.iter()
    }

    pub fn rect_count(&self) -> usize {
        self.rects.len()
    }

    pub fn bounding_rect(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, rect| acc.united(rect))
    }

    /// Number of pixels covered by the region
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn united(&self, other: &Region) -> Region {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        combine(self, other, Op::Union)
    }

    pub fn intersected(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return Region::new();
        }
        combine(self, other, Op::Intersect)
    }

    pub fn subtracted(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        combine(self, other, Op::Subtract)
    }

    pub fn xored(&self, other: &Region) -> Region {
        combine(self, other, Op::Xor)
    }

    pub fn intersected_rect(&self, rect: Rect) -> Region {
        self.intersected(&Region::from_rect(rect))
    }

    /// Adds a rectangle to the region
    pub fn add_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        *self = self.united(&Region::from_rect(rect));
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Region {
        Region {
            rects: self
                .rects
                .iter()
                .map(|rect| rect.translated(dx, dy))
                .collect(),
        }
    }

    /// Scales every rectangle and grows it outward to whole pixels
    pub fn scaled_aligned(&self, scale: f64) -> Region {
        if self.is_infinite() {
            return self.clone();
        }
        self.rects
            .iter()
            .map(|rect| rect.to_f64().scaled(scale).to_aligned_rect())
            .collect()
    }

    /// Grows every rectangle by `padding` pixels on each side
    pub fn padded(&self, padding: i32) -> Region {
        if padding == 0 || self.is_infinite() {
            return self.clone();
        }
        self.rects
            .iter()
            .map(|rect| rect.adjusted(-padding, -padding, padding, padding))
            .collect()
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|rect| rect.contains_point(x, y))
    }

    /// Checks whether every pixel of `rect` is covered by the region
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        if rect.is_empty() {
            return true;
        }
        Region::from_rect(*rect).subtracted(self).is_empty()
    }

    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let rects: Vec<Rect> = iter.into_iter().filter(|r| !r.is_empty()).collect();
        match rects.len() {
            0 => Region::new(),
            1 => Region::from_rect(rects[0]),
            _ => {
                // Band the raw rectangles first, then normalize
                let raw = Region { rects };
                combine(&raw, &Region::new(), Op::Union)
            }
        }
    }
}

impl Extend<Rect> for Region {
    fn extend<I: IntoIterator<Item = Rect>>(&mut self, iter: I) {
        let other: Region = iter.into_iter().collect();
        *self = self.united(&other);
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

impl<'a> IntoIterator for &'a Region {
    type Item = &'a Rect;
    type IntoIter = std::slice::Iter<'a, Rect>;

    fn into_iter(self) -> Self::IntoIter {
        self.rects.iter()
    }
}

impl BitOr<&Region> for &Region {
    type Output = Region;

    fn bitor(self, rhs: &Region) -> Region {
        self.united(rhs)
    }
}

impl BitAnd<&Region> for &Region {
    type Output = Region;

    fn bitand(self, rhs: &Region) -> Region {
        self.intersected(rhs)
    }
}

impl Sub<&Region> for &Region {
    type Output = Region;

    fn sub(self, rhs: &Region) -> Region {
        self.subtracted(rhs)
    }
}

impl BitXor<&Region> for &Region {
    type Output = Region;

    fn bitxor(self, rhs: &Region) -> Region {
        self.xored(rhs)
    }
}

impl BitOrAssign<&Region> for Region {
    fn bitor_assign(&mut self, rhs: &Region) {
        *self = self.united(rhs);
    }
}

impl BitOrAssign<Region> for Region {
    fn bitor_assign(&mut self, rhs: Region) {
        *self = self.united(&rhs);
    }
}

impl BitOrAssign<Rect> for Region {
    fn bitor_assign(&mut self, rhs: Rect) {
        self.add_rect(rhs);
    }
}

impl SubAssign<&Region> for Region {
    fn sub_assign(&mut self, rhs: &Region) {
        *self = self.subtracted(rhs);
    }
}

/// Horizontal spans of `region` covering the slab `[y0, y1)`.
///
/// Works for both normalized and raw (possibly overlapping) rectangle lists;
/// the result is sorted and merged.
fn spans_in_slab(region: &Region, y0: i32, y1: i32) -> Vec<(i32, i32)> {
    let mut spans: Vec<(i32, i32)> = region
        .rects
        .iter()
        .filter(|rect| rect.top() <= y0 && rect.bottom() >= y1)
        .map(|rect| (rect.left(), rect.right()))
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(i32, i32)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn covered(spans: &[(i32, i32)], x0: i32, x1: i32) -> bool {
    spans.iter().any(|&(start, end)| start <= x0 && end >= x1)
}

fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: Op) -> Vec<(i32, i32)> {
    let mut edges: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|&(start, end)| [start, end])
        .collect();
    edges.sort_unstable();
    edges.dedup();

    let mut out: Vec<(i32, i32)> = Vec::new();
    for pair in edges.windows(2) {
        let (x0, x1) = (pair[0], pair[1]);
        if !op.apply(covered(a, x0, x1), covered(b, x0, x1)) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x0 => last.1 = x1,
            _ => out.push((x0, x1)),
        }
    }
    out
}

fn combine(a: &Region, b: &Region, op: Op) -> Region {
    let mut ys: Vec<i32> = a
        .rects
        .iter()
        .chain(b.rects.iter())
        .flat_map(|rect| [rect.top(), rect.bottom()])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    // (top, bottom, spans)
    let mut bands: Vec<(i32, i32, Vec<(i32, i32)>)> = Vec::new();
    for pair in ys.windows(2) {
        let (y0, y1) = (pair[0], pair[1]);
        let spans = combine_spans(&spans_in_slab(a, y0, y1), &spans_in_slab(b, y0, y1), op);
        if spans.is_empty() {
            continue;
        }
        match bands.last_mut() {
            Some(band) if band.1 == y0 && band.2 == spans => band.1 = y1,
            _ => bands.push((y0, y1, spans)),
        }
    }

    let rects = bands
        .into_iter()
        .flat_map(|(top, bottom, spans)| {
            spans
                .into_iter()
                .map(move |(left, right)| {
                    Rect::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
                })
        })
        .collect();
    Region { rects }
}
