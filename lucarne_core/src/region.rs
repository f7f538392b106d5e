// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel-exact rectangle sets.
//!
//! A [`Region`] is stored in canonical *y-x banded* form:
//!
//! - rectangles never overlap;
//! - rectangles are grouped into horizontal bands sorted top to bottom, and
//!   every rectangle in a band shares the band's `y1`/`y2`;
//! - inside a band rectangles are sorted left to right and never touch;
//! - two vertically adjacent bands with identical horizontal spans are merged.
//!
//! Because the form is canonical, two regions covering the same pixels have
//! the same rectangle list, so `==` compares coverage.
//!
//! All set operations run the same band sweep: split the plane at every
//! distinct `y` edge of both operands, compute the horizontal spans of each
//! operand inside the band, combine them with a boolean operator, then
//! coalesce identical neighbouring bands.

use alloc::vec::Vec;

use kurbo::Shape;

use crate::geom::{Point, Rect};

/// A set of pixels, represented as canonical disjoint rectangles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    rects: Vec<Rect>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Subtract,
}

impl SetOp {
    #[inline]
    fn apply(self, in_a: bool, in_b: bool) -> bool {
        match self {
            Self::Union => in_a || in_b,
            Self::Intersect => in_a && in_b,
            Self::Subtract => in_a && !in_b,
        }
    }
}

impl Region {
    /// The empty region.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// A region covering exactly `rect` (empty if `rect` is empty).
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::new()
        } else {
            Self {
                rects: alloc::vec![rect],
            }
        }
    }

    /// The union of arbitrary, possibly overlapping rectangles.
    #[must_use]
    pub fn from_rects(rects: &[Rect]) -> Self {
        Self {
            rects: combine(rects, &[], SetOp::Union),
        }
    }

    /// `rect` with its four corners rounded off by `radius` pixels.
    ///
    /// A pixel belongs to the region when its centre lies inside the rounded
    /// rectangle. The radius is clamped to half the shorter side.
    #[must_use]
    pub fn from_rounded_rect(rect: Rect, radius: u32) -> Self {
        let radius = radius.min(rect.width() / 2).min(rect.height() / 2);
        if rect.is_empty() || radius == 0 {
            return Self::from_rect(rect);
        }
        let shape = kurbo::RoundedRect::new(
            f64::from(rect.x1),
            f64::from(rect.y1),
            f64::from(rect.x2),
            f64::from(rect.y2),
            f64::from(radius),
        );
        // Bounded by half the rectangle's i32 extent.
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        let mut rects = Vec::new();
        let corner_rows = (rect.y1..rect.y1 + r).chain(rect.y2 - r..rect.y2);
        for y in corner_rows {
            let cy = f64::from(y) + 0.5;
            let inset = (0..=r)
                .find(|dx| shape.contains(kurbo::Point::new(f64::from(rect.x1 + dx) + 0.5, cy)))
                .unwrap_or(r);
            rects.push(Rect::new(rect.x1 + inset, y, rect.x2 - inset, y + 1));
        }
        rects.push(Rect::new(rect.x1, rect.y1 + r, rect.x2, rect.y2 - r));
        Self::from_rects(&rects)
    }

    /// The canonical rectangles making up this region.
    #[inline]
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Returns `true` if the region covers no pixels.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Removes every rectangle.
    #[inline]
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Bounding box of the region ([`Rect::EMPTY`] when empty).
    #[must_use]
    pub fn extents(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::EMPTY, |acc, r| acc.union_bounds(*r))
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> u64 {
        self.rects.iter().map(|r| r.area()).sum()
    }

    /// Returns `true` if the pixel at `(x, y)` is covered.
    #[must_use]
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    /// Returns `true` if the pixel at `p` is covered.
    #[inline]
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        self.contains_point(p.x, p.y)
    }

    /// Set union.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Self {
            rects: combine(&self.rects, &other.rects, SetOp::Union),
        }
    }

    /// Set intersection.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::new();
        }
        Self {
            rects: combine(&self.rects, &other.rects, SetOp::Intersect),
        }
    }

    /// Pixels in `self` that are not in `other`.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        Self {
            rects: combine(&self.rects, &other.rects, SetOp::Subtract),
        }
    }

    /// Union with a single rectangle.
    #[must_use]
    pub fn union_rect(&self, rect: Rect) -> Self {
        self.union(&Self::from_rect(rect))
    }

    /// Intersection with a single rectangle.
    #[must_use]
    pub fn intersect_rect(&self, rect: Rect) -> Self {
        self.intersect(&Self::from_rect(rect))
    }

    /// Removes a single rectangle.
    #[must_use]
    pub fn subtract_rect(&self, rect: Rect) -> Self {
        self.subtract(&Self::from_rect(rect))
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Self) {
        *self = self.union(other);
    }

    /// In-place subtraction.
    pub fn subtract_with(&mut self, other: &Self) {
        *self = self.subtract(other);
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &Self) {
        *self = self.intersect(other);
    }

    /// The region moved by `(dx, dy)`. Translation keeps the form canonical.
    #[must_use]
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            rects: self.rects.iter().map(|r| r.translate(dx, dy)).collect(),
        }
    }

    /// Grows (or, for negative amounts, erodes) the region by `dx`
    /// horizontally and `dy` vertically.
    ///
    /// Growth expands every rectangle and takes the union. Erosion removes
    /// every pixel within the given distance of the region's complement.
    #[must_use]
    pub fn inflate(&self, dx: i32, dy: i32) -> Self {
        if self.is_empty() || (dx == 0 && dy == 0) {
            return self.clone();
        }
        if dx >= 0 && dy >= 0 {
            let grown: Vec<Rect> = self.rects.iter().map(|r| r.inflate(dx, dy)).collect();
            return Self::from_rects(&grown);
        }
        // Mixed signs: grow the positive axis first, then erode the other.
        let grown = self.inflate(dx.max(0), dy.max(0));
        let (ex, ey) = (-(dx.min(0)), -(dy.min(0)));
        let frame = grown.extents().inflate(ex + 1, ey + 1);
        let outside = Self::from_rect(frame).subtract(&grown);
        grown.subtract(&outside.inflate(ex, ey))
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let rects: Vec<Rect> = iter.into_iter().collect();
        Self::from_rects(&rects)
    }
}

// ---------------------------------------------------------------------------
// Band sweep
// ---------------------------------------------------------------------------

/// Combines two rectangle lists with `op`, producing canonical output.
///
/// Inputs need not be canonical: since the band edges include every `y` edge
/// of every input rectangle, each rectangle either covers a band completely
/// or misses it.
fn combine(a: &[Rect], b: &[Rect], op: SetOp) -> Vec<Rect> {
    let mut ys: Vec<i32> = a
        .iter()
        .chain(b)
        .filter(|r| !r.is_empty())
        .flat_map(|r| [r.y1, r.y2])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    let mut out = Vec::new();
    // (y1, y2, spans) of the band waiting to be flushed.
    let mut pending: Option<(i32, i32, Vec<(i32, i32)>)> = None;
    let mut spans_a = Vec::new();
    let mut spans_b = Vec::new();

    for band in ys.windows(2) {
        let (top, bottom) = (band[0], band[1]);
        band_spans(a, top, bottom, &mut spans_a);
        band_spans(b, top, bottom, &mut spans_b);
        let spans = combine_spans(&spans_a, &spans_b, op);

        if let Some((_, y2, prev)) = pending.as_mut() {
            if *y2 == top && *prev == spans {
                *y2 = bottom;
                continue;
            }
        }
        if let Some((y1, y2, prev)) = pending.take() {
            emit_band(&mut out, y1, y2, &prev);
        }
        if !spans.is_empty() {
            pending = Some((top, bottom, spans));
        }
    }
    if let Some((y1, y2, prev)) = pending {
        emit_band(&mut out, y1, y2, &prev);
    }
    out
}

fn emit_band(out: &mut Vec<Rect>, y1: i32, y2: i32, spans: &[(i32, i32)]) {
    out.extend(spans.iter().map(|&(x1, x2)| Rect::new(x1, y1, x2, y2)));
}

/// Sorted, merged horizontal spans of `rects` inside `[top, bottom)`.
fn band_spans(rects: &[Rect], top: i32, bottom: i32, out: &mut Vec<(i32, i32)>) {
    out.clear();
    out.extend(
        rects
            .iter()
            .filter(|r| !r.is_empty() && r.y1 < bottom && r.y2 > top)
            .map(|r| (r.x1, r.x2)),
    );
    out.sort_unstable();
    let mut merged: Vec<(i32, i32)> = Vec::with_capacity(out.len());
    for &(x1, x2) in out.iter() {
        match merged.last_mut() {
            Some(last) if x1 <= last.1 => last.1 = last.1.max(x2),
            _ => merged.push((x1, x2)),
        }
    }
    *out = merged;
}

/// Applies `op` to two sorted, disjoint span lists.
fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: SetOp) -> Vec<(i32, i32)> {
    let mut xs: Vec<i32> = a.iter().chain(b).flat_map(|&(x1, x2)| [x1, x2]).collect();
    xs.sort_unstable();
    xs.dedup();

    let mut out: Vec<(i32, i32)> = Vec::new();
    let (mut ia, mut ib) = (0, 0);
    for seg in xs.windows(2) {
        let (left, right) = (seg[0], seg[1]);
        while ia < a.len() && a[ia].1 <= left {
            ia += 1;
        }
        while ib < b.len() && b[ib].1 <= left {
            ib += 1;
        }
        let in_a = ia < a.len() && a[ia].0 <= left;
        let in_b = ib < b.len() && b[ib].0 <= left;
        if op.apply(in_a, in_b) {
            match out.last_mut() {
                Some(last) if last.1 == left => last.1 = right,
                _ => out.push((left, right)),
            }
        }
    }
    out
}
