// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer screen-space geometry.
//!
//! All coordinates are device pixels. Rectangles are half-open: a [`Rect`]
//! covers `x1 <= x < x2` and `y1 <= y < y2`.

/// A point (or offset) in screen space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl Point {
    /// The origin.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Creates a new point.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A non-negative extent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a new size.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// An axis-aligned, half-open pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x1: i32,
    /// Top edge (inclusive).
    pub y1: i32,
    /// Right edge (exclusive).
    pub x2: i32,
    /// Bottom edge (exclusive).
    pub y2: i32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const EMPTY: Self = Self {
        x1: 0,
        y1: 0,
        x2: 0,
        y2: 0,
    };

    /// Creates a rectangle from its edges.
    #[inline]
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Creates a rectangle from an origin and a size.
    #[inline]
    #[must_use]
    pub const fn from_origin_size(origin: Point, size: Size) -> Self {
        Self {
            x1: origin.x,
            y1: origin.y,
            x2: origin.x.saturating_add_unsigned(size.width),
            y2: origin.y.saturating_add_unsigned(size.height),
        }
    }

    /// Shorthand for `from_origin_size(Point::new(x, y), Size::new(w, h))`.
    #[inline]
    #[must_use]
    pub const fn from_xywh(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self::from_origin_size(Point::new(x, y), Size::new(width, height))
    }

    /// Top-left corner.
    #[inline]
    #[must_use]
    pub const fn origin(self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// Width, or 0 for an inverted rectangle.
    #[inline]
    #[must_use]
    pub const fn width(self) -> u32 {
        if self.x2 > self.x1 {
            self.x2.abs_diff(self.x1)
        } else {
            0
        }
    }

    /// Height, or 0 for an inverted rectangle.
    #[inline]
    #[must_use]
    pub const fn height(self) -> u32 {
        if self.y2 > self.y1 {
            self.y2.abs_diff(self.y1)
        } else {
            0
        }
    }

    /// Size of the rectangle.
    #[inline]
    #[must_use]
    pub const fn size(self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Number of pixels covered.
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.size().area()
    }

    /// Returns `true` if the pixel at `(x, y)` lies inside.
    #[inline]
    #[must_use]
    pub const fn contains(self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// Intersection of two rectangles (possibly empty).
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        }
    }

    /// Smallest rectangle containing both. Empty inputs are ignored.
    #[must_use]
    pub fn union_bounds(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Moves the rectangle by `(dx, dy)`.
    #[inline]
    #[must_use]
    pub const fn translate(self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Grows the rectangle by `dx` horizontally and `dy` vertically on each side.
    ///
    /// Negative values shrink it; the result may be empty.
    #[inline]
    #[must_use]
    pub const fn inflate(self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1 - dx,
            y1: self.y1 - dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Removes `margins` from the inside of the rectangle.
    #[inline]
    #[must_use]
    pub const fn inset(self, margins: Margins) -> Self {
        Self {
            x1: self.x1 + margins.left,
            y1: self.y1 + margins.top,
            x2: self.x2 - margins.right,
            y2: self.y2 - margins.bottom,
        }
    }
}

/// Per-side thickness, used for window frame extents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Margins {
    /// Left side.
    pub left: i32,
    /// Right side.
    pub right: i32,
    /// Top side.
    pub top: i32,
    /// Bottom side.
    pub bottom: i32,
}

impl Margins {
    /// No margins.
    pub const ZERO: Self = Self {
        left: 0,
        right: 0,
        top: 0,
        bottom: 0,
    };

    /// Creates margins from individual sides.
    #[inline]
    #[must_use]
    pub const fn new(left: i32, right: i32, top: i32, bottom: i32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Same thickness on every side.
    #[inline]
    #[must_use]
    pub const fn uniform(v: i32) -> Self {
        Self::new(v, v, v, v)
    }

    /// Returns `true` if every side is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_dimensions() {
        let r = Rect::from_xywh(10, 20, 30, 40);
        assert_eq!(r, Rect::new(10, 20, 40, 60));
        assert_eq!(r.width(), 30);
        assert_eq!(r.height(), 40);
        assert_eq!(r.area(), 1200);
        assert!(!r.is_empty());
    }

    #[test]
    fn inverted_rect_is_empty() {
        let r = Rect::new(10, 10, 5, 20);
        assert!(r.is_empty());
        assert_eq!(r.width(), 0);
        assert_eq!(r.area(), 0);
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 30, 30);
        assert!(a.intersect(b).is_empty());
        assert_eq!(a.intersect(Rect::new(5, 5, 15, 15)), Rect::new(5, 5, 10, 10));
    }

    #[test]
    fn inset_by_margins() {
        let r = Rect::new(0, 0, 100, 50);
        let inner = r.inset(Margins::new(2, 3, 20, 4));
        assert_eq!(inner, Rect::new(2, 20, 97, 46));
    }

    #[test]
    fn union_bounds_ignores_empty() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.union_bounds(Rect::EMPTY), a);
        assert_eq!(Rect::EMPTY.union_bounds(a), a);
        assert_eq!(
            a.union_bounds(Rect::new(5, -5, 20, 5)),
            Rect::new(0, -5, 20, 10)
        );
    }
}
