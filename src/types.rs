//! Unit-tagged screen geometry
//!
//! Every point and rectangle carries its coordinate space in the type:
//! [`Physical`] for raw device pixels as reported by the X server, and
//! [`Logical`] for DPI-scaled pixels used for widget placement. The only way
//! to cross between the two is through [`crate::monitor::MonitorLayout`].

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Raw device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Physical;

/// DPI-scaled pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Logical;

#[derive(Clone, Copy, PartialEq)]
pub struct Point<U> {
    pub x: f64,
    pub y: f64,
    _unit: PhantomData<U>,
}

impl<U> Point<U> {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, _unit: PhantomData }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// |x| + |y|, used as the cheap "close enough" metric
    pub fn manhattan_length(self) -> f64 {
        self.x.abs() + self.y.abs()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl<U> Add for Point<U> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<U> Sub for Point<U> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<U> fmt::Debug for Point<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, PartialEq)]
pub struct Rect<U> {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    _unit: PhantomData<U>,
}

impl<U> Rect<U> {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height, _unit: PhantomData }
    }

    pub fn from_origin_size(origin: Point<U>, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    /// Normalized rectangle spanning two corners in any order
    pub fn from_corners(a: Point<U>, b: Point<U>) -> Self {
        let left = a.x.min(b.x);
        let top = a.y.min(b.y);
        Self::new(left, top, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn top_left(&self) -> Point<U> {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point<U> {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn moved_to(&self, origin: Point<U>) -> Self {
        Self::new(origin.x, origin.y, self.width, self.height)
    }

    /// Half-open containment: right and bottom edges belong to the neighbour
    pub fn contains(&self, p: Point<U>) -> bool {
        p.x >= self.left() && p.x < self.right() && p.y >= self.top() && p.y < self.bottom()
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }

    pub fn overlaps_horizontally(&self, other: &Self) -> bool {
        self.left() < other.right() && self.right() > other.left()
    }

    /// Integer geometry for handing to the X server
    pub fn rounded(&self) -> (i32, i32, u32, u32) {
        (
            self.x.round() as i32,
            self.y.round() as i32,
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

impl<U> fmt::Debug for Rect<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1} {:.1}x{:.1}]",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Integer pixel rectangle as exchanged with collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl From<Rect<Physical>> for PixelRect {
    fn from(rect: Rect<Physical>) -> Self {
        let (x, y, width, height) = rect.rounded();
        Self { x, y, width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_normalizes() {
        let r: Rect<Logical> = Rect::from_corners(Point::new(50.0, 80.0), Point::new(10.0, 20.0));
        assert_eq!(r, Rect::new(10.0, 20.0, 40.0, 60.0));
    }

    #[test]
    fn test_edges_and_center() {
        let r: Rect<Physical> = Rect::new(100.0, 200.0, 40.0, 20.0);
        assert_eq!(r.right(), 140.0);
        assert_eq!(r.bottom(), 220.0);
        assert_eq!(r.center(), Point::new(120.0, 210.0));
    }

    #[test]
    fn test_contains_is_half_open() {
        let r: Rect<Logical> = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(Point::new(0.0, 0.0)));
        assert!(r.contains(Point::new(9.9, 9.9)));
        assert!(!r.contains(Point::new(10.0, 5.0)));
    }

    #[test]
    fn test_intersects_excludes_touching_edges() {
        let a: Rect<Logical> = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b: Rect<Logical> = Rect::new(10.0, 0.0, 10.0, 10.0);
        let c: Rect<Logical> = Rect::new(9.0, 9.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
    }

    #[test]
    fn test_pixel_rect_rounds() {
        let r: Rect<Physical> = Rect::new(10.4, 10.6, 99.5, 0.2);
        assert_eq!(
            PixelRect::from(r),
            PixelRect { x: 10, y: 11, width: 100, height: 1 }
        );
    }
}
