//! 2D vector math for the simulation.

use std::ops::{Add, AddAssign, Mul, Sub};

use skirmish_protocol::Point;

/// A point or displacement in world space. `+y` points down the screen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or [`Vec2::ZERO`] for a
    /// zero-length (or non-finite) input.
    pub fn normalize_or_zero(self) -> Vec2 {
        let len = self.length();
        if len > 0.0 && len.is_finite() {
            self * (1.0 / len)
        } else {
            Vec2::ZERO
        }
    }

    /// Clamps each axis independently to `[-border, border]`.
    pub fn clamp_to_border(self, border: f64) -> Vec2 {
        Vec2 {
            x: self.x.clamp(-border, border),
            y: self.y.clamp(-border, border),
        }
    }

    /// Whether `other` lies strictly inside the axis-aligned box of
    /// half-size `half_extent` centred on `self`.
    pub fn within_box(self, other: Vec2, half_extent: f64) -> bool {
        (self.x - other.x).abs() < half_extent
            && (self.y - other.y).abs() < half_extent
    }

    fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Point {
        Point { x: v.x, y: v.y }
    }
}

/// Shortest distance from `point` to the segment `start..end`.
///
/// A degenerate segment (`start == end`) measures the distance to `start`.
pub fn point_segment_distance(point: Vec2, start: Vec2, end: Vec2) -> f64 {
    let seg = end - start;
    let len_sq = seg.dot(seg);
    if len_sq == 0.0 {
        return point.distance(start);
    }
    let t = ((point - start).dot(seg) / len_sq).clamp(0.0, 1.0);
    point.distance(start + seg * t)
}
