//! Geometry primitives shared by the simulation

use serde::{Deserialize, Serialize};

/// Parallel segments closer than this to zero are treated as non-intersecting
const PARALLEL_EPSILON: f32 = 1e-10;

/// 2D vector used for positions, velocities and thrust
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector for an angle in radians
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Normalized copy, or zero for a zero-length vector
    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Vec2::ZERO
        }
    }

    /// Scales the vector down so its length does not exceed `max`
    pub fn clamp_length(self, max: f32) -> Vec2 {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

/// Axis-aligned rectangular obstacle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Obstacle {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Closest point of the rectangle to `p` (p itself when inside)
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x.clamp(self.x, self.right()), p.y.clamp(self.y, self.bottom()))
    }

    /// The four edges as (start, end) pairs: top, right, bottom, left
    pub fn edges(&self) -> [(Vec2, Vec2); 4] {
        let tl = Vec2::new(self.x, self.y);
        let tr = Vec2::new(self.right(), self.y);
        let br = Vec2::new(self.right(), self.bottom());
        let bl = Vec2::new(self.x, self.bottom());
        [(tl, tr), (tr, br), (br, bl), (bl, tl)]
    }
}

/// Circle vs. rectangle overlap (touching does not count)
pub fn circle_intersects_rect(center: Vec2, radius: f32, rect: &Obstacle) -> bool {
    let closest = rect.closest_point(center);
    (center - closest).length_squared() < radius * radius
}

/// Circle vs. circle overlap (touching does not count)
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let combined = ra + rb;
    (b - a).length_squared() < combined * combined
}

/// Segment p1-p2 vs. segment p3-p4, endpoints inclusive
pub fn segments_intersect(p1: Vec2, p2: Vec2, p3: Vec2, p4: Vec2) -> bool {
    let denom = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    if denom.abs() < PARALLEL_EPSILON {
        return false;
    }

    let t = ((p1.x - p3.x) * (p3.y - p4.y) - (p1.y - p3.y) * (p3.x - p4.x)) / denom;
    let u = -((p1.x - p2.x) * (p1.y - p3.y) - (p1.y - p2.y) * (p1.x - p3.x)) / denom;

    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// Segment vs. rectangle: true if the segment crosses any of the four edges.
/// A segment lying entirely inside the rectangle does not cross an edge.
pub fn segment_intersects_rect(a: Vec2, b: Vec2, rect: &Obstacle) -> bool {
    rect.edges()
        .iter()
        .any(|&(e1, e2)| segments_intersect(a, b, e1, e2))
}
