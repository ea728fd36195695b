#![forbid(unsafe_code)]

//! Planar geometry: axis-aligned bounds, headings and edges.
//!
//! Coordinates are `f32`. Angles are in degrees, normalized to `[0, 360)`;
//! 0° points along +x and 90° along +y.

use std::fmt;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub w: f32,
    /// Height.
    pub h: f32,
}

impl Bounds {
    /// Bounds with top-left corner `(x, y)` and size `w × h`.
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Left edge, `x`.
    #[inline]
    pub fn left(&self) -> f32 {
        self.x
    }

    /// Top edge, `y`.
    #[inline]
    pub fn top(&self) -> f32 {
        self.y
    }

    /// `x + w`.
    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    /// `y + h`.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// Center point `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    /// Strict overlap test; rectangles that only touch do not intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.top() >= self.top()
            && other.bottom() <= self.bottom()
    }

    /// These bounds moved by `(dx, dy)`.
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    /// These bounds moved `distance` units along `angle`.
    pub fn offset(&self, angle: Angle, distance: f32) -> Self {
        let (dx, dy) = angle.direction();
        self.translate(dx * distance, dy * distance)
    }

    /// Which edge of `self` a rectangle previously at `from` crossed to
    /// reach it. Falls back to the axis of least penetration when `from`
    /// already overlaps.
    pub fn entry_edge(&self, from: &Bounds) -> Edge {
        if from.right() <= self.left() {
            Edge::Left
        } else if from.left() >= self.right() {
            Edge::Right
        } else if from.bottom() <= self.top() {
            Edge::Top
        } else if from.top() >= self.bottom() {
            Edge::Bottom
        } else {
            let (cx, cy) = from.center();
            let (sx, sy) = self.center();
            let pen_x = (self.w + from.w) * 0.5 - (cx - sx).abs();
            let pen_y = (self.h + from.h) * 0.5 - (cy - sy).abs();
            match (pen_x < pen_y, cx < sx, cy < sy) {
                (true, true, _) => Edge::Left,
                (true, false, _) => Edge::Right,
                (false, _, true) => Edge::Top,
                (false, _, false) => Edge::Bottom,
            }
        }
    }
}

/// Heading in degrees, normalized to `[0, 360)`.
#[derive(Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Angle(f32);

impl Angle {
    /// Heading along +x.
    pub const RIGHT: Angle = Angle(0.0);
    /// Heading along +y (screen down).
    pub const DOWN: Angle = Angle(90.0);
    /// Heading along -x.
    pub const LEFT: Angle = Angle(180.0);
    /// Heading along -y.
    pub const UP: Angle = Angle(270.0);

    /// An angle of `degrees`, normalized into `[0, 360)`.
    pub fn new(degrees: f32) -> Self {
        let d = degrees.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360 for tiny negatives.
        Self(if d >= 360.0 { 0.0 } else { d })
    }

    /// Degrees in `[0, 360)`.
    #[inline]
    pub fn degrees(self) -> f32 {
        self.0
    }

    /// The angle in radians.
    pub fn radians(self) -> f32 {
        self.0.to_radians()
    }

    /// Unit direction vector. Exact for the four cardinal headings.
    pub fn direction(self) -> (f32, f32) {
        if self == Self::RIGHT {
            (1.0, 0.0)
        } else if self == Self::DOWN {
            (0.0, 1.0)
        } else if self == Self::LEFT {
            (-1.0, 0.0)
        } else if self == Self::UP {
            (0.0, -1.0)
        } else {
            let r = self.radians();
            (r.cos(), r.sin())
        }
    }

    /// The heading pointing the other way.
    pub fn opposite(self) -> Self {
        Self::new(self.0 + 180.0)
    }

    /// Reflection off a horizontal surface (y component flips).
    pub fn mirror_vertical(self) -> Self {
        Self::new(360.0 - self.0)
    }

    /// Reflection off a vertical surface (x component flips).
    pub fn mirror_horizontal(self) -> Self {
        Self::new(180.0 - self.0)
    }

    /// Reflection off `edge`.
    pub fn bounce_off(self, edge: Edge) -> Self {
        if edge.is_horizontal() {
            self.mirror_vertical()
        } else {
            self.mirror_horizontal()
        }
    }
}

impl fmt::Debug for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

impl From<f32> for Angle {
    fn from(degrees: f32) -> Self {
        Self::new(degrees)
    }
}

/// Side of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Edge {
    /// Top and bottom edges run horizontally.
    #[inline]
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Top | Self::Bottom)
    }
}
