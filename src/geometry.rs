//! Planar geometry used by the movement model: a 2-D vector, axis-aligned arena bounds and the
//! path followed by an agent travelling between arenas.

use std::f64::consts::PI;
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use approx::{AbsDiffEq, RelativeEq};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{invalid_parameter, OutbreakError};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// The unit vector pointing at `angle` radians counterclockwise from the x axis.
    #[must_use]
    pub fn from_angle(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Vec2 { x: cos, y: sin }
    }

    #[must_use]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Vec2) -> f64 {
        (self - other).norm()
    }

    /// Rotates the vector counterclockwise by `angle` radians.
    #[must_use]
    pub fn rotate(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Vec2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// The vector rotated a quarter turn counterclockwise.
    #[must_use]
    pub fn perp(self) -> Self {
        Vec2 {
            x: -self.y,
            y: self.x,
        }
    }

    /// Scales the vector down so that its length is at most `max_len`.
    #[must_use]
    pub fn clamp_length(self, max_len: f64) -> Self {
        let norm = self.norm();
        if norm > max_len && norm > 0.0 {
            self * (max_len / norm)
        } else {
            self
        }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Display for Vec2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
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

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl MulAssign<f64> for Vec2 {
    fn mul_assign(&mut self, rhs: f64) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl AbsDiffEq for Vec2 {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.x.abs_diff_eq(&other.x, epsilon) && self.y.abs_diff_eq(&other.y, epsilon)
    }
}

impl RelativeEq for Vec2 {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.x.relative_eq(&other.x, epsilon, max_relative)
            && self.y.relative_eq(&other.y, epsilon, max_relative)
    }
}

/// An axis-aligned rectangle given by its lower-left and upper-right corners.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    /// Fails unless both corners are finite and `min` lies strictly below and left of `max`.
    pub fn new(min: Vec2, max: Vec2) -> Result<Self, OutbreakError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(invalid_parameter("bounds", "corners must be finite"));
        }
        if min.x >= max.x || min.y >= max.y {
            return Err(invalid_parameter(
                "bounds",
                format!("min corner {min} is not below and left of max corner {max}"),
            ));
        }
        Ok(Bounds { min, max })
    }

    /// A square of side `size` centered on `center`.
    pub fn square(center: Vec2, size: f64) -> Result<Self, OutbreakError> {
        let half = Vec2::new(size / 2.0, size / 2.0);
        Bounds::new(center - half, center + half)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) / 2.0
    }

    /// Inclusive containment test.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }

    /// The rectangle shrunk by `margin` on every side. The result may be empty (min above max)
    /// when `margin` exceeds half the width or height; callers validate sizes up front.
    #[must_use]
    pub fn inset(&self, margin: f64) -> Bounds {
        let margin = Vec2::new(margin, margin);
        Bounds {
            min: self.min + margin,
            max: self.max - margin,
        }
    }

    /// Moves `point` to the nearest point of the rectangle.
    #[must_use]
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
        )
    }

    /// A point drawn uniformly at random from the rectangle.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            rng.random_range(self.min.x..=self.max.x),
            rng.random_range(self.min.y..=self.max.y),
        )
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

/// The path an agent follows between its departure point and the center of its destination
/// arena while migrating.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TravelPath {
    Straight,
    /// A circular arc that sweeps `angle_degrees` counterclockwise around its center.
    Arc { angle_degrees: f64 },
}

impl Default for TravelPath {
    fn default() -> Self {
        TravelPath::Arc {
            angle_degrees: 45.0,
        }
    }
}

impl TravelPath {
    /// The point reached after the fraction `alpha` (clamped to `[0, 1]`) of the trip.
    #[must_use]
    pub fn point_at(&self, start: Vec2, end: Vec2, alpha: f64) -> Vec2 {
        let alpha = alpha.clamp(0.0, 1.0);
        let angle = match *self {
            TravelPath::Straight => 0.0,
            TravelPath::Arc { angle_degrees } => angle_degrees.to_radians(),
        };
        if angle == 0.0 || start == end {
            return start + (end - start) * alpha;
        }

        // The arc's center sits on the perpendicular bisector of the chord.
        let half_chord = (end - start) / 2.0;
        let mut center = start + half_chord;
        if (angle.abs() - PI).abs() > f64::EPSILON {
            center += half_chord.perp() / (angle / 2.0).tan();
        }
        center + (start - center).rotate(alpha * angle)
    }

    pub fn validate(&self) -> Result<(), OutbreakError> {
        match *self {
            TravelPath::Straight => Ok(()),
            TravelPath::Arc { angle_degrees } => {
                if angle_degrees.is_finite() && angle_degrees.abs() < 360.0 {
                    Ok(())
                } else {
                    Err(invalid_parameter(
                        "travel_path",
                        format!("arc angle must be finite and below 360 degrees, got {angle_degrees}"),
                    ))
                }
            }
        }
    }
}
