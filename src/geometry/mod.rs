//! # Euclidean geometry in R³
//!
//! Points, vectors, lines and planes expressed in **meters**, used for sight-line
//! reconstruction and trajectory fitting. The types are plain `Copy` structs
//! with operator overloading; conversion to [`nalgebra::Vector3`] is provided for
//! code that needs rotation matrices.
//!
//! ## Conventions
//!
//! - A [`Point`] is a location; a [`Vector`] is a displacement or direction.
//!   `Point - Point = Vector`, `Point + Vector = Point`, `Point + Point` is not defined.
//! - [`Vector::angle_with`] clamps the cosine to `[-1, 1]` before `acos` to absorb
//!   floating-point error on nearly parallel directions.
//!
//! See [`earth`] for conversions between these Cartesian types and geodetic or
//! celestial coordinates.

pub mod earth;

use std::ops::{Add, Mul, Neg, Sub};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Meter, Radian};

/// Location in three-dimensional space, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Displacement or direction in three-dimensional space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const ORIGIN: Point = Point {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z }
    }

    /// Vector from the origin to this point.
    pub fn to_vector(self) -> Vector {
        Vector::new(self.x, self.y, self.z)
    }

    pub fn distance_to(&self, other: &Point) -> Meter {
        (*other - *self).norm()
    }

    pub fn to_na(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn from_na(v: &Vector3<f64>) -> Self {
        Point::new(v.x, v.y, v.z)
    }

    /// Arithmetic mean of a set of points, or `None` when empty.
    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Point> {
        let mut sum = Vector::ZERO;
        let mut count = 0usize;
        for p in points {
            sum = sum + p.to_vector();
            count += 1;
        }
        (count > 0).then(|| (sum * (1.0 / count as f64)).to_point())
    }
}

impl Vector {
    pub const ZERO: Vector = Vector {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector { x, y, z }
    }

    pub fn dot(&self, other: &Vector) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector) -> Vector {
        Vector::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector with the same direction, or `None` for a zero vector.
    pub fn normalize(&self) -> Option<Vector> {
        let n = self.norm();
        (n > 0.0 && n.is_finite()).then(|| *self * (1.0 / n))
    }

    /// Angle between two directions, in radians within `[0, π]`.
    ///
    /// Returns `NaN` when either vector is zero.
    pub fn angle_with(&self, other: &Vector) -> Radian {
        let denominator = self.norm() * other.norm();
        if denominator == 0.0 {
            return f64::NAN;
        }
        (self.dot(other) / denominator).clamp(-1.0, 1.0).acos()
    }

    /// Point reached from the origin by this vector.
    pub fn to_point(self) -> Point {
        Point::new(self.x, self.y, self.z)
    }

    pub fn to_na(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn from_na(v: &Vector3<f64>) -> Self {
        Vector::new(v.x, v.y, v.z)
    }
}

impl Sub for Point {
    type Output = Vector;

    fn sub(self, rhs: Point) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add<Vector> for Point {
    type Output = Point;

    fn add(self, rhs: Vector) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub<Vector> for Point {
    type Output = Point;

    fn sub(self, rhs: Vector) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f64) -> Vector {
        Vector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y, -self.z)
    }
}

/// Straight line through `origin` with direction `direction`.
///
/// The direction is not required to be a unit vector: trajectories use its length
/// to encode the displacement covered between parameter values 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub origin: Point,
    pub direction: Vector,
}

impl Line {
    pub fn new(origin: Point, direction: Vector) -> Self {
        Line { origin, direction }
    }

    /// Point at parameter `t`, i.e. `origin + t·direction`.
    pub fn point_at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }

    /// Parameter of the point of the line closest to `point`.
    pub fn closest_parameter(&self, point: &Point) -> f64 {
        let d2 = self.direction.dot(&self.direction);
        if d2 == 0.0 {
            return 0.0;
        }
        (*point - self.origin).dot(&self.direction) / d2
    }

    /// Shortest distance between the line and `point`.
    pub fn distance_to_point(&self, point: &Point) -> Meter {
        point.distance_to(&self.point_at(self.closest_parameter(point)))
    }
}

/// Plane `normal · p = d`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector,
    pub d: f64,
}

impl Plane {
    /// Plane through `point` perpendicular to `normal`.
    pub fn from_point_normal(point: &Point, normal: Vector) -> Self {
        Plane {
            normal,
            d: normal.dot(&point.to_vector()),
        }
    }

    /// Signed distance of `point` from the plane, positive on the side of the normal.
    pub fn signed_distance(&self, point: &Point) -> Meter {
        let n = self.normal.norm();
        if n == 0.0 {
            return f64::NAN;
        }
        (self.normal.dot(&point.to_vector()) - self.d) / n
    }

    /// Intersection of `line` with this plane, or `None` when they are parallel.
    pub fn intersect(&self, line: &Line) -> Option<Point> {
        let denominator = self.normal.dot(&line.direction);
        if denominator.abs() < f64::EPSILON {
            return None;
        }
        let t = (self.d - self.normal.dot(&line.origin.to_vector())) / denominator;
        Some(line.point_at(t))
    }
}

#[cfg(test)]
mod geometry_test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_vector_algebra() {
        let a = Vector::new(1.0, 0.0, 0.0);
        let b = Vector::new(0.0, 1.0, 0.0);
        assert_eq!(a.cross(&b), Vector::new(0.0, 0.0, 1.0));
        assert_eq!(a.dot(&b), 0.0);
        assert_relative_eq!(a.angle_with(&b), FRAC_PI_2);
        assert_eq!((a * 3.0).norm(), 3.0);
        assert!(Vector::ZERO.normalize().is_none());
        assert!(Vector::ZERO.angle_with(&a).is_nan());
    }

    #[test]
    fn test_angle_clamped_for_parallel_vectors() {
        let a = Vector::new(0.1, 0.2, 0.3);
        let b = a * 7.0;
        assert_eq!(a.angle_with(&b), 0.0);
        assert_relative_eq!(a.angle_with(&-b), std::f64::consts::PI);
    }

    #[test]
    fn test_point_arithmetic() {
        let p = Point::new(1.0, 2.0, 3.0);
        let q = Point::new(4.0, 6.0, 3.0);
        assert_eq!(p.distance_to(&q), 5.0);
        assert_eq!(p + (q - p), q);
        let c = Point::centroid(&[p, q]).unwrap();
        assert_eq!(c, Point::new(2.5, 4.0, 3.0));
        assert!(Point::centroid(&[]).is_none());
    }

    #[test]
    fn test_line() {
        let line = Line::new(Point::ORIGIN, Vector::new(2.0, 0.0, 0.0));
        assert_eq!(line.point_at(0.5), Point::new(1.0, 0.0, 0.0));
        let p = Point::new(3.0, 4.0, 0.0);
        assert_relative_eq!(line.closest_parameter(&p), 1.5);
        assert_relative_eq!(line.distance_to_point(&p), 4.0);
    }

    #[test]
    fn test_plane() {
        let plane = Plane::from_point_normal(&Point::new(0.0, 0.0, 10.0), Vector::new(0.0, 0.0, 1.0));
        assert_relative_eq!(plane.signed_distance(&Point::new(5.0, 5.0, 12.0)), 2.0);
        let line = Line::new(Point::ORIGIN, Vector::new(1.0, 1.0, 1.0));
        assert_eq!(plane.intersect(&line), Some(Point::new(10.0, 10.0, 10.0)));
        let parallel = Line::new(Point::ORIGIN, Vector::new(1.0, 0.0, 0.0));
        assert!(plane.intersect(&parallel).is_none());
    }
}
