//! Cubic-even radial distortion normalised at the horizontal field edge.
//!
//! Radii are expressed in units of `tan(scale_x / 2)`, so `r = 1` is the left or
//! right edge of the frame. The distorted radius is
//!
//! ```text
//! R(r) = r · (k0 + k1·r² + k2·r⁴ + k3·r⁶),   k0 = 1 − k1 − k2 − k3
//! ```
//!
//! which keeps `R(1) = 1`: the horizontal field width is unchanged whatever
//! the coefficients.
use serde::{Deserialize, Serialize};

/// Newton iteration stops once the radius moves by less than this.
const NEWTON_TOLERANCE: f64 = 1e-9;
const NEWTON_MAX_ITERATIONS: usize = 32;
const BRACKET_DOUBLINGS: usize = 64;
const BISECTIONS: usize = 200;

/// Radial distortion coefficients of a lens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
}

impl RadialDistortion {
    pub const NONE: RadialDistortion = RadialDistortion {
        k1: 0.0,
        k2: 0.0,
        k3: 0.0,
    };

    pub fn new(k1: f64, k2: f64, k3: f64) -> Self {
        RadialDistortion { k1, k2, k3 }
    }

    /// Constant term, derived so that `R(1) = 1`.
    pub fn k0(&self) -> f64 {
        1.0 - self.k1 - self.k2 - self.k3
    }

    /// Ratio `R(r) / r` at normalised radius `r`.
    pub fn multiplier(&self, r: f64) -> f64 {
        let r2 = r * r;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        self.k0() + self.k1 * r2 + self.k2 * r4 + self.k3 * r6
    }

    /// Distorted radius of an undistorted normalised radius.
    pub fn distort_radius(&self, r: f64) -> f64 {
        r * self.multiplier(r)
    }

    /// Slope `dR/dr` at normalised radius `r`.
    pub fn derivative(&self, r: f64) -> f64 {
        self.slope_at_square(r * r)
    }

    /// `dR/dr` written as a cubic in `s = r²`.
    fn slope_at_square(&self, s: f64) -> f64 {
        self.k0() + s * (3.0 * self.k1 + s * (5.0 * self.k2 + s * 7.0 * self.k3))
    }

    /// End of the monotonic branch of `R(r)`.
    ///
    /// Return
    /// ----------
    /// * `Some(r_max)`: the first radius where `dR/dr` reaches zero. Beyond it the
    ///   model folds back and no longer describes the lens.
    /// * `None` when `R(r)` increases for every `r ≥ 0`.
    ///
    /// Details
    /// ----------
    /// The roots of the slope's own derivative split `s ∈ [0, ∞)` into intervals on
    /// which the slope is monotonic; the first interval whose far end is not
    /// positive holds the turning point, found there by bisection.
    pub fn turning_radius(&self) -> Option<f64> {
        if self.k0() <= 0.0 {
            return Some(0.0);
        }
        if self.k1 >= 0.0 && self.k2 >= 0.0 && self.k3 >= 0.0 {
            return None;
        }
        // d/ds of the slope cubic: a + b·s + c·s²
        let (a, b, c) = (3.0 * self.k1, 10.0 * self.k2, 21.0 * self.k3);
        let mut ends: Vec<f64> = if c != 0.0 {
            let disc = b * b - 4.0 * a * c;
            if disc >= 0.0 {
                let q = disc.sqrt();
                vec![(-b - q) / (2.0 * c), (-b + q) / (2.0 * c)]
            } else {
                vec![]
            }
        } else if b != 0.0 {
            vec![-a / b]
        } else {
            vec![]
        };
        ends.retain(|s| s.is_finite() && *s > 0.0);
        ends.sort_by(f64::total_cmp);

        // Unbounded last interval: the slope goes negative only if its leading term does
        let leading = [7.0 * self.k3, 5.0 * self.k2, 3.0 * self.k1]
            .into_iter()
            .find(|k| *k != 0.0)
            .unwrap_or(0.0);
        if leading < 0.0 {
            let mut far = ends.last().copied().unwrap_or(0.0).max(1.0);
            for _ in 0..BRACKET_DOUBLINGS {
                if self.slope_at_square(far) <= 0.0 {
                    break;
                }
                far *= 2.0;
            }
            ends.push(far);
        }

        let mut lo = 0.0;
        for hi in ends {
            if self.slope_at_square(hi) <= 0.0 {
                let (mut below, mut above) = (lo, hi);
                for _ in 0..BISECTIONS {
                    if above - below <= f64::EPSILON * above {
                        break;
                    }
                    let mid = 0.5 * (below + above);
                    if self.slope_at_square(mid) > 0.0 {
                        below = mid;
                    } else {
                        above = mid;
                    }
                }
                return Some(below.sqrt());
            }
            lo = hi;
        }
        None
    }

    /// Undistorted radius giving the observed distorted radius.
    ///
    /// Arguments
    /// -----------------
    /// * `observed`: distorted normalised radius, `≥ 0`.
    ///
    /// Return
    /// ----------
    /// * `Some(r)` on the monotonic branch of the polynomial, or `None` when
    ///   `observed` lies past the [`turning_radius`](Self::turning_radius) or the
    ///   iteration does not converge.
    ///
    /// Details
    /// ----------
    /// The root is first bracketed by doubling from `r = 1` (capped at the turning
    /// radius), then refined by Newton iteration on `f(r) = R(r) − observed`, seeded
    /// at `r = observed` clamped into the bracket. A Newton step leaving the bracket
    /// is replaced by bisection. Stops once `|Δr| < 1e-9`, at most 32 iterations.
    pub fn undistort_radius(&self, observed: f64) -> Option<f64> {
        if observed.is_nan() || observed <= 0.0 {
            return (observed == 0.0).then_some(0.0);
        }
        if self.is_zero() {
            return Some(observed);
        }
        let limit = self.turning_radius();
        if let Some(r_max) = limit {
            if observed >= self.distort_radius(r_max) {
                return None;
            }
        }

        let (mut lo, mut hi) = (0.0, 1.0_f64);
        for _ in 0..BRACKET_DOUBLINGS {
            if let Some(r_max) = limit {
                if hi >= r_max {
                    hi = r_max;
                    break;
                }
            }
            if self.distort_radius(hi) >= observed {
                break;
            }
            lo = hi;
            hi *= 2.0;
        }
        if self.distort_radius(hi) < observed {
            return None;
        }

        let mut r = observed.clamp(lo, hi);
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let f = self.distort_radius(r) - observed;
            if f == 0.0 {
                return Some(r);
            }
            if f > 0.0 {
                hi = r;
            } else {
                lo = r;
            }
            let slope = self.derivative(r);
            let newton = r - f / slope;
            let next = if slope > 0.0 && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
            let step = next - r;
            r = next;
            if step.abs() < NEWTON_TOLERANCE {
                return Some(r);
            }
        }
        None
    }

    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.k3 == 0.0
    }
}
