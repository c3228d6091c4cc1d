//! Weighted means of angles on the circle and of positions on the sphere.
//!
//! Both functions project their inputs onto a unit circle / sphere, take the
//! weighted centroid there and map it back, which handles wrap-around at
//! ±180° without special cases. The returned spread measures the scatter of the
//! projected points around that centroid.
use crate::constants::Radian;

fn resolve_weights(n: usize, weights: Option<&[f64]>) -> Option<Vec<f64>> {
    match weights {
        Some(w) if w.len() != n => None,
        Some(w) => Some(w.to_vec()),
        None => Some(vec![1.0; n]),
    }
}

/// Weighted circular mean.
///
/// Arguments
/// -----------------
/// * `angles`: angles in radians.
/// * `weights`: optional non-negative weights, same length as `angles` (uniform when `None`).
///
/// Return
/// ----------
/// * `Some((mean, spread))` in radians, `mean` in `(-π, π]` and `spread = atan(sd)` where
///   `sd` is the weighted RMS distance of the projected `(sin, cos)` points from their centroid.
/// * `None` when the input is empty, the weights are mismatched, or they sum to zero.
pub fn mean_angle(angles: &[Radian], weights: Option<&[f64]>) -> Option<(Radian, Radian)> {
    let weights = resolve_weights(angles.len(), weights)?;
    let total: f64 = weights.iter().sum();
    if angles.is_empty() || total <= 0.0 {
        return None;
    }

    let (mut s, mut c) = (0.0, 0.0);
    for (a, w) in angles.iter().zip(&weights) {
        s += w * a.sin();
        c += w * a.cos();
    }
    s /= total;
    c /= total;

    let variance = angles
        .iter()
        .zip(&weights)
        .map(|(a, w)| w * ((a.sin() - s).powi(2) + (a.cos() - c).powi(2)))
        .sum::<f64>()
        / total;
    Some((s.atan2(c), variance.sqrt().atan()))
}

/// Weighted spherical mean of `(latitude, longitude)` pairs.
///
/// Arguments
/// -----------------
/// * `positions`: `(lat, lng)` pairs in radians.
/// * `weights`: optional non-negative weights (uniform when `None`).
///
/// Return
/// ----------
/// * `Some(((lat, lng), spread))` where `spread` is the weighted RMS great-circle
///   distance of the inputs from the returned centroid, in radians.
/// * `None` on empty input, mismatched or zero weights, or when the points cancel out
///   (antipodal inputs).
pub fn mean_angle_2d(
    positions: &[(Radian, Radian)],
    weights: Option<&[f64]>,
) -> Option<((Radian, Radian), Radian)> {
    let weights = resolve_weights(positions.len(), weights)?;
    let total: f64 = weights.iter().sum();
    if positions.is_empty() || total <= 0.0 {
        return None;
    }

    let unit = |(lat, lng): (Radian, Radian)| [lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin()];

    let mut centroid = [0.0; 3];
    for (p, w) in positions.iter().zip(&weights) {
        let u = unit(*p);
        for k in 0..3 {
            centroid[k] += w * u[k];
        }
    }
    let norm = centroid.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return None;
    }
    let centroid = centroid.map(|v| v / norm);

    let variance = positions
        .iter()
        .zip(&weights)
        .map(|(p, w)| {
            let u = unit(*p);
            let dot = (u[0] * centroid[0] + u[1] * centroid[1] + u[2] * centroid[2]).clamp(-1.0, 1.0);
            w * dot.acos().powi(2)
        })
        .sum::<f64>()
        / total;

    let lat = centroid[2].clamp(-1.0, 1.0).asin();
    let lng = centroid[1].atan2(centroid[0]);
    Some(((lat, lng), variance.sqrt()))
}

/// Great-circle distance between two `(lat, lng)` pairs in radians.
pub fn sphere_distance(a: (Radian, Radian), b: (Radian, Radian)) -> Radian {
    let cos = a.0.sin() * b.0.sin() + a.0.cos() * b.0.cos() * (a.1 - b.1).cos();
    cos.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod means_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_angle_wraps_at_180() {
        let angles = [(-179f64).to_radians(), 179f64.to_radians()];
        let (mean, spread) = mean_angle(&angles, None).unwrap();
        assert_relative_eq!(mean.abs().to_degrees(), 180.0, epsilon = 1e-9);
        assert!(spread.to_degrees() < 2.0);
    }

    #[test]
    fn test_mean_angle_weighted() {
        let angles = [0.0, 0.2];
        let (mean, _) = mean_angle(&angles, Some(&[1.0, 1.0])).unwrap();
        assert_relative_eq!(mean, 0.1, epsilon = 1e-12);
        let (mean, spread) = mean_angle(&angles, Some(&[1.0, 0.0])).unwrap();
        assert_relative_eq!(mean, 0.0);
        assert_relative_eq!(spread, 0.0);
    }

    #[test]
    fn test_mean_angle_degenerate() {
        assert!(mean_angle(&[], None).is_none());
        assert!(mean_angle(&[1.0], Some(&[0.0])).is_none());
        assert!(mean_angle(&[1.0, 2.0], Some(&[1.0])).is_none());
    }

    #[test]
    fn test_mean_angle_2d_across_meridian() {
        let d = f64::to_radians;
        let positions = [(d(45.0), d(359.0)), (d(45.0), d(1.0))];
        let ((lat, lng), spread) = mean_angle_2d(&positions, None).unwrap();
        assert_relative_eq!(lng, 0.0, epsilon = 1e-12);
        assert!(lat > d(45.0) && lat < d(45.01));
        assert_relative_eq!(spread, sphere_distance(positions[0], (lat, lng)), epsilon = 1e-12);
    }

    #[test]
    fn test_mean_angle_2d_antipodal() {
        let positions = [(0.0, 0.0), (0.0, std::f64::consts::PI)];
        assert!(mean_angle_2d(&positions, None).is_none());
    }
}
