//! Decoding of the pixel path recorded with a moving-object observation.
//!
//! The path is a JSON array of `[x, y, utc]` triples. The recorder sometimes
//! truncates it; such a path is repaired once by closing it after its last
//! complete triple and appending the Bézier control points stored alongside
//! that lie later in time.
use serde::{Deserialize, Serialize};

use crate::constants::UnixTime;
use crate::frames::Pixel;
use crate::pigazing_errors::PiGazingError;
use crate::store::{MetaKey, Observation};

/// One detection of the object in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub pixel: Pixel,
    pub utc: UnixTime,
}

/// A decoded path, in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPath {
    pub points: Vec<PathPoint>,
    /// Whether the path had to be repaired
    pub rescued: bool,
}

fn parse_triples(text: &str) -> Result<Vec<PathPoint>, serde_json::Error> {
    let triples: Vec<[f64; 3]> = serde_json::from_str(text)?;
    Ok(triples
        .into_iter()
        .map(|[x, y, utc]| PathPoint {
            pixel: Pixel::new(x, y),
            utc,
        })
        .collect())
}

/// Decode a path, repairing it once if it is truncated.
///
/// Arguments
/// -----------------
/// * `path`: JSON text of the path.
/// * `bezier`: JSON text of the Bézier control points, same layout.
///
/// Return
/// ----------
/// * The [`DecodedPath`], or [`PiGazingError::MalformedInput`] when the path is
///   still unreadable after repair or holds no point.
pub fn decode_path(path: &str, bezier: Option<&str>) -> Result<DecodedPath, PiGazingError> {
    let (mut points, rescued) = match parse_triples(path) {
        Ok(points) => (points, false),
        Err(original) => {
            let end = path
                .rfind(']')
                .ok_or_else(|| PiGazingError::MalformedInput(format!("path: {original}")))?;
            let mut points = parse_triples(&format!("{}]", &path[..=end]))
                .map_err(|_| PiGazingError::MalformedInput(format!("path: {original}")))?;
            let last = points.last().map_or(f64::NEG_INFINITY, |p| p.utc);
            if let Some(bezier) = bezier {
                let controls = parse_triples(bezier)
                    .map_err(|e| PiGazingError::MalformedInput(format!("path bezier: {e}")))?;
                points.extend(controls.into_iter().filter(|p| p.utc > last));
            }
            (points, true)
        }
    };
    if points.is_empty() {
        return Err(PiGazingError::MalformedInput("empty path".into()));
    }
    points.sort_by(|a, b| a.utc.total_cmp(&b.utc));
    Ok(DecodedPath { points, rescued })
}

/// Decode the path stored on an observation.
pub fn observation_path(observation: &Observation) -> Result<DecodedPath, PiGazingError> {
    let path = observation
        .meta(&MetaKey::PATH)
        .and_then(|v| v.as_text())
        .ok_or_else(|| {
            PiGazingError::missing(format!("observation {}", observation.id), MetaKey::PATH.name())
        })?;
    let bezier = observation.meta(&MetaKey::PATH_BEZIER).and_then(|v| v.as_text());
    decode_path(path, bezier)
}

/// At most `max` points, evenly spaced, always keeping the first and the last.
pub fn evenly_spaced(points: &[PathPoint], max: usize) -> Vec<PathPoint> {
    let n = points.len();
    if n <= max {
        return points.to_vec();
    }
    match max {
        0 => Vec::new(),
        1 => vec![points[0]],
        _ => (0..max)
            .map(|i| points[(i * (n - 1) + (max - 1) / 2) / (max - 1)])
            .collect(),
    }
}

#[cfg(test)]
mod path_test {
    use super::*;

    #[test]
    fn test_decode_complete_path() {
        let decoded = decode_path("[[10, 20, 100.5], [12, 21, 100.0]]", None).unwrap();
        assert!(!decoded.rescued);
        assert_eq!(decoded.points.len(), 2);
        assert_eq!(decoded.points[0].utc, 100.0);
        assert_eq!(decoded.points[1].pixel, Pixel::new(10.0, 20.0));
    }

    #[test]
    fn test_truncated_path_is_rescued() {
        let truncated = "[[10, 20, 100.0], [12, 21, 100.5], [14, 2";
        let bezier = "[[10, 20, 100.0], [13, 21, 100.6], [16, 23, 101.0]]";
        let decoded = decode_path(truncated, Some(bezier)).unwrap();
        assert!(decoded.rescued);
        let times: Vec<f64> = decoded.points.iter().map(|p| p.utc).collect();
        assert_eq!(times, vec![100.0, 100.5, 100.6, 101.0]);
    }

    #[test]
    fn test_rescue_without_bezier() {
        let decoded = decode_path("[[1, 2, 3.0], [4, 5", None).unwrap();
        assert!(decoded.rescued);
        assert_eq!(decoded.points.len(), 1);
    }

    #[test]
    fn test_unrepairable_path() {
        assert!(matches!(
            decode_path("[[1, 2", None),
            Err(PiGazingError::MalformedInput(_))
        ));
        assert!(matches!(
            decode_path("not json", None),
            Err(PiGazingError::MalformedInput(_))
        ));
        assert!(matches!(
            decode_path("[]", None),
            Err(PiGazingError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_evenly_spaced() {
        let points: Vec<PathPoint> = (0..50)
            .map(|i| PathPoint {
                pixel: Pixel::new(i as f64, 0.0),
                utc: i as f64,
            })
            .collect();
        let kept = evenly_spaced(&points, 20);
        assert_eq!(kept.len(), 20);
        assert_eq!(kept[0].utc, 0.0);
        assert_eq!(kept[19].utc, 49.0);
        assert!(kept.windows(2).all(|w| w[1].utc > w[0].utc));
        assert_eq!(evenly_spaced(&points[..5], 20).len(), 5);
    }
}
