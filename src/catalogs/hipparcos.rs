//! Hipparcos reference stars.
//!
//! The catalogue file holds one JSON array per line,
//! `[hipparcos_number, ra_degrees, dec_degrees, magnitude]`, J2000 positions,
//! pre-filtered to stars of magnitude 5.5 or brighter. Fainter entries are
//! dropped on load so the invariant holds whatever the file contains.
use std::fs;

use camino::Utf8Path;
use log::debug;

use crate::constants::{FastHashMap, HIPPARCOS_MAG_LIMIT};
use crate::frames::{EquatorialJ2000, Pixel};
use crate::pigazing_errors::PiGazingError;
use crate::projection::CameraModel;

/// A star of the Hipparcos catalogue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HipparcosStar {
    pub hip: u32,
    pub position: EquatorialJ2000,
    pub mag: f64,
}

/// Bright-star catalogue, sorted from brightest to faintest.
#[derive(Debug, Clone, Default)]
pub struct HipparcosCatalogue {
    stars: Vec<HipparcosStar>,
    index: FastHashMap<u32, usize>,
}

impl HipparcosCatalogue {
    /// Build a catalogue from stars, dropping those fainter than the magnitude limit.
    pub fn from_stars(stars: impl IntoIterator<Item = HipparcosStar>) -> Self {
        let mut stars: Vec<HipparcosStar> = stars
            .into_iter()
            .filter(|s| s.mag <= HIPPARCOS_MAG_LIMIT)
            .collect();
        stars.sort_by(|a, b| a.mag.total_cmp(&b.mag).then(a.hip.cmp(&b.hip)));
        let index = stars.iter().enumerate().map(|(i, s)| (s.hip, i)).collect();
        HipparcosCatalogue { stars, index }
    }

    /// Parse the JSON-lines catalogue format.
    ///
    /// Blank lines are ignored; any other line that is not a four-element numeric
    /// array is a [`PiGazingError::MalformedInput`].
    pub fn from_json_lines_str(text: &str) -> Result<Self, PiGazingError> {
        let mut stars = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (hip, ra, dec, mag): (u32, f64, f64, f64) =
                serde_json::from_str(line).map_err(|e| {
                    PiGazingError::MalformedInput(format!(
                        "Hipparcos catalogue line {}: {e}",
                        line_number + 1
                    ))
                })?;
            stars.push(HipparcosStar {
                hip,
                position: EquatorialJ2000::new(ra / 15.0, dec),
                mag,
            });
        }
        let catalogue = Self::from_stars(stars);
        debug!("loaded {} Hipparcos stars", catalogue.len());
        Ok(catalogue)
    }

    /// Read the catalogue file.
    pub fn from_json_lines(path: &Utf8Path) -> Result<Self, PiGazingError> {
        Self::from_json_lines_str(&fs::read_to_string(path)?)
    }

    pub fn get(&self, hip: u32) -> Option<&HipparcosStar> {
        self.index.get(&hip).map(|&i| &self.stars[i])
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Stars from brightest to faintest.
    pub fn iter(&self) -> impl Iterator<Item = &HipparcosStar> {
        self.stars.iter()
    }

    /// The `n` brightest stars that project inside a frame.
    ///
    /// Arguments
    /// -----------------
    /// * `camera`: frame model whose centre is expressed in J2000.
    /// * `n`: maximum number of stars to return.
    ///
    /// Return
    /// ----------
    /// * Stars with their projected pixel, brightest first.
    pub fn brightest_in(&self, camera: &CameraModel, n: usize) -> Vec<(&HipparcosStar, Pixel)> {
        self.stars
            .iter()
            .filter_map(|star| {
                camera
                    .project(star.position.ra, star.position.dec)
                    .pixel()
                    .filter(|p| camera.contains(p))
                    .map(|p| (star, p))
            })
            .take(n)
            .collect()
    }
}
