//! # Lens calibration
//!
//! Estimates the radial distortion of a lens from stars identified by hand on
//! one or more still images taken through it.
//!
//! ## Input
//!
//! One JSON descriptor per image:
//!
//! ```json
//! { "observatory": "eddington0", "lens": "VF-DCD-AI-3.5-18-C-2MP",
//!   "size_x": 1920, "size_y": 1080, "utc": 1609459200,
//!   "star_list": [[512.3, 300.1, 32349], [1201.0, 655.4, 27989]] }
//! ```
//!
//! Stars whose Hipparcos number is not in the catalogue are dropped with a
//! warning and the fit proceeds.
//!
//! ## Output
//!
//! A [`LensFit`]; when the descriptors name an observatory known to the store,
//! the fitted coefficients are recorded as its `calibration:lens_barrel_k*`
//! metadata, effective from the earliest descriptor time. Without any descriptor
//! time nothing is recorded. The lens catalogue file is never modified.
pub mod diagnostics;
pub mod fitter;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::catalogs::{HipparcosCatalogue, LensCatalogue};
use crate::config::CalibrationConfig;
use crate::constants::{ObservatoryId, UnixTime};
use crate::frames::Pixel;
use crate::pigazing_errors::PiGazingError;
use crate::store::{ObservationStore, ObservatoryMetadata, StatusKey};
use crate::time::{now, Deadline};

pub use fitter::{ImagePointing, ImageStars, LensCalibrator, LensFit, StarMatch};

/// Author recorded on metadata written by the calibration.
pub const CALIBRATION_AUTHOR: &str = "pigazing:calibrate_lens";

/// Hand-identified stars of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDescriptor {
    #[serde(default)]
    pub observatory: Option<ObservatoryId>,
    #[serde(default)]
    pub lens: Option<String>,
    pub size_x: f64,
    pub size_y: f64,
    /// `[pixel_x, pixel_y, hipparcos_number]`
    pub star_list: Vec<(f64, f64, u32)>,
    /// Time the image was taken
    #[serde(default)]
    pub utc: Option<UnixTime>,
}

impl CalibrationDescriptor {
    pub fn from_json_str(text: &str) -> Result<Self, PiGazingError> {
        serde_json::from_str(text)
            .map_err(|e| PiGazingError::MalformedInput(format!("calibration descriptor: {e}")))
    }

    pub fn from_json_file(path: &Utf8Path) -> Result<Self, PiGazingError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| PiGazingError::MalformedInput(format!("{path}: {e}")))
    }

    /// Pair each listed star with its catalogue position.
    pub fn match_stars(
        &self,
        name: &str,
        hipparcos: &HipparcosCatalogue,
        lenses: &LensCatalogue,
    ) -> ImageStars {
        let stars = self
            .star_list
            .iter()
            .filter_map(|&(x, y, hip)| match hipparcos.get(hip) {
                Some(star) => Some(StarMatch {
                    hip,
                    pixel: Pixel::new(x, y),
                    position: star.position,
                }),
                None => {
                    warn!("{name}: Hipparcos {hip} is not in the catalogue, dropped");
                    None
                }
            })
            .collect();
        let scale_hint = self.lens.as_deref().and_then(|lens| match lenses.get(lens) {
            Ok(model) => Some(model.fov_deg),
            Err(e) => {
                warn!("{name}: {e}");
                None
            }
        });
        ImageStars {
            name: name.to_string(),
            size_x: self.size_x,
            size_y: self.size_y,
            stars,
            scale_hint,
        }
    }
}

/// Read a list file: one descriptor path per line, relative to the list.
pub fn read_descriptor_list(list: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PiGazingError> {
    let base = list.parent().unwrap_or(Utf8Path::new(""));
    Ok(fs::read_to_string(list)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| base.join(l))
        .collect())
}

/// Options of a calibration run.
#[derive(Debug, Clone, Default)]
pub struct CalibrationRun {
    /// Fit `k2`, `k3` as well as `k1`
    pub all_coefficients: bool,
    /// Observatory the fit is recorded for; descriptors naming another one are rejected
    pub observatory: Option<ObservatoryId>,
    /// Delete earlier barrel coefficients of the observatory in `[utc_min, utc_max]`
    pub flush: Option<(UnixTime, UnixTime)>,
    /// Directory receiving the diagnostic tables
    pub diagnostics: Option<Utf8PathBuf>,
    pub deadline: Deadline,
}

/// Result of [`calibrate_lens`].
#[derive(Debug, Clone, PartialEq)]
pub struct LensCalibration {
    pub fit: LensFit,
    pub images: Vec<ImageStars>,
    /// Observatory whose metadata received the coefficients
    pub observatory: Option<ObservatoryId>,
    pub utc: Option<UnixTime>,
}

/// Fit a lens model to descriptors and record it.
///
/// Arguments
/// -----------------
/// * `store`: receives the barrel coefficients when the observatory is known.
/// * `descriptors`: `(name, descriptor)` pairs, all taken through one lens.
/// * `hipparcos`, `lenses`: reference catalogues.
/// * `config`: simplex steps and seeds.
/// * `run`: coefficient set, flush window and diagnostics output.
///
/// Return
/// ----------
/// * The [`LensCalibration`]. Storage failures are propagated; an unknown
///   observatory, or descriptors without a utc, only skip the metadata write.
/// * [`PiGazingError::InvalidConfig`] when a descriptor names an observatory other
///   than `run.observatory`.
/// * [`PiGazingError::DeadlineExceeded`] when the deadline has passed before the fit.
pub fn calibrate_lens<S: ObservationStore + ?Sized>(
    store: &mut S,
    descriptors: &[(String, CalibrationDescriptor)],
    hipparcos: &HipparcosCatalogue,
    lenses: &LensCatalogue,
    config: &CalibrationConfig,
    run: &CalibrationRun,
) -> Result<LensCalibration, PiGazingError> {
    if let Some(id) = &run.observatory {
        if let Some((name, d)) = descriptors
            .iter()
            .find(|(_, d)| d.observatory.as_ref().is_some_and(|o| o != id))
        {
            return Err(PiGazingError::InvalidConfig(format!(
                "{name} belongs to {}, not {id}",
                d.observatory.as_deref().unwrap_or_default()
            )));
        }
    }
    if run.deadline.expired() {
        return Err(PiGazingError::DeadlineExceeded);
    }

    let images: Vec<ImageStars> = descriptors
        .iter()
        .map(|(name, d)| d.match_stars(name, hipparcos, lenses))
        .collect();
    let fit = LensCalibrator::new(config)
        .all_coefficients(run.all_coefficients)
        .fit(&images)?;

    if let Some(dir) = &run.diagnostics {
        diagnostics::write_all(dir, &fit, &images)?;
        info!("calibration diagnostics written to {dir}");
    }

    let observatory = run
        .observatory
        .clone()
        .or_else(|| descriptors.iter().find_map(|(_, d)| d.observatory.clone()));
    let utc = descriptors
        .iter()
        .filter_map(|(_, d)| d.utc)
        .min_by(|a, b| a.total_cmp(b));

    let mut recorded = None;
    match (&observatory, utc) {
        (Some(id), None) => {
            warn!("{id}: no descriptor carries a utc, coefficients not recorded")
        }
        (Some(id), Some(utc)) => match store.observatory(id) {
            Ok(_) => {
                if let Some((utc_min, utc_max)) = run.flush {
                    let n = flush_lens_fit(store, id, utc_min, utc_max)?;
                    info!("{id}: flushed {n} barrel coefficient record(s)");
                }
                record_lens_fit(store, id, utc, &fit)?;
                store.commit()?;
                recorded = Some(id.clone());
            }
            Err(PiGazingError::UnknownObservatory(_)) => {
                warn!("{id}: unknown observatory, coefficients not recorded")
            }
            Err(e) => return Err(e),
        },
        (None, _) => {}
    }

    Ok(LensCalibration {
        fit,
        images,
        observatory: recorded,
        utc,
    })
}

/// Write the barrel coefficients of `fit` as observatory metadata effective at `utc`.
pub fn record_lens_fit<S: ObservationStore + ?Sized>(
    store: &mut S,
    observatory: &str,
    utc: UnixTime,
    fit: &LensFit,
) -> Result<(), PiGazingError> {
    let d = fit.distortion;
    let created = now();
    for (key, value) in StatusKey::LENS_BARREL.into_iter().zip([d.k1, d.k2, d.k3]) {
        store.write_observatory_metadata(ObservatoryMetadata {
            observatory: observatory.to_string(),
            key,
            value: value.into(),
            time: utc,
            created,
            author: CALIBRATION_AUTHOR.into(),
        })?;
    }
    Ok(())
}

/// Delete barrel coefficients of `observatory` effective in `[utc_min, utc_max]`.
pub fn flush_lens_fit<S: ObservationStore + ?Sized>(
    store: &mut S,
    observatory: &str,
    utc_min: UnixTime,
    utc_max: UnixTime,
) -> Result<usize, PiGazingError> {
    store.delete_observatory_metadata(Some(observatory), &StatusKey::LENS_BARREL, utc_min, utc_max)
}

#[cfg(test)]
mod calibration_test {
    use super::*;
    use crate::catalogs::{HipparcosStar, LensModel};
    use crate::frames::EquatorialJ2000;
    use crate::projection::{CameraModel, RadialDistortion};
    use crate::store::{MemoryStore, Observatory};

    #[test]
    fn test_descriptor_parsing() {
        let d = CalibrationDescriptor::from_json_str(
            r#"{ "observatory": "eddington0", "lens": "wide", "size_x": 1920, "size_y": 1080,
                 "star_list": [[512.3, 300.1, 32349], [1201.0, 655.4, 27989]] }"#,
        )
        .unwrap();
        assert_eq!(d.star_list.len(), 2);
        assert_eq!(d.star_list[0].2, 32349);
        assert_eq!(d.utc, None);
        assert!(matches!(
            CalibrationDescriptor::from_json_str("{ \"size_x\": 1 }"),
            Err(PiGazingError::MalformedInput(_))
        ));
    }

    /// A 6×5 grid of stars seen through `truth`, and a store knowing the observatory.
    fn star_grid() -> (CameraModel, HipparcosCatalogue, LensCatalogue, MemoryStore, CalibrationDescriptor) {
        let truth = CameraModel::new(
            3.0,
            45.0,
            1600.0,
            1200.0,
            40.0,
            -20.0,
            RadialDistortion::new(0.03, 0.0, 0.0),
        );
        let mut stars = Vec::new();
        let mut star_list = Vec::new();
        for (i, (gx, gy)) in (1..7).flat_map(|x| (1..6).map(move |y| (x, y))).enumerate() {
            let pixel = Pixel::new(1600.0 * gx as f64 / 7.0, 1200.0 * gy as f64 / 6.0);
            let (ra, dec) = truth.unproject(&pixel).unwrap();
            let hip = 100 + i as u32;
            stars.push(HipparcosStar {
                hip,
                position: EquatorialJ2000::new(ra, dec),
                mag: 3.0,
            });
            star_list.push((pixel.x, pixel.y, hip));
        }
        // Not in the catalogue
        star_list.push((10.0, 10.0, 999_999));
        let hipparcos = HipparcosCatalogue::from_stars(stars);
        let lenses = LensCatalogue::from_lenses([LensModel {
            name: "wide".into(),
            fov_deg: 42.0,
            barrel_k1: 0.0,
            barrel_k2: 0.0,
            barrel_k3: 0.0,
        }]);

        let mut store = MemoryStore::new();
        store.add_observatory(Observatory {
            id: "eddington0".into(),
            name: "Eddington".into(),
            lat: 52.2,
            lng: 0.1,
            alt: 20.0,
            owner: "o".into(),
        });
        let descriptor = CalibrationDescriptor {
            observatory: Some("eddington0".into()),
            lens: Some("wide".into()),
            size_x: 1600.0,
            size_y: 1200.0,
            star_list,
            utc: Some(1_000.0),
        };
        (truth, hipparcos, lenses, store, descriptor)
    }

    #[test]
    fn test_calibrate_and_record() {
        let (truth, hipparcos, lenses, mut store, descriptor) = star_grid();
        let result = calibrate_lens(
            &mut store,
            &[("frame".into(), descriptor)],
            &hipparcos,
            &lenses,
            &CalibrationConfig::default(),
            &CalibrationRun::default(),
        )
        .unwrap();
        assert_eq!(result.images[0].stars.len(), 30);
        assert_eq!(result.observatory.as_deref(), Some("eddington0"));

        let status = store.observatory_status("eddington0", 2_000.0).unwrap();
        let d = status.distortion(&lenses).unwrap();
        for r in [0.25, 0.5, 0.75, 1.0] {
            let expected = truth.distortion.distort_radius(r);
            assert!((d.distort_radius(r) - expected).abs() < 2e-3, "r = {r}");
        }

        let removed = flush_lens_fit(&mut store, "eddington0", 0.0, 5_000.0).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.observatory_status("eddington0", 2_000.0).unwrap().lens_barrel, [None; 3]);
    }

    #[test]
    fn test_fit_without_utc_is_not_recorded() {
        let (_, hipparcos, lenses, mut store, mut descriptor) = star_grid();
        descriptor.utc = None;
        let result = calibrate_lens(
            &mut store,
            &[("frame".into(), descriptor)],
            &hipparcos,
            &lenses,
            &CalibrationConfig::default(),
            &CalibrationRun::default(),
        )
        .unwrap();
        assert_eq!(result.observatory, None);
        assert_eq!(store.observatory_status("eddington0", 2_000.0).unwrap().lens_barrel, [None; 3]);
    }

    #[test]
    fn test_run_observatory_must_match_descriptors() {
        let (_, hipparcos, lenses, mut store, descriptor) = star_grid();
        let run = CalibrationRun {
            observatory: Some("hubble0".into()),
            ..Default::default()
        };
        let result = calibrate_lens(
            &mut store,
            &[("frame".into(), descriptor)],
            &hipparcos,
            &lenses,
            &CalibrationConfig::default(),
            &run,
        );
        assert!(matches!(result, Err(PiGazingError::InvalidConfig(_))));
    }

    #[test]
    fn test_expired_deadline_skips_fit() {
        let (_, hipparcos, lenses, mut store, descriptor) = star_grid();
        let run = CalibrationRun {
            deadline: Deadline::new(Some(0.0)),
            ..Default::default()
        };
        let result = calibrate_lens(
            &mut store,
            &[("frame".into(), descriptor)],
            &hipparcos,
            &lenses,
            &CalibrationConfig::default(),
            &run,
        );
        assert!(matches!(result, Err(PiGazingError::DeadlineExceeded)));
        assert_eq!(store.observatory_status("eddington0", 2_000.0).unwrap().lens_barrel, [None; 3]);
    }
}
