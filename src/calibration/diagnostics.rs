//! Tables for judging a lens fit by eye.
//!
//! * `residuals.csv`: measured and modelled position of every star,
//! * `distortion.csv`: undistorted against distorted radius across the field,
//! * a summary table of the fitted parameters for the terminal.
//!
//! A systematic trend of the residual offset with radius points at an under-
//! or over-fitted distortion polynomial.
use std::fs;

use camino::Utf8Path;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use serde::Serialize;

use crate::constants::PixelDistance;
use crate::conversion::{format_dms, format_hms};
use crate::pigazing_errors::PiGazingError;
use crate::projection::RadialDistortion;

use super::fitter::{ImageStars, LensFit};

#[derive(Debug, Serialize)]
struct ResidualRow<'a> {
    image: &'a str,
    hip: u32,
    observed_x: f64,
    observed_y: f64,
    model_x: f64,
    model_y: f64,
    /// Normalised distance of the star from the frame centre
    radius: f64,
    offset: PixelDistance,
}

#[derive(Debug, Serialize)]
struct DistortionRow {
    radius: f64,
    distorted_radius: f64,
    multiplier: f64,
}

/// Write measured vs modelled star positions as CSV.
pub fn write_residuals_csv(
    path: &Utf8Path,
    fit: &LensFit,
    images: &[ImageStars],
) -> Result<usize, PiGazingError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for (index, image) in images.iter().enumerate() {
        let Some(camera) = fit.camera(image, index) else {
            continue;
        };
        let half_width = image.size_x / 2.0;
        for star in &image.stars {
            let Some(model) = camera
                .project(star.position.ra, star.position.dec)
                .pixel()
            else {
                continue;
            };
            let radius = (star.pixel.x - half_width).hypot(star.pixel.y - image.size_y / 2.0)
                / half_width;
            writer.serialize(ResidualRow {
                image: &image.name,
                hip: star.hip,
                observed_x: star.pixel.x,
                observed_y: star.pixel.y,
                model_x: model.x,
                model_y: model.y,
                radius,
                offset: model.distance_to(&star.pixel),
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// Write the distortion curve sampled at `samples + 1` radii in `[0, 1.5]`.
pub fn write_distortion_csv(
    path: &Utf8Path,
    distortion: &RadialDistortion,
    samples: usize,
) -> Result<(), PiGazingError> {
    let mut writer = csv::Writer::from_path(path)?;
    let samples = samples.max(1);
    for i in 0..=samples {
        let radius = 1.5 * i as f64 / samples as f64;
        writer.serialize(DistortionRow {
            radius,
            distorted_radius: distortion.distort_radius(radius),
            multiplier: distortion.multiplier(radius),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Terminal summary of a fit.
pub fn summary_table(fit: &LensFit, images: &[ImageStars]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Image"),
        Cell::new("Stars"),
        Cell::new("RA"),
        Cell::new("Dec"),
        Cell::new("Width [°]"),
        Cell::new("PA [°]"),
    ]);
    for (image, pointing) in images.iter().zip(&fit.pointings) {
        table.add_row(Row::from(vec![
            Cell::new(&image.name),
            Cell::new(image.stars.len()).set_alignment(CellAlignment::Right),
            Cell::new(format_hms(pointing.ra0)).set_alignment(CellAlignment::Right),
            Cell::new(format_dms(pointing.dec0)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", pointing.scale_x)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", pointing.pos_ang)).set_alignment(CellAlignment::Right),
        ]));
    }
    let d = &fit.distortion;
    table.add_row(Row::from(vec![
        Cell::new("lens"),
        Cell::new(""),
        Cell::new(format!("k1 = {:.5}", d.k1)),
        Cell::new(format!("k2 = {:.5}", d.k2)),
        Cell::new(format!("k3 = {:.5}", d.k3)),
        Cell::new(format!("aspect = {:.4}", fit.aspect)),
    ]));
    table.add_row(Row::from(vec![
        Cell::new("rms offset"),
        Cell::new(""),
        Cell::new(format!("{:.3} px", fit.rms_offset)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(if fit.converged { "converged" } else { "iteration cap" }),
    ]));
    table
}

/// Write every diagnostic table into `dir`, creating it when needed.
pub fn write_all(dir: &Utf8Path, fit: &LensFit, images: &[ImageStars]) -> Result<(), PiGazingError> {
    fs::create_dir_all(dir)?;
    write_residuals_csv(&dir.join("residuals.csv"), fit, images)?;
    write_distortion_csv(&dir.join("distortion.csv"), &fit.distortion, 30)?;
    fs::write(dir.join("summary.txt"), summary_table(fit, images).to_string())?;
    Ok(())
}

#[cfg(test)]
mod diagnostics_test {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::calibration::fitter::{ImagePointing, StarMatch};
    use crate::frames::{EquatorialJ2000, Pixel};

    fn fixture() -> (LensFit, Vec<ImageStars>) {
        let fit = LensFit {
            aspect: 1.0,
            distortion: RadialDistortion::new(0.01, 0.0, 0.0),
            pointings: vec![ImagePointing {
                ra0: 6.0,
                dec0: 10.0,
                scale_x: 40.0,
                pos_ang: 0.0,
            }],
            rms_offset: 0.4,
            objective: 1e-6,
            iterations: 10,
            converged: true,
        };
        let image = ImageStars {
            name: "frame".into(),
            size_x: 1000.0,
            size_y: 800.0,
            stars: vec![
                StarMatch {
                    hip: 1,
                    pixel: Pixel::new(500.0, 400.0),
                    position: EquatorialJ2000::new(6.0, 10.0),
                },
                StarMatch {
                    hip: 2,
                    pixel: Pixel::new(300.0, 200.0),
                    position: EquatorialJ2000::new(6.3, 15.0),
                },
            ],
            scale_hint: None,
        };
        (fit, vec![image])
    }

    #[test]
    fn test_write_all() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().join("diag")).unwrap();
        let (fit, images) = fixture();
        write_all(&dir, &fit, &images).unwrap();

        let mut reader = csv::Reader::from_path(dir.join("residuals.csv")).unwrap();
        assert_eq!(reader.records().count(), 2);
        let mut reader = csv::Reader::from_path(dir.join("distortion.csv")).unwrap();
        assert_eq!(reader.records().count(), 31);
        let summary = fs::read_to_string(dir.join("summary.txt")).unwrap();
        assert!(summary.contains("k1 = 0.01000"));
    }

    #[test]
    fn test_centre_star_has_zero_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("r.csv")).unwrap();
        let (fit, images) = fixture();
        write_residuals_csv(&path, &fit, &images).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let first = reader.records().next().unwrap().unwrap();
        let offset: f64 = first[7].parse().unwrap();
        assert!(offset < 1e-9);
    }
}
