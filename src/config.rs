//! # Pipeline configuration
//!
//! Every tunable threshold of the pipeline lives in [`PipelineConfig`], grouped
//! by component. Defaults reproduce the behaviour of the camera network; a JSON
//! document may override any subset of fields:
//!
//! ```json
//! {
//!   "coincidence": { "match_margin": 0.5 },
//!   "paths": { "hipparcos": "data/hipparcos.jsonl" }
//! }
//! ```
//!
//! Values are validated when built ([`PipelineConfigBuilder::build`]) and when
//! loaded ([`PipelineConfig::from_json_file`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use pigazing::config::PipelineConfig;
//!
//! let config = PipelineConfig::builder()
//!     .match_margin(0.5)
//!     .max_residual(5.0)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.triangulation.min_sight_lines, 6);
//! ```
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, Meter, PixelDistance};
use crate::pigazing_errors::PiGazingError;

/// Plate solving and nightly averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Minimum sky clarity of a still image worth solving
    pub sky_clarity_threshold: f64,
    /// Linear fraction of the frame kept around the centre before solving
    pub crop_fraction: f64,
    /// Wall-clock limit of one solver run, seconds
    pub solver_timeout: f64,
    /// Relative half-width of the field-of-view hint given to the solver
    pub scale_hint_fraction: f64,
    /// Executable invoked to solve images
    pub solver_command: String,
    /// Worker threads; `None` uses every core but one
    pub workers: Option<usize>,
    /// Bright catalogue stars checked per solved image
    pub quality_star_count: usize,
    /// Radius of the centroiding aperture
    pub aperture_radius: PixelDistance,
    /// Pixels above the background an aperture needs to count
    pub min_bright_pixels: usize,
    /// Per-image fits worse than this are left out of the nightly average
    pub max_fit_quality: PixelDistance,
    /// Added to the fit quality before taking its inverse as weight
    pub quality_weight_offset: f64,
    /// Fraction of the per-image fits discarded as outliers
    pub rejection_fraction: f64,
    /// Largest accepted spread of the nightly pointing
    pub max_nightly_spread: Degree,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        OrientationConfig {
            sky_clarity_threshold: 300.0,
            crop_fraction: 0.9,
            solver_timeout: 120.0,
            scale_hint_fraction: 0.2,
            solver_command: "solve-field".into(),
            workers: None,
            quality_star_count: 25,
            aperture_radius: 10.0,
            min_bright_pixels: 5,
            max_fit_quality: 2.0,
            quality_weight_offset: 0.1,
            rejection_fraction: 0.25,
            max_nightly_spread: 0.1,
        }
    }
}

/// Lens calibration fitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Simplex step of the pixel aspect ratio
    pub step_aspect: f64,
    /// Simplex step of each distortion coefficient
    pub step_distortion: f64,
    /// Simplex step of the field centre, degrees
    pub step_position: Degree,
    /// Simplex step of the horizontal field of view, degrees
    pub step_scale: Degree,
    /// Simplex step of the position angle, degrees
    pub step_pos_ang: Degree,
    /// Position angles tried when seeding each image, degrees
    pub pos_ang_seeds: Vec<Degree>,
    pub max_iterations: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            step_aspect: 0.005,
            step_distortion: 0.005,
            step_position: 1.0,
            step_scale: 1.0,
            step_pos_ang: 5.0,
            pos_ang_seeds: vec![45.0, 135.0, 225.0, 315.0],
            max_iterations: 200_000,
        }
    }
}

/// Multi-station coincidence grouper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoincidenceConfig {
    /// Slack added to each side of a group interval when testing overlap, seconds
    pub match_margin: f64,
    /// Candidates further than this from the group interval are not examined, seconds
    pub search_margin: f64,
    pub min_observatories: usize,
    /// Groups whose stations are all closer than this are dropped
    pub min_baseline: Meter,
}

impl Default for CoincidenceConfig {
    fn default() -> Self {
        CoincidenceConfig {
            match_margin: 1.0,
            search_margin: 60.0,
            min_observatories: 2,
            min_baseline: 1_000.0,
        }
    }
}

/// Trajectory triangulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    pub min_sight_lines: usize,
    pub min_baseline: Meter,
    /// Fits with a larger sight-line residual are rejected, degrees
    pub max_residual: Degree,
    /// Altitude of the trajectory seed above the station centroid
    pub seed_altitude: Meter,
    /// Simplex step of the trajectory parameters
    pub seed_step: Meter,
    /// Path samples kept per observation
    pub max_samples_per_observation: usize,
    pub max_iterations: usize,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        TriangulationConfig {
            min_sight_lines: 6,
            min_baseline: 1_000.0,
            max_residual: 7.0,
            seed_altitude: 20_000.0,
            seed_step: 10_000.0,
            max_samples_per_observation: 20,
            max_iterations: 100_000_000,
        }
    }
}

/// Aircraft and satellite identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationConfig {
    /// Scale of the clock-offset penalty `exp(offset / scale)`, seconds
    pub clock_offset_scale: f64,
    /// Bound of the fitted clock offset, seconds
    pub max_clock_offset: f64,
    /// Candidates with a larger mean angular offset are not matches, degrees
    pub max_angular_offset: Degree,
    /// Grid cells scanned before refining the clock offset
    pub clock_offset_grid: usize,
    /// Sampling interval of propagated satellite tracks, seconds
    pub satellite_step: f64,
    /// Padding added around an observation when fetching tracks, seconds
    pub track_padding: f64,
    /// Path samples compared with each candidate
    pub max_samples_per_observation: usize,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        IdentificationConfig {
            clock_offset_scale: 8.0,
            max_clock_offset: 20.0,
            max_angular_offset: 10.0,
            clock_offset_grid: 40,
            satellite_step: 1.0,
            track_padding: 30.0,
            max_samples_per_observation: 20,
        }
    }
}

/// Input files and scratch space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Observation archive
    pub archive: Utf8PathBuf,
    pub hipparcos: Utf8PathBuf,
    pub lenses: Utf8PathBuf,
    /// ADS-B records, CSV
    pub adsb: Utf8PathBuf,
    /// Satellite two-line element sets
    pub tle: Utf8PathBuf,
    /// Directory holding per-job scratch directories
    pub scratch: Utf8PathBuf,
    /// Directory receiving calibration diagnostics
    pub diagnostics: Utf8PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            archive: "archive.json".into(),
            hipparcos: "data/hipparcos.jsonl".into(),
            lenses: "data/lenses.xml".into(),
            adsb: "data/adsb.csv".into(),
            tle: "data/satellites.tle".into(),
            scratch: std::env::temp_dir()
                .join("pigazing")
                .to_string_lossy()
                .into_owned()
                .into(),
            diagnostics: "diagnostics".into(),
        }
    }
}

/// Complete configuration of the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orientation: OrientationConfig,
    pub calibration: CalibrationConfig,
    pub coincidence: CoincidenceConfig,
    pub triangulation: TriangulationConfig,
    pub identification: IdentificationConfig,
    pub paths: PathsConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent builder starting from the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load a JSON configuration; absent fields take their default.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: JSON document.
    ///
    /// Return
    /// ----------
    /// * The validated configuration, or [`PiGazingError::InvalidConfig`] when the
    ///   file cannot be read, parsed or validated.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, PiGazingError> {
        let text = fs::read_to_string(path)
            .map_err(|e| PiGazingError::InvalidConfig(format!("{path}: {e}")))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, PiGazingError> {
        let config: PipelineConfig = serde_json::from_str(text)
            .map_err(|e| PiGazingError::InvalidConfig(e.to_string()))?;
        PipelineConfigBuilder { config }.build()
    }
}

/// Builder for [`PipelineConfig`], with validation.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Orientation ---
    pub fn sky_clarity_threshold(mut self, v: f64) -> Self {
        self.config.orientation.sky_clarity_threshold = v;
        self
    }
    pub fn crop_fraction(mut self, v: f64) -> Self {
        self.config.orientation.crop_fraction = v;
        self
    }
    pub fn solver_timeout(mut self, v: f64) -> Self {
        self.config.orientation.solver_timeout = v;
        self
    }
    pub fn solver_command(mut self, v: impl Into<String>) -> Self {
        self.config.orientation.solver_command = v.into();
        self
    }
    pub fn workers(mut self, v: usize) -> Self {
        self.config.orientation.workers = Some(v);
        self
    }
    pub fn max_fit_quality(mut self, v: f64) -> Self {
        self.config.orientation.max_fit_quality = v;
        self
    }
    pub fn rejection_fraction(mut self, v: f64) -> Self {
        self.config.orientation.rejection_fraction = v;
        self
    }
    pub fn max_nightly_spread(mut self, v: f64) -> Self {
        self.config.orientation.max_nightly_spread = v;
        self
    }

    // --- Coincidence ---
    pub fn match_margin(mut self, v: f64) -> Self {
        self.config.coincidence.match_margin = v;
        self
    }
    pub fn search_margin(mut self, v: f64) -> Self {
        self.config.coincidence.search_margin = v;
        self
    }

    // --- Triangulation ---
    pub fn min_sight_lines(mut self, v: usize) -> Self {
        self.config.triangulation.min_sight_lines = v;
        self
    }
    pub fn min_baseline(mut self, v: f64) -> Self {
        self.config.triangulation.min_baseline = v;
        self.config.coincidence.min_baseline = v;
        self
    }
    pub fn max_residual(mut self, v: f64) -> Self {
        self.config.triangulation.max_residual = v;
        self
    }
    pub fn seed_altitude(mut self, v: f64) -> Self {
        self.config.triangulation.seed_altitude = v;
        self
    }

    // --- Identification ---
    pub fn clock_offset_scale(mut self, v: f64) -> Self {
        self.config.identification.clock_offset_scale = v;
        self
    }
    pub fn max_clock_offset(mut self, v: f64) -> Self {
        self.config.identification.max_clock_offset = v;
        self
    }
    pub fn max_angular_offset(mut self, v: f64) -> Self {
        self.config.identification.max_angular_offset = v;
        self
    }

    // --- Paths ---
    pub fn paths(mut self, v: PathsConfig) -> Self {
        self.config.paths = v;
        self
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater))
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    fn invalid(message: &str) -> Result<PipelineConfig, PiGazingError> {
        Err(PiGazingError::InvalidConfig(message.into()))
    }

    /// Validate and return the configuration.
    ///
    /// Validation rules
    /// -----------------
    /// * `0 < crop_fraction ≤ 1`, `0 ≤ rejection_fraction < 1`.
    /// * Timeouts, margins, scales and thresholds are non-negative; steps are positive.
    /// * `min_sight_lines ≥ 2`, `min_observatories ≥ 2`, `workers ≥ 1` when given.
    /// * At least one calibration position-angle seed.
    pub fn build(self) -> Result<PipelineConfig, PiGazingError> {
        let o = &self.config.orientation;
        if !(Self::gt0(o.crop_fraction) && o.crop_fraction <= 1.0) {
            return Self::invalid("crop_fraction must be in (0, 1]");
        }
        if !(Self::ge0(o.rejection_fraction) && o.rejection_fraction < 1.0) {
            return Self::invalid("rejection_fraction must be in [0, 1)");
        }
        if !Self::gt0(o.solver_timeout) {
            return Self::invalid("solver_timeout must be > 0");
        }
        if !Self::ge0(o.scale_hint_fraction) || o.scale_hint_fraction >= 1.0 {
            return Self::invalid("scale_hint_fraction must be in [0, 1)");
        }
        if !Self::ge0(o.max_fit_quality)
            || !Self::gt0(o.quality_weight_offset)
            || !Self::ge0(o.max_nightly_spread)
            || !Self::gt0(o.aperture_radius)
        {
            return Self::invalid("orientation thresholds must be non-negative");
        }
        if o.workers == Some(0) {
            return Self::invalid("workers must be >= 1");
        }
        if o.solver_command.trim().is_empty() {
            return Self::invalid("solver_command must not be empty");
        }

        let c = &self.config.calibration;
        let steps = [
            c.step_aspect,
            c.step_distortion,
            c.step_position,
            c.step_scale,
            c.step_pos_ang,
        ];
        if !steps.iter().all(|s| Self::gt0(*s)) {
            return Self::invalid("calibration steps must be > 0");
        }
        if c.pos_ang_seeds.is_empty() || c.max_iterations == 0 {
            return Self::invalid("calibration needs a position-angle seed and iterations");
        }

        let g = &self.config.coincidence;
        if !Self::ge0(g.match_margin) || !Self::ge0(g.search_margin) {
            return Self::invalid("coincidence margins must be non-negative");
        }
        if g.search_margin < g.match_margin {
            return Self::invalid("search_margin must be >= match_margin");
        }
        if g.min_observatories < 2 || !Self::ge0(g.min_baseline) {
            return Self::invalid("groups need at least two observatories");
        }

        let t = &self.config.triangulation;
        if t.min_sight_lines < 2 {
            return Self::invalid("min_sight_lines must be >= 2");
        }
        if !Self::ge0(t.min_baseline) || !Self::gt0(t.max_residual) {
            return Self::invalid("triangulation thresholds must be positive");
        }
        if !Self::gt0(t.seed_altitude) || !Self::gt0(t.seed_step) {
            return Self::invalid("seed_altitude and seed_step must be > 0");
        }
        if t.max_samples_per_observation == 0 || t.max_iterations == 0 {
            return Self::invalid("sample and iteration caps must be >= 1");
        }

        let i = &self.config.identification;
        if !Self::gt0(i.clock_offset_scale) {
            return Self::invalid("clock_offset_scale must be > 0");
        }
        if !Self::ge0(i.max_clock_offset)
            || !Self::gt0(i.max_angular_offset)
            || !Self::ge0(i.track_padding)
        {
            return Self::invalid("identification bounds must be non-negative");
        }
        if !Self::gt0(i.satellite_step)
            || i.clock_offset_grid < 2
            || i.max_samples_per_observation == 0
        {
            return Self::invalid(
                "satellite_step must be > 0, clock_offset_grid >= 2 and the sample cap >= 1",
            );
        }

        Ok(self.config)
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PARAM_COL: usize = 40;

        macro_rules! line {
            ($name:expr, $val:expr) => {{
                let s = format!("{} = {}", $name, $val);
                let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()));
                writeln!(f, "  {s}{pad}")
            }};
        }

        let o = &self.orientation;
        writeln!(f, "[orientation]")?;
        line!("sky_clarity_threshold", o.sky_clarity_threshold)?;
        line!("crop_fraction", o.crop_fraction)?;
        line!("solver_timeout", o.solver_timeout)?;
        line!("solver_command", o.solver_command)?;
        line!("max_fit_quality", o.max_fit_quality)?;
        line!("rejection_fraction", o.rejection_fraction)?;
        line!("max_nightly_spread", o.max_nightly_spread)?;

        let g = &self.coincidence;
        writeln!(f, "[coincidence]")?;
        line!("match_margin", g.match_margin)?;
        line!("search_margin", g.search_margin)?;
        line!("min_baseline", g.min_baseline)?;

        let t = &self.triangulation;
        writeln!(f, "[triangulation]")?;
        line!("min_sight_lines", t.min_sight_lines)?;
        line!("max_residual", t.max_residual)?;
        line!("seed_altitude", t.seed_altitude)?;

        let i = &self.identification;
        writeln!(f, "[identification]")?;
        line!("clock_offset_scale", i.clock_offset_scale)?;
        line!("max_clock_offset", i.max_clock_offset)?;
        line!("max_angular_offset", i.max_angular_offset)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.orientation.sky_clarity_threshold, 300.0);
        assert_eq!(config.identification.clock_offset_scale, 8.0);
        assert_eq!(config.triangulation.seed_altitude, 20_000.0);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let err = PipelineConfig::builder().crop_fraction(1.5).build();
        assert!(matches!(err, Err(PiGazingError::InvalidConfig(_))));
        assert!(PipelineConfig::builder().min_sight_lines(1).build().is_err());
        assert!(PipelineConfig::builder().match_margin(f64::NAN).build().is_err());
        assert!(PipelineConfig::builder().match_margin(90.0).build().is_err());
        assert!(PipelineConfig::builder().workers(0).build().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config = PipelineConfig::from_json_str(
            r#"{ "coincidence": { "match_margin": 0.0 }, "triangulation": { "max_residual": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.coincidence.match_margin, 0.0);
        assert_eq!(config.coincidence.search_margin, 60.0);
        assert_eq!(config.triangulation.max_residual, 5.0);
        assert!(PipelineConfig::from_json_str(r#"{ "orientation": { "crop_fraction": 0 } }"#)
            .is_err());
    }

    #[test]
    fn test_display() {
        let text = format!("{}", PipelineConfig::default());
        assert!(text.contains("[triangulation]"));
        assert!(text.contains("clock_offset_scale = 8"));
    }
}
