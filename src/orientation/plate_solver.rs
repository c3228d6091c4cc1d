//! Plate solving through `astrometry.net`.
//!
//! `solve-field` is run on a prepared image and its human-readable output is
//! scanned for three lines:
//!
//! ```text
//! Field center: (RA H:M:S, Dec D:M:S) = (05:35:17.300, -05:23:28.000).
//! Field size: 27.5 x 20.6 deg
//! Field rotation angle: up is 12.3 degrees E of N
//! ```
//!
//! The solver labels the image bottom as "up" and measures towards east or
//! west, so the reported angle is converted to the position angle of
//! image-up from north through east: `(±X) + 180°`.
use std::fs;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::constants::{wrap_360, Degree};
use crate::conversion::{parse_dec_dms, parse_ra_hms};
use crate::frames::EquatorialJ2000;

static POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(RA H:M:S, Dec D:M:S\) = \((-?\d+):(\d\d):([\d.]+), \+?(-?\d+):(\d\d):([\d.]+)\)")
        .expect("position regex")
});
static ROTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"up is \+?([-\d.]+) degrees ([EW]) of N").expect("rotation regex"));
static FIELD_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Field size: ([\d.]+) x ([\d.]+) deg").expect("field size regex"));

/// Part of the solver output that could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    Position,
    PositionAngle,
    FieldSize,
}

/// Why an image has no plate solution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverFailure {
    #[error("no solution, {0:?} missing from solver output")]
    NoSolution(FailReason),

    #[error("solver did not finish in time")]
    Timeout,

    #[error("unparsable solver line: {0}")]
    ParseFailure(String),

    #[error("solver could not be run: {0}")]
    Io(String),
}

impl SolverFailure {
    /// Short tag used in logs and outcome counters.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SolverFailure::NoSolution(FailReason::Position) => "FAIL(POS)",
            SolverFailure::NoSolution(FailReason::PositionAngle) => "FAIL(PA)",
            SolverFailure::NoSolution(FailReason::FieldSize) => "FAIL(SIZ)",
            SolverFailure::Timeout => "TIMEOUT",
            SolverFailure::ParseFailure(_) => "FAIL(PARSE)",
            SolverFailure::Io(_) => "FAIL(IO)",
        }
    }
}

impl From<std::io::Error> for SolverFailure {
    fn from(e: std::io::Error) -> Self {
        SolverFailure::Io(e.to_string())
    }
}

/// Astrometric solution of a solved image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateSolution {
    /// Centre of the solved image
    pub centre: EquatorialJ2000,
    /// Position angle of image-up, north through east, `[0, 360)`
    pub pos_ang: Degree,
    /// Field width of the solved image
    pub width: Degree,
    pub height: Degree,
}

fn matched_line<'t>(text: &'t str, at: usize) -> &'t str {
    let start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let end = text[at..].find('\n').map_or(text.len(), |i| at + i);
    text[start..end].trim()
}

/// Parse the text output of `solve-field`.
///
/// Return
/// ----------
/// * The [`PlateSolution`], [`SolverFailure::NoSolution`] naming the first missing line,
///   or [`SolverFailure::ParseFailure`] with a matched line whose numbers are invalid.
pub fn parse_solve_field_output(text: &str) -> Result<PlateSolution, SolverFailure> {
    let position = POSITION
        .captures(text)
        .ok_or(SolverFailure::NoSolution(FailReason::Position))?;
    let rotation = ROTATION
        .captures(text)
        .ok_or(SolverFailure::NoSolution(FailReason::PositionAngle))?;
    let size = FIELD_SIZE
        .captures(text)
        .ok_or(SolverFailure::NoSolution(FailReason::FieldSize))?;

    let line_of = |c: &regex::Captures| {
        SolverFailure::ParseFailure(matched_line(text, c.get(0).map_or(0, |m| m.start())).into())
    };

    let ra = parse_ra_hms(&format!("{}:{}:{}", &position[1], &position[2], &position[3]))
        .ok_or_else(|| line_of(&position))?;
    let dec = parse_dec_dms(&format!("{}:{}:{}", &position[4], &position[5], &position[6]))
        .filter(|d| d.abs() <= 90.0)
        .ok_or_else(|| line_of(&position))?;

    let angle: f64 = rotation[1].parse().map_err(|_| line_of(&rotation))?;
    let angle = if &rotation[2] == "E" { angle } else { -angle };

    let width: f64 = size[1].parse().map_err(|_| line_of(&size))?;
    let height: f64 = size[2].parse().map_err(|_| line_of(&size))?;
    if !(width > 0.0 && height > 0.0) {
        return Err(line_of(&size));
    }

    Ok(PlateSolution {
        centre: EquatorialJ2000::new(ra, dec),
        pos_ang: wrap_360(angle + 180.0),
        width,
        height,
    })
}

/// Something that can plate-solve an image file.
pub trait PlateSolver: Send + Sync {
    /// Solve `image`, whose horizontal field of view is within `scale_hint = (low, high)` degrees.
    ///
    /// `scratch` is a private directory the solver may write to.
    fn solve(
        &self,
        image: &Utf8Path,
        scale_hint: (Degree, Degree),
        scratch: &Utf8Path,
    ) -> Result<PlateSolution, SolverFailure>;
}

/// `solve-field` run as a child process under a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct AstrometryNet {
    pub command: String,
    pub timeout: Duration,
}

impl AstrometryNet {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        AstrometryNet {
            command: command.into(),
            timeout,
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl PlateSolver for AstrometryNet {
    fn solve(
        &self,
        image: &Utf8Path,
        scale_hint: (Degree, Degree),
        scratch: &Utf8Path,
    ) -> Result<PlateSolution, SolverFailure> {
        let output_path = scratch.join("solve_field.txt");
        let output = fs::File::create(&output_path)?;
        let errors = output.try_clone()?;

        let mut child = Command::new(&self.command)
            .args(["--no-plots", "--crpix-center", "--overwrite", "--scale-units", "degwidth"])
            .arg("--scale-low")
            .arg(format!("{:.2}", scale_hint.0))
            .arg("--scale-high")
            .arg(format!("{:.2}", scale_hint.1))
            .arg("--dir")
            .arg(scratch.as_str())
            .arg(image.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(errors))
            .spawn()?;

        let started = Instant::now();
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if started.elapsed() >= self.timeout {
                // The child may exit between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                debug!("{image}: solver killed after {:?}", self.timeout);
                return Err(SolverFailure::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
        parse_solve_field_output(&fs::read_to_string(&output_path)?)
    }
}

#[cfg(test)]
mod plate_solver_test {
    use super::*;

    const OUTPUT: &str = "\
Reading input file 1 of 1: \"frame.png\"...
Field 1: solved with index index-4110.fits.
Field center: (RA,Dec) = (83.822083, -5.391111) deg.
Field center: (RA H:M:S, Dec D:M:S) = (05:35:17.300, -05:23:28.000).
Field size: 27.5 x 20.6 deg
Field rotation angle: up is 12.3 degrees E of N
Field parity: pos
";

    #[test]
    fn test_parse_solution() {
        let s = parse_solve_field_output(OUTPUT).unwrap();
        assert!((s.centre.ra - (5.0 + 35.0 / 60.0 + 17.3 / 3600.0)).abs() < 1e-9);
        assert!((s.centre.dec + (5.0 + 23.0 / 60.0 + 28.0 / 3600.0)).abs() < 1e-9);
        assert!((s.pos_ang - 192.3).abs() < 1e-9);
        assert_eq!((s.width, s.height), (27.5, 20.6));
    }

    #[test]
    fn test_west_and_negative_zero_dec() {
        let text = OUTPUT
            .replace("-05:23:28.000", "-00:30:00.0")
            .replace("12.3 degrees E", "30 degrees W");
        let s = parse_solve_field_output(&text).unwrap();
        assert!((s.centre.dec + 0.5).abs() < 1e-12);
        assert!((s.pos_ang - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_codes() {
        let no_pos = OUTPUT.replace("(RA H:M:S, Dec D:M:S)", "");
        let err = parse_solve_field_output(&no_pos).unwrap_err();
        assert_eq!(err, SolverFailure::NoSolution(FailReason::Position));
        assert_eq!(err.reason_code(), "FAIL(POS)");

        let no_pa = OUTPUT.replace("up is", "down is");
        assert_eq!(
            parse_solve_field_output(&no_pa).unwrap_err().reason_code(),
            "FAIL(PA)"
        );
        let no_size = OUTPUT.replace("Field size", "Field");
        assert_eq!(
            parse_solve_field_output(&no_size).unwrap_err().reason_code(),
            "FAIL(SIZ)"
        );
        assert_eq!(SolverFailure::Timeout.reason_code(), "TIMEOUT");
    }

    #[test]
    fn test_parse_failure_reports_line() {
        let bad = OUTPUT.replace("up is 12.3 degrees", "up is 1.2.3 degrees");
        assert_eq!(
            parse_solve_field_output(&bad).unwrap_err(),
            SolverFailure::ParseFailure("Field rotation angle: up is 1.2.3 degrees E of N".into())
        );
    }

    #[test]
    fn test_missing_binary_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Utf8Path::from_path(dir.path()).unwrap();
        let solver = AstrometryNet::new("/nonexistent/solve-field", Duration::from_secs(1));
        let err = solver
            .solve(&scratch.join("frame.png"), (40.0, 60.0), scratch)
            .unwrap_err();
        assert!(matches!(err, SolverFailure::Io(_)));
    }
}
