//! # Camera orientation
//!
//! Fits the pointing of each camera from its long-exposure still images and
//! averages the fits of a night into the orientation used downstream.
//!
//! ## Per-image fit (`orientation_calculate`)
//!
//! Still images of the window whose sky clarity reaches the threshold and
//! that carry no solution yet are, in time order:
//!
//! 1. rectified and cropped ([`image_prep`]),
//! 2. plate solved ([`plate_solver`]) with a field-of-view hint from the lens,
//! 3. converted to horizontal coordinates: altitude, azimuth and the tilt of
//!    image-up from the vertical,
//! 4. scored against catalogue stars ([`quality`]),
//! 5. written back as observation metadata.
//!
//! Steps 1–4 run on a [`worker_pool`]; step 5 runs on the calling thread as
//! results arrive, each image committed on its own.
//!
//! ## Nightly average
//!
//! See [`daily_average`].
pub mod daily_average;
pub mod image_prep;
pub mod plate_solver;
pub mod quality;
pub mod scratch;
pub mod state;
pub mod worker_pool;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};

use crate::catalogs::{HipparcosCatalogue, LensCatalogue};
use crate::config::OrientationConfig;
use crate::constants::{wrap_360, Degree, Hour, ObservationId, ObservatoryId, UnixTime};
use crate::frames::{EquatorialJ2000, GeodeticPosition};
use crate::logging::OutcomeCounters;
use crate::pigazing_errors::PiGazingError;
use crate::progress::BatchProgress;
use crate::projection::{CameraModel, RadialDistortion};
use crate::sky::{j2000_to_epoch, position_angle, ra_dec};
use crate::store::{MetaKey, Observation, ObservationKind, ObservationQuery, ObservationStore};
use crate::time::{iso, Deadline};

pub use daily_average::{orientation_daily_average, DailyAverageRun, NightlyOrientation};
pub use plate_solver::{AstrometryNet, PlateSolution, PlateSolver, SolverFailure};
pub use quality::FitQuality;
pub use scratch::ScratchDir;
pub use state::ImageState;

/// Orientation of one solved still image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageOrientation {
    /// Frame centre, J2000
    pub centre: EquatorialJ2000,
    /// Position angle of image-up in the J2000 frame
    pub pa: Degree,
    pub altitude: Degree,
    pub azimuth: Degree,
    /// Position angle of the zenith minus that of image-up, `(-180, 180]`
    pub tilt: Degree,
    /// Field of view of the full, uncropped frame
    pub width_x_field: Degree,
    pub width_y_field: Degree,
    pub quality: Option<FitQuality>,
}

fn wrap_signed(angle: Degree) -> Degree {
    let a = wrap_360(angle);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Horizontal orientation of a plate solution taken at `utc` from `site`.
///
/// Arguments
/// -----------------
/// * `solution`: solver output for the cropped frame, J2000.
/// * `utc`: exposure time.
/// * `site`: observatory position.
/// * `crop`: crop fraction applied before solving.
///
/// Return
/// ----------
/// * The [`ImageOrientation`], without quality.
pub fn compute_orientation(
    solution: &PlateSolution,
    utc: UnixTime,
    site: &GeodeticPosition,
    crop: f64,
) -> ImageOrientation {
    let centre = solution.centre.at_epoch(utc);
    let horizontal = centre.to_horizontal(site);

    // The J2000 north direction is rotated from the north of date by precession
    let (pole_ra, pole_dec) = j2000_to_epoch(0.0, 90.0, utc);
    let pa_epoch = solution.pos_ang + position_angle(centre.ra, centre.dec, pole_ra, pole_dec);

    let (zenith_ra, zenith_dec) = ra_dec(90.0, 0.0, utc, site.lat, site.lng);
    let pa_zenith = position_angle(centre.ra, centre.dec, zenith_ra, zenith_dec);

    ImageOrientation {
        centre: solution.centre,
        pa: solution.pos_ang,
        altitude: horizontal.alt,
        azimuth: horizontal.az,
        tilt: wrap_signed(pa_zenith - pa_epoch),
        width_x_field: image_prep::expand_field(solution.width, crop),
        width_y_field: image_prep::expand_field(solution.height, crop),
        quality: None,
    }
}

/// Position angle of image-up at epoch, for a camera with `tilt` whose frame
/// centre is at `(ra, dec)` of date.
pub fn position_angle_from_tilt(
    ra: Hour,
    dec: Degree,
    tilt: Degree,
    utc: UnixTime,
    site: &GeodeticPosition,
) -> Degree {
    let (zenith_ra, zenith_dec) = ra_dec(90.0, 0.0, utc, site.lat, site.lng);
    wrap_360(position_angle(ra, dec, zenith_ra, zenith_dec) - tilt)
}

/// Everything a worker needs to fit one image.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub observation: ObservationId,
    pub observatory: ObservatoryId,
    pub utc: UnixTime,
    pub image: Utf8PathBuf,
    pub site: GeodeticPosition,
    pub distortion: RadialDistortion,
    /// Solver bounds on the field width of the cropped frame
    pub scale_hint: (Degree, Degree),
    pub state: ImageState,
}

/// Build the job of a candidate image from the observatory status at its time.
pub fn image_job<S: ObservationStore + ?Sized>(
    store: &S,
    observation: &Observation,
    lenses: &LensCatalogue,
    config: &OrientationConfig,
) -> Result<ImageJob, PiGazingError> {
    let observatory = store.observatory(&observation.observatory)?;
    let status = store.observatory_status(&observation.observatory, observation.utc)?;
    let lens = status.lens(lenses)?;
    let (low, high) = lens.scale_hint(config.scale_hint_fraction);
    let crop = config.crop_fraction;

    let primary = store
        .files_for_observation(&observation.id)?
        .into_iter()
        .find(|f| f.primary_image)
        .ok_or_else(|| {
            PiGazingError::missing(format!("observation {}", observation.id), "primary_image")
        })?;

    Ok(ImageJob {
        observation: observation.id.clone(),
        observatory: observation.observatory.clone(),
        utc: observation.utc,
        image: store.file_path(&primary.id)?,
        site: status.position(&observatory),
        distortion: status.distortion(lenses)?,
        scale_hint: (
            image_prep::crop_field(low, crop),
            image_prep::crop_field(high, crop),
        ),
        state: ImageState::of(observation),
    })
}

/// Rectify, solve and score one image.
pub fn process_image(
    job: &ImageJob,
    solver: &dyn PlateSolver,
    hipparcos: &HipparcosCatalogue,
    config: &OrientationConfig,
    scratch: &Utf8Path,
) -> Result<ImageOrientation, PiGazingError> {
    let frame = image_prep::load_frame(&job.image)?;
    let prepared = scratch.join("prepared.png");
    image_prep::prepare_frame(&frame, &prepared, &job.distortion, config.crop_fraction)?;

    let solution = solver.solve(&prepared, job.scale_hint, scratch)?;
    let mut orientation = compute_orientation(&solution, job.utc, &job.site, config.crop_fraction);

    let camera = CameraModel::new(
        solution.centre.ra,
        solution.centre.dec,
        frame.width() as f64,
        frame.height() as f64,
        orientation.width_x_field,
        solution.pos_ang,
        job.distortion,
    );
    orientation.quality = quality::fit_quality(
        &frame,
        &camera,
        hipparcos,
        config.quality_star_count,
        config.aperture_radius,
        config.min_bright_pixels,
    );
    Ok(orientation)
}

/// Write an image orientation as observation metadata.
pub fn record_image_orientation<S: ObservationStore + ?Sized>(
    store: &mut S,
    observation: &str,
    orientation: &ImageOrientation,
) -> Result<(), PiGazingError> {
    let values = [
        orientation.centre.ra,
        orientation.centre.dec,
        orientation.pa,
        orientation.altitude,
        orientation.azimuth,
        orientation.tilt,
        orientation.width_x_field,
        orientation.width_y_field,
    ];
    for (key, value) in MetaKey::ORIENTATION.into_iter().zip(values) {
        store.set_observation_metadata(observation, key, value.into())?;
    }
    if let Some(q) = orientation.quality {
        store.set_observation_metadata(
            observation,
            MetaKey::ORIENTATION[8].clone(),
            q.mean_offset.into(),
        )?;
        store.set_observation_metadata(
            observation,
            MetaKey::ORIENTATION[9].clone(),
            (q.count as f64).into(),
        )?;
    }
    Ok(())
}

/// Delete per-image orientation metadata of the still images in a window.
///
/// Return
/// ----------
/// * The number of images that lost at least one key.
pub fn flush_image_orientations<S: ObservationStore + ?Sized>(
    store: &mut S,
    query: &ObservationQuery,
) -> Result<usize, PiGazingError> {
    let mut flushed = 0;
    for observation in store.search_observations(query)? {
        let mut removed = false;
        for key in &MetaKey::ORIENTATION {
            removed |= store.delete_observation_metadata(&observation.id, key)?;
        }
        if removed {
            flushed += 1;
        }
    }
    Ok(flushed)
}

/// Options of `orientation_calculate`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationRun {
    pub utc_min: UnixTime,
    pub utc_max: UnixTime,
    pub observatory: Option<ObservatoryId>,
    pub flush: bool,
    pub deadline: Deadline,
}

/// Fit the orientation of every pending still image in the window.
///
/// Arguments
/// -----------------
/// * `store`: source of images, receives the fits.
/// * `solver`: plate solver shared by the workers.
/// * `hipparcos`, `lenses`: reference catalogues.
/// * `config`: thresholds and worker count.
/// * `scratch_root`: directory holding per-process scratch space.
/// * `run`: window, observatory, flush and deadline.
///
/// Return
/// ----------
/// * Outcome counters. Per-image failures are counted, storage failures abort.
pub fn orientation_calculate<S: ObservationStore + ?Sized>(
    store: &mut S,
    solver: &dyn PlateSolver,
    hipparcos: &HipparcosCatalogue,
    lenses: &LensCatalogue,
    config: &OrientationConfig,
    scratch_root: &Utf8Path,
    run: &OrientationRun,
) -> Result<OutcomeCounters, PiGazingError> {
    let mut counters = OutcomeCounters::new("orientation_calculate");
    let scratch = ScratchDir::create(scratch_root)?;
    let query = ObservationQuery::window(run.utc_min, run.utc_max)
        .kind(ObservationKind::StillImage)
        .observatory(run.observatory.as_deref());

    if run.flush {
        let n = flush_image_orientations(store, &query)?;
        store.commit()?;
        info!("flushed orientation of {n} image(s)");
    }

    let mut jobs = Vec::new();
    for observation in store.search_observations(&query)? {
        let clear = observation
            .meta_f64(&MetaKey::SKY_CLARITY)
            .is_some_and(|c| c >= config.sky_clarity_threshold);
        if !clear {
            counters.increment("cloudy");
            continue;
        }
        if ImageState::of(&observation) != ImageState::Pending {
            counters.increment("already_solved");
            continue;
        }
        match image_job(store, &observation, lenses, config) {
            Ok(job) => jobs.push(job),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => counters.item_failed(&observation.id, observation.utc, &e),
        }
    }
    info!("{} image(s) to solve", jobs.len());

    let workers = config.workers.unwrap_or_else(worker_pool::default_workers);
    let mut progress = BatchProgress::new(jobs.len(), "orientation");

    let outcome = worker_pool::run_pool(
        jobs,
        workers,
        &run.deadline,
        |mut job: ImageJob| {
            let result = job.state.transition(ImageState::Processing).and_then(|()| {
                let dir = scratch.job_dir(&job.observation)?;
                let result = process_image(&job, solver, hipparcos, config, &dir);
                scratch.release_job_dir(&dir);
                result
            });
            (job, result)
        },
        |(mut job, result)| {
            progress.tick();
            match result {
                Ok(orientation) => {
                    job.state.transition(ImageState::Solved)?;
                    record_image_orientation(store, &job.observation, &orientation)?;
                    store.commit()?;
                    if orientation.quality.is_some() {
                        job.state.transition(ImageState::QualityScored)?;
                    }
                    debug!(
                        "{} [{}] alt={:.2} az={:.2} tilt={:.2} {}",
                        job.observation,
                        iso(job.utc),
                        orientation.altitude,
                        orientation.azimuth,
                        orientation.tilt,
                        job.state
                    );
                    counters.increment("solved");
                    Ok(())
                }
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    if job.state == ImageState::Processing {
                        job.state.transition(ImageState::Failed)?;
                    }
                    counters.item_failed(&job.observation, job.utc, &e);
                    Ok(())
                }
            }
        },
    );
    progress.finish();
    scratch.close()?;

    let outcome = outcome?;
    if outcome.deadline_reached {
        counters.add("not_started", outcome.not_started);
    }
    counters.log_summary();
    Ok(counters)
}

/// Solver timeout from its configuration in seconds.
pub fn solver_timeout(config: &OrientationConfig) -> Duration {
    Duration::from_secs_f64(config.solver_timeout.max(0.0))
}
