//! Nightly camera orientation from the per-image fits of one night.
//!
//! Fits with `fit_quality` above the configured limit are ignored, the others
//! are weighted by `1 / (fit_quality + offset)`. The pointing `(alt, az)` is
//! averaged on the sphere; the furthest fit is discarded and the mean
//! recomputed until the configured fraction of fits has been discarded. Tilt,
//! position angle and field widths are clipped the same way on the circle.
//!
//! The night is accepted only if the remaining pointings scatter by no more
//! than `max_nightly_spread`; otherwise the camera is considered unsettled
//! (it moved during the night) and nothing is written.
use log::{debug, info};

use crate::config::OrientationConfig;
use crate::constants::{wrap_360, Degree, ObservatoryId, UnixTime};
use crate::logging::OutcomeCounters;
use crate::pigazing_errors::PiGazingError;
use crate::sky::means::{mean_angle, mean_angle_2d, sphere_distance};
use crate::store::{
    MetaKey, Observation, ObservationKind, ObservationQuery, ObservationStore,
    ObservatoryMetadata, StatusKey,
};
use crate::time::{iso, nights_in, now, Deadline};

/// Author recorded on nightly orientation metadata.
pub const DAILY_AVERAGE_AUTHOR: &str = "pigazing:orientation_daily_average";

/// Orientation fitted to one still image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerImageFit {
    pub utc: UnixTime,
    pub altitude: Degree,
    pub azimuth: Degree,
    pub tilt: Degree,
    pub pa: Degree,
    pub width_x_field: Degree,
    pub width_y_field: Degree,
    pub fit_quality: f64,
}

impl PerImageFit {
    /// Read the fit back from observation metadata.
    pub fn from_observation(observation: &Observation) -> Option<PerImageFit> {
        let get = |i: usize| observation.meta_f64(&MetaKey::ORIENTATION[i]);
        Some(PerImageFit {
            utc: observation.utc,
            pa: get(2)?,
            altitude: get(3)?,
            azimuth: get(4)?,
            tilt: get(5)?,
            width_x_field: get(6)?,
            width_y_field: get(7)?,
            fit_quality: get(8)?,
        })
    }
}

/// Averaged orientation of one night.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NightlyOrientation {
    pub altitude: Degree,
    pub azimuth: Degree,
    pub tilt: Degree,
    pub pa: Degree,
    pub width_x_field: Degree,
    pub width_y_field: Degree,
    /// Spread of the retained pointings
    pub spread: Degree,
    /// Fits retained after clipping
    pub image_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NightlyOutcome {
    Accepted(NightlyOrientation),
    Unsettled { spread: Degree, image_count: usize },
    NoFits,
}

fn rejection_count(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).floor() as usize).min(n.saturating_sub(1))
}

/// Spherical mean of `(lat, lng)` degrees, discarding the furthest point until
/// `fraction` of the inputs are gone.
///
/// Return
/// ----------
/// * `((lat, lng), spread, kept)`: mean and RMS spread in degrees, and the
///   indices of the retained points.
pub fn clipped_mean_2d(
    points: &[(Degree, Degree)],
    weights: &[f64],
    fraction: f64,
) -> Option<((Degree, Degree), Degree, Vec<usize>)> {
    let radians: Vec<_> = points
        .iter()
        .map(|(lat, lng)| (lat.to_radians(), lng.to_radians()))
        .collect();
    let mut kept: Vec<usize> = (0..points.len()).collect();
    let mean_of = |kept: &[usize]| {
        let p: Vec<_> = kept.iter().map(|&i| radians[i]).collect();
        let w: Vec<_> = kept.iter().map(|&i| weights[i]).collect();
        mean_angle_2d(&p, Some(&w))
    };

    for _ in 0..rejection_count(points.len(), fraction) {
        let (centre, _) = mean_of(&kept)?;
        let worst = kept
            .iter()
            .enumerate()
            .max_by(|a, b| {
                sphere_distance(radians[*a.1], centre)
                    .total_cmp(&sphere_distance(radians[*b.1], centre))
            })
            .map(|(pos, _)| pos)?;
        kept.remove(worst);
    }
    let ((lat, lng), spread) = mean_of(&kept)?;
    Some((
        (lat.to_degrees(), wrap_360(lng.to_degrees())),
        spread.to_degrees(),
        kept,
    ))
}

/// Circular mean of degrees with the same clipping rule as [`clipped_mean_2d`].
pub fn clipped_mean_angle(
    angles: &[Degree],
    weights: &[f64],
    fraction: f64,
) -> Option<(Degree, Degree)> {
    let radians: Vec<f64> = angles.iter().map(|a| a.to_radians()).collect();
    let mut kept: Vec<usize> = (0..angles.len()).collect();
    let mean_of = |kept: &[usize]| {
        let a: Vec<_> = kept.iter().map(|&i| radians[i]).collect();
        let w: Vec<_> = kept.iter().map(|&i| weights[i]).collect();
        mean_angle(&a, Some(&w))
    };
    let offset = |a: f64, m: f64| (a - m).sin().atan2((a - m).cos()).abs();

    for _ in 0..rejection_count(angles.len(), fraction) {
        let (mean, _) = mean_of(&kept)?;
        let worst = kept
            .iter()
            .enumerate()
            .max_by(|a, b| offset(radians[*a.1], mean).total_cmp(&offset(radians[*b.1], mean)))
            .map(|(pos, _)| pos)?;
        kept.remove(worst);
    }
    let (mean, spread) = mean_of(&kept)?;
    Some((mean.to_degrees(), spread.to_degrees()))
}

/// Average the per-image fits of one night.
pub fn average_night(fits: &[PerImageFit], config: &OrientationConfig) -> NightlyOutcome {
    let usable: Vec<&PerImageFit> = fits
        .iter()
        .filter(|f| f.fit_quality <= config.max_fit_quality)
        .collect();
    if usable.is_empty() {
        return NightlyOutcome::NoFits;
    }
    let weights: Vec<f64> = usable
        .iter()
        .map(|f| 1.0 / (f.fit_quality + config.quality_weight_offset))
        .collect();
    let fraction = config.rejection_fraction;

    let pointing: Vec<_> = usable.iter().map(|f| (f.altitude, f.azimuth)).collect();
    let Some(((altitude, azimuth), spread, kept)) = clipped_mean_2d(&pointing, &weights, fraction)
    else {
        return NightlyOutcome::NoFits;
    };
    if spread > config.max_nightly_spread {
        return NightlyOutcome::Unsettled {
            spread,
            image_count: kept.len(),
        };
    }

    let circular = |field: fn(&PerImageFit) -> Degree| {
        let values: Vec<_> = usable.iter().map(|f| field(f)).collect();
        clipped_mean_angle(&values, &weights, fraction).map(|(mean, _)| mean)
    };
    let (Some(tilt), Some(pa), Some(width_x_field), Some(width_y_field)) = (
        circular(|f| f.tilt),
        circular(|f| f.pa),
        circular(|f| f.width_x_field),
        circular(|f| f.width_y_field),
    ) else {
        return NightlyOutcome::NoFits;
    };

    NightlyOutcome::Accepted(NightlyOrientation {
        altitude,
        azimuth,
        tilt,
        pa: wrap_360(pa),
        width_x_field,
        width_y_field,
        spread,
        image_count: kept.len(),
    })
}

/// Record a nightly orientation as observatory metadata effective at `noon`.
pub fn record_night<S: ObservationStore + ?Sized>(
    store: &mut S,
    observatory: &str,
    noon: UnixTime,
    night: &NightlyOrientation,
) -> Result<(), PiGazingError> {
    let values = [
        night.altitude,
        night.azimuth,
        night.pa,
        night.tilt,
        night.width_x_field,
        night.width_y_field,
        night.spread,
        night.image_count as f64,
    ];
    let created = now();
    for (key, value) in StatusKey::ORIENTATION.into_iter().zip(values) {
        store.write_observatory_metadata(ObservatoryMetadata {
            observatory: observatory.to_string(),
            key,
            value: value.into(),
            time: noon,
            created,
            author: DAILY_AVERAGE_AUTHOR.into(),
        })?;
    }
    Ok(())
}

/// Options of `orientation_daily_average`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAverageRun {
    pub utc_min: UnixTime,
    pub utc_max: UnixTime,
    pub observatory: Option<ObservatoryId>,
    pub flush: bool,
    pub deadline: Deadline,
}

/// Average every night of every selected observatory in the window.
///
/// Nights are processed in time order and committed one at a time, so a
/// deadline leaves only the unfinished tail to redo.
pub fn orientation_daily_average<S: ObservationStore + ?Sized>(
    store: &mut S,
    config: &OrientationConfig,
    run: &DailyAverageRun,
) -> Result<OutcomeCounters, PiGazingError> {
    let mut counters = OutcomeCounters::new("orientation_daily_average");
    if run.flush {
        let n = store.delete_observatory_metadata(
            run.observatory.as_deref(),
            &StatusKey::ORIENTATION,
            run.utc_min,
            run.utc_max,
        )?;
        info!("flushed {n} nightly orientation record(s)");
        store.commit()?;
    }

    let observatories: Vec<ObservatoryId> = match &run.observatory {
        Some(id) => vec![store.observatory(id)?.id],
        None => store.observatories()?.into_iter().map(|o| o.id).collect(),
    };

    for (noon, next_noon) in nights_in(run.utc_min, run.utc_max) {
        if run.deadline.expired() {
            counters.increment("deadline");
            break;
        }
        for observatory in &observatories {
            let query = ObservationQuery::window(noon, next_noon)
                .kind(ObservationKind::StillImage)
                .observatory(Some(observatory.as_str()));
            let fits: Vec<PerImageFit> = store
                .search_observations(&query)?
                .iter()
                // Half-open night
                .filter(|o| o.utc < next_noon)
                .filter_map(PerImageFit::from_observation)
                .collect();
            match average_night(&fits, config) {
                NightlyOutcome::Accepted(night) => {
                    record_night(store, observatory, noon, &night)?;
                    store.commit()?;
                    info!(
                        "{observatory} [{}] alt={:.3} az={:.3} tilt={:.3} spread={:.4} from {} image(s)",
                        iso(noon),
                        night.altitude,
                        night.azimuth,
                        night.tilt,
                        night.spread,
                        night.image_count
                    );
                    counters.increment("accepted");
                }
                NightlyOutcome::Unsettled {
                    spread,
                    image_count,
                } => {
                    info!(
                        "{observatory} [{}] unsettled: spread {spread:.4}° over {image_count} image(s)",
                        iso(noon)
                    );
                    counters.increment("unsettled");
                }
                NightlyOutcome::NoFits => {
                    debug!("{observatory} [{}] no usable fits", iso(noon));
                    counters.increment("no_fits");
                }
            }
        }
    }
    counters.log_summary();
    Ok(counters)
}

#[cfg(test)]
mod daily_average_test {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::{Category, MemoryStore, Observatory};

    fn fit(altitude: Degree, azimuth: Degree) -> PerImageFit {
        PerImageFit {
            utc: 0.0,
            altitude,
            azimuth,
            tilt: 2.0,
            pa: 359.0,
            width_x_field: 60.0,
            width_y_field: 40.0,
            fit_quality: 0.9,
        }
    }

    #[test]
    fn test_outlier_rejected() {
        let fits = [fit(45.0, 180.0), fit(45.0, 180.0), fit(45.0, 180.0), fit(60.0, 180.0)];
        let pointing: Vec<_> = fits.iter().map(|f| (f.altitude, f.azimuth)).collect();
        let ((alt, az), spread, kept) = clipped_mean_2d(&pointing, &[1.0; 4], 0.25).unwrap();
        assert!((alt - 45.0).abs() < 1e-9);
        assert!((az - 180.0).abs() < 1e-9);
        assert!(spread < 0.1);
        assert_eq!(kept, vec![0, 1, 2]);

        match average_night(&fits, &OrientationConfig::default()) {
            NightlyOutcome::Accepted(night) => {
                assert_eq!(night.image_count, 3);
                assert!((night.pa - 359.0).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_clipped_mean_angle_wraps() {
        let (mean, _) = clipped_mean_angle(&[179.0, -179.0, 0.0], &[1.0; 3], 0.34).unwrap();
        assert!((mean.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_unsettled_and_poor_quality() {
        let scattered = [fit(40.0, 180.0), fit(45.0, 180.0), fit(50.0, 180.0), fit(55.0, 180.0)];
        assert!(matches!(
            average_night(&scattered, &OrientationConfig::default()),
            NightlyOutcome::Unsettled { image_count: 3, .. }
        ));
        let mut poor = fit(45.0, 180.0);
        poor.fit_quality = 3.0;
        assert_eq!(
            average_night(&[poor], &OrientationConfig::default()),
            NightlyOutcome::NoFits
        );
    }

    fn still(id: &str, utc: UnixTime, f: &PerImageFit) -> Observation {
        let mut metadata = BTreeMap::new();
        let values = [
            10.0,
            20.0,
            f.pa,
            f.altitude,
            f.azimuth,
            f.tilt,
            f.width_x_field,
            f.width_y_field,
            f.fit_quality,
            12.0,
        ];
        for (key, value) in MetaKey::ORIENTATION.into_iter().zip(values) {
            metadata.insert(key, value.into());
        }
        Observation {
            id: id.into(),
            observatory: "a".into(),
            utc,
            kind: ObservationKind::StillImage,
            category: Category::Unknown,
            metadata,
        }
    }

    #[test]
    fn test_entry_point_writes_and_flushes() {
        let mut store = MemoryStore::new();
        store.add_observatory(Observatory {
            id: "a".into(),
            name: "A".into(),
            lat: 52.0,
            lng: 0.0,
            alt: 0.0,
            owner: "o".into(),
        });
        // Night starting at noon of 2021-01-01
        let noon = 1_609_502_400.0;
        for i in 0..4 {
            store.add_observation(still(&format!("s{i}"), noon + 36_000.0 + i as f64, &fit(30.0, 90.0)));
        }
        let run = DailyAverageRun {
            utc_min: noon + 1.0,
            utc_max: noon + 80_000.0,
            observatory: None,
            flush: false,
            deadline: Deadline::none(),
        };
        let config = OrientationConfig::default();
        let counters = orientation_daily_average(&mut store, &config, &run).unwrap();
        assert_eq!(counters.get("accepted"), 1);

        let orientation = store.observatory_status("a", noon + 40_000.0).unwrap().orientation().unwrap();
        assert!((orientation.altitude - 30.0).abs() < 1e-6);
        assert!((orientation.azimuth - 90.0).abs() < 1e-6);
        assert_eq!(orientation.epoch, noon);

        let flush = DailyAverageRun {
            utc_min: noon,
            utc_max: noon + 1.0,
            flush: true,
            deadline: Deadline::new(Some(0.0)),
            ..run
        };
        let counters = orientation_daily_average(&mut store, &config, &flush).unwrap();
        assert_eq!(counters.get("deadline"), 1);
        assert!(store.observatory_status("a", noon + 40_000.0).unwrap().orientation().is_err());
    }
}
