#![allow(dead_code)]

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use pigazing::catalogs::{LensCatalogue, LensModel};
use pigazing::constants::UnixTime;
use pigazing::frames::GeodeticPosition;
use pigazing::geometry::earth::{point_from_lat_lng, vector_to_ra_dec};
use pigazing::geometry::{Point, Vector};
use pigazing::projection::vertical_scale;
use pigazing::store::{
    Category, MemoryStore, MetaKey, MetaValue, Observation, ObservationKind, ObservationStore,
    Observatory, ObservatoryMetadata, StatusKey,
};
use pigazing::time::sidereal_time;
use pigazing::triangulation::StationCamera;

/// 2020-09-13 12:26:40 UTC
pub const T0: UnixTime = 1_600_000_000.0;

pub const IMAGE_WIDTH: f64 = 1280.0;
pub const IMAGE_HEIGHT: f64 = 960.0;
pub const FIELD_WIDTH: f64 = 60.0;

pub fn lenses() -> LensCatalogue {
    LensCatalogue::from_lenses([LensModel {
        name: "wide".into(),
        fov_deg: FIELD_WIDTH,
        barrel_k1: 0.0,
        barrel_k2: 0.0,
        barrel_k3: 0.0,
    }])
}

pub fn add_observatory(store: &mut MemoryStore, id: &str, lat: f64, lng: f64) {
    store.add_observatory(Observatory {
        id: id.into(),
        name: id.to_uppercase(),
        lat,
        lng,
        alt: 0.0,
        owner: "test".into(),
    });
}

pub fn set_status(store: &mut MemoryStore, observatory: &str, time: UnixTime, values: Vec<(StatusKey, MetaValue)>) {
    for (key, value) in values {
        store
            .write_observatory_metadata(ObservatoryMetadata {
                observatory: observatory.into(),
                key,
                value,
                time,
                created: time,
                author: "test".into(),
            })
            .unwrap();
    }
}

/// Altitude and azimuth of `target` seen from `site`, both in degrees.
pub fn look_angles(site: &GeodeticPosition, target: &Point) -> (f64, f64) {
    let (la, lo) = (site.lat.to_radians(), site.lng.to_radians());
    let up = Vector::new(la.cos() * lo.cos(), la.cos() * lo.sin(), la.sin());
    let north = Vector::new(-la.sin() * lo.cos(), -la.sin() * lo.sin(), la.cos());
    let east = Vector::new(-lo.sin(), lo.cos(), 0.0);
    let station = point_from_lat_lng(site.lat, site.lng, site.alt, None);
    let d = (*target - station).normalize().unwrap();
    let alt = d.dot(&up).asin().to_degrees();
    let az = d.dot(&east).atan2(d.dot(&north)).to_degrees().rem_euclid(360.0);
    (alt, az)
}

/// Give a station a wide-field camera aimed at `target`, image-up towards the zenith.
pub fn aim_camera(store: &mut MemoryStore, observatory: &str, target: &Point) {
    let site = store.observatory(observatory).unwrap().position();
    let (alt, az) = look_angles(&site, target);
    set_status(
        store,
        observatory,
        T0 - 86_400.0,
        vec![
            (StatusKey::Lens, "wide".into()),
            (StatusKey::ImageWidth, IMAGE_WIDTH.into()),
            (StatusKey::ImageHeight, IMAGE_HEIGHT.into()),
            (StatusKey::OrientationAltitude, alt.into()),
            (StatusKey::OrientationAzimuth, az.into()),
            (StatusKey::OrientationTilt, 0.0.into()),
            (StatusKey::OrientationWidthXField, FIELD_WIDTH.into()),
            (
                StatusKey::OrientationWidthYField,
                vertical_scale(FIELD_WIDTH, IMAGE_WIDTH, IMAGE_HEIGHT, 1.0).into(),
            ),
        ],
    );
}

/// Moving-object observation without a path.
pub fn detection(id: &str, observatory: &str, utc: UnixTime, duration: f64, category: Category) -> Observation {
    let mut metadata = BTreeMap::new();
    metadata.insert(MetaKey::DURATION, duration.into());
    Observation {
        id: id.into(),
        observatory: observatory.into(),
        utc,
        kind: ObservationKind::MovingObject,
        category,
        metadata,
    }
}

/// Record the path of an object moving from `from` to `to` over the observation, as the camera sees it.
pub fn record_path(store: &MemoryStore, observation: &mut Observation, from: Point, to: Point, samples: usize) {
    let camera = StationCamera::for_observation(store, observation, &lenses()).unwrap();
    let station = point_from_lat_lng(camera.site.lat, camera.site.lng, camera.site.alt, None);
    let duration = observation.duration();
    let path: Vec<[f64; 3]> = (0..samples)
        .map(|i| {
            let tau = i as f64 / (samples - 1) as f64;
            let utc = observation.utc + duration * tau;
            let target = from + (to - from) * tau;
            let (ra_fixed, dec) = vector_to_ra_dec(&(target - station));
            let ra = (ra_fixed + sidereal_time(utc)).rem_euclid(24.0);
            let pixel = camera.camera_model(utc).project(ra, dec).pixel().unwrap();
            [pixel.x, pixel.y, utc]
        })
        .collect();
    observation
        .metadata
        .insert(MetaKey::PATH, serde_json::to_string(&path).unwrap().into());
}

pub fn assert_position_close(actual: &GeodeticPosition, expected: &GeodeticPosition, meters: f64) {
    let a = point_from_lat_lng(actual.lat, actual.lng, actual.alt, None);
    let e = point_from_lat_lng(expected.lat, expected.lng, expected.alt, None);
    assert!(
        a.distance_to(&e) < meters,
        "{actual:?} is {:.0} m from {expected:?}",
        a.distance_to(&e)
    );
}

pub fn assert_angle_close(actual: f64, expected: f64, period: f64, epsilon: f64) {
    let diff = (actual - expected).rem_euclid(period);
    let diff = diff.min(period - diff);
    assert_relative_eq!(diff, 0.0, epsilon = epsilon);
}
