mod common;

use approx::assert_relative_eq;
use common::assert_angle_close;
use pigazing::constants::SIDEREAL_DAY;
use pigazing::frames::{GeodeticPosition, Pixel};
use pigazing::geometry::earth::vector_from_ra_dec;
use pigazing::projection::{gnomonic_project, inv_gnom_project, CameraModel, RadialDistortion, Projected};
use pigazing::sky::means::mean_angle;
use pigazing::sky::{alt_az, ra_dec, sun_position};
use pigazing::store::CameraOrientation;
use pigazing::time::sidereal_time;
use pigazing::triangulation::StationCamera;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn wide_camera(ra0: f64, dec0: f64, pos_ang: f64) -> CameraModel {
    CameraModel::new(
        ra0,
        dec0,
        1280.0,
        960.0,
        45.0,
        pos_ang,
        RadialDistortion::new(0.02, -0.001, 0.0),
    )
}

#[test]
fn test_reference_pointing_round_trip() {
    let camera = wide_camera(5.5, 34.0, 10.0);
    let pixel = camera.project(5.7, 36.0).pixel().unwrap();
    assert!(camera.contains(&pixel));
    let (ra, dec) = camera.unproject(&pixel).unwrap();
    assert_relative_eq!(ra, 5.7, epsilon = 1e-9);
    assert_relative_eq!(dec, 36.0, epsilon = 1e-9);
}

#[test]
fn test_random_pixels_round_trip() {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    for _ in 0..500 {
        let camera = wide_camera(
            rng.random_range(0.0..24.0),
            rng.random_range(-80.0..80.0),
            rng.random_range(0.0..360.0),
        );
        let pixel = Pixel::new(rng.random_range(0.0..1280.0), rng.random_range(0.0..960.0));
        let (ra, dec) = camera.unproject(&pixel).unwrap();
        let back = camera.project(ra, dec).pixel().unwrap();
        assert!(back.distance_to(&pixel) < 1e-6, "{pixel:?} came back as {back:?}");
    }
}

/// Sky position `sep` degrees from `(ra0, dec0)` along `bearing` (from north through east).
fn offset(ra0: f64, dec0: f64, sep: f64, bearing: f64) -> (f64, f64) {
    let (dec0, sep, bearing) = (dec0.to_radians(), sep.to_radians(), bearing.to_radians());
    let dec = (dec0.sin() * sep.cos() + dec0.cos() * sep.sin() * bearing.cos()).asin();
    let d_ra = (bearing.sin() * sep.sin() * dec0.cos()).atan2(sep.cos() - dec0.sin() * dec.sin());
    ((ra0 + d_ra.to_degrees() / 15.0).rem_euclid(24.0), dec.to_degrees())
}

/// Angle between two sky positions, accurate at small separations.
fn separation(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (u, v) = (vector_from_ra_dec(a.0, a.1), vector_from_ra_dec(b.0, b.1));
    u.cross(&v).norm().atan2(u.dot(&v))
}

#[test]
fn test_sky_round_trip_within_80_degrees() {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let mut in_field = 0;
    for _ in 0..2_000 {
        let distortion = RadialDistortion::new(
            rng.random_range(-0.1..=0.1),
            rng.random_range(-0.1..=0.1),
            rng.random_range(-0.1..=0.1),
        );
        let (ra0, dec0) = (rng.random_range(0.0..24.0), rng.random_range(-80.0..80.0));
        let camera = CameraModel::new(ra0, dec0, 1920.0, 1080.0, 45.0, rng.random_range(0.0..360.0), distortion);
        let target = offset(ra0, dec0, rng.random_range(0.0..80.0), rng.random_range(0.0..360.0));

        let Projected::InField(pixel) = gnomonic_project(target.0, target.1, &camera) else {
            continue;
        };
        in_field += 1;
        let back = inv_gnom_project(&pixel, &camera)
            .unwrap_or_else(|| panic!("{target:?} through {distortion:?} did not invert"));
        let error = separation(back, target);
        assert!(error < 1e-8, "{target:?} through {distortion:?} came back {error} rad away");
    }
    assert!(in_field > 500, "only {in_field} targets in field");
}

#[test]
fn test_folded_lens_reports_out_of_field() {
    // Past r ≈ 4.6 the multiplier of this lens turns the image back on itself
    let camera = CameraModel::new(5.5, 34.0, 1920.0, 1080.0, 45.0, 10.0, RadialDistortion::new(0.02, -0.001, 0.0));
    let (ra, dec) = offset(5.5, 34.0, 70.0, 0.0);
    assert_eq!(camera.project(ra, dec), Projected::OutOfField);
    let (ra, dec) = offset(5.5, 34.0, 50.0, 0.0);
    assert!(camera.project(ra, dec).is_in_field());
}

#[test]
fn test_zero_distortion_is_identity() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let r = rng.random_range(0.0..2.0);
        assert_eq!(RadialDistortion::NONE.distort_radius(r), r);
        assert_relative_eq!(RadialDistortion::NONE.undistort_radius(r).unwrap(), r, epsilon = 1e-12);
    }
}

#[test]
fn test_sun_on_new_year() {
    let (ra, dec) = sun_position(1_609_459_200.0);
    assert!((ra - 18.75).abs() < 0.05, "sun ra {ra}");
    assert!((dec + 23.0).abs() < 0.1, "sun dec {dec}");
}

#[test]
fn test_sidereal_time_repeats_each_sidereal_day() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let utc = rng.random_range(946_684_800.0..1_893_456_000.0);
        // 0.01 s of sidereal time, in hours
        assert_angle_close(sidereal_time(utc + SIDEREAL_DAY), sidereal_time(utc), 24.0, 0.01 / 3600.0);
    }
}

#[test]
fn test_alt_az_inverts() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for _ in 0..200 {
        let (ra, dec) = (rng.random_range(0.0..24.0), rng.random_range(-80.0..80.0));
        let (lat, lng) = (rng.random_range(-60.0..60.0), rng.random_range(-180.0..180.0));
        let utc = rng.random_range(1_500_000_000.0..1_700_000_000.0);
        let (alt, az) = alt_az(ra, dec, utc, lat, lng);
        assert!((-90.0..=90.0).contains(&alt));
        assert!((0.0..=360.0).contains(&az));
        let (ra2, dec2) = ra_dec(alt, az, utc, lat, lng);
        assert_angle_close(ra2, ra, 24.0, 1e-9);
        assert_relative_eq!(dec2, dec, epsilon = 1e-9);
    }
}

#[test]
fn test_mean_angle_wraps() {
    let angles = [350.0_f64.to_radians(), 10.0_f64.to_radians()];
    let (mean, spread) = mean_angle(&angles, None).unwrap();
    assert_angle_close(mean.to_degrees(), 0.0, 360.0, 1e-9);
    assert_relative_eq!(spread.to_degrees(), 9.85, epsilon = 0.05);
}

#[test]
fn test_station_camera_centre_looks_along_orientation() {
    let camera = StationCamera {
        observatory: "a".into(),
        site: GeodeticPosition::new(52.2, 0.1, 30.0),
        size: (1280.0, 960.0),
        orientation: CameraOrientation {
            altitude: 35.0,
            azimuth: 250.0,
            pa: None,
            tilt: 0.0,
            width_x_field: 60.0,
            width_y_field: 46.8,
            uncertainty: None,
            epoch: 0.0,
        },
        distortion: RadialDistortion::new(0.01, 0.0, 0.0),
    };
    let line = camera.sight_line("obs", &Pixel::new(640.0, 480.0), 1_600_000_000.0).unwrap();
    assert_relative_eq!(line.alt, 35.0, epsilon = 1e-6);
    assert_angle_close(line.az, 250.0, 360.0, 1e-6);
}
