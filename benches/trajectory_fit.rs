use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pigazing::coincidence::{group_detections, Detection};
use pigazing::config::{CoincidenceConfig, TriangulationConfig};
use pigazing::frames::GeodeticPosition;
use pigazing::geometry::earth::point_from_lat_lng;
use pigazing::geometry::{Line, Vector};
use pigazing::store::Category;
use pigazing::triangulation::{fit_trajectory, SightLine};

const STATIONS: [(&str, f64, f64); 3] = [("a", 51.6, -0.4), ("b", 51.6, 0.33), ("c", 52.05, -0.05)];

/// Sight lines towards a meteor from 80 km down to 70 km, directions jittered by up to `noise` radians.
fn meteor_sight_lines(rng: &mut StdRng, count: usize, noise: f64) -> Vec<SightLine> {
    let p1 = point_from_lat_lng(52.0, 0.0, 80_000.0, None);
    let p2 = point_from_lat_lng(52.1, 0.2, 70_000.0, None);
    (0..count)
        .map(|i| {
            let (name, lat, lng) = STATIONS[i % STATIONS.len()];
            let tau = i as f64 / (count - 1) as f64;
            let station = point_from_lat_lng(lat, lng, 0.0, None);
            let jitter = Vector::new(
                rng.random_range(-noise..=noise),
                rng.random_range(-noise..=noise),
                rng.random_range(-noise..=noise),
            );
            let direction = ((p1 + (p2 - p1) * tau) - station).normalize().unwrap_or_default() + jitter;
            SightLine {
                observation: format!("{name}_obs"),
                observatory: name.into(),
                utc: 1_600_000_000.0 + 2.0 * tau,
                site: GeodeticPosition::new(lat, lng, 0.0),
                line: Line::new(station, direction.normalize().unwrap_or_default()),
                alt: 0.0,
                az: 0.0,
            }
        })
        .collect()
}

fn bench_fit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let config = TriangulationConfig::default();

    c.bench_function("trajectory_fit/3_stations_30_lines", |b| {
        b.iter_batched(
            || meteor_sight_lines(&mut rng, 30, 1e-3),
            |lines| black_box(fit_trajectory(black_box(&lines), &config)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_grouping(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xDEADBEEF);
    let config = CoincidenceConfig::default();
    let samples = 5_000usize;

    c.bench_function("coincidence/group_detections_5000", |b| {
        b.iter_batched(
            || {
                // A night of detections from ten stations
                (0..samples)
                    .map(|i| {
                        let start = rng.random_range(0.0..43_200.0);
                        Detection {
                            id: format!("obs{i}"),
                            observatory: format!("station{}", rng.random_range(0..10)),
                            start,
                            end: start + rng.random_range(0.2..4.0),
                            category: Category::Meteor,
                        }
                    })
                    .collect::<Vec<_>>()
            },
            |detections| black_box(group_detections(black_box(&detections), &config)),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_fit, bench_grouping);
criterion_main!(benches);
