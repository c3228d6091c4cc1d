mod common;

use camino::Utf8PathBuf;
use common::{detection, T0};
use pigazing::coincidence::{search_simultaneous_detections, CoincidenceRun};
use pigazing::config::{CoincidenceConfig, PipelineConfig, TriangulationConfig};
use pigazing::pigazing_errors::PiGazingError;
use pigazing::store::{ArchiveStore, Category, ObservationStore, Observatory, SIMULTANEOUS_DETECTION};
use pigazing::time::Deadline;

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("pigazing.json")).unwrap();
    std::fs::write(
        &path,
        r#"{
            "coincidence": { "match_margin": 0.5 },
            "triangulation": { "max_residual": 2.0 },
            "paths": { "archive": "/data/archive.json" }
        }"#,
    )
    .unwrap();

    let config = PipelineConfig::from_json_file(&path).unwrap();
    assert_eq!(config.coincidence.match_margin, 0.5);
    assert_eq!(config.coincidence.min_baseline, CoincidenceConfig::default().min_baseline);
    assert_eq!(config.triangulation.max_residual, 2.0);
    assert_eq!(
        config.triangulation.min_sight_lines,
        TriangulationConfig::default().min_sight_lines
    );
    assert_eq!(config.identification.clock_offset_scale, 8.0);
    assert_eq!(config.paths.archive, "/data/archive.json");
}

#[test]
fn test_invalid_config_rejected() {
    for text in [
        r#"{ "orientation": { "crop_fraction": 0.0 } }"#,
        r#"{ "coincidence": { "min_observatories": 1 } }"#,
        r#"{ "identification": { "clock_offset_grid": 1 } }"#,
        r#"{ "triangulation": "#,
    ] {
        assert!(
            matches!(PipelineConfig::from_json_str(text), Err(PiGazingError::InvalidConfig(_))),
            "accepted {text}"
        );
    }
    let missing = Utf8PathBuf::from("/nonexistent/pigazing.json");
    assert!(matches!(
        PipelineConfig::from_json_file(&missing),
        Err(PiGazingError::InvalidConfig(_))
    ));
}

#[test]
fn test_groups_survive_reopening_the_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("archive.json")).unwrap();

    let mut store = ArchiveStore::open(&path).unwrap();
    for (id, lat) in [("a", 52.0), ("b", 52.4)] {
        store.inner_mut().add_observatory(Observatory {
            id: id.into(),
            name: id.to_uppercase(),
            lat,
            lng: 0.0,
            alt: 0.0,
            owner: "test".into(),
        });
    }
    store
        .inner_mut()
        .add_observation(detection("a1", "a", T0 + 10.0, 1.0, Category::Meteor));
    store
        .inner_mut()
        .add_observation(detection("b1", "b", T0 + 10.4, 1.0, Category::Meteor));
    let run = CoincidenceRun {
        utc_min: T0,
        utc_max: T0 + 100.0,
        observatory: None,
        flush: false,
        deadline: Deadline::none(),
    };
    search_simultaneous_detections(&mut store, &CoincidenceConfig::default(), &run).unwrap();

    let reopened = ArchiveStore::open(&path).unwrap();
    let groups = reopened.groups(SIMULTANEOUS_DETECTION, T0, T0 + 100.0).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members, vec!["a1".to_string(), "b1".to_string()]);
}
