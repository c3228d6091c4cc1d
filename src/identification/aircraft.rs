//! Aircraft tracks from ADS-B records.
//!
//! Records are read from a CSV file with the header
//! `hex_ident,call_sign,utc,lat,lng,altitude,speed,operator,model,manufacturer`,
//! altitude in meters and speed in meters per second. One track is built per
//! hex ident; the descriptive columns are taken from its first record that
//! carries them.
use std::collections::BTreeMap;
use std::io::Read;

use camino::Utf8Path;
use log::info;
use serde::Deserialize;

use crate::constants::UnixTime;
use crate::pigazing_errors::PiGazingError;
use crate::store::TrackKind;

use super::interpolate::{Track, TrackPoint};
use super::{CandidateTrack, TrackSource};

#[derive(Debug, Deserialize)]
struct AdsbRow {
    hex_ident: String,
    #[serde(default)]
    call_sign: Option<String>,
    utc: UnixTime,
    lat: f64,
    lng: f64,
    altitude: f64,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    manufacturer: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// ADS-B records grouped into one candidate per aircraft.
#[derive(Debug, Clone, Default)]
pub struct AdsbRecords {
    aircraft: Vec<CandidateTrack>,
}

impl AdsbRecords {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PiGazingError> {
        let mut by_ident: BTreeMap<String, (CandidateTrack, Vec<TrackPoint>)> = BTreeMap::new();
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        for row in reader.deserialize() {
            let row: AdsbRow = row?;
            let (candidate, points) = by_ident.entry(row.hex_ident.clone()).or_insert_with(|| {
                (
                    CandidateTrack {
                        kind: TrackKind::Plane,
                        designation: String::new(),
                        ident: row.hex_ident.clone(),
                        operator: None,
                        model: None,
                        manufacturer: None,
                        track: Track::default(),
                    },
                    Vec::new(),
                )
            });
            if candidate.designation.is_empty() {
                if let Some(call_sign) = non_empty(row.call_sign) {
                    candidate.designation = call_sign;
                }
            }
            candidate.operator = candidate.operator.take().or(non_empty(row.operator));
            candidate.model = candidate.model.take().or(non_empty(row.model));
            candidate.manufacturer = candidate.manufacturer.take().or(non_empty(row.manufacturer));
            points.push(TrackPoint {
                utc: row.utc,
                lat: row.lat,
                lng: row.lng,
                altitude: row.altitude,
                speed: row.speed.unwrap_or(0.0),
            });
        }

        let aircraft: Vec<CandidateTrack> = by_ident
            .into_values()
            .map(|(mut candidate, points)| {
                if candidate.designation.is_empty() {
                    candidate.designation = candidate.ident.clone();
                }
                candidate.track = Track::new(points);
                candidate
            })
            .collect();
        Ok(AdsbRecords { aircraft })
    }

    pub fn from_csv(path: &Utf8Path) -> Result<Self, PiGazingError> {
        let records = Self::from_reader(std::fs::File::open(path)?)?;
        info!("{path}: {} aircraft", records.len());
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}

impl TrackSource for AdsbRecords {
    fn kind(&self) -> TrackKind {
        TrackKind::Plane
    }

    fn candidates(&self, utc_min: UnixTime, utc_max: UnixTime) -> Result<Vec<CandidateTrack>, PiGazingError> {
        Ok(self
            .aircraft
            .iter()
            .filter(|a| a.track.overlaps(utc_min, utc_max))
            .cloned()
            .collect())
    }
}
