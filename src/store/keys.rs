//! Metadata keys and values.
//!
//! Metadata are key → value pairs attached to observatories (with an effective
//! time) or to observations. Keys the pipeline produces or consumes are enum
//! variants, so a typo is a compile error rather than a silently missing
//! record. Anything else round-trips through an `Other` variant. Every key has a
//! stable string name used by the archive format.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl MetaValue {
    /// Numeric value; numeric text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(v) => Some(*v),
            MetaValue::Text(t) => t.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(t) => Some(t),
            MetaValue::Number(_) => None,
        }
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Number(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Number(v) => write!(f, "{v}"),
            MetaValue::Text(t) => write!(f, "{t}"),
        }
    }
}

macro_rules! named_keys {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)*
            /// Key not known to the pipeline, kept verbatim
            Other(String),
        }

        impl $name {
            /// Stable string name of the key.
            pub fn name(&self) -> &str {
                match self {
                    $($name::$variant => $text,)*
                    $name::Other(text) => text,
                }
            }
        }

        impl From<&str> for $name {
            fn from(text: &str) -> Self {
                match text {
                    $($text => $name::$variant,)*
                    other => $name::Other(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(text: String) -> Self {
                $name::from(text.as_str())
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> String {
                key.name().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_keys! {
    /// Observatory status keys.
    StatusKey {
        Latitude => "latitude",
        Longitude => "longitude",
        Altitude => "altitude",
        Lens => "camera_lens",
        ImageWidth => "camera_width",
        ImageHeight => "camera_height",
        LensBarrelK1 => "calibration:lens_barrel_k1",
        LensBarrelK2 => "calibration:lens_barrel_k2",
        LensBarrelK3 => "calibration:lens_barrel_k3",
        OrientationAltitude => "orientation:altitude",
        OrientationAzimuth => "orientation:azimuth",
        OrientationPa => "orientation:pa",
        OrientationTilt => "orientation:tilt",
        OrientationWidthXField => "orientation:width_x_field",
        OrientationWidthYField => "orientation:width_y_field",
        OrientationUncertainty => "orientation:uncertainty",
        OrientationImageCount => "orientation:image_count",
    }
}

named_keys! {
    /// Observation metadata keys outside the identification family.
    BaseMetaKey {
        SkyClarity => "pigazing:skyClarity",
        Duration => "pigazing:duration",
        Path => "pigazing:path",
        PathBezier => "pigazing:pathBezier",
        OrientationRa => "orientation:ra",
        OrientationDec => "orientation:dec",
        OrientationPa => "orientation:pa",
        OrientationAltitude => "orientation:altitude",
        OrientationAzimuth => "orientation:azimuth",
        OrientationTilt => "orientation:tilt",
        OrientationWidthXField => "orientation:width_x_field",
        OrientationWidthYField => "orientation:width_y_field",
        OrientationFitQuality => "orientation:fit_quality",
        OrientationFitQualityCount => "orientation:fit_quality_count",
    }
}

impl StatusKey {
    /// Keys written by the nightly orientation average.
    pub const ORIENTATION: [StatusKey; 8] = [
        StatusKey::OrientationAltitude,
        StatusKey::OrientationAzimuth,
        StatusKey::OrientationPa,
        StatusKey::OrientationTilt,
        StatusKey::OrientationWidthXField,
        StatusKey::OrientationWidthYField,
        StatusKey::OrientationUncertainty,
        StatusKey::OrientationImageCount,
    ];

    /// Keys written by the lens calibration.
    pub const LENS_BARREL: [StatusKey; 3] = [
        StatusKey::LensBarrelK1,
        StatusKey::LensBarrelK2,
        StatusKey::LensBarrelK3,
    ];
}

/// Kind of catalogued track an observation can be identified with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Plane,
    Satellite,
}

impl TrackKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            TrackKind::Plane => "plane",
            TrackKind::Satellite => "satellite",
        }
    }
}

/// Fields stored for an identified observation.
///
/// `Designation` is the call-sign of an aircraft or the name of a satellite;
/// `Ident` is the ADS-B hex ident or the NORAD catalogue number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentificationField {
    Designation,
    Ident,
    ClockOffset,
    AngularOffset,
    Distance,
    MeanAltitude,
    PathStart,
    PathEnd,
    Operator,
    Model,
    Manufacturer,
}

impl IdentificationField {
    pub const ALL: [IdentificationField; 11] = [
        IdentificationField::Designation,
        IdentificationField::Ident,
        IdentificationField::ClockOffset,
        IdentificationField::AngularOffset,
        IdentificationField::Distance,
        IdentificationField::MeanAltitude,
        IdentificationField::PathStart,
        IdentificationField::PathEnd,
        IdentificationField::Operator,
        IdentificationField::Model,
        IdentificationField::Manufacturer,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            IdentificationField::Designation => "designation",
            IdentificationField::Ident => "ident",
            IdentificationField::ClockOffset => "clock_offset",
            IdentificationField::AngularOffset => "angular_offset",
            IdentificationField::Distance => "distance",
            IdentificationField::MeanAltitude => "mean_altitude",
            IdentificationField::PathStart => "path_start",
            IdentificationField::PathEnd => "path_end",
            IdentificationField::Operator => "operator",
            IdentificationField::Model => "model",
            IdentificationField::Manufacturer => "manufacturer",
        }
    }
}

/// Observation metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetaKey {
    Base(BaseMetaKey),
    Identification(TrackKind, IdentificationField),
}

impl MetaKey {
    pub const SKY_CLARITY: MetaKey = MetaKey::Base(BaseMetaKey::SkyClarity);
    pub const DURATION: MetaKey = MetaKey::Base(BaseMetaKey::Duration);
    pub const PATH: MetaKey = MetaKey::Base(BaseMetaKey::Path);
    pub const PATH_BEZIER: MetaKey = MetaKey::Base(BaseMetaKey::PathBezier);

    /// Keys written by the per-image orientation fit.
    pub const ORIENTATION: [MetaKey; 10] = [
        MetaKey::Base(BaseMetaKey::OrientationRa),
        MetaKey::Base(BaseMetaKey::OrientationDec),
        MetaKey::Base(BaseMetaKey::OrientationPa),
        MetaKey::Base(BaseMetaKey::OrientationAltitude),
        MetaKey::Base(BaseMetaKey::OrientationAzimuth),
        MetaKey::Base(BaseMetaKey::OrientationTilt),
        MetaKey::Base(BaseMetaKey::OrientationWidthXField),
        MetaKey::Base(BaseMetaKey::OrientationWidthYField),
        MetaKey::Base(BaseMetaKey::OrientationFitQuality),
        MetaKey::Base(BaseMetaKey::OrientationFitQualityCount),
    ];

    /// Stable string name of the key.
    pub fn name(&self) -> String {
        match self {
            MetaKey::Base(key) => key.name().to_string(),
            MetaKey::Identification(kind, field) => {
                format!("{}:{}", kind.prefix(), field.suffix())
            }
        }
    }

    /// Every identification key of one track kind.
    pub fn identification_keys(kind: TrackKind) -> impl Iterator<Item = MetaKey> {
        IdentificationField::ALL
            .into_iter()
            .map(move |field| MetaKey::Identification(kind, field))
    }
}

impl From<BaseMetaKey> for MetaKey {
    fn from(key: BaseMetaKey) -> Self {
        MetaKey::Base(key)
    }
}

impl From<&str> for MetaKey {
    fn from(text: &str) -> Self {
        for kind in [TrackKind::Plane, TrackKind::Satellite] {
            if let Some(suffix) = text
                .strip_prefix(kind.prefix())
                .and_then(|rest| rest.strip_prefix(':'))
            {
                if let Some(field) = IdentificationField::ALL
                    .into_iter()
                    .find(|f| f.suffix() == suffix)
                {
                    return MetaKey::Identification(kind, field);
                }
            }
        }
        MetaKey::Base(BaseMetaKey::from(text))
    }
}

impl From<String> for MetaKey {
    fn from(text: String) -> Self {
        MetaKey::from(text.as_str())
    }
}

impl From<MetaKey> for String {
    fn from(key: MetaKey) -> String {
        key.name()
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
