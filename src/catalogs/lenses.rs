//! Lens hardware catalogue.
//!
//! XML document listing the lenses fitted to cameras of the network:
//!
//! ```xml
//! <lenses>
//!   <lens>
//!     <name>VF-DCD-AI-3.5-18-C-2MP</name>
//!     <fov_deg>60.0</fov_deg>
//!     <barrel_k1>0.0164</barrel_k1>
//!     <barrel_k2>0.0</barrel_k2>
//!     <barrel_k3>0.0</barrel_k3>
//!   </lens>
//! </lenses>
//! ```
//!
//! Missing barrel coefficients default to zero.
use std::fs;

use camino::Utf8Path;
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, FastHashMap};
use crate::pigazing_errors::PiGazingError;
use crate::projection::RadialDistortion;

/// Nominal properties of a lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensModel {
    pub name: String,
    /// Nominal horizontal field of view
    pub fov_deg: Degree,
    #[serde(default)]
    pub barrel_k1: f64,
    #[serde(default)]
    pub barrel_k2: f64,
    #[serde(default)]
    pub barrel_k3: f64,
}

impl LensModel {
    pub fn distortion(&self) -> RadialDistortion {
        RadialDistortion::new(self.barrel_k1, self.barrel_k2, self.barrel_k3)
    }

    /// Plate-solver scale bounds `(low, high)` in degrees, `±fraction` around the nominal field.
    pub fn scale_hint(&self, fraction: f64) -> (Degree, Degree) {
        (self.fov_deg * (1.0 - fraction), self.fov_deg * (1.0 + fraction))
    }
}

#[derive(Debug, Deserialize)]
struct LensDocument {
    #[serde(rename = "lens", default)]
    lenses: Vec<LensModel>,
}

/// Lenses by name.
#[derive(Debug, Clone, Default)]
pub struct LensCatalogue {
    lenses: FastHashMap<String, LensModel>,
}

impl LensCatalogue {
    pub fn from_xml_str(xml: &str) -> Result<Self, PiGazingError> {
        let document: LensDocument = from_str(xml)?;
        Ok(Self::from_lenses(document.lenses))
    }

    pub fn from_xml(path: &Utf8Path) -> Result<Self, PiGazingError> {
        Self::from_xml_str(&fs::read_to_string(path)?)
    }

    pub fn from_lenses(lenses: impl IntoIterator<Item = LensModel>) -> Self {
        LensCatalogue {
            lenses: lenses.into_iter().map(|l| (l.name.clone(), l)).collect(),
        }
    }

    /// Look up a lens, failing with [`PiGazingError::UnknownLens`].
    pub fn get(&self, name: &str) -> Result<&LensModel, PiGazingError> {
        self.lenses
            .get(name)
            .ok_or_else(|| PiGazingError::UnknownLens(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }
}
