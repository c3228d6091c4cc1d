//! Reference catalogues read from disk: bright stars and lens hardware.
pub mod hipparcos;
pub mod lenses;

pub use hipparcos::{HipparcosCatalogue, HipparcosStar};
pub use lenses::{LensCatalogue, LensModel};
