//! Numerical minimisers used by the calibration, triangulation and
//! identification fits.
//!
//! * [`NelderMead`] – multi-dimensional simplex search over closures.
//! * [`minimize_bounded`] – one-dimensional bounded search (grid scan + Brent).
pub mod bounded;
pub mod nelder_mead;

pub use bounded::minimize_bounded;
pub use nelder_mead::{Minimum, NelderMead};
