pub mod calibration;
pub mod catalogs;
pub mod coincidence;
pub mod config;
pub mod constants;
mod conversion;
pub mod frames;
pub mod geometry;
pub mod identification;
pub mod logging;
pub mod optimize;
pub mod orientation;
pub mod pigazing_errors;
pub mod progress;
pub mod projection;
pub mod sky;
pub mod store;
pub mod time;
pub mod triangulation;
