//! Lifecycle of a still image through orientation fitting.
//!
//! ```text
//! Pending ──▶ Processing ──▶ Solved ──┐
//!    ▲                  └──▶ Failed ──┴──▶ QualityScored
//!    └──────────── flush ───────────────────────┘
//! ```
//!
//! Solved and failed images both end up quality scored; a failure scores
//! nothing but is still terminal for the run. Flushing the orientation
//! metadata of a window returns its images to `Pending`.
use std::fmt;

use crate::pigazing_errors::PiGazingError;
use crate::store::{MetaKey, Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageState {
    Pending,
    Processing,
    Solved,
    Failed,
    QualityScored,
}

impl ImageState {
    /// Whether `self → next` is a legal step.
    pub fn can_become(self, next: ImageState) -> bool {
        use ImageState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Solved)
                | (Processing, Failed)
                | (Solved, QualityScored)
                | (Failed, QualityScored)
                | (Solved, Pending)
                | (Failed, Pending)
                | (QualityScored, Pending)
        )
    }

    /// Move to `next`, rejecting illegal steps.
    pub fn transition(&mut self, next: ImageState) -> Result<(), PiGazingError> {
        if !self.can_become(next) {
            return Err(PiGazingError::PreconditionUnmet(format!(
                "image cannot go from {self} to {next}"
            )));
        }
        *self = next;
        Ok(())
    }

    /// State of an image as recorded in the store.
    ///
    /// An image with a solved pointing counts as quality scored once its
    /// `fit_quality` is present, solved otherwise.
    pub fn of(observation: &Observation) -> ImageState {
        if !observation.has_orientation() {
            return ImageState::Pending;
        }
        let fit_quality = &MetaKey::ORIENTATION[8];
        if observation.meta(fit_quality).is_some() {
            ImageState::QualityScored
        } else {
            ImageState::Solved
        }
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageState::Pending => "pending",
            ImageState::Processing => "processing",
            ImageState::Solved => "solved",
            ImageState::Failed => "failed",
            ImageState::QualityScored => "quality_scored",
        };
        f.write_str(name)
    }
}
