use thiserror::Error;

use crate::orientation::plate_solver::SolverFailure;

#[derive(Error, Debug)]
pub enum PiGazingError {
    #[error("Missing metadata '{key}' for {subject}")]
    MissingMetadata { subject: String, key: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Plate solver failure: {0}")]
    Solver(#[from] SolverFailure),

    #[error("Precondition unmet: {0}")]
    PreconditionUnmet(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown observatory: {0}")]
    UnknownObservatory(String),

    #[error("Unknown observation: {0}")]
    UnknownObservation(String),

    #[error("Unknown observation group: {0}")]
    UnknownGroup(String),

    #[error("Unknown lens: {0}")]
    UnknownLens(String),

    #[error("Invalid two-line element set: {0}")]
    Tle(String),

    #[error("Unable to perform file operation: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PiGazingError {
    /// Shorthand for [`PiGazingError::MissingMetadata`].
    pub fn missing(subject: impl Into<String>, key: impl Into<String>) -> Self {
        PiGazingError::MissingMetadata {
            subject: subject.into(),
            key: key.into(),
        }
    }

    /// Whether this error must abort the whole batch.
    ///
    /// Per-item failures (missing metadata, malformed paths, solver misses, unmet
    /// preconditions, unknown references) are counted and skipped. Storage, I/O and
    /// configuration failures are propagated to the entry point.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PiGazingError::Storage(_)
                | PiGazingError::Io(_)
                | PiGazingError::InvalidConfig(_)
                | PiGazingError::Csv(_)
        )
    }

    /// Short tag used for outcome counters and per-item log lines.
    pub fn counter_name(&self) -> &'static str {
        match self {
            PiGazingError::MissingMetadata { .. } => "missing_metadata",
            PiGazingError::MalformedInput(_) => "error",
            PiGazingError::Solver(failure) => failure.reason_code(),
            PiGazingError::PreconditionUnmet(_) => "precondition_unmet",
            PiGazingError::DeadlineExceeded => "deadline",
            PiGazingError::UnknownLens(_) => "unknown_lens",
            PiGazingError::UnknownObservatory(_)
            | PiGazingError::UnknownObservation(_)
            | PiGazingError::UnknownGroup(_) => "unknown_reference",
            PiGazingError::Image(_) => "unreadable_image",
            PiGazingError::Tle(_) => "invalid_tle",
            _ => "fatal",
        }
    }
}

impl PartialEq for PiGazingError {
    fn eq(&self, other: &Self) -> bool {
        use PiGazingError::*;
        match (self, other) {
            (
                MissingMetadata {
                    subject: s1,
                    key: k1,
                },
                MissingMetadata {
                    subject: s2,
                    key: k2,
                },
            ) => s1 == s2 && k1 == k2,
            (MalformedInput(a), MalformedInput(b)) => a == b,
            (Solver(a), Solver(b)) => a == b,
            (PreconditionUnmet(a), PreconditionUnmet(b)) => a == b,
            (Storage(a), Storage(b)) => a == b,
            (InvalidConfig(a), InvalidConfig(b)) => a == b,
            (UnknownObservatory(a), UnknownObservatory(b)) => a == b,
            (UnknownObservation(a), UnknownObservation(b)) => a == b,
            (UnknownGroup(a), UnknownGroup(b)) => a == b,
            (UnknownLens(a), UnknownLens(b)) => a == b,
            (Tle(a), Tle(b)) => a == b,

            // Wrapped foreign errors are not comparable: equal if same variant
            (Io(_), Io(_)) => true,
            (Json(_), Json(_)) => true,
            (Csv(_), Csv(_)) => true,
            (Xml(_), Xml(_)) => true,
            (Image(_), Image(_)) => true,

            (DeadlineExceeded, DeadlineExceeded) => true,

            _ => false,
        }
    }
}
