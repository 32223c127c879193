// THEORY:
// Errors fall into two classes. Configuration errors are fatal: a station with a
// broken registry or plan must never reach `start_session`. Observation errors are
// recoverable: landmark noise is expected, so a bad sample is dropped and the
// verification loop carries on. Session errors cover the lifecycle of the async
// service (a double start, or a service that has already shut down).

use thiserror::Error;

/// Top-level error type for the verification engine.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Observation error: {0}")]
    Observation(#[from] ObservationError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Raised while building the zone registry, the SOP plan or the station config.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Unknown zone `{0}`")]
    UnknownZone(String),
    #[error("Zone `{0}` is defined more than once")]
    DuplicateZone(String),
    #[error("Zone `{name}` is invalid: {reason}")]
    InvalidZone { name: String, reason: String },
    #[error("The zone registry is empty")]
    EmptyRegistry,
    #[error("Step index {index} is out of range for a plan of {len} steps")]
    StepIndexOutOfRange { index: usize, len: usize },
    #[error("Invalid frame geometry {width}x{height}: both sides must be non-zero")]
    InvalidFrame { width: u32, height: u32 },
    #[error("Invalid SOP plan: {0}")]
    InvalidPlan(String),
    #[error("Failed to load station configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Raised for a single malformed observation. The observation is discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObservationError {
    #[error("Observation at ({x}, {y}) has non-finite coordinates")]
    InvalidObservation { x: f64, y: f64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A verification session is already active.")]
    AlreadyActive,
    #[error("The verification service has shut down.")]
    ServiceClosed,
}
