// THEORY:
// This file is the main entry point for the `sop_verify` library crate. It exposes
// the engine that checks an assembly procedure is performed in the prescribed
// spatial order by following the operator's hand across a set of zones.
//
// The layers, from the bottom up:
// 1.  `core_modules`: zones, the spatial gate, the SOP plan, the per-session state
//     and the `VerificationStateMachine` that ties them together.
// 2.  `pipeline`: the synchronous, frame-at-a-time API (`VerificationPipeline`).
// 3.  `service`: the same pipeline run as a single-writer tokio actor, fed by any
//     number of producers through a bounded queue.
//
// Capture, landmark detection and rendering are outside this crate. Producers speak
// `core_modules::source` types; presentation layers consume `StatusUpdate`s.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod service;

pub use config::StationConfig;
pub use error::{ConfigurationError, ObservationError, SessionError, VerifyError};
pub use pipeline::{Report, VerificationPipeline};
pub use service::{StatusUpdate, VerificationService, VerifierHandle};
