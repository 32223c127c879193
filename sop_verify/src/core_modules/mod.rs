pub mod event;
pub mod session;
pub mod sop_plan;
pub mod source;
pub mod spatial_gate;
pub mod verifier;
pub mod zone;
