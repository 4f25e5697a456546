//! Lane Change Verification
//!
//! Accepts a geometry-derived lane index only when blinker, steering,
//! lateral acceleration and timing evidence agree that a real lane change
//! happened. Also estimates the lane count and smooths raw lane indices
//! before they are offered for verification.

mod topology;
mod verifier;

pub use topology::LaneEstimator;
pub use verifier::{
    BlinkerPrediction, LaneChangeOutcome, LaneVerifier, VerificationEvent, VerificationResult,
};
