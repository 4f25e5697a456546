//! Side Vehicle Tracking
//!
//! Keeps the closest radar-associated vehicle in each neighbouring lane,
//! filtered for jitter, with a track-quality score that tells callers
//! whether to trust it over the single-frame radar lead.

mod filter;
mod tracker;

pub use filter::LowPassFilter;
pub use tracker::{SideTrack, SideVehicleTracker, TrackerConfig};
