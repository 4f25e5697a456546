//! Return Strategy
//!
//! Decides when the car should move back to the lane it left for an
//! automatic overtake. The overtaken vehicle is tracked until it is
//! clearly behind, then efficiency, safety and stability are confirmed
//! over a hold window before a return is requested.

mod strategy;

pub use strategy::{ReturnBlock, ReturnDecision, ReturnPlan, ReturnStrategy, ReturnWait};
