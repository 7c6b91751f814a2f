//! Data models and structures for the roam timing tester

pub mod attempt;
pub mod config;

// Re-export main model types
pub use attempt::{FailReason, RoamAttempt, TransitionPair, Verdict};
pub use config::Config;
