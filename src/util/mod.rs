//! Utility helpers.

pub mod timeout;

pub use timeout::TurnGuard;
