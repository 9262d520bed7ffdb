//! Shared utilities
//!
//! Seeded random number generation for initialization and dropout, and numerical gradient
//! checking against the analytic backward passes.

pub mod gradcheck;
pub mod rng;
