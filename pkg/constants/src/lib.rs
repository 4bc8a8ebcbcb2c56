//! Centralized constants for the vc-syncer project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod client;
pub mod election;
pub mod features;
pub mod paths;
pub mod syncer;
