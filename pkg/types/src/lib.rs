//! Shared data types for the vc-syncer workspace.

pub mod config;
pub mod duration;
pub mod election;
pub mod validate;
