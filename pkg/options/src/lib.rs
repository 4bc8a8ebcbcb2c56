//! Syncer options and the assembly of everything the syncer needs at start.

pub mod error;
pub mod options;

pub use error::OptionsError;
pub use options::{ClientConnection, ComponentConfig, SyncerConfig, SyncerOptions};
