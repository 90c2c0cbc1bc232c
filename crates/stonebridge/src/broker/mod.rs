//! The broker core: dispatch, correlation and process lifecycle.

pub mod commands;
pub mod correlation;
pub mod ipc;
pub mod manager;
pub mod process;

pub use commands::CommandBinding;
pub use correlation::PendingResults;
pub use manager::{Manager, DEFAULT_REPLY_TIMEOUT};
pub use process::{PluginEndpoint, PluginProcess};
