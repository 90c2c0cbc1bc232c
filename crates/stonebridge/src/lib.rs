//! Stonebridge - plugin-process broker for a voxel game server
//!
//! External plugin processes subscribe to a fixed catalogue of game
//! events. The broker converts host-side state changes into typed
//! envelopes, fans them out to subscribed processes, waits (with a
//! bounded timeout) for replies that may cancel or mutate the in-flight
//! operation, and folds the results back into the calling context.
//! Plugins can also register commands and submit asynchronous action
//! batches the host executes against its own state.

// Dispatch, correlation and process lifecycle
pub mod broker;

// Declarative plugin configuration
pub mod config;

// Seams to the surrounding game server
pub mod host;

// Wire-independent message model
pub mod proto;

// Errors and shared types
pub mod types;

pub use broker::{Manager, PluginEndpoint, PluginProcess};
pub use types::{Error, ProcessInfo, ProcessState, Result};
