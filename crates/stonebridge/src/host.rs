//! Host seams
//!
//! The broker never owns game state. Live entities, the global chat
//! stream and the command system belong to the surrounding server and
//! are reached through the traits below, so tests can plug in recorders.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::proto::{CustomItemDefinition, GameMode};

/// A live, host-owned player entity. Mutators run under the host's own
/// concurrency discipline; the broker only calls them with a handle it
/// resolved from its player registry.
pub trait PlayerHandle: Send + Sync {
    fn uuid(&self) -> Uuid;
    fn name(&self) -> &str;
    fn send_message(&self, message: &str);
    fn teleport(&self, x: f64, y: f64, z: f64, yaw: f32, pitch: f32);
    fn kick(&self, reason: &str);
    fn set_game_mode(&self, mode: GameMode);
}

/// Who invoked a bridged command.
#[derive(Debug, Clone)]
pub enum CommandSource {
    Player { uuid: Uuid, name: String },
    Console,
}

/// Invocation target the host's command system calls back into.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command. `Ok` carries user feedback, `Err` a user-visible
    /// error line.
    async fn run(
        &self,
        source: CommandSource,
        args: &[String],
    ) -> std::result::Result<String, String>;
}

/// Host-global capabilities the broker forwards into.
pub trait Host: Send + Sync {
    /// Write a line to the global chat stream.
    fn broadcast_chat(&self, message: &str);

    /// Register (or overwrite) a command with the host's command system.
    fn register_command(
        &self,
        name: &str,
        description: &str,
        aliases: &[String],
        handler: Arc<dyn CommandHandler>,
    );

    /// Register a custom item. Texture decoding happens host-side; a
    /// failure is reported back so the broker can log and skip the item.
    fn register_custom_item(&self, item: &CustomItemDefinition) -> anyhow::Result<()>;
}
