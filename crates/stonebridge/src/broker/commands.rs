//! Command bridge
//!
//! Maps plugin-declared command specs onto the host's command system.
//! Invoking a bridged command synthesizes a COMMAND event and re-enters
//! the dispatcher, exactly as if the command had been typed in chat.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use super::manager::Manager;
use crate::host::{CommandHandler, CommandSource};
use crate::proto::CommandSpec;

/// A plugin's claim on a command name or alias. Later registrations for
/// the same key overwrite earlier ones: plugins legitimately re-register
/// across reconnects.
#[derive(Debug, Clone)]
pub struct CommandBinding {
    pub plugin_id: String,
    pub command: String,
    pub descriptor: CommandSpec,
}

/// Strip a leading `/` and reject empty names.
fn normalize_name(raw: &str) -> Option<&str> {
    let name = raw.strip_prefix('/').unwrap_or(raw);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Invocation shim registered with the host's command system.
struct PluginCommand {
    manager: Weak<Manager>,
    name: String,
}

#[async_trait]
impl CommandHandler for PluginCommand {
    async fn run(
        &self,
        source: CommandSource,
        args: &[String],
    ) -> std::result::Result<String, String> {
        let CommandSource::Player { uuid, .. } = source else {
            return Err("command only available to players".to_string());
        };
        let Some(manager) = self.manager.upgrade() else {
            return Err("plugin system is not running".to_string());
        };
        let Some(player) = manager.player(uuid) else {
            return Err("command only available to players".to_string());
        };

        let cancelled = manager.emit_command(player.as_ref(), &self.name, args).await;
        if cancelled {
            Ok(String::new())
        } else {
            Ok("command forwarded to plugin".to_string())
        }
    }
}

impl Manager {
    /// Register plugin-declared commands with the binding table and the
    /// host. Malformed specs are logged and skipped; valid ones always
    /// overwrite any existing binding under the same key.
    pub(super) fn register_commands(self: &Arc<Self>, plugin_id: &str, specs: &[CommandSpec]) {
        for spec in specs {
            let Some(name) = normalize_name(&spec.name) else {
                warn!(plugin = %plugin_id, "skipping command with empty name");
                continue;
            };

            let mut aliases: Vec<String> = Vec::new();
            for raw in &spec.aliases {
                let Some(alias) = normalize_name(raw) else {
                    continue;
                };
                if alias == name || aliases.iter().any(|a| a == alias) {
                    continue;
                }
                aliases.push(alias.to_string());
            }

            let binding = CommandBinding {
                plugin_id: plugin_id.to_string(),
                command: name.to_string(),
                descriptor: spec.clone(),
            };
            {
                let mut reg = self.registry.write();
                reg.commands.insert(name.to_string(), binding.clone());
                for alias in &aliases {
                    reg.commands.insert(alias.clone(), binding.clone());
                }
            }

            let handler = Arc::new(PluginCommand {
                manager: Arc::downgrade(self),
                name: name.to_string(),
            });
            self.host
                .register_command(name, &spec.description, &aliases, handler);
            info!(plugin = %plugin_id, command = %name, "registered plugin command");
        }
    }

    /// Look up the binding for a command name or alias.
    pub fn command_binding(&self, name: &str) -> Option<CommandBinding> {
        self.registry.read().commands.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_prefix_and_rejects_empty() {
        assert_eq!(normalize_name("/warp"), Some("warp"));
        assert_eq!(normalize_name("warp"), Some("warp"));
        assert_eq!(normalize_name("/"), None);
        assert_eq!(normalize_name(""), None);
    }
}
