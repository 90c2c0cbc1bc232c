//! Event dispatcher and plugin registry
//!
//! The manager owns the process, player and command registries, builds
//! event envelopes, fans them out to subscribed processes and folds the
//! replies back into the calling context. Game-logic callbacks invoke
//! the `emit_*` operations; plugin I/O loops feed inbound messages
//! through [`Manager::handle_plugin_message`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::commands::CommandBinding;
use super::ipc;
use super::process::{PluginEndpoint, PluginProcess};
use crate::config;
use crate::host::{Host, PlayerHandle};
use crate::proto::{
    Action, ActionBatch, EventEnvelope, EventMutation, EventPayload, EventResult, EventType,
    HostMessage, ItemStack, PluginHello, PluginMessage, API_VERSION,
};
use crate::types::{ProcessInfo, ProcessState, Result};

/// How long a cancellable dispatch waits for each subscriber's reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Default)]
pub(super) struct Registry {
    pub(super) processes: HashMap<String, Arc<dyn PluginEndpoint>>,
    /// Registration order. Dispatch walks this list, so mutation
    /// chaining across subscribers is deterministic.
    pub(super) order: Vec<String>,
    pub(super) players: HashMap<Uuid, Arc<dyn PlayerHandle>>,
    pub(super) commands: HashMap<String, CommandBinding>,
}

/// Central broker: process lifecycle registry plus event dispatch.
pub struct Manager {
    pub(super) host: Arc<dyn Host>,
    reply_timeout: Duration,
    next_event_id: AtomicU64,
    pub(super) registry: RwLock<Registry>,
}

impl Manager {
    pub fn new(host: Arc<dyn Host>) -> Arc<Self> {
        Self::with_reply_timeout(host, DEFAULT_REPLY_TIMEOUT)
    }

    pub fn with_reply_timeout(host: Arc<dyn Host>, reply_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            host,
            reply_timeout,
            next_event_id: AtomicU64::new(0),
            registry: RwLock::new(Registry::default()),
        })
    }

    /// Start one plugin process per configured definition. A missing
    /// configuration file means no plugins, not an error.
    pub async fn start(self: &Arc<Self>, config_path: impl AsRef<Path>) -> Result<()> {
        let path = config_path.as_ref();
        let Some(cfg) = config::load(path)? else {
            info!("no plugin configuration found: {}", path.display());
            return Ok(());
        };

        for def in cfg.plugins {
            let id = def.effective_id();
            let (process, outbound) = PluginProcess::new(&id, &def.name);
            self.register_endpoint(process.clone());
            if let Err(e) = ipc::spawn(self.clone(), &def, process.clone(), outbound) {
                error!(plugin = %id, "failed to spawn plugin: {}", e);
                process.shutdown().await;
                self.remove_endpoint(&id);
            }
        }
        Ok(())
    }

    /// Broadcast a shutdown notice to every process, stop them all and
    /// clear the process registry.
    pub async fn close(&self) {
        let processes: Vec<Arc<dyn PluginEndpoint>> = {
            let mut reg = self.registry.write();
            reg.order.clear();
            reg.processes.drain().map(|(_, p)| p).collect()
        };

        for process in &processes {
            process.enqueue(HostMessage::Shutdown {
                reason: "server shutting down".to_string(),
            });
            process.mark_stopping();
        }
        futures::future::join_all(processes.iter().map(|p| p.shutdown())).await;
        info!("plugin manager closed ({} processes stopped)", processes.len());
    }

    /// Register a plugin endpoint. A re-registration under the same id
    /// replaces the old endpoint but keeps its dispatch position.
    pub fn register_endpoint(&self, endpoint: Arc<dyn PluginEndpoint>) {
        let id = endpoint.id().to_string();
        let mut reg = self.registry.write();
        if reg.processes.insert(id.clone(), endpoint).is_some() {
            warn!(plugin = %id, "replacing already-registered plugin process");
        } else {
            reg.order.push(id);
        }
    }

    pub(super) fn remove_endpoint(&self, id: &str) {
        let mut reg = self.registry.write();
        reg.processes.remove(id);
        reg.order.retain(|entry| entry != id);
    }

    /// Status snapshot of every registered process, in dispatch order.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        let reg = self.registry.read();
        reg.order
            .iter()
            .filter_map(|id| reg.processes.get(id))
            .map(|p| p.info())
            .collect()
    }

    /// Register a live player and announce the join to subscribers.
    pub async fn attach_player(&self, handle: Arc<dyn PlayerHandle>) {
        {
            let mut reg = self.registry.write();
            reg.players.insert(handle.uuid(), handle.clone());
        }
        self.emit_player_join(handle.as_ref()).await;
    }

    pub fn player(&self, uuid: Uuid) -> Option<Arc<dyn PlayerHandle>> {
        self.registry.read().players.get(&uuid).cloned()
    }

    fn next_event_id(&self) -> u64 {
        // Monotonic for the manager's lifetime; an id is never reused
        // while a waiter for it is pending.
        self.next_event_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn envelope(&self, payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            event_id: self.next_event_id(),
            payload,
        }
    }

    /// Subscribed, live processes for an event type, in registration
    /// order. The registry lock is released before any waiting happens.
    fn subscribers(&self, event_type: EventType) -> Vec<Arc<dyn PluginEndpoint>> {
        let reg = self.registry.read();
        reg.order
            .iter()
            .filter_map(|id| reg.processes.get(id))
            .filter(|p| p.state() != ProcessState::Terminated && p.has_subscription(event_type))
            .cloned()
            .collect()
    }

    /// Fan an envelope out to subscribers. With `expect_results` the
    /// dispatch is sequential: each subscriber gets up to the reply
    /// timeout before the next one is tried, a chat mutation rewrites
    /// the in-flight message for subscribers later in the order, and a
    /// non-reply counts as abstain.
    async fn dispatch(&self, mut envelope: EventEnvelope, expect_results: bool) -> Vec<EventResult> {
        let subscribers = self.subscribers(envelope.payload.event_type());
        let mut results = Vec::with_capacity(subscribers.len());

        for process in subscribers {
            if !expect_results {
                process.enqueue(HostMessage::Event(envelope.clone()));
                continue;
            }

            let waiter = match process.register_waiter(envelope.event_id) {
                Ok(rx) => rx,
                Err(e) => {
                    debug!(plugin = %process.id(), "skipping subscriber: {}", e);
                    continue;
                }
            };
            process.enqueue(HostMessage::Event(envelope.clone()));

            match tokio::time::timeout(self.reply_timeout, waiter).await {
                Ok(Ok(result)) => {
                    if let Some(EventMutation::Chat { message }) = &result.mutation {
                        if let EventPayload::Chat { message: live, .. } = &mut envelope.payload {
                            *live = message.clone();
                        }
                    }
                    results.push(result);
                }
                Ok(Err(_)) => {
                    // Sender dropped: the process closed mid-dispatch.
                    debug!(
                        plugin = %process.id(),
                        event_id = envelope.event_id,
                        "process closed while awaiting event result"
                    );
                }
                Err(_) => {
                    warn!(
                        plugin = %process.id(),
                        event_id = envelope.event_id,
                        event_type = ?envelope.payload.event_type(),
                        "plugin did not respond to event"
                    );
                    process.discard(envelope.event_id);
                }
            }
        }
        results
    }

    fn fold_cancel(results: &[EventResult]) -> bool {
        results.iter().any(|r| r.cancel)
    }

    // ─── Notify-only events ─────────────────────────────────────────────

    pub async fn emit_player_join(&self, player: &dyn PlayerHandle) {
        let envelope = self.envelope(EventPayload::PlayerJoin {
            player: player.uuid(),
            name: player.name().to_string(),
        });
        self.dispatch(envelope, false).await;
    }

    /// Announces the quit and removes the player from the registry.
    pub async fn emit_player_quit(&self, player: &dyn PlayerHandle) {
        let envelope = self.envelope(EventPayload::PlayerQuit {
            player: player.uuid(),
            name: player.name().to_string(),
        });
        self.dispatch(envelope, false).await;
        self.registry.write().players.remove(&player.uuid());
    }

    pub async fn emit_player_jump(&self, player: &dyn PlayerHandle) {
        let envelope = self.envelope(EventPayload::PlayerJump {
            player: player.uuid(),
            name: player.name().to_string(),
        });
        self.dispatch(envelope, false).await;
    }

    pub async fn emit_player_change_world(
        &self,
        player: &dyn PlayerHandle,
        before: &str,
        after: &str,
    ) {
        let envelope = self.envelope(EventPayload::PlayerChangeWorld {
            player: player.uuid(),
            name: player.name().to_string(),
            before: before.to_string(),
            after: after.to_string(),
        });
        self.dispatch(envelope, false).await;
    }

    pub async fn emit_player_death(&self, player: &dyn PlayerHandle, source: &str) {
        let envelope = self.envelope(EventPayload::PlayerDeath {
            player: player.uuid(),
            name: player.name().to_string(),
            source: source.to_string(),
        });
        self.dispatch(envelope, false).await;
    }

    pub async fn emit_world_close(&self, world: &str) {
        let envelope = self.envelope(EventPayload::WorldClose {
            world: world.to_string(),
        });
        self.dispatch(envelope, false).await;
    }

    // ─── Cancellable / mutable events ───────────────────────────────────

    /// Returns true if any subscriber cancelled. The last chat mutation
    /// in dispatch order overwrites `message`.
    pub async fn emit_chat(&self, player: &dyn PlayerHandle, message: &mut String) -> bool {
        let envelope = self.envelope(EventPayload::Chat {
            player: player.uuid(),
            name: player.name().to_string(),
            message: message.clone(),
        });
        let results = self.dispatch(envelope, true).await;
        for result in &results {
            if let Some(EventMutation::Chat { message: rewritten }) = &result.mutation {
                *message = rewritten.clone();
            }
        }
        Self::fold_cancel(&results)
    }

    /// Returns true if any subscriber cancelled the command.
    pub async fn emit_command(
        &self,
        player: &dyn PlayerHandle,
        command: &str,
        args: &[String],
    ) -> bool {
        let mut raw = format!("/{}", command);
        if !args.is_empty() {
            raw.push(' ');
            raw.push_str(&args.join(" "));
        }
        let envelope = self.envelope(EventPayload::Command {
            player: player.uuid(),
            name: player.name().to_string(),
            raw,
            command: command.to_string(),
            args: args.to_vec(),
        });
        let results = self.dispatch(envelope, true).await;
        Self::fold_cancel(&results)
    }

    /// Returns true if any subscriber cancelled. A drop-list or XP
    /// mutation replaces the caller's values outright; last writer in
    /// dispatch order wins.
    #[allow(clippy::too_many_arguments)]
    pub async fn emit_block_break(
        &self,
        player: &dyn PlayerHandle,
        world: &str,
        x: i32,
        y: i32,
        z: i32,
        drops: &mut Vec<ItemStack>,
        xp: &mut i32,
    ) -> bool {
        let envelope = self.envelope(EventPayload::BlockBreak {
            player: player.uuid(),
            name: player.name().to_string(),
            world: world.to_string(),
            x,
            y,
            z,
        });
        let results = self.dispatch(envelope, true).await;
        for result in &results {
            if let Some(EventMutation::BlockBreak {
                drops: new_drops,
                xp: new_xp,
            }) = &result.mutation
            {
                *drops = new_drops.clone();
                if let Some(new_xp) = new_xp {
                    *xp = *new_xp;
                }
            }
        }
        Self::fold_cancel(&results)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn emit_block_place(
        &self,
        player: &dyn PlayerHandle,
        world: &str,
        x: i32,
        y: i32,
        z: i32,
        block: &str,
    ) -> bool {
        let envelope = self.envelope(EventPayload::BlockPlace {
            player: player.uuid(),
            name: player.name().to_string(),
            world: world.to_string(),
            x,
            y,
            z,
            block: block.to_string(),
        });
        Self::fold_cancel(&self.dispatch(envelope, true).await)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn emit_player_move(
        &self,
        player: &dyn PlayerHandle,
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    ) -> bool {
        let envelope = self.envelope(EventPayload::PlayerMove {
            player: player.uuid(),
            name: player.name().to_string(),
            x,
            y,
            z,
            yaw,
            pitch,
        });
        Self::fold_cancel(&self.dispatch(envelope, true).await)
    }

    pub async fn emit_player_teleport(
        &self,
        player: &dyn PlayerHandle,
        x: f64,
        y: f64,
        z: f64,
    ) -> bool {
        let envelope = self.envelope(EventPayload::PlayerTeleport {
            player: player.uuid(),
            name: player.name().to_string(),
            x,
            y,
            z,
        });
        Self::fold_cancel(&self.dispatch(envelope, true).await)
    }

    pub async fn emit_player_hurt(
        &self,
        player: &dyn PlayerHandle,
        damage: f64,
        source: &str,
    ) -> bool {
        let envelope = self.envelope(EventPayload::PlayerHurt {
            player: player.uuid(),
            name: player.name().to_string(),
            damage,
            source: source.to_string(),
        });
        Self::fold_cancel(&self.dispatch(envelope, true).await)
    }

    pub async fn emit_player_attack_entity(
        &self,
        player: &dyn PlayerHandle,
        target: &str,
        force: f64,
        height: f64,
    ) -> bool {
        let envelope = self.envelope(EventPayload::PlayerAttackEntity {
            player: player.uuid(),
            name: player.name().to_string(),
            target: target.to_string(),
            force,
            height,
        });
        Self::fold_cancel(&self.dispatch(envelope, true).await)
    }

    // ─── Inbound from plugins ───────────────────────────────────────────

    /// Dispatch-by-kind for everything a plugin sends.
    pub async fn handle_plugin_message(
        self: &Arc<Self>,
        endpoint: &Arc<dyn PluginEndpoint>,
        msg: PluginMessage,
    ) {
        match msg {
            PluginMessage::Result(result) => endpoint.deliver(result),
            PluginMessage::Hello(hello) => self.handle_hello(endpoint, hello),
            PluginMessage::Subscribe { events } => {
                debug!(plugin = %endpoint.id(), subscriptions = events.len(), "subscription update");
                endpoint.update_subscriptions(events);
            }
            PluginMessage::Actions(batch) => self.apply_actions(endpoint.id(), batch),
            PluginMessage::Log { level, message } => {
                let plugin = endpoint.id();
                match level.to_lowercase().as_str() {
                    "warn" | "warning" => warn!(target: "plugin", %plugin, "{}", message),
                    "error" => error!(target: "plugin", %plugin, "{}", message),
                    "debug" | "trace" => debug!(target: "plugin", %plugin, "{}", message),
                    _ => info!(target: "plugin", %plugin, "{}", message),
                }
            }
        }
    }

    fn handle_hello(self: &Arc<Self>, endpoint: &Arc<dyn PluginEndpoint>, hello: PluginHello) {
        info!(
            plugin = %endpoint.id(),
            name = %hello.name,
            version = %hello.version,
            "plugin handshake"
        );
        if !hello.api_version.is_empty() && hello.api_version != API_VERSION {
            warn!(
                plugin = %endpoint.id(),
                theirs = %hello.api_version,
                ours = API_VERSION,
                "plugin declared a different api version"
            );
        }

        endpoint.set_hello(hello.clone());
        // Re-registration on a second hello goes through the same
        // overwrite policy as any other binding update.
        self.register_commands(endpoint.id(), &hello.commands);
        self.register_custom_items(endpoint, &hello.custom_items);
        endpoint.enqueue(HostMessage::Hello {
            api_version: API_VERSION.to_string(),
        });
    }

    fn register_custom_items(
        &self,
        endpoint: &Arc<dyn PluginEndpoint>,
        items: &[crate::proto::CustomItemDefinition],
    ) {
        for item in items {
            if item.id.is_empty() || item.display_name.is_empty() || item.texture.is_empty() {
                warn!(
                    plugin = %endpoint.id(),
                    item = %item.id,
                    "skipping custom item with missing id, display name or texture"
                );
                continue;
            }
            match self.host.register_custom_item(item) {
                Ok(()) => info!(
                    plugin = %endpoint.id(),
                    item = %item.id,
                    name = %item.display_name,
                    "registered custom item"
                ),
                Err(e) => warn!(
                    plugin = %endpoint.id(),
                    item = %item.id,
                    "failed to register custom item: {}", e
                ),
            }
        }
    }

    // ─── Action application ─────────────────────────────────────────────

    /// Execute an unsolicited action batch against host state. Targets
    /// that do not resolve to a live player are ignored.
    pub fn apply_actions(&self, plugin_id: &str, batch: ActionBatch) {
        for action in batch.actions {
            match action {
                Action::SendChat { target, message } => {
                    if target.is_empty() {
                        let players: Vec<_> =
                            self.registry.read().players.values().cloned().collect();
                        for player in players {
                            player.send_message(&message);
                        }
                        self.host.broadcast_chat(&message);
                    } else if let Some(player) = self.resolve_target(plugin_id, &target) {
                        player.send_message(&message);
                    }
                }
                Action::Teleport {
                    player,
                    x,
                    y,
                    z,
                    yaw,
                    pitch,
                } => {
                    if let Some(handle) = self.resolve_target(plugin_id, &player) {
                        handle.teleport(x, y, z, yaw, pitch);
                    }
                }
                Action::Kick { player, reason } => {
                    if let Some(handle) = self.resolve_target(plugin_id, &player) {
                        handle.kick(&reason);
                    }
                }
                Action::SetGameMode { player, game_mode } => {
                    if let Some(handle) = self.resolve_target(plugin_id, &player) {
                        handle.set_game_mode(game_mode);
                    }
                }
            }
        }
    }

    fn resolve_target(&self, plugin_id: &str, target: &str) -> Option<Arc<dyn PlayerHandle>> {
        let uuid = match Uuid::parse_str(target) {
            Ok(uuid) => uuid,
            Err(_) => {
                debug!(plugin = %plugin_id, %target, "ignoring action with invalid target");
                return None;
            }
        };
        let handle = self.registry.read().players.get(&uuid).cloned();
        if handle.is_none() {
            debug!(plugin = %plugin_id, %target, "ignoring action for unknown player");
        }
        handle
    }
}
