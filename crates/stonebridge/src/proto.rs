//! Wire-independent message model for the host ↔ plugin channel
//!
//! Framing and serialization live in `broker::ipc`; everything here is
//! plain data. Both message unions are closed: adding an event or action
//! kind means adding a variant and handling it exhaustively.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol revision sent in the host hello-ack.
pub const API_VERSION: &str = "1";

/// Event-type tags, as they appear on the wire and in subscription sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PlayerJoin,
    PlayerQuit,
    PlayerJump,
    PlayerChangeWorld,
    PlayerDeath,
    WorldClose,
    Chat,
    Command,
    BlockBreak,
    BlockPlace,
    PlayerMove,
    PlayerTeleport,
    PlayerHurt,
    PlayerAttackEntity,
}

/// Messages sent from the host to a plugin process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    /// Handshake acknowledgement, sent after a plugin hello.
    Hello { api_version: String },
    /// The host is shutting this process down.
    Shutdown { reason: String },
    /// A dispatched event.
    Event(EventEnvelope),
}

/// Messages received from a plugin process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginMessage {
    Hello(PluginHello),
    /// Replaces the process's subscription set.
    Subscribe { events: Vec<EventType> },
    Result(EventResult),
    Actions(ActionBatch),
    Log { level: String, message: String },
}

/// Handshake metadata declared by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginHello {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub custom_items: Vec<CustomItemDefinition>,
    #[serde(default)]
    pub subscriptions: Vec<EventType>,
}

/// A command declared by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Creative-inventory category for a custom item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Construction,
    Nature,
    Equipment,
    Items,
}

impl Default for ItemCategory {
    fn default() -> Self {
        Self::Items
    }
}

/// A custom item declared in a plugin hello. Texture bytes are opaque to
/// the broker; the host decodes them at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomItemDefinition {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub texture: Vec<u8>,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub meta: i16,
}

/// A dispatched event instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// One payload variant per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    PlayerJoin {
        player: Uuid,
        name: String,
    },
    PlayerQuit {
        player: Uuid,
        name: String,
    },
    PlayerJump {
        player: Uuid,
        name: String,
    },
    PlayerChangeWorld {
        player: Uuid,
        name: String,
        before: String,
        after: String,
    },
    PlayerDeath {
        player: Uuid,
        name: String,
        source: String,
    },
    WorldClose {
        world: String,
    },
    Chat {
        player: Uuid,
        name: String,
        message: String,
    },
    Command {
        player: Uuid,
        name: String,
        /// Full command string like "/tp 100 64 200"
        raw: String,
        /// Just the command name like "tp"
        command: String,
        args: Vec<String>,
    },
    BlockBreak {
        player: Uuid,
        name: String,
        world: String,
        x: i32,
        y: i32,
        z: i32,
    },
    BlockPlace {
        player: Uuid,
        name: String,
        world: String,
        x: i32,
        y: i32,
        z: i32,
        block: String,
    },
    PlayerMove {
        player: Uuid,
        name: String,
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
    },
    PlayerTeleport {
        player: Uuid,
        name: String,
        x: f64,
        y: f64,
        z: f64,
    },
    PlayerHurt {
        player: Uuid,
        name: String,
        damage: f64,
        source: String,
    },
    PlayerAttackEntity {
        player: Uuid,
        name: String,
        target: String,
        force: f64,
        height: f64,
    },
}

impl EventPayload {
    /// The tag used for subscription routing.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PlayerJoin { .. } => EventType::PlayerJoin,
            Self::PlayerQuit { .. } => EventType::PlayerQuit,
            Self::PlayerJump { .. } => EventType::PlayerJump,
            Self::PlayerChangeWorld { .. } => EventType::PlayerChangeWorld,
            Self::PlayerDeath { .. } => EventType::PlayerDeath,
            Self::WorldClose { .. } => EventType::WorldClose,
            Self::Chat { .. } => EventType::Chat,
            Self::Command { .. } => EventType::Command,
            Self::BlockBreak { .. } => EventType::BlockBreak,
            Self::BlockPlace { .. } => EventType::BlockPlace,
            Self::PlayerMove { .. } => EventType::PlayerMove,
            Self::PlayerTeleport { .. } => EventType::PlayerTeleport,
            Self::PlayerHurt { .. } => EventType::PlayerHurt,
            Self::PlayerAttackEntity { .. } => EventType::PlayerAttackEntity,
        }
    }
}

/// A plugin's structured response to a dispatched event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub event_id: u64,
    #[serde(default)]
    pub cancel: bool,
    #[serde(default)]
    pub mutation: Option<EventMutation>,
}

impl EventResult {
    pub fn new(event_id: u64) -> Self {
        Self {
            event_id,
            cancel: false,
            mutation: None,
        }
    }

    pub fn cancelled(event_id: u64) -> Self {
        Self {
            event_id,
            cancel: true,
            mutation: None,
        }
    }
}

/// Mutations a plugin may propose for an in-flight event. Only chat text
/// and block-break drops/XP are folded back; other kinds are notify-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMutation {
    Chat {
        message: String,
    },
    BlockBreak {
        #[serde(default)]
        drops: Vec<ItemStack>,
        #[serde(default)]
        xp: Option<i32>,
    },
}

/// An item stack in a block-break drop list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    #[serde(default)]
    pub meta: i16,
    pub count: i32,
}

/// Game modes settable through a plugin action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// An unsolicited batch of host-state mutation requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBatch {
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Host-state mutations a plugin may request. Player targets are opaque
/// identifier strings; ones that do not resolve are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    SendChat {
        /// Empty target broadcasts to every player and the global chat.
        #[serde(default)]
        target: String,
        message: String,
    },
    Teleport {
        player: String,
        x: f64,
        y: f64,
        z: f64,
        #[serde(default)]
        yaw: f32,
        #[serde(default)]
        pitch: f32,
    },
    Kick {
        player: String,
        reason: String,
    },
    SetGameMode {
        player: String,
        game_mode: GameMode,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_wire_format() {
        let envelope = EventEnvelope {
            event_id: 7,
            payload: EventPayload::Chat {
                player: Uuid::nil(),
                name: "steve".to_string(),
                message: "hi".to_string(),
            },
        };
        let msg = HostMessage::Event(envelope.clone());

        let json = serde_json::to_value(&msg).expect("serialize event");
        assert_eq!(json["kind"], "event");
        assert_eq!(json["type"], "CHAT");
        assert_eq!(json["event_id"], 7);
        assert_eq!(json["message"], "hi");

        let parsed: HostMessage = serde_json::from_value(json).expect("deserialize event");
        assert_eq!(parsed, HostMessage::Event(envelope));
    }

    #[test]
    fn event_result_defaults_to_abstain() {
        let json = r#"{"kind":"result","event_id":3}"#;
        let parsed: PluginMessage = serde_json::from_str(json).expect("deserialize result");
        match parsed {
            PluginMessage::Result(res) => {
                assert_eq!(res.event_id, 3);
                assert!(!res.cancel);
                assert!(res.mutation.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn hello_backwards_compatible_without_optional_fields() {
        let json = r#"{"kind":"hello","name":"economy","version":"0.2.0"}"#;
        let parsed: PluginMessage = serde_json::from_str(json).expect("deserialize hello");
        match parsed {
            PluginMessage::Hello(hello) => {
                assert_eq!(hello.name, "economy");
                assert!(hello.commands.is_empty());
                assert!(hello.custom_items.is_empty());
                assert!(hello.subscriptions.is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn block_break_mutation_roundtrip() {
        let res = EventResult {
            event_id: 12,
            cancel: false,
            mutation: Some(EventMutation::BlockBreak {
                drops: vec![ItemStack {
                    name: "minecraft:diamond".to_string(),
                    meta: 0,
                    count: 3,
                }],
                xp: Some(7),
            }),
        };
        let json = serde_json::to_string(&PluginMessage::Result(res.clone())).expect("serialize");
        let parsed: PluginMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, PluginMessage::Result(res));
    }

    #[test]
    fn action_batch_with_unknown_target_parses() {
        let json = r#"{"kind":"actions","actions":[
            {"kind":"teleport","player":"not-a-uuid","x":1.0,"y":2.0,"z":3.0},
            {"kind":"send_chat","message":"hello all"}
        ]}"#;
        let parsed: PluginMessage = serde_json::from_str(json).expect("deserialize actions");
        match parsed {
            PluginMessage::Actions(batch) => {
                assert_eq!(batch.actions.len(), 2);
                assert!(matches!(
                    &batch.actions[1],
                    Action::SendChat { target, .. } if target.is_empty()
                ));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn event_type_tags_are_screaming_snake() {
        let json = serde_json::to_string(&EventType::BlockBreak).expect("serialize");
        assert_eq!(json, "\"BLOCK_BREAK\"");
        let parsed: EventType =
            serde_json::from_str("\"PLAYER_ATTACK_ENTITY\"").expect("deserialize");
        assert_eq!(parsed, EventType::PlayerAttackEntity);
    }
}
