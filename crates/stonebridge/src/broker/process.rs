//! Plugin process state
//!
//! `PluginEndpoint` is the seam between the dispatcher and a registered
//! plugin: the real subprocess-backed `PluginProcess` and in-test fakes
//! are interchangeable behind it.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::correlation::PendingResults;
use crate::proto::{EventResult, EventType, HostMessage, PluginHello};
use crate::types::{Error, ProcessInfo, ProcessState, Result};

/// The operations the dispatcher needs from a registered plugin.
#[async_trait]
pub trait PluginEndpoint: Send + Sync {
    fn id(&self) -> &str;

    /// Append a host → plugin message to the outbound queue. Never blocks
    /// the caller on I/O; silently dropped (with a log) once terminated.
    fn enqueue(&self, msg: HostMessage);

    /// Create a single-delivery waiter for an event id. Must be called
    /// before the envelope is enqueued.
    fn register_waiter(&self, event_id: u64) -> Result<oneshot::Receiver<EventResult>>;

    /// Route an inbound result to its waiter, if one is pending.
    fn deliver(&self, result: EventResult);

    /// Evict a pending waiter without delivering.
    fn discard(&self, event_id: u64);

    fn has_subscription(&self, event_type: EventType) -> bool;

    /// Replace the subscription set.
    fn update_subscriptions(&self, events: Vec<EventType>);

    /// Record handshake metadata; the process becomes active.
    fn set_hello(&self, hello: PluginHello);

    fn hello(&self) -> Option<PluginHello>;

    fn state(&self) -> ProcessState;

    fn info(&self) -> ProcessInfo;

    /// Record that a shutdown message has been enqueued.
    fn mark_stopping(&self);

    /// Terminate: release the outbound queue and fail every pending
    /// waiter. Idempotent.
    async fn shutdown(&self);
}

/// A registered external plugin process.
pub struct PluginProcess {
    id: String,
    /// Display name from the config, until a hello supplies one.
    config_name: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<HostMessage>>>,
    pending: PendingResults,
    subscriptions: RwLock<HashSet<EventType>>,
    hello: RwLock<Option<PluginHello>>,
    state: RwLock<ProcessState>,
    started_at: DateTime<Utc>,
}

impl PluginProcess {
    /// Create a process and the receiving half of its outbound queue.
    /// The caller owns the receiver and drains it from the I/O loop.
    pub fn new(
        id: impl Into<String>,
        config_name: impl Into<String>,
    ) -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let process = std::sync::Arc::new(Self {
            id: id.into(),
            config_name: config_name.into(),
            outbound: Mutex::new(Some(tx)),
            pending: PendingResults::new(),
            subscriptions: RwLock::new(HashSet::new()),
            hello: RwLock::new(None),
            state: RwLock::new(ProcessState::Created),
            started_at: Utc::now(),
        });
        (process, rx)
    }

    /// Mark the I/O loop as running (handshake still pending).
    pub fn mark_started(&self) {
        let mut state = self.state.write();
        if *state == ProcessState::Created {
            *state = ProcessState::Started;
        }
    }

    pub fn pending_results(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl PluginEndpoint for PluginProcess {
    fn id(&self) -> &str {
        &self.id
    }

    fn enqueue(&self, msg: HostMessage) {
        let guard = self.outbound.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!(plugin = %self.id, "outbound queue closed, message dropped");
                }
            }
            None => {
                debug!(plugin = %self.id, "process terminated, message dropped");
            }
        }
    }

    fn register_waiter(&self, event_id: u64) -> Result<oneshot::Receiver<EventResult>> {
        if *self.state.read() == ProcessState::Terminated {
            return Err(Error::ProcessClosed(self.id.clone()));
        }
        self.pending.register(event_id)
    }

    fn deliver(&self, result: EventResult) {
        let event_id = result.event_id;
        if !self.pending.deliver(result) {
            debug!(
                plugin = %self.id,
                event_id,
                "dropping late or unsolicited event result"
            );
        }
    }

    fn discard(&self, event_id: u64) {
        self.pending.discard(event_id);
    }

    fn has_subscription(&self, event_type: EventType) -> bool {
        self.subscriptions.read().contains(&event_type)
    }

    fn update_subscriptions(&self, events: Vec<EventType>) {
        let mut subs = self.subscriptions.write();
        subs.clear();
        subs.extend(events);
    }

    fn set_hello(&self, hello: PluginHello) {
        if !hello.subscriptions.is_empty() {
            self.update_subscriptions(hello.subscriptions.clone());
        }
        *self.hello.write() = Some(hello);
        let mut state = self.state.write();
        if matches!(*state, ProcessState::Created | ProcessState::Started) {
            *state = ProcessState::Active;
        }
    }

    fn hello(&self) -> Option<PluginHello> {
        self.hello.read().clone()
    }

    fn state(&self) -> ProcessState {
        *self.state.read()
    }

    fn mark_stopping(&self) {
        let mut state = self.state.write();
        if *state != ProcessState::Terminated {
            *state = ProcessState::Stopping;
        }
    }

    fn info(&self) -> ProcessInfo {
        let hello = self.hello.read();
        ProcessInfo {
            id: self.id.clone(),
            name: hello
                .as_ref()
                .map(|h| h.name.clone())
                .unwrap_or_else(|| self.config_name.clone()),
            version: hello.as_ref().map(|h| h.version.clone()),
            state: *self.state.read(),
            started_at: self.started_at,
        }
    }

    async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == ProcessState::Terminated {
                return;
            }
            *state = ProcessState::Terminated;
        }
        // Dropping the sender lets the I/O loop drain what was already
        // queued (the shutdown notice included) and then exit.
        self.outbound.lock().take();
        self.pending.fail_all();
        debug!(plugin = %self.id, "process terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::EventResult;

    #[tokio::test]
    async fn enqueue_after_shutdown_is_silently_dropped() {
        let (process, mut rx) = PluginProcess::new("p1", "Test");
        process.enqueue(HostMessage::Shutdown {
            reason: "bye".to_string(),
        });
        process.shutdown().await;
        process.enqueue(HostMessage::Hello {
            api_version: "1".to_string(),
        });

        // The message queued before shutdown is still drained.
        assert!(matches!(
            rx.recv().await,
            Some(HostMessage::Shutdown { .. })
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_fails_pending_waiters() {
        let (process, _rx) = PluginProcess::new("p1", "Test");
        let waiter = process.register_waiter(1).unwrap();
        process.shutdown().await;

        assert!(waiter.await.is_err());
        assert!(matches!(
            process.register_waiter(2),
            Err(Error::ProcessClosed(_))
        ));
        assert_eq!(process.state(), ProcessState::Terminated);
    }

    #[tokio::test]
    async fn hello_populates_metadata_and_subscriptions() {
        let (process, _rx) = PluginProcess::new("p1", "configured-name");
        assert_eq!(process.info().name, "configured-name");

        process.set_hello(PluginHello {
            name: "Economy".to_string(),
            version: "1.2.0".to_string(),
            api_version: "1".to_string(),
            commands: Vec::new(),
            custom_items: Vec::new(),
            subscriptions: vec![EventType::Chat],
        });

        assert_eq!(process.state(), ProcessState::Active);
        assert!(process.has_subscription(EventType::Chat));
        assert!(!process.has_subscription(EventType::BlockBreak));
        let info = process.info();
        assert_eq!(info.name, "Economy");
        assert_eq!(info.version.as_deref(), Some("1.2.0"));
    }

    #[tokio::test]
    async fn subscribe_update_replaces_the_set() {
        let (process, _rx) = PluginProcess::new("p1", "Test");
        process.update_subscriptions(vec![EventType::Chat, EventType::Command]);
        process.update_subscriptions(vec![EventType::BlockBreak]);

        assert!(!process.has_subscription(EventType::Chat));
        assert!(process.has_subscription(EventType::BlockBreak));
    }

    #[tokio::test]
    async fn late_result_after_discard_is_dropped() {
        let (process, _rx) = PluginProcess::new("p1", "Test");
        let waiter = process.register_waiter(7).unwrap();
        process.discard(7);
        process.deliver(EventResult::cancelled(7));
        assert!(waiter.await.is_err());
    }
}
