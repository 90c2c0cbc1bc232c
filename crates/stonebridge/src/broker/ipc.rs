//! IPC transport for plugin subprocesses
//!
//! Length-prefixed JSON frames over the child's stdin/stdout. The frame
//! layout is a 4-byte big-endian payload length followed by the payload.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::manager::Manager;
use super::process::{PluginEndpoint, PluginProcess};
use crate::config::PluginDef;
use crate::proto::{HostMessage, PluginMessage};

/// Frames stop being read past this size; a plugin writing a larger one
/// is broken or hostile.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Writer half of a plugin channel.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one message as a length-prefixed JSON frame.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        let len = payload.len() as u32;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(&payload).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// Reader half of a plugin channel.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one frame. `Ok(None)` means the peer closed the channel.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            anyhow::bail!("empty frame");
        }
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds limit", len);
        }

        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).await?;
        Ok(Some(serde_json::from_slice(&payload)?))
    }
}

/// Spawn the plugin subprocess for `def` and wire it to `process`.
///
/// Two background tasks run per plugin: a writer draining the outbound
/// queue into the child's stdin, and a reader feeding inbound messages
/// to the manager. Either side failing terminates the process.
pub(crate) fn spawn(
    manager: Arc<Manager>,
    def: &PluginDef,
    process: Arc<PluginProcess>,
    mut outbound: mpsc::UnboundedReceiver<HostMessage>,
) -> crate::types::Result<()> {
    info!(plugin = %process.id(), command = %def.command, "spawning plugin process");

    let mut child = Command::new(&def.command)
        .args(&def.args)
        .envs(&def.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| crate::types::Error::Other("plugin stdin unavailable".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| crate::types::Error::Other("plugin stdout unavailable".to_string()))?;

    process.mark_started();

    // Writer: drains the outbound queue. Ends when the queue sender is
    // dropped (process terminated); dropping stdin then signals the
    // plugin to exit.
    let writer_id = process.id().to_string();
    tokio::spawn(async move {
        let mut writer = FrameWriter::new(stdin);
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = writer.send(&msg).await {
                warn!(plugin = %writer_id, "failed to write to plugin: {}", e);
                break;
            }
        }
        debug!(plugin = %writer_id, "outbound writer stopped");
    });

    // Reader: feeds inbound messages to the manager until EOF or error,
    // then terminates the process and reaps the child.
    let endpoint: Arc<dyn PluginEndpoint> = process.clone();
    tokio::spawn(async move {
        let mut reader = FrameReader::new(stdout);
        loop {
            match reader.recv::<PluginMessage>().await {
                Ok(Some(msg)) => manager.handle_plugin_message(&endpoint, msg).await,
                Ok(None) => {
                    info!(plugin = %endpoint.id(), "plugin closed its channel");
                    break;
                }
                Err(e) => {
                    error!(plugin = %endpoint.id(), "error reading from plugin: {}", e);
                    break;
                }
            }
        }
        endpoint.shutdown().await;

        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                info!(plugin = %endpoint.id(), "plugin exited with status: {}", status)
            }
            Ok(Err(e)) => error!(plugin = %endpoint.id(), "error waiting for plugin: {}", e),
            Err(_) => {
                warn!(plugin = %endpoint.id(), "plugin did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{EventEnvelope, EventPayload};
    use std::io::Cursor;
    use uuid::Uuid;

    #[tokio::test]
    async fn frame_roundtrip() {
        let msg = HostMessage::Event(EventEnvelope {
            event_id: 1,
            payload: EventPayload::PlayerJoin {
                player: Uuid::nil(),
                name: "alex".to_string(),
            },
        });

        let mut buf = Vec::new();
        FrameWriter::new(&mut buf).send(&msg).await.unwrap();

        let mut reader = FrameReader::new(Cursor::new(buf));
        let decoded: HostMessage = reader.recv().await.unwrap().expect("one frame");
        assert_eq!(decoded, msg);
        assert!(reader.recv::<HostMessage>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        // Length prefix promises 100 bytes, stream ends early.
        let mut buf = 100u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"short");
        let mut reader = FrameReader::new(Cursor::new(buf));
        assert!(reader.recv::<HostMessage>().await.is_err());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let buf = (MAX_FRAME_LEN as u32 + 1).to_be_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(buf));
        assert!(reader.recv::<HostMessage>().await.is_err());
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.recv::<PluginMessage>().await.unwrap().is_none());
    }
}
