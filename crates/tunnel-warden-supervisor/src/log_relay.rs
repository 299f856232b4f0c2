//! Process output relay into the log file and the event bus.

use std::{path::Path, sync::Arc};

use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
    sync::Mutex,
    task::JoinHandle,
};
use tunnel_warden_core::{EventBus, LogRecord, LogStream, OutputStream, SessionId};

const CHUNK_SIZE: usize = 8 * 1024;

/// Append-only log file shared by both output relays.
#[derive(Clone)]
pub struct LogSink {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl LogSink {
    /// Open `path` for appending, creating parent directories.
    ///
    /// # Errors
    /// Returns error if the directory or file cannot be created.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Append raw bytes.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn append(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        guard.write_all(bytes).await?;
        guard.flush().await
    }

    /// Append a line followed by a newline.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.write_all(b"\n").await?;
        guard.flush().await
    }

    /// Flush buffered bytes to disk.
    ///
    /// # Errors
    /// Returns error if flush fails.
    pub async fn flush(&self) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        guard.flush().await?;
        guard.get_ref().sync_data().await
    }
}

/// Forward one output stream until EOF.
///
/// Every chunk is appended to the sink verbatim and published as a
/// [`LogRecord`] tagged with `session_id`. A sink failure is logged and the
/// relay keeps publishing.
pub fn spawn_relay(
    session_id: SessionId,
    stream: LogStream,
    mut reader: OutputStream,
    sink: LogSink,
    bus: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(%session_id, %stream, "Output stream read failed: {e}");
                    break;
                }
            };
            let chunk = &buf[..n];
            if let Err(e) = sink.append(chunk).await {
                tracing::error!(%session_id, %stream, "Failed to write VPN log: {e}");
            }
            bus.publish_log(LogRecord::from_bytes(session_id, stream, chunk));
        }
        tracing::debug!(%session_id, %stream, "Output relay finished");
    })
}
