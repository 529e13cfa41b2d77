//! Client side of the aggregation worker process
//!
//! The worker speaks newline-delimited JSON: one `WorkerRequest` per line
//! on its stdin, one [`WorkerResponse`] per line on its stdout. Responses may
//! arrive in any order and are matched to their waiter by `requestId`.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hashbrown::HashMap;
use routegrid_types::{
    RequestPayload, RequestType, ResponseStatus, WorkerResponse, WorkerResult,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use super::AggregationStrategy;
use crate::error::{ErrorCategory, WorkerError};

type Reply = Result<WorkerResult, WorkerError>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Borrowed twin of `WorkerRequest` so payload rows are not cloned.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingRequest<'a> {
    #[serde(rename = "type")]
    kind: RequestType,
    payload: &'a RequestPayload,
    request_id: u64,
}

#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
}

/// Connection to a running aggregation worker.
pub struct WorkerClient {
    writer: Mutex<Writer>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
    timeout: Duration,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl WorkerClient {
    /// Spawn the worker binary at `path` and connect to its stdio.
    pub fn spawn(path: &Path, timeout: Duration) -> Result<Self, WorkerError> {
        let mut child = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn { path: path.to_path_buf(), source })?;

        let stdin = child.stdin.take().ok_or(WorkerError::Closed)?;
        let stdout = child.stdout.take().ok_or(WorkerError::Closed)?;

        tracing::info!(path = %path.display(), pid = ?child.id(), "Aggregation worker started");

        let mut client = Self::from_io(stdout, stdin, timeout);
        client.child = Some(child);
        Ok(client)
    }

    /// Connect to a worker over an arbitrary byte stream pair.
    pub fn from_io<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let reader = tokio::spawn(read_responses(reader, Arc::clone(&pending)));

        Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(0),
            timeout,
            reader,
            child: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.waiters.len()
    }

    /// Send one request and wait for its response or the timeout.
    pub async fn request(
        &self,
        kind: RequestType,
        payload: &RequestPayload,
    ) -> Result<WorkerResult, WorkerError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = OutgoingRequest { kind, payload, request_id };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(WorkerError::Closed);
            }
            pending.waiters.insert(request_id, tx);
        }

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.waiters.remove(&request_id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(WorkerError::Closed),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&request_id);
                Err(WorkerError::Timeout(self.timeout))
            }
        }
    }

    async fn write_line(&self, line: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line).await?;
        writer.flush().await
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(child) = &mut self.child {
            let _ = child.start_kill();
        }
    }
}

/// Route responses to their waiters until the stream ends, then fail every
/// request still outstanding.
async fn read_responses<R>(reader: R, pending: Arc<Mutex<PendingTable>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::warn!(category = %ErrorCategory::Worker, "Aggregation worker closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!(category = %ErrorCategory::Worker, error = %e, "Aggregation worker read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response: WorkerResponse = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(category = %ErrorCategory::Worker, error = %e, "Discarding malformed worker response");
                continue;
            }
        };

        let waiter = pending.lock().await.waiters.remove(&response.request_id);
        let Some(waiter) = waiter else {
            // Late reply for a request that already timed out
            tracing::debug!(request_id = response.request_id, "No waiter for worker response");
            continue;
        };

        let reply = match (response.status, response.result) {
            (ResponseStatus::Success, Some(result)) => Ok(result),
            (ResponseStatus::Success, None) => Err(WorkerError::UnexpectedResult),
            (ResponseStatus::Error, _) => Err(WorkerError::Remote(
                response.error.unwrap_or_else(|| "unknown worker error".to_string()),
            )),
        };
        let _ = waiter.send(reply);
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    for (_, waiter) in pending.waiters.drain() {
        let _ = waiter.send(Err(WorkerError::Closed));
    }
}

/// [`AggregationStrategy`] backed by a [`WorkerClient`].
pub struct WorkerStrategy {
    client: WorkerClient,
}

impl WorkerStrategy {
    pub fn new(client: WorkerClient) -> Self {
        Self { client }
    }

    pub fn spawn(path: &Path, timeout: Duration) -> Result<Self, WorkerError> {
        WorkerClient::spawn(path, timeout).map(Self::new)
    }

    pub fn client(&self) -> &WorkerClient {
        &self.client
    }
}

impl AggregationStrategy for WorkerStrategy {
    fn name(&self) -> &'static str {
        "worker"
    }

    async fn execute(
        &self,
        kind: RequestType,
        payload: &RequestPayload,
    ) -> Result<WorkerResult, WorkerError> {
        self.client.request(kind, payload).await
    }
}
