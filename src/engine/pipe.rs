//! Exclusive access to the engine's stdin/stdout.
//!
//! One [`PipeClient`] lives for the whole process; the supervisor attaches a
//! fresh pair of streams for every engine generation and detaches them when
//! the generation ends. Every command runs under one async mutex, and for a
//! query the lock is held from the write until its reply line has been read,
//! so no other caller can write between the two.
//!
//! The exchange itself runs on its own task that owns the lock. A caller that
//! goes away mid-query (an HTTP client hanging up) leaves the task to read
//! the reply, so the next caller never sees it.
//!
//! A round trip that times out leaves an unread reply somewhere in the
//! stream. The client drops the streams instead of reusing them and
//! publishes the generation as wedged so the supervisor can replace it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinError;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use super::protocol::{Command, ReplyShape};
use crate::validate::{LoadRecord, RegionCode};

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("engine pipe is not attached")]
    NotAttached,
    #[error("engine generation {expected} was replaced by generation {current}")]
    StaleGeneration { expected: u64, current: u64 },
    #[error("failed to write to engine: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to read engine reply: {0}")]
    Read(#[source] std::io::Error),
    #[error("engine closed its output")]
    Closed,
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("engine exchange task failed: {0}")]
    Task(#[from] JoinError),
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type Replies = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// The streams of one engine generation.
struct Pipe {
    generation: u64,
    writer: Writer,
    replies: Replies,
}

impl Pipe {
    /// Write `line`, then read as many lines as `shape` says. Returns the last one.
    async fn round_trip(&mut self, line: &str, shape: ReplyShape) -> Result<Option<String>, IpcError> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(IpcError::Write)?;
        self.writer.flush().await.map_err(IpcError::Write)?;

        let mut reply = None;
        for _ in 0..shape.count() {
            match self.replies.next_line().await {
                Ok(Some(line)) => reply = Some(line),
                Ok(None) => return Err(IpcError::Closed),
                Err(e) => return Err(IpcError::Read(e)),
            }
        }
        Ok(reply)
    }
}

/// One command, owned so it can outlive the caller.
struct Exchange {
    generation: Option<u64>,
    line: String,
    shape: ReplyShape,
    kind: &'static str,
    deadline: Instant,
}

impl Exchange {
    async fn run(
        self,
        mut guard: OwnedMutexGuard<Option<Pipe>>,
        timeout: Duration,
        wedged: watch::Sender<u64>,
    ) -> Result<Option<String>, IpcError> {
        let pipe = guard.as_mut().ok_or(IpcError::NotAttached)?;
        if let Some(expected) = self.generation
            && pipe.generation != expected
        {
            return Err(IpcError::StaleGeneration {
                expected,
                current: pipe.generation,
            });
        }
        let current = pipe.generation;

        let outcome = timeout_at(self.deadline, pipe.round_trip(&self.line, self.shape)).await;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                // The engine is gone; its exit will be picked up by the supervisor.
                warn!(generation = current, command = self.kind, error = %e, "engine pipe failed");
                guard.take();
                Err(e)
            }
            Err(_) => {
                warn!(
                    generation = current,
                    command = self.kind,
                    timeout = ?timeout,
                    "engine round trip timed out, detaching pipe"
                );
                guard.take();
                wedged.send_replace(current);
                Err(IpcError::Timeout(timeout))
            }
        }
    }
}

pub struct PipeClient {
    inner: Arc<Mutex<Option<Pipe>>>,
    timeout: Duration,
    wedged: watch::Sender<u64>,
}

impl PipeClient {
    /// `timeout` bounds each command, including the wait for the lock.
    pub fn new(timeout: Duration) -> Self {
        let (wedged, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(None)),
            timeout,
            wedged,
        }
    }

    /// Install the streams of a new generation, replacing whatever was there.
    pub async fn attach<W, R>(&self, generation: u64, writer: W, reader: R)
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let pipe = Pipe {
            generation,
            writer: Box::new(writer),
            replies: BufReader::new(reader).lines(),
        };
        let previous = self.inner.lock().await.replace(pipe);
        if let Some(previous) = previous {
            debug!(
                old = previous.generation,
                new = generation,
                "replaced engine pipe"
            );
        }
    }

    /// Drop the streams if they still belong to `generation`.
    /// Returns whether anything was detached.
    pub async fn detach(&self, generation: u64) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(pipe) if pipe.generation == generation => {
                guard.take();
                true
            }
            _ => false,
        }
    }

    /// Generation whose streams are currently attached.
    pub async fn attached_generation(&self) -> Option<u64> {
        self.inner.lock().await.as_ref().map(|p| p.generation)
    }

    /// Receives the number of each generation that stopped answering.
    pub fn subscribe_wedged(&self) -> watch::Receiver<u64> {
        self.wedged.subscribe()
    }

    /// Send one `L` line to `generation`. No reply is read.
    pub async fn load(&self, generation: u64, record: &LoadRecord) -> Result<(), IpcError> {
        self.dispatch(Some(generation), Command::Load(record))
            .await
            .map(|_| ())
    }

    /// Send `Q <code>` to the current generation and return its reply line.
    pub async fn query(&self, code: &RegionCode) -> Result<String, IpcError> {
        self.dispatch(None, Command::Query(code))
            .await?
            .ok_or(IpcError::Closed)
    }

    /// Ask `generation` to exit cleanly.
    pub async fn shutdown(&self, generation: u64) -> Result<(), IpcError> {
        self.dispatch(Some(generation), Command::Shutdown)
            .await
            .map(|_| ())
    }

    async fn dispatch(
        &self,
        generation: Option<u64>,
        command: Command<'_>,
    ) -> Result<Option<String>, IpcError> {
        let deadline = Instant::now() + self.timeout;
        let guard = timeout_at(deadline, Arc::clone(&self.inner).lock_owned())
            .await
            .map_err(|_| IpcError::Timeout(self.timeout))?;

        let exchange = Exchange {
            generation,
            line: command.encode(),
            shape: command.reply_shape(),
            kind: command.kind(),
            deadline,
        };
        let task = tokio::spawn(exchange.run(guard, self.timeout, self.wedged.clone()));
        task.await?
    }
}
