//! Background I/O worker for asynchronous bundle and object loads
//!
//! Load futures run on a dedicated tokio runtime. Their results come back over
//! a channel and are handed to the owning thread either by polling
//! ([`IoWorker::try_next`]) or by blocking on one specific operation
//! ([`IoWorker::wait_for`]). Results that arrive while waiting for a different
//! operation are kept for the next poll.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::bundle::format::BundleHandle;
use crate::bundle::source::{LoadFuture, ObjectHandle};
use crate::core::Result;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Identifier of a submitted load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl OpId {
    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// What an operation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Bundle,
    Object,
}

/// Result of a load operation, `None` on failure
pub enum Payload {
    Bundle(Option<BundleHandle>),
    Object(Option<ObjectHandle>),
}

impl Payload {
    /// Failed result for an operation of `kind`
    pub fn failed(kind: OpKind) -> Self {
        match kind {
            OpKind::Bundle => Payload::Bundle(None),
            OpKind::Object => Payload::Object(None),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bundle(handle) => write!(
                f,
                "Bundle({})",
                handle.as_ref().map(|b| b.name()).unwrap_or("null")
            ),
            Payload::Object(handle) => {
                write!(f, "Object({})", if handle.is_some() { "some" } else { "null" })
            }
        }
    }
}

/// A finished operation
#[derive(Debug)]
pub struct Completion {
    pub op: OpId,
    pub payload: Payload,
}

struct WorkRequest {
    op: OpId,
    kind: OpKind,
    task: LoadFuture<Payload>,
}

/// Runs load futures off the owning thread
pub struct IoWorker {
    /// Channel for sending work to the runtime, `None` after shutdown
    request_tx: Option<mpsc::UnboundedSender<WorkRequest>>,
    /// Channel for receiving finished operations
    result_rx: mpsc::UnboundedReceiver<Completion>,
    /// Operations submitted and not yet handed back
    pending: HashMap<OpId, OpKind>,
    /// Completions received while waiting for another operation
    stashed: VecDeque<Completion>,
    next_op: u64,
    runtime: Option<Runtime>,
}

impl IoWorker {
    /// Create a worker with its own runtime of `threads` worker threads
    pub fn new(threads: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("bundle-io")
            .enable_all()
            .build()?;

        let (request_tx, request_rx) = mpsc::unbounded_channel::<WorkRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<Completion>();

        runtime.spawn(Self::worker_loop(request_rx, result_tx));

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            pending: HashMap::new(),
            stashed: VecDeque::new(),
            next_op: 0,
            runtime: Some(runtime),
        })
    }

    async fn worker_loop(
        mut request_rx: mpsc::UnboundedReceiver<WorkRequest>,
        result_tx: mpsc::UnboundedSender<Completion>,
    ) {
        let mut active = JoinSet::new();
        let mut ops = HashMap::new();

        loop {
            tokio::select! {
                Some(request) = request_rx.recv() => {
                    let handle = active.spawn(request.task);
                    ops.insert(handle.id(), (request.op, request.kind));
                }

                Some(joined) = active.join_next_with_id(), if !active.is_empty() => {
                    let (id, payload) = match joined {
                        Ok((id, payload)) => (id, Some(payload)),
                        Err(e) => {
                            log::error!("Load task failed: {}", e);
                            (e.id(), None)
                        }
                    };
                    if let Some((op, kind)) = ops.remove(&id) {
                        let payload = payload.unwrap_or_else(|| Payload::failed(kind));
                        let _ = result_tx.send(Completion { op, payload });
                    }
                }

                else => break,
            }
        }
    }

    /// Start an operation
    ///
    /// After shutdown the operation completes immediately as failed.
    pub fn submit(&mut self, kind: OpKind, task: LoadFuture<Payload>) -> OpId {
        let op = OpId(self.next_op);
        self.next_op += 1;
        self.pending.insert(op, kind);

        let sent = match &self.request_tx {
            Some(tx) => tx.send(WorkRequest { op, kind, task }).is_ok(),
            None => false,
        };
        if !sent {
            log::warn!("I/O worker stopped, {} fails immediately", op);
            self.stashed.push_back(Completion {
                op,
                payload: Payload::failed(kind),
            });
        }

        op
    }

    /// Next finished operation, if any (non-blocking)
    pub fn try_next(&mut self) -> Option<Completion> {
        let completion = match self.stashed.pop_front() {
            Some(completion) => completion,
            None => self.result_rx.try_recv().ok()?,
        };
        self.pending.remove(&completion.op);
        Some(completion)
    }

    /// Block until `op` finishes
    ///
    /// Returns `None` only when `op` is not pending. Must not be called from
    /// inside an async context.
    pub fn wait_for(&mut self, op: OpId) -> Option<Completion> {
        let kind = self.pending.get(&op).copied()?;

        if let Some(pos) = self.stashed.iter().position(|c| c.op == op) {
            self.pending.remove(&op);
            return self.stashed.remove(pos);
        }

        while let Some(completion) = self.result_rx.blocking_recv() {
            if completion.op == op {
                self.pending.remove(&op);
                return Some(completion);
            }
            self.stashed.push_back(completion);
        }

        log::error!("I/O worker channel closed while waiting for {}", op);
        self.pending.remove(&op);
        Some(Completion {
            op,
            payload: Payload::failed(kind),
        })
    }

    /// Whether `op` has been submitted and not handed back yet
    pub fn is_pending(&self, op: OpId) -> bool {
        self.pending.contains_key(&op)
    }

    /// Number of operations not handed back yet
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stop the runtime
    pub fn shutdown(&mut self) {
        self.request_tx = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            log::debug!("I/O worker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.request_tx = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
