// src/exec/session.rs

//! Persistent interactive sessions.
//!
//! A persistent session is a long-lived backend (an interactive
//! interpreter, a shell) that serves many item executions without being
//! restarted; creating and tearing it down are the expensive operations
//! this layer amortizes.
//!
//! Three pieces:
//! - [`SessionBackend`]: the boundary towards the session facility
//!   (`create` / `submit` / `destroy`).
//! - [`StdioSessionBackend`]: the production implementation, driving a
//!   child process over stdin/stdout with a sentinel-marked probe line.
//! - [`SessionPool`]: reuse keyed by the configured [`SessionSharing`]
//!   scope, with per-session serialization and bounded create retries.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::model::SessionConfig;
use crate::engine::{FailureKind, ItemOutcome, ScheduledItem};
use crate::errors::{DagrunError, Result};
use crate::event::{Event, EventKind, EventSink};
use crate::exec::worker_pool::stop_signalled;
use crate::graph::{SessionSpec, SubgraphId};
use crate::types::SessionSharing;

/// Sentinel marking backend replies to probe requests. A character from the
/// Unicode private-use area; item commands are assumed never to produce
/// output lines starting with it.
pub const SESSION_SENTINEL: char = '\u{f056}';

const CREATE_ATTEMPTS: u32 = 3;
const CREATE_BACKOFF: Duration = Duration::from_millis(100);

/// Opaque handle to a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

/// Result of one submitted request.
#[derive(Debug, Clone)]
pub struct SessionReply {
    /// Output lines produced while serving the request.
    pub output: Vec<String>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Ok,
    /// The backend reported a non-success status payload.
    Error(String),
}

/// Boundary towards the session-management facility.
///
/// `submit` must not be called concurrently for the same handle; the
/// [`SessionPool`] serializes callers before they reach this trait.
pub trait SessionBackend: Send + Sync {
    fn create<'a>(
        &'a self,
        kind: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionHandle>> + Send + 'a>>;

    fn submit<'a>(
        &'a self,
        handle: SessionHandle,
        request: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionReply>> + Send + 'a>>;

    fn destroy(
        &self,
        handle: SessionHandle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Session kinds available to a run, from `[session.<kind>]` sections.
pub type SessionCatalog = BTreeMap<String, SessionConfig>;

struct StdioSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    probe: String,
}

/// Line-oriented subprocess sessions.
///
/// The backend process reads requests from stdin. After writing a request,
/// a probe line (from the kind's `probe` template) is written; the backend
/// answers it with a line starting with the sentinel. Text after the
/// sentinel is the status payload: empty or `"0"` means the request
/// succeeded.
pub struct StdioSessionBackend {
    catalog: SessionCatalog,
    grace: Duration,
    sessions: std::sync::Mutex<HashMap<SessionHandle, Arc<Mutex<StdioSession>>>>,
    next_id: AtomicU64,
}

impl StdioSessionBackend {
    pub fn new(catalog: SessionCatalog, grace: Duration) -> Self {
        Self {
            catalog,
            grace,
            sessions: std::sync::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn session(&self, handle: SessionHandle) -> Result<Arc<Mutex<StdioSession>>> {
        self.sessions
            .lock()
            .expect("session table lock")
            .get(&handle)
            .cloned()
            .ok_or_else(|| {
                DagrunError::BackendUnavailable(format!("no session for handle {}", handle.0))
            })
    }
}

impl SessionBackend for StdioSessionBackend {
    fn create<'a>(
        &'a self,
        kind: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionHandle>> + Send + 'a>> {
        Box::pin(async move {
            let config = self.catalog.get(kind).ok_or_else(|| {
                DagrunError::Launch(format!("unknown session kind '{kind}'"))
            })?;

            let program = config
                .command
                .first()
                .ok_or_else(|| DagrunError::Launch(format!("session kind '{kind}' has no command")))?;

            let mut cmd = Command::new(program);
            cmd.args(&config.command[1..])
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true);
            if let Some(dir) = &config.workdir {
                cmd.current_dir(dir);
            }

            let mut child = cmd.spawn().map_err(|err| {
                DagrunError::BackendUnavailable(format!("spawning session '{kind}': {err}"))
            })?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| DagrunError::BackendUnavailable("session has no stdin".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| DagrunError::BackendUnavailable("session has no stdout".into()))?;

            // Drain stderr so OS buffers never fill; log at debug.
            if let Some(stderr) = child.stderr.take() {
                let kind = kind.to_string();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(session = %kind, "stderr: {}", line);
                    }
                });
            }

            let handle = SessionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
            let session = StdioSession {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
                probe: config.probe.clone(),
            };

            self.sessions
                .lock()
                .expect("session table lock")
                .insert(handle, Arc::new(Mutex::new(session)));

            info!(session = %kind, handle = handle.0, "session started");
            Ok(handle)
        })
    }

    fn submit<'a>(
        &'a self,
        handle: SessionHandle,
        request: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SessionReply>> + Send + 'a>> {
        Box::pin(async move {
            let session = self.session(handle)?;
            let mut session = session.lock().await;

            let probe = session.probe.replace("{marker}", &SESSION_SENTINEL.to_string());
            let payload = format!("{}\n{}\n", request.trim_end(), probe);

            session
                .stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|err| {
                    DagrunError::BackendUnavailable(format!("writing to session: {err}"))
                })?;
            session.stdin.flush().await.map_err(|err| {
                DagrunError::BackendUnavailable(format!("flushing session stdin: {err}"))
            })?;

            let mut output = Vec::new();
            loop {
                match session.stdout.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(status) = line.strip_prefix(SESSION_SENTINEL) {
                            let status = status.trim();
                            let status = if status.is_empty() || status == "0" {
                                SessionStatus::Ok
                            } else {
                                SessionStatus::Error(status.to_string())
                            };
                            return Ok(SessionReply { output, status });
                        }
                        output.push(line);
                    }
                    Ok(None) => {
                        return Err(DagrunError::BackendUnavailable(
                            "session process exited while serving a request".to_string(),
                        ));
                    }
                    Err(err) => {
                        return Err(DagrunError::BackendUnavailable(format!(
                            "reading from session: {err}"
                        )));
                    }
                }
            }
        })
    }

    fn destroy(
        &self,
        handle: SessionHandle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let session = {
                self.sessions
                    .lock()
                    .expect("session table lock")
                    .remove(&handle)
            };
            let Some(session) = session else {
                // Already destroyed; stop is idempotent.
                return Ok(());
            };

            let mut session = session.lock().await;

            // Cooperative first: closing stdin lets most interpreters exit
            // on their own within the grace period.
            let _ = session.stdin.shutdown().await;
            if timeout(self.grace, session.child.wait()).await.is_err() {
                if let Err(err) = session.child.kill().await {
                    warn!(handle = handle.0, error = %err, "failed to kill session");
                }
            }

            debug!(handle = handle.0, "session destroyed");
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Branch {
        kind: String,
        subgraph: usize,
        branch: String,
    },
    Run {
        kind: String,
    },
}

/// A pooled session plus the mutex serializing submissions to it.
pub struct PooledSession {
    pub handle: SessionHandle,
    /// Held for the whole of one item's submissions; two items never talk
    /// to the same session at once.
    pub lock: Mutex<()>,
}

/// A leased session; ephemeral leases (per-item sharing) are destroyed on
/// release.
pub struct LeasedSession {
    pub session: Arc<PooledSession>,
    ephemeral: bool,
}

/// Session reuse keyed by the configured sharing scope.
pub struct SessionPool {
    backend: Arc<dyn SessionBackend>,
    sharing: SessionSharing,
    pooled: Mutex<HashMap<PoolKey, Arc<PooledSession>>>,
}

impl SessionPool {
    pub fn new(backend: Arc<dyn SessionBackend>, sharing: SessionSharing) -> Self {
        Self {
            backend,
            sharing,
            pooled: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    /// Lease a session for one item execution, creating it if the sharing
    /// scope has none yet. Creation failures are retried with backoff
    /// before escalating to a launch failure.
    pub async fn lease(
        &self,
        kind: &str,
        subgraph: SubgraphId,
        branch_label: &str,
    ) -> Result<LeasedSession> {
        let key = match self.sharing {
            SessionSharing::Item => {
                let handle = self.create_with_retry(kind).await?;
                return Ok(LeasedSession {
                    session: Arc::new(PooledSession {
                        handle,
                        lock: Mutex::new(()),
                    }),
                    ephemeral: true,
                });
            }
            SessionSharing::Branch => PoolKey::Branch {
                kind: kind.to_string(),
                subgraph: subgraph.0,
                branch: branch_label.to_string(),
            },
            SessionSharing::Run => PoolKey::Run {
                kind: kind.to_string(),
            },
        };

        let mut pooled = self.pooled.lock().await;
        if let Some(session) = pooled.get(&key) {
            return Ok(LeasedSession {
                session: Arc::clone(session),
                ephemeral: false,
            });
        }

        let handle = self.create_with_retry(kind).await?;
        let session = Arc::new(PooledSession {
            handle,
            lock: Mutex::new(()),
        });
        pooled.insert(key, Arc::clone(&session));
        Ok(LeasedSession {
            session,
            ephemeral: false,
        })
    }

    /// Return a lease; ephemeral sessions are destroyed here.
    pub async fn release(&self, lease: LeasedSession) {
        if lease.ephemeral {
            let _ = self.backend.destroy(lease.session.handle).await;
        }
    }

    /// Tear down sessions scoped to a finished branch. No-op for other
    /// sharing scopes.
    pub async fn reclaim_branch(&self, subgraph: SubgraphId, branch_label: &str) {
        let drained: Vec<Arc<PooledSession>> = {
            let mut pooled = self.pooled.lock().await;
            let keys: Vec<PoolKey> = pooled
                .keys()
                .filter(|key| {
                    matches!(
                        key,
                        PoolKey::Branch { subgraph: s, branch, .. }
                            if *s == subgraph.0 && branch == branch_label
                    )
                })
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| pooled.remove(&key))
                .collect()
        };

        for session in drained {
            let _ = self.backend.destroy(session.handle).await;
        }
    }

    /// Destroy every pooled session. Idempotent.
    pub async fn destroy_all(&self) {
        let drained: Vec<Arc<PooledSession>> = {
            let mut pooled = self.pooled.lock().await;
            pooled.drain().map(|(_, session)| session).collect()
        };

        for session in drained {
            let _ = self.backend.destroy(session.handle).await;
        }
    }

    async fn create_with_retry(&self, kind: &str) -> Result<SessionHandle> {
        let mut delay = CREATE_BACKOFF;

        for attempt in 1..=CREATE_ATTEMPTS {
            match self.backend.create(kind).await {
                Ok(handle) => return Ok(handle),
                Err(DagrunError::BackendUnavailable(msg)) if attempt < CREATE_ATTEMPTS => {
                    warn!(
                        session = %kind,
                        attempt,
                        error = %msg,
                        "session backend unavailable; retrying"
                    );
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(DagrunError::BackendUnavailable(msg)) => {
                    return Err(DagrunError::Launch(format!(
                        "session backend '{kind}' unavailable after {CREATE_ATTEMPTS} attempts: {msg}"
                    )));
                }
                Err(err) => return Err(err),
            }
        }

        unreachable!("create loop always returns")
    }
}

/// Run one session item: lease a session per sharing policy, submit its
/// requests in order, forward output as events.
pub(crate) async fn run_session_item(
    item: &ScheduledItem,
    spec: &SessionSpec,
    pool: &SessionPool,
    stop_rx: &mut watch::Receiver<bool>,
    events: &EventSink,
) -> ItemOutcome {
    let lease = match pool.lease(&spec.kind, item.subgraph, &item.branch_label).await {
        Ok(lease) => lease,
        Err(err) => {
            let reason = match err {
                DagrunError::Launch(msg) => msg,
                other => other.to_string(),
            };
            return ItemOutcome::Failed(FailureKind::Launch(reason));
        }
    };

    let guard = lease.session.lock.lock().await;
    let mut outcome = ItemOutcome::Completed(format!(
        "{} command(s) completed",
        spec.commands.len()
    ));

    'commands: for (index, request) in spec.commands.iter().enumerate() {
        tokio::select! {
            reply = pool.backend().submit(lease.session.handle, request) => {
                match reply {
                    Ok(reply) => {
                        for line in reply.output {
                            events
                                .publish(Event::item(
                                    item.subgraph,
                                    item.branch_label.clone(),
                                    item.name.clone(),
                                    EventKind::ItemOutput,
                                    line,
                                ))
                                .await;
                        }
                        if let SessionStatus::Error(status) = reply.status {
                            outcome = ItemOutcome::Failed(FailureKind::Execution(format!(
                                "command {} failed with status {status}",
                                index + 1
                            )));
                            break 'commands;
                        }
                    }
                    Err(err) => {
                        outcome = ItemOutcome::Failed(FailureKind::Execution(format!(
                            "session request failed: {err}"
                        )));
                        break 'commands;
                    }
                }
            }

            _ = stop_signalled(stop_rx) => {
                debug!(
                    item = %item.name,
                    branch = %item.branch_label,
                    "stop requested during session item"
                );
                outcome = ItemOutcome::Stopped;
                break 'commands;
            }
        }
    }

    drop(guard);
    pool.release(lease).await;
    outcome
}
