mod error;
mod mutations;
pub mod occupancy;
mod queries;
mod store;
#[cfg(test)]
mod tests;
mod validator;

pub use error::EngineError;
pub use mutations::{BookingOutcome, GuestHouseUpdate, RoomUpdate};
pub use validator::{Rejection, validate};

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedRwLockReadGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;
use store::Store;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    /// Events of one command are acknowledged or refused together.
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Sole owner of the WAL file. Appends that queue up while a flush is in
/// progress are written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch: Vec<PendingAppend> = Vec::new();
        let mut deferred = None;
        match cmd {
            WalCommand::Append { events, response } => batch.push((events, response)),
            other => deferred = Some(other),
        }

        while deferred.is_none() {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => deferred = Some(other),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            flush_batch(&mut wal, batch);
        }
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
    tracing::debug!(path = %wal.path().display(), "WAL writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let result = batch
        .iter()
        .flat_map(|(events, _)| events)
        .try_for_each(|event| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        // Every caller in the batch is told it failed, so none of its frames
        // may survive into the file.
        tracing::error!(path = %wal.path().display(), "WAL flush failed: {e}");
        if let Err(e) = wal.rollback() {
            tracing::error!(path = %wal.path().display(), "WAL rollback failed, refusing writes: {e}");
        }
    }

    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Rewrite { events, response } => {
            let _ = response.send(wal.rewrite(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { events, response } => flush_batch(wal, vec![(events, response)]),
    }
}

/// One tenant's allocation engine: Room Registry, Occupancy Index and
/// Allocation Service over a WAL-backed Allocation Store.
///
/// Each room is its own unit of mutual exclusion. `book` and `cancel` hold
/// the room's write lock from the occupancy read until the event is durable
/// and applied, so accepted bookings on a room are linearizable while
/// different rooms proceed in parallel.
pub struct Engine {
    pub(super) store: Store,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every mutation for its whole critical section and
    /// exclusively by compaction.
    commit_gate: Arc<RwLock<()>>,
    lock_timeout: Duration,
}

impl Engine {
    /// Replay the log at `wal_path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf, lock_timeout: Duration) -> io::Result<Self> {
        let (wal, events) = Wal::open(&wal_path)?;
        let store = Store::restore(&events);
        tracing::info!(
            path = %wal_path.display(),
            events = events.len(),
            "replayed allocation log"
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store,
            wal_tx,
            commit_gate: Arc::new(RwLock::new(())),
            lock_timeout,
        })
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Durably append events through the group-commit writer. Either all of
    /// them are acknowledged or none.
    async fn wal_append(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// WAL-append, then apply to the room and the allocation index.
    pub(super) async fn persist_and_apply_room(
        &self,
        room: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(vec![event.clone()]).await?;
        store::apply_to_room(room, event);
        self.store.index_event(event);
        Ok(())
    }

    /// Persist an event whose in-memory effect the caller applies itself
    /// (creation events).
    pub(super) async fn persist(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(vec![event.clone()]).await
    }

    /// Persist several events as one unit; the caller applies them.
    pub(super) async fn persist_all(&self, events: Vec<Event>) -> Result<(), EngineError> {
        self.wal_append(events).await
    }

    /// Run `fut` (a lock acquisition) under the lock timeout. Expiry is
    /// reported as `Busy(id)`.
    pub(super) async fn bounded<F: Future>(&self, id: Ulid, fut: F) -> Result<F::Output, EngineError> {
        let started = Instant::now();
        match tokio::time::timeout(self.lock_timeout, fut).await {
            Ok(out) => {
                metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                Ok(out)
            }
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!(%id, timeout_ms = self.lock_timeout.as_millis() as u64, "lock wait timed out");
                Err(EngineError::Busy(id))
            }
        }
    }

    pub(super) async fn enter_commit(&self) -> OwnedRwLockReadGuard<()> {
        self.commit_gate.clone().read_owned().await
    }

    /// Rewrite the WAL as the minimal event set for the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;
        let events = self.store.snapshot_events().await;
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Rewrite { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!(events = count, "compacted allocation log");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
