//! Dedicated thread owning the SQLite connection.
//!
//! Callers submit closures and await the reply on a oneshot channel, so the
//! async control loop never blocks on disk I/O. Each closure runs to
//! completion on the worker even if the awaiting future is dropped.

use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use rusqlite::Connection;
use tokio::sync::oneshot;
use tracing::{error, info};

use super::migrations;
use crate::error::{CoreError, DatabaseError, Result};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct WorkerInner {
    sender: mpsc::Sender<DbCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("failed to send shutdown to database thread: {err}");
            }
            if handle.join().is_err() {
                error!("database thread panicked during shutdown");
            }
        }
    }
}

/// Where the worker opens its connection.
#[derive(Debug, Clone)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

/// Cloneable handle to the database thread.
#[derive(Clone)]
pub struct DbWorker {
    inner: Arc<WorkerInner>,
}

impl DbWorker {
    /// Spawn the worker, open the connection and run migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn spawn(location: DbLocation) -> Result<Self> {
        if let DbLocation::File(path) = &location {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let location_for_thread = location.clone();

        let handle = thread::Builder::new()
            .name("sleeplog-db".into())
            .spawn(move || {
                let opened = match &location_for_thread {
                    DbLocation::File(path) => Connection::open(path).map_err(|source| {
                        DatabaseError::OpenFailed {
                            path: path.clone(),
                            source,
                        }
                    }),
                    DbLocation::Memory => Connection::open_in_memory().map_err(|source| {
                        DatabaseError::OpenFailed {
                            path: PathBuf::from(":memory:"),
                            source,
                        }
                    }),
                };
                let mut conn = match opened {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.into()));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("failed to enable WAL mode: {err}");
                }

                let init = migrations::migrate(&conn).map_err(|err| {
                    CoreError::Database(DatabaseError::MigrationFailed(err.to_string()))
                });
                if ready_tx.send(init).is_err() {
                    error!("database readiness receiver dropped");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("database thread shutting down");
            })?;

        ready_rx.recv().map_err(|_| {
            DatabaseError::WorkerUnavailable("worker exited before signaling readiness".into())
        })??;

        info!(location = ?location, "database ready");

        Ok(Self {
            inner: Arc::new(WorkerInner {
                sender: command_tx,
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Run `task` on the database thread and await its result.
    ///
    /// # Errors
    /// Returns the task's own error, or `WorkerUnavailable` if the thread is gone.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("database caller dropped before receiving result");
            }
        }));

        self.inner.sender.send(command).map_err(|err| {
            DatabaseError::WorkerUnavailable(format!("failed to send command: {err}"))
        })?;

        reply_rx.await.map_err(|_| {
            CoreError::Database(DatabaseError::WorkerUnavailable(
                "database thread terminated unexpectedly".into(),
            ))
        })?
    }
}
