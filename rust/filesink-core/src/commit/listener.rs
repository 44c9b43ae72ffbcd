// rust/filesink-core/src/commit/listener.rs

//! Commit notification.
//!
//! A [`CommitListener`] hears about every file that became durable and
//! visible, e.g. to register it in a catalog or manifest. Listeners run
//! synchronously inside the commit call and their failures never undo a
//! commit.

use std::collections::HashSet;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SinkError;

/// Error type returned by listeners.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the commit name of each committed file.
///
/// Closures of the form `Fn(&str) -> Result<(), ListenerError>` are
/// listeners too.
pub trait CommitListener: Send + Sync {
    /// Called once per committed file, after the file is visible.
    ///
    /// Implementations should return promptly; the committer waits for them.
    fn on_committed(&self, commit_name: &str) -> Result<(), ListenerError>;
}

impl<F> CommitListener for F
where
    F: Fn(&str) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_committed(&self, commit_name: &str) -> Result<(), ListenerError> {
        self(commit_name)
    }
}

/// Forwards commit names into a channel.
pub struct ChannelListener {
    tx: Sender<String>,
}

impl ChannelListener {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }
}

impl CommitListener for ChannelListener {
    fn on_committed(&self, commit_name: &str) -> Result<(), ListenerError> {
        self.tx
            .send(commit_name.to_string())
            .map_err(|_| "commit channel receiver dropped".into())
    }
}

/// Logs each commit at info level.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl CommitListener for LoggingListener {
    fn on_committed(&self, commit_name: &str) -> Result<(), ListenerError> {
        tracing::info!(commit_name, "file committed");
        Ok(())
    }
}

/// A listener plus the commit names it has already been told about.
struct Registration {
    listener: Arc<dyn CommitListener>,
    delivered: Mutex<HashSet<String>>,
}

impl Registration {
    fn delivered(&self) -> MutexGuard<'_, HashSet<String>> {
        self.delivered.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of dispatching one commit name.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Listeners that received the name on this call.
    pub delivered: usize,
    /// Listeners skipped because they already received the name.
    pub suppressed: usize,
    /// Failures of the remaining listeners.
    pub errors: Vec<SinkError>,
}

/// Delivers commit names to listeners at most once per name per listener.
///
/// Bookkeeping lives in memory, so the guarantee holds for the lifetime of
/// the process. A name whose delivery failed is not recorded and is offered
/// again by the next commit attempt.
///
/// Every delivered name is kept until [`forget`](Self::forget) is called for
/// it, so memory grows with the number of files committed. Long-running
/// callers forget names once no checkpoint can replay them.
#[derive(Default)]
pub struct CommitNotifier {
    registrations: Vec<Registration>,
}

impl CommitNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn CommitListener>) {
        self.registrations.push(Registration {
            listener,
            delivered: Mutex::new(HashSet::new()),
        });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Whether every listener has received `commit_name`.
    pub fn is_delivered(&self, commit_name: &str) -> bool {
        self.registrations
            .iter()
            .all(|r| r.delivered().contains(commit_name))
    }

    /// Drops `commit_name` from every listener's delivered set.
    pub fn forget(&self, commit_name: &str) {
        for registration in &self.registrations {
            registration.delivered().remove(commit_name);
        }
    }

    /// Notifies every listener that has not yet seen `commit_name`.
    pub fn notify(&self, commit_name: &str) -> Dispatch {
        let mut dispatch = Dispatch::default();

        for registration in &self.registrations {
            // Reserve the name before calling out so a concurrent duplicate
            // cannot deliver it twice.
            if !registration.delivered().insert(commit_name.to_string()) {
                dispatch.suppressed += 1;
                continue;
            }

            match registration.listener.on_committed(commit_name) {
                Ok(()) => dispatch.delivered += 1,
                Err(e) => {
                    registration.delivered().remove(commit_name);
                    let err = SinkError::listener_with_source(commit_name, e);
                    tracing::warn!(commit_name, error = %err, "commit listener failed");
                    dispatch.errors.push(err);
                }
            }
        }

        dispatch
    }
}
