//! Session-wide query log
//!
//! Every façade invocation appends exactly one [`LogEvent`] to the shared
//! [`QueryLog`], on success and on failure. The log is append-only and safe
//! to share between threads and coroutines; its `Display` form is one line
//! per event:
//!
//! ```text
//! query: todo_add({"id":"1","title":"run"}) -> ok
//! query: todo_item({"id":"9"}) -> failed: Query todo_item failed: ...
//! ```
//!
//! Events can also be streamed to an external sink through [`QueryLog::subscribe`].

use crate::query::binding::BoundParams;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum Outcome {
    /// The invocation returned a result
    Ok,
    /// The invocation returned this error
    Failed(String),
}

impl Outcome {
    /// `true` for [`Outcome::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

/// Record of one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    /// Contract name
    pub query: String,
    /// SQL resource name
    pub sql: String,
    /// Arguments as bound, or as supplied when binding failed
    pub args: BoundParams,
    /// Success or failure
    pub outcome: Outcome,
    /// When the invocation finished
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Build an event stamped with the current time.
    pub fn new(query: impl Into<String>, sql: impl Into<String>, args: BoundParams, outcome: Outcome) -> Self {
        Self {
            query: query.into(),
            sql: sql.into(),
            args,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = serde_json::to_string(&self.args).map_err(|_| fmt::Error)?;
        write!(f, "query: {}({args})", self.sql)?;
        match &self.outcome {
            Outcome::Ok => write!(f, " -> ok"),
            Outcome::Failed(err) => write!(f, " -> failed: {err}"),
        }
    }
}

#[derive(Default)]
struct LogState {
    events: Vec<LogEvent>,
    subscribers: Vec<Sender<LogEvent>>,
}

/// Append-only, order-preserving sequence of [`LogEvent`]s
#[derive(Default)]
pub struct QueryLog {
    state: Mutex<LogState>,
}

impl QueryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // events are only ever pushed, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event and forward it to live subscribers.
    ///
    /// Subscribers receive events in log order; dropped receivers are pruned.
    pub fn append(&self, event: LogEvent) {
        let mut state = self.lock();
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        state.events.push(event);
    }

    /// Snapshot of every event so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.lock().events.clone()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// `true` when nothing was logged yet.
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Does the rendered log contain `needle`?
    pub fn contains(&self, needle: &str) -> bool {
        self.to_string().contains(needle)
    }

    /// Stream events appended from now on.
    pub fn subscribe(&self) -> Receiver<LogEvent> {
        let (tx, rx) = unbounded();
        self.lock().subscribers.push(tx);
        rx
    }
}

impl fmt::Display for QueryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.lock().events {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for QueryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("QueryLog")
            .field("events", &state.events.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
