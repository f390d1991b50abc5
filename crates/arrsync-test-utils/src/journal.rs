//! [`Journal`] of adapter calls.
//!
//! One journal is usually shared by every fake service in a test, so the
//! sequence numbers give a global order across services.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use arrsync_model::ResourceKind;

/// The adapter method a call went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Ping,
    Fetch,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Action::Create | Action::Update | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Ping => "ping",
            Action::Fetch => "fetch",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Global sequence number, starting at 0
    pub seq: usize,
    pub service: String,
    pub action: Action,
    pub kind: Option<ResourceKind>,
    pub key: Option<String>,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.service)?;
        if let Some(kind) = self.kind {
            write!(f, ":{}", kind)?;
        }
        if let Some(key) = &self.key {
            write!(f, "/{}", key)?;
        }
        Ok(())
    }
}

/// Shared, ordered record of adapter calls
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Call>> {
        // A panicking test thread must not hide the journal from the assertion
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a call and return its sequence number.
    pub fn record(
        &self,
        service: &str,
        action: Action,
        kind: Option<ResourceKind>,
        key: Option<&str>,
    ) -> usize {
        let mut calls = self.lock();
        let seq = calls.len();
        calls.push(Call {
            seq,
            service: service.to_string(),
            action,
            kind,
            key: key.map(str::to_string),
        });
        seq
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    pub fn calls_for(&self, service: &str) -> Vec<Call> {
        self.lock()
            .iter()
            .filter(|c| c.service == service)
            .cloned()
            .collect()
    }

    /// Create, update and delete calls in order.
    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .iter()
            .filter(|c| c.action.is_mutation())
            .cloned()
            .collect()
    }

    pub fn count(&self, action: Action) -> usize {
        self.lock().iter().filter(|c| c.action == action).count()
    }

    /// Sequence number of the first matching call. Keys compare
    /// case-insensitively.
    pub fn position(&self, service: &str, action: Action, kind: ResourceKind, key: &str) -> Option<usize> {
        self.lock()
            .iter()
            .find(|c| {
                c.service == service
                    && c.action == action
                    && c.kind == Some(kind)
                    && c.key.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(key))
            })
            .map(|c| c.seq)
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
