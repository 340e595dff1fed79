//! Source identity and liveness.
//!
//! A source is whatever task currently produces frames for the stream. The
//! actor never blocks on it; it only needs to know when the source is gone.
//! The producer keeps the [`SourceGuard`]; dropping it cancels the token
//! the actor's watch task waits on, which posts a source-lost message into
//! the mailbox.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, DropGuard};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one frame producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// Handle describing a frame producer, passed to `set_source`.
#[derive(Clone)]
pub struct Source {
    id: SourceId,
    label: Arc<str>,
    token: CancellationToken,
}

impl Source {
    /// Create a source identity. The producer holds the guard; the handle
    /// goes to the stream.
    pub fn new(label: impl AsRef<str>) -> (Self, SourceGuard) {
        let token = CancellationToken::new();
        let guard = SourceGuard {
            _guard: token.clone().drop_guard(),
        };
        let source = Self {
            id: SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)),
            label: Arc::from(label.as_ref()),
            token,
        };
        (source, guard)
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Token the actor's watch task waits on.
    pub(crate) fn liveness(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// Liveness guard held by the producer. Dropping it signals source loss.
#[derive(Debug)]
pub struct SourceGuard {
    _guard: DropGuard,
}

impl SourceGuard {
    /// Explicitly signal source loss.
    pub fn disconnect(self) {}
}
