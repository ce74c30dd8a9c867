use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StateError;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier for content sessions.
/// 內容工作階段的穩定代號。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        Self(format!("{id:016x}"))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type CloseCallback = Box<dyn FnOnce(&SessionId) + Send>;

struct SessionInner {
    closed: bool,
    modified: BTreeSet<(String, String)>,
    on_close: Vec<CloseCallback>,
}

/// Caller-visible logical session, spanning workspaces and threads.
/// 呼叫端可見的邏輯工作階段，可跨工作區與執行緒。
pub struct ContentSession {
    id: SessionId,
    editing: bool,
    inner: Mutex<SessionInner>,
}

impl ContentSession {
    /// Session allowed to open content for edit.
    pub fn new() -> Self {
        Self::with_mode(true)
    }

    /// Session that may only read.
    pub fn read_only() -> Self {
        Self::with_mode(false)
    }

    fn with_mode(editing: bool) -> Self {
        Self {
            id: SessionId::new(),
            editing,
            inner: Mutex::new(SessionInner {
                closed: false,
                modified: BTreeSet::new(),
                on_close: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_open(&self) -> bool {
        !self.inner.lock().closed
    }

    pub fn ensure_open(&self) -> Result<(), StateError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StateError::SessionClosed(self.id.clone()))
        }
    }

    pub fn ensure_editing(&self) -> Result<(), StateError> {
        self.ensure_open()?;
        if self.editing {
            Ok(())
        } else {
            Err(StateError::ReadOnlySession(self.id.clone()))
        }
    }

    /// Registers a callback run once when the session closes. Runs it right
    /// away if the session is already closed.
    pub fn on_close(&self, callback: impl FnOnce(&SessionId) + Send + 'static) {
        let mut inner = self.inner.lock();
        if inner.closed {
            drop(inner);
            callback(&self.id);
        } else {
            inner.on_close.push(Box::new(callback));
        }
    }

    /// Closes the session and runs the close callbacks. Later calls do nothing.
    pub fn close(&self) {
        let callbacks = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.modified.clear();
            std::mem::take(&mut inner.on_close)
        };
        debug!(session = %self.id, callbacks = callbacks.len(), "closing content session");
        for callback in callbacks {
            callback(&self.id);
        }
    }

    /// Records that `path` in `workspace` has pending modifications.
    pub fn notify_modification(&self, workspace: &str, path: &str) {
        self.inner
            .lock()
            .modified
            .insert((workspace.to_string(), path.to_string()));
    }

    /// `(workspace, path)` pairs modified since the last persist.
    pub fn modified(&self) -> Vec<(String, String)> {
        self.inner.lock().modified.iter().cloned().collect()
    }

    pub(crate) fn clear_modified(&self) {
        self.inner.lock().modified.clear();
    }
}

impl Default for ContentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSession")
            .field("id", &self.id)
            .field("editing", &self.editing)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn close_callbacks_run_exactly_once() {
        let session = ContentSession::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        session.on_close(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        session.close();
        session.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            session.ensure_open(),
            Err(StateError::SessionClosed(session.id().clone()))
        );

        let late = Arc::clone(&calls);
        session.on_close(move |_| {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn modifications_are_tracked_until_cleared() {
        let session = ContentSession::new();
        session.notify_modification("main", "/a");
        session.notify_modification("main", "/a");
        session.notify_modification("drafts", "/b");
        assert_eq!(session.modified().len(), 2);
        session.clear_modified();
        assert!(session.modified().is_empty());
    }

    #[test]
    fn read_only_sessions_refuse_editing() {
        let session = ContentSession::read_only();
        assert!(matches!(
            session.ensure_editing(),
            Err(StateError::ReadOnlySession(_))
        ));
        assert_ne!(session.id(), ContentSession::new().id());
    }
}
