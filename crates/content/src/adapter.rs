//! Backing-session multiplexing and edit-cycle bookkeeping for one content
//! session.
//!
//! Read sessions are cached per (thread, workspace). Whenever the calling
//! thread differs from the thread that last retrieved a session, the returned
//! session is refreshed first. Write sessions are shared per workspace by
//! every thread editing under the content session; a single writer at a time
//! is assumed, not enforced.
//!
//! 每個內容工作階段的後端工作階段管理與編輯週期狀態。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, info};
use vellum_store::nodetype::MIX_SIMPLE_VERSIONABLE;
use vellum_store::{paths, BackingSession, NodeHandle, Repository};

use crate::error::{ContentError, StateError, StoreContext};
use crate::session::SessionId;

/// Versioning state of one path during the current edit cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EditStatus {
    /// Not touched by this cycle, or frozen since.
    #[default]
    Closed,
    /// Was already checked out; persist creates a checkpoint.
    OpenReopened,
    /// Checked out by this cycle; persist checks it in.
    OpenNew,
}

/// Edit state of one workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditState {
    statuses: BTreeMap<String, EditStatus>,
}

impl EditState {
    pub fn status(&self, path: &str) -> EditStatus {
        self.statuses.get(path).copied().unwrap_or_default()
    }

    /// Paths that were already checked out when the cycle opened them.
    pub fn reopened(&self) -> impl Iterator<Item = &str> {
        self.with_status(EditStatus::OpenReopened)
    }

    /// Paths checked out by this cycle and owed a checkin.
    pub fn just_checked_out(&self) -> impl Iterator<Item = &str> {
        self.with_status(EditStatus::OpenNew)
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    fn with_status(&self, wanted: EditStatus) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(move |(_, status)| **status == wanted)
            .map(|(path, _)| path.as_str())
    }

    fn open(&mut self, path: &str, was_checked_out: bool) -> EditStatus {
        let next = match (self.status(path), was_checked_out) {
            (EditStatus::OpenNew, _) => EditStatus::OpenNew,
            (_, true) => EditStatus::OpenReopened,
            (_, false) => EditStatus::OpenNew,
        };
        self.statuses.insert(path.to_string(), next);
        next
    }

    fn close(&mut self, path: &str) {
        self.statuses.remove(path);
    }
}

type Sessions = HashMap<String, Arc<dyn BackingSession>>;

#[derive(Default)]
struct AdapterState {
    closed: bool,
    last_thread: Option<ThreadId>,
    read_sessions: HashMap<ThreadId, Sessions>,
    write_sessions: BTreeMap<String, Arc<dyn BackingSession>>,
    edits: BTreeMap<String, EditState>,
}

impl AdapterState {
    fn ensure_open(&self) -> Result<(), StateError> {
        if self.closed {
            Err(StateError::AdapterClosed)
        } else {
            Ok(())
        }
    }
}

/// Owns the backing sessions of one content session.
pub struct SessionAdapter {
    repository: Arc<dyn Repository>,
    owner: SessionId,
    state: Mutex<AdapterState>,
}

impl SessionAdapter {
    pub fn new(repository: Arc<dyn Repository>, owner: SessionId) -> Self {
        Self {
            repository,
            owner,
            state: Mutex::new(AdapterState::default()),
        }
    }

    pub fn owner(&self) -> &SessionId {
        &self.owner
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn ensure_open(&self) -> Result<(), StateError> {
        self.state.lock().ensure_open()
    }

    fn login(&self, workspace: &str) -> Result<Arc<dyn BackingSession>, ContentError> {
        let session = self.repository.login(workspace).at(workspace, paths::ROOT)?;
        debug!(owner = %self.owner, workspace, "logged in backing session");
        Ok(session)
    }

    /// Read session for the calling thread.
    pub fn session(&self, workspace: &str) -> Result<Arc<dyn BackingSession>, ContentError> {
        let current = thread::current().id();
        let mut state = self.state.lock();
        state.ensure_open()?;
        let last = *state.last_thread.get_or_insert(current);

        let cached = state
            .read_sessions
            .get(&current)
            .and_then(|sessions| sessions.get(workspace))
            .cloned();
        let session = match cached {
            Some(session) => session,
            None => {
                let session = self.login(workspace)?;
                state
                    .read_sessions
                    .entry(current)
                    .or_default()
                    .insert(workspace.to_string(), Arc::clone(&session));
                session
            }
        };

        if last != current {
            session.refresh(true).at(workspace, paths::ROOT)?;
            debug!(owner = %self.owner, workspace, "refreshed read session for another thread");
        }
        state.last_thread = Some(current);
        Ok(session)
    }

    fn write_session(
        &self,
        state: &mut AdapterState,
        workspace: &str,
    ) -> Result<Arc<dyn BackingSession>, ContentError> {
        if let Some(session) = state.write_sessions.get(workspace) {
            return Ok(Arc::clone(session));
        }
        let session = self.login(workspace)?;
        state
            .write_sessions
            .insert(workspace.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Opens `path` for mutation and returns a live handle on the write session.
    pub fn open_for_edit(&self, workspace: &str, path: &str) -> Result<NodeHandle, ContentError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let session = self.write_session(&mut state, workspace)?;
        let node = NodeHandle::resolve(session, path).at(workspace, path)?;
        if node.is_node_type(MIX_SIMPLE_VERSIONABLE).at(workspace, path)? {
            let was_checked_out = node.is_checked_out().at(workspace, path)?;
            if !was_checked_out {
                node.session().checkout(node.path()).at(workspace, path)?;
            }
            let status = state
                .edits
                .entry(workspace.to_string())
                .or_default()
                .open(node.path(), was_checked_out);
            debug!(owner = %self.owner, workspace, path = node.path(), ?status, "opened for edit");
        }
        Ok(node)
    }

    /// Checks `path` in right away if it is checked out.
    pub fn freeze(&self, workspace: &str, path: &str) -> Result<(), ContentError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let session = self.write_session(&mut state, workspace)?;
        let node = NodeHandle::resolve(session, path).at(workspace, path)?;
        if node.is_node_type(MIX_SIMPLE_VERSIONABLE).at(workspace, path)?
            && node.is_checked_out().at(workspace, path)?
        {
            let version = node.session().checkin(node.path()).at(workspace, path)?;
            debug!(owner = %self.owner, workspace, path = node.path(), version = %version.name, "froze");
        }
        if let Some(edits) = state.edits.get_mut(workspace) {
            edits.close(node.path());
        }
        Ok(())
    }

    /// Whether the versioning manager reports `path` as checked out.
    ///
    /// Leaves the session caches and thread affinity untouched. Without a
    /// write session the flag is read through a short-lived session.
    pub fn is_open_for_edit(&self, workspace: &str, path: &str) -> Result<bool, ContentError> {
        let session = {
            let state = self.state.lock();
            state.ensure_open()?;
            state.write_sessions.get(workspace).cloned()
        };
        match session {
            Some(session) => session.is_checked_out(path).at(workspace, path),
            None => {
                let session = self.login(workspace)?;
                let checked_out = session.is_checked_out(path).at(workspace, path);
                session.logout();
                checked_out
            }
        }
    }

    /// Edit status of `path` in the current cycle.
    pub fn edit_status(&self, workspace: &str, path: &str) -> EditStatus {
        self.state
            .lock()
            .edits
            .get(workspace)
            .map(|edits| edits.status(path))
            .unwrap_or_default()
    }

    /// Commits every write session, then checkpoints reopened paths and checks
    /// in paths checked out by this cycle. Read sessions are refreshed and the
    /// cycle ends.
    ///
    /// A failure part way leaves the adapter inconsistent; it must be discarded.
    pub fn persist(&self) -> Result<(), ContentError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let mut checkpoints = 0usize;
        let mut checkins = 0usize;
        for (workspace, session) in &state.write_sessions {
            session.save().at(workspace, paths::ROOT)?;
            if let Some(edits) = state.edits.get(workspace) {
                for path in edits.reopened() {
                    session.checkpoint(path).at(workspace, path)?;
                    checkpoints += 1;
                }
                for path in edits.just_checked_out() {
                    session.checkin(path).at(workspace, path)?;
                    checkins += 1;
                }
            }
            session.logout();
        }
        for sessions in state.read_sessions.values() {
            for (workspace, session) in sessions {
                session.refresh(true).at(workspace, paths::ROOT)?;
            }
        }
        let workspaces = state.write_sessions.len();
        state.write_sessions.clear();
        state.edits.clear();
        info!(owner = %self.owner, workspaces, checkpoints, checkins, "persisted edit cycle");
        Ok(())
    }

    /// Logs out every cached session and rejects all later calls.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let mut count = 0usize;
        for sessions in state.read_sessions.values() {
            for session in sessions.values() {
                session.logout();
                count += 1;
            }
        }
        for session in state.write_sessions.values() {
            session.logout();
            count += 1;
        }
        state.read_sessions.clear();
        state.write_sessions.clear();
        state.edits.clear();
        state.last_thread = None;
        state.closed = true;
        info!(owner = %self.owner, sessions = count, "closed session adapter");
    }
}
