//! In-memory reference store.
//!
//! Each workspace keeps committed state as a path-ordered node map. A session
//! works on a private view (committed state at login or last refresh) plus a
//! log of pending operations that `save` replays against committed state.
//! Versioning operations act on committed state immediately.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use vellum_model::NamespaceRegistry;

use crate::error::StoreError;
use crate::nodetype::{
    NodeType, NodeTypeRegistry, MIX_CREATED, MIX_LAST_MODIFIED, MIX_REFERENCEABLE,
    MIX_SIMPLE_VERSIONABLE, NT_UNSTRUCTURED,
};
use crate::paths;
use crate::query::{is_descendant, Evaluator, Query, QueryResult};
use crate::session::{BackingSession, Repository, VersionInfo};
use crate::snapshot::{
    write_atomic, NodeState, RepositorySnapshot, WorkspaceSnapshot, SNAPSHOT_FORMAT_VERSION,
};
use crate::value::{PropertyValue, StoreValue};

pub const JCR_PRIMARY_TYPE: &str = "jcr:primaryType";
pub const JCR_MIXIN_TYPES: &str = "jcr:mixinTypes";
pub const JCR_IS_CHECKED_OUT: &str = "jcr:isCheckedOut";
pub const JCR_UUID: &str = "jcr:uuid";
pub const JCR_BASE_VERSION: &str = "jcr:baseVersion";
pub const JCR_CREATED: &str = "jcr:created";
pub const JCR_LAST_MODIFIED: &str = "jcr:lastModified";

/// Properties only the store itself may write.
pub const PROTECTED_PROPERTIES: [&str; 5] = [
    JCR_PRIMARY_TYPE,
    JCR_MIXIN_TYPES,
    JCR_IS_CHECKED_OUT,
    JCR_UUID,
    JCR_BASE_VERSION,
];

type Tree = BTreeMap<String, NodeState>;

#[derive(Debug, Default)]
struct WorkspaceState {
    nodes: Tree,
    versions: BTreeMap<String, Vec<VersionInfo>>,
}

#[derive(Debug)]
struct RepositoryState {
    workspaces: BTreeMap<String, WorkspaceState>,
    node_types: NodeTypeRegistry,
    namespaces: NamespaceRegistry,
}

impl RepositoryState {
    fn workspace(&self, name: &str) -> Result<&WorkspaceState, StoreError> {
        self.workspaces
            .get(name)
            .ok_or_else(|| StoreError::NoSuchWorkspace(name.to_string()))
    }
}

#[derive(Debug)]
struct Shared {
    state: RwLock<RepositoryState>,
    next_identifier: AtomicU64,
    next_session: AtomicU64,
}

impl Shared {
    fn identifier(&self) -> String {
        let id = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        format!("{id:016x}")
    }
}

/// In-memory repository holding any number of workspaces.
/// 記憶體內的倉儲，可包含多個工作區。
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    shared: Arc<Shared>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(RepositoryState {
                    workspaces: BTreeMap::new(),
                    node_types: NodeTypeRegistry::with_builtins(),
                    namespaces: NamespaceRegistry::with_defaults(),
                }),
                next_identifier: AtomicU64::new(1),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Repository with the given (empty) workspaces.
    pub fn with_workspaces(names: &[&str]) -> Result<Self, StoreError> {
        let repository = Self::new();
        for name in names {
            repository.create_workspace(name)?;
        }
        Ok(repository)
    }

    /// Creates a workspace holding only its root node.
    pub fn create_workspace(&self, name: &str) -> Result<(), StoreError> {
        let root = NodeState::new(self.shared.identifier(), NT_UNSTRUCTURED);
        let mut state = self.shared.state.write();
        if state.workspaces.contains_key(name) {
            return Err(StoreError::WorkspaceExists(name.to_string()));
        }
        let mut workspace = WorkspaceState::default();
        workspace.nodes.insert(paths::ROOT.to_string(), root);
        state.workspaces.insert(name.to_string(), workspace);
        info!(workspace = name, "created workspace");
        Ok(())
    }

    pub fn register_node_type(&self, node_type: NodeType) -> Result<(), StoreError> {
        self.shared.state.write().node_types.register(node_type)
    }

    pub fn register_namespace(&self, prefix: &str, uri: &str) {
        self.shared.state.write().namespaces.register(prefix, uri);
    }

    /// Copies committed state of every workspace.
    pub fn snapshot(&self) -> RepositorySnapshot {
        let state = self.shared.state.read();
        RepositorySnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            namespaces: state.namespaces.clone(),
            node_types: state.node_types.custom_types(),
            next_identifier: self.shared.next_identifier.load(Ordering::Relaxed),
            workspaces: state
                .workspaces
                .iter()
                .map(|(name, workspace)| {
                    (
                        name.clone(),
                        WorkspaceSnapshot {
                            nodes: workspace.nodes.clone(),
                            versions: workspace.versions.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: RepositorySnapshot) -> Result<Self, StoreError> {
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::Snapshot(format!(
                "unsupported format version {}",
                snapshot.format_version
            )));
        }
        let mut node_types = NodeTypeRegistry::with_builtins();
        register_in_dependency_order(&mut node_types, snapshot.node_types)?;

        let mut workspaces = BTreeMap::new();
        for (name, workspace) in snapshot.workspaces {
            if !workspace.nodes.contains_key(paths::ROOT) {
                return Err(StoreError::Snapshot(format!(
                    "workspace {name} has no root node"
                )));
            }
            workspaces.insert(
                name,
                WorkspaceState {
                    nodes: workspace.nodes,
                    versions: workspace.versions,
                },
            );
        }
        Ok(Self {
            shared: Arc::new(Shared {
                state: RwLock::new(RepositoryState {
                    workspaces,
                    node_types,
                    namespaces: snapshot.namespaces,
                }),
                next_identifier: AtomicU64::new(snapshot.next_identifier.max(1)),
                next_session: AtomicU64::new(1),
            }),
        })
    }

    /// Loads a JSON snapshot file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path)?;
        let snapshot: RepositorySnapshot = serde_json::from_str(&contents)
            .map_err(|err| StoreError::Snapshot(err.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Writes committed state to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.snapshot())
            .map_err(|err| StoreError::Snapshot(err.to_string()))?;
        write_atomic(path, &json)?;
        Ok(())
    }
}

fn register_in_dependency_order(
    registry: &mut NodeTypeRegistry,
    mut pending: Vec<NodeType>,
) -> Result<(), StoreError> {
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for node_type in pending {
            if node_type
                .supertypes
                .iter()
                .all(|supertype| registry.contains(supertype))
            {
                registry.register(node_type)?;
            } else {
                deferred.push(node_type);
            }
        }
        if deferred.len() == before {
            let missing = deferred
                .iter()
                .flat_map(|node_type| node_type.supertypes.iter())
                .find(|supertype| !registry.contains(supertype))
                .cloned()
                .unwrap_or_default();
            return Err(StoreError::NoSuchNodeType(missing));
        }
        pending = deferred;
    }
    Ok(())
}

impl Repository for MemoryRepository {
    fn login(&self, workspace: &str) -> Result<Arc<dyn BackingSession>, StoreError> {
        let view = self.shared.state.read().workspace(workspace)?.nodes.clone();
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        debug!(workspace, session = id, "login");
        Ok(Arc::new(MemorySession {
            id,
            workspace: workspace.to_string(),
            shared: Arc::clone(&self.shared),
            state: Mutex::new(SessionState {
                live: true,
                view,
                pending: Vec::new(),
            }),
        }))
    }

    fn workspace_names(&self) -> Vec<String> {
        self.shared.state.read().workspaces.keys().cloned().collect()
    }
}

#[derive(Debug, Clone)]
enum PendingOp {
    AddNode {
        parent: String,
        name: String,
        primary_type: String,
        identifier: String,
        at: DateTime<Utc>,
    },
    AddMixin {
        path: String,
        mixin: String,
        at: DateTime<Utc>,
    },
    SetProperty {
        path: String,
        name: String,
        value: PropertyValue,
        at: DateTime<Utc>,
    },
    RemoveProperty {
        path: String,
        name: String,
        at: DateTime<Utc>,
    },
    RemoveNode {
        path: String,
    },
}

impl PendingOp {
    /// Whether this operation changes the node at `path` itself.
    fn touches(&self, path: &str) -> bool {
        match self {
            PendingOp::AddNode { parent, .. } => parent == path,
            PendingOp::AddMixin { path: target, .. }
            | PendingOp::SetProperty { path: target, .. }
            | PendingOp::RemoveProperty { path: target, .. } => target == path,
            PendingOp::RemoveNode { path: target } => paths::parent(target) == Some(path),
        }
    }
}

fn has_type(node: &NodeState, types: &NodeTypeRegistry, target: &str) -> bool {
    types.is_a(&node.primary_type, target) || node.mixins.iter().any(|m| types.is_a(m, target))
}

fn checked_out_flag(node: &NodeState) -> Option<bool> {
    node.properties
        .get(JCR_IS_CHECKED_OUT)
        .and_then(PropertyValue::single)
        .and_then(StoreValue::as_bool)
}

fn ensure_writable(path: &str, node: &NodeState) -> Result<(), StoreError> {
    match checked_out_flag(node) {
        Some(false) => Err(StoreError::CheckedIn(path.to_string())),
        _ => Ok(()),
    }
}

fn autocreate(node: &mut NodeState, types: &NodeTypeRegistry, at: DateTime<Utc>) {
    if has_type(node, types, MIX_CREATED) && !node.properties.contains_key(JCR_CREATED) {
        node.properties
            .insert(JCR_CREATED.into(), StoreValue::Date(at).into());
    }
    if has_type(node, types, MIX_LAST_MODIFIED) && !node.properties.contains_key(JCR_LAST_MODIFIED)
    {
        node.properties
            .insert(JCR_LAST_MODIFIED.into(), StoreValue::Date(at).into());
    }
    if has_type(node, types, MIX_REFERENCEABLE) && !node.properties.contains_key(JCR_UUID) {
        let uuid = StoreValue::String(node.identifier.clone());
        node.properties.insert(JCR_UUID.into(), uuid.into());
    }
    if has_type(node, types, MIX_SIMPLE_VERSIONABLE)
        && !node.properties.contains_key(JCR_IS_CHECKED_OUT)
    {
        node.properties
            .insert(JCR_IS_CHECKED_OUT.into(), StoreValue::Boolean(true).into());
    }
}

fn touch_modified(node: &mut NodeState, types: &NodeTypeRegistry, name: &str, at: DateTime<Utc>) {
    if name != JCR_LAST_MODIFIED && has_type(node, types, MIX_LAST_MODIFIED) {
        node.properties
            .insert(JCR_LAST_MODIFIED.into(), StoreValue::Date(at).into());
    }
}

fn node_mut<'a>(tree: &'a mut Tree, path: &str) -> Result<&'a mut NodeState, StoreError> {
    tree.get_mut(path)
        .ok_or_else(|| StoreError::PathNotFound(path.to_string()))
}

fn apply(
    tree: &mut Tree,
    types: &NodeTypeRegistry,
    op: &PendingOp,
) -> Result<Option<PropertyValue>, StoreError> {
    match op {
        PendingOp::AddNode {
            parent,
            name,
            primary_type,
            identifier,
            at,
        } => {
            let parent_node = tree
                .get(parent)
                .ok_or_else(|| StoreError::PathNotFound(parent.clone()))?;
            ensure_writable(parent, parent_node)?;
            if types.get(primary_type)?.mixin {
                return Err(StoreError::NotPrimary(primary_type.clone()));
            }
            let path = paths::join(parent, name);
            if tree.contains_key(&path) {
                return Err(StoreError::ItemExists(path));
            }
            let mut node = NodeState::new(identifier.clone(), primary_type.clone());
            autocreate(&mut node, types, *at);
            tree.insert(path, node);
            Ok(None)
        }
        PendingOp::AddMixin { path, mixin, at } => {
            if !types.get(mixin)?.mixin {
                return Err(StoreError::NotMixin(mixin.clone()));
            }
            let node = node_mut(tree, path)?;
            ensure_writable(path, node)?;
            if !node.mixins.contains(mixin) {
                node.mixins.push(mixin.clone());
            }
            autocreate(node, types, *at);
            Ok(None)
        }
        PendingOp::SetProperty {
            path,
            name,
            value,
            at,
        } => {
            let node = node_mut(tree, path)?;
            ensure_writable(path, node)?;
            let previous = node.properties.insert(name.clone(), value.clone());
            touch_modified(node, types, name, *at);
            Ok(previous)
        }
        PendingOp::RemoveProperty { path, name, at } => {
            let node = node_mut(tree, path)?;
            ensure_writable(path, node)?;
            let previous = node.properties.remove(name);
            if previous.is_some() {
                touch_modified(node, types, name, *at);
            }
            Ok(previous)
        }
        PendingOp::RemoveNode { path } => {
            let parent = paths::parent(path)
                .ok_or_else(|| StoreError::InvalidPath(path.clone()))?;
            if !tree.contains_key(path) {
                return Err(StoreError::PathNotFound(path.clone()));
            }
            let parent_node = tree
                .get(parent)
                .ok_or_else(|| StoreError::PathNotFound(parent.to_string()))?;
            ensure_writable(parent, parent_node)?;
            tree.retain(|candidate, _| candidate != path && !is_descendant(candidate, path));
            Ok(None)
        }
    }
}

fn child_names(tree: &Tree, path: &str) -> Vec<String> {
    let prefix = if path == paths::ROOT {
        paths::ROOT.to_string()
    } else {
        format!("{path}/")
    };
    tree.range(prefix.clone()..)
        .take_while(|(candidate, _)| candidate.starts_with(&prefix))
        .filter_map(|(candidate, _)| {
            let rest = &candidate[prefix.len()..];
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        })
        .collect()
}

fn record_version(
    versions: &mut BTreeMap<String, Vec<VersionInfo>>,
    node: &NodeState,
) -> VersionInfo {
    let history = versions.entry(node.identifier.clone()).or_default();
    let version = VersionInfo {
        name: format!("1.{}", history.len()),
        created: Utc::now(),
        properties: node.properties.clone(),
    };
    history.push(version.clone());
    version
}

#[derive(Debug)]
struct SessionState {
    live: bool,
    view: Tree,
    pending: Vec<PendingOp>,
}

/// Session on a [`MemoryRepository`] workspace.
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    workspace: String,
    shared: Arc<Shared>,
    state: Mutex<SessionState>,
}

impl MemorySession {
    fn live_state(&self) -> Result<MutexGuard<'_, SessionState>, StoreError> {
        let state = self.state.lock();
        if !state.live {
            return Err(StoreError::LoggedOut(self.workspace.clone()));
        }
        Ok(state)
    }

    fn read<R>(
        &self,
        path: &str,
        read: impl FnOnce(&NodeState, &NodeTypeRegistry) -> R,
    ) -> Result<R, StoreError> {
        let path = paths::normalize(path)?;
        let state = self.live_state()?;
        let node = state
            .view
            .get(&path)
            .ok_or(StoreError::PathNotFound(path))?;
        let repository = self.shared.state.read();
        Ok(read(node, &repository.node_types))
    }

    fn record(&self, op: PendingOp) -> Result<Option<PropertyValue>, StoreError> {
        let mut state = self.live_state()?;
        let repository = self.shared.state.read();
        let previous = apply(&mut state.view, &repository.node_types, &op)?;
        state.pending.push(op);
        Ok(previous)
    }

    /// Runs a versioning transition against committed state and mirrors the
    /// touched node into this session's view.
    fn transition<R>(
        &self,
        path: &str,
        transition: impl FnOnce(
            &str,
            &mut NodeState,
            &mut BTreeMap<String, Vec<VersionInfo>>,
            &[PendingOp],
        ) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let path = paths::normalize(path)?;
        let mut state = self.live_state()?;
        let mut repository = self.shared.state.write();
        let RepositoryState {
            workspaces,
            node_types,
            ..
        } = &mut *repository;
        let workspace = workspaces
            .get_mut(&self.workspace)
            .ok_or_else(|| StoreError::NoSuchWorkspace(self.workspace.clone()))?;
        let node = workspace
            .nodes
            .get_mut(&path)
            .ok_or_else(|| StoreError::PathNotFound(path.clone()))?;
        if !has_type(node, node_types, MIX_SIMPLE_VERSIONABLE) {
            return Err(StoreError::NotVersionable(path));
        }
        let result = transition(&path, node, &mut workspace.versions, &state.pending)?;
        let committed = node.properties.clone();
        if let Some(view_node) = state.view.get_mut(&path) {
            for name in [JCR_IS_CHECKED_OUT, JCR_BASE_VERSION] {
                match committed.get(name) {
                    Some(value) => {
                        view_node.properties.insert(name.to_string(), value.clone());
                    }
                    None => {
                        view_node.properties.remove(name);
                    }
                }
            }
        }
        Ok(result)
    }
}

fn ensure_unprotected(name: &str) -> Result<(), StoreError> {
    if PROTECTED_PROPERTIES.contains(&name) {
        return Err(StoreError::Protected(name.to_string()));
    }
    Ok(())
}

fn ensure_no_pending(path: &str, pending: &[PendingOp]) -> Result<(), StoreError> {
    if pending.iter().any(|op| op.touches(path)) {
        return Err(StoreError::PendingChanges(path.to_string()));
    }
    Ok(())
}

impl BackingSession for MemorySession {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn is_live(&self) -> bool {
        self.state.lock().live
    }

    fn logout(&self) {
        let mut state = self.state.lock();
        if state.live {
            state.live = false;
            state.pending.clear();
            state.view.clear();
            debug!(workspace = %self.workspace, session = self.id, "logout");
        }
    }

    fn refresh(&self, keep_changes: bool) -> Result<(), StoreError> {
        let mut state = self.live_state()?;
        let repository = self.shared.state.read();
        let mut view = repository.workspace(&self.workspace)?.nodes.clone();
        let pending = std::mem::take(&mut state.pending);
        if keep_changes {
            for op in pending {
                match apply(&mut view, &repository.node_types, &op) {
                    Ok(_) => state.pending.push(op),
                    Err(err) => {
                        warn!(workspace = %self.workspace, error = %err, "dropped pending change on refresh")
                    }
                }
            }
        }
        state.view = view;
        Ok(())
    }

    fn save(&self) -> Result<(), StoreError> {
        let mut state = self.live_state()?;
        if state.pending.is_empty() {
            return Ok(());
        }
        let mut repository = self.shared.state.write();
        let RepositoryState {
            workspaces,
            node_types,
            ..
        } = &mut *repository;
        let workspace = workspaces
            .get_mut(&self.workspace)
            .ok_or_else(|| StoreError::NoSuchWorkspace(self.workspace.clone()))?;
        let mut next = workspace.nodes.clone();
        for op in &state.pending {
            apply(&mut next, node_types, op)?;
        }
        workspace.nodes = next;
        state.view = workspace.nodes.clone();
        let operations = state.pending.len();
        state.pending.clear();
        info!(workspace = %self.workspace, session = self.id, operations, "saved");
        Ok(())
    }

    fn has_pending_changes(&self) -> Result<bool, StoreError> {
        Ok(!self.live_state()?.pending.is_empty())
    }

    fn item_exists(&self, path: &str) -> Result<bool, StoreError> {
        let path = paths::normalize(path)?;
        Ok(self.live_state()?.view.contains_key(&path))
    }

    fn identifier(&self, path: &str) -> Result<String, StoreError> {
        self.read(path, |node, _| node.identifier.clone())
    }

    fn primary_type(&self, path: &str) -> Result<String, StoreError> {
        self.read(path, |node, _| node.primary_type.clone())
    }

    fn mixins(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.read(path, |node, _| node.mixins.clone())
    }

    fn is_node_type(&self, path: &str, node_type: &str) -> Result<bool, StoreError> {
        self.read(path, |node, types| has_type(node, types, node_type))
    }

    fn properties(&self, path: &str) -> Result<BTreeMap<String, PropertyValue>, StoreError> {
        self.read(path, |node, _| node.properties.clone())
    }

    fn property(&self, path: &str, name: &str) -> Result<Option<PropertyValue>, StoreError> {
        self.read(path, |node, _| node.properties.get(name).cloned())
    }

    fn child_names(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let path = paths::normalize(path)?;
        let state = self.live_state()?;
        if !state.view.contains_key(&path) {
            return Err(StoreError::PathNotFound(path));
        }
        Ok(child_names(&state.view, &path))
    }

    fn add_node(
        &self,
        parent: &str,
        name: &str,
        primary_type: &str,
    ) -> Result<String, StoreError> {
        let parent = paths::normalize(parent)?;
        paths::check_name(name)?;
        let path = paths::join(&parent, name);
        self.record(PendingOp::AddNode {
            parent,
            name: name.to_string(),
            primary_type: primary_type.to_string(),
            identifier: self.shared.identifier(),
            at: Utc::now(),
        })?;
        Ok(path)
    }

    fn add_mixin(&self, path: &str, mixin: &str) -> Result<(), StoreError> {
        self.record(PendingOp::AddMixin {
            path: paths::normalize(path)?,
            mixin: mixin.to_string(),
            at: Utc::now(),
        })?;
        Ok(())
    }

    fn set_property(
        &self,
        path: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, StoreError> {
        ensure_unprotected(name)?;
        self.record(PendingOp::SetProperty {
            path: paths::normalize(path)?,
            name: name.to_string(),
            value,
            at: Utc::now(),
        })
    }

    fn remove_property(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        ensure_unprotected(name)?;
        self.record(PendingOp::RemoveProperty {
            path: paths::normalize(path)?,
            name: name.to_string(),
            at: Utc::now(),
        })
    }

    fn remove_node(&self, path: &str) -> Result<(), StoreError> {
        self.record(PendingOp::RemoveNode {
            path: paths::normalize(path)?,
        })?;
        Ok(())
    }

    fn is_checked_out(&self, path: &str) -> Result<bool, StoreError> {
        self.read(path, |node, _| checked_out_flag(node).unwrap_or(true))
    }

    fn checkout(&self, path: &str) -> Result<(), StoreError> {
        self.transition(path, |path, node, _, _| {
            if checked_out_flag(node) != Some(true) {
                node.properties
                    .insert(JCR_IS_CHECKED_OUT.into(), StoreValue::Boolean(true).into());
                debug!(workspace = %self.workspace, path, "checked out");
            }
            Ok(())
        })
    }

    fn checkin(&self, path: &str) -> Result<VersionInfo, StoreError> {
        self.transition(path, |path, node, versions, pending| {
            if checked_out_flag(node) == Some(false) {
                return Ok(versions
                    .get(&node.identifier)
                    .and_then(|history| history.last().cloned())
                    .unwrap_or_else(|| VersionInfo {
                        name: "jcr:rootVersion".to_string(),
                        created: Utc::now(),
                        properties: BTreeMap::new(),
                    }));
            }
            ensure_no_pending(path, pending)?;
            node.properties
                .insert(JCR_IS_CHECKED_OUT.into(), StoreValue::Boolean(false).into());
            let version = record_version(versions, node);
            node.properties.insert(
                JCR_BASE_VERSION.into(),
                StoreValue::Name(version.name.clone()).into(),
            );
            debug!(workspace = %self.workspace, path, version = %version.name, "checked in");
            Ok(version)
        })
    }

    fn checkpoint(&self, path: &str) -> Result<VersionInfo, StoreError> {
        self.transition(path, |path, node, versions, pending| {
            if checked_out_flag(node) == Some(false) {
                return Err(StoreError::CheckedIn(path.to_string()));
            }
            ensure_no_pending(path, pending)?;
            let version = record_version(versions, node);
            node.properties.insert(
                JCR_BASE_VERSION.into(),
                StoreValue::Name(version.name.clone()).into(),
            );
            debug!(workspace = %self.workspace, path, version = %version.name, "checkpoint");
            Ok(version)
        })
    }

    fn version_history(&self, path: &str) -> Result<Vec<VersionInfo>, StoreError> {
        let identifier = self.identifier(path)?;
        let repository = self.shared.state.read();
        Ok(repository
            .workspace(&self.workspace)?
            .versions
            .get(&identifier)
            .cloned()
            .unwrap_or_default())
    }

    fn node_type(&self, name: &str) -> Result<NodeType, StoreError> {
        self.live_state()?;
        self.shared.state.read().node_types.get(name).cloned()
    }

    fn namespaces(&self) -> Result<NamespaceRegistry, StoreError> {
        self.live_state()?;
        Ok(self.shared.state.read().namespaces.clone())
    }

    fn execute(&self, query: &Query) -> Result<QueryResult, StoreError> {
        let state = self.live_state()?;
        let repository = self.shared.state.read();
        let types = &repository.node_types;
        if !types.contains(&query.selector.node_type) {
            return Err(StoreError::NoSuchNodeType(query.selector.node_type.clone()));
        }
        let mut evaluator = Evaluator::default();
        let paths = state
            .view
            .iter()
            .filter(|(_, node)| has_type(node, types, &query.selector.node_type))
            .filter(|(path, node)| {
                query
                    .constraint
                    .as_ref()
                    .map_or(true, |constraint| {
                        evaluator.matches(constraint, path, &node.properties)
                    })
            })
            .map(|(path, _)| path.clone())
            .collect();
        debug!(workspace = %self.workspace, query = %query, "executed query");
        Ok(QueryResult::new(paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodetype::{MIX_VERSIONABLE, NT_FILE, NT_FOLDER};

    fn repository() -> MemoryRepository {
        MemoryRepository::with_workspaces(&["main"]).unwrap()
    }

    fn string(value: &str) -> PropertyValue {
        StoreValue::String(value.into()).into()
    }

    #[test]
    fn pending_changes_stay_private_until_save() {
        let repository = repository();
        let writer = repository.login("main").unwrap();
        let reader = repository.login("main").unwrap();

        writer.add_node("/", "doc", NT_UNSTRUCTURED).unwrap();
        writer.set_property("/doc", "title", string("draft")).unwrap();
        assert!(writer.has_pending_changes().unwrap());
        assert!(!reader.item_exists("/doc").unwrap());

        writer.save().unwrap();
        assert!(!reader.item_exists("/doc").unwrap());
        reader.refresh(false).unwrap();
        assert_eq!(reader.property("/doc", "title").unwrap(), Some(string("draft")));
    }

    #[test]
    fn refresh_keeps_or_discards_pending_log() {
        let repository = repository();
        let session = repository.login("main").unwrap();
        session.add_node("/", "a", NT_UNSTRUCTURED).unwrap();
        session.refresh(true).unwrap();
        assert!(session.item_exists("/a").unwrap());
        session.refresh(false).unwrap();
        assert!(!session.item_exists("/a").unwrap());
        assert!(!session.has_pending_changes().unwrap());
    }

    #[test]
    fn checked_in_nodes_reject_writes() {
        let repository = repository();
        let session = repository.login("main").unwrap();
        session.add_node("/", "doc", NT_UNSTRUCTURED).unwrap();
        session.add_mixin("/doc", MIX_SIMPLE_VERSIONABLE).unwrap();
        session.save().unwrap();
        assert!(session.is_checked_out("/doc").unwrap());

        let version = session.checkin("/doc").unwrap();
        assert_eq!(version.name, "1.0");
        assert!(!session.is_checked_out("/doc").unwrap());
        let err = session.set_property("/doc", "title", string("x")).unwrap_err();
        assert!(matches!(err, StoreError::CheckedIn(_)));
        assert!(matches!(
            session.checkpoint("/doc").unwrap_err(),
            StoreError::CheckedIn(_)
        ));
        assert_eq!(session.checkin("/doc").unwrap().name, "1.0");

        session.checkout("/doc").unwrap();
        session.set_property("/doc", "title", string("x")).unwrap();
        assert!(matches!(
            session.checkin("/doc").unwrap_err(),
            StoreError::PendingChanges(_)
        ));
        session.save().unwrap();
        assert_eq!(session.checkpoint("/doc").unwrap().name, "1.1");
        assert!(session.is_checked_out("/doc").unwrap());
        assert_eq!(session.version_history("/doc").unwrap().len(), 2);
    }

    #[test]
    fn versioning_requires_versionable_node() {
        let repository = repository();
        let session = repository.login("main").unwrap();
        session.add_node("/", "plain", NT_UNSTRUCTURED).unwrap();
        session.save().unwrap();
        assert!(matches!(
            session.checkout("/plain").unwrap_err(),
            StoreError::NotVersionable(_)
        ));
        assert!(session.property("/plain", JCR_IS_CHECKED_OUT).unwrap().is_none());
    }

    #[test]
    fn protected_properties_and_autocreated_values() {
        let repository = repository();
        let session = repository.login("main").unwrap();
        session.add_node("/", "folder", NT_FOLDER).unwrap();
        session.add_node("/folder", "file", NT_FILE).unwrap();
        session.add_mixin("/folder/file", MIX_VERSIONABLE).unwrap();
        assert!(session.property("/folder", JCR_CREATED).unwrap().is_some());
        assert!(session.property("/folder/file", JCR_UUID).unwrap().is_some());
        assert!(matches!(
            session
                .set_property("/folder/file", JCR_IS_CHECKED_OUT, StoreValue::Boolean(false).into())
                .unwrap_err(),
            StoreError::Protected(_)
        ));
        assert!(matches!(
            session.add_node("/", "bad", MIX_VERSIONABLE).unwrap_err(),
            StoreError::NotPrimary(_)
        ));
        assert_eq!(session.child_names("/").unwrap(), vec!["folder".to_string()]);
    }

    #[test]
    fn save_is_all_or_nothing() {
        let repository = repository();
        let first = repository.login("main").unwrap();
        let second = repository.login("main").unwrap();
        first.add_node("/", "a", NT_UNSTRUCTURED).unwrap();
        second.add_node("/", "a", NT_UNSTRUCTURED).unwrap();
        second.add_node("/", "b", NT_UNSTRUCTURED).unwrap();
        first.save().unwrap();

        assert!(matches!(second.save().unwrap_err(), StoreError::ItemExists(_)));
        let observer = repository.login("main").unwrap();
        assert!(!observer.item_exists("/b").unwrap());
    }

    #[test]
    fn logged_out_sessions_fail_fast() {
        let repository = repository();
        let session = repository.login("main").unwrap();
        session.logout();
        assert!(!session.is_live());
        assert!(matches!(
            session.item_exists("/").unwrap_err(),
            StoreError::LoggedOut(_)
        ));
        assert!(matches!(
            repository.login("missing").err(),
            Some(StoreError::NoSuchWorkspace(_))
        ));
    }

    #[test]
    fn remove_node_drops_subtree() {
        let repository = repository();
        let session = repository.login("main").unwrap();
        session.add_node("/", "a", NT_UNSTRUCTURED).unwrap();
        session.add_node("/a", "b", NT_UNSTRUCTURED).unwrap();
        session.add_node("/", "ab", NT_UNSTRUCTURED).unwrap();
        session.remove_node("/a").unwrap();
        assert!(!session.item_exists("/a/b").unwrap());
        assert!(session.item_exists("/ab").unwrap());
    }
}
