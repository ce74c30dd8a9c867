use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vellum_model::NamespaceRegistry;

use crate::error::StoreError;
use crate::nodetype::NodeType;
use crate::paths;
use crate::query::{Query, QueryResult};
use crate::value::PropertyValue;

/// Frozen state recorded by a checkin or checkpoint.
/// 簽入或檢查點時凍結的版本資料。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Entry point of a backing store.
pub trait Repository: Send + Sync {
    /// Opens a session scoped to `workspace`.
    fn login(&self, workspace: &str) -> Result<Arc<dyn BackingSession>, StoreError>;

    fn workspace_names(&self) -> Vec<String>;
}

/// A handle into one workspace of the backing store.
///
/// Names are storage names (`prefix:local`) and paths are absolute. Every
/// call on a logged-out session fails with [`StoreError::LoggedOut`].
pub trait BackingSession: Send + Sync {
    fn workspace(&self) -> &str;
    fn is_live(&self) -> bool;
    fn logout(&self);

    /// Re-reads committed state. With `keep_changes` the pending changes are
    /// replayed on top of it, otherwise they are discarded.
    fn refresh(&self, keep_changes: bool) -> Result<(), StoreError>;
    fn save(&self) -> Result<(), StoreError>;
    fn has_pending_changes(&self) -> Result<bool, StoreError>;

    fn item_exists(&self, path: &str) -> Result<bool, StoreError>;
    fn identifier(&self, path: &str) -> Result<String, StoreError>;
    fn primary_type(&self, path: &str) -> Result<String, StoreError>;
    fn mixins(&self, path: &str) -> Result<Vec<String>, StoreError>;
    fn is_node_type(&self, path: &str, node_type: &str) -> Result<bool, StoreError>;
    fn properties(&self, path: &str) -> Result<BTreeMap<String, PropertyValue>, StoreError>;
    fn property(&self, path: &str, name: &str) -> Result<Option<PropertyValue>, StoreError>;
    fn child_names(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Adds `name` under `parent` and returns the new path.
    fn add_node(&self, parent: &str, name: &str, primary_type: &str)
        -> Result<String, StoreError>;
    fn add_mixin(&self, path: &str, mixin: &str) -> Result<(), StoreError>;
    /// Sets a property and returns the previous value.
    fn set_property(
        &self,
        path: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, StoreError>;
    fn remove_property(&self, path: &str, name: &str)
        -> Result<Option<PropertyValue>, StoreError>;
    fn remove_node(&self, path: &str) -> Result<(), StoreError>;

    fn is_checked_out(&self, path: &str) -> Result<bool, StoreError>;
    fn checkout(&self, path: &str) -> Result<(), StoreError>;
    fn checkin(&self, path: &str) -> Result<VersionInfo, StoreError>;
    fn checkpoint(&self, path: &str) -> Result<VersionInfo, StoreError>;
    fn version_history(&self, path: &str) -> Result<Vec<VersionInfo>, StoreError>;

    fn node_type(&self, name: &str) -> Result<NodeType, StoreError>;
    fn namespaces(&self) -> Result<NamespaceRegistry, StoreError>;
    fn execute(&self, query: &Query) -> Result<QueryResult, StoreError>;
}

/// Live node handle. Every read goes through the owning session, so it
/// always reflects that session's current view.
/// 即時節點控制代碼，所有讀取都透過所屬工作階段。
#[derive(Clone)]
pub struct NodeHandle {
    session: Arc<dyn BackingSession>,
    path: String,
}

impl NodeHandle {
    /// Resolves `path` in `session`; fails when no node exists there.
    pub fn resolve(session: Arc<dyn BackingSession>, path: &str) -> Result<Self, StoreError> {
        let path = paths::normalize(path)?;
        if !session.item_exists(&path)? {
            return Err(StoreError::PathNotFound(path));
        }
        Ok(Self { session, path })
    }

    pub fn session(&self) -> &Arc<dyn BackingSession> {
        &self.session
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        paths::name(&self.path)
    }

    pub fn exists(&self) -> Result<bool, StoreError> {
        self.session.item_exists(&self.path)
    }

    pub fn identifier(&self) -> Result<String, StoreError> {
        self.session.identifier(&self.path)
    }

    pub fn primary_type(&self) -> Result<String, StoreError> {
        self.session.primary_type(&self.path)
    }

    pub fn mixins(&self) -> Result<Vec<String>, StoreError> {
        self.session.mixins(&self.path)
    }

    pub fn is_node_type(&self, node_type: &str) -> Result<bool, StoreError> {
        self.session.is_node_type(&self.path, node_type)
    }

    pub fn properties(&self) -> Result<BTreeMap<String, PropertyValue>, StoreError> {
        self.session.properties(&self.path)
    }

    pub fn property(&self, name: &str) -> Result<Option<PropertyValue>, StoreError> {
        self.session.property(&self.path, name)
    }

    pub fn has_property(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.property(name)?.is_some())
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        paths::parent(&self.path).map(|parent| NodeHandle {
            session: Arc::clone(&self.session),
            path: parent.to_string(),
        })
    }

    pub fn child(&self, name: &str) -> Result<NodeHandle, StoreError> {
        NodeHandle::resolve(Arc::clone(&self.session), &paths::join(&self.path, name))
    }

    pub fn child_names(&self) -> Result<Vec<String>, StoreError> {
        self.session.child_names(&self.path)
    }

    pub fn add_node(&self, name: &str, primary_type: &str) -> Result<NodeHandle, StoreError> {
        let path = self.session.add_node(&self.path, name, primary_type)?;
        Ok(NodeHandle {
            session: Arc::clone(&self.session),
            path,
        })
    }

    pub fn add_mixin(&self, mixin: &str) -> Result<(), StoreError> {
        self.session.add_mixin(&self.path, mixin)
    }

    pub fn set_property(
        &self,
        name: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, StoreError> {
        self.session.set_property(&self.path, name, value)
    }

    pub fn remove_property(&self, name: &str) -> Result<Option<PropertyValue>, StoreError> {
        self.session.remove_property(&self.path, name)
    }

    pub fn remove(&self) -> Result<(), StoreError> {
        self.session.remove_node(&self.path)
    }

    pub fn is_checked_out(&self) -> Result<bool, StoreError> {
        self.session.is_checked_out(&self.path)
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("workspace", &self.session.workspace())
            .field("path", &self.path)
            .finish()
    }
}
