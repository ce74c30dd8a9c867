//! Exposes one workspace of a backing store as content.
//!
//! The provider is mounted at a path whose last segment names the workspace.
//! Each content session gets its own [`SessionAdapter`], created on first use
//! and torn down when the session closes.
//!
//! 將後端儲存的一個工作區掛載為內容。

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use vellum_model::{Constraint, NamespaceContext, NamespaceRegistry};
use vellum_store::{paths, BackingSession, NodeHandle, Repository};

use crate::adapter::SessionAdapter;
use crate::compiler;
use crate::config::{ProviderConfig, SearchScope};
use crate::error::{ContentError, StateError, StoreContext, ValidationError};
use crate::node::ContentNode;
use crate::registry::AdapterRegistry;
use crate::session::ContentSession;

struct ProviderInner {
    repository: Arc<dyn Repository>,
    config: ProviderConfig,
    workspace: String,
    admin: RwLock<Option<Arc<dyn BackingSession>>>,
    adapters: Arc<AdapterRegistry>,
}

/// Content provider over a single workspace.
/// 單一工作區的內容提供者。
#[derive(Clone)]
pub struct ContentProvider {
    inner: Arc<ProviderInner>,
}

impl ContentProvider {
    /// Opens the admin session and starts serving `config.mount_path`.
    pub fn start(
        repository: Arc<dyn Repository>,
        mut config: ProviderConfig,
    ) -> Result<Self, ContentError> {
        config.sanitize();
        let workspace = config
            .workspace()
            .map_err(|_| ValidationError::InvalidMountPath(config.mount_path.clone()))?
            .to_string();
        let admin = repository.login(&workspace).at(&workspace, paths::ROOT)?;
        info!(mount_path = %config.mount_path, workspace = %workspace, "started content provider");
        Ok(Self {
            inner: Arc::new(ProviderInner {
                repository,
                config,
                workspace,
                admin: RwLock::new(Some(admin)),
                adapters: Arc::new(AdapterRegistry::new()),
            }),
        })
    }

    /// Logs out the admin session and closes every session adapter.
    pub fn stop(&self) {
        let admin = self.inner.admin.write().take();
        if let Some(admin) = admin {
            admin.logout();
            self.inner.adapters.close_all();
            info!(mount_path = %self.inner.config.mount_path, "stopped content provider");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.admin.read().is_some()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    pub fn mount_path(&self) -> &str {
        &self.inner.config.mount_path
    }

    pub fn workspace(&self) -> &str {
        &self.inner.workspace
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.inner.adapters
    }

    fn admin(&self) -> Result<Arc<dyn BackingSession>, ContentError> {
        self.inner
            .admin
            .read()
            .clone()
            .ok_or_else(|| StateError::ProviderStopped.into())
    }

    /// Namespace table, read through the admin session.
    pub fn namespaces(&self) -> Result<NamespaceRegistry, ContentError> {
        self.admin()?
            .namespaces()
            .at(&self.inner.workspace, paths::ROOT)
    }

    /// Session adapter of `session`, created on first use.
    pub fn adapter(&self, session: &ContentSession) -> Result<Arc<SessionAdapter>, ContentError> {
        session.ensure_open()?;
        if !self.is_running() {
            return Err(StateError::ProviderStopped.into());
        }
        let (adapter, created) = self.inner.adapters.get_or_insert_with(session.id(), || {
            SessionAdapter::new(Arc::clone(&self.inner.repository), session.id().clone())
        });
        if created {
            debug!(session = %session.id(), "created session adapter");
            let registry = Arc::downgrade(&self.inner.adapters);
            session.on_close(move |id| {
                if let Some(adapter) = registry.upgrade().and_then(|registry| registry.remove(id)) {
                    adapter.close();
                }
            });
        }
        Ok(adapter)
    }

    /// Read session of `session` on `workspace` for the calling thread.
    pub fn backing_session(
        &self,
        session: &ContentSession,
        workspace: &str,
    ) -> Result<Arc<dyn BackingSession>, ContentError> {
        self.adapter(session)?.session(workspace)
    }

    /// Workspace path for a path relative to the mount point.
    fn store_path(&self, relative: &str) -> Result<String, ContentError> {
        paths::normalize(&format!("/{}", relative.trim_start_matches('/')))
            .map_err(|_| ValidationError::InvalidPath(relative.to_string()).into())
    }

    pub fn get(
        &self,
        session: &Arc<ContentSession>,
        relative: &str,
    ) -> Result<ContentNode, ContentError> {
        let path = self.store_path(relative)?;
        if !self.exists_at(session, &path)? {
            return Err(ContentError::NotFound {
                workspace: self.inner.workspace.clone(),
                path,
            });
        }
        Ok(ContentNode::new(self.clone(), Arc::clone(session), path))
    }

    pub fn exists(&self, session: &ContentSession, relative: &str) -> Result<bool, ContentError> {
        let path = self.store_path(relative)?;
        self.exists_at(session, &path)
    }

    fn exists_at(&self, session: &ContentSession, path: &str) -> Result<bool, ContentError> {
        let workspace = &self.inner.workspace;
        self.backing_session(session, workspace)?
            .item_exists(path)
            .at(workspace, path)
    }

    /// Opens `path` for edit and records the pending modification on the
    /// content session.
    pub(crate) fn edit(
        &self,
        session: &ContentSession,
        path: &str,
    ) -> Result<NodeHandle, ContentError> {
        session.ensure_editing()?;
        let workspace = &self.inner.workspace;
        let node = self.adapter(session)?.open_for_edit(workspace, path)?;
        session.notify_modification(workspace, node.path());
        Ok(node)
    }

    pub fn open_for_edit(&self, session: &ContentSession, relative: &str) -> Result<(), ContentError> {
        let path = self.store_path(relative)?;
        self.edit(session, &path).map(drop)
    }

    pub fn freeze(&self, session: &ContentSession, relative: &str) -> Result<(), ContentError> {
        let path = self.store_path(relative)?;
        session.ensure_editing()?;
        self.adapter(session)?.freeze(&self.inner.workspace, &path)
    }

    pub fn is_open_for_edit(
        &self,
        session: &ContentSession,
        relative: &str,
    ) -> Result<bool, ContentError> {
        let path = self.store_path(relative)?;
        self.adapter(session)?
            .is_open_for_edit(&self.inner.workspace, &path)
    }

    /// Ends the edit cycle of `session`. See [`SessionAdapter::persist`].
    pub fn persist(&self, session: &ContentSession) -> Result<(), ContentError> {
        self.adapter(session)?.persist()?;
        session.clear_modified();
        Ok(())
    }

    /// Runs a constraint-tree search, optionally restricted to `scope`.
    pub fn search(
        &self,
        session: &Arc<ContentSession>,
        constraint: &Constraint,
        scope: Option<&str>,
    ) -> Result<SearchResults, ContentError> {
        let workspace = &self.inner.workspace;
        let adapter = self.adapter(session)?;
        let backing = match self.inner.config.search_scope {
            SearchScope::Session => adapter.session(workspace)?,
            SearchScope::Admin => {
                adapter.ensure_open()?;
                let admin = self.admin()?;
                admin.refresh(false).at(workspace, paths::ROOT)?;
                admin
            }
        };
        let namespaces = self.namespaces()?;
        let query = compiler::compile(&namespaces, constraint, scope)?;
        let result = backing
            .execute(&query)
            .at(workspace, scope.unwrap_or(paths::ROOT))?;
        debug!(session = %session.id(), hits = result.len(), "search done");
        Ok(SearchResults {
            provider: self.clone(),
            session: Arc::clone(session),
            paths: result.into_iter(),
        })
    }
}

impl NamespaceContext for ContentProvider {
    fn namespace_uri(&self, prefix: &str) -> Option<String> {
        self.namespaces().ok()?.namespace_uri(prefix)
    }

    fn prefix(&self, namespace_uri: &str) -> Option<String> {
        self.namespaces().ok()?.prefix(namespace_uri)
    }
}

impl fmt::Debug for ContentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentProvider")
            .field("mount_path", &self.inner.config.mount_path)
            .field("workspace", &self.inner.workspace)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Forward-only search hits. Each node is built only when pulled.
#[derive(Debug)]
pub struct SearchResults {
    provider: ContentProvider,
    session: Arc<ContentSession>,
    paths: std::vec::IntoIter<String>,
}

impl Iterator for SearchResults {
    type Item = ContentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(ContentNode::new(
            self.provider.clone(),
            Arc::clone(&self.session),
            path,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for SearchResults {}
