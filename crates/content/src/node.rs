//! A backing node seen as content.
//!
//! A [`ContentNode`] is only an address: `(provider workspace, path)` plus the
//! content session it is read through. The native handle is cached for as
//! long as the same thread keeps calling; any other thread re-resolves it
//! through the session adapter, which refreshes that thread's view first.
//!
//! Every mutation goes through open-for-edit, is applied on the write
//! session and committed right away.
//!
//! 以內容形式存取的後端節點。

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use vellum_model::{
    ns, parse_prefixed, to_prefixed, AttrValue, NamespaceRegistry, QName, StandardName,
};
use vellum_store::nodetype::{NT_FILE, NT_FOLDER, NT_RESOURCE, NT_UNSTRUCTURED};
use vellum_store::{
    paths, BackingSession, NodeHandle, PropertyType, PropertyValue, StoreError, StoreValue,
    JCR_IS_CHECKED_OUT,
};

use crate::codec;
use crate::error::{ContentError, StoreContext, ValidationError};
use crate::keys::{
    self, AttrKey, DEFAULT_CONTENT_TYPE, JCR_CONTENT, JCR_DATA, JCR_ENCODING, JCR_MIME_TYPE,
};
use crate::provider::ContentProvider;
use crate::session::ContentSession;

/// Content addressed by workspace path.
/// 以工作區路徑定位的內容節點。
pub struct ContentNode {
    provider: ContentProvider,
    session: Arc<ContentSession>,
    path: String,
    cached: Mutex<Option<(ThreadId, NodeHandle)>>,
}

enum Write {
    ContentType(String),
    Property(String, PropertyValue),
}

impl ContentNode {
    pub(crate) fn new(provider: ContentProvider, session: Arc<ContentSession>, path: String) -> Self {
        Self {
            provider,
            session,
            path,
            cached: Mutex::new(None),
        }
    }

    fn at_path(&self, path: impl Into<String>) -> Self {
        Self::new(self.provider.clone(), Arc::clone(&self.session), path.into())
    }

    pub fn provider(&self) -> &ContentProvider {
        &self.provider
    }

    pub fn session(&self) -> &Arc<ContentSession> {
        &self.session
    }

    pub fn workspace(&self) -> &str {
        self.provider.workspace()
    }

    /// Path inside the workspace.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path under the provider's mount point.
    pub fn content_path(&self) -> String {
        if self.path == paths::ROOT {
            self.provider.mount_path().to_string()
        } else {
            format!("{}{}", self.provider.mount_path(), self.path)
        }
    }

    /// Depth in the content tree, counting the mount point segments.
    pub fn depth(&self) -> usize {
        paths::depth(self.provider.mount_path()) + paths::depth(&self.path)
    }

    /// The workspace root is named after the workspace.
    pub fn name(&self) -> Result<QName, ContentError> {
        if self.path == paths::ROOT {
            return Ok(QName::unqualified(self.workspace()));
        }
        let namespaces = self.provider.namespaces()?;
        Ok(parse_prefixed(&namespaces, paths::name(&self.path))?)
    }

    /// Parent inside the workspace. The workspace root has none.
    pub fn parent(&self) -> Option<ContentNode> {
        paths::parent(&self.path).map(|parent| self.at_path(parent))
    }

    fn backing(&self) -> Result<Arc<dyn BackingSession>, ContentError> {
        self.provider.backing_session(&self.session, self.workspace())
    }

    fn resolve(&self) -> Result<NodeHandle, ContentError> {
        NodeHandle::resolve(self.backing()?, &self.path).at(self.workspace(), &self.path)
    }

    /// Native handle on the calling thread's read session.
    fn handle(&self) -> Result<NodeHandle, ContentError> {
        self.session.ensure_open()?;
        if !self.provider.config().node_caching {
            return self.resolve();
        }
        let current = thread::current().id();
        let mut cached = self.cached.lock();
        if let Some((thread, handle)) = cached.as_ref() {
            if *thread == current {
                return Ok(handle.clone());
            }
        }
        let handle = self.resolve()?;
        *cached = Some((current, handle.clone()));
        Ok(handle)
    }

    fn forget(&self) {
        *self.cached.lock() = None;
    }

    pub fn exists(&self) -> Result<bool, ContentError> {
        self.session.ensure_open()?;
        self.backing()?
            .item_exists(&self.path)
            .at(self.workspace(), &self.path)
    }

    /// Identifier of the backing node.
    pub fn session_local_id(&self) -> Result<String, ContentError> {
        self.handle()?.identifier().at(self.workspace(), &self.path)
    }

    fn namespaces(&self) -> Result<NamespaceRegistry, ContentError> {
        self.provider.namespaces()
    }

    fn resolve_key(&self, key: &QName) -> Result<AttrKey, ContentError> {
        keys::resolve(&self.namespaces()?, key)
    }

    /// Reads an attribute. Standard names are mapped to their backing
    /// properties; the checked-in/checked-out flags are absent on nodes
    /// without versioning state.
    pub fn get(&self, key: &QName) -> Result<Option<AttrValue>, ContentError> {
        let node = self.handle()?;
        let workspace = self.workspace();
        match self.resolve_key(key)? {
            AttrKey::Property(name) => node
                .property(&name)
                .at(workspace, &self.path)?
                .map(|value| codec::from_store(&value))
                .transpose()
                .map_err(ContentError::from),
            AttrKey::ContentType => Ok(self.read_content_type(&node)?.map(AttrValue::String)),
            AttrKey::CheckedOut => Ok(versioning_flag(&node, workspace)?
                .filter(|checked_out| *checked_out)
                .map(AttrValue::Boolean)),
            AttrKey::CheckedIn => Ok(versioning_flag(&node, workspace)?
                .filter(|checked_out| !*checked_out)
                .map(|_| AttrValue::Boolean(true))),
        }
    }

    fn read_content_type(&self, node: &NodeHandle) -> Result<Option<String>, ContentError> {
        let workspace = self.workspace();
        if !node.is_node_type(NT_FILE).at(workspace, &self.path)? {
            return Ok(None);
        }
        let stored = match node.child(JCR_CONTENT) {
            Ok(body) => stored_content_type(&body, workspace)?,
            Err(StoreError::PathNotFound(_)) => None,
            Err(err) => return Err(ContentError::store(workspace, &self.path, err)),
        };
        Ok(Some(stored.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())))
    }

    /// Attribute keys present on the node, backing names mapped back to
    /// standard names where one applies.
    pub fn keys(&self) -> Result<Vec<QName>, ContentError> {
        let node = self.handle()?;
        let properties = node.properties().at(self.workspace(), &self.path)?;
        let flag = properties
            .get(JCR_IS_CHECKED_OUT)
            .and_then(PropertyValue::single)
            .and_then(StoreValue::as_bool);
        let namespaces = self.namespaces()?;
        let mut names = BTreeSet::new();
        for name in properties.keys() {
            names.insert(keys::attribute_name(&namespaces, name, flag)?);
        }
        Ok(names.into_iter().collect())
    }

    pub fn contains_key(&self, key: &QName) -> Result<bool, ContentError> {
        match self.resolve_key(key)? {
            AttrKey::Property(name) => self
                .handle()?
                .has_property(&name)
                .at(self.workspace(), &self.path),
            _ => Ok(self.get(key)?.is_some()),
        }
    }

    pub fn is_multiple(&self, key: &QName) -> Result<bool, ContentError> {
        match self.resolve_key(key)? {
            AttrKey::Property(name) => Ok(self
                .handle()?
                .property(&name)
                .at(self.workspace(), &self.path)?
                .is_some_and(|value| value.is_multiple())),
            _ => Ok(false),
        }
    }

    /// Backing type of an attribute, if present.
    pub fn attribute_type(&self, key: &QName) -> Result<Option<PropertyType>, ContentError> {
        Ok(match self.resolve_key(key)? {
            AttrKey::Property(name) => self
                .handle()?
                .property(&name)
                .at(self.workspace(), &self.path)?
                .map(|value| value.property_type()),
            AttrKey::ContentType => self.get(key)?.map(|_| PropertyType::String),
            AttrKey::CheckedIn | AttrKey::CheckedOut => {
                self.get(key)?.map(|_| PropertyType::Boolean)
            }
        })
    }

    /// Primary class, then the collection marker for folders, then mixins
    /// and every supertype of the primary type and mixins in name order.
    pub fn content_classes(&self) -> Result<Vec<QName>, ContentError> {
        let node = self.handle()?;
        let workspace = self.workspace();
        let namespaces = self.namespaces()?;
        let primary = node.primary_type().at(workspace, &self.path)?;
        let mixins = node.mixins().at(workspace, &self.path)?;

        let mut classes = vec![parse_prefixed(&namespaces, &primary)?];
        if primary == NT_FOLDER {
            classes.push(StandardName::Collection.qname());
        }

        let mut secondary = BTreeSet::new();
        for mixin in &mixins {
            secondary.insert(parse_prefixed(&namespaces, mixin)?);
        }
        for node_type in std::iter::once(&primary).chain(mixins.iter()) {
            for supertype in supertypes(&**node.session(), node_type)
                .at(workspace, &self.path)?
            {
                if supertype != primary {
                    secondary.insert(parse_prefixed(&namespaces, &supertype)?);
                }
            }
        }
        classes.extend(secondary);
        Ok(classes)
    }

    /// Children in name order, materialized one at a time.
    pub fn children(&self) -> Result<Children, ContentError> {
        let names = self
            .handle()?
            .child_names()
            .at(self.workspace(), &self.path)?;
        let paths: Vec<String> = names
            .iter()
            .map(|name| paths::join(&self.path, name))
            .collect();
        Ok(Children {
            provider: self.provider.clone(),
            session: Arc::clone(&self.session),
            paths: paths.into_iter().collect(),
            current: None,
        })
    }

    /// Body of a file node. Empty when no data was written yet.
    pub fn read_data(&self) -> Result<Vec<u8>, ContentError> {
        let node = self.handle()?;
        let body = self.file_body(&node)?;
        match body.property(JCR_DATA).at(self.workspace(), body.path())? {
            None => Ok(Vec::new()),
            Some(PropertyValue::Single(StoreValue::Binary(data))) => Ok(data),
            Some(other) => Err(ValidationError::UnsupportedValue(format!(
                "{JCR_DATA} holds a {} value",
                other.property_type()
            ))
            .into()),
        }
    }

    fn file_body(&self, node: &NodeHandle) -> Result<NodeHandle, ContentError> {
        let workspace = self.workspace();
        if !node.is_node_type(NT_FILE).at(workspace, &self.path)? {
            return Err(ValidationError::NotAFile(self.path.clone()).into());
        }
        node.child(JCR_CONTENT).at(workspace, &self.path)
    }

    /*
     * WRITE
     */

    fn edit(&self) -> Result<NodeHandle, ContentError> {
        self.provider.edit(&self.session, &self.path)
    }

    /// Commits the write session, then refreshes this thread's read session.
    fn save_edited(&self, node: &NodeHandle) -> Result<(), ContentError> {
        let workspace = self.workspace();
        node.session().save().at(workspace, &self.path)?;
        self.backing()?.refresh(true).at(workspace, &self.path)
    }

    /// Writes an attribute and returns the previous value.
    pub fn put(
        &self,
        key: &QName,
        value: impl Into<AttrValue>,
    ) -> Result<Option<AttrValue>, ContentError> {
        let value = value.into();
        let write = match self.resolve_key(key)? {
            AttrKey::CheckedIn | AttrKey::CheckedOut => {
                return Err(ValidationError::ReadOnlyAttribute(key.clone()).into())
            }
            AttrKey::ContentType => {
                if !self
                    .handle()?
                    .is_node_type(NT_FILE)
                    .at(self.workspace(), &self.path)?
                {
                    return Err(ValidationError::NotAFile(self.path.clone()).into());
                }
                Write::ContentType(match &value {
                    AttrValue::String(text) => text.clone(),
                    AttrValue::List(_) => {
                        return Err(ValidationError::UnsupportedValue(
                            "content type must be a single value".to_string(),
                        )
                        .into())
                    }
                    other => other.to_string(),
                })
            }
            AttrKey::Property(name) => Write::Property(name, codec::to_store(&value)?),
        };

        let node = self.edit()?;
        let workspace = self.workspace();
        let previous = match write {
            Write::ContentType(content_type) => {
                let body = self.file_body(&node)?;
                let previous = stored_content_type(&body, workspace)?;
                let (mime_type, encoding) = keys::split_content_type(&content_type);
                body.set_property(JCR_MIME_TYPE, StoreValue::String(mime_type).into())
                    .at(workspace, body.path())?;
                match encoding {
                    Some(encoding) => {
                        body.set_property(JCR_ENCODING, StoreValue::String(encoding).into())
                            .at(workspace, body.path())?;
                    }
                    None => {
                        body.remove_property(JCR_ENCODING)
                            .at(workspace, body.path())?;
                    }
                }
                previous.map(AttrValue::String)
            }
            Write::Property(name, stored) => {
                let previous = self.previous_value(&node, &name)?;
                node.set_property(&name, stored).at(workspace, &self.path)?;
                previous
            }
        };
        self.save_edited(&node)?;
        Ok(previous)
    }

    /// Decodes the value about to be replaced, before anything is written.
    fn previous_value(
        &self,
        node: &NodeHandle,
        name: &str,
    ) -> Result<Option<AttrValue>, ContentError> {
        Ok(node
            .property(name)
            .at(self.workspace(), &self.path)?
            .map(|previous| codec::from_store(&previous))
            .transpose()?)
    }

    /// Removes an attribute and returns its previous value.
    pub fn remove_attr(&self, key: &QName) -> Result<Option<AttrValue>, ContentError> {
        let attr = self.resolve_key(key)?;
        if matches!(attr, AttrKey::CheckedIn | AttrKey::CheckedOut) {
            return Err(ValidationError::ReadOnlyAttribute(key.clone()).into());
        }
        let node = self.edit()?;
        let workspace = self.workspace();
        let previous = match attr {
            AttrKey::Property(name) => {
                let previous = self.previous_value(&node, &name)?;
                node.remove_property(&name).at(workspace, &self.path)?;
                previous
            }
            _ => {
                let body = self.file_body(&node)?;
                let previous = stored_content_type(&body, workspace)?;
                for name in [JCR_MIME_TYPE, JCR_ENCODING] {
                    body.remove_property(name).at(workspace, body.path())?;
                }
                previous.map(AttrValue::String)
            }
        };
        self.save_edited(&node)?;
        Ok(previous)
    }

    /// Removes this node. The parent is opened for edit, since that is the
    /// node whose children change.
    pub fn remove(&self) -> Result<(), ContentError> {
        let parent = paths::parent(&self.path)
            .ok_or_else(|| ValidationError::InvalidPath(self.path.clone()))?;
        let node = self.provider.edit(&self.session, parent)?;
        node.session()
            .remove_node(&self.path)
            .at(self.workspace(), &self.path)?;
        self.save_edited(&node)?;
        self.forget();
        Ok(())
    }

    /// Adds a child. The first class is the primary type and the others are
    /// mixins; with no class the child is unstructured. A file gets an empty
    /// body node.
    pub fn add(&self, name: &QName, classes: &[QName]) -> Result<ContentNode, ContentError> {
        let namespaces = self.namespaces()?;
        let child_name = to_prefixed(&namespaces, name)?;
        let (primary, mixins) = match classes.split_first() {
            Some((primary, mixins)) => (
                to_prefixed(&namespaces, primary)?,
                mixins
                    .iter()
                    .map(|mixin| to_prefixed(&namespaces, mixin))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => (NT_UNSTRUCTURED.to_string(), Vec::new()),
        };

        let node = self.edit()?;
        let workspace = self.workspace();
        let child = node
            .add_node(&child_name, &primary)
            .at(workspace, &self.path)?;
        for mixin in &mixins {
            child.add_mixin(mixin).at(workspace, child.path())?;
        }
        if child.is_node_type(NT_FILE).at(workspace, child.path())? {
            let body = child
                .add_node(JCR_CONTENT, NT_RESOURCE)
                .at(workspace, child.path())?;
            body.set_property(JCR_DATA, StoreValue::Binary(Vec::new()).into())
                .at(workspace, body.path())?;
        }
        self.save_edited(&node)?;
        Ok(self.at_path(child.path()))
    }

    /// Adds a child and writes `attributes` on it. A content type makes it a
    /// file and the collection marker makes it a folder.
    pub fn add_with_attributes(
        &self,
        name: &QName,
        attributes: &BTreeMap<QName, AttrValue>,
        classes: &[QName],
    ) -> Result<ContentNode, ContentError> {
        let content_type = StandardName::ContentType.qname();
        let collection = StandardName::Collection.qname();
        let implied = match (
            attributes.contains_key(&content_type),
            attributes.contains_key(&collection),
        ) {
            (true, true) => return Err(ValidationError::ConflictingClasses.into()),
            (true, false) => Some(QName::new(ns::NT, "file")),
            (false, true) => Some(QName::new(ns::NT, "folder")),
            (false, false) => None,
        };
        let mut all = Vec::with_capacity(classes.len() + 1);
        if let Some(implied) = &implied {
            all.push(implied.clone());
        }
        all.extend(
            classes
                .iter()
                .filter(|class| Some(*class) != implied.as_ref())
                .cloned(),
        );

        let child = self.add(name, &all)?;
        for (key, value) in attributes {
            if *key != collection {
                child.put(key, value.clone())?;
            }
        }
        Ok(child)
    }

    /// Adds mixin classes. Every class must be a mixin.
    pub fn add_content_classes(&self, classes: &[QName]) -> Result<(), ContentError> {
        let namespaces = self.namespaces()?;
        let backing = self.backing()?;
        let workspace = self.workspace();
        let mut mixins = Vec::with_capacity(classes.len());
        for class in classes {
            let name = to_prefixed(&namespaces, class)?;
            if !backing.node_type(&name).at(workspace, &self.path)?.mixin {
                return Err(ValidationError::NotMixin(class.clone()).into());
            }
            mixins.push(name);
        }

        let node = self.edit()?;
        for mixin in &mixins {
            node.add_mixin(mixin).at(workspace, &self.path)?;
        }
        self.save_edited(&node)
    }

    /// Replaces the body of a file node.
    pub fn write_data(&self, data: &[u8]) -> Result<(), ContentError> {
        let node = self.edit()?;
        let body = self.file_body(&node)?;
        body.set_property(JCR_DATA, StoreValue::Binary(data.to_vec()).into())
            .at(self.workspace(), body.path())?;
        self.save_edited(&node)
    }
}

impl Clone for ContentNode {
    fn clone(&self) -> Self {
        self.at_path(self.path.clone())
    }
}

impl fmt::Debug for ContentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentNode")
            .field("workspace", &self.workspace())
            .field("path", &self.path)
            .field("session", self.session.id())
            .finish()
    }
}

fn versioning_flag(node: &NodeHandle, workspace: &str) -> Result<Option<bool>, ContentError> {
    Ok(node
        .property(JCR_IS_CHECKED_OUT)
        .at(workspace, node.path())?
        .as_ref()
        .and_then(PropertyValue::single)
        .and_then(StoreValue::as_bool))
}

/// `type;encoding=value` as stored on a file body, if a MIME type is set.
fn stored_content_type(body: &NodeHandle, workspace: &str) -> Result<Option<String>, ContentError> {
    let text = |name: &str| -> Result<Option<String>, ContentError> {
        Ok(body
            .property(name)
            .at(workspace, body.path())?
            .as_ref()
            .and_then(PropertyValue::single)
            .and_then(StoreValue::as_str)
            .map(str::to_string))
    };
    match text(JCR_MIME_TYPE)? {
        Some(mime_type) => Ok(Some(keys::join_content_type(
            &mime_type,
            text(JCR_ENCODING)?.as_deref(),
        ))),
        None => Ok(None),
    }
}

/// Every supertype of `node_type`, nearest first.
fn supertypes(
    session: &dyn BackingSession,
    node_type: &str,
) -> Result<Vec<String>, StoreError> {
    let mut seen = BTreeSet::new();
    let mut found = Vec::new();
    let mut queue: VecDeque<String> = session.node_type(node_type)?.supertypes.into();
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        queue.extend(session.node_type(&name)?.supertypes);
        found.push(name);
    }
    Ok(found)
}

/// Forward-only iteration over the children of a node.
pub struct Children {
    provider: ContentProvider,
    session: Arc<ContentSession>,
    paths: VecDeque<String>,
    current: Option<ContentNode>,
}

impl Children {
    /// Removes the backing node last returned by `next`.
    pub fn remove_current(&mut self) -> Result<(), ContentError> {
        match self.current.take() {
            Some(current) => current.remove(),
            None => Ok(()),
        }
    }
}

impl Iterator for Children {
    type Item = ContentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.pop_front()?;
        let node = ContentNode::new(self.provider.clone(), Arc::clone(&self.session), path);
        self.current = Some(node.clone());
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.paths.len(), Some(self.paths.len()))
    }
}

impl ExactSizeIterator for Children {}
