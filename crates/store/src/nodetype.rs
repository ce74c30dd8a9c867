use std::collections::{BTreeMap, BTreeSet, VecDeque};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const NT_BASE: &str = "nt:base";
pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
pub const NT_HIERARCHY_NODE: &str = "nt:hierarchyNode";
pub const NT_FILE: &str = "nt:file";
pub const NT_FOLDER: &str = "nt:folder";
pub const NT_RESOURCE: &str = "nt:resource";
pub const MIX_CREATED: &str = "mix:created";
pub const MIX_LAST_MODIFIED: &str = "mix:lastModified";
pub const MIX_MIME_TYPE: &str = "mix:mimeType";
pub const MIX_REFERENCEABLE: &str = "mix:referenceable";
pub const MIX_SIMPLE_VERSIONABLE: &str = "mix:simpleVersionable";
pub const MIX_VERSIONABLE: &str = "mix:versionable";
pub const MIX_TITLE: &str = "mix:title";

/// Declared node type: name, mixin flag and direct supertypes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,
    #[serde(default)]
    pub mixin: bool,
    #[serde(default)]
    pub supertypes: Vec<String>,
}

impl NodeType {
    pub fn primary(name: impl Into<String>, supertypes: &[&str]) -> Self {
        Self {
            name: name.into(),
            mixin: false,
            supertypes: supertypes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn mixin(name: impl Into<String>, supertypes: &[&str]) -> Self {
        Self {
            name: name.into(),
            mixin: true,
            supertypes: supertypes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

static BUILTIN_TYPES: Lazy<Vec<NodeType>> = Lazy::new(|| {
    vec![
        NodeType::primary(NT_BASE, &[]),
        NodeType::primary(NT_UNSTRUCTURED, &[NT_BASE]),
        NodeType::mixin(MIX_CREATED, &[]),
        NodeType::mixin(MIX_LAST_MODIFIED, &[]),
        NodeType::mixin(MIX_MIME_TYPE, &[]),
        NodeType::mixin(MIX_REFERENCEABLE, &[]),
        NodeType::mixin(MIX_SIMPLE_VERSIONABLE, &[]),
        NodeType::mixin(MIX_VERSIONABLE, &[MIX_SIMPLE_VERSIONABLE, MIX_REFERENCEABLE]),
        NodeType::mixin(MIX_TITLE, &[]),
        NodeType::primary(NT_HIERARCHY_NODE, &[NT_BASE, MIX_CREATED]),
        NodeType::primary(NT_FILE, &[NT_HIERARCHY_NODE]),
        NodeType::primary(NT_FOLDER, &[NT_HIERARCHY_NODE]),
        NodeType::primary(NT_RESOURCE, &[NT_BASE, MIX_MIME_TYPE, MIX_LAST_MODIFIED]),
    ]
});

/// Node type table with supertype resolution.
/// 節點型別表，支援超型別推導。
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    types: BTreeMap<String, NodeType>,
}

impl NodeTypeRegistry {
    pub fn with_builtins() -> Self {
        Self {
            types: BUILTIN_TYPES
                .iter()
                .map(|node_type| (node_type.name.clone(), node_type.clone()))
                .collect(),
        }
    }

    /// Registers a custom type. All supertypes must already be known.
    pub fn register(&mut self, node_type: NodeType) -> Result<(), StoreError> {
        if let Some(missing) = node_type
            .supertypes
            .iter()
            .find(|supertype| !self.types.contains_key(supertype.as_str()))
        {
            return Err(StoreError::NoSuchNodeType(missing.clone()));
        }
        self.types.insert(node_type.name.clone(), node_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&NodeType, StoreError> {
        self.types
            .get(name)
            .ok_or_else(|| StoreError::NoSuchNodeType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Every supertype reachable from `name`, breadth first, without duplicates.
    pub fn supertypes(&self, name: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            let Some(node_type) = self.types.get(current) else {
                continue;
            };
            for supertype in &node_type.supertypes {
                if seen.insert(supertype.clone()) {
                    ordered.push(supertype.clone());
                    queue.push_back(supertype);
                }
            }
        }
        ordered
    }

    /// True when `name` is `target` or inherits from it.
    pub fn is_a(&self, name: &str, target: &str) -> bool {
        name == target || self.supertypes(name).iter().any(|s| s == target)
    }

    /// Types added on top of the built-in set.
    pub fn custom_types(&self) -> Vec<NodeType> {
        self.types
            .values()
            .filter(|node_type| !BUILTIN_TYPES.iter().any(|b| b.name == node_type.name))
            .cloned()
            .collect()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supertypes_are_transitive() {
        let registry = NodeTypeRegistry::with_builtins();
        assert_eq!(
            registry.supertypes(NT_FILE),
            vec![NT_HIERARCHY_NODE, NT_BASE, MIX_CREATED]
        );
        assert!(registry.is_a(MIX_VERSIONABLE, MIX_SIMPLE_VERSIONABLE));
        assert!(!registry.is_a(NT_FOLDER, NT_FILE));
    }

    #[test]
    fn custom_types_need_known_supertypes() {
        let mut registry = NodeTypeRegistry::with_builtins();
        let err = registry
            .register(NodeType::primary("ex:doc", &["ex:missing"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchNodeType(name) if name == "ex:missing"));

        registry
            .register(NodeType::primary("ex:doc", &[NT_FILE]))
            .unwrap();
        assert!(registry.is_a("ex:doc", MIX_CREATED));
        assert_eq!(registry.custom_types().len(), 1);
    }
}
