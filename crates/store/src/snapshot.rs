use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vellum_model::NamespaceRegistry;

use crate::nodetype::NodeType;
use crate::session::VersionInfo;
use crate::value::PropertyValue;

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Stored node: identity, types and properties.
/// 儲存的節點：識別碼、型別與屬性。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub identifier: String,
    pub primary_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl NodeState {
    pub fn new(identifier: impl Into<String>, primary_type: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            primary_type: primary_type.into(),
            mixins: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

/// Committed state of one workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub nodes: BTreeMap<String, NodeState>,
    /// Version histories keyed by node identifier.
    #[serde(default)]
    pub versions: BTreeMap<String, Vec<VersionInfo>>,
}

/// Whole-repository snapshot, serialised as JSON.
/// 整個倉儲的快照（JSON 格式）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub format_version: u32,
    #[serde(default)]
    pub namespaces: NamespaceRegistry,
    #[serde(default)]
    pub node_types: Vec<NodeType>,
    #[serde(default)]
    pub next_identifier: u64,
    #[serde(default)]
    pub workspaces: BTreeMap<String, WorkspaceSnapshot>,
}

/// Writes `data` to a sibling temp file, then renames it over `path`.
/// 先寫入同目錄暫存檔，再以 rename 取代目標檔。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_file() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("nested").join("repo.json");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
