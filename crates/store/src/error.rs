use std::io;

use thiserror::Error;

/// Errors raised by backing-store sessions and repositories.
/// 儲存層工作階段與倉儲相關的錯誤。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session on workspace {0} is logged out")]
    LoggedOut(String),
    #[error("workspace {0} does not exist")]
    NoSuchWorkspace(String),
    #[error("workspace {0} already exists")]
    WorkspaceExists(String),
    #[error("no item at {0}")]
    PathNotFound(String),
    #[error("item already exists at {0}")]
    ItemExists(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("node {0} is checked in")]
    CheckedIn(String),
    #[error("node {0} has pending changes")]
    PendingChanges(String),
    #[error("node {0} is not versionable")]
    NotVersionable(String),
    #[error("property {0} is protected")]
    Protected(String),
    #[error("node type {0} is not registered")]
    NoSuchNodeType(String),
    #[error("node type {0} is not a mixin")]
    NotMixin(String),
    #[error("mixin {0} cannot be a primary type")]
    NotPrimary(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("snapshot IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid snapshot: {0}")]
    Snapshot(String),
}
