use thiserror::Error;
use vellum_model::{ConstraintError, NameError, QName};
use vellum_store::StoreError;

use crate::session::SessionId;

/// Errors surfaced by the content layer.
/// 內容層回報的錯誤。
#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("store access failed ({context}): {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    State(#[from] StateError),
    #[error("no content at {path} in workspace {workspace}")]
    NotFound { workspace: String, path: String },
}

impl ContentError {
    /// Wraps a store failure. A logged-out session becomes a [`StateError`] and
    /// a missing item becomes [`ContentError::NotFound`].
    pub(crate) fn store(workspace: &str, path: &str, source: StoreError) -> Self {
        match source {
            StoreError::LoggedOut(workspace) => StateError::SessionLoggedOut(workspace).into(),
            StoreError::PathNotFound(missing) => ContentError::NotFound {
                workspace: workspace.to_string(),
                path: missing,
            },
            StoreError::InvalidPath(path) => ValidationError::InvalidPath(path).into(),
            source => ContentError::Store {
                context: format!("workspace {workspace}, path {path}"),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound { .. })
    }
}

/// Request rejected before (or instead of) touching the store.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("a content class is mandatory in a search")]
    MissingContentClass,
    #[error("multiple content classes unsupported")]
    MultipleContentClasses,
    #[error("content class marker names no class")]
    EmptyContentClass,
    #[error("negated constraint compiles to no predicate")]
    EmptyNegation,
    #[error("{0} can only be tested for existence")]
    PseudoPropertyComparison(QName),
    #[error("{0} cannot be set, use open-for-edit or freeze")]
    ReadOnlyAttribute(QName),
    #[error("unsupported attribute value: {0}")]
    UnsupportedValue(String),
    #[error("{0} is not a file")]
    NotAFile(String),
    #[error("{0} is not a mixin")]
    NotMixin(QName),
    #[error("a node cannot be both a file and a collection")]
    ConflictingClasses,
    #[error("invalid mount path: {0}")]
    InvalidMountPath(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Name(#[from] NameError),
    #[error(transparent)]
    Request(#[from] ConstraintError),
}

/// Operation attempted in a state that forbids it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("session adapter is closed")]
    AdapterClosed,
    #[error("content session {0} is closed")]
    SessionClosed(SessionId),
    #[error("content session {0} is read-only")]
    ReadOnlySession(SessionId),
    #[error("backing session on workspace {0} is logged out")]
    SessionLoggedOut(String),
    #[error("content provider is stopped")]
    ProviderStopped,
}

impl From<NameError> for ContentError {
    fn from(err: NameError) -> Self {
        ValidationError::Name(err).into()
    }
}

impl From<ConstraintError> for ContentError {
    fn from(err: ConstraintError) -> Self {
        ValidationError::Request(err).into()
    }
}

/// Attaches workspace/path context to store results.
pub(crate) trait StoreContext<T> {
    fn at(self, workspace: &str, path: &str) -> Result<T, ContentError>;
}

impl<T> StoreContext<T> for Result<T, StoreError> {
    fn at(self, workspace: &str, path: &str) -> Result<T, ContentError> {
        self.map_err(|err| ContentError::store(workspace, path, err))
    }
}
