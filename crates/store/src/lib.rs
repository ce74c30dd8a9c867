//! Backing-store contract for vellum plus an in-memory reference store.
//! vellum 的儲存層介面與記憶體內參考實作。

mod error;
mod memory;
mod serde_bytes;
mod session;
mod snapshot;

pub mod nodetype;
pub mod paths;
pub mod query;
pub mod value;

pub use error::StoreError;
pub use memory::{
    MemoryRepository, MemorySession, JCR_BASE_VERSION, JCR_CREATED, JCR_IS_CHECKED_OUT,
    JCR_LAST_MODIFIED, JCR_MIXIN_TYPES, JCR_PRIMARY_TYPE, JCR_UUID, PROTECTED_PROPERTIES,
};
pub use nodetype::{NodeType, NodeTypeRegistry};
pub use query::{Operator, Predicate, Query, QueryResult, Selector};
pub use session::{BackingSession, NodeHandle, Repository, VersionInfo};
pub use snapshot::{
    write_atomic, NodeState, RepositorySnapshot, WorkspaceSnapshot, SNAPSHOT_FORMAT_VERSION,
};
pub use value::{PropertyType, PropertyValue, StoreValue};
