//! Content sessions, nodes and search over a versioned multi-workspace store.
//! 在具版本控制的多工作區儲存上提供內容工作階段、節點與搜尋。

mod error;
mod keys;
mod node;
mod provider;
mod registry;

pub mod adapter;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod session;

pub use adapter::{EditState, EditStatus, SessionAdapter};
pub use compiler::{compile, SELECTOR_NAME};
pub use config::{ConfigError, ProviderConfig, SearchScope};
pub use error::{ContentError, StateError, ValidationError};
pub use node::{Children, ContentNode};
pub use provider::{ContentProvider, SearchResults};
pub use registry::AdapterRegistry;
pub use session::{ContentSession, SessionId};
