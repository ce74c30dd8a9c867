#![allow(dead_code)]

use std::sync::Arc;

use vellum_content::{ContentNode, ContentProvider, ContentSession, ProviderConfig};
use vellum_model::{ns, QName, StandardName};
use vellum_store::nodetype::{MIX_SIMPLE_VERSIONABLE, NT_UNSTRUCTURED};
use vellum_store::{MemoryRepository, NodeType};

pub const EX: &str = "urn:example";

pub fn ex(local: &str) -> QName {
    QName::new(EX, local)
}

pub fn name(local: &str) -> QName {
    QName::unqualified(local)
}

pub fn nt(local: &str) -> QName {
    QName::new(ns::NT, local)
}

pub fn doc_class() -> QName {
    ex("doc")
}

pub fn title() -> QName {
    ex("title")
}

pub fn content_type() -> QName {
    StandardName::ContentType.qname()
}

/// Repository with a `main` workspace and a versionable `ex:doc` type.
pub fn repository() -> MemoryRepository {
    let repository = MemoryRepository::with_workspaces(&["main"]).unwrap();
    repository.register_namespace("ex", EX);
    repository
        .register_node_type(NodeType::primary(
            "ex:doc",
            &[NT_UNSTRUCTURED, MIX_SIMPLE_VERSIONABLE],
        ))
        .unwrap();
    repository
}

pub fn start(repository: &MemoryRepository, config: ProviderConfig) -> ContentProvider {
    ContentProvider::start(Arc::new(repository.clone()), config).unwrap()
}

pub fn provider(repository: &MemoryRepository) -> ContentProvider {
    start(repository, ProviderConfig::new("/main"))
}

pub fn session() -> Arc<ContentSession> {
    Arc::new(ContentSession::new())
}

pub fn root(provider: &ContentProvider, session: &Arc<ContentSession>) -> ContentNode {
    provider.get(session, "/").unwrap()
}
