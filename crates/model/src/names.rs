use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known namespace URIs.
/// 常用的命名空間 URI。
pub mod ns {
    pub const DAV: &str = "DAV:";
    pub const JCR: &str = "http://www.jcp.org/jcr/1.0";
    pub const NT: &str = "http://www.jcp.org/jcr/nt/1.0";
    pub const MIX: &str = "http://www.jcp.org/jcr/mix/1.0";
    pub const REP: &str = "internal";
}

/// Errors raised while parsing or resolving qualified names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("qualified name cannot be empty")]
    Empty,
    #[error("malformed qualified name: {0}")]
    Malformed(String),
    #[error("namespace prefix {0} is not registered")]
    UnknownPrefix(String),
    #[error("namespace {0} has no registered prefix")]
    UnknownNamespace(String),
}

/// Namespace URI + local name pair identifying an attribute or a content class.
/// 以命名空間 URI 與區域名稱組成的屬性／內容類別識別。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QName {
    namespace: String,
    local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Name without namespace.
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self::new(String::new(), local)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }
}

/// Clark notation: `{uri}local`, or `local` when the namespace is empty.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

impl FromStr for QName {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(NameError::Empty);
        }
        match trimmed.strip_prefix('{') {
            Some(rest) => {
                let (namespace, local) = rest
                    .split_once('}')
                    .ok_or_else(|| NameError::Malformed(trimmed.to_string()))?;
                if local.is_empty() {
                    return Err(NameError::Malformed(trimmed.to_string()));
                }
                Ok(Self::new(namespace, local))
            }
            None => Ok(Self::unqualified(trimmed)),
        }
    }
}

impl TryFrom<String> for QName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QName> for String {
    fn from(name: QName) -> Self {
        name.to_string()
    }
}

/// Prefix <-> namespace table, supplied by the hosting environment.
pub trait NamespaceContext {
    fn namespace_uri(&self, prefix: &str) -> Option<String>;
    fn prefix(&self, namespace_uri: &str) -> Option<String>;
}

/// Renders a qualified name as a `prefix:local` storage name.
pub fn to_prefixed(ctx: &dyn NamespaceContext, name: &QName) -> Result<String, NameError> {
    if !name.has_namespace() {
        return Ok(name.local().to_string());
    }
    let prefix = ctx
        .prefix(name.namespace())
        .ok_or_else(|| NameError::UnknownNamespace(name.namespace().to_string()))?;
    if prefix.is_empty() {
        Ok(name.local().to_string())
    } else {
        Ok(format!("{prefix}:{}", name.local()))
    }
}

/// Parses a `prefix:local` storage name back into a qualified name.
pub fn parse_prefixed(ctx: &dyn NamespaceContext, value: &str) -> Result<QName, NameError> {
    if value.is_empty() {
        return Err(NameError::Empty);
    }
    match value.split_once(':') {
        Some((prefix, local)) => {
            if local.is_empty() {
                return Err(NameError::Malformed(value.to_string()));
            }
            let uri = ctx
                .namespace_uri(prefix)
                .ok_or_else(|| NameError::UnknownPrefix(prefix.to_string()))?;
            Ok(QName::new(uri, local))
        }
        None => Ok(QName::unqualified(value)),
    }
}

/// Default in-memory namespace table.
/// 預設的命名空間對照表。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRegistry {
    prefixes: BTreeMap<String, String>,
}

impl NamespaceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            prefixes: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the `jcr`, `nt`, `mix`, `rep` and `DAV` prefixes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("jcr", ns::JCR);
        registry.register("nt", ns::NT);
        registry.register("mix", ns::MIX);
        registry.register("rep", ns::REP);
        registry.register("DAV", ns::DAV);
        registry
    }

    /// Registers (or remaps) a prefix. An existing prefix bound to the same URI is dropped.
    pub fn register(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        self.prefixes
            .retain(|existing, bound| *existing == prefix || *bound != uri);
        self.prefixes.insert(prefix, uri);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl NamespaceContext for NamespaceRegistry {
    fn namespace_uri(&self, prefix: &str) -> Option<String> {
        self.prefixes.get(prefix).cloned()
    }

    fn prefix(&self, namespace_uri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .find(|(_, uri)| uri.as_str() == namespace_uri)
            .map(|(prefix, _)| prefix.clone())
    }
}

/// Standard attribute names shared by every content provider.
/// 所有內容提供者共用的標準屬性名稱（DAV 命名空間）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StandardName {
    CreationDate,
    LastModified,
    ContentType,
    CheckedIn,
    CheckedOut,
    Collection,
}

impl StandardName {
    pub const ALL: [StandardName; 6] = [
        StandardName::CreationDate,
        StandardName::LastModified,
        StandardName::ContentType,
        StandardName::CheckedIn,
        StandardName::CheckedOut,
        StandardName::Collection,
    ];

    pub fn local_name(self) -> &'static str {
        match self {
            StandardName::CreationDate => "creationdate",
            StandardName::LastModified => "getlastmodified",
            StandardName::ContentType => "getcontenttype",
            StandardName::CheckedIn => "checked-in",
            StandardName::CheckedOut => "checked-out",
            StandardName::Collection => "collection",
        }
    }

    pub fn qname(self) -> QName {
        QName::new(ns::DAV, self.local_name())
    }

    /// Matches a qualified name against the standard names.
    pub fn from_qname(name: &QName) -> Option<Self> {
        if name.namespace() != ns::DAV {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.local_name() == name.local())
    }
}
