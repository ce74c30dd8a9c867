use vellum_model::{parse_prefixed, to_prefixed, NamespaceContext, QName, StandardName};
use vellum_store::{JCR_CREATED, JCR_IS_CHECKED_OUT, JCR_LAST_MODIFIED};

use crate::error::ContentError;

pub(crate) const JCR_CONTENT: &str = "jcr:content";
pub(crate) const JCR_DATA: &str = "jcr:data";
pub(crate) const JCR_MIME_TYPE: &str = "jcr:mimeType";
pub(crate) const JCR_ENCODING: &str = "jcr:encoding";
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Attribute key after standard-name aliasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttrKey {
    /// Plain stored property, by storage name.
    Property(String),
    ContentType,
    CheckedIn,
    CheckedOut,
}

pub(crate) fn resolve(ctx: &dyn NamespaceContext, key: &QName) -> Result<AttrKey, ContentError> {
    Ok(match StandardName::from_qname(key) {
        Some(StandardName::CreationDate) => AttrKey::Property(JCR_CREATED.to_string()),
        Some(StandardName::LastModified) => AttrKey::Property(JCR_LAST_MODIFIED.to_string()),
        Some(StandardName::ContentType) => AttrKey::ContentType,
        Some(StandardName::CheckedIn) => AttrKey::CheckedIn,
        Some(StandardName::CheckedOut) => AttrKey::CheckedOut,
        Some(StandardName::Collection) | None => AttrKey::Property(to_prefixed(ctx, key)?),
    })
}

/// Maps a stored property name back to the attribute key callers see.
pub(crate) fn attribute_name(
    ctx: &dyn NamespaceContext,
    storage_name: &str,
    checked_out: Option<bool>,
) -> Result<QName, ContentError> {
    Ok(match storage_name {
        JCR_CREATED => StandardName::CreationDate.qname(),
        JCR_LAST_MODIFIED => StandardName::LastModified.qname(),
        JCR_MIME_TYPE => StandardName::ContentType.qname(),
        JCR_IS_CHECKED_OUT if checked_out == Some(false) => StandardName::CheckedIn.qname(),
        JCR_IS_CHECKED_OUT => StandardName::CheckedOut.qname(),
        other => parse_prefixed(ctx, other)?,
    })
}

/// Splits `type;encoding=value` into its MIME type and optional encoding.
pub(crate) fn split_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mime_type = parts.next().unwrap_or_default().trim().to_string();
    let encoding = parts.find_map(|part| {
        let (key, value) = part.split_once('=')?;
        (key.trim() == "encoding").then(|| value.trim().to_string())
    });
    (mime_type, encoding)
}

pub(crate) fn join_content_type(mime_type: &str, encoding: Option<&str>) -> String {
    match encoding {
        Some(encoding) => format!("{mime_type};encoding={encoding}"),
        None => mime_type.to_string(),
    }
}
