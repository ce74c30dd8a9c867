use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::{Error as DeError, Visitor};
use serde::{Deserializer, Serializer};

/// Serialises binary property payloads as base64 strings.
/// 以 base64 字串保存二進位屬性內容。
pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&BASE64.encode(bytes))
}

/// Restores a payload written by [`serialize`].
/// 從 base64 字串還原二進位內容。
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a base64 encoded binary payload")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            BASE64
                .decode(v)
                .map_err(|err| E::custom(format!("invalid base64 payload: {err}")))
        }

        fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(v.to_vec())
        }
    }

    deserializer.deserialize_any(BytesVisitor)
}
