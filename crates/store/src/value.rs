use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Property types understood by the store.
/// 儲存層支援的屬性型別。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Long,
    Double,
    Boolean,
    Date,
    Name,
    Path,
    Binary,
}

impl PropertyType {
    pub fn name(self) -> &'static str {
        match self {
            PropertyType::String => "String",
            PropertyType::Long => "Long",
            PropertyType::Double => "Double",
            PropertyType::Boolean => "Boolean",
            PropertyType::Date => "Date",
            PropertyType::Name => "Name",
            PropertyType::Path => "Path",
            PropertyType::Binary => "Binary",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed store value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum StoreValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Name(String),
    Path(String),
    Binary(#[serde(with = "crate::serde_bytes")] Vec<u8>),
}

impl StoreValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            StoreValue::String(_) => PropertyType::String,
            StoreValue::Long(_) => PropertyType::Long,
            StoreValue::Double(_) => PropertyType::Double,
            StoreValue::Boolean(_) => PropertyType::Boolean,
            StoreValue::Date(_) => PropertyType::Date,
            StoreValue::Name(_) => PropertyType::Name,
            StoreValue::Path(_) => PropertyType::Path,
            StoreValue::Binary(_) => PropertyType::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::String(value) | StoreValue::Name(value) | StoreValue::Path(value) => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoreValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts the value to `target`, the way query literals are matched
    /// against stored properties. Returns `None` when no conversion exists.
    pub fn coerce(&self, target: PropertyType) -> Option<StoreValue> {
        if self.property_type() == target {
            return Some(self.clone());
        }
        match (self, target) {
            (StoreValue::Binary(_), _) | (_, PropertyType::Binary) => None,
            (_, PropertyType::String) => Some(StoreValue::String(self.to_string())),
            (StoreValue::Long(value), PropertyType::Double) => {
                Some(StoreValue::Double(*value as f64))
            }
            (StoreValue::Double(value), PropertyType::Long) if value.fract() == 0.0 => {
                Some(StoreValue::Long(*value as i64))
            }
            (StoreValue::Long(value), PropertyType::Date) => {
                DateTime::<Utc>::from_timestamp_millis(*value).map(StoreValue::Date)
            }
            (StoreValue::Date(value), PropertyType::Long) => {
                Some(StoreValue::Long(value.timestamp_millis()))
            }
            (StoreValue::String(text), target) | (StoreValue::Name(text), target)
            | (StoreValue::Path(text), target) => parse_as(text, target),
            _ => None,
        }
    }

    /// Orders two values of the same type.
    pub fn compare(&self, other: &StoreValue) -> Option<Ordering> {
        match (self, other) {
            (StoreValue::String(a), StoreValue::String(b))
            | (StoreValue::Name(a), StoreValue::Name(b))
            | (StoreValue::Path(a), StoreValue::Path(b)) => Some(a.cmp(b)),
            (StoreValue::Long(a), StoreValue::Long(b)) => Some(a.cmp(b)),
            (StoreValue::Double(a), StoreValue::Double(b)) => a.partial_cmp(b),
            (StoreValue::Boolean(a), StoreValue::Boolean(b)) => Some(a.cmp(b)),
            (StoreValue::Date(a), StoreValue::Date(b)) => Some(a.cmp(b)),
            (StoreValue::Binary(a), StoreValue::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn parse_as(text: &str, target: PropertyType) -> Option<StoreValue> {
    match target {
        PropertyType::String => Some(StoreValue::String(text.to_string())),
        PropertyType::Name => Some(StoreValue::Name(text.to_string())),
        PropertyType::Path => Some(StoreValue::Path(text.to_string())),
        PropertyType::Long => text.trim().parse().ok().map(StoreValue::Long),
        PropertyType::Double => text.trim().parse().ok().map(StoreValue::Double),
        PropertyType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(StoreValue::Boolean(true)),
            "false" => Some(StoreValue::Boolean(false)),
            _ => None,
        },
        PropertyType::Date => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|date| StoreValue::Date(date.with_timezone(&Utc))),
        PropertyType::Binary => None,
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::String(value) | StoreValue::Name(value) | StoreValue::Path(value) => {
                f.write_str(value)
            }
            StoreValue::Long(value) => write!(f, "{value}"),
            StoreValue::Double(value) => write!(f, "{value}"),
            StoreValue::Boolean(value) => write!(f, "{value}"),
            StoreValue::Date(value) => {
                f.write_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            StoreValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Property payload: one value or an ordered list of values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Single(StoreValue),
    Multiple(Vec<StoreValue>),
}

impl PropertyValue {
    pub fn is_multiple(&self) -> bool {
        matches!(self, PropertyValue::Multiple(_))
    }

    pub fn values(&self) -> &[StoreValue] {
        match self {
            PropertyValue::Single(value) => std::slice::from_ref(value),
            PropertyValue::Multiple(values) => values,
        }
    }

    pub fn single(&self) -> Option<&StoreValue> {
        match self {
            PropertyValue::Single(value) => Some(value),
            PropertyValue::Multiple(_) => None,
        }
    }

    /// Type of the payload. Empty lists report `String`.
    pub fn property_type(&self) -> PropertyType {
        self.values()
            .first()
            .map(StoreValue::property_type)
            .unwrap_or(PropertyType::String)
    }
}

impl From<StoreValue> for PropertyValue {
    fn from(value: StoreValue) -> Self {
        PropertyValue::Single(value)
    }
}
