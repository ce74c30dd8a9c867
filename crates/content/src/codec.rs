//! Attribute value <-> store value conversion.

use vellum_model::AttrValue;
use vellum_store::{PropertyValue, StoreValue};

use crate::error::ValidationError;

/// Encodes an attribute value for storage. Lists become multi-valued properties.
pub fn to_store(value: &AttrValue) -> Result<PropertyValue, ValidationError> {
    match value {
        AttrValue::List(values) => values
            .iter()
            .map(literal)
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::Multiple),
        single => literal(single).map(PropertyValue::Single),
    }
}

/// Encodes a single value, e.g. a query literal.
pub fn literal(value: &AttrValue) -> Result<StoreValue, ValidationError> {
    Ok(match value {
        AttrValue::String(value) => StoreValue::String(value.clone()),
        AttrValue::Long(value) => StoreValue::Long(*value),
        AttrValue::Double(value) => StoreValue::Double(*value),
        AttrValue::Boolean(value) => StoreValue::Boolean(*value),
        AttrValue::Instant(value) => StoreValue::Date(*value),
        AttrValue::List(_) => {
            return Err(ValidationError::UnsupportedValue(
                "nested or list literal".to_string(),
            ))
        }
    })
}

/// Decodes a stored property. Binary data is not an attribute.
pub fn from_store(value: &PropertyValue) -> Result<AttrValue, ValidationError> {
    match value {
        PropertyValue::Single(value) => single(value),
        PropertyValue::Multiple(values) => values
            .iter()
            .map(single)
            .collect::<Result<Vec<_>, _>>()
            .map(AttrValue::List),
    }
}

fn single(value: &StoreValue) -> Result<AttrValue, ValidationError> {
    Ok(match value {
        StoreValue::String(value) | StoreValue::Name(value) | StoreValue::Path(value) => {
            AttrValue::String(value.clone())
        }
        StoreValue::Long(value) => AttrValue::Long(*value),
        StoreValue::Double(value) => AttrValue::Double(*value),
        StoreValue::Boolean(value) => AttrValue::Boolean(*value),
        StoreValue::Date(value) => AttrValue::Instant(*value),
        StoreValue::Binary(_) => {
            return Err(ValidationError::UnsupportedValue(
                "binary is not supported as an attribute".to_string(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn scalar_values_map_one_to_one() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        for value in [
            AttrValue::from("text"),
            AttrValue::Long(7),
            AttrValue::Double(0.5),
            AttrValue::Boolean(true),
            AttrValue::Instant(instant),
        ] {
            let stored = to_store(&value).unwrap();
            assert!(!stored.is_multiple());
            assert_eq!(from_store(&stored).unwrap(), value);
        }
    }

    #[test]
    fn names_and_paths_read_as_strings() {
        let stored = PropertyValue::Single(StoreValue::Name("nt:file".into()));
        assert_eq!(from_store(&stored).unwrap(), AttrValue::from("nt:file"));
    }

    #[test]
    fn binary_and_nested_lists_are_rejected() {
        let binary = PropertyValue::Single(StoreValue::Binary(vec![0, 1]));
        assert!(matches!(
            from_store(&binary),
            Err(ValidationError::UnsupportedValue(_))
        ));
        let nested = AttrValue::List(vec![AttrValue::List(Vec::new())]);
        assert!(to_store(&nested).is_err());
    }

    #[test]
    fn lists_become_multi_valued() {
        let stored = to_store(&AttrValue::from(vec!["a", "b"])).unwrap();
        assert!(stored.is_multiple());
        assert_eq!(stored.values().len(), 2);
    }
}
