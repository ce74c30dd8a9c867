use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::names::QName;
use crate::value::AttrValue;

/// Errors raised while decoding a constraint tree.
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("invalid constraint tree: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How the children of a [`Filter`] combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl ComparisonOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Lte => "lte",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Gte => "gte",
            ComparisonOp::Like => "like",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub combinator: Combinator,
    #[serde(default)]
    pub children: Vec<Constraint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub property: QName,
    pub op: ComparisonOp,
    pub value: AttrValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Existence {
    pub property: QName,
}

/// Content-class marker. A well-formed tree carries exactly one, naming one class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentClass {
    pub classes: Vec<QName>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Not {
    pub child: Box<Constraint>,
}

/// Boolean predicate tree submitted to search.
/// 搜尋時送出的布林條件樹。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    Filter(Filter),
    Comparison(Comparison),
    Existence(Existence),
    ContentClass(ContentClass),
    Not(Not),
}

impl Constraint {
    pub fn and(children: impl IntoIterator<Item = Constraint>) -> Self {
        Constraint::Filter(Filter {
            combinator: Combinator::And,
            children: children.into_iter().collect(),
        })
    }

    pub fn or(children: impl IntoIterator<Item = Constraint>) -> Self {
        Constraint::Filter(Filter {
            combinator: Combinator::Or,
            children: children.into_iter().collect(),
        })
    }

    pub fn compare(property: QName, op: ComparisonOp, value: impl Into<AttrValue>) -> Self {
        Constraint::Comparison(Comparison {
            property,
            op,
            value: value.into(),
        })
    }

    pub fn eq(property: QName, value: impl Into<AttrValue>) -> Self {
        Self::compare(property, ComparisonOp::Eq, value)
    }

    pub fn exists(property: QName) -> Self {
        Constraint::Existence(Existence { property })
    }

    pub fn class(class: QName) -> Self {
        Constraint::ContentClass(ContentClass {
            classes: vec![class],
        })
    }

    pub fn classes(classes: impl IntoIterator<Item = QName>) -> Self {
        Constraint::ContentClass(ContentClass {
            classes: classes.into_iter().collect(),
        })
    }

    pub fn negate(child: Constraint) -> Self {
        Constraint::Not(Not {
            child: Box::new(child),
        })
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Constraint::ContentClass(_))
    }

    /// Decodes the JSON wire shape.
    pub fn from_json(input: &str) -> Result<Self, ConstraintError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String, ConstraintError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title() -> QName {
        QName::new("http://example.org/ns", "title")
    }

    #[test]
    fn decodes_wire_shape() {
        let json = r#"{
            "Filter": {
                "combinator": "AND",
                "children": [
                    { "ContentClass": { "classes": ["{http://www.jcp.org/jcr/nt/1.0}file"] } },
                    { "Comparison": { "property": "{http://example.org/ns}title", "op": "eq", "value": "x" } },
                    { "Not": { "child": { "Existence": { "property": "draft" } } } }
                ]
            }
        }"#;
        let tree = Constraint::from_json(json).unwrap();
        let expected = Constraint::and([
            Constraint::class(QName::new(crate::ns::NT, "file")),
            Constraint::eq(title(), "x"),
            Constraint::negate(Constraint::exists(QName::unqualified("draft"))),
        ]);
        assert_eq!(tree, expected);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let json = r#"{ "Comparison": { "property": "title", "op": "regex", "value": "x" } }"#;
        let err = Constraint::from_json(json).unwrap_err();
        assert!(err.to_string().contains("invalid constraint tree"));
    }

    #[test]
    fn encodes_combinators_in_upper_case() {
        let json = Constraint::or(Vec::new()).to_json().unwrap();
        assert!(json.contains("\"OR\""));
    }
}
