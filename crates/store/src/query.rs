//! Query object model: one selector plus an optional predicate tree.
//! 查詢物件模型：單一選擇器加上可選的條件樹。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use regex::Regex;

use crate::value::{PropertyType, PropertyValue, StoreValue};

/// Node source of a query: every node of `node_type` (including subtypes and mixins).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    pub node_type: String,
    pub name: String,
}

impl Selector {
    pub fn new(node_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    EqualTo,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    Like,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::EqualTo => "=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::Like => "LIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Comparison {
        property: String,
        operator: Operator,
        literal: StoreValue,
    },
    PropertyExistence {
        property: String,
    },
    DescendantNode {
        path: String,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn comparison(property: impl Into<String>, operator: Operator, literal: StoreValue) -> Self {
        Predicate::Comparison {
            property: property.into(),
            operator,
            literal,
        }
    }

    pub fn exists(property: impl Into<String>) -> Self {
        Predicate::PropertyExistence {
            property: property.into(),
        }
    }

    pub fn descendant_of(path: impl Into<String>) -> Self {
        Predicate::DescendantNode { path: path.into() }
    }

    pub fn and(left: Predicate, right: Predicate) -> Self {
        Predicate::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Predicate, right: Predicate) -> Self {
        Predicate::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    fn render(&self, selector: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Comparison {
                property,
                operator,
                literal,
            } => {
                write!(f, "{selector}.[{property}] {} ", operator.symbol())?;
                render_literal(literal, f)
            }
            Predicate::PropertyExistence { property } => {
                write!(f, "{selector}.[{property}] IS NOT NULL")
            }
            Predicate::DescendantNode { path } => {
                write!(f, "ISDESCENDANTNODE({selector}, [{path}])")
            }
            Predicate::And(left, right) => render_binary(selector, left, "AND", right, f),
            Predicate::Or(left, right) => render_binary(selector, left, "OR", right, f),
            Predicate::Not(inner) => {
                f.write_str("NOT (")?;
                inner.render(selector, f)?;
                f.write_str(")")
            }
        }
    }
}

fn render_binary(
    selector: &str,
    left: &Predicate,
    keyword: &str,
    right: &Predicate,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.write_str("(")?;
    left.render(selector, f)?;
    write!(f, ") {keyword} (")?;
    right.render(selector, f)?;
    f.write_str(")")
}

fn render_literal(literal: &StoreValue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match literal {
        StoreValue::Long(_) | StoreValue::Double(_) => write!(f, "{literal}"),
        StoreValue::Boolean(_) => write!(f, "CAST('{literal}' AS BOOLEAN)"),
        StoreValue::Date(_) => write!(f, "CAST('{literal}' AS DATE)"),
        other => write!(f, "'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Backing query.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub selector: Selector,
    pub constraint: Option<Predicate>,
}

impl Query {
    pub fn new(selector: Selector, constraint: Option<Predicate>) -> Self {
        Self {
            selector,
            constraint,
        }
    }
}

/// Renders the query as JCR-SQL2.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SELECT * FROM [{}] AS {}",
            self.selector.node_type, self.selector.name
        )?;
        if let Some(constraint) = &self.constraint {
            f.write_str(" WHERE ")?;
            constraint.render(&self.selector.name, f)?;
        }
        Ok(())
    }
}

/// Paths of the matching nodes, in path order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    paths: Vec<String>,
}

impl QueryResult {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl IntoIterator for QueryResult {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

/// Evaluates predicates against one node's properties.
#[derive(Default)]
pub(crate) struct Evaluator {
    patterns: HashMap<String, Option<Regex>>,
}

impl Evaluator {
    pub(crate) fn matches(
        &mut self,
        predicate: &Predicate,
        path: &str,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> bool {
        match predicate {
            Predicate::Comparison {
                property,
                operator,
                literal,
            } => match properties.get(property) {
                Some(value) => value
                    .values()
                    .iter()
                    .any(|candidate| self.compare(candidate, *operator, literal)),
                None => false,
            },
            Predicate::PropertyExistence { property } => properties.contains_key(property),
            Predicate::DescendantNode { path: scope } => is_descendant(path, scope),
            Predicate::And(left, right) => {
                self.matches(left, path, properties) && self.matches(right, path, properties)
            }
            Predicate::Or(left, right) => {
                self.matches(left, path, properties) || self.matches(right, path, properties)
            }
            Predicate::Not(inner) => !self.matches(inner, path, properties),
        }
    }

    fn compare(&mut self, candidate: &StoreValue, operator: Operator, literal: &StoreValue) -> bool {
        // a date literal compares with a text property as an instant
        if let (StoreValue::Date(instant), Some(_)) = (literal, candidate.as_str()) {
            if operator != Operator::Like {
                return match candidate.coerce(PropertyType::Date) {
                    Some(StoreValue::Date(stored)) => holds(operator, stored.cmp(instant)),
                    _ => false,
                };
            }
        }
        let Some(literal) = literal.coerce(candidate.property_type()) else {
            return false;
        };
        if operator == Operator::Like {
            let (Some(text), Some(pattern)) = (candidate.as_str(), literal.as_str()) else {
                return false;
            };
            return self
                .like_pattern(pattern)
                .map(|regex| regex.is_match(text))
                .unwrap_or(false);
        }
        candidate
            .compare(&literal)
            .is_some_and(|ordering| holds(operator, ordering))
    }

    fn like_pattern(&mut self, pattern: &str) -> Option<&Regex> {
        self.patterns
            .entry(pattern.to_string())
            .or_insert_with(|| Regex::new(&like_to_regex(pattern)).ok())
            .as_ref()
    }
}

fn holds(operator: Operator, ordering: Ordering) -> bool {
    match operator {
        Operator::EqualTo => ordering.is_eq(),
        Operator::LessThan => ordering.is_lt(),
        Operator::LessThanOrEqualTo => ordering.is_le(),
        Operator::GreaterThan => ordering.is_gt(),
        Operator::GreaterThanOrEqualTo => ordering.is_ge(),
        Operator::Like => false,
    }
}

/// Translates a LIKE pattern (`%`, `_`, `\` escapes) into an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    regex.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

pub(crate) fn is_descendant(path: &str, scope: &str) -> bool {
    if scope == "/" {
        return path != "/";
    }
    path.len() > scope.len() && path.starts_with(scope) && path[scope.len()..].starts_with('/')
}
