//! Constraint tree -> backing query.
//!
//! Exactly one content-class marker, naming exactly one class, must appear
//! somewhere in the tree. Markers never contribute a predicate: a filter made
//! only of markers compiles to no predicate, and no-predicate children are
//! skipped when a filter combines its results.
//!
//! 將條件樹編譯為後端查詢。

use tracing::debug;
use vellum_model::{
    to_prefixed, Combinator, Comparison, ComparisonOp, Constraint, ContentClass, Filter,
    NamespaceContext, QName,
};
use vellum_store::{paths, Operator, Predicate, Query, Selector, StoreValue, JCR_IS_CHECKED_OUT};

use crate::codec;
use crate::error::{ContentError, ValidationError};
use crate::keys::{self, AttrKey, JCR_MIME_TYPE};

/// Selector name used in compiled queries.
pub const SELECTOR_NAME: &str = "content";

/// Compiles `constraint`, restricted to descendants of `scope` when given.
pub fn compile(
    ctx: &dyn NamespaceContext,
    constraint: &Constraint,
    scope: Option<&str>,
) -> Result<Query, ContentError> {
    let mut compiler = Compiler { ctx, class: None };
    let mut predicate = compiler.visit(constraint)?;
    let class = compiler
        .class
        .ok_or(ValidationError::MissingContentClass)?;

    if let Some(scope) = scope {
        let scope = paths::normalize(&format!("/{}", scope.trim_start_matches('/')))
            .map_err(|_| ValidationError::InvalidPath(scope.to_string()))?;
        let within = Predicate::descendant_of(scope);
        predicate = Some(match predicate {
            Some(predicate) => Predicate::and(predicate, within),
            None => within,
        });
    }

    let selector = Selector::new(to_prefixed(ctx, &class)?, SELECTOR_NAME);
    let query = Query::new(selector, predicate);
    debug!(query = %query, "compiled search");
    Ok(query)
}

struct Compiler<'a> {
    ctx: &'a dyn NamespaceContext,
    class: Option<QName>,
}

impl Compiler<'_> {
    fn visit(&mut self, constraint: &Constraint) -> Result<Option<Predicate>, ContentError> {
        match constraint {
            Constraint::Filter(filter) => self.filter(filter),
            Constraint::ContentClass(marker) => {
                self.mark(marker)?;
                Ok(None)
            }
            Constraint::Comparison(comparison) => self.comparison(comparison).map(Some),
            Constraint::Existence(existence) => self.existence(&existence.property).map(Some),
            Constraint::Not(not) => match self.visit(&not.child)? {
                Some(inner) => Ok(Some(Predicate::not(inner))),
                None => Err(ValidationError::EmptyNegation.into()),
            },
        }
    }

    fn mark(&mut self, marker: &ContentClass) -> Result<(), ValidationError> {
        let class = match marker.classes.as_slice() {
            [] => return Err(ValidationError::EmptyContentClass),
            [class] => class,
            _ => return Err(ValidationError::MultipleContentClasses),
        };
        if self.class.is_some() {
            return Err(ValidationError::MultipleContentClasses);
        }
        self.class = Some(class.clone());
        Ok(())
    }

    fn filter(&mut self, filter: &Filter) -> Result<Option<Predicate>, ContentError> {
        let mut rest = Vec::with_capacity(filter.children.len());
        for child in &filter.children {
            match child {
                Constraint::ContentClass(marker) => self.mark(marker)?,
                other => rest.push(other),
            }
        }

        let mut combined: Option<Predicate> = None;
        for child in rest {
            let Some(next) = self.visit(child)? else {
                continue;
            };
            combined = Some(match combined {
                None => next,
                Some(acc) => match filter.combinator {
                    Combinator::And => Predicate::and(acc, next),
                    Combinator::Or => Predicate::or(acc, next),
                },
            });
        }
        Ok(combined)
    }

    fn comparison(&mut self, comparison: &Comparison) -> Result<Predicate, ContentError> {
        let property = match keys::resolve(self.ctx, &comparison.property)? {
            AttrKey::Property(name) => name,
            AttrKey::ContentType => JCR_MIME_TYPE.to_string(),
            AttrKey::CheckedIn | AttrKey::CheckedOut => {
                return Err(
                    ValidationError::PseudoPropertyComparison(comparison.property.clone()).into(),
                )
            }
        };
        let literal = codec::literal(&comparison.value)?;
        Ok(Predicate::comparison(property, operator(comparison.op), literal))
    }

    fn existence(&mut self, property: &QName) -> Result<Predicate, ContentError> {
        let flag = |checked_out: bool| {
            Predicate::comparison(
                JCR_IS_CHECKED_OUT,
                Operator::EqualTo,
                StoreValue::Boolean(checked_out),
            )
        };
        Ok(match keys::resolve(self.ctx, property)? {
            AttrKey::Property(name) => Predicate::exists(name),
            AttrKey::ContentType => Predicate::exists(JCR_MIME_TYPE),
            AttrKey::CheckedOut => flag(true),
            AttrKey::CheckedIn => flag(false),
        })
    }
}

fn operator(op: ComparisonOp) -> Operator {
    match op {
        ComparisonOp::Eq => Operator::EqualTo,
        ComparisonOp::Lt => Operator::LessThan,
        ComparisonOp::Lte => Operator::LessThanOrEqualTo,
        ComparisonOp::Gt => Operator::GreaterThan,
        ComparisonOp::Gte => Operator::GreaterThanOrEqualTo,
        ComparisonOp::Like => Operator::Like,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_model::{ns, NamespaceRegistry, StandardName};

    const EX: &str = "urn:example";

    fn registry() -> NamespaceRegistry {
        let mut registry = NamespaceRegistry::with_defaults();
        registry.register("ex", EX);
        registry
    }

    fn ex(local: &str) -> QName {
        QName::new(EX, local)
    }

    #[test]
    fn marker_only_filter_matches_the_whole_class() {
        let tree = Constraint::and([Constraint::class(ex("doc"))]);
        let query = compile(&registry(), &tree, None).unwrap();
        assert_eq!(query.selector.node_type, "ex:doc");
        assert_eq!(query.constraint, None);
        assert_eq!(query.to_string(), "SELECT * FROM [ex:doc] AS content");
    }

    #[test]
    fn bare_marker_counts_as_the_class() {
        let query = compile(&registry(), &Constraint::class(ex("doc")), Some("/a")).unwrap();
        assert_eq!(query.constraint, Some(Predicate::descendant_of("/a")));
    }

    #[test]
    fn class_is_mandatory_and_unique() {
        let registry = registry();
        let missing = Constraint::and([Constraint::eq(ex("title"), "x")]);
        assert!(matches!(
            compile(&registry, &missing, None),
            Err(ContentError::Validation(ValidationError::MissingContentClass))
        ));

        let two_classes = Constraint::and([Constraint::classes([ex("doc"), ex("note")])]);
        assert!(matches!(
            compile(&registry, &two_classes, None),
            Err(ContentError::Validation(ValidationError::MultipleContentClasses))
        ));

        let two_markers = Constraint::and([
            Constraint::class(ex("doc")),
            Constraint::or([Constraint::class(ex("note")), Constraint::exists(ex("title"))]),
        ]);
        assert!(matches!(
            compile(&registry, &two_markers, None),
            Err(ContentError::Validation(ValidationError::MultipleContentClasses))
        ));
    }

    #[test]
    fn nested_markers_are_skipped_when_combining() {
        let tree = Constraint::or([
            Constraint::and([Constraint::class(ex("doc"))]),
            Constraint::eq(ex("a"), 1),
            Constraint::eq(ex("b"), 2),
        ]);
        let query = compile(&registry(), &tree, None).unwrap();
        assert_eq!(
            query.constraint,
            Some(Predicate::or(
                Predicate::comparison("ex:a", Operator::EqualTo, StoreValue::Long(1)),
                Predicate::comparison("ex:b", Operator::EqualTo, StoreValue::Long(2)),
            ))
        );
    }

    #[test]
    fn pseudo_flags_compile_to_the_versioning_flag() {
        let registry = registry();
        let tree = Constraint::and([
            Constraint::class(ex("doc")),
            Constraint::exists(StandardName::CheckedIn.qname()),
        ]);
        let query = compile(&registry, &tree, None).unwrap();
        assert_eq!(
            query.to_string(),
            "SELECT * FROM [ex:doc] AS content WHERE content.[jcr:isCheckedOut] = CAST('false' AS BOOLEAN)"
        );

        let compared = Constraint::and([
            Constraint::class(ex("doc")),
            Constraint::eq(StandardName::CheckedOut.qname(), true),
        ]);
        assert!(matches!(
            compile(&registry, &compared, None),
            Err(ContentError::Validation(ValidationError::PseudoPropertyComparison(_)))
        ));
    }

    #[test]
    fn aliases_resolve_to_storage_names() {
        let tree = Constraint::and([
            Constraint::class(QName::new(ns::NT, "file")),
            Constraint::compare(StandardName::ContentType.qname(), ComparisonOp::Like, "text/%"),
        ]);
        let query = compile(&registry(), &tree, None).unwrap();
        assert_eq!(
            query.constraint,
            Some(Predicate::comparison(
                JCR_MIME_TYPE,
                Operator::Like,
                StoreValue::String("text/%".into())
            ))
        );
    }

    #[test]
    fn negating_nothing_is_rejected() {
        let tree = Constraint::and([
            Constraint::class(ex("doc")),
            Constraint::negate(Constraint::and([])),
        ]);
        assert!(matches!(
            compile(&registry(), &tree, None),
            Err(ContentError::Validation(ValidationError::EmptyNegation))
        ));
    }
}
