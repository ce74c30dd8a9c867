//! Content model shared by the vellum crates: qualified names, attribute values
//! and the search constraint tree.
//! vellum 共用的內容模型：限定名稱、屬性值與搜尋條件樹。

pub mod constraint;
pub mod names;
pub mod value;

pub use constraint::{
    Combinator, Comparison, ComparisonOp, Constraint, ConstraintError, ContentClass, Existence,
    Filter, Not,
};
pub use names::{
    ns, parse_prefixed, to_prefixed, NameError, NamespaceContext, NamespaceRegistry, QName,
    StandardName,
};
pub use value::AttrValue;
