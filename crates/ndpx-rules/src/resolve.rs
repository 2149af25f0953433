//! # Attribute Resolution
//!
//! Walks an expression and extracts the underlying column reference it
//! depends on. Only a narrow set of shapes resolves: a direct column
//! reference, an alias over a resolvable child (the alias name is kept), and
//! a cast over a resolvable child (the cast is discarded). Everything else
//! is an [`ResolveError::Unsupported`] value -- never a panic -- and the
//! caller decides the fallback policy.
//!
//! Batch resolution is all-or-nothing: if any element of a list fails, the
//! whole batch is reported as failed. Partial successes would let a rewrite
//! silently narrow a projection, which is exactly the kind of wrong result
//! the fail-closed design exists to prevent.

use ndpx_core::expr::{AttributeRef, Expr};

/// Failure to resolve an expression to an attribute.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The expression shape is not one the resolver recognizes.
    #[error("unsupported expression shape: {0}")]
    Unsupported(String),
}

/// Resolve a single expression to its underlying attribute.
///
/// Recursion depth is bounded by expression nesting; a well-formed
/// expression tree has no cycles.
pub fn resolve_attribute(expr: &Expr) -> Result<AttributeRef, ResolveError> {
    match expr {
        Expr::Attribute(a) => Ok(a.clone()),
        Expr::Alias { name, child } => {
            let inner = resolve_attribute(child)?;
            Ok(inner.renamed(name.clone()))
        }
        Expr::Cast { child, .. } => resolve_attribute(child),
        other => Err(ResolveError::Unsupported(describe(other))),
    }
}

/// Resolve a list of expressions. Either the full attribute list comes back
/// or a single aggregated failure; never a partial success.
pub fn resolve_attributes(exprs: &[Expr]) -> Result<Vec<AttributeRef>, ResolveError> {
    exprs.iter().map(resolve_attribute).collect()
}

/// Short human-readable tag for an unrecognized shape, used in the error
/// payload and in skip-decision logging.
pub fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Attribute(a) => format!("attribute {a}"),
        Expr::Literal(v) => format!("literal {v}"),
        Expr::Alias { name, .. } => format!("alias {name}"),
        Expr::Cast { to, .. } => format!("cast to {to:?}"),
        Expr::BinaryOp { op, .. } => format!("binary {}", op.token()),
        Expr::UnaryOp { op, .. } => format!("unary {op:?}"),
        Expr::InList { .. } => "in-list".to_string(),
        Expr::StringMatch { op, .. } => format!("string {}", op.token()),
        Expr::Function { name, .. } => format!("function {name}"),
        Expr::And(_) => "and".to_string(),
        Expr::Or(_) => "or".to_string(),
        Expr::Aggregate(agg) => format!("aggregate {}", agg.func.token()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndpx_core::expr::{AttrId, BinaryOp, DataType, ScalarValue};

    fn attr(id: u32, name: &str) -> AttributeRef {
        AttributeRef::new(id, name, DataType::Int64, true)
    }

    #[test]
    fn resolves_alias_over_cast_over_column() {
        let a = attr(4, "ss_quantity");
        let e = Expr::alias("qty", Expr::cast(DataType::Float64, Expr::attr(&a)));
        let resolved = resolve_attribute(&e).unwrap();
        assert_eq!(resolved.id, AttrId(4));
        assert_eq!(resolved.name, "qty");
    }

    #[test]
    fn rejects_arithmetic_shape() {
        let a = attr(1, "a");
        let e = Expr::binary(BinaryOp::Add, Expr::attr(&a), Expr::lit(ScalarValue::Int64(1)));
        assert!(resolve_attribute(&e).is_err());
    }

    #[test]
    fn batch_resolution_is_all_or_nothing() {
        let a = attr(1, "a");
        let good = Expr::attr(&a);
        let bad = Expr::Function {
            name: "upper".into(),
            args: vec![Expr::attr(&a)],
        };
        assert!(resolve_attributes(&[good.clone()]).is_ok());
        assert!(resolve_attributes(&[good, bad]).is_err());
    }
}
