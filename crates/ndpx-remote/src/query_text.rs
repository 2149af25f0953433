//! # Query Text Rendering
//!
//! Renders a filter set as the remote tier's query text: a deterministic,
//! SQL-shaped `SELECT columns WHERE predicates` string. Rendering recurses
//! over the same expression grammar the classifier accepts; any shape
//! outside it is an error the rewrite engine maps to "keep this filter
//! local".

use ndpx_core::expr::{AttributeRef, Expr, ScalarValue, StringMatchOp, UnaryOp};
use ndpx_core::remote::SerializeError;

/// Render the full remote query over the given read columns.
///
/// Every column referenced by a filter must exist in `schema`; a dangling
/// reference means the schema description handed over is unusable.
pub fn render_query(
    schema: &[AttributeRef],
    filters: &[Expr],
    columns: &[AttributeRef],
) -> Result<String, SerializeError> {
    for filter in filters {
        for attr in filter.attributes() {
            if !schema.iter().any(|s| s.id == attr.id) {
                return Err(SerializeError::MalformedSchema(format!(
                    "filter references {attr} which is not in the relation schema"
                )));
            }
        }
    }

    let select = columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    if filters.is_empty() {
        return Ok(format!("SELECT {select}"));
    }
    let predicates = filters
        .iter()
        .map(render_expr)
        .collect::<Result<Vec<_>, _>>()?
        .join(" AND ");
    Ok(format!("SELECT {select} WHERE {predicates}"))
}

/// Render one predicate or scalar expression.
pub fn render_expr(expr: &Expr) -> Result<String, SerializeError> {
    match expr {
        Expr::Attribute(a) => Ok(a.name.clone()),
        Expr::Literal(v) => Ok(render_literal(v)),
        // aliases and casts are transparent on the wire; the remote tier
        // sees underlying columns only
        Expr::Alias { child, .. } | Expr::Cast { child, .. } => render_expr(child),
        Expr::BinaryOp { op, left, right } => Ok(format!(
            "({} {} {})",
            render_expr(left)?,
            op.token(),
            render_expr(right)?
        )),
        Expr::UnaryOp { op, operand } => {
            let inner = render_expr(operand)?;
            Ok(match op {
                UnaryOp::Not => format!("(NOT {inner})"),
                UnaryOp::Neg => format!("(-{inner})"),
                UnaryOp::IsNull => format!("({inner} IS NULL)"),
                UnaryOp::IsNotNull => format!("({inner} IS NOT NULL)"),
            })
        }
        Expr::InList { expr, list } => {
            let values = list
                .iter()
                .map(render_literal)
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!("({} IN ({values}))", render_expr(expr)?))
        }
        Expr::StringMatch { op, expr, pattern } => {
            let inner = render_expr(expr)?;
            Ok(match op {
                StringMatchOp::StartsWith => format!("({inner} LIKE '{pattern}%')"),
                StringMatchOp::EndsWith => format!("({inner} LIKE '%{pattern}')"),
                StringMatchOp::Contains => format!("({inner} LIKE '%{pattern}%')"),
            })
        }
        Expr::And(children) => {
            let parts = children
                .iter()
                .map(render_expr)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(" AND ")))
        }
        Expr::Or(children) => {
            let parts = children
                .iter()
                .map(render_expr)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
        Expr::Function { name, .. } => Err(SerializeError::UnsupportedExpression(format!(
            "function {name}"
        ))),
        Expr::Aggregate(agg) => Err(SerializeError::UnsupportedExpression(format!(
            "aggregate {}",
            agg.func.token()
        ))),
    }
}

fn render_literal(v: &ScalarValue) -> String {
    v.to_string()
}
