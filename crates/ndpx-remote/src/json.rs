//! # JSON Directive Serializer
//!
//! The reference [`PushdownSerializer`]: renders filter sets and aggregates
//! as the remote tier's JSON directive format, and the filter set as query
//! text (delegated to [`crate::query_text`]).
//!
//! Output is deterministic: `serde_json`'s map keys are ordered, operand
//! lists follow input order, and no timestamps or random ids are emitted.
//! The rewrite engine's idempotence relies on re-serializing identical
//! inputs to identical strings.

use crate::query_text;
use ndpx_core::expr::{
    AggExpr, AggFunc, AttributeRef, DataType, Expr, ScalarValue, UnaryOp,
};
use ndpx_core::remote::{PushdownSerializer, SerializeError};
use serde_json::{json, Value};
use tracing::trace;

/// Base for attribute ids synthesized for remote aggregate output columns.
/// Plans assign ids from zero upward; this range stays clear of them.
const SYNTH_ID_BASE: u32 = 1 << 30;

/// Reference serializer for the remote tier's JSON directive format.
#[derive(Debug, Default, Clone, Copy)]
pub struct NdpJsonSerializer;

impl NdpJsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl PushdownSerializer for NdpJsonSerializer {
    fn filters_to_query_text(
        &self,
        schema: &[AttributeRef],
        filters: &[Expr],
        columns: &[AttributeRef],
    ) -> Result<String, SerializeError> {
        query_text::render_query(schema, filters, columns)
    }

    fn filters_to_json(
        &self,
        filters: &[Expr],
        schema: &[AttributeRef],
    ) -> Result<String, SerializeError> {
        let rendered = filters
            .iter()
            .map(|f| expr_to_value(f, schema))
            .collect::<Result<Vec<_>, _>>()?;
        let doc = json!({ "filters": rendered });
        trace!("serialized {} filter(s)", filters.len());
        Ok(doc.to_string())
    }

    fn aggregate_to_json(
        &self,
        group_by: &[Expr],
        aggregates: &[AggExpr],
        schema: &[AttributeRef],
        top_aggregate: bool,
    ) -> Result<String, SerializeError> {
        let groups = group_by
            .iter()
            .map(|g| expr_to_value(g, schema))
            .collect::<Result<Vec<_>, _>>()?;
        let aggs = aggregates
            .iter()
            .map(|agg| {
                if agg.distinct || agg.filter.is_some() {
                    return Err(SerializeError::UnsupportedExpression(format!(
                        "modified aggregate {}",
                        agg.func.token()
                    )));
                }
                Ok(json!({
                    "func": agg.func.token(),
                    "arg": expr_to_value(&agg.arg, schema)?,
                }))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let doc = json!({
            "aggregates": aggs,
            "groupby": groups,
            "top": top_aggregate,
        });
        Ok(doc.to_string())
    }

    fn aggregate_schema(&self, aggregates: &[AggExpr], group_by: &[Expr]) -> Vec<AttributeRef> {
        let mut out: Vec<AttributeRef> = group_by
            .iter()
            .enumerate()
            .map(|(i, g)| match g.output_attribute() {
                Some(attr) => attr,
                None => AttributeRef::new(
                    SYNTH_ID_BASE + i as u32,
                    format!("_group{i}"),
                    DataType::Int64,
                    true,
                ),
            })
            .collect();
        let group_width = out.len();
        out.extend(aggregates.iter().enumerate().map(|(i, agg)| {
            let arg = query_text::render_expr(&agg.arg).unwrap_or_else(|_| "?".into());
            AttributeRef::new(
                SYNTH_ID_BASE + (group_width + i) as u32,
                format!("{}({arg})", agg.func.token()),
                aggregate_output_type(agg),
                true,
            )
        }));
        out
    }

    fn supported_filters(&self, filters: &[Expr]) -> Vec<bool> {
        filters
            .iter()
            .map(|f| expr_to_value(f, &[]).is_ok())
            .collect()
    }
}

/// Output type of a remote aggregate column.
fn aggregate_output_type(agg: &AggExpr) -> DataType {
    match agg.func {
        AggFunc::Count => DataType::Int64,
        AggFunc::Sum | AggFunc::Min | AggFunc::Max | AggFunc::Avg => {
            infer_arg_type(&agg.arg).unwrap_or(DataType::Int64)
        }
    }
}

fn infer_arg_type(expr: &Expr) -> Option<DataType> {
    match expr {
        Expr::Attribute(a) => Some(a.data_type),
        Expr::Cast { to, .. } => Some(*to),
        Expr::Alias { child, .. } => infer_arg_type(child),
        Expr::Literal(ScalarValue::Float64(_)) => Some(DataType::Float64),
        Expr::Literal(ScalarValue::Int64(_)) => Some(DataType::Int64),
        Expr::BinaryOp { left, right, .. } => {
            match (infer_arg_type(left), infer_arg_type(right)) {
                (Some(DataType::Float64), _) | (_, Some(DataType::Float64)) => {
                    Some(DataType::Float64)
                }
                (l, r) => l.or(r),
            }
        }
        _ => None,
    }
}

/// One expression as a JSON directive value.
///
/// Column references prefer the name the given schema carries for their id,
/// so references line up with renamed output columns (the aggregate top
/// stage sees its partial columns under generated names).
fn expr_to_value(expr: &Expr, schema: &[AttributeRef]) -> Result<Value, SerializeError> {
    match expr {
        Expr::Attribute(a) => {
            let name = schema
                .iter()
                .find(|s| s.id == a.id)
                .map(|s| s.name.as_str())
                .unwrap_or(a.name.as_str());
            Ok(json!({ "column": name }))
        }
        Expr::Literal(v) => Ok(literal_to_value(v)),
        Expr::Alias { child, .. } | Expr::Cast { child, .. } => expr_to_value(child, schema),
        Expr::BinaryOp { op, left, right } => Ok(json!({
            "op": op.token(),
            "left": expr_to_value(left, schema)?,
            "right": expr_to_value(right, schema)?,
        })),
        Expr::UnaryOp { op, operand } => {
            let tag = match op {
                UnaryOp::Not => "not",
                UnaryOp::Neg => "neg",
                UnaryOp::IsNull => "isnull",
                UnaryOp::IsNotNull => "isnotnull",
            };
            Ok(json!({ "op": tag, "operand": expr_to_value(operand, schema)? }))
        }
        Expr::InList { expr, list } => Ok(json!({
            "op": "in",
            "operand": expr_to_value(expr, schema)?,
            "values": list.iter().map(literal_to_value).collect::<Vec<_>>(),
        })),
        Expr::StringMatch { op, expr, pattern } => Ok(json!({
            "op": op.token(),
            "operand": expr_to_value(expr, schema)?,
            "pattern": pattern,
        })),
        Expr::And(children) => Ok(json!({
            "op": "and",
            "operands": children
                .iter()
                .map(|c| expr_to_value(c, schema))
                .collect::<Result<Vec<_>, _>>()?,
        })),
        Expr::Or(children) => Ok(json!({
            "op": "or",
            "operands": children
                .iter()
                .map(|c| expr_to_value(c, schema))
                .collect::<Result<Vec<_>, _>>()?,
        })),
        Expr::Function { name, .. } => Err(SerializeError::UnsupportedExpression(format!(
            "function {name}"
        ))),
        Expr::Aggregate(agg) => Err(SerializeError::UnsupportedExpression(format!(
            "aggregate {}",
            agg.func.token()
        ))),
    }
}

fn literal_to_value(v: &ScalarValue) -> Value {
    match v {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(b) => json!(b),
        ScalarValue::Int64(i) => json!(i),
        ScalarValue::Float64(f) => json!(f.into_inner()),
        ScalarValue::Utf8(s) => json!(s),
        ScalarValue::Date(d) => json!({ "date": d }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndpx_core::expr::BinaryOp;

    fn attr(id: u32, name: &str) -> AttributeRef {
        AttributeRef::new(id, name, DataType::Int64, true)
    }

    #[test]
    fn filters_serialize_deterministically() {
        let a = attr(1, "a");
        let filter = Expr::binary(
            BinaryOp::Gt,
            Expr::attr(&a),
            Expr::lit(ScalarValue::Int64(10)),
        );
        let s = NdpJsonSerializer::new();
        let one = s.filters_to_json(&[filter.clone()], &[a.clone()]).unwrap();
        let two = s.filters_to_json(&[filter], &[a]).unwrap();
        assert_eq!(one, two);
        assert!(one.contains("\"column\":\"a\""));
    }

    #[test]
    fn schema_name_wins_over_expression_name() {
        let a = attr(1, "a");
        let renamed = a.renamed("a_out");
        let filter = Expr::is_not_null(&a);
        let s = NdpJsonSerializer::new();
        let json = s.filters_to_json(&[filter], &[renamed]).unwrap();
        assert!(json.contains("\"column\":\"a_out\""));
    }

    #[test]
    fn supported_filters_reports_per_filter() {
        let a = attr(1, "a");
        let good = Expr::is_not_null(&a);
        let bad = Expr::Function {
            name: "soundex".into(),
            args: vec![Expr::attr(&a)],
        };
        let s = NdpJsonSerializer::new();
        assert_eq!(s.supported_filters(&[good, bad]), vec![true, false]);
    }

    #[test]
    fn aggregate_schema_orders_groups_then_aggregates() {
        let g = attr(1, "g");
        let v = attr(2, "v");
        let s = NdpJsonSerializer::new();
        let aggs = vec![
            AggExpr::new(AggFunc::Max, Expr::attr(&v)),
            AggExpr::new(AggFunc::Sum, Expr::attr(&v)),
        ];
        let schema = s.aggregate_schema(&aggs, &[Expr::attr(&g)]);
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[0].name, "g");
        assert_eq!(schema[1].name, "max(v)");
        assert_eq!(schema[2].name, "sum(v)");
        // group column keeps its plan id; aggregate columns get fresh ones
        assert_eq!(schema[0].id, g.id);
        assert_ne!(schema[1].id, schema[2].id);
    }

    #[test]
    fn aggregate_json_carries_top_flag() {
        let v = attr(2, "v");
        let s = NdpJsonSerializer::new();
        let aggs = vec![AggExpr::new(AggFunc::Sum, Expr::attr(&v))];
        let schema = s.aggregate_schema(&aggs, &[]);
        let partial = s.aggregate_to_json(&[], &aggs, &schema, false).unwrap();
        let top = s.aggregate_to_json(&[], &aggs, &schema, true).unwrap();
        assert!(partial.contains("\"top\":false"));
        assert!(top.contains("\"top\":true"));
        assert_ne!(partial, top);
    }

    #[test]
    fn distinct_aggregate_is_rejected() {
        let v = attr(2, "v");
        let mut agg = AggExpr::new(AggFunc::Sum, Expr::attr(&v));
        agg.distinct = true;
        let s = NdpJsonSerializer::new();
        assert!(s.aggregate_to_json(&[], &[agg], &[], false).is_err());
    }
}
