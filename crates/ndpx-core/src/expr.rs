//! # Expression and Attribute Types
//!
//! This module defines the scalar expression tree consumed by the pushdown
//! rewriter, along with the attribute references that identify columns inside
//! a plan.
//!
//! ## Attribute Identity
//!
//! An [`AttributeRef`] identifies a column by name, declared type, and
//! nullability, but equality and hashing go through its [`AttrId`] alone. Two
//! columns in one plan may share a name (self-joins, shadowed aliases), so
//! name-based equality would conflate them. The id plays the role of an
//! expression id assigned when the plan is built.
//!
//! ## Expression Shapes
//!
//! [`Expr`] is a closed recursive tree: column references, literals, aliases,
//! casts, binary arithmetic/comparison, unary operators (NOT, negation, null
//! checks), IN-lists, string match predicates, named function calls, flat
//! AND/OR connectives, and embedded aggregate calls. The rewriter classifies
//! these shapes into "pushable" and "not pushable"; anything it does not
//! recognize -- most notably [`Expr::Function`] -- fails closed and keeps
//! execution local.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable identity of a column reference within one plan.
///
/// Attribute equality is by id, never by name: the same plan can contain two
/// distinct columns both named `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrId(pub u32);

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared column type. A small closed set; the remote tier understands
/// exactly these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Days since the Unix epoch.
    Date,
}

impl DataType {
    /// Estimated width of a single value in bytes, used when no column
    /// statistics are available.
    pub fn default_width(&self) -> f64 {
        match self {
            DataType::Boolean => 1.0,
            DataType::Int64 => 8.0,
            DataType::Float64 => 8.0,
            DataType::Utf8 => 32.0,
            DataType::Date => 4.0,
        }
    }
}

/// A column reference carried on plan nodes and inside expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRef {
    pub id: AttrId,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl AttributeRef {
    pub fn new(id: u32, name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            id: AttrId(id),
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Same attribute under a different name (alias resolution keeps the
    /// underlying identity).
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Identity is the attribute id; name and type are descriptive only.
impl PartialEq for AttributeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AttributeRef {}

impl Hash for AttributeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.id)
    }
}

/// Scalar value for literals.
///
/// Uses `OrderedFloat` for `f64` so literal values can participate in
/// Eq/Hash comparisons (needed when deduplicating canonical aggregate
/// expressions).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Date as days since the Unix epoch.
    Date(i32),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(v) => write!(f, "'{v}'"),
            ScalarValue::Date(v) => write!(f, "DATE({v})"),
        }
    }
}

/// Binary operators for comparison and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    /// Token used by the query-text and JSON serializers.
    pub fn token(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Unary operators for boolean logic and null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// String match predicates the remote tier can evaluate natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringMatchOp {
    StartsWith,
    EndsWith,
    Contains,
}

impl StringMatchOp {
    pub fn token(&self) -> &'static str {
        match self {
            StringMatchOp::StartsWith => "startswith",
            StringMatchOp::EndsWith => "endswith",
            StringMatchOp::Contains => "contains",
        }
    }
}

/// Scalar expressions used in filter predicates and projection lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Direct column reference.
    Attribute(AttributeRef),
    /// Constant literal value.
    Literal(ScalarValue),
    /// Named alias over a child expression. Resolution recurses into the
    /// child and keeps the alias name.
    Alias { name: String, child: Box<Expr> },
    /// Type cast. Resolution recurses into the child and discards the cast.
    Cast { to: DataType, child: Box<Expr> },
    /// Binary operation (comparison or arithmetic).
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation (NOT, negation, IS [NOT] NULL).
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    /// Set membership against a literal list (`x IN (1, 2, 3)`).
    InList {
        expr: Box<Expr>,
        list: Vec<ScalarValue>,
    },
    /// String match predicate (STARTS WITH / ENDS WITH / CONTAINS).
    StringMatch {
        op: StringMatchOp,
        expr: Box<Expr>,
        pattern: String,
    },
    /// Named function call. Never pushable; the rewriter fails closed on it.
    Function { name: String, args: Vec<Expr> },
    /// Conjunction stored as a flat list to simplify predicate decomposition
    /// (no nested binary AND trees).
    And(Vec<Expr>),
    /// Disjunction stored as a flat list.
    Or(Vec<Expr>),
    /// Embedded aggregate call; only legal inside an Aggregate node's output
    /// expressions.
    Aggregate(Box<AggExpr>),
}

impl Expr {
    pub fn attr(a: &AttributeRef) -> Self {
        Expr::Attribute(a.clone())
    }

    pub fn lit(v: ScalarValue) -> Self {
        Expr::Literal(v)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn alias(name: impl Into<String>, child: Expr) -> Self {
        Expr::Alias {
            name: name.into(),
            child: Box::new(child),
        }
    }

    pub fn cast(to: DataType, child: Expr) -> Self {
        Expr::Cast {
            to,
            child: Box::new(child),
        }
    }

    pub fn is_not_null(a: &AttributeRef) -> Self {
        Expr::UnaryOp {
            op: UnaryOp::IsNotNull,
            operand: Box::new(Expr::attr(a)),
        }
    }

    /// All column references in this expression, in visit order.
    pub fn attributes(&self) -> Vec<&AttributeRef> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a AttributeRef>) {
        match self {
            Expr::Attribute(a) => out.push(a),
            Expr::Literal(_) => {}
            Expr::Alias { child, .. } | Expr::Cast { child, .. } => child.collect_attributes(out),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_attributes(out);
                right.collect_attributes(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_attributes(out),
            Expr::InList { expr, .. } => expr.collect_attributes(out),
            Expr::StringMatch { expr, .. } => expr.collect_attributes(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_attributes(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_attributes(out);
                }
            }
            Expr::Aggregate(agg) => agg.arg.collect_attributes(out),
        }
    }

    /// All aggregate calls embedded in this expression, in visit order.
    pub fn aggregate_calls(&self) -> Vec<&AggExpr> {
        let mut out = Vec::new();
        self.collect_aggregates(&mut out);
        out
    }

    fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a AggExpr>) {
        match self {
            Expr::Aggregate(agg) => out.push(agg),
            Expr::Attribute(_) | Expr::Literal(_) => {}
            Expr::Alias { child, .. } | Expr::Cast { child, .. } => child.collect_aggregates(out),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_aggregates(out);
                right.collect_aggregates(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_aggregates(out),
            Expr::InList { expr, .. } => expr.collect_aggregates(out),
            Expr::StringMatch { expr, .. } => expr.collect_aggregates(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_aggregates(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_aggregates(out);
                }
            }
        }
    }

    /// Flatten AND-chains: `And([A, And([B, C])])` → `[A, B, C]`.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// The attribute this expression exposes as a plan output, if it has a
    /// column-shaped top. Aliases keep the underlying id under the alias
    /// name; casts keep the column but adopt the cast target type.
    pub fn output_attribute(&self) -> Option<AttributeRef> {
        match self {
            Expr::Attribute(a) => Some(a.clone()),
            Expr::Alias { name, child } => {
                child.output_attribute().map(|a| a.renamed(name.clone()))
            }
            Expr::Cast { to, child } => child.output_attribute().map(|a| AttributeRef {
                data_type: *to,
                ..a
            }),
            _ => None,
        }
    }

    /// Structurally replace attribute references by id. Used to substitute
    /// aliases introduced by an aggregate back into filter/projection
    /// expressions before serialization, so remote references line up with
    /// renamed output columns without any text-level find/replace.
    pub fn rewrite_attributes(&self, f: &impl Fn(&AttributeRef) -> AttributeRef) -> Expr {
        match self {
            Expr::Attribute(a) => Expr::Attribute(f(a)),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Alias { name, child } => Expr::Alias {
                name: name.clone(),
                child: Box::new(child.rewrite_attributes(f)),
            },
            Expr::Cast { to, child } => Expr::Cast {
                to: *to,
                child: Box::new(child.rewrite_attributes(f)),
            },
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.rewrite_attributes(f)),
                right: Box::new(right.rewrite_attributes(f)),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.rewrite_attributes(f)),
            },
            Expr::InList { expr, list } => Expr::InList {
                expr: Box::new(expr.rewrite_attributes(f)),
                list: list.clone(),
            },
            Expr::StringMatch { op, expr, pattern } => Expr::StringMatch {
                op: *op,
                expr: Box::new(expr.rewrite_attributes(f)),
                pattern: pattern.clone(),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.rewrite_attributes(f)).collect(),
            },
            Expr::And(exprs) => Expr::And(exprs.iter().map(|e| e.rewrite_attributes(f)).collect()),
            Expr::Or(exprs) => Expr::Or(exprs.iter().map(|e| e.rewrite_attributes(f)).collect()),
            Expr::Aggregate(agg) => Expr::Aggregate(Box::new(AggExpr {
                func: agg.func,
                arg: agg.arg.rewrite_attributes(f),
                distinct: agg.distinct,
                filter: agg.filter.as_ref().map(|e| e.rewrite_attributes(f)),
            })),
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn token(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
        }
    }
}

/// A single aggregate call: function, argument, and optional modifiers.
///
/// The `filter` clause (`SUM(x) FILTER (WHERE ...)`) is carried so the
/// validator can reject it; the remote tier's aggregate path has no
/// filtered-aggregate concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub arg: Expr,
    pub distinct: bool,
    pub filter: Option<Expr>,
}

impl AggExpr {
    pub fn new(func: AggFunc, arg: Expr) -> Self {
        Self {
            func,
            arg,
            distinct: false,
            filter: None,
        }
    }

    /// Canonical form for deduplication: COUNT is modeled as a remote SUM
    /// over the same argument, so `COUNT(x)` and a hypothetical `SUM`-shaped
    /// rewrite of it share one underlying remote aggregate.
    pub fn canonical(&self) -> AggExpr {
        let func = match self.func {
            AggFunc::Count => AggFunc::Sum,
            other => other,
        };
        AggExpr {
            func,
            arg: self.arg.clone(),
            distinct: self.distinct,
            filter: self.filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(id: u32, name: &str) -> AttributeRef {
        AttributeRef::new(id, name, DataType::Int64, true)
    }

    #[test]
    fn attribute_equality_is_by_id() {
        let a = col(1, "x");
        let b = AttributeRef::new(1, "renamed", DataType::Utf8, false);
        let c = col(2, "x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn conjuncts_flatten_nested_and() {
        let a = Expr::attr(&col(1, "a"));
        let b = Expr::attr(&col(2, "b"));
        let c = Expr::attr(&col(3, "c"));
        let e = Expr::And(vec![a.clone(), Expr::And(vec![b.clone(), c.clone()])]);
        assert_eq!(e.conjuncts(), vec![&a, &b, &c]);
    }

    #[test]
    fn attributes_collects_through_alias_and_cast() {
        let inner = col(7, "price");
        let e = Expr::alias(
            "p",
            Expr::cast(
                DataType::Float64,
                Expr::binary(
                    BinaryOp::Mul,
                    Expr::attr(&inner),
                    Expr::lit(ScalarValue::Int64(2)),
                ),
            ),
        );
        let attrs = e.attributes();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].id, AttrId(7));
    }

    #[test]
    fn output_attribute_keeps_alias_name_and_cast_type() {
        let inner = col(3, "qty");
        let e = Expr::alias("quantity", Expr::cast(DataType::Float64, Expr::attr(&inner)));
        let out = e.output_attribute().unwrap();
        assert_eq!(out.id, AttrId(3));
        assert_eq!(out.name, "quantity");
        assert_eq!(out.data_type, DataType::Float64);
    }

    #[test]
    fn count_canonicalizes_to_sum() {
        let a = AggExpr::new(AggFunc::Count, Expr::attr(&col(1, "a")));
        let b = AggExpr::new(AggFunc::Sum, Expr::attr(&col(1, "a")));
        assert_eq!(a.canonical(), b.canonical());
    }
}
