//! Expression nodes used in predicates and computed assignments.
//!
//! An [`Expr`] renders itself into a [`QueryBuilder`] and registers its own
//! arguments during that same walk. Statements never collect expression
//! arguments separately.

use crate::args::split_placeholders;
use crate::query_builder::{Arg, QueryBuilder};
use crate::schema::{ColumnRef, ColumnType};
use crate::value::Value;

/// Expression node.
#[derive(Clone, Debug)]
pub enum Expr {
    /// A column, rendered as `table.column`.
    Column(ColumnRef),

    /// A bound literal.
    Literal(Arg),

    /// Binary comparison: `left op right`
    Compare {
        left: Box<Expr>,
        op: &'static str,
        right: Box<Expr>,
    },

    /// AND group: all conditions must be true.
    And(Vec<Expr>),

    /// OR group: at least one condition must be true.
    Or(Vec<Expr>),

    /// NOT: negate the inner expression.
    Not(Box<Expr>),

    /// `expr IS NULL` / `expr IS NOT NULL`
    IsNull { expr: Box<Expr>, negated: bool },

    /// `expr IN (...)` / `expr NOT IN (...)`
    InList {
        expr: Box<Expr>,
        values: Vec<Arg>,
        negated: bool,
    },

    /// Template with `?` placeholders bound to `args` in order.
    Template { sql: String, args: Vec<Arg> },

    /// Raw SQL fragment without parameters.
    Raw(String),

    /// Always true.
    True,

    /// Always false.
    False,
}

fn arg_for(column: &ColumnRef, value: Value) -> Arg {
    Arg {
        column_type: column.column_type().clone(),
        value,
    }
}

/// Best-effort column type for a value that is not bound to a column.
fn inferred_type(value: &Value) -> ColumnType {
    match value {
        Value::Bool(_) => ColumnType::Boolean,
        Value::SmallInt(_) => ColumnType::SmallInt,
        Value::Int(_) => ColumnType::Integer,
        Value::BigInt(_) => ColumnType::BigInt,
        Value::Double(_) => ColumnType::Double,
        #[cfg(feature = "rust_decimal")]
        Value::Decimal(_) => ColumnType::Decimal {
            precision: 38,
            scale: 10,
        },
        Value::Bytes(_) => ColumnType::Binary,
        Value::Uuid(_) => ColumnType::Uuid,
        Value::Date(_) => ColumnType::Date,
        Value::Timestamp(_) => ColumnType::Timestamp,
        Value::TimestampTz(_) => ColumnType::TimestampTz,
        Value::Json(_) => ColumnType::Json,
        Value::Null | Value::Text(_) => ColumnType::Text,
    }
}

impl Expr {
    pub fn col(column: &ColumnRef) -> Self {
        Expr::Column(column.clone())
    }

    /// A literal typed after its value.
    pub fn lit(value: impl Into<Value>) -> Self {
        let value = value.into();
        Expr::Literal(Arg {
            column_type: inferred_type(&value),
            value,
        })
    }

    /// A literal typed after a column.
    pub fn typed(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Expr::Literal(arg_for(column, value.into()))
    }

    pub fn compare(left: Expr, op: &'static str, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn compare_value(column: &ColumnRef, op: &'static str, value: Value) -> Self {
        Self::compare(Self::col(column), op, Expr::Literal(arg_for(column, value)))
    }

    /// `column = value`
    pub fn eq(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare_value(column, "=", value.into())
    }

    /// `column <> value`
    pub fn ne(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare_value(column, "<>", value.into())
    }

    /// `column > value`
    pub fn gt(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare_value(column, ">", value.into())
    }

    /// `column >= value`
    pub fn gte(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare_value(column, ">=", value.into())
    }

    /// `column < value`
    pub fn lt(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare_value(column, "<", value.into())
    }

    /// `column <= value`
    pub fn lte(column: &ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare_value(column, "<=", value.into())
    }

    /// `column LIKE pattern`
    pub fn like(column: &ColumnRef, pattern: impl Into<Value>) -> Self {
        Self::compare(
            Self::col(column),
            "LIKE",
            Expr::Literal(Arg::new(ColumnType::Text, pattern)),
        )
    }

    /// `a = b` between two columns.
    pub fn eq_col(a: &ColumnRef, b: &ColumnRef) -> Self {
        Self::compare(Self::col(a), "=", Self::col(b))
    }

    pub fn is_null(column: &ColumnRef) -> Self {
        Expr::IsNull {
            expr: Box::new(Self::col(column)),
            negated: false,
        }
    }

    pub fn is_not_null(column: &ColumnRef) -> Self {
        Expr::IsNull {
            expr: Box::new(Self::col(column)),
            negated: true,
        }
    }

    /// `column IN (values...)`; an empty list is always false.
    pub fn in_list<T: Into<Value>>(column: &ColumnRef, values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<Arg> = values
            .into_iter()
            .map(|v| arg_for(column, v.into()))
            .collect();
        if values.is_empty() {
            return Expr::False;
        }
        Expr::InList {
            expr: Box::new(Self::col(column)),
            values,
            negated: false,
        }
    }

    /// `column NOT IN (values...)`; an empty list is always true.
    pub fn not_in<T: Into<Value>>(column: &ColumnRef, values: impl IntoIterator<Item = T>) -> Self {
        match Self::in_list(column, values) {
            Expr::InList { expr, values, .. } => Expr::InList {
                expr,
                values,
                negated: true,
            },
            _ => Expr::True,
        }
    }

    /// Template expression with `?` placeholders.
    ///
    /// # Example
    /// ```ignore
    /// Expr::template("counter + ?", vec![Arg::new(ColumnType::Integer, 1)])
    /// ```
    pub fn template(sql: impl Into<String>, args: Vec<Arg>) -> Self {
        Expr::Template {
            sql: sql.into(),
            args,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut exprs) => {
                exprs.push(other);
                Expr::And(exprs)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut exprs) => {
                exprs.push(other);
                Expr::Or(exprs)
            }
            first => Expr::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    fn is_group(&self) -> bool {
        matches!(self, Expr::And(_) | Expr::Or(_))
    }

    fn append_group(&self, qb: &mut QueryBuilder, exprs: &[Expr], sep: &str, empty: &str) {
        if exprs.is_empty() {
            qb.push(empty);
            return;
        }
        qb.append_separated(exprs, sep, |qb, e| {
            if e.is_group() {
                qb.push_char('(');
                e.append_to(qb);
                qb.push_char(')');
            } else {
                e.append_to(qb);
            }
        });
    }

    /// Render the expression and register its arguments.
    pub fn append_to(&self, qb: &mut QueryBuilder) {
        match self {
            Expr::Column(column) => {
                qb.push(column.table()).push_char('.').push(column.name());
            }
            Expr::Literal(arg) => {
                qb.register_arg(arg);
            }
            Expr::Compare { left, op, right } => {
                left.append_to(qb);
                qb.push_char(' ').push(op).push_char(' ');
                right.append_to(qb);
            }
            Expr::And(exprs) => self.append_group(qb, exprs, " AND ", "1=1"),
            Expr::Or(exprs) => self.append_group(qb, exprs, " OR ", "1=0"),
            Expr::Not(inner) => {
                qb.push("NOT (");
                inner.append_to(qb);
                qb.push_char(')');
            }
            Expr::IsNull { expr, negated } => {
                expr.append_to(qb);
                qb.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                expr.append_to(qb);
                qb.push(if *negated { " NOT IN (" } else { " IN (" });
                qb.append_separated(values, ", ", |qb, arg| {
                    qb.register_arg(arg);
                });
                qb.push_char(')');
            }
            Expr::Template { sql, args } => {
                let mut args = args.iter();
                for (i, piece) in split_placeholders(sql).into_iter().enumerate() {
                    if i > 0 {
                        match args.next() {
                            Some(arg) => qb.register_arg(arg),
                            None => qb.push_char('?'),
                        };
                    }
                    qb.push(piece);
                }
            }
            Expr::Raw(sql) => {
                qb.push(sql);
            }
            Expr::True => {
                qb.push("1=1");
            }
            Expr::False => {
                qb.push("1=0");
            }
        }
    }

    /// Render in isolation. Handy for diagnostics and tests.
    pub fn to_sql(&self, prepared: bool) -> (String, Vec<Arg>) {
        let mut qb = QueryBuilder::new(prepared);
        self.append_to(&mut qb);
        qb.finish()
    }
}
