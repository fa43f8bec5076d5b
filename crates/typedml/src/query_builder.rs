//! The single traversal that writes SQL text and registers arguments.
//!
//! Every renderer (statements, dialects, expressions) writes into one
//! [`QueryBuilder`]. In prepared mode each bound value becomes a `?` and an
//! [`Arg`] is recorded at the same moment, so the placeholder order and the
//! argument order cannot drift apart.

use crate::expr::Expr;
use crate::schema::ColumnType;
use crate::value::Value;

/// One bound parameter: the column type that converts it and the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub column_type: ColumnType,
    pub value: Value,
}

impl Arg {
    pub fn new(column_type: ColumnType, value: impl Into<Value>) -> Self {
        Self {
            column_type,
            value: value.into(),
        }
    }

    /// SQL literal form of the value.
    pub fn literal(&self) -> String {
        self.column_type.literal(&self.value)
    }
}

/// SQL text accumulator with ordered argument registration.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    prepared: bool,
    sql: String,
    args: Vec<Arg>,
}

impl QueryBuilder {
    /// Create a builder. `prepared = false` inlines literals instead of `?`.
    pub fn new(prepared: bool) -> Self {
        Self {
            prepared,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_char(&mut self, c: char) -> &mut Self {
        self.sql.push(c);
        self
    }

    /// Bind a value: `?` plus a recorded argument, or the inlined literal.
    pub fn register_argument(&mut self, column_type: &ColumnType, value: &Value) -> &mut Self {
        if self.prepared {
            self.sql.push('?');
            self.args.push(Arg {
                column_type: column_type.clone(),
                value: value.clone(),
            });
        } else {
            self.sql.push_str(&column_type.literal(value));
        }
        self
    }

    pub fn register_arg(&mut self, arg: &Arg) -> &mut Self {
        self.register_argument(&arg.column_type, &arg.value)
    }

    pub fn append_expr(&mut self, expr: &Expr) -> &mut Self {
        expr.append_to(self);
        self
    }

    /// Write `items` separated by `sep`, rendering each with `f`.
    pub fn append_separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut f: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            f(self, item);
        }
        self
    }

    /// Same as [`append_separated`](Self::append_separated) for fallible renderers.
    pub fn try_append_separated<T, E>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut f: impl FnMut(&mut Self, T) -> Result<(), E>,
    ) -> Result<&mut Self, E> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            f(self, item)?;
        }
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn finish(self) -> (String, Vec<Arg>) {
        (self.sql, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepared_registers_placeholder_and_arg() {
        let mut qb = QueryBuilder::new(true);
        qb.push("a = ")
            .register_argument(&ColumnType::Integer, &Value::Int(1))
            .push(" AND b = ")
            .register_argument(&ColumnType::Text, &Value::from("x"));
        let (sql, args) = qb.finish();
        assert_eq!(sql, "a = ? AND b = ?");
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].value, Value::from("x"));
    }

    #[test]
    fn test_unprepared_inlines_literals() {
        let mut qb = QueryBuilder::new(false);
        qb.push("a = ")
            .register_argument(&ColumnType::Text, &Value::from("o'k"));
        let (sql, args) = qb.finish();
        assert_eq!(sql, "a = 'o''k'");
        assert!(args.is_empty());
    }

    #[test]
    fn test_append_separated() {
        let mut qb = QueryBuilder::new(true);
        qb.append_separated(["a", "b", "c"], ", ", |qb, s| {
            qb.push(s);
        });
        assert_eq!(qb.sql(), "a, b, c");
    }
}
