//! Finder statement building.
//!
//! Every finder starts from a schema's canned select and appends optional
//! `where`, `order by` and `limit` clauses. Caller clauses use the neutral `?`
//! placeholder; their arguments come first, limit arguments last.

use std::fmt;
use std::str::FromStr;

use schema::{Schema, Value};

use crate::OrmError;

// ---------------------------------------------------------------------------
// Limit
// ---------------------------------------------------------------------------

/// Row limit for [`FindAll`]: `limit ?` or `limit ?,?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(u32),
    /// `(offset, count)`
    Range(u32, u32),
}

impl Limit {
    /// Read a limit from loosely-typed input: one integer is a count, two are
    /// an offset and a count.
    ///
    /// # Errors
    /// [`OrmError::InvalidLimit`] for any other shape, or negative integers.
    pub fn from_values(values: &[Value]) -> Result<Self, OrmError> {
        let invalid = || OrmError::InvalidLimit(format!("{values:?}"));
        let number = |v: &Value| {
            v.as_i64()
                .filter(|_| matches!(v, Value::Int(_)))
                .and_then(|n| u32::try_from(n).ok())
        };

        match values {
            [count] => number(count).map(Self::Count).ok_or_else(invalid),
            [offset, count] => match (number(offset), number(count)) {
                (Some(offset), Some(count)) => Ok(Self::Range(offset, count)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Count(_) => "limit ?",
            Self::Range(..) => "limit ?,?",
        }
    }

    fn args(self) -> Vec<Value> {
        match self {
            Self::Count(n) => vec![Value::from(n)],
            Self::Range(offset, count) => vec![Value::from(offset), Value::from(count)],
        }
    }
}

impl From<u32> for Limit {
    fn from(count: u32) -> Self {
        Self::Count(count)
    }
}

impl From<(u32, u32)> for Limit {
    fn from((offset, count): (u32, u32)) -> Self {
        Self::Range(offset, count)
    }
}

/// Parses `"5"` or `"10,20"`.
impl FromStr for Limit {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<i64>().map(Value::Int))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| OrmError::InvalidLimit(s.to_owned()))?;
        Self::from_values(&parts).map_err(|_| OrmError::InvalidLimit(s.to_owned()))
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Range(offset, count) => write!(f, "{offset},{count}"),
        }
    }
}

// ---------------------------------------------------------------------------
// FindAll
// ---------------------------------------------------------------------------

/// Options for [`Record::find_all`](crate::Record::find_all).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAll {
    filter: Option<String>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<Limit>,
}

impl FindAll {
    pub fn new() -> Self {
        Self::default()
    }

    /// `where` clause and the arguments for its placeholders.
    pub fn filter(mut self, clause: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter = Some(clause.into());
        self.args = args;
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Render the statement for `schema` with its arguments in placeholder
    /// order.
    pub fn to_sql(&self, schema: &Schema) -> (String, Vec<Value>) {
        let mut sql = vec![schema.sql().select.clone()];
        let mut args = Vec::new();

        // Filter args only travel with a filter that renders.
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            sql.push("where".into());
            sql.push(filter.to_owned());
            args.extend(self.args.iter().cloned());
        }
        if let Some(order_by) = self.order_by.as_deref().filter(|o| !o.is_empty()) {
            sql.push("order by".into());
            sql.push(order_by.to_owned());
        }
        if let Some(limit) = self.limit {
            sql.push(limit.sql().into());
            args.extend(limit.args());
        }

        (sql.join(" "), args)
    }
}

/// `select <expr> _num_ from <table> [where <filter>]`.
pub fn find_number_sql(schema: &Schema, select_expr: &str, filter: Option<&str>) -> String {
    let mut sql = format!("select {} _num_ from `{}`", select_expr, schema.table());
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        sql.push_str(" where ");
        sql.push_str(filter);
    }
    sql
}

/// The schema's select narrowed to one primary key.
pub fn find_by_pk_sql(schema: &Schema) -> String {
    format!(
        "{} where `{}` = ?",
        schema.sql().select,
        schema.column_of(schema.primary_key())
    )
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use schema::{Field, SchemaDecl};

    use super::*;

    fn users() -> Schema {
        SchemaDecl::new("User")
            .table("users")
            .field("id", Field::integer().primary_key())
            .field("name", Field::string())
            .field("email", Field::string())
            .register()
            .unwrap()
    }

    #[test]
    fn count_limit_appends_one_placeholder() {
        let (sql, args) = FindAll::new().limit(5).to_sql(&users());
        assert_eq!(sql, "select `id`, `name`,`email` from `users` limit ?");
        assert_eq!(args, vec![Value::Int(5)]);
    }

    #[test]
    fn range_limit_appends_two_placeholders() {
        let (sql, args) = FindAll::new().limit((10, 20)).to_sql(&users());
        assert!(sql.ends_with("limit ?,?"));
        assert_eq!(args, vec![Value::Int(10), Value::Int(20)]);
    }

    #[test]
    fn filter_args_come_before_limit_args() {
        let query = FindAll::new()
            .filter("`name` like ?", vec![Value::from("a%")])
            .order_by("`id` desc")
            .limit((0, 3));
        let (sql, args) = query.to_sql(&users());

        assert_eq!(
            sql,
            "select `id`, `name`,`email` from `users` where `name` like ? order by `id` desc limit ?,?"
        );
        assert_eq!(args, vec![Value::from("a%"), Value::Int(0), Value::Int(3)]);
    }

    #[test]
    fn empty_filter_drops_its_args() {
        let (sql, args) = FindAll::new()
            .filter("", vec![Value::Int(1)])
            .limit(5)
            .to_sql(&users());
        assert_eq!(sql, "select `id`, `name`,`email` from `users` limit ?");
        assert_eq!(args, vec![Value::Int(5)]);
    }

    #[test]
    fn limit_from_values_accepts_only_counts_and_pairs() {
        assert_eq!(Limit::from_values(&[Value::Int(5)]).unwrap(), Limit::Count(5));
        assert_eq!(
            Limit::from_values(&[Value::Int(10), Value::Int(20)]).unwrap(),
            Limit::Range(10, 20)
        );

        for bad in [
            vec![Value::from("x")],
            vec![Value::Float(2.5)],
            vec![Value::Int(-1)],
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            vec![],
        ] {
            assert!(
                matches!(Limit::from_values(&bad), Err(OrmError::InvalidLimit(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn limit_parses_from_str() {
        assert_eq!("5".parse::<Limit>().unwrap(), Limit::Count(5));
        assert_eq!(" 10, 20 ".parse::<Limit>().unwrap(), Limit::Range(10, 20));
        assert_eq!(Limit::Range(10, 20).to_string(), "10,20");

        let err = "x".parse::<Limit>().unwrap_err();
        assert!(matches!(err, OrmError::InvalidLimit(_)));
        assert_eq!(err.to_string(), "invalid limit value: x");
    }

    #[test]
    fn find_number_and_pk_statements() {
        let users = users();
        assert_eq!(
            find_number_sql(&users, "count(`id`)", Some("`name` = ?")),
            "select count(`id`) _num_ from `users` where `name` = ?"
        );
        assert_eq!(
            find_number_sql(&users, "count(*)", None),
            "select count(*) _num_ from `users`"
        );
        assert_eq!(
            find_by_pk_sql(&users),
            "select `id`, `name`,`email` from `users` where `id` = ?"
        );
    }
}
