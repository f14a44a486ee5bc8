//! Query execution against a pooled connection.
//!
//! Both entry points follow the same discipline:
//! 1. Log the statement.
//! 2. Rewrite neutral `?` placeholders into the backend's marker.
//! 3. Borrow a connection for exactly the duration of the statement.
//! 4. Log the outcome; driver failures are logged, then returned.

use std::borrow::Cow;

use schema::{Row, Value};
use tracing::{debug, error, info, instrument};

use crate::{DbError, DriverError, ParamStyle, Pool};

/// Runs statements through a [`Pool`].
#[derive(Debug, Clone)]
pub struct Executor {
    pool: Pool,
}

impl Executor {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run a row-returning statement, fetching at most `limit` rows.
    ///
    /// # Errors
    /// Pool errors from acquisition, or [`DbError::Query`] from the driver.
    #[instrument(level = "debug", skip(self, args), fields(args = args.len()))]
    pub async fn run_query(
        &self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DbError> {
        log_sql(sql, args);
        let native = rewrite_placeholders(sql, self.pool.param_style());

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch(&native, args, limit)
            .await
            .map_err(|source| query_failed(&native, source))?;

        info!("rows returned: {}", rows.len());
        Ok(rows)
    }

    /// Run an insert, update or delete and return the affected-row count.
    ///
    /// # Errors
    /// Pool errors from acquisition, or [`DbError::Query`] from the driver.
    #[instrument(level = "debug", skip(self, args), fields(args = args.len()))]
    pub async fn run_mutation(&self, sql: &str, args: &[Value]) -> Result<u64, DbError> {
        log_sql(sql, args);
        let native = rewrite_placeholders(sql, self.pool.param_style());

        let mut conn = self.pool.acquire().await?;
        let affected = conn
            .execute(&native, args)
            .await
            .map_err(|source| query_failed(&native, source))?;

        info!("rows affected: {}", affected);
        Ok(affected)
    }
}

fn log_sql(sql: &str, args: &[Value]) {
    info!("SQL: {}", sql);
    debug!("args: {:?}", args);
}

fn query_failed(sql: &str, source: DriverError) -> DbError {
    error!("query failed: {} (sql: {})", source, sql);
    DbError::Query {
        sql: sql.to_owned(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Placeholder rewriting
// ---------------------------------------------------------------------------

/// Translate neutral `?` placeholders into `style`.
///
/// Markers inside quoted literals and identifiers are left alone. For
/// [`ParamStyle::Format`] literal `%` signs are doubled so the driver doesn't
/// read them as markers.
pub fn rewrite_placeholders(sql: &str, style: ParamStyle) -> Cow<'_, str> {
    if style == ParamStyle::Question {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut index = 0usize;

    for ch in sql.chars() {
        match (quote, ch) {
            (_, '%') if style == ParamStyle::Format => out.push_str("%%"),
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"' | '`') => {
                quote = Some(ch);
                out.push(ch);
            }
            (None, '?') => {
                index += 1;
                match style {
                    ParamStyle::Format => out.push_str("%s"),
                    ParamStyle::Numbered => {
                        out.push('$');
                        out.push_str(&index.to_string());
                    }
                    ParamStyle::Question => out.push('?'),
                }
            }
            (None, c) => out.push(c),
        }
    }

    Cow::Owned(out)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{row, MockConnector};
    use crate::PoolConfig;

    async fn executor(connector: &MockConnector) -> Executor {
        let config = PoolConfig::new("root", "secret", "test").with_size(1, 2);
        Executor::new(Pool::create(&config, connector.clone()).await.unwrap())
    }

    #[test]
    fn question_style_is_untouched() {
        let sql = "select * from `t` where `a` = ?";
        assert!(matches!(
            rewrite_placeholders(sql, ParamStyle::Question),
            Cow::Borrowed(s) if s == sql
        ));
    }

    #[test]
    fn format_style_rewrites_markers_and_escapes_percent() {
        let sql = "select `id` from `t` where `name` like 'a%' and `id` = ? limit ?,?";
        assert_eq!(
            rewrite_placeholders(sql, ParamStyle::Format),
            "select `id` from `t` where `name` like 'a%%' and `id` = %s limit %s,%s"
        );
    }

    #[test]
    fn numbered_style_counts_markers_outside_quotes() {
        let sql = "update `t` set `a`=?,`b`='why?' where `id`=?";
        assert_eq!(
            rewrite_placeholders(sql, ParamStyle::Numbered),
            "update `t` set `a`=$1,`b`='why?' where `id`=$2"
        );
    }

    #[tokio::test]
    async fn run_query_rewrites_and_returns_rows() {
        let connector = MockConnector::new().with_param_style(ParamStyle::Format);
        connector.push_rows(vec![
            row([("id", Value::Int(1))]),
            row([("id", Value::Int(2))]),
            row([("id", Value::Int(3))]),
        ]);
        let db = executor(&connector).await;

        let rows = db
            .run_query("select `id` from `t` where `id` > ?", &[Value::Int(0)], Some(2))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let stmt = connector.last_statement().unwrap();
        assert_eq!(stmt.sql, "select `id` from `t` where `id` > %s");
        assert_eq!(stmt.args, vec![Value::Int(0)]);
        assert_eq!(db.pool().status().in_use, 0);
    }

    #[tokio::test]
    async fn run_mutation_returns_affected_rows() {
        let connector = MockConnector::new();
        connector.push_affected(3);
        let db = executor(&connector).await;

        let affected = db.run_mutation("delete from `t`", &[]).await.unwrap();
        assert_eq!(affected, 3);
    }

    #[tokio::test]
    async fn driver_errors_are_returned_and_release_the_connection() {
        let connector = MockConnector::new();
        connector.push_error("You have an error in your SQL syntax");
        let db = executor(&connector).await;

        let err = db.run_mutation("delet from `t`", &[]).await.unwrap_err();
        assert!(matches!(
            &err,
            DbError::Query { sql, .. } if sql == "delet from `t`"
        ));
        assert!(err.to_string().contains("SQL syntax"));

        let status = db.pool().status();
        assert_eq!((status.in_use, status.idle), (0, 1));
    }

    #[tokio::test]
    async fn queries_fail_after_destroy() {
        let connector = MockConnector::new();
        let db = executor(&connector).await;
        db.pool().destroy().await;

        let err = db.run_query("select 1", &[], None).await.unwrap_err();
        assert!(matches!(err, DbError::PoolClosed));
        assert!(connector.statements().is_empty());
    }
}
