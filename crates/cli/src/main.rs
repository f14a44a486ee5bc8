//! `tinyorm` CLI entry-point.
//!
//! Available sub-commands:
//! - `sql`          — print a schema's generated statements.
//! - `ddl`          — print a schema's `create table` statement.
//! - `create-table` — run that statement against the database.
//! - `find`         — load one record by primary key.
//! - `list`         — run `find_all` with optional where/order/limit.
//! - `count`        — run `find_number`.
//!
//! Records are printed as one JSON object per line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use db::{Executor, Pool, PoolConfig, SqliteConnector};
use orm::{FindAll, Limit, Record};
use schema::{Schema, SchemaFile, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tinyorm",
    about = "Inspect schemas and query records through a connection pool",
    version
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the select/insert/update/delete statements of a schema file.
    Sql { schema: PathBuf },
    /// Print the `create table` statement of a schema file.
    Ddl { schema: PathBuf },
    /// Create the schema's table.
    CreateTable {
        schema: PathBuf,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Load one record by primary key.
    Find {
        schema: PathBuf,
        /// Primary key value.
        pk: String,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// List records.
    List {
        schema: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        order_by: Option<String>,
        /// `N` or `OFFSET,N`.
        #[arg(long)]
        limit: Option<Limit>,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Evaluate an aggregate over the schema's table.
    Count {
        schema: PathBuf,
        #[arg(long, default_value = "count(*)")]
        expr: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        conn: ConnArgs,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// `where` clause using `?` placeholders.
    #[arg(long = "where")]
    filter: Option<String>,
    /// Placeholder argument; repeat in order.
    #[arg(long = "arg")]
    args: Vec<String>,
}

impl FilterArgs {
    fn values(&self) -> Vec<Value> {
        self.args.iter().map(|a| Value::parse_literal(a)).collect()
    }
}

#[derive(Args)]
struct ConnArgs {
    /// Use a SQLite database at this URL instead of MySQL.
    #[arg(long, env = "DB_SQLITE_URL")]
    sqlite: Option<String>,
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    host: String,
    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    port: u16,
    #[arg(long, env = "DB_USER")]
    user: Option<String>,
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, env = "DB_NAME")]
    database: Option<String>,
    #[arg(long, env = "DB_CHARSET", default_value = "utf8")]
    charset: String,
    #[arg(long, env = "DB_MIN_SIZE", default_value_t = 1)]
    min_size: usize,
    #[arg(long, env = "DB_MAX_SIZE", default_value_t = 10)]
    max_size: usize,
}

impl ConnArgs {
    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            charset: self.charset.clone(),
            min_size: self.min_size,
            max_size: self.max_size,
            ..PoolConfig::default()
        }
    }

    async fn connect(&self) -> Result<Pool> {
        let pool = match &self.sqlite {
            Some(url) => {
                let config = PoolConfig::new("sqlite", "", url.as_str()).with_size(1, 1);
                Pool::create(&config, SqliteConnector::new(url)?).await
            }
            None => db::create_pool(&self.pool_config()).await,
        };
        pool.context("failed to create connection pool")
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_schema(path: &Path) -> Result<Arc<Schema>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read schema file {}", path.display()))?;
    let schema = SchemaFile::parse(&source)?.into_decl()?.register()?;
    Ok(Arc::new(schema))
}

fn print_record(record: &Record) -> Result<()> {
    println!("{}", serde_json::to_string(record.values())?);
    Ok(())
}

/// Run `job` against a fresh pool and destroy the pool afterwards, whatever
/// the outcome.
async fn with_pool<F, Fut>(conn: &ConnArgs, job: F) -> Result<()>
where
    F: FnOnce(Executor) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let pool = conn.connect().await?;
    let result = job(Executor::new(pool.clone())).await;
    db::pool::destroy(Some(&pool)).await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Sql { schema } => {
            let schema = load_schema(&schema)?;
            let sql = schema.sql();
            println!("{}\n{}\n{}\n{}", sql.select, sql.insert, sql.update, sql.delete);
        }
        Command::Ddl { schema } => {
            println!("{}", load_schema(&schema)?.create_table_sql());
        }
        Command::CreateTable { schema, conn } => {
            let schema = load_schema(&schema)?;
            with_pool(&conn, |db| async move {
                db.run_mutation(&schema.create_table_sql(), &[]).await?;
                info!("created table {}", schema.table());
                Ok(())
            })
            .await?;
        }
        Command::Find { schema, pk, conn } => {
            let schema = load_schema(&schema)?;
            with_pool(&conn, |db| async move {
                match Record::find(&db, &schema, Value::parse_literal(&pk)).await? {
                    Some(record) => print_record(&record),
                    None => anyhow::bail!("no {} with primary key {}", schema.name(), pk),
                }
            })
            .await?;
        }
        Command::List {
            schema,
            filter,
            order_by,
            limit,
            conn,
        } => {
            let schema = load_schema(&schema)?;
            let mut query = FindAll::new();
            if let Some(clause) = &filter.filter {
                query = query.filter(clause.as_str(), filter.values());
            }
            if let Some(order_by) = order_by {
                query = query.order_by(order_by);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            with_pool(&conn, |db| async move {
                for record in Record::find_all(&db, &schema, &query).await? {
                    print_record(&record)?;
                }
                Ok(())
            })
            .await?;
        }
        Command::Count {
            schema,
            expr,
            filter,
            conn,
        } => {
            let schema = load_schema(&schema)?;
            with_pool(&conn, |db| async move {
                let n = Record::find_number(
                    &db,
                    &schema,
                    &expr,
                    filter.filter.as_deref(),
                    &filter.values(),
                )
                .await?;
                println!("{}", n.unwrap_or(Value::Null));
                Ok(())
            })
            .await?;
        }
    }

    Ok(())
}
