use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dual_sql::config::env::DB_DIALECT;
use dual_sql::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "dual-sql")]
#[command(about = "Run one statement against the configured SQLite or Postgres database", long_about = None)]
struct Cli {
    /// Backend to use, overriding DB_DIALECT
    #[arg(long, value_enum, global = true)]
    dialect: Option<Dialect>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run SQL without parameters (BEGIN/COMMIT/ROLLBACK included)
    Exec { sql: String },
    /// Run a statement and print changes and the generated id
    Run(Statement),
    /// Print the first row, or null
    Get(Statement),
    /// Print every row
    All(Statement),
}

#[derive(Args, Debug)]
struct Statement {
    sql: String,

    /// Positional parameter; integers, floats, true/false and `null` are typed, anything
    /// else binds as text
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,
}

impl Statement {
    fn values(&self) -> Vec<RowValues> {
        self.params.iter().map(|raw| parse_param(raw)).collect()
    }
}

fn parse_param(raw: &str) -> RowValues {
    if raw.eq_ignore_ascii_case("null") {
        RowValues::Null
    } else if let Ok(i) = raw.parse::<i64>() {
        RowValues::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        RowValues::Float(f)
    } else if let Ok(b) = raw.parse::<bool>() {
        RowValues::Bool(b)
    } else {
        RowValues::Text(raw.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut env = EnvSnapshot::from_env();
    if let Some(dialect) = cli.dialect {
        env = env.with_var(DB_DIALECT, dialect.as_str());
    }
    let settings = BackendSelector::new().resolve(&env)?;
    let db = Database::connect(&settings).await?;

    let outcome = Database::scope(execute(&db, &cli.command)).await;
    db.close().await?;

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn execute(db: &Database, command: &Command) -> Result<Value, DualSqlError> {
    if let Command::Run(stmt) | Command::Get(stmt) | Command::All(stmt) = command {
        let expected = dual_sql::count_placeholders(&stmt.sql);
        if expected != stmt.params.len() {
            tracing::warn!(expected, given = stmt.params.len(), "placeholder count does not match parameters");
        }
    }

    let value = match command {
        Command::Exec { sql } => {
            db.execute(sql).await?;
            json!({ "ok": true })
        }
        Command::Run(stmt) => serde_json::to_value(db.run(&stmt.sql, &stmt.values()).await?)
            .map_err(|e| DualSqlError::ExecutionError(e.to_string()))?,
        Command::Get(stmt) => db
            .get(&stmt.sql, &stmt.values())
            .await?
            .map_or(Value::Null, |row| Value::Object(row.to_json())),
        Command::All(stmt) => Value::Array(
            db.all(&stmt.sql, &stmt.values())
                .await?
                .iter()
                .map(|row| Value::Object(row.to_json()))
                .collect(),
        ),
    };
    Ok(value)
}
