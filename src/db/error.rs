use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Pool error: {0}")]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("{}", format_pg_error(.0))]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Build error: {0}")]
    BuildError(#[from] deadpool_postgres::BuildError),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

fn format_pg_error(e: &tokio_postgres::Error) -> String {
    let Some(db_err) = e.as_db_error() else {
        return format!("PostgreSQL error: {}", e);
    };

    let mut msg = format!(
        "PostgreSQL error [{}]: {}",
        db_err.code().code(),
        db_err.message()
    );
    let details = [
        ("Detail", db_err.detail()),
        ("Hint", db_err.hint()),
        ("Table", db_err.table()),
        ("Column", db_err.column()),
        ("Constraint", db_err.constraint()),
    ];
    for (label, value) in details {
        if let Some(value) = value {
            msg.push_str(&format!("\n  {}: {}", label, value));
        }
    }
    msg
}
