//! Error type for the persistence layer.

/// Failures while opening, migrating, or writing to `PostgreSQL`.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A query, transaction, or connection failed.
    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Applying the embedded migrations failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The pool settings are unusable, e.g. an unparsable URL.
    #[error("invalid database settings: {0}")]
    Config(String),
}
