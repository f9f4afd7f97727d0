//! Database error types
//!
//! SQLx errors are classified by PostgreSQL SQLSTATE so the settlement
//! retry policy can tell lock contention from broken data.

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Lock timeout, deadlock or serialization failure
    #[error("Lock contention: {0}")]
    Contention(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to the domain
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Agent", "AG-001");
    /// assert!(error.to_string().contains("Agent"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    pub fn corrupt(column: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::SerializationError(format!("unexpected {} value '{}'", column, value))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }

    /// Failures that may succeed when the unit of work is retried
    pub fn is_transient(&self) -> bool {
        self.is_connection_error() || matches!(self, DatabaseError::Contention(_))
    }
}

/// Maps a PostgreSQL SQLSTATE to an error variant
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
fn classify(code: &str, message: String) -> DatabaseError {
    match code {
        "23505" => DatabaseError::DuplicateEntry(message),
        "23503" => DatabaseError::ForeignKeyViolation(message),
        "23514" => DatabaseError::ConstraintViolation(message),
        // lock_not_available, deadlock_detected, serialization_failure
        "55P03" | "40P01" | "40001" => DatabaseError::Contention(message),
        "57014" => DatabaseError::Contention(format!("statement timeout: {}", message)),
        _ => DatabaseError::QueryFailed(message),
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Tls(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::PoolClosed => DatabaseError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => classify(code.as_ref(), db_err.message().to_string()),
                None => DatabaseError::QueryFailed(db_err.message().to_string()),
            },
            sqlx::Error::ColumnDecode { index, source } => {
                DatabaseError::SerializationError(format!("column {}: {}", index, source))
            }
            sqlx::Error::Migrate(e) => DatabaseError::MigrationFailed(e.to_string()),
            other => DatabaseError::QueryFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        DatabaseError::SerializationError(error.to_string())
    }
}

impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound(message) => PortError::NotFound {
                entity_type: "record".to_string(),
                id: message,
            },
            DatabaseError::DuplicateEntry(message) => PortError::conflict(message),
            DatabaseError::Contention(message) => PortError::contention(message),
            DatabaseError::ConnectionFailed(message) => PortError::connection(message),
            DatabaseError::PoolExhausted => PortError::connection("connection pool exhausted"),
            DatabaseError::ForeignKeyViolation(message)
            | DatabaseError::ConstraintViolation(message) => PortError::validation(message),
            other => PortError::internal(other.to_string()),
        }
    }
}
