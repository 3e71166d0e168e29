//! Engine Error Types
//!
//! Crate-wide error handling for the rule & report engine.

use thiserror::Error;

/// Engine Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors with domain-specific semantics.
#[derive(Error, Debug)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // ========================================================================
    // Lookup / Validation Errors
    // ========================================================================
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("invalid {0}: {1}")]
    Invalid(&'static str, String),

    // ========================================================================
    // Repository Errors
    // ========================================================================
    #[error("create failed: {0}")]
    Create(String),

    #[error("update failed: {0}")]
    Update(String),

    #[error("view failed: {0}")]
    View(String),

    #[error("remove failed: {0}")]
    Remove(String),

    #[error("database error: {0}")]
    Database(String),

    // ========================================================================
    // Script Execution Errors
    // ========================================================================
    #[error("script execution error: {0}")]
    ScriptExecution(String),

    // ========================================================================
    // Dispatch / Messaging Errors
    // ========================================================================
    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("messaging error: {0}")]
    Messaging(String),

    // ========================================================================
    // Readers / Email Errors
    // ========================================================================
    #[error("readers error: {0}")]
    Readers(String),

    #[error("email error: {0}")]
    Email(String),

    // ========================================================================
    // Internal Errors
    // ========================================================================
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Abstract error category, matching the taxonomy the Service
    /// surfaces to callers. Distinct from the Display message, which
    /// carries implementation detail.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) | EngineError::MissingConfig(_) => "Configuration",
            EngineError::NotFound(..) => "NotFound",
            EngineError::Invalid(..) => "Invalid",
            EngineError::Create(_) => "Create",
            EngineError::Update(_) => "Update",
            EngineError::View(_) => "View",
            EngineError::Remove(_) => "Remove",
            EngineError::Database(_) => "Database",
            EngineError::ScriptExecution(_) => "ScriptExecution",
            EngineError::Dispatch(_) => "Dispatch",
            EngineError::Messaging(_) => "Messaging",
            EngineError::Readers(_) => "Readers",
            EngineError::Email(_) => "Email",
            EngineError::Serialization(_) => "Serialization",
            EngineError::Io(_) => "Io",
            EngineError::Internal(_) => "Internal",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => EngineError::NotFound("entity", String::new()),
            other => EngineError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Readers(err.to_string())
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::Messaging(err.to_string())
    }
}

impl From<Box<rhai::EvalAltResult>> for EngineError {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        EngineError::ScriptExecution(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for EngineError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        EngineError::Email(err.to_string())
    }
}

impl From<lettre::error::Error> for EngineError {
    fn from(err: lettre::error::Error) -> Self {
        EngineError::Email(err.to_string())
    }
}

impl From<lettre::address::AddressError> for EngineError {
    fn from(err: lettre::address::AddressError) -> Self {
        EngineError::Email(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<figment::Error> for EngineError {
    fn from(err: figment::Error) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
