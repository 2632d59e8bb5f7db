use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unregistered protocol: {0}")]
    UnknownProtocol(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<mediadex_model::ModelError> for CatalogError {
    fn from(err: mediadex_model::ModelError) -> Self {
        CatalogError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
