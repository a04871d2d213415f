use thiserror::Error;

/// Batch-level failures. Row-level problems never surface here; they are
/// counted in the `NormalizeReport` and `JoinStats`.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Data error: {0}")]
    Data(String),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

impl EtlError {
    /// Whether the upload itself was unusable, as opposed to an
    /// infrastructure failure
    pub fn is_rejection(&self) -> bool {
        matches!(self, EtlError::Schema { .. } | EtlError::Data(_))
    }
}

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid schema identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Warehouse state poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to render HTML report: {0}")]
    Render(#[from] askama::Error),

    #[error("Failed to serialize report data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;
