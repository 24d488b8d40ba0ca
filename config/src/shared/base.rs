use thiserror::Error;

/// Errors reported while validating configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The replicated table is not written as `schema.table`.
    #[error("Invalid table name `{0}`: expected `schema.table`")]
    InvalidTableName(String),

    /// The storage root uses a scheme no storage backend understands.
    #[error("Unsupported storage scheme `{0}`: expected one of s3, gs, gcs or file")]
    UnsupportedStorageScheme(String),

    /// The storage root could not be parsed as a URI.
    #[error("Invalid storage uri `{0}`")]
    InvalidStorageUri(String),

    /// A numeric setting that must be positive is zero.
    #[error("`{0}` must be greater than zero")]
    ZeroValue(&'static str),

    /// The run mode label is not one of the supported labels.
    #[error("Unknown run mode `{0}`: expected full, snapshot-only, incremental-only or cloud")]
    UnknownRunMode(String),

    /// A required string setting is empty.
    #[error("`{0}` must not be empty")]
    EmptyValue(&'static str),
}
