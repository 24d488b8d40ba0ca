//! Error types and result definitions for replication operations.
//!
//! [`EtlError`] carries a classification ([`ErrorKind`]), a static description, optional dynamic
//! detail, the originating error and the location it was raised at. Stage failures wrap the
//! error of the failing collaborator as their source, so the full causal chain is available when
//! the process exits.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct EtlError {
    payload: Box<ErrorPayload>,
}

/// Classification of replication failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Stage failures
    StorageCheckFailed,
    PositionAcquisitionFailed,
    CaptureSetupFailed,
    SnapshotDumpFailed,
    SnapshotLoadFailed,
    IncrementLoadFailed,

    // Schema synthesis
    UnsupportedDdl,
    UnsupportedSchemaChange,
    UnsupportedType,

    // Connections and queries
    SourceConnectionFailed,
    SourceQueryFailed,
    DestinationConnectionFailed,
    DestinationQueryFailed,
    AuthenticationError,

    // Storage
    StorageError,
    StorageObjectMissing,

    // Data and configuration
    ConfigError,
    InvalidData,
    InvalidState,
    ConversionError,

    // IO and serialization
    IoError,
    SerializationError,
    DeserializationError,

    Unknown,

    // Used by failpoint-driven tests.
    #[cfg(feature = "failpoints")]
    InjectedFailure,
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    pub fn description(&self) -> &str {
        &self.payload.description
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches the originating error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Wraps `self` as the source of a new error of `kind`.
    ///
    /// Used at stage boundaries to classify a collaborator failure without losing it.
    #[track_caller]
    pub fn wrap(self, kind: ErrorKind, description: &'static str) -> EtlError {
        let detail = self.detail().map(|detail| Cow::Owned(detail.to_owned()));
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            detail,
            Some(Arc::new(self)),
        )
    }

    /// Walks the source chain looking for an error of `kind`.
    pub fn caused_by(&self, kind: ErrorKind) -> bool {
        if self.kind() == kind {
            return true;
        }

        let mut source = error::Error::source(self);
        while let Some(current) = source {
            if let Some(etl_error) = current.downcast_ref::<EtlError>()
                && etl_error.kind() == kind
            {
                return true;
            }
            source = current.source();
        }

        false
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        write!(
            f,
            "[{:?}] {} @ {}:{}",
            payload.kind,
            payload.description,
            payload.location.file(),
            payload.location.line()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        if let Some(source) = &payload.source {
            let rendered = source.to_string();
            let mut lines = rendered.lines();
            if let Some(first) = lines.next() {
                write!(f, "\n  Caused by: {first}")?;
            }
            for line in lines {
                write!(f, "\n    {line}")?;
            }
        }

        let backtrace = payload.backtrace.to_string();
        if !backtrace.trim().is_empty() && !backtrace.contains("disabled") {
            write!(f, "\n  Backtrace:")?;
            for line in backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Implements `From<$error>` by classifying the error with a fixed kind and description.
macro_rules! impl_from_error {
    ($error:ty, $kind:expr, $description:literal) => {
        impl From<$error> for EtlError {
            #[track_caller]
            fn from(err: $error) -> EtlError {
                let detail = err.to_string();
                EtlError::from_components(
                    $kind,
                    Cow::Borrowed($description),
                    Some(Cow::Owned(detail)),
                    Some(Arc::new(err)),
                )
            }
        }
    };
}

impl_from_error!(std::io::Error, ErrorKind::IoError, "I/O operation failed");
impl_from_error!(
    std::str::Utf8Error,
    ErrorKind::ConversionError,
    "UTF-8 conversion failed"
);
impl_from_error!(
    std::string::FromUtf8Error,
    ErrorKind::ConversionError,
    "UTF-8 string conversion failed"
);
impl_from_error!(
    std::num::ParseIntError,
    ErrorKind::ConversionError,
    "Integer parsing failed"
);
impl_from_error!(
    chrono::ParseError,
    ErrorKind::ConversionError,
    "Datetime parsing failed"
);
impl_from_error!(url::ParseError, ErrorKind::ConfigError, "URI parsing failed");
impl_from_error!(
    tidb::types::SchemaError,
    ErrorKind::UnsupportedType,
    "Source schema could not be interpreted"
);

/// Converts [`serde_json::Error`], separating I/O failures from malformed documents.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] raised while talking to the source cluster.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => ErrorKind::SourceConnectionFailed,
            _ => ErrorKind::SourceQueryFailed,
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed("Source database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`reqwest::Error`] raised by the HTTP clients.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let kind = if err.is_connect() || err.is_timeout() {
            ErrorKind::DestinationConnectionFailed
        } else if err.is_decode() {
            ErrorKind::DeserializationError
        } else if err.status().is_some_and(|status| status.as_u16() == 401 || status.as_u16() == 403)
        {
            ErrorKind::AuthenticationError
        } else {
            ErrorKind::DestinationQueryFailed
        };

        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed("HTTP request failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn wrap_keeps_the_original_error_as_source() {
        let inner = etl_error!(
            ErrorKind::StorageError,
            "Object listing failed",
            "bucket unreachable"
        );
        let outer = inner.wrap(ErrorKind::SnapshotLoadFailed, "Snapshot load failed");

        assert_eq!(outer.kind(), ErrorKind::SnapshotLoadFailed);
        assert_eq!(outer.detail(), Some("bucket unreachable"));
        assert!(outer.caused_by(ErrorKind::StorageError));
        assert!(!outer.caused_by(ErrorKind::UnsupportedDdl));

        let source = error::Error::source(&outer).unwrap();
        assert!(source.to_string().contains("Object listing failed"));
    }

    #[test]
    fn display_includes_detail_and_cause() {
        let inner = etl_error!(ErrorKind::StorageError, "Object read failed", "snapshot/metadata");
        let outer = inner.wrap(ErrorKind::StorageCheckFailed, "Failed to check progress marker");
        let rendered = outer.to_string();

        assert!(rendered.starts_with("[StorageCheckFailed] Failed to check progress marker @ "));
        assert!(rendered.contains("\n  Detail:\n    snapshot/metadata"));
        assert!(rendered.contains("\n  Caused by: [StorageError] Object read failed"));
    }
}
