//! SQL executors talking to the warehouse APIs.

#[cfg(feature = "bigquery")]
pub mod bigquery;
pub mod databricks;
pub mod snowflake;

use reqwest::{Response, StatusCode};

use crate::error::{ErrorKind, EtlError};
use crate::etl_error;

/// Longest response body kept in an error detail.
const MAX_ERROR_BODY_CHARS: usize = 2048;

/// Builds the error of a non-successful HTTP response, keeping the status and the body.
pub(crate) async fn http_error(description: &'static str, response: Response) -> EtlError {
    let status = response.status();
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthenticationError,
        _ => ErrorKind::DestinationQueryFailed,
    };
    let body = response
        .text()
        .await
        .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

    etl_error!(kind, description, format!("HTTP {status}: {body}"))
}
