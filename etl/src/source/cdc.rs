use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use tidb::types::TableName;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{ChangefeedRequest, ChangefeedService, ChangefeedStatus};
use crate::storage::StorageUri;

/// Error code TiCDC answers with when asked about an unknown changefeed.
const CHANGEFEED_NOT_EXISTS: &str = "ErrChangeFeedNotExists";

#[derive(Debug, Serialize)]
struct CreateChangefeedBody {
    changefeed_id: String,
    sink_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_ts: Option<u64>,
    replica_config: ReplicaConfig,
}

#[derive(Debug, Serialize)]
struct ReplicaConfig {
    filter: FilterConfig,
    sink: SinkConfig,
}

#[derive(Debug, Serialize)]
struct FilterConfig {
    rules: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SinkConfig {
    csv: CsvConfig,
}

#[derive(Debug, Serialize)]
struct CsvConfig {
    include_commit_ts: bool,
}

/// Client of the TiCDC open API (v2).
#[derive(Debug, Clone)]
pub struct TiCdcClient {
    client: Client,
    base_url: String,
}

impl TiCdcClient {
    pub fn new(host: &str, port: u16) -> TiCdcClient {
        TiCdcClient {
            client: Client::new(),
            base_url: format!("http://{host}:{port}"),
        }
    }

    async fn changefeed_exists(&self, changefeed_id: &str) -> EtlResult<bool> {
        let response = self
            .client
            .get(format!("{}/api/v2/changefeeds/{changefeed_id}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let body = response.text().await?;
        if body.contains(CHANGEFEED_NOT_EXISTS) {
            return Ok(false);
        }

        Err(etl_error!(
            ErrorKind::CaptureSetupFailed,
            "Could not query the changefeed",
            format!("HTTP {status}: {body}")
        ))
    }
}

/// Derives the changefeed id of a table. TiCDC only accepts alphanumeric segments separated
/// by single dashes.
pub fn changefeed_id(table: &TableName) -> String {
    let raw = format!("etl-{}-{}", table.schema, table.name);
    let mut id = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && id.ends_with('-') {
            continue;
        }
        id.push(c);
    }

    id.trim_end_matches('-').to_owned()
}

/// Builds the sink URI of the change log: the increment root plus the CSV sink options.
pub fn sink_uri(request: &ChangefeedRequest) -> StorageUri {
    let flush_interval = format!("{}s", request.flush_interval.as_secs().max(1));
    let file_size = request.file_size_bytes.to_string();
    let mut params = vec![
        ("protocol", "csv"),
        ("flush-interval", flush_interval.as_str()),
        ("file-size", file_size.as_str()),
    ];

    if let Some(credentials) = &request.credentials {
        params.push(("access-key", credentials.access_key_id.as_str()));
        params.push((
            "secret-access-key",
            credentials.secret_access_key.expose_secret().as_str(),
        ));
    }

    request.sink_uri.with_query_params(params)
}

fn create_body(request: &ChangefeedRequest) -> CreateChangefeedBody {
    CreateChangefeedBody {
        changefeed_id: changefeed_id(&request.table),
        sink_uri: sink_uri(request).to_string(),
        start_ts: request.start.tso(),
        replica_config: ReplicaConfig {
            filter: FilterConfig {
                rules: vec![request.table.to_string()],
            },
            sink: SinkConfig {
                csv: CsvConfig {
                    include_commit_ts: true,
                },
            },
        },
    }
}

impl ChangefeedService for TiCdcClient {
    async fn create_changefeed(&self, request: &ChangefeedRequest) -> EtlResult<ChangefeedStatus> {
        let body = create_body(request);
        if self.changefeed_exists(&body.changefeed_id).await? {
            info!(changefeed_id = %body.changefeed_id, "changefeed already exists");
            return Ok(ChangefeedStatus::AlreadyExists);
        }

        let response = self
            .client
            .post(format!("{}/api/v2/changefeeds", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(etl_error!(
                ErrorKind::CaptureSetupFailed,
                "Could not create the changefeed",
                format!("HTTP {status}: {text}")
            ));
        }

        info!(changefeed_id = %body.changefeed_id, start = %request.start, "created changefeed");

        Ok(ChangefeedStatus::Created)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::shared::StorageCredentials;

    use super::*;
    use crate::source::StartPosition;

    fn request(start: StartPosition) -> ChangefeedRequest {
        ChangefeedRequest {
            table: TableName::new("sales", "order_items"),
            start,
            sink_uri: StorageUri::parse("s3://bucket/etl/increment").unwrap(),
            flush_interval: Duration::from_secs(60),
            file_size_bytes: 1024,
            credentials: None,
        }
    }

    #[test]
    fn sanitizes_changefeed_ids() {
        assert_eq!(
            changefeed_id(&TableName::new("sales", "order_items")),
            "etl-sales-order-items"
        );
        assert_eq!(
            changefeed_id(&TableName::new("my db", "__t__")),
            "etl-my-db-t"
        );
    }

    #[test]
    fn sink_uri_carries_csv_options_and_credentials() {
        let mut request = request(StartPosition::Current);
        assert_eq!(
            sink_uri(&request).as_str(),
            "s3://bucket/etl/increment?protocol=csv&flush-interval=60s&file-size=1024"
        );

        request.credentials = Some(StorageCredentials {
            access_key_id: "AKID".to_owned(),
            secret_access_key: "secret".into(),
        });
        assert!(
            sink_uri(&request)
                .as_str()
                .ends_with("&access-key=AKID&secret-access-key=secret")
        );
    }

    #[test]
    fn omits_start_ts_for_the_current_position() {
        let body = serde_json::to_value(create_body(&request(StartPosition::Current))).unwrap();
        assert!(body.get("start_ts").is_none());
        assert_eq!(
            body["replica_config"]["filter"]["rules"],
            serde_json::json!(["sales.order_items"])
        );
        assert_eq!(
            body["replica_config"]["sink"]["csv"]["include_commit_ts"],
            serde_json::json!(true)
        );

        let body = serde_json::to_value(create_body(&request(StartPosition::Tso(42)))).unwrap();
        assert_eq!(body["start_ts"], serde_json::json!(42));
    }
}
