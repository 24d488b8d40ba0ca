use std::collections::VecDeque;
use std::process::Stdio;

use config::shared::{SnapshotConfig, SourceConfig};
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{DumpProgress, DumpRequest, SnapshotDumper};

/// Number of trailing output lines kept for the error of a failed dump.
const OUTPUT_TAIL_LINES: usize = 20;

/// Runs the Dumpling binary to write a consistent CSV snapshot into the snapshot root.
#[derive(Debug, Clone)]
pub struct DumplingRunner {
    source: SourceConfig,
    snapshot: SnapshotConfig,
}

impl DumplingRunner {
    pub fn new(source: SourceConfig, snapshot: SnapshotConfig) -> DumplingRunner {
        DumplingRunner { source, snapshot }
    }

    fn arguments(&self, request: &DumpRequest) -> Vec<String> {
        let mut args = vec![
            "-h".to_owned(),
            self.source.host.clone(),
            "-P".to_owned(),
            self.source.port.to_string(),
            "-u".to_owned(),
            self.source.username.clone(),
        ];
        if let Some(password) = &self.source.password {
            args.push("-p".to_owned());
            args.push(password.expose_secret().clone());
        }
        args.extend([
            "--filetype".to_owned(),
            "csv".to_owned(),
            "--no-header".to_owned(),
            "-t".to_owned(),
            self.snapshot.concurrency.to_string(),
            "-o".to_owned(),
            request.output_uri.to_string(),
            "-T".to_owned(),
            request.table.to_string(),
        ]);
        if let Some(tso) = request.start.tso() {
            args.push("--snapshot".to_owned());
            args.push(tso.to_string());
        }

        args
    }
}

/// Parses a Dumpling progress line, e.g.
/// `[INFO] [dump.go:151] ["progress"] [tables="0/1 (0.0%)"] [finished rows=4096] [estimate total rows=10000]`.
pub fn parse_progress(line: &str) -> Option<DumpProgress> {
    Some(DumpProgress {
        dumped_rows: counter_after(line, "finished rows=")?,
        estimated_total_rows: counter_after(line, "estimate total rows=")?,
    })
}

fn counter_after(line: &str, label: &str) -> Option<u64> {
    let start = line.find(label)? + label.len();
    let digits: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits.parse().ok()
}

impl SnapshotDumper for DumplingRunner {
    async fn dump(
        &self,
        request: &DumpRequest,
        progress: &(dyn Fn(DumpProgress) + Send + Sync),
    ) -> EtlResult<()> {
        let mut command = Command::new(&self.snapshot.dumper_path);
        command
            .args(self.arguments(request))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(credentials) = &request.credentials {
            command
                .env("AWS_ACCESS_KEY_ID", &credentials.access_key_id)
                .env(
                    "AWS_SECRET_ACCESS_KEY",
                    credentials.secret_access_key.expose_secret(),
                );
        }

        info!(table = %request.table, output = %request.output_uri, start = %request.start, "starting snapshot dump");
        let mut child = command.spawn().map_err(|err| {
            etl_error!(
                ErrorKind::SnapshotDumpFailed,
                "Could not start the dump tool",
                self.snapshot.dumper_path.clone(),
                source: err
            )
        })?;

        let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                debug!(line = %line, "dumpling");
                if let Some(parsed) = parse_progress(&line) {
                    progress(parsed);
                }
                if tail.len() == OUTPUT_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let output = Vec::from(tail).join("\n");
            bail!(
                ErrorKind::SnapshotDumpFailed,
                "The dump tool exited with an error",
                format!("{status}: {output}")
            );
        }

        info!(table = %request.table, "snapshot dump finished");

        Ok(())
    }
}
