use std::io::Write;
use std::time::Duration;

use dialprobe_core::error::{ProbeError, Result};
use dialprobe_core::model::metric::MetricBatch;
use flate2::Compression;
use flate2::write::GzEncoder;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceResponse;
use prost::Message;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::export::ExportCompression;
use crate::otlp::encode::{ack_from_response, encode_batch};
use crate::sink::IngestAck;

#[derive(Debug, Clone)]
pub struct HttpMetricsClient {
    client: Client,
    url: String,
    headers: HeaderMap,
    compression: ExportCompression,
}

impl HttpMetricsClient {
    pub fn new(
        endpoint: &str,
        compression: ExportCompression,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build metrics http client: {e}")))?;

        Ok(Self {
            client,
            url: metrics_url(endpoint),
            headers: build_http_headers(headers),
            compression,
        })
    }

    pub async fn export(&self, batch: &MetricBatch) -> Result<IngestAck> {
        let body = encode_batch(batch).encode_to_vec();
        let (body, content_encoding) = maybe_compress_http_body(body, self.compression)
            .map_err(|e| ProbeError::Io(format!("failed to compress metrics payload: {e}")))?;

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/x-protobuf")
            .headers(self.headers.clone());
        if let Some(encoding) = content_encoding {
            req = req.header("content-encoding", encoding);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| ProbeError::Ingest(format!("HTTP export to {} failed: {e}", self.url)))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProbeError::Ingest(format!("failed reading export response: {e}")))?;

        if !status.is_success() {
            return Err(ProbeError::Ingest(format!(
                "HTTP export returned {status}: {}",
                String::from_utf8_lossy(&bytes).trim()
            )));
        }

        let response = if bytes.is_empty() {
            ExportMetricsServiceResponse::default()
        } else {
            ExportMetricsServiceResponse::decode(bytes).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "undecodable export response body; assuming full success");
                ExportMetricsServiceResponse::default()
            })
        };
        ack_from_response(&response, batch.len())
    }
}

fn metrics_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.ends_with("/v1/metrics") {
        endpoint.to_string()
    } else {
        format!("{endpoint}/v1/metrics")
    }
}

fn build_http_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::try_from(k.as_str());
        let value = HeaderValue::try_from(v.as_str());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid metrics HTTP header");
            }
        }
    }
    out
}

fn maybe_compress_http_body(
    body: Vec<u8>,
    compression: ExportCompression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        ExportCompression::None => Ok((body, None)),
        ExportCompression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;
            Ok((compressed, Some("gzip")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_url_appends_path_once() {
        assert_eq!(
            metrics_url("http://127.0.0.1:4318"),
            "http://127.0.0.1:4318/v1/metrics"
        );
        assert_eq!(
            metrics_url("http://127.0.0.1:4318/"),
            "http://127.0.0.1:4318/v1/metrics"
        );
        assert_eq!(
            metrics_url("http://collector/v1/metrics"),
            "http://collector/v1/metrics"
        );
    }

    #[test]
    fn gzip_body_is_marked() {
        let (body, encoding) =
            maybe_compress_http_body(vec![7; 64], ExportCompression::Gzip).unwrap();
        assert_eq!(encoding, Some("gzip"));
        assert_ne!(body, vec![7; 64]);

        let (plain, encoding) =
            maybe_compress_http_body(vec![7; 4], ExportCompression::None).unwrap();
        assert_eq!(encoding, None);
        assert_eq!(plain, vec![7; 4]);
    }
}
