use std::time::Duration;

use dialprobe_core::error::{ProbeError, Result};
use dialprobe_core::model::metric::MetricBatch;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use tonic::codec::CompressionEncoding;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::Channel;

use crate::export::ExportCompression;
use crate::otlp::encode::{ack_from_response, encode_batch};
use crate::sink::IngestAck;

#[derive(Debug, Clone)]
pub struct GrpcMetricsClient {
    client: MetricsServiceClient<Channel>,
    metadata: MetadataMap,
    timeout: Duration,
}

impl GrpcMetricsClient {
    pub fn new(
        endpoint: &str,
        compression: ExportCompression,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<Self> {
        let channel = Channel::from_shared(normalize_grpc_endpoint(endpoint))
            .map_err(|e| ProbeError::Config(format!("invalid gRPC metrics endpoint: {e}")))?
            .connect_timeout(timeout)
            .connect_lazy();

        let client = match compression {
            ExportCompression::Gzip => MetricsServiceClient::new(channel)
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip),
            ExportCompression::None => MetricsServiceClient::new(channel),
        };

        Ok(Self {
            client,
            metadata: build_grpc_metadata(headers),
            timeout,
        })
    }

    pub async fn export(&self, batch: &MetricBatch) -> Result<IngestAck> {
        let mut request = tonic::Request::new(encode_batch(batch));
        request.set_timeout(self.timeout);
        *request.metadata_mut() = self.metadata.clone();

        let mut client = self.client.clone();
        let response = client.export(request).await.map_err(|status| {
            ProbeError::Ingest(format!(
                "gRPC export failed: {:?}: {}",
                status.code(),
                status.message()
            ))
        })?;
        ack_from_response(response.get_ref(), batch.len())
    }
}

fn normalize_grpc_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

fn build_grpc_metadata(headers: &[(String, String)]) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (k, v) in headers {
        let key = MetadataKey::<Ascii>::from_bytes(k.as_bytes());
        let value = MetadataValue::try_from(v.as_str());
        match (key, value) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid gRPC metrics header");
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_endpoint_gets_scheme() {
        assert_eq!(
            normalize_grpc_endpoint("127.0.0.1:4317"),
            "http://127.0.0.1:4317"
        );
        assert_eq!(
            normalize_grpc_endpoint("https://collector:4317"),
            "https://collector:4317"
        );
    }

    #[test]
    fn metadata_skips_invalid_headers() {
        let md = build_grpc_metadata(&[
            ("x-tenant".to_string(), "dev".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ]);
        assert_eq!(md.len(), 1);
        assert_eq!(md.get("x-tenant").unwrap(), "dev");
    }
}
