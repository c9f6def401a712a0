use std::time::Duration;

use dialprobe_core::config::Config;
use dialprobe_core::error::{ProbeError, Result};
use dialprobe_core::model::metric::MetricBatch;

use crate::otlp::grpc::GrpcMetricsClient;
use crate::otlp::http::HttpMetricsClient;
use crate::sink::{IngestAck, MetricsSink};

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub endpoint: String,
    pub protocol: ExportProtocol,
    pub compression: ExportCompression,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportCompression {
    None,
    Gzip,
}

impl ExportProtocol {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grpc" => Ok(Self::Grpc),
            "http" | "http/protobuf" | "httpprotobuf" => Ok(Self::HttpProtobuf),
            other => Err(ProbeError::Config(format!(
                "bad metrics_protocol: {other} (expected grpc or http/protobuf)"
            ))),
        }
    }
}

impl ExportCompression {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(ProbeError::Config(format!(
                "bad metrics_compression: {other} (expected none or gzip)"
            ))),
        }
    }
}

impl ExportConfig {
    /// Resolves the exporter settings; flag overrides that bypassed config
    /// validation are rejected here.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            endpoint: cfg.metrics_endpoint.clone(),
            protocol: ExportProtocol::parse(&cfg.metrics_protocol)?,
            compression: ExportCompression::parse(&cfg.metrics_compression)?,
            headers: cfg.metrics_headers.clone(),
            timeout: cfg.metrics_timeout,
        })
    }
}

/// OTLP metrics client. Built once per process and shared by every invocation.
#[derive(Debug, Clone)]
pub enum OtlpExporter {
    Grpc(GrpcMetricsClient),
    Http(HttpMetricsClient),
}

impl OtlpExporter {
    pub fn new(cfg: &ExportConfig) -> Result<Self> {
        tracing::debug!(
            endpoint = %cfg.endpoint,
            protocol = ?cfg.protocol,
            compression = ?cfg.compression,
            "building metrics exporter"
        );
        match cfg.protocol {
            ExportProtocol::Grpc => GrpcMetricsClient::new(
                &cfg.endpoint,
                cfg.compression,
                &cfg.headers,
                cfg.timeout,
            )
            .map(Self::Grpc),
            ExportProtocol::HttpProtobuf => HttpMetricsClient::new(
                &cfg.endpoint,
                cfg.compression,
                &cfg.headers,
                cfg.timeout,
            )
            .map(Self::Http),
        }
    }
}

impl MetricsSink for OtlpExporter {
    async fn submit(&self, batch: &MetricBatch) -> Result<IngestAck> {
        if batch.is_empty() {
            return Ok(IngestAck::default());
        }
        match self {
            Self::Grpc(client) => client.export(batch).await,
            Self::Http(client) => client.export(batch).await,
        }
    }
}
