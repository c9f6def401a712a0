use dialprobe_core::error::{ProbeError, Result};
use dialprobe_core::model::metric::{Dimension, MetricBatch, MetricPoint};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use opentelemetry_proto::tonic::metrics::v1::number_data_point;
use opentelemetry_proto::tonic::metrics::v1::{
    Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics,
};
use opentelemetry_proto::tonic::resource::v1::Resource;

use crate::sink::IngestAck;

const RESOURCE_SERVICE_NAME: &str = "dialprobe";

/// One resource, one scope named after the namespace, one gauge per point.
pub fn encode_batch(batch: &MetricBatch) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![string_kv("service.name", RESOURCE_SERVICE_NAME)],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(InstrumentationScope {
                    name: batch.namespace.clone(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                }),
                metrics: batch.points.iter().map(encode_point).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn encode_point(point: &MetricPoint) -> Metric {
    let data_point = NumberDataPoint {
        attributes: dimensions_to_kv(&point.dimensions),
        time_unix_nano: point.ts.timestamp_nanos_opt().unwrap_or_default().max(0) as u64,
        value: Some(number_data_point::Value::AsDouble(point.value)),
        ..Default::default()
    };

    Metric {
        name: point.name.clone(),
        unit: point.unit.ucum().to_string(),
        data: Some(Data::Gauge(Gauge {
            data_points: vec![data_point],
        })),
        ..Default::default()
    }
}

fn dimensions_to_kv(dimensions: &[Dimension]) -> Vec<KeyValue> {
    dimensions
        .iter()
        .map(|d| string_kv(&d.name, &d.value))
        .collect()
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(Value::StringValue(value.to_string())),
        }),
    }
}

/// Turns an export response into an ack. Any rejected point fails the batch.
pub fn ack_from_response(
    response: &ExportMetricsServiceResponse,
    submitted: usize,
) -> Result<IngestAck> {
    let Some(partial) = &response.partial_success else {
        return Ok(IngestAck {
            accepted: submitted,
            message: None,
        });
    };

    if partial.rejected_data_points > 0 {
        return Err(ProbeError::Ingest(format!(
            "backend rejected {} of {submitted} points: {}",
            partial.rejected_data_points, partial.error_message
        )));
    }

    Ok(IngestAck {
        accepted: submitted,
        message: Some(partial.error_message.clone()).filter(|m| !m.is_empty()),
    })
}
