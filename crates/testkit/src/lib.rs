use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use bytes::Bytes;
use dialprobe_core::model::request::CheckRequest;
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_server::{
    MetricsService, MetricsServiceServer,
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use opentelemetry_proto::tonic::metrics::v1::number_data_point;
use prost::Message;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codec::CompressionEncoding;
use tonic::{Request, Response, Status};

/// A listener nobody accepts on; the kernel still completes handshakes.
pub async fn open_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

/// A local port with nothing bound to it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn sample_request(port: u16) -> CheckRequest {
    CheckRequest::new("auth-svc", "prod", "127.0.0.1", port.to_string())
}

pub fn sample_event(port: u16) -> String {
    serde_json::to_string(&sample_request(port)).unwrap()
}

/// A gauge data point as the collector saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPoint {
    pub scope: String,
    pub name: String,
    pub unit: String,
    pub value: f64,
    pub attributes: Vec<(String, String)>,
}

#[derive(Default)]
struct Shared {
    requests: Mutex<Vec<ExportMetricsServiceRequest>>,
    headers: Mutex<Vec<(String, String)>>,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn record(&self, req: ExportMetricsServiceRequest, headers: Vec<(String, String)>) {
        self.requests.lock().unwrap().push(req);
        self.headers.lock().unwrap().extend(headers);
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().unwrap().clone()
    }
}

/// In-process OTLP metrics collector speaking either HTTP/protobuf or gRPC.
pub struct MetricsCollector {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl MetricsCollector {
    pub async fn start_http() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());
        let app = Router::new()
            .route("/v1/metrics", post(export_http))
            .with_state(shared.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, shared, task })
    }

    pub async fn start_grpc() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());
        let service = MetricsServiceServer::new(GrpcCollector {
            shared: shared.clone(),
        })
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Gzip);
        let task = tokio::spawn(async move {
            let _ = tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;
        });
        Ok(Self { addr, shared, task })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Makes every following export fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.shared.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn request_count(&self) -> usize {
        self.shared.requests.lock().unwrap().len()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.shared
            .headers
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn points(&self) -> Vec<ReceivedPoint> {
        let requests = self.shared.requests.lock().unwrap();
        let mut out = Vec::new();
        for req in requests.iter() {
            for rm in &req.resource_metrics {
                for sm in &rm.scope_metrics {
                    let scope = sm.scope.as_ref().map(|s| s.name.clone()).unwrap_or_default();
                    for metric in &sm.metrics {
                        let Some(Data::Gauge(gauge)) = &metric.data else {
                            continue;
                        };
                        for point in &gauge.data_points {
                            out.push(ReceivedPoint {
                                scope: scope.clone(),
                                name: metric.name.clone(),
                                unit: metric.unit.clone(),
                                value: match point.value {
                                    Some(number_data_point::Value::AsDouble(v)) => v,
                                    Some(number_data_point::Value::AsInt(v)) => v as f64,
                                    None => 0.0,
                                },
                                attributes: point
                                    .attributes
                                    .iter()
                                    .map(|kv| {
                                        let value = match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
                                            Some(Value::StringValue(s)) => s.clone(),
                                            _ => String::new(),
                                        };
                                        (kv.key.clone(), value)
                                    })
                                    .collect(),
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn export_http(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    if let Some(message) = shared.failure() {
        return (StatusCode::SERVICE_UNAVAILABLE, message.into_bytes());
    }

    let gzip = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    let payload = if gzip {
        let mut out = Vec::new();
        if GzDecoder::new(body.as_ref()).read_to_end(&mut out).is_err() {
            return (StatusCode::BAD_REQUEST, b"bad gzip body".to_vec());
        }
        Bytes::from(out)
    } else {
        body
    };

    let Ok(req) = ExportMetricsServiceRequest::decode(payload) else {
        return (StatusCode::BAD_REQUEST, b"bad protobuf body".to_vec());
    };

    let seen = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    shared.record(req, seen);
    (
        StatusCode::OK,
        ExportMetricsServiceResponse::default().encode_to_vec(),
    )
}

struct GrpcCollector {
    shared: Arc<Shared>,
}

#[tonic::async_trait]
impl MetricsService for GrpcCollector {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> std::result::Result<Response<ExportMetricsServiceResponse>, Status> {
        if let Some(message) = self.shared.failure() {
            return Err(Status::unavailable(message));
        }

        let seen = request
            .metadata()
            .iter()
            .filter_map(|entry| match entry {
                tonic::metadata::KeyAndValueRef::Ascii(k, v) => {
                    Some((k.as_str().to_string(), v.to_str().ok()?.to_string()))
                }
                tonic::metadata::KeyAndValueRef::Binary(..) => None,
            })
            .collect();
        self.shared.record(request.into_inner(), seen);
        Ok(Response::new(ExportMetricsServiceResponse::default()))
    }
}
