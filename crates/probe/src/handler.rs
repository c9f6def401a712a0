use dialprobe_core::error::Result;
use dialprobe_core::model::metric::{
    DIAL_NAMESPACE, Dimension, ENVIRONMENT_DIMENSION, LATENCY_METRIC, MetricBatch, MetricPoint,
    SERVICE_NAME_DIMENSION, STATE_METRIC, Unit,
};
use dialprobe_core::model::request::CheckRequest;
use dialprobe_core::time::duration_ms;
use serde::Serialize;
use tracing::Instrument;

use crate::dial::{ConnState, DIAL_TIMEOUT, dial};
use crate::sink::{IngestAck, MetricsSink};

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub message: String,
    pub service: String,
    pub environment: String,
    pub endpoint: String,
    pub state: ConnState,
    pub latency_ms: f64,
    pub ack: IngestAck,
}

/// Runs one dial check per invocation and publishes the result through `S`.
pub struct Handler<S> {
    sink: S,
}

impl<S: MetricsSink> Handler<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn invoke(&self, req: &CheckRequest) -> Result<String> {
        self.check(req).await.map(|outcome| outcome.message)
    }

    pub async fn check(&self, req: &CheckRequest) -> Result<CheckOutcome> {
        let span = tracing::info_span!(
            "invoke",
            invocation_id = %uuid::Uuid::new_v4(),
            service = %req.name,
            environment = %req.environment,
        );
        self.check_inner(req).instrument(span).await
    }

    async fn check_inner(&self, req: &CheckRequest) -> Result<CheckOutcome> {
        let endpoint = req.endpoint();
        let report = dial(&endpoint, DIAL_TIMEOUT).await;

        if let Some(failure) = &report.failure {
            tracing::error!(
                service = %req.name,
                endpoint = %endpoint,
                error = %failure,
                "can't access service"
            );
        }

        let latency_ms = duration_ms(report.latency);
        let batch = MetricBatch::new(
            DIAL_NAMESPACE,
            build_points(req, report.state.value(), latency_ms),
        );

        let ack = match self.sink.submit(&batch).await {
            Ok(ack) => ack,
            Err(err) => {
                tracing::error!(error = %err, "metrics submission failed");
                return Err(err);
            }
        };
        tracing::info!(
            accepted = ack.accepted,
            ack_message = ack.message.as_deref().unwrap_or(""),
            state = ?report.state,
            latency_ms,
            "metrics submitted"
        );

        Ok(CheckOutcome {
            message: format!("Done {}!", req.name),
            service: req.name.clone(),
            environment: req.environment.clone(),
            endpoint,
            state: report.state,
            latency_ms,
            ack,
        })
    }
}

fn build_points(req: &CheckRequest, state: f64, latency_ms: f64) -> Vec<MetricPoint> {
    let dimensions = vec![
        Dimension::new(SERVICE_NAME_DIMENSION, &req.name),
        Dimension::new(ENVIRONMENT_DIMENSION, &req.environment),
    ];
    vec![
        MetricPoint::new(STATE_METRIC, Unit::None, state, dimensions.clone()),
        MetricPoint::new(LATENCY_METRIC, Unit::Milliseconds, latency_ms, dimensions),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use dialprobe_core::error::ProbeError;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<MetricBatch>>,
    }

    impl RecordingSink {
        fn batches(&self) -> Vec<MetricBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl MetricsSink for RecordingSink {
        async fn submit(&self, batch: &MetricBatch) -> Result<IngestAck> {
            self.batches.lock().unwrap().push(batch.clone());
            Ok(IngestAck {
                accepted: batch.len(),
                message: None,
            })
        }
    }

    struct FailingSink;

    impl MetricsSink for FailingSink {
        async fn submit(&self, _batch: &MetricBatch) -> Result<IngestAck> {
            Err(ProbeError::Ingest("backend unavailable".to_string()))
        }
    }

    fn request(port: u16) -> CheckRequest {
        CheckRequest::new("auth-svc", "prod", "127.0.0.1", port.to_string())
    }

    #[tokio::test]
    async fn closed_port_reports_down_and_still_succeeds() {
        let handler = Handler::new(RecordingSink::default());

        let outcome = handler.check(&request(testkit::closed_port())).await.unwrap();

        assert_eq!(outcome.message, "Done auth-svc!");
        assert_eq!(outcome.state, ConnState::Down);
        assert!(outcome.latency_ms >= 0.0);
        assert!(outcome.latency_ms <= 1100.0);

        let batches = handler.sink().batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].namespace, "Service/Dial");
        let state = &batches[0].points[0];
        assert_eq!(state.name, "State");
        assert_eq!(state.unit, Unit::None);
        assert_eq!(state.value, 0.0);
    }

    #[tokio::test]
    async fn open_listener_reports_up_with_small_latency() {
        let listener = testkit::open_listener().await;
        let port = listener.local_addr().unwrap().port();
        let handler = Handler::new(RecordingSink::default());

        let outcome = handler.check(&request(port)).await.unwrap();

        assert_eq!(outcome.state, ConnState::Up);
        assert!(outcome.latency_ms < 50.0);
        let points = &handler.sink().batches()[0].points;
        assert_eq!(points[0].value, 1.0);
        assert_eq!(points[1].name, "Latency");
        assert_eq!(points[1].unit, Unit::Milliseconds);
        assert_eq!(points[1].value, outcome.latency_ms);
    }

    #[tokio::test]
    async fn emits_two_points_with_identical_dimensions() {
        let handler = Handler::new(RecordingSink::default());

        handler.invoke(&request(testkit::closed_port())).await.unwrap();

        let points = &handler.sink().batches()[0].points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].dimensions, points[1].dimensions);
        assert_eq!(
            points[0].dimensions,
            vec![
                Dimension::new("ServiceName", "auth-svc"),
                Dimension::new("Environment", "prod"),
            ]
        );
    }

    #[tokio::test]
    async fn ingest_failure_propagates_without_message() {
        let handler = Handler::new(FailingSink);

        let err = handler
            .invoke(&request(testkit::closed_port()))
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Ingest(_)));
        assert!(err.to_string().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_down_observation() {
        let handler = Handler::new(RecordingSink::default());
        let req = CheckRequest::new("auth-svc", "prod", "host.invalid", "80");

        let outcome = handler.check(&req).await.unwrap();

        assert_eq!(outcome.state, ConnState::Down);
        assert_eq!(handler.sink().batches()[0].points[0].value, 0.0);
    }

    #[tokio::test]
    async fn shared_handler_serves_concurrent_invocations() {
        let handler = std::sync::Arc::new(Handler::new(RecordingSink::default()));

        let tasks: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let handler = handler.clone();
                let req = CheckRequest::new(name, "dev", "127.0.0.1", testkit::closed_port().to_string());
                tokio::spawn(async move { handler.invoke(&req).await })
            })
            .collect();

        let mut messages = Vec::new();
        for task in tasks {
            messages.push(task.await.unwrap().unwrap());
        }
        messages.sort();

        assert_eq!(messages, ["Done a!", "Done b!", "Done c!"]);
        assert_eq!(handler.sink().batches().len(), 3);
    }
}
