use std::io::IsTerminal;
use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_NAME: &str = "dialprobe";

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Logging for one-shot commands: compact lines on stderr.
pub fn init_cli_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Logging for the long-running invoke host; also exports the `invoke`
/// spans over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init_serve_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt_layer)
        .with(invoke_span_layer())
        .try_init();
}

/// Flushes spans still buffered by the batch exporter.
pub fn shutdown_tracing() {
    let Some(provider) = TRACER_PROVIDER.get() else {
        return;
    };
    if let Err(err) = provider.shutdown() {
        eprintln!("dialprobe: span export shutdown failed: {err}");
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn service_resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attributes([KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))])
        .build()
}

fn invoke_span_layer<S>() -> Option<OpenTelemetryLayer<S, Tracer>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT")?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            // The subscriber is not installed yet.
            eprintln!("dialprobe: span export disabled: {err}");
            return None;
        }
    };

    let provider = TRACER_PROVIDER.get_or_init(|| {
        SdkTracerProvider::builder()
            .with_resource(service_resource())
            .with_batch_exporter(exporter)
            .build()
    });
    Some(tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)))
}
