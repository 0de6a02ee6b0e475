//! Logging and distributed tracing for the statement ledger
//!
//! Installs the `tracing` subscriber (compact text or JSON lines) and, when
//! an OTLP endpoint is configured, an OpenTelemetry export layer. W3C trace
//! context is read from inbound HTTP requests and forwarded on oracle calls,
//! so one question shows up as a single trace across the service and the
//! completion provider.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self as sdktrace, Sampler};
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::{OpenTelemetryLayer, OpenTelemetrySpanExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default service name reported to collectors
pub const SERVICE_NAME: &str = "statement-ledger";

/// How log lines are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
    /// No stdout logging; spans still reach the OTLP exporter if configured
    Off,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`
    pub otlp_endpoint: Option<String>,
    /// Fraction of traces exported, clamped to 0.0..=1.0
    pub sample_rate: f64,
    pub log_format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            sample_rate: 1.0,
            log_format: LogFormat::Compact,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    ///
    /// `LOG_CONSOLE=false` wins over `LOG_JSON`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str| {
            lookup(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on"))
        };

        let log_format = match (flag("LOG_CONSOLE"), flag("LOG_JSON")) {
            (Some(false), _) => LogFormat::Off,
            (_, Some(true)) => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Self {
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
            sample_rate: lookup("OTEL_SAMPLE_RATE")
                .and_then(|v| v.parse::<f64>().ok())
                .map(|rate| rate.clamp(0.0, 1.0))
                .unwrap_or(defaults.sample_rate),
            log_format,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

/// Install the global subscriber and trace propagator.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_format {
        LogFormat::Json => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .boxed(),
        ),
        LogFormat::Compact => Some(tracing_subscriber::fmt::layer().compact().boxed()),
        LogFormat::Off => None,
    };

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let provider = tracer_provider(config, endpoint)?;
            let tracer = provider.tracer(SERVICE_NAME);
            global::set_tracer_provider(provider);
            Some(OpenTelemetryLayer::new(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

fn sampler(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        // Respect the caller's decision when a parent span arrives with the request
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
    }
}

fn tracer_provider(
    config: &TelemetryConfig,
    endpoint: &str,
) -> anyhow::Result<sdktrace::TracerProvider> {
    let resource = Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(5)),
        )
        .with_trace_config(
            sdktrace::Config::default()
                .with_sampler(sampler(config.sample_rate))
                .with_resource(resource),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(provider)
}

/// Flush pending spans.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

/// Span for one inbound HTTP request, parented on any incoming trace context.
pub fn http_request_span<B>(request: &Request<B>) -> tracing::Span {
    let span = tracing::info_span!(
        "http_request",
        "http.method" = %request.method(),
        "http.path" = %request.uri().path(),
    );
    span.set_parent(extract_context(request.headers()));
    span
}

/// Write the current span's trace context into outgoing request headers.
pub fn inject_current_context(headers: &mut HeaderMap) {
    inject_context(headers, &tracing::Span::current().context());
}

/// Read-only header adapter for extraction.
struct HeaderView<'a>(&'a HeaderMap);

/// Writable header adapter for injection.
struct HeaderCarrier<'a>(&'a mut HeaderMap);

impl Extractor for HeaderView<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

impl Injector for HeaderCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            self.0.insert(name, value);
        }
    }
}

pub fn extract_context(headers: &HeaderMap) -> opentelemetry::Context {
    TraceContextPropagator::new().extract(&HeaderView(headers))
}

pub fn inject_context(headers: &mut HeaderMap, ctx: &opentelemetry::Context) {
    TraceContextPropagator::new().inject_context(ctx, &mut HeaderCarrier(headers));
}
