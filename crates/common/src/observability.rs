use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Config;

/// What the process is watching. Attached to exported traces as resource
/// attributes so spans from different deployments can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub lock_contract: String,
    pub vote_contract: String,
    pub explorer: String,
}

impl ServiceIdentity {
    pub fn new(service_name: &str, config: &Config) -> Self {
        Self {
            service_name: service_name.to_string(),
            lock_contract: config.explorer.contract_address.to_lowercase(),
            vote_contract: config.explorer.vote_contract_address.to_lowercase(),
            explorer: config.explorer.base_url.clone(),
        }
    }

    pub fn resource_attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("vebtc.lock_contract", self.lock_contract.clone()),
            KeyValue::new("vebtc.vote_contract", self.vote_contract.clone()),
            KeyValue::new("vebtc.explorer", self.explorer.clone()),
        ]
    }
}

/// Flushes the global tracer provider on drop.
pub struct OtelGuard {
    _private: (),
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

struct ErrorCounterLayer;

impl<S> Layer<S> for ErrorCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            metrics::counter!("tracing_error_events").increment(1);
        }
    }
}

/// Build a `tracing` dispatcher configured for:
/// - JSON logs to stdout
/// - EnvFilter that respects `RUST_LOG` (takes precedence) and falls back to `default_level`
/// - `tracing_error_events` counter for ERROR events
/// - Optional OpenTelemetry OTLP trace export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set,
///   tagged with the watched contracts from `identity`
pub fn build_dispatch(
    identity: &ServiceIdentity,
    default_level: &str,
) -> (tracing::Dispatch, Option<OtelGuard>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .json();

    let provider = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|endpoint| otlp_provider(identity, endpoint));
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("vebtc_tracker"))
    });
    let guard = provider.map(|provider| {
        let _ = opentelemetry::global::set_tracer_provider(provider);
        OtelGuard { _private: () }
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(ErrorCounterLayer)
        .with(otel_layer);

    (tracing::Dispatch::new(subscriber), guard)
}

/// `None` when the exporter cannot be built; logs and the error counter still work.
fn otlp_provider(
    identity: &ServiceIdentity,
    endpoint: String,
) -> Option<opentelemetry_sdk::trace::TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .ok()?;

    // Batch export needs a Tokio runtime; the tracker binary is `#[tokio::main]`.
    Some(
        opentelemetry_sdk::trace::TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(identity.resource_attributes()))
            .build(),
    )
}
