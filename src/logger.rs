use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::{
    logs::SdkLoggerProvider, metrics::SdkMeterProvider, trace::SdkTracerProvider,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

const SERVICE_NAME: &str = "greentic-plaid";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    pub fn parse(level: &str) -> Self {
        match level.trim().to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    /// The `EnvFilter` directive matching this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

#[async_trait]
#[typetag::serde]
pub trait LoggerType: Send + Sync {
    fn log(&self, level: LogLevel, context: &str, msg: &str);
    fn clone_box(&self) -> Box<dyn LoggerType>;
    fn debug_box(&self) -> String;
}

/// Host-facing logger handed to nodes through their context.
#[derive(Serialize, Deserialize)]
pub struct Logger(pub Box<dyn LoggerType>);

impl Logger {
    pub fn tracing() -> Self {
        Logger(Box::new(TracingLogger::new()))
    }

    pub fn log(&self, level: LogLevel, context: &str, msg: &str) {
        self.0.log(level, context, msg)
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Logger(self.0.clone_box())
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Forwards host log lines into `tracing`, so they end up wherever the
/// installed subscriber sends them (files or OTLP).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

#[typetag::serde]
#[async_trait]
impl LoggerType for TracingLogger {
    fn log(&self, level: LogLevel, context: &str, msg: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(%context, "{msg}"),
            LogLevel::Debug => tracing::debug!(%context, "{msg}"),
            LogLevel::Info => tracing::info!(%context, "{msg}"),
            LogLevel::Warn => tracing::warn!(%context, "{msg}"),
            LogLevel::Error => tracing::error!(%context, "{msg}"),
            LogLevel::Critical => tracing::error!(%context, "[CRITICAL] {msg}"),
        }
    }

    fn clone_box(&self) -> Box<dyn LoggerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        "TracingLogger".to_string()
    }
}

/// Where logs go for one process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: LogLevel,
    pub log_file: PathBuf,
    pub event_file: PathBuf,
    pub otel_endpoint: Option<String>,
}

impl LogConfig {
    pub fn new(root: &Path, log_level: LogLevel, otel_endpoint: Option<String>) -> Self {
        Self {
            log_level,
            log_file: root.join("logs").join("greentic-plaid.log"),
            event_file: root.join("logs").join("greentic-plaid-requests.json"),
            otel_endpoint,
        }
    }
}

/// Keeps the OTLP providers alive; dropping it stops exporting.
pub struct TelemetryGuard {
    logger_provider: Option<SdkLoggerProvider>,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    fn files_only() -> Self {
        Self {
            logger_provider: None,
            tracer_provider: None,
            meter_provider: None,
        }
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.logger_provider {
            let _ = provider.shutdown();
        }
        if let Some(provider) = self.tracer_provider {
            let _ = provider.shutdown();
        }
        if let Some(provider) = self.meter_provider {
            let _ = provider.shutdown();
        }
    }
}

/// Install the global subscriber: OTLP exporters when an endpoint is
/// configured, otherwise a rolling text log plus a JSON request log.
pub fn init_tracing(config: &LogConfig) -> Result<(Logger, TelemetryGuard)> {
    let guard = match &config.otel_endpoint {
        Some(endpoint) => init_otlp(config.log_level, endpoint)?,
        None => init_files(config.log_level, &config.log_file, &config.event_file)?,
    };
    Ok((Logger::tracing(), guard))
}

static RESOURCE: OnceLock<Resource> = OnceLock::new();
fn get_resource() -> Resource {
    RESOURCE
        .get_or_init(|| Resource::builder().with_service_name(SERVICE_NAME).build())
        .clone()
}

fn init_otlp(log_level: LogLevel, endpoint: &str) -> Result<TelemetryGuard> {
    let log_exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("could not build OTLP log exporter")?;
    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(get_resource())
        .build();

    let span_exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("could not build OTLP span exporter")?;
    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(get_resource())
        .build();

    let metric_exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("could not build OTLP metric exporter")?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(get_resource())
        .build();

    // the exporters talk HTTP themselves; keep their own chatter out of the pipeline
    let otel_filter = EnvFilter::new(log_level.as_filter())
        .add_directive("hyper=off".parse()?)
        .add_directive("h2=off".parse()?)
        .add_directive("reqwest=off".parse()?);
    let otel_logs_layer = OpenTelemetryTracingBridge::new(&logger_provider).with_filter(otel_filter);

    let fmt_layer = fmt::layer()
        .with_thread_names(true)
        .with_filter(EnvFilter::new(log_level.as_filter()));

    Registry::default()
        .with(otel_logs_layer)
        .with(fmt_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    global::set_tracer_provider(tracer_provider.clone());
    global::set_meter_provider(meter_provider.clone());

    Ok(TelemetryGuard {
        logger_provider: Some(logger_provider),
        tracer_provider: Some(tracer_provider),
        meter_provider: Some(meter_provider),
    })
}

fn init_files(log_level: LogLevel, log_file: &Path, event_file: &Path) -> Result<TelemetryGuard> {
    let (log_dir, log_name) = split_log_path(log_file)?;
    let (event_dir, event_name) = split_log_path(event_file)?;
    for dir in [&log_dir, &event_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("could not create log directory {}", dir.display()))?;
    }

    let txt_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, log_name);
    let txt_layer = fmt::Layer::default()
        .with_writer(txt_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(log_level.as_filter()));

    // one JSON line per upstream call, emitted with target = "request"
    let json_appender = RollingFileAppender::new(Rotation::DAILY, event_dir, event_name);
    let json_layer = fmt::layer()
        .json()
        .with_writer(json_appender)
        .with_target(true)
        .with_filter(EnvFilter::new("request=info"));

    Registry::default()
        .with(txt_layer)
        .with(json_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(TelemetryGuard::files_only())
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("log path {} has no file name", path.display()))?;
    Ok((dir, name))
}

/// Counters and latency for upstream Plaid calls, recorded against the
/// global meter. Without an OTLP endpoint the global provider is a no-op.
#[derive(Clone, Debug)]
pub struct RequestMetrics {
    started: Counter<u64>,
    succeeded: Counter<u64>,
    failed: Counter<u64>,
    latency_ms: Histogram<f64>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        let meter = global::meter(SERVICE_NAME);
        Self {
            started: meter
                .u64_counter("plaid_requests_started")
                .with_description("Plaid API requests started")
                .build(),
            succeeded: meter.u64_counter("plaid_requests_succeeded").build(),
            failed: meter.u64_counter("plaid_requests_failed").build(),
            latency_ms: meter
                .f64_histogram("plaid_request_latency_ms")
                .with_description("Latency per Plaid API request in ms")
                .with_unit("ms")
                .build(),
        }
    }

    pub fn started(&self, endpoint: &str) {
        self.started.add(1, &[endpoint_attr(endpoint)]);
    }

    /// Record the outcome and emit the `request` event picked up by the JSON log.
    pub fn finished(&self, endpoint: &str, elapsed: Duration, ok: bool) {
        let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
        let attrs = [endpoint_attr(endpoint)];
        self.latency_ms.record(elapsed_ms, &attrs);
        if ok {
            self.succeeded.add(1, &attrs);
        } else {
            self.failed.add(1, &attrs);
        }
        tracing::event!(
            target: "request",
            tracing::Level::INFO,
            request = endpoint,
            latency_ms = elapsed_ms,
            status = if ok { "ok" } else { "error" },
        );
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint_attr(endpoint: &str) -> KeyValue {
    KeyValue::new("endpoint", endpoint.to_string())
}
