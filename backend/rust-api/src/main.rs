use anyhow::Context;
use opentelemetry::trace::TracerProvider as _;
use quizforge_api::{
    config::{Config, StorageBackend},
    create_router,
    services::AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let telemetry = init_telemetry();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quizforge_api=debug,tower_http=debug".into());

    // LOG_FORMAT=json for log shippers, human readable otherwise
    let fmt_layer = if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(telemetry.as_ref().map(|provider| {
            tracing_opentelemetry::layer().with_tracer(provider.tracer("quizforge-api"))
        }))
        .init();

    tracing::info!("Starting QuizForge API");

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?} (storage: {:?})",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string()),
        config.storage_backend
    );

    let mongo_client = match config.storage_backend {
        StorageBackend::Mongo => {
            let client = mongodb::Client::with_uri_str(&config.mongo_uri)
                .await
                .context("Failed to connect to MongoDB")?;
            tracing::info!("MongoDB connected");
            Some(client)
        }
        StorageBackend::Memory => None,
    };

    let redis_client = config
        .redis_uri
        .as_deref()
        .map(redis::Client::open)
        .transpose()
        .context("Failed to create Redis client")?;

    let server_addr = config.server_addr.clone();
    let app_state = Arc::new(
        AppState::new(config, mongo_client, redis_client)
            .await
            .context("Failed to initialize application state")?,
    );

    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_addr))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_telemetry(telemetry);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// OTLP export is enabled only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set
fn init_telemetry() -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("WARNING: OTLP exporter disabled: {}", e);
            return None;
        }
    };

    let resource = Resource::builder_empty()
        .with_service_name("quizforge-api")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Some(provider)
}

fn shutdown_telemetry(provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>) {
    if let Some(provider) = provider {
        tracing::info!("Shutting down OpenTelemetry");
        if let Err(e) = provider.shutdown() {
            eprintln!("WARNING: OpenTelemetry shutdown failed: {}", e);
        }
    }
}
