use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use federa_auth::http::{AuthState, router};
use federa_auth::metadata::IdpMetadataCache;
use federa_auth::pipeline::{LoggingCompletion, Pipeline};
use federa_auth::{HttpCredentialVerifier, TracingAuditLog};
use federa_auth_memory::{InMemoryIdentityStorage, InMemoryRateLimitStore};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::config::AppConfig;

/// Everything the login endpoints share.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub rate_limits: Arc<InMemoryRateLimitStore>,
}

impl AppState {
    /// Wires storage, the pipeline and the metadata cache from config.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let broker = &cfg.broker;
        let registry = broker.registry().context("invalid backend configuration")?;

        let storage = Arc::new(
            InMemoryIdentityStorage::new().with_unique_email(broker.identity.unique_email),
        );
        let rate_limits = Arc::new(InMemoryRateLimitStore::new());
        let verifier = HttpCredentialVerifier::new(broker.credential.request_timeout)
            .context("failed to build credential API client")?;

        let pipeline = Pipeline::builder()
            .registry(registry)
            .identity_storage(storage)
            .rate_limit_store(rate_limits.clone())
            .verifier(Arc::new(verifier))
            .audit_log(Arc::new(TracingAuditLog))
            .completion(Arc::new(LoggingCompletion))
            .identity_policy(broker.identity)
            .build()
            .context("failed to build authentication pipeline")?;

        let metadata =
            IdpMetadataCache::new(broker.metadata.ttl, broker.metadata.request_timeout)
                .context("failed to build metadata client")?;

        Ok(Self {
            auth: AuthState::new(Arc::new(pipeline), Arc::new(metadata)),
            rate_limits,
        })
    }
}

pub fn build_app(cfg: &AppConfig, state: &AppState) -> Router {
    router(state.auth.clone())
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(cfg.server.request_timeout))
        .layer(ConcurrencyLimitLayer::new(cfg.server.max_concurrent_requests))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record("http.status_code", res.status().as_u16());
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
}

pub struct FederaServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    config: AppConfig,
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<FederaServer> {
        let state = AppState::from_config(&self.config)?;

        if self.config.broker.metadata.prefetch {
            state
                .auth
                .metadata
                .prefetch(state.auth.pipeline.registry())
                .await;
        }

        tracing::info!(
            backends = state.auth.pipeline.registry().len(),
            "authentication pipeline ready"
        );

        Ok(FederaServer {
            addr: self.config.addr(),
            app: build_app(&self.config, &state),
            state,
            config: self.config,
        })
    }
}

impl FederaServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!("listening on {}", self.addr);

        let sweeper = spawn_rate_limit_sweeper(
            self.state.rate_limits.clone(),
            self.config.server.rate_limit_sweep_interval,
        );

        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();
        self.state.auth.metadata.clear().await;
        served?;
        Ok(())
    }
}

fn spawn_rate_limit_sweeper(
    store: Arc<InMemoryRateLimitStore>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired attempt counters dropped");
            }
        }
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
