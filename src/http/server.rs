//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: landing page, health, proxy endpoints
//! - Answer every `OPTIONS` preflight before routing
//! - Wire up middleware (request ID, tracing, timeout)
//! - Buffer caller bodies and hand requests to the proxy pipeline
//! - Run until the shutdown signal, with the rate limit sweeper alongside

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{into_proxy_request, UuidRequestId, X_REQUEST_ID};
use crate::http::{response, ui};
use crate::lifecycle::Shutdown;
use crate::proxy::{ProxyService, ReqwestUpstream, Upstream};

/// Headroom over the upstream timeout so the pipeline reports its own
/// timeout before the outer layer cuts the connection.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyService>,
    pub max_body_size: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    proxy: Arc<ProxyService>,
}

impl HttpServer {
    /// Create a server fetching through a `reqwest` client.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let upstream = Arc::new(ReqwestUpstream::new(&config.upstream)?);
        Ok(Self::with_upstream(config, upstream))
    }

    /// Create a server over any upstream implementation.
    pub fn with_upstream(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        let proxy = Arc::new(ProxyService::new(&config, upstream));
        let state = AppState {
            proxy: Arc::clone(&proxy),
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            proxy,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let request_timeout = Duration::from_secs(config.upstream.request_timeout_secs) + TIMEOUT_GRACE;

        Router::new()
            .route("/", get(index_handler))
            .route("/go/", get(index_handler))
            .route("/go/{*initial}", get(go_handler))
            .route("/health", get(health_handler))
            .route("/proxy", any(proxy_handler))
            .route("/proxy/", any(proxy_handler))
            .route("/proxy/{*target}", any(proxy_handler))
            .route("/api/proxy", any(proxy_handler))
            .route("/api/proxy/", any(proxy_handler))
            .route("/api/proxy/{*target}", any(proxy_handler))
            .fallback(not_found_handler)
            .with_state(state)
            .layer(middleware::from_fn(preflight_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get(X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id,
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    /// The fully layered router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit = self.config.rate_limit.enabled,
            cache = self.config.cache.enabled,
            "HTTP server starting"
        );

        let sweep_interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
        let sweeper = tokio::spawn(
            self.proxy
                .rate_limiter()
                .run_sweeper(sweep_interval, shutdown.subscribe()),
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        let _ = sweeper.await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Answer preflights for every path, including unknown ones.
async fn preflight_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return response::preflight();
    }
    next.run(request).await
}

async fn index_handler() -> Html<String> {
    ui::landing_page("")
}

/// The suffix is read from the raw URI so it is decoded exactly once.
async fn go_handler(uri: Uri) -> Html<String> {
    let raw = uri.path().strip_prefix("/go/").unwrap_or_default();
    ui::landing_page(&ui::decode_initial(raw))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found_handler() -> ProxyError {
    ProxyError::NotFound
}

async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    match into_proxy_request(request, state.max_body_size).await {
        Ok(request) => state.proxy.handle(request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected caller body");
            e.into_response()
        }
    }
}
