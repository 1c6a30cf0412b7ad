use crate::config::Config;
use crate::core::RequestForwarder;
use crate::http_server::middleware::{options_ok, relay_cors};
use crate::http_server::routes;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every route
pub struct AppState {
    pub forwarder: RequestForwarder,
    pub backend_url: String,
    pub cookie_tool: String,
}

impl AppState {
    pub fn new(forwarder: RequestForwarder, config: &Config) -> Self {
        Self {
            forwarder,
            backend_url: config.backend.url.clone(),
            cookie_tool: config.backend.cookie_tool.clone(),
        }
    }
}

pub struct HttpServer {
    config: Config,
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(config: Config, forwarder: RequestForwarder) -> Self {
        let state = Arc::new(AppState::new(forwarder, &config));
        Self { config, state }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.state.clone());

        let addr = SocketAddr::from((
            self.config.server.host.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        ));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("HTTP relay listening on http://{}", listener.local_addr()?);
        info!("Forwarding to MCP server at {}", self.config.backend.url);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Routes are matched on method and path; anything else gets the JSON 404
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(routes::ping).fallback(routes::not_found))
        .route("/tools", get(routes::tools).fallback(routes::not_found))
        .route(
            "/tools/get-cookie",
            post(routes::get_cookie).fallback(routes::not_found),
        )
        .route(
            "/reconnect",
            post(routes::reconnect).fallback(routes::not_found),
        )
        .fallback(routes::not_found)
        .with_state(state)
        .layer(middleware::from_fn(options_ok))
        .layer(relay_cors())
        .layer(TraceLayer::new_for_http())
}
