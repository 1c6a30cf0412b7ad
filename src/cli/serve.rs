//! `serve`: run the relay until SIGINT/SIGTERM

use crate::cli::args::ServeArgs;
use crate::config::{Config, ConfigManager, ConfigValidator, LogFormat};
use crate::core::protocol::Implementation;
use crate::core::{ConnectionSupervisor, RequestForwarder, SupervisorEvent};
use crate::http_server::HttpServer;
use crate::transport::{StreamableHttpFactory, StreamableHttpOptions};
use crate::utils::errors::{McpError, McpResult};
use crate::utils::shutdown::ShutdownCoordinator;
use crate::utils::tracing::init_tracing;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use url::Url;

/// Layer CLI flags over the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &ServeArgs) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = &args.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }
}

/// Wire the streamable transport, supervisor and forwarder for `config`
pub fn build_forwarder(config: &Config) -> McpResult<RequestForwarder> {
    let endpoint = Url::parse(&config.backend.url)
        .map_err(|e| McpError::ConfigError(format!("Invalid backend URL: {}", e)))?;

    let factory = StreamableHttpFactory::new(
        Implementation {
            name: config.backend.client_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        StreamableHttpOptions {
            connect_timeout: config.backend.connect_timeout(),
            request_timeout: config.backend.request_timeout(),
        },
    );

    let supervisor =
        ConnectionSupervisor::new(endpoint, Arc::new(factory), config.supervisor.clone());

    Ok(RequestForwarder::new(
        supervisor,
        config.backend.request_timeout(),
    ))
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = ConfigManager::new(args.config.as_deref()).load()?;
    apply_overrides(&mut config, &args);
    ConfigValidator::new().validate(&config)?;

    init_tracing(&config.logging.level, config.logging.format);

    info!(
        "Starting cookie relay on {}:{}",
        config.server.host, config.server.port
    );

    let forwarder = build_forwarder(&config)?;
    let supervisor = forwarder.supervisor().clone();

    tokio::spawn(watch_events(supervisor.clone()));

    // The listener comes up whether or not the backend is reachable yet
    let initial = supervisor.clone();
    tokio::spawn(async move {
        if !initial.initialize().await {
            warn!("Initial connection to MCP server failed; retrying in the background");
        }
    });

    let coordinator = ShutdownCoordinator::new();
    let signals = coordinator.clone();
    tokio::spawn(async move { signals.wait_for_shutdown_signal().await });

    let server = HttpServer::new(config, forwarder);
    let result = server.run(coordinator.signalled()).await;

    supervisor.shutdown().await;
    info!("Cookie relay stopped");

    result
}

/// Surface supervisor events that need an operator's attention
async fn watch_events(supervisor: ConnectionSupervisor) {
    let mut events = supervisor.subscribe();

    loop {
        match events.recv().await {
            Ok(SupervisorEvent::ReconnectExhausted { attempts }) => {
                error!(
                    attempts,
                    "Giving up on {} until restarted or POST /reconnect",
                    supervisor.endpoint()
                );
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} supervisor events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
