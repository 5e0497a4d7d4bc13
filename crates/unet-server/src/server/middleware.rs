//! Middleware configuration and setup

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use unet_core::config::Config;

use super::{app_state::initialize_app_state, routes::create_router};

/// Runs the HTTP server: wires state, applies migrations, starts the
/// background sweep scheduler, and serves the read API until shutdown.
pub async fn run(config: Config, database_url: String) -> Result<()> {
    let app = create_app(config.clone(), database_url).await?;

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))),
        config.server.port,
    ));
    info!("unet-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Creates the Axum application with all routes, initializing application
/// state (including leader election and the background scheduler) first.
pub async fn create_app(config: Config, database_url: String) -> Result<Router> {
    let app_state = initialize_app_state(config.clone(), database_url).await?;
    let router = create_router();
    let app = router.with_state(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_socket_addr_parsing() {
        let mut config = create_test_config();
        config.server.host = "192.168.1.100".to_string();
        config.server.port = 9090;

        let parsed_ip = config.server.host.parse::<std::net::IpAddr>();
        if let Ok(ip) = parsed_ip {
            let addr = SocketAddr::from((ip, config.server.port));
            assert_eq!(addr.port(), 9090);
        }
    }

    #[test]
    fn test_socket_addr_invalid_host_falls_back_to_loopback() {
        let mut config = create_test_config();
        config.server.host = "invalid-host-name".to_string();
        config.server.port = 8080;

        let parsed_ip = config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)));
        let addr = SocketAddr::from((parsed_ip, config.server.port));

        assert_eq!(addr.ip(), std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(addr.port(), 8080);
    }

    #[tokio::test]
    async fn test_create_app_against_in_memory_sqlite() {
        let config = create_test_config();
        let database_url = "sqlite::memory:".to_string();

        let result = create_app(config, database_url).await;
        assert!(result.is_ok());
    }
}
