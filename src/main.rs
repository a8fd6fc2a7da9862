#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::routing::get;
use axum_client_ip::ClientIpSource;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::JwtKeys;
use crate::api::router;
use crate::codes::RandomCodes;
use crate::config::Config;
use crate::creation::Shortener;
use crate::geo::CountryResolver;
use crate::qr::SvgQrRenderer;
use crate::resolution::Resolver;
use crate::storage::Memory;
use crate::storage::Postgres;
use crate::storage::Storage;
use crate::utils::env_var_or_else;

mod analytics;
mod api;
mod client_ip;
mod codes;
mod config;
mod creation;
mod errors;
mod geo;
mod graceful_shutdown;
mod links;
mod password;
mod qr;
mod resolution;
mod root;
mod storage;
#[cfg(test)]
mod tests;
mod utils;

const DEFAULT_RUST_LOG: &str = "snip=debug,tower_http=debug";
const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let app = setup_app(Config::from_env()).await?;

    let address = setup_address()?;
    tracing::info!("Listening on {address}");

    let listener = TcpListener::bind(address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown::handler())
    .await?;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// Links are kept in Postgres when `DATABASE_URL` is set, in memory otherwise
///
/// # Errors
///
/// Will return `Err` if the database connection or its migrations fail
pub async fn setup_app(config: Config) -> Result<Router> {
    let jwt_keys = setup_jwt_keys();

    if let Some(database_url) = &config.database_url {
        let storage = Postgres::connect(database_url).await?;
        tracing::info!("Storing links in Postgres");

        Ok(create_router(storage, config, jwt_keys))
    } else {
        tracing::info!("`DATABASE_URL` is not set, storing links in memory");

        Ok(create_router(Memory::new(), config, jwt_keys))
    }
}

/// Create the router for Snip
fn create_router<S: Storage>(storage: S, config: Config, jwt_keys: JwtKeys) -> Router {
    let countries = CountryResolver::from_config(&config);

    let shortener = Shortener::new(
        storage.clone(),
        Arc::new(RandomCodes),
        Arc::new(SvgQrRenderer),
        config.clone(),
    );

    let resolver = Resolver::new(storage.clone(), config.count_on_challenge);

    Router::new()
        .nest("/api", router::<S>())
        .fallback(get(root::root::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(ClientIpSource::ConnectInfo.into_extension())
        .layer(Extension(storage))
        .layer(Extension(shortener))
        .layer(Extension(resolver))
        .layer(Extension(countries))
        .layer(Extension(config))
        .layer(Extension(jwt_keys))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}

fn setup_jwt_keys() -> JwtKeys {
    use crate::password::generate;

    let jwt_secret = env_var_or_else("JWT_SECRET", || {
        let jwt_secret = generate();
        tracing::info!("`JWT_SECRET` is not set, generating temporary one: {jwt_secret}");
        jwt_secret
    });

    JwtKeys::new(jwt_secret.as_bytes())
}

fn setup_address() -> Result<SocketAddr> {
    let mut address =
        env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS)).parse::<SocketAddr>()?;

    // optional override of just the port
    if let Ok(port) = std::env::var("PORT") {
        // only check non-empty strings
        if !port.is_empty() {
            let port = port.parse::<u16>()?;

            address.set_port(port);
        }
    }

    Ok(address)
}
