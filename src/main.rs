//! MediaShelf binary.
//!
//! `serve` runs the storage gateway: a JSON/HTTP API over a filesystem
//! media store with one subdirectory per category, plus a static `/media`
//! mount serving the same bytes. `upload` is the client side: it encodes a
//! local file, submits it, and walks the user through duplicate-name
//! resolution.

mod background;
mod category;
mod client;
mod config;
mod error;
mod http;
mod locking;
mod logging;
mod objects;
mod orchestrator;
mod staged;
mod storage;
mod upload;
mod version;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::{Args, Command, ServeArgs};
use crate::http::{PublicUrls, build_cors_layer, resolve_client_ip};
use crate::locking::LockManager;
use crate::storage::Storage;

shadow!(build);

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Upload(upload_args) => client::run_upload(upload_args).await,
    }
}

/// Builds the router and blocks on the HTTP listener until shutdown.
async fn serve(args: ServeArgs) -> Result<(), std::io::Error> {
    let storage = Arc::new(Storage::new(PathBuf::from(&args.storage_dir)));
    storage.ensure_root().await?;
    let locks = Arc::new(LockManager::new());

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.http_port);
    let public_base = args
        .public_base
        .clone()
        .unwrap_or_else(|| format!("http://{addr}"));
    let urls = PublicUrls::new(public_base);

    let mut app = Router::new()
        .route("/api/upload", post(upload::upload_media))
        .route(
            "/api/all/{type}",
            get(objects::list_media).delete(objects::delete_all_media),
        )
        .route(
            "/api/{type}/{filename}",
            get(objects::fetch_media).delete(objects::delete_media),
        )
        .route("/api/version", get(version::get_version_info))
        .nest_service("/media", ServeDir::new(storage.root_path()))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(DefaultBodyLimit::max(args.body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage.clone()))
        .layer(Extension(locks))
        .layer(Extension(urls));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    background::spawn_background_tasks(storage, Duration::from_secs(args.staged_ttl_secs));

    let handle = Handle::new();
    info!("starting HTTP server at {}", addr);
    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
