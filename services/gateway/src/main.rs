// gateway: Bridges things on the local socket to the cloud device service.

use gateway::{Gateway, config, server};
use std::sync::Arc;
use std::time::Duration;
use tb_cloud::{HttpCloud, HttpCloudConfig};
use tokio::net::UnixListener;
use tracing::{error, info};

fn config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
    }
    None
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    let cfg = match config_path() {
        Some(path) => config::load_config_from_path(std::path::Path::new(&path)),
        None => config::load_config(),
    };
    let cfg = match cfg {
        Ok(cfg) => {
            info!(
                socket = %cfg.socket.path,
                cloud = %cfg.cloud.base_url,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let cloud = match HttpCloud::new(&HttpCloudConfig {
        base_url: cfg.cloud.base_url.clone(),
        timeout: Duration::from_millis(cfg.cloud.timeout_ms),
    }) {
        Ok(cloud) => cloud,
        Err(e) => {
            eprintln!("FATAL: failed to build cloud client: {}", e);
            std::process::exit(1);
        }
    };

    let gateway = Arc::new(Gateway::new(Arc::new(cloud)));

    // A previous run may have left its socket file behind.
    let _ = std::fs::remove_file(&cfg.socket.path);
    let listener = match UnixListener::bind(&cfg.socket.path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("FATAL: failed to bind {}: {}", cfg.socket.path, e);
            std::process::exit(1);
        }
    };
    info!(path = %cfg.socket.path, "listening");

    tokio::select! {
        result = server::run(listener, gateway.clone()) => {
            if let Err(e) = result {
                error!(%e, "accept loop failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    // Finalize remaining sessions, rolling back unconfirmed registrations.
    gateway.shutdown().await;
    let _ = std::fs::remove_file(&cfg.socket.path);
}
