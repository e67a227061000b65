// src/main.rs

mod config;
mod ws;

use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dotenv::dotenv;
use log::{error, info};
use sensorbridge_lib::{Context, run_serial_and_stream};
use tokio::task;
use warp::Filter;

/* RUST_LOG=sensorbridge_lib=debug,sensorbridge_server=info \
cargo run -p sensorbridge-server */

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // initialize logger and panic hook
    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));

    // SENSORBRIDGE_CONFIG picks the config file, SERIAL_PORT overrides
    // the configured port.
    let config_path =
        std::env::var("SENSORBRIDGE_CONFIG").unwrap_or_else(|_| "config.yaml".to_owned());
    let mut cfg = config::load(Path::new(&config_path))?;
    if let Ok(port) = std::env::var("SERIAL_PORT") {
        cfg.serial.port = port;
    }

    info!(
        "Configured serial port: {} @ {} baud",
        cfg.serial.port, cfg.serial.baudrate
    );

    // shared pipeline context: stats, latest state, subscriber set
    let ctx = Context::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    // ──────── 1) serial → parse → stats → broadcast ────────
    let serial_ctx = ctx.clone();
    let serial_settings = cfg.serial.clone();
    let serial_shutdown = shutdown.clone();
    let serial_task = task::spawn_blocking(move || {
        if let Err(e) = run_serial_and_stream(serial_ctx, &serial_settings, serial_shutdown) {
            error!("Serial ingestion failed: {}", e);
        }
    });

    // ──────── 2) HTTP: WebSocket + status + health ────────
    let ws_routes = ws::ws_routes(ctx.clone());

    let status_ctx = ctx.clone();
    let status = warp::path!("api" / "status").map(move || {
        warp::reply::json(&serde_json::json!({
            "connected_clients": status_ctx.broadcaster().client_count(),
            "serial_connected": status_ctx.serial_connected(),
            "latest_data": status_ctx.latest(),
        }))
    });

    let health = warp::path!("health").map(|| "OK");
    let routes = ws_routes.or(status).or(health);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("HTTP+WS: {} (/ws, /api/status, /health)", addr);

    let (_bound, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        let _ = tokio::signal::ctrl_c().await;
    });
    server.await;

    // ctrl-c: stop the ingestion loop and wait for the port to close
    shutdown.store(true, Ordering::Relaxed);
    let _ = serial_task.await;
    info!("Shutdown complete.");
    Ok(())
}
