// =============================================================================
// Flowpulse Market Feed — Main Entry Point
// =============================================================================
//
// Boots one synthetic chart engine per configured market, warm-starts each
// series over the look-back window, then runs the per-market tick loops and
// the dashboard API until Ctrl+C. Shutdown is deterministic: every chart loop
// observes the shutdown signal and drains before the process exits.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod chart;
mod runtime_config;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::chart::run_chart_loop;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Flowpulse Market Feed — Starting Up              ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load("flowpulse_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override markets from env if available.
    if let Ok(syms) = std::env::var("FLOWPULSE_MARKETS") {
        config.markets = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.markets.is_empty() {
        config.markets = vec![
            "SOLO".into(),
            "CSC".into(),
            "XPM".into(),
            "ELS".into(),
            "VGB".into(),
        ];
    }

    info!(markets = ?config.markets, "Configured markets");
    info!(
        bucket_ms = config.chart.bucket_ms,
        window_bars = config.chart.window_bars,
        tick_ms = config.chart.tick_ms,
        "Chart parameters fixed for this run"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Warm-start every chart ────────────────────────────────────────
    // One replayed sample per elapsed second across the look-back window, so
    // the dashboard never sees an empty chart.
    {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        for (market, engine) in state.all_chart_engines() {
            engine.seed(now_ms, &mut rng);
            info!(
                market = %market,
                series = %engine.series_id(),
                candles = engine.candle_count(),
                last_price = engine.last_price(),
                "chart seeded"
            );
        }
    }

    // ── 4. Spawn chart loops ─────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut loop_handles = Vec::new();
    for (_, engine) in state.all_chart_engines() {
        loop_handles.push(tokio::spawn(run_chart_loop(
            engine,
            state.clone(),
            shutdown_rx.clone(),
        )));
    }

    info!(count = loop_handles.len(), "Chart loops launched");

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("FLOWPULSE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    // Flip the shutdown signal and wait for every chart loop to drain so no
    // timer callback fires after this point.
    let _ = shutdown_tx.send(true);
    for handle in loop_handles {
        let _ = handle.await;
    }

    if let Err(e) = state.runtime_config.read().save("flowpulse_config.json") {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Flowpulse Market Feed shut down complete.");
    Ok(())
}
