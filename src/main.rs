// =============================================================================
// Confluence Runner — Main Entry Point
// =============================================================================
//
// Local scheduler around the library: on every tick it reloads the market
// snapshot written by the source adapters, runs the confluence, dealer bias
// and multi-timeframe pipelines, and logs their summaries.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use level_confluence::confluence::dealer_confluence_score;
use level_confluence::{
    ConfluenceAnalyzer, DealersBiasAnalyzer, EngineConfig, MarketSnapshot, MtfFusion,
};

const DEFAULT_CONFIG_PATH: &str = "confluence_config.json";
const DEFAULT_SNAPSHOT_PATH: &str = "market_snapshot.json";
/// Volatility index assumed when the snapshot carries none.
const DEFAULT_VIX: f64 = 20.0;
/// Realized volatility assumed when the snapshot carries none (normal band).
const DEFAULT_REALIZED_VOL: f64 = 0.5;

struct Engines {
    confluence: ConfluenceAnalyzer,
    bias: DealersBiasAnalyzer,
    fusion: MtfFusion,
}

fn run_cycle(engines: &Engines, config: &EngineConfig, snapshot: &MarketSnapshot) {
    let symbol = snapshot.symbol.as_deref().unwrap_or(&config.symbol);
    let price = snapshot.reference_price;

    // ── Confluence zones ─────────────────────────────────────────────────
    let analysis = engines.confluence.analyze(&snapshot.levels, price);
    let summary = analysis.summary();
    info!(
        symbol,
        price,
        zones = summary.total_zones,
        strong = summary.strong_zones,
        at_price = format!("{:.3}", summary.confluence_at_price),
        proximity = format!("{:.3}", summary.proximity_score),
        support = ?summary.nearest_support.as_ref().map(|z| z.price),
        resistance = ?summary.nearest_resistance.as_ref().map(|z| z.price),
        "confluence"
    );

    // ── Dealer bias ──────────────────────────────────────────────────────
    let dealer = snapshot.dealer_levels();
    let bias = engines.bias.analyze(price, snapshot.vix, &dealer).summary();
    let band = dealer_confluence_score(
        &dealer,
        price,
        snapshot.vix.unwrap_or(DEFAULT_VIX),
        config.tick_size,
        &config.bias,
    );
    info!(
        symbol,
        score = format!("{:.3}", bias.score),
        direction = %bias.direction,
        strength = %bias.strength,
        quality = format!("{:.2}", bias.quality_score),
        dealer_confluence = format!("{:.3}", band.score),
        band_ticks = band.band_ticks,
        "dealer bias"
    );

    // ── Multi-timeframe confirmation ─────────────────────────────────────
    if !snapshot.timeframe_signals.is_empty() {
        let fused = engines.fusion.fuse(
            snapshot.realized_volatility.unwrap_or(DEFAULT_REALIZED_VOL),
            &snapshot.timeframe_signals,
        );
        info!(
            symbol,
            fused = format!("{:.3}", fused.final_score),
            base = format!("{:.3}", fused.base_score),
            band = %fused.volatility_band,
            interpretation = %fused.interpretation,
            "multi-timeframe"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Confluence runner starting");

    let config_path = std::env::var("CONFLUENCE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    let snapshot_path: PathBuf = std::env::var("CONFLUENCE_SNAPSHOT")
        .unwrap_or_else(|_| DEFAULT_SNAPSHOT_PATH.into())
        .into();

    // ── 2. Engines (configuration errors stop startup) ───────────────────
    let engines = Arc::new(Engines {
        confluence: ConfluenceAnalyzer::new(&config)?,
        bias: DealersBiasAnalyzer::new(&config)?,
        fusion: MtfFusion::new(&config)?,
    });
    let config = Arc::new(config);

    // ── 3. Refresh loop ──────────────────────────────────────────────────
    let loop_engines = engines.clone();
    let loop_config = config.clone();
    tokio::spawn(async move {
        let period = loop_config.refresh_interval_secs.max(1);
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(period));
        loop {
            interval.tick().await;
            match MarketSnapshot::load(&snapshot_path) {
                Ok(snapshot) => run_cycle(&loop_engines, &loop_config, &snapshot),
                Err(e) => warn!(error = %e, "snapshot unavailable, skipping cycle"),
            }
        }
    });

    info!(
        symbol = %config.symbol,
        refresh_secs = config.refresh_interval_secs,
        "Runner active. Press Ctrl+C to stop."
    );

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received");

    let stats = engines.confluence.stats();
    info!(
        analyses = stats.analyses_count,
        avg_ms = format!("{:.3}", stats.avg_analysis_ms),
        zones = stats.zones_detected,
        strong_zones = stats.strong_zones_detected,
        "Confluence runner stopped"
    );
    Ok(())
}
