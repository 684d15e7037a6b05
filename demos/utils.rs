use chrono::{DateTime, TimeDelta};
use ledger_bt::engine::{Bar, PriceSeries};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init();
}

/// Generates deterministic daily bars, prices in cents.
pub fn generate_sample_series(ticker: &str, days: i64, seed: i64, base_cents: i64) -> PriceSeries {
    let start = DateTime::from_timestamp(1_092_873_600, 0).unwrap_or_default();
    let mut open = base_cents;

    let bars = (0..days)
        .map(|i| {
            // slow trend plus two oscillations
            let trend = base_cents as f64 * 0.002 * i as f64;
            let swing = base_cents as f64 * 0.15 * ((i + seed) as f64 / 9.0).sin();
            let noise = base_cents as f64 * 0.03 * ((i * 7 + seed) as f64 / 2.3).cos();
            let close = (base_cents as f64 + trend + swing + noise).max(100.0) as i64;

            let high = open.max(close) + base_cents / 100;
            let low = (open.min(close) - base_cents / 100).max(1);
            let bar = Bar::from((start + TimeDelta::days(i), open, high, low, close));
            open = close;
            bar
        })
        .collect();

    PriceSeries::new(ticker, bars).expect("generated bars are valid")
}
