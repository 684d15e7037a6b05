//! # ledger-bt: cent-exact bar replay for trading algorithms
//!
//! **ledger-bt** replays historical OHLC bars through a trading algorithm and keeps an exact,
//! integer-cent ledger of every fill, open lot, closed lot and cash movement.
//!
//! ## Why ledger-bt?
//! - **Exact accounting**: prices, cash, fees and P&L are `i64` cents; rates are fixed-point, so a
//!   replay is bit-for-bit reproducible.
//! - **FIFO lots**: every fill offsets the oldest opposite lots first, splitting a lot when only part
//!   of it is closed, so each closed lot carries its own entry, exit, fee and P&L.
//! - **Realistic fills**: market, limit, stop and stop-limit orders settle against the bar's range,
//!   with a spread charged against the trader and SEC/FINRA fees charged on close.
//! - **Explicit wiring**: price data, brokers and algorithms are plain values, so parallel sweeps
//!   run one independent broker per parameter set.
//!
//! ## Core Components
//! | Component      | Description                                                                     |
//! |----------------|---------------------------------------------------------------------------------|
//! | **`Bar`**      | One OHLC observation in cents.                                                  |
//! | **`Assets`**   | Registry of immutable price series, shared through an `Arc`.                    |
//! | **`Order`**    | Signed share intent with optional limit and stop prices.                        |
//! | **`Trade`**    | One lot with a fixed entry and a write-once exit.                               |
//! | **`Position`** | FIFO queue of open lots plus the closed ones, per ticker.                       |
//! | **`Broker`**   | Settles pending orders, owns cash and positions, values equity.                 |
//! | **`Backtest`** | Drives an algorithm and a broker over the bars of a reference ticker.           |
//! | **`Statistics`** | Returns, drawdowns and trade statistics of a completed run.                   |
//! | **`Optimizer`** | Parallel parameter sweep (feature `optimizer`).                                |
//!
//! ## Getting Started
//! ```rust
//! use std::sync::Arc;
//!
//! use chrono::{DateTime, TimeDelta};
//! use ledger_bt::prelude::*;
//!
//! let start = DateTime::from_timestamp(1_736_985_600, 0).unwrap();
//! let bars = [(570, 600, 550, 590), (600, 700, 590, 690), (880, 920, 870, 900)]
//!     .into_iter()
//!     .enumerate()
//!     .map(|(i, (o, h, l, c))| Bar::new(start + TimeDelta::days(i as i64), o, h, l, c).unwrap())
//!     .collect();
//! let assets = Arc::new(Assets::new().with(PriceSeries::new("QBTS", bars).unwrap()));
//!
//! let mut broker = Broker::new(assets, 10_000, BrokerConfig::default()).unwrap();
//! broker.place_order(Order::limit("QBTS", 10, 560, start)).unwrap();
//! broker.process_orders(start).unwrap();
//!
//! let later = start + TimeDelta::days(2);
//! broker.place_order(Order::limit("QBTS", -10, 905, later)).unwrap();
//! broker.process_orders(later).unwrap();
//!
//! // 10 * (905 - 560) minus 2 cents of fees
//! assert_eq!(broker.cash(), 13_448);
//! ```
//!
//! ## Logging
//! The crate logs through [`tracing`](https://crates.io/crates/tracing) and never installs a
//! subscriber; applications pick one (the demos use `tracing-subscriber` with `RUST_LOG`).
//!
//! ## Integrations
//! | Crate          | Purpose                                                                      |
//! |----------------|------------------------------------------------------------------------------|
//! | [`rayon`](https://crates.io/crates/rayon) | Parallel parameter sweeps.                        |
//! | [`serde`](https://crates.io/crates/serde) | Serialize bars, trades, statistics; load a broker config from JSON. |
//! | [`ta`](https://crates.io/crates/ta) | Technical indicators to build algorithms with.          |
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Price data, orders, lots, broker and backtest driver.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Algorithms, indicators and the algorithm registry.
pub mod algorithm;

/// Performance statistics of a completed backtest.
pub mod statistics;

/// Utility functions and helpers.
mod utils;

/// Strategy parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::algorithm::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::statistics::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;
}

use std::ops::{Div, Mul, Sub};

/// Trait for performing percentage-based calculations.
///
/// This trait provides methods to take a share of a value and to measure the change between two
/// values, the two calculations position sizing and statistics need.
pub trait PercentCalculus<Rhs = Self> {
    /// Calculates the absolute value of a percentage.
    ///
    /// ### Arguments
    /// * `percent` - The percentage to calculate (e.g., 10.0 for 10%).
    ///
    /// ### Returns
    /// The absolute value of the given percentage.
    fn how_many(self, percent: Rhs) -> Self;

    /// Calculates the percentage change between two values.
    ///
    /// ### Arguments
    /// * `new` - The new value to compare with.
    ///
    /// ### Returns
    /// The percentage change from the original value to the new value.
    fn change(self, new: Rhs) -> Self;
}

impl PercentCalculus for f64 {
    fn how_many(self, percent: Self) -> Self {
        percent.mul(self.div(100.0))
    }

    fn change(self, new: Self) -> Self {
        new.sub(self).div(self).mul(100.0)
    }
}
