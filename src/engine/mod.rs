//! Core ledger and replay components.
//!
//! This module provides the fundamental types for backtesting:
//! - `Bar`, `PriceSeries`, `Assets`: immutable OHLC price data.
//! - `Order`: market, limit, stop and stop-limit orders in signed shares.
//! - `Trade`, `Position`: FIFO lots and their realized/unrealized P&L.
//! - `Wallet`, `CostModel`, `BrokerConfig`: cash, spread and fees.
//! - `Broker`: the settlement engine.
//! - `Backtest`: the bar-by-bar driver.

mod backtest;
mod bar;
mod broker;
mod costs;
mod order;
mod position;
mod series;
mod trade;
mod wallet;

#[cfg(test)]
mod scenarios;

pub use backtest::*;
pub use bar::*;
pub use broker::*;
pub use costs::*;
pub use order::*;
pub use position::*;
pub use series::*;
pub use trade::*;
pub use wallet::*;
