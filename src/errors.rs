use chrono::{DateTime, Utc};

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while replaying bars, settling orders or computing statistics.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The bar data provided is empty. A price series requires at least one bar.
    #[error("Bar data is empty: a price series requires at least one bar")]
    BarDataEmpty,

    /// Two bars share the same timestamp.
    #[error("Duplicate bar for {0} at {1}")]
    DuplicateBar(String, DateTime<Utc>),

    /// A bar whose low/high do not enclose its open and close.
    #[error("Invalid bar at {0}: low/high must enclose open and close")]
    InvalidBar(DateTime<Utc>),

    /// No price series is registered under this ticker.
    #[error("Unknown ticker: {0}")]
    UnknownTicker(String),

    /// No bar exists at or before the requested time.
    #[error("No bar for {0} at or before {1}")]
    NoBar(String, DateTime<Utc>),

    /// No bar exists strictly before the requested time.
    #[error("No bar for {0} before {1}")]
    NoPreviousBar(String, DateTime<Utc>),

    /// The initial balance is not positive.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(i64),

    /// A limit or stop price that is not positive.
    #[error("Price must be positive (got: {0})")]
    InvalidPrice(i64),

    /// A spread or fee rate out of range.
    #[error("Invalid rate: {0}")]
    InvalidRate(f64),

    /// The explicit order type does not match the prices present.
    #[error("Order type does not match its limit/stop prices")]
    MismatchedOrderType,

    /// An order with this id is already pending.
    #[error("Order {0} is already pending")]
    DuplicateOrder(u32),

    /// The order was not found among the pending orders.
    #[error("Order not found")]
    OrderNotFound,

    /// Backtest results were read before the run completed.
    #[error("Backtest has not been completed yet")]
    NotCompleted,

    /// The backtest is not in a state that allows this transition.
    #[error("Invalid backtest state: {0}")]
    InvalidState(String),

    /// An open trade was passed where a closed one is required.
    #[error("Trade is not closed")]
    TradeNotClosed,

    /// The equity curve has no points.
    #[error("Equity curve is empty")]
    EmptyEquity,

    /// There are no closed trades to analyse.
    #[error("No closed trades")]
    NoClosedTrades,

    /// The equity curve never dipped below a peak.
    #[error("No drawdown runs")]
    NoDrawdowns,

    /// No algorithm factory is registered under this name.
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// An indicator or algorithm window that cannot be computed.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// A free-form error raised by an algorithm.
    #[error("{0}")]
    Msg(String),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
