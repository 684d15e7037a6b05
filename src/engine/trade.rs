use chrono::{DateTime, TimeDelta, Utc};

/// One lot of a position: a signed share count with a fixed entry and, once
/// closed, a fixed exit.
///
/// Trades are only created and closed by [`Position`](crate::engine::Position)
/// while settling orders. Exit fields are write-once.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    ticker: String,
    shares: i64,
    entry_price: i64,
    entry_time: DateTime<Utc>,
    exit_price: Option<i64>,
    exit_time: Option<DateTime<Utc>>,
    fee: Option<i64>,
    pnl: Option<i64>,
}

impl Trade {
    pub(crate) fn open(ticker: impl Into<String>, shares: i64, entry_price: i64, entry_time: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            shares,
            entry_price,
            entry_time,
            exit_price: None,
            exit_time: None,
            fee: None,
            pnl: None,
        }
    }

    /// Detaches `shares` from this lot into a new open lot with the same entry.
    ///
    /// # Panics
    /// If the trade is closed, or `shares` is not strictly smaller than the lot
    /// and in the same direction.
    pub(crate) fn split_off(&mut self, shares: i64) -> Trade {
        assert!(!self.is_closed(), "Cannot split a closed trade");
        assert!(
            shares != 0 && shares.signum() == self.shares.signum() && shares.abs() < self.shares.abs(),
            "Split of {shares} shares does not fit a lot of {}",
            self.shares
        );
        self.shares -= shares;
        Trade::open(self.ticker.clone(), shares, self.entry_price, self.entry_time)
    }

    /// Sets the exit and realizes `shares * (exit - entry) - fee`.
    ///
    /// # Panics
    /// If the trade is already closed.
    pub(crate) fn close(&mut self, exit_price: i64, exit_time: DateTime<Utc>, fee: i64) -> i64 {
        assert!(
            self.exit_price.is_none() && self.exit_time.is_none(),
            "Trade already closed"
        );
        let pnl = self.mark_pnl(exit_price, fee);
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        self.fee = Some(fee);
        self.pnl = Some(pnl);
        pnl
    }

    /// P&L of the lot if it were valued at `price` and charged `fee`.
    pub fn mark_pnl(&self, price: i64, fee: i64) -> i64 {
        self.shares * (price - self.entry_price) - fee
    }

    /// Returns the ticker.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Signed share count of the lot.
    pub fn shares(&self) -> i64 {
        self.shares
    }

    /// Entry price in cents.
    pub fn entry_price(&self) -> i64 {
        self.entry_price
    }

    /// Entry time.
    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    /// Exit price in cents, once closed.
    pub fn exit_price(&self) -> Option<i64> {
        self.exit_price
    }

    /// Exit time, once closed.
    pub fn exit_time(&self) -> Option<DateTime<Utc>> {
        self.exit_time
    }

    /// Fee charged on close.
    pub fn fee(&self) -> Option<i64> {
        self.fee
    }

    /// Realized P&L, fees included. `None` while open.
    pub fn pnl(&self) -> Option<i64> {
        self.pnl
    }

    /// Realized P&L as a fraction of the entry notional.
    pub fn pnl_fraction(&self) -> Option<f64> {
        let notional = self.shares.abs() * self.entry_price;
        if notional == 0 {
            return None;
        }
        self.pnl.map(|pnl| pnl as f64 / notional as f64)
    }

    /// Time between entry and exit. `None` while open.
    pub fn duration(&self) -> Option<TimeDelta> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }

    /// Whether the exit is set.
    pub fn is_closed(&self) -> bool {
        self.exit_price.is_some() && self.exit_time.is_some()
    }

    /// Whether the lot is long.
    pub fn is_long(&self) -> bool {
        self.shares > 0
    }

    /// Whether the lot is short.
    pub fn is_short(&self) -> bool {
        self.shares < 0
    }
}
