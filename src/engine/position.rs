use std::collections::{VecDeque, vec_deque::Iter};

use chrono::{DateTime, Utc};

use crate::engine::{Bar, CostModel, Trade};

/// Cash effect of applying one fill to a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Realized P&L of the lots closed by the fill, net of fees.
    pub pnl: i64,
    /// Fees charged on those lots.
    pub fees: i64,
    /// Number of lots closed (split remainders count as one).
    pub closed: usize,
}

/// Open and closed lots of one ticker.
///
/// Open lots are kept in arrival order and offset oldest first. The net share
/// count always equals the sum of the open lots' shares.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Position {
    ticker: String,
    shares: i64,
    trades: VecDeque<Trade>,
    closed_trades: Vec<Trade>,
}

impl Position {
    /// Creates a flat position.
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            shares: 0,
            trades: VecDeque::new(),
            closed_trades: Vec::new(),
        }
    }

    /// Returns the ticker.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the net signed share count.
    pub fn shares(&self) -> i64 {
        self.shares
    }

    /// Returns an iterator over the open lots, oldest first.
    pub fn trades(&self) -> Iter<'_, Trade> {
        self.trades.iter()
    }

    /// Returns the closed lots in closing order.
    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    /// Whether no lot is open.
    pub fn is_flat(&self) -> bool {
        self.trades.is_empty()
    }

    /// Applies a fill of `shares` at `price`.
    ///
    /// Opposite-direction lots are closed oldest first; a lot larger than what
    /// is left of the fill is split and only the needed part is closed, keeping
    /// its original entry. Whatever remains opens a new lot.
    pub(crate) fn apply_fill(&mut self, shares: i64, price: i64, time: DateTime<Utc>, costs: &CostModel) -> Settlement {
        let mut settlement = Settlement::default();
        let mut need = shares;
        let mut i = 0;

        while need != 0 && i < self.trades.len() {
            let lot = self.trades[i].shares();
            if (lot > 0) == (need > 0) {
                i += 1;
                continue;
            }

            let closed = if lot.abs() > need.abs() {
                let part = self.trades[i].split_off(-need);
                self.shares -= part.shares();
                need = 0;
                part
            } else {
                let Some(trade) = self.trades.remove(i) else {
                    break;
                };
                self.shares -= lot;
                need += lot;
                trade
            };
            self.close_trade(closed, price, time, costs, &mut settlement);
        }

        if need != 0 {
            tracing::debug!(ticker = %self.ticker, shares = need, price, "Opening lot");
            self.trades.push_back(Trade::open(self.ticker.clone(), need, price, time));
            self.shares += need;
        }

        debug_assert_eq!(self.shares, self.trades.iter().map(Trade::shares).sum::<i64>());
        settlement
    }

    fn close_trade(
        &mut self,
        mut trade: Trade,
        price: i64,
        time: DateTime<Utc>,
        costs: &CostModel,
        settlement: &mut Settlement,
    ) {
        let fee = costs.fee(trade.shares(), trade.shares() * price);
        let pnl = trade.close(price, time, fee);
        tracing::info!(
            ticker = %self.ticker,
            shares = trade.shares(),
            entry = trade.entry_price(),
            exit = price,
            fee,
            pnl,
            "Closed lot"
        );
        settlement.pnl += pnl;
        settlement.fees += fee;
        settlement.closed += 1;
        self.closed_trades.push(trade);
    }

    /// Sum of the stored P&L of closed lots.
    pub fn realized_pl(&self) -> i64 {
        self.closed_trades.iter().filter_map(Trade::pnl).sum()
    }

    /// P&L of the open lots if they were closed on `bar`.
    ///
    /// Each lot is marked at the bar's close adjusted by the spread in the
    /// lot's own direction and clamped into the bar, minus the fee a close
    /// would pay.
    pub fn unrealized_pl(&self, bar: &Bar, costs: &CostModel) -> i64 {
        self.trades
            .iter()
            .map(|trade| {
                let mark = costs.adjusted_price(trade.shares(), bar.close(), bar.high(), bar.low());
                let fee = costs.fee(trade.shares(), trade.shares() * mark);
                trade.mark_pnl(mark, fee)
            })
            .sum()
    }
}
