use std::{
    collections::{BTreeMap, VecDeque, vec_deque::Iter},
    sync::Arc,
};

use chrono::{DateTime, Utc};

use crate::{
    engine::*,
    errors::{Error, Result},
};

/// Price and time at which an order executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Execution price in cents.
    pub price: i64,
    /// Execution time (a bar time).
    pub time: DateTime<Utc>,
}

/// Execution venue: owns the cash, the cost model, every position and the
/// queue of pending orders.
///
/// Prices come from the shared, read-only [`Assets`] registry. Each backtest
/// needs its own broker; nothing here is shared between runs.
#[derive(Debug, Clone)]
pub struct Broker {
    wallet: Wallet,
    assets: Arc<Assets>,
    config: BrokerConfig,
    costs: CostModel,
    positions: BTreeMap<String, Position>,
    orders: VecDeque<Order>,
}

impl std::ops::Deref for Broker {
    type Target = Wallet;

    fn deref(&self) -> &Self::Target {
        &self.wallet
    }
}

impl Broker {
    /// Creates a new broker.
    ///
    /// ### Arguments
    /// * `assets` - Price series the broker settles against.
    /// * `initial_cash` - Starting cash in cents.
    /// * `config` - Execution price source, spread and fee rates.
    ///
    /// ### Returns
    /// The broker, or an error if the cash is not positive or a rate is invalid.
    ///
    /// ### Example
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use chrono::DateTime;
    /// use ledger_bt::prelude::*;
    ///
    /// let time = DateTime::from_timestamp(1_736_985_600, 0).unwrap();
    /// let series = PriceSeries::new("QBTS", vec![Bar::new(time, 570, 600, 550, 590).unwrap()]).unwrap();
    /// let assets = Arc::new(Assets::new().with(series));
    ///
    /// let mut broker = Broker::new(assets, 10_000, BrokerConfig::default()).unwrap();
    /// broker.place_order(Order::limit("QBTS", 10, 560, time)).unwrap();
    /// broker.process_orders(time).unwrap();
    /// assert_eq!(broker.get_position("QBTS").unwrap().shares(), 10);
    /// ```
    pub fn new(assets: Arc<Assets>, initial_cash: i64, config: BrokerConfig) -> Result<Self> {
        let costs = CostModel::try_from(&config)?;
        Ok(Self {
            wallet: Wallet::new(initial_cash)?,
            assets,
            config,
            costs,
            positions: BTreeMap::new(),
            orders: VecDeque::new(),
        })
    }

    /// Returns the price registry.
    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    /// Returns the shared handle to the price registry.
    pub fn assets_handle(&self) -> Arc<Assets> {
        Arc::clone(&self.assets)
    }

    /// Returns the configuration the broker was built with.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Returns the validated cost model.
    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    /// Whether market orders fill at the previous close.
    pub fn trade_on_close(&self) -> bool {
        self.config.trade_on_close
    }

    /// Returns an iterator over the pending orders.
    pub fn orders(&self) -> Iter<'_, Order> {
        self.orders.iter()
    }

    /// Returns an iterator over every position ever touched, by ticker.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Returns the position of `ticker`, if an order for it was ever settled.
    pub fn get_position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    /// Net shares held in `ticker`, zero when there is no position.
    pub fn shares(&self, ticker: &str) -> i64 {
        self.get_position(ticker).map_or(0, Position::shares)
    }

    /// Returns every closed lot, grouped by ticker.
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.positions.values().flat_map(|p| p.closed_trades().iter())
    }

    /// Queues an order for settlement.
    ///
    /// Orders for zero shares are ignored.
    ///
    /// Order ids are random, so pending ids are kept unique here: an order
    /// whose id is already pending (placed twice, or a colliding id) is
    /// rejected, and [`Broker::cancel_order`] always removes the order it was
    /// given.
    ///
    /// ### Returns
    /// Ok if queued or ignored, or an error if the ticker is unknown, the
    /// order prices are invalid or its id is already pending.
    pub fn place_order(&mut self, order: Order) -> Result<()> {
        if order.shares() == 0 {
            tracing::debug!(ticker = order.ticker(), "Ignoring order for 0 shares");
            return Ok(());
        }
        self.assets.get(order.ticker())?;
        order.validate()?;
        if self.orders.contains(&order) {
            return Err(Error::DuplicateOrder(order.id()));
        }
        tracing::info!(
            id = order.id(),
            ticker = order.ticker(),
            shares = order.shares(),
            kind = ?order.order_type(),
            limit = ?order.limit_price(),
            stop = ?order.stop_price(),
            placed = %order.placed(),
            "Placing order"
        );
        self.orders.push_back(order);
        Ok(())
    }

    /// Removes a pending order.
    ///
    /// ### Returns
    /// The removed order, or [`Error::OrderNotFound`] if it is not pending
    /// (already settled, already cancelled or never placed).
    pub fn cancel_order(&mut self, order: &Order) -> Result<Order> {
        let order_idx = self
            .orders
            .iter()
            .position(|o| o == order)
            .ok_or(Error::OrderNotFound)?;
        let order = self.orders.remove(order_idx).ok_or(Error::OrderNotFound)?;
        tracing::info!(id = order.id(), ticker = order.ticker(), shares = order.shares(), "Order cancelled");
        Ok(order)
    }

    /// Settles every pending order against the bars at or before `time`.
    ///
    /// Orders whose conditions are not met stay queued. On a data gap the
    /// failing order and the orders after it stay queued and the error is
    /// returned.
    ///
    /// # Panics
    /// If a pending order was placed after `time`.
    pub fn process_orders(&mut self, time: DateTime<Utc>) -> Result<()> {
        tracing::debug!(pending = self.orders.len(), %time, "Processing orders");
        let mut pending = std::mem::take(&mut self.orders).into_iter();
        let mut remaining = VecDeque::with_capacity(pending.len());

        while let Some(mut order) = pending.next() {
            assert!(
                order.placed() <= time,
                "Order cannot be processed before it was placed ({} > {time})",
                order.placed()
            );
            match self.settle(&mut order, time) {
                Ok(true) => {}
                Ok(false) => remaining.push_back(order),
                Err(e) => {
                    remaining.push_back(order);
                    remaining.extend(pending);
                    self.orders = remaining;
                    return Err(e);
                }
            }
        }

        self.orders = remaining;
        Ok(())
    }

    /// Settles one order. Returns whether it was filled.
    fn settle(&mut self, order: &mut Order, time: DateTime<Utc>) -> Result<bool> {
        let assets = Arc::clone(&self.assets);
        let series = assets.get(order.ticker())?;
        let bar = series.require_at_or_before(time)?;

        let Some(fill) = self.fill_for(order, series, bar)? else {
            return Ok(false);
        };

        tracing::info!(
            id = order.id(),
            ticker = order.ticker(),
            shares = order.shares(),
            price = fill.price,
            time = %fill.time,
            "Order filled"
        );
        let position = self
            .positions
            .entry(order.ticker().to_owned())
            .or_insert_with(|| Position::new(order.ticker()));
        let settlement = position.apply_fill(order.shares(), fill.price, fill.time, &self.costs);
        self.wallet.realize(settlement.pnl, settlement.fees);
        Ok(true)
    }

    /// Decides whether `order` executes on `bar` and at which price.
    ///
    /// Stop and limit conditions are checked against the bar's range. When a
    /// stop-limit order triggers and its limit is also inside the bar, the
    /// fill is deferred if the limit sits at or beyond the stop in the
    /// trader's favour (`limit <= stop` for buys, `stop <= limit` for sells):
    /// with only OHLC data the limit is then assumed to have traded before
    /// the stop did.
    fn fill_for(&self, order: &mut Order, series: &PriceSeries, bar: &Bar) -> Result<Option<Fill>> {
        let long = order.is_long();
        let stop = order.stop_price();
        let was_stop = order.is_stop();

        if was_stop {
            let stop = stop.ok_or(Error::MismatchedOrderType)?;
            let hit = if long { stop <= bar.high() } else { bar.low() <= stop };
            if !hit {
                tracing::trace!(id = order.id(), stop, "Stop not hit");
                return Ok(None);
            }
        }

        // resolved before the stop is cleared: a missing previous bar must
        // leave the order as it was placed
        let previous = if self.config.trade_on_close && !order.is_limit() {
            Some(series.require_before(bar.time())?)
        } else {
            None
        };
        if was_stop {
            order.trigger_stop();
        }

        if order.is_limit() {
            let limit = order.limit_price().ok_or(Error::MismatchedOrderType)?;
            let hit = if long { bar.low() <= limit } else { limit <= bar.high() };
            let hit_before_stop = hit
                && was_stop
                && stop.is_some_and(|stop| if long { limit <= stop } else { stop <= limit });
            if !hit || hit_before_stop {
                tracing::trace!(id = order.id(), limit, hit, hit_before_stop, "Limit not filled");
                return Ok(None);
            }
            let reference = stop.unwrap_or(bar.open());
            let price = if long { limit.min(reference) } else { limit.max(reference) };
            return Ok(Some(Fill { price, time: bar.time() }));
        }

        let (base, time) = match previous {
            Some(prev) => (prev.close(), prev.time()),
            None => (bar.open(), bar.time()),
        };
        let base = match stop {
            Some(stop) if long => base.max(stop),
            Some(stop) => base.min(stop),
            None => base,
        };
        let price = self.adjusted_price(order.shares(), base, bar.high(), bar.low());
        Ok(Some(Fill { price, time }))
    }

    /// Fee for a closing fill, in cents.
    pub fn get_fee(&self, shares: i64, notional: i64) -> i64 {
        self.costs.fee(shares, notional)
    }

    /// Spread-adjusted execution price clamped into `[low, high]`.
    pub fn adjusted_price(&self, shares: i64, price: i64, high: i64, low: i64) -> i64 {
        self.costs.adjusted_price(shares, price, high, low)
    }

    /// Sum of realized P&L over all positions.
    pub fn realized_pl(&self) -> i64 {
        self.positions.values().map(Position::realized_pl).sum()
    }

    /// Sum of unrealized P&L of open lots, marked on the bars at or before `time`.
    pub fn unrealized_pl(&self, time: DateTime<Utc>) -> Result<i64> {
        let mut total = 0;
        for position in self.positions.values().filter(|p| !p.is_flat()) {
            let bar = self.assets.get(position.ticker())?.require_at_or_before(time)?;
            total += position.unrealized_pl(bar, &self.costs);
        }
        Ok(total)
    }

    /// Realized plus unrealized P&L at `time`.
    pub fn total_pl(&self, time: DateTime<Utc>) -> Result<i64> {
        Ok(self.realized_pl() + self.unrealized_pl(time)?)
    }

    /// Cash plus unrealized P&L at `time`.
    pub fn equity(&self, time: DateTime<Utc>) -> Result<i64> {
        Ok(self.wallet.cash() + self.unrealized_pl(time)?)
    }
}
