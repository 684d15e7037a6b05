use chrono::{DateTime, Utc};

use crate::errors::{Error, Result};
use crate::utils::random_id;

/// How an order is executed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    /// Fills at the next available price.
    Market,
    /// Fills only at the limit price or better.
    Limit,
    /// Becomes a market order once the stop price trades.
    StopMarket,
    /// Becomes a limit order once the stop price trades.
    StopLimit,
}

impl OrderType {
    /// Infers the type from which prices are set.
    pub fn infer(limit: Option<i64>, stop: Option<i64>) -> Self {
        match (limit, stop) {
            (Some(_), Some(_)) => Self::StopLimit,
            (Some(_), None) => Self::Limit,
            (None, Some(_)) => Self::StopMarket,
            (None, None) => Self::Market,
        }
    }
}

/// An intent to change a position by a signed number of shares.
///
/// Positive shares buy, negative shares sell. The type and stop price are the
/// only fields the broker mutates: once a stop triggers, the stop is cleared and
/// the order degrades to [`OrderType::Market`] or [`OrderType::Limit`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Order {
    id: u32,
    ticker: String,
    shares: i64,
    order_type: OrderType,
    limit: Option<i64>,
    stop: Option<i64>,
    placed: DateTime<Utc>,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

type O1<'a> = (&'a str, i64, DateTime<Utc>);
impl From<O1<'_>> for Order {
    fn from((ticker, shares, placed): O1<'_>) -> Self {
        Self::market(ticker, shares, placed)
    }
}

impl Order {
    /// Creates a market order.
    pub fn market(ticker: impl Into<String>, shares: i64, placed: DateTime<Utc>) -> Self {
        Self {
            id: random_id(),
            ticker: ticker.into(),
            shares,
            order_type: OrderType::Market,
            limit: None,
            stop: None,
            placed,
        }
    }

    /// Creates a limit order.
    pub fn limit(ticker: impl Into<String>, shares: i64, limit: i64, placed: DateTime<Utc>) -> Self {
        Self::market(ticker, shares, placed).with_limit(limit)
    }

    /// Creates a stop-market order.
    pub fn stop(ticker: impl Into<String>, shares: i64, stop: i64, placed: DateTime<Utc>) -> Self {
        Self::market(ticker, shares, placed).with_stop(stop)
    }

    /// Creates a stop-limit order.
    pub fn stop_limit(
        ticker: impl Into<String>,
        shares: i64,
        limit: i64,
        stop: i64,
        placed: DateTime<Utc>,
    ) -> Self {
        Self::market(ticker, shares, placed).with_limit(limit).with_stop(stop)
    }

    /// Sets the limit price and re-infers the type.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self.order_type = OrderType::infer(self.limit, self.stop);
        self
    }

    /// Sets the stop price and re-infers the type.
    pub fn with_stop(mut self, stop: i64) -> Self {
        self.stop = Some(stop);
        self.order_type = OrderType::infer(self.limit, self.stop);
        self
    }

    /// Forces an explicit type.
    ///
    /// ### Returns
    /// The order, or [`Error::MismatchedOrderType`] if a limit type lacks a
    /// limit price or a stop type lacks a stop price.
    pub fn with_type(mut self, order_type: OrderType) -> Result<Self> {
        let needs_limit = matches!(order_type, OrderType::Limit | OrderType::StopLimit);
        let needs_stop = matches!(order_type, OrderType::StopMarket | OrderType::StopLimit);
        if (needs_limit && self.limit.is_none()) || (needs_stop && self.stop.is_none()) {
            return Err(Error::MismatchedOrderType);
        }
        self.order_type = order_type;
        Ok(self)
    }

    /// Checks the prices an order carries before it is queued.
    pub(crate) fn validate(&self) -> Result<()> {
        for price in [self.limit, self.stop].into_iter().flatten() {
            if price <= 0 {
                return Err(Error::InvalidPrice(price));
            }
        }
        if (self.is_limit() && self.limit.is_none()) || (self.is_stop() && self.stop.is_none()) {
            return Err(Error::MismatchedOrderType);
        }
        Ok(())
    }

    /// Clears the stop once it has traded and degrades the order type.
    pub(crate) fn trigger_stop(&mut self) {
        self.stop = None;
        self.order_type = if self.is_limit() {
            OrderType::Limit
        } else {
            OrderType::Market
        };
    }

    /// Returns the order id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the ticker.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Returns the signed share count.
    pub fn shares(&self) -> i64 {
        self.shares
    }

    /// Returns the order type.
    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Returns the limit price, if any.
    pub fn limit_price(&self) -> Option<i64> {
        self.limit
    }

    /// Returns the stop price, if any.
    pub fn stop_price(&self) -> Option<i64> {
        self.stop
    }

    /// Returns the time the order was placed.
    pub fn placed(&self) -> DateTime<Utc> {
        self.placed
    }

    /// Whether the order still waits for its stop.
    pub fn is_stop(&self) -> bool {
        matches!(self.order_type, OrderType::StopMarket | OrderType::StopLimit)
    }

    /// Whether the order fills only at its limit or better.
    pub fn is_limit(&self) -> bool {
        matches!(self.order_type, OrderType::Limit | OrderType::StopLimit)
    }

    /// Whether the order fills at the market once active.
    pub fn is_market(&self) -> bool {
        matches!(self.order_type, OrderType::Market | OrderType::StopMarket)
    }

    /// Whether the order buys.
    pub fn is_long(&self) -> bool {
        self.shares > 0
    }

    /// Whether the order sells.
    pub fn is_short(&self) -> bool {
        self.shares < 0
    }
}

#[cfg(test)]
fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_736_985_600, 0).unwrap()
}

#[cfg(test)]
#[test]
fn infer_order_types() {
    assert_eq!(Order::market("GOOG", 10, now()).order_type(), OrderType::Market);
    assert_eq!(Order::limit("GOOG", 10, 560, now()).order_type(), OrderType::Limit);
    assert_eq!(Order::stop("GOOG", 10, 600, now()).order_type(), OrderType::StopMarket);
    assert_eq!(
        Order::stop_limit("GOOG", 10, 560, 600, now()).order_type(),
        OrderType::StopLimit
    );
}

#[cfg(test)]
#[test]
fn create_simple_order() {
    let order: Order = ("GOOG", -5, now()).into();

    assert_eq!(order.ticker(), "GOOG");
    assert_eq!(order.shares(), -5);
    assert_eq!(order.placed(), now());
    assert!(order.is_short());
    assert!(order.is_market());
    assert!(!order.is_limit());
    assert!(!order.is_stop());
    assert!(order.limit_price().is_none());
    assert!(order.stop_price().is_none());
}

#[cfg(test)]
#[test]
fn order_equality() {
    let order1 = Order::market("GOOG", 1, now());
    let order2 = Order::market("GOOG", 1, now());
    assert_ne!(order1, order2);
    assert_eq!(order1, order1.clone());
}

#[cfg(test)]
#[test]
fn explicit_type_must_match_prices() {
    let order = Order::market("GOOG", 1, now()).with_type(OrderType::Limit);
    assert!(matches!(order, Err(Error::MismatchedOrderType)));

    let order = Order::limit("GOOG", 1, 100, now()).with_type(OrderType::StopLimit);
    assert!(matches!(order, Err(Error::MismatchedOrderType)));

    // a limit order may be forced to execute as a market order
    let order = Order::limit("GOOG", 1, 100, now()).with_type(OrderType::Market).unwrap();
    assert!(order.is_market());
    assert_eq!(order.limit_price(), Some(100));
}

#[cfg(test)]
#[test]
fn validate_prices() {
    assert!(Order::limit("GOOG", 1, 100, now()).validate().is_ok());
    assert!(matches!(
        Order::limit("GOOG", 1, 0, now()).validate(),
        Err(Error::InvalidPrice(0))
    ));
    assert!(matches!(
        Order::stop("GOOG", 1, -5, now()).validate(),
        Err(Error::InvalidPrice(-5))
    ));
}

#[cfg(test)]
#[test]
fn trigger_stop_degrades_type() {
    let mut order = Order::stop("GOOG", 1, 600, now());
    order.trigger_stop();
    assert_eq!(order.order_type(), OrderType::Market);
    assert!(order.stop_price().is_none());

    let mut order = Order::stop_limit("GOOG", -1, 550, 560, now());
    order.trigger_stop();
    assert_eq!(order.order_type(), OrderType::Limit);
    assert_eq!(order.limit_price(), Some(550));
    assert!(order.stop_price().is_none());
}
