use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::algorithm::{Algorithm, SmaCrossover};
use crate::engine::*;
use crate::errors::{Error, Result};

fn day(n: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_736_985_600, 0).unwrap() + TimeDelta::days(n)
}

fn series(ticker: &str, from: i64, ohlc: &[(i64, i64, i64, i64)]) -> PriceSeries {
    let bars = ohlc
        .iter()
        .zip(from..)
        .map(|(&(o, h, l, c), i)| Bar::new(day(i), o, h, l, c).unwrap())
        .collect();
    PriceSeries::new(ticker, bars).unwrap()
}

fn get_assets() -> Arc<Assets> {
    let goog = series(
        "GOOG",
        0,
        &[
            (100, 110, 90, 105),
            (110, 120, 100, 115),
            (120, 130, 110, 125),
            (130, 140, 120, 135),
            (120, 125, 80, 90),
        ],
    );
    let qbts = series(
        "QBTS",
        0,
        &[(570, 600, 550, 590), (600, 700, 590, 690), (880, 920, 870, 900)],
    );
    let late = series("LATE", 2, &[(50, 55, 45, 50)]);
    Arc::new(Assets::from_iter([goog, qbts, late]))
}

fn frictionless() -> Broker {
    Broker::new(get_assets(), 100_000, BrokerConfig::frictionless()).unwrap()
}

fn open_lots(broker: &Broker, ticker: &str) -> Vec<Trade> {
    broker
        .get_position(ticker)
        .map(|p| p.trades().cloned().collect())
        .unwrap_or_default()
}

fn assert_shares_invariant(broker: &Broker) {
    for position in broker.positions() {
        let sum = position.trades().map(Trade::shares).sum::<i64>();
        assert_eq!(position.shares(), sum, "{}", position.ticker());
    }
}

#[test]
fn limit_round_trip_with_fees() {
    let mut broker = Broker::new(get_assets(), 10_000, BrokerConfig::default()).unwrap();

    broker.place_order(Order::limit("QBTS", 10, 560, day(0))).unwrap();
    broker.process_orders(day(0)).unwrap();
    assert_eq!(broker.shares("QBTS"), 10);
    assert_eq!(broker.cash(), 10_000, "cash only moves on close");
    assert_eq!(open_lots(&broker, "QBTS")[0].entry_price(), 560);

    broker.place_order(Order::limit("QBTS", -10, 905, day(1))).unwrap();
    broker.process_orders(day(1)).unwrap();
    assert_eq!(broker.orders().count(), 1, "905 is above the high of day 1");

    broker.process_orders(day(2)).unwrap();
    assert_eq!(broker.orders().count(), 0);
    assert_eq!(broker.cash(), 10_000 + 10 * (905 - 560) - 2);
    assert_eq!(broker.cash(), 13_448);
    assert_eq!(broker.fees_paid(), 2);
    assert_eq!(broker.realized_pl(), 3_448);
    assert!(broker.get_position("QBTS").unwrap().is_flat());

    let closed = broker.closed_trades().collect::<Vec<_>>();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit_price(), Some(905));
    assert_eq!(closed[0].exit_time(), Some(day(2)));
    assert_eq!(closed[0].pnl(), Some(3_448));
}

#[test]
fn fifo_partial_sell_reduces_oldest_lot() {
    let mut broker = frictionless();

    for (i, shares) in [10, 5, 5].into_iter().enumerate() {
        let time = day(i as i64);
        broker.place_order(Order::market("GOOG", shares, time)).unwrap();
        broker.process_orders(time).unwrap();
        assert_shares_invariant(&broker);
    }

    broker.place_order(Order::market("GOOG", -4, day(3))).unwrap();
    broker.process_orders(day(3)).unwrap();
    assert_shares_invariant(&broker);

    let lots = open_lots(&broker, "GOOG");
    assert_eq!(lots.iter().map(Trade::shares).collect::<Vec<_>>(), vec![6, 5, 5]);
    assert_eq!(lots[0].entry_price(), 100);
    assert_eq!(lots[0].entry_time(), day(0));

    let closed = broker.closed_trades().collect::<Vec<_>>();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].shares(), 4);
    assert_eq!(closed[0].entry_time(), day(0));
    assert_eq!(closed[0].pnl(), Some(4 * (130 - 100)));
    assert_eq!(broker.cash(), 100_000 + 120);
}

#[test]
fn round_trip_without_costs_nets_zero() {
    let mut broker = frictionless();
    broker.place_order(Order::market("GOOG", 10, day(1))).unwrap();
    broker.place_order(Order::market("GOOG", -10, day(1))).unwrap();
    broker.process_orders(day(1)).unwrap();

    assert_eq!(broker.realized_pl(), 0);
    assert_eq!(broker.cash(), 100_000);
    assert_eq!(broker.shares("GOOG"), 0);
}

#[test]
fn spread_is_against_the_trader_and_clamped() {
    let mut broker = Broker::new(get_assets(), 100_000, BrokerConfig::default().fees(0.0, 0.0)).unwrap();

    // ceil(100 * 1.05) = 105, inside [90, 110]
    broker.place_order(Order::market("GOOG", 10, day(0))).unwrap();
    broker.process_orders(day(0)).unwrap();
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 105);

    // floor(120 * 0.95) = 114, inside [80, 125]
    broker.place_order(Order::market("GOOG", -10, day(4))).unwrap();
    broker.process_orders(day(4)).unwrap();
    assert_eq!(broker.closed_trades().next().unwrap().exit_price(), Some(114));

    assert_eq!(broker.adjusted_price(1, 130, 132, 120), 132);
    assert_eq!(broker.adjusted_price(-1, 130, 140, 128), 128);
}

#[test]
fn stop_market_waits_for_trigger() {
    let mut broker = frictionless();
    broker.place_order(Order::stop("GOOG", 10, 115, day(0))).unwrap();

    broker.process_orders(day(0)).unwrap();
    assert_eq!(broker.orders().count(), 1, "115 is above the high of day 0");

    broker.process_orders(day(1)).unwrap();
    assert_eq!(broker.orders().count(), 0);
    // max(open 110, stop 115)
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 115);

    broker.place_order(Order::stop("GOOG", -10, 100, day(2))).unwrap();
    broker.process_orders(day(2)).unwrap();
    assert_eq!(broker.orders().count(), 1, "100 is below the low of day 2");

    broker.process_orders(day(4)).unwrap();
    // min(open 120, stop 100)
    assert_eq!(broker.closed_trades().next().unwrap().exit_price(), Some(100));
}

#[test]
fn stop_limit_defers_when_limit_sits_below_stop() {
    let mut broker = frictionless();
    broker.place_order(Order::stop_limit("GOOG", 10, 112, 115, day(1))).unwrap();

    broker.process_orders(day(1)).unwrap();
    let pending = broker.orders().next().unwrap();
    assert_eq!(pending.order_type(), OrderType::Limit, "stop triggered");
    assert!(pending.stop_price().is_none());
    assert!(broker.get_position("GOOG").is_none());

    broker.process_orders(day(2)).unwrap();
    // min(limit 112, open 120)
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 112);
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_time(), day(2));
}

#[test]
fn stop_limit_fills_same_bar_at_stop() {
    let mut broker = frictionless();
    broker.place_order(Order::stop_limit("GOOG", 10, 118, 115, day(1))).unwrap();
    broker.process_orders(day(1)).unwrap();

    assert_eq!(broker.orders().count(), 0);
    // min(limit 118, stop 115)
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 115);

    broker.place_order(Order::stop_limit("GOOG", -10, 125, 122, day(3))).unwrap();
    broker.process_orders(day(3)).unwrap();
    // stop 122 is hit (low 120) and the limit sits above it: deferred
    assert_eq!(broker.orders().count(), 1);
}

#[test]
fn stop_limit_sell_fills_at_stop() {
    let mut broker = frictionless();
    broker.place_order(Order::market("GOOG", 10, day(0))).unwrap();
    broker.process_orders(day(0)).unwrap();

    // stop 122 is hit (low 120), limit 118 below it is inside the bar
    broker.place_order(Order::stop_limit("GOOG", -10, 118, 122, day(3))).unwrap();
    broker.process_orders(day(3)).unwrap();

    assert_eq!(broker.orders().count(), 0);
    // max(limit 118, stop 122)
    let closed = broker.closed_trades().next().unwrap();
    assert_eq!(closed.exit_price(), Some(122));
    assert_eq!(closed.pnl(), Some(10 * (122 - 100)));
    assert_eq!(broker.shares("GOOG"), 0);
}

#[test]
fn limit_fills_at_open_when_better() {
    let mut broker = frictionless();
    broker.place_order(Order::limit("GOOG", -5, 100, day(2))).unwrap();
    broker.process_orders(day(2)).unwrap();
    // max(limit 100, open 120)
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 120);
}

#[test]
fn trade_on_close_uses_previous_bar() {
    let mut broker = Broker::new(get_assets(), 100_000, BrokerConfig::frictionless().trade_on_close(true)).unwrap();
    assert!(broker.trade_on_close());

    broker.place_order(Order::market("GOOG", 10, day(0))).unwrap();
    let result = broker.process_orders(day(0));
    assert!(matches!(result, Err(Error::NoPreviousBar(_, _))));
    assert_eq!(broker.orders().count(), 1);

    broker.process_orders(day(1)).unwrap();
    let lot = &open_lots(&broker, "GOOG")[0];
    assert_eq!(lot.entry_price(), 105);
    assert_eq!(lot.entry_time(), day(0));
}

#[test]
fn trade_on_close_stop_survives_missing_previous_bar() {
    let mut broker = Broker::new(get_assets(), 100_000, BrokerConfig::frictionless().trade_on_close(true)).unwrap();
    broker.place_order(Order::stop("GOOG", 10, 108, day(0))).unwrap();

    // stop hit on day 0 but there is no earlier close to trade on
    let result = broker.process_orders(day(0));
    assert!(matches!(result, Err(Error::NoPreviousBar(_, _))));
    let pending = broker.orders().next().unwrap();
    assert_eq!(pending.order_type(), OrderType::StopMarket);
    assert_eq!(pending.stop_price(), Some(108));

    broker.process_orders(day(1)).unwrap();
    // max(previous close 105, stop 108)
    let lot = &open_lots(&broker, "GOOG")[0];
    assert_eq!(lot.entry_price(), 108);
    assert_eq!(lot.entry_time(), day(0));
}

#[test]
fn trade_on_close_stop_outside_bar_is_clamped() {
    let mut broker = Broker::new(get_assets(), 100_000, BrokerConfig::frictionless().trade_on_close(true)).unwrap();
    broker.place_order(Order::market("GOOG", 10, day(1))).unwrap();
    broker.process_orders(day(1)).unwrap();
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 105);

    // min(previous close 135, stop 130) sits above the high of day 4 (125)
    broker.place_order(Order::stop("GOOG", -10, 130, day(4))).unwrap();
    broker.process_orders(day(4)).unwrap();
    let closed = broker.closed_trades().next().unwrap();
    assert_eq!(closed.exit_price(), Some(125));
    assert_eq!(closed.exit_time(), Some(day(3)));
    assert_eq!(broker.cash(), 100_000 + 10 * (125 - 105));
}

#[test]
fn stop_market_spread_is_clamped_to_high() {
    let mut broker = Broker::new(get_assets(), 100_000, BrokerConfig::default().fees(0.0, 0.0)).unwrap();
    broker.place_order(Order::stop("GOOG", 10, 138, day(3))).unwrap();
    broker.process_orders(day(3)).unwrap();
    // max(open 130, stop 138) = 138, ceil(138 * 1.05) = 145 > high 140
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 140);
}

#[test]
fn cancel_only_pending_orders() {
    let mut broker = frictionless();
    let order = Order::limit("GOOG", 10, 50, day(0));
    broker.place_order(order.clone()).unwrap();

    broker.process_orders(day(0)).unwrap();
    let cancelled = broker.cancel_order(&order).unwrap();
    assert_eq!(cancelled, order);
    assert!(matches!(broker.cancel_order(&order), Err(Error::OrderNotFound)));

    let filled = Order::market("GOOG", 10, day(0));
    broker.place_order(filled.clone()).unwrap();
    broker.process_orders(day(0)).unwrap();
    assert!(matches!(broker.cancel_order(&filled), Err(Error::OrderNotFound)));
}

#[test]
fn pending_order_ids_are_unique() {
    let mut broker = frictionless();
    let order = Order::limit("GOOG", 10, 50, day(0));
    let other = Order::limit("GOOG", -10, 200, day(0));
    broker.place_order(order.clone()).unwrap();
    broker.place_order(other.clone()).unwrap();

    let result = broker.place_order(order.clone());
    assert!(matches!(result, Err(Error::DuplicateOrder(id)) if id == order.id()));
    assert_eq!(broker.orders().count(), 2);

    assert_eq!(broker.cancel_order(&order).unwrap().shares(), 10);
    assert_eq!(broker.orders().next().unwrap().shares(), -10);

    // once settled or cancelled the id can be queued again
    broker.place_order(order).unwrap();
    assert_eq!(broker.orders().count(), 2);
}

#[test]
fn placement_validation() {
    let mut broker = frictionless();

    broker.place_order(Order::market("GOOG", 0, day(0))).unwrap();
    assert_eq!(broker.orders().count(), 0, "zero-share orders are ignored");

    let result = broker.place_order(Order::market("AAPL", 1, day(0)));
    assert!(matches!(result, Err(Error::UnknownTicker(_))));

    let result = broker.place_order(Order::limit("GOOG", 1, 0, day(0)));
    assert!(matches!(result, Err(Error::InvalidPrice(0))));
    assert_eq!(broker.orders().count(), 0);
}

#[test]
fn data_gap_keeps_orders_queued() {
    let mut broker = frictionless();
    broker.place_order(Order::market("GOOG", 1, day(0))).unwrap();
    broker.place_order(Order::market("LATE", 1, day(0))).unwrap();
    broker.place_order(Order::market("GOOG", 2, day(0))).unwrap();

    let result = broker.process_orders(day(0));
    assert!(matches!(result, Err(Error::NoBar(t, _)) if t == "LATE"));
    assert_eq!(broker.shares("GOOG"), 1);
    assert_eq!(broker.orders().count(), 2);

    broker.process_orders(day(2)).unwrap();
    assert_eq!(broker.shares("GOOG"), 3);
    assert_eq!(broker.shares("LATE"), 1);
}

#[test]
#[should_panic(expected = "before it was placed")]
fn processing_before_placement_panics() {
    let mut broker = frictionless();
    broker.place_order(Order::market("GOOG", 1, day(2))).unwrap();
    let _ = broker.process_orders(day(1));
}

#[test]
fn short_position_equity() {
    let mut broker = frictionless();
    broker.place_order(Order::market("GOOG", -10, day(3))).unwrap();
    broker.process_orders(day(3)).unwrap();

    // short from 130, marked at the close of day 4 (90)
    assert_eq!(broker.unrealized_pl(day(4)).unwrap(), 400);
    assert_eq!(broker.equity(day(4)).unwrap(), 100_400);
    assert_eq!(broker.total_pl(day(4)).unwrap(), 400);
    assert_eq!(broker.cash(), 100_000);
    assert!(matches!(broker.unrealized_pl(day(-1)), Err(Error::NoBar(_, _))));

    let mut broker = Broker::new(get_assets(), 100_000, BrokerConfig::default().fees(0.0, 0.0)).unwrap();
    broker.place_order(Order::market("GOOG", -10, day(3))).unwrap();
    broker.process_orders(day(3)).unwrap();
    // entry floor(130 * 0.95) = 123, marked as a sell: floor(90 * 0.95) = 85
    assert_eq!(open_lots(&broker, "GOOG")[0].entry_price(), 123);
    assert_eq!(broker.unrealized_pl(day(4)).unwrap(), 10 * (123 - 85));
}

/// Places market orders at fixed times.
#[derive(Debug)]
struct Script {
    ticker: &'static str,
    orders: Vec<(DateTime<Utc>, i64)>,
    floor: Option<DateTime<Utc>>,
}

impl Algorithm for Script {
    fn name(&self) -> &str {
        "Script"
    }

    fn init(&mut self, _assets: &Assets) -> Result<()> {
        Ok(())
    }

    fn next(&mut self, time: DateTime<Utc>, broker: &mut Broker) -> Result<()> {
        for &(_, shares) in self.orders.iter().filter(|(t, _)| *t == time) {
            broker.place_order(Order::market(self.ticker, shares, time))?;
        }
        Ok(())
    }

    fn warmup_floor(&self) -> Option<DateTime<Utc>> {
        self.floor
    }
}

fn script(orders: Vec<(DateTime<Utc>, i64)>) -> Box<Script> {
    Box::new(Script {
        ticker: "GOOG",
        orders,
        floor: None,
    })
}

#[test]
fn backtest_lifecycle() {
    let mut backtest = Backtest::new(script(vec![]), frictionless(), "GOOG", None, Some(day(3))).unwrap();
    assert_eq!(backtest.state(), BacktestState::NotStarted);
    assert!(matches!(backtest.equity(), Err(Error::NotCompleted)));
    assert!(matches!(backtest.start_date(), Err(Error::NotCompleted)));
    assert!(matches!(backtest.broker(), Err(Error::NotCompleted)));
    assert!(matches!(backtest.algorithm(), Err(Error::NotCompleted)));

    backtest.run().unwrap();
    assert!(backtest.completed());
    assert_eq!(backtest.start_date().unwrap(), day(0));
    assert_eq!(backtest.end_date().unwrap(), day(3));
    assert_eq!(backtest.equity().unwrap().len(), 4);
    assert_eq!(backtest.algorithm().unwrap().name(), "Script");

    assert!(matches!(backtest.run(), Err(Error::InvalidState(_))));
    assert_eq!(backtest.state(), BacktestState::Completed);
}

#[test]
fn backtest_unknown_reference() {
    let result = Backtest::new(script(vec![]), frictionless(), "AAPL", None, None);
    assert!(matches!(result, Err(Error::UnknownTicker(_))));
}

#[test]
fn backtest_snaps_start_and_end() {
    let mut algorithm = script(vec![]);
    algorithm.floor = Some(day(2));
    let start = Some(day(-30));
    let end = Some(day(3) + TimeDelta::hours(5));
    let mut backtest = Backtest::new(algorithm, frictionless(), "GOOG", start, end).unwrap();
    backtest.run().unwrap();

    // the warm-up floor wins over an earlier start
    assert_eq!(backtest.start_date().unwrap(), day(2));
    assert_eq!(backtest.end_date().unwrap(), day(3));

    let mut backtest = Backtest::new(script(vec![]), frictionless(), "GOOG", start, None).unwrap();
    backtest.run().unwrap();
    assert_eq!(backtest.start_date().unwrap(), day(0), "start before the series");
    assert_eq!(backtest.end_date().unwrap(), day(4));
}

#[test]
fn backtest_equity_curve() {
    let orders = vec![(day(0), 10), (day(2), -10), (day(3), -5)];
    let mut backtest = Backtest::new(script(orders), frictionless(), "GOOG", None, None).unwrap();
    backtest.run().unwrap();

    let equity = backtest.equity().unwrap().iter().map(|(&t, &e)| (t, e)).collect::<Vec<_>>();
    assert_eq!(
        equity,
        vec![
            (day(0), 100_000),
            // bought 10 at the open of day 1 (110), close 115
            (day(1), 100_050),
            (day(2), 100_150),
            // sold 10 at 130, nothing open
            (day(3), 100_200),
            // short 5 from 120, close 90
            (day(4), 100_350),
        ]
    );

    let broker = backtest.broker().unwrap();
    assert_eq!(broker.cash(), 100_200);
    assert_eq!(backtest.final_equity().unwrap(), broker.equity(day(4)).unwrap());
}

#[test]
fn sma_crossover_backtest_invariants() {
    let start = day(0);
    let bars = (0..120i64)
        .map(|i| {
            let close = 20_000 + ((i as f64 / 7.0).sin() * 3_000.0) as i64 + i * 10;
            Bar::new(start + TimeDelta::days(i), close, close + 150, close - 150, close).unwrap()
        })
        .collect();
    let assets = Arc::new(Assets::new().with(PriceSeries::new("GOOG", bars).unwrap()));
    let broker = Broker::new(Arc::clone(&assets), 1_000_000, BrokerConfig::default()).unwrap();
    let algorithm = SmaCrossover::new(["GOOG"], 3, 8).unwrap().allocation(50.0);

    let mut backtest = Backtest::new(Box::new(algorithm), broker, "GOOG", None, None).unwrap();
    backtest.run().unwrap();

    // warm-up: the slow SMA has its first value on the 8th bar
    assert_eq!(backtest.start_date().unwrap(), day(7));

    let broker = backtest.broker().unwrap();
    let equity = backtest.equity().unwrap();
    let times = equity.keys().collect::<Vec<_>>();
    assert!(times.windows(2).all(|w| w[0] < w[1]));

    let end = backtest.end_date().unwrap();
    assert_eq!(equity[&end], broker.cash() + broker.unrealized_pl(end).unwrap());
    assert_shares_invariant(broker);

    let fees = broker.closed_trades().filter_map(Trade::fee).sum::<i64>();
    assert_eq!(fees, broker.fees_paid());
    assert_eq!(broker.cash(), 1_000_000 + broker.realized_pl());

    let stats = backtest.statistics().unwrap();
    assert_eq!(stats.algorithm, "SmaCrossover");
    assert_eq!(stats.start, day(7));
    assert_eq!(stats.equity_final, equity[&end]);
    assert!(stats.max_drawdown_pct < 0.0);
}
