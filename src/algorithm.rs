//! Trading algorithms and the indicators they read.
//!
//! An [`Algorithm`] is driven bar by bar by a [`Backtest`](crate::engine::Backtest):
//! it is initialised once with the price registry, then called at every
//! reference bar with the broker it trades through. Indicators are computed
//! ahead of the run into an [`IndicatorSeries`]; bars without enough history
//! simply have no value.

use std::{
    collections::{BTreeMap, btree_map::Iter},
    fmt,
};

use chrono::{DateTime, Utc};

use crate::{
    PercentCalculus,
    engine::{Assets, Bar, Broker, Order, PriceSeries},
    errors::{Error, Result},
};

/// A trading strategy.
pub trait Algorithm: fmt::Debug {
    /// Name used in logs and statistics.
    fn name(&self) -> &str;

    /// Prepares the algorithm before the first bar (indicators, lookups).
    fn init(&mut self, assets: &Assets) -> Result<()>;

    /// Reacts to the bar at `time`, placing or cancelling orders on `broker`.
    fn next(&mut self, time: DateTime<Utc>, broker: &mut Broker) -> Result<()>;

    /// Earliest time at which the algorithm has everything it needs.
    /// Only meaningful after [`init`](Algorithm::init).
    fn warmup_floor(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// A value derived from the bars of one price series.
pub trait Indicator: fmt::Debug {
    /// Display name, e.g. `SMA(20)`.
    fn name(&self) -> String;

    /// Value at `bars[index]`, or `None` while there is not enough history.
    fn compute(&self, bars: &[Bar], index: usize) -> Option<f64>;
}

/// Values of an indicator over a whole price series, warm-up bars omitted.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    name: String,
    ticker: String,
    values: BTreeMap<DateTime<Utc>, f64>,
}

impl IndicatorSeries {
    /// Evaluates `indicator` at every bar of `series`.
    pub fn compute(indicator: &dyn Indicator, series: &PriceSeries) -> Self {
        let bars = series.bars();
        let values = (0..bars.len())
            .filter_map(|i| indicator.compute(bars, i).map(|value| (bars[i].time(), value)))
            .collect::<BTreeMap<_, _>>();

        tracing::info!(
            indicator = %indicator.name(),
            ticker = series.ticker(),
            values = values.len(),
            warmup = bars.len() - values.len(),
            "Indicator computed"
        );
        Self {
            name: indicator.name(),
            ticker: series.ticker().to_owned(),
            values,
        }
    }

    /// Indicator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticker the values were computed on.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// First time with a value.
    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.values.keys().next().copied()
    }

    /// Value at exactly `time`.
    pub fn value_at(&self, time: DateTime<Utc>) -> Option<f64> {
        self.values.get(&time).copied()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no bar had enough history.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(time, value)` pairs in time order.
    pub fn iter(&self) -> Iter<'_, DateTime<Utc>, f64> {
        self.values.iter()
    }
}

/// Simple moving average of the close, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sma {
    period: usize,
}

impl Sma {
    /// Creates an SMA over `period` bars. A zero period is rejected.
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(Error::InvalidPeriod("SMA period must be positive".into()));
        }
        Ok(Self { period })
    }

    /// Window length in bars.
    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn compute(&self, bars: &[Bar], index: usize) -> Option<f64> {
        let start = (index + 1).checked_sub(self.period)?;
        let window = bars.get(start..=index)?;
        let sum = window.iter().map(|bar| bar.close()).sum::<i64>();
        Some(sum as f64 / self.period as f64)
    }
}

#[derive(Debug, Clone)]
struct Crossover {
    fast: IndicatorSeries,
    slow: IndicatorSeries,
}

/// Goes long when the fast SMA crosses above the slow SMA and short when it
/// crosses below, flattening the previous position first.
///
/// Each ticker is traded independently; the size of a new position is a
/// percentage of the cash at the time of the cross.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    name: String,
    tickers: Vec<String>,
    fast: Sma,
    slow: Sma,
    allocation: f64,
    signals: BTreeMap<String, Crossover>,
}

impl SmaCrossover {
    /// Creates a crossover over `tickers` with `fast` and `slow` periods.
    ///
    /// ### Returns
    /// The algorithm, or [`Error::InvalidPeriod`] if a period is zero or the
    /// fast period is not shorter than the slow one.
    pub fn new<T: Into<String>>(tickers: impl IntoIterator<Item = T>, fast: usize, slow: usize) -> Result<Self> {
        if fast >= slow {
            return Err(Error::InvalidPeriod(format!(
                "fast period ({fast}) must be shorter than slow period ({slow})"
            )));
        }
        Ok(Self {
            name: "SmaCrossover".to_owned(),
            tickers: tickers.into_iter().map(Into::into).collect(),
            fast: Sma::new(fast)?,
            slow: Sma::new(slow)?,
            allocation: 100.0,
            signals: BTreeMap::new(),
        })
    }

    /// Percentage of cash committed to each new position (default 100).
    pub fn allocation(mut self, percent: f64) -> Self {
        self.allocation = percent;
        self
    }

    /// Overrides the name reported in logs and statistics.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Traded tickers.
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Indicator values of `ticker`, available after `init`.
    pub fn indicators(&self, ticker: &str) -> Option<(&IndicatorSeries, &IndicatorSeries)> {
        self.signals.get(ticker).map(|c| (&c.fast, &c.slow))
    }

    fn trade(&self, ticker: &str, long: bool, time: DateTime<Utc>, broker: &mut Broker) -> Result<()> {
        let close = broker.assets().get(ticker)?.close_at_or_before(time)?;
        // a negative balance sizes nothing rather than a reversed order
        let budget = (broker.cash().max(0) as f64).how_many(self.allocation);
        let shares = ((budget / close as f64).floor() as i64).max(0);
        let held = broker.shares(ticker);

        tracing::info!(ticker, long, held, shares, close, %time, "Crossover");
        broker.place_order(Order::market(ticker, -held, time))?;
        broker.place_order(Order::market(ticker, if long { shares } else { -shares }, time))
    }
}

impl Algorithm for SmaCrossover {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, assets: &Assets) -> Result<()> {
        self.signals.clear();
        for ticker in &self.tickers {
            let series = assets.get(ticker)?;
            let crossover = Crossover {
                fast: IndicatorSeries::compute(&self.fast, series),
                slow: IndicatorSeries::compute(&self.slow, series),
            };
            self.signals.insert(ticker.clone(), crossover);
        }
        Ok(())
    }

    fn next(&mut self, time: DateTime<Utc>, broker: &mut Broker) -> Result<()> {
        let mut crosses = Vec::new();
        for (ticker, signal) in &self.signals {
            let Some(prev) = broker.assets().get(ticker)?.bar_before(time).map(Bar::time) else {
                continue;
            };
            let values = (
                signal.fast.value_at(time),
                signal.slow.value_at(time),
                signal.fast.value_at(prev),
                signal.slow.value_at(prev),
            );
            let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow)) = values else {
                tracing::trace!(ticker = ticker.as_str(), %time, "Not enough history");
                continue;
            };

            if fast > slow && prev_fast <= prev_slow {
                crosses.push((ticker.clone(), true));
            } else if fast < slow && prev_fast >= prev_slow {
                crosses.push((ticker.clone(), false));
            }
        }

        for (ticker, long) in crosses {
            self.trade(&ticker, long, time, broker)?;
        }
        Ok(())
    }

    fn warmup_floor(&self) -> Option<DateTime<Utc>> {
        self.signals.values().filter_map(|c| c.slow.first_time()).max()
    }
}

/// Builds a fresh algorithm instance.
pub type AlgorithmFactory = Box<dyn Fn() -> Result<Box<dyn Algorithm>> + Send + Sync>;

/// Named algorithm factories, owned by the caller.
#[derive(Default)]
pub struct AlgorithmRegistry {
    factories: BTreeMap<String, AlgorithmFactory>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Algorithm>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(%name, "Registering algorithm");
        self.factories.insert(name, Box::new(factory));
        self
    }

    /// Builds a new instance of the algorithm registered under `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Algorithm>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_owned()))?;
        factory()
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
