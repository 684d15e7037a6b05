use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::engine::Bar;
use crate::errors::{Error, Result};

/// Ordered, unique-timestamp bars of one ticker.
///
/// Lookups are binary searches over the sorted bars, so "at or before" and
/// "strictly before" are O(log n).
#[derive(Debug, Clone)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Creates a series from bars in any order.
    ///
    /// ### Returns
    /// The series, or an error if `bars` is empty, holds an invalid bar or
    /// two bars with the same timestamp.
    pub fn new(ticker: impl Into<String>, mut bars: Vec<Bar>) -> Result<Self> {
        let ticker = ticker.into();
        if bars.is_empty() {
            return Err(Error::BarDataEmpty);
        }
        if let Some(bar) = bars.iter().find(|b| !b.is_valid()) {
            return Err(Error::InvalidBar(bar.time()));
        }
        bars.sort_by_key(|b| b.time());
        if let Some(pair) = bars.windows(2).find(|w| w[0].time() == w[1].time()) {
            return Err(Error::DuplicateBar(ticker, pair[1].time()));
        }
        Ok(Self { ticker, bars })
    }

    /// Ticker symbol of the series.
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// All bars, oldest first.
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Index of the last bar at or before `time`.
    pub fn index_at_or_before(&self, time: DateTime<Utc>) -> Option<usize> {
        self.bars.partition_point(|b| b.time() <= time).checked_sub(1)
    }

    /// Last bar at or before `time`.
    pub fn bar_at_or_before(&self, time: DateTime<Utc>) -> Option<&Bar> {
        self.index_at_or_before(time).map(|i| &self.bars[i])
    }

    /// Last bar strictly before `time`.
    pub fn bar_before(&self, time: DateTime<Utc>) -> Option<&Bar> {
        let i = self.bars.partition_point(|b| b.time() < time).checked_sub(1)?;
        self.bars.get(i)
    }

    /// Same as [`Self::bar_at_or_before`], with the gap reported as an error.
    pub fn require_at_or_before(&self, time: DateTime<Utc>) -> Result<&Bar> {
        self.bar_at_or_before(time)
            .ok_or_else(|| Error::NoBar(self.ticker.clone(), time))
    }

    /// Same as [`Self::bar_before`], with the gap reported as an error.
    pub fn require_before(&self, time: DateTime<Utc>) -> Result<&Bar> {
        self.bar_before(time)
            .ok_or_else(|| Error::NoPreviousBar(self.ticker.clone(), time))
    }

    /// Time of the first bar strictly after `time`.
    pub fn next_time_after(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let i = self.bars.partition_point(|b| b.time() <= time);
        self.bars.get(i).map(|b| b.time())
    }

    /// Time of the oldest bar.
    pub fn first_time(&self) -> DateTime<Utc> {
        self.bars[0].time()
    }

    /// Time of the newest bar.
    pub fn latest_time(&self) -> DateTime<Utc> {
        self.bars[self.bars.len() - 1].time()
    }

    /// Close of the newest bar.
    pub fn latest_close(&self) -> i64 {
        self.bars[self.bars.len() - 1].close()
    }

    /// Close of the last bar at or before `time`.
    pub fn close_at_or_before(&self, time: DateTime<Utc>) -> Result<i64> {
        self.require_at_or_before(time).map(|b| b.close())
    }
}

/// Price series keyed by ticker.
///
/// The registry is built by the caller and handed to brokers behind an
/// `Arc`; nothing in the crate keeps process-wide price state.
#[derive(Debug, Clone, Default)]
pub struct Assets {
    series: HashMap<String, PriceSeries>,
}

impl Assets {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a series, returning the previous one.
    pub fn insert(&mut self, series: PriceSeries) -> Option<PriceSeries> {
        self.series.insert(series.ticker().to_owned(), series)
    }

    /// Builder-style [`Self::insert`].
    pub fn with(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }

    /// Returns the series of `ticker`.
    pub fn get(&self, ticker: &str) -> Result<&PriceSeries> {
        self.series
            .get(ticker)
            .ok_or_else(|| Error::UnknownTicker(ticker.to_owned()))
    }

    /// Whether a series is registered for `ticker`.
    pub fn contains(&self, ticker: &str) -> bool {
        self.series.contains_key(ticker)
    }

    /// Registered tickers, in no particular order.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl FromIterator<PriceSeries> for Assets {
    fn from_iter<T: IntoIterator<Item = PriceSeries>>(iter: T) -> Self {
        let mut assets = Self::new();
        for series in iter {
            assets.insert(series);
        }
        assets
    }
}
