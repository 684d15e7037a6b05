//! Performance statistics for a completed backtest.
//!
//! [`generate_statistics`] turns the closed trades and the equity curve of a run
//! into a [`Statistics`] record: returns against a buy-and-hold benchmark,
//! drawdowns found in a single forward pass over the equity curve, and trade
//! statistics found in a single pass over the closed trades.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    PercentCalculus,
    engine::{Assets, Trade},
    errors::{Error, Result},
    utils::{format_duration, format_time, mean_duration},
};

/// Performance summary of one run. Percentages are in percent (`-20.0` is -20 %).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// First bar of the run, snapped on the benchmark.
    pub start: DateTime<Utc>,
    /// Last bar of the run, snapped on the benchmark.
    pub end: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    /// `end - start`.
    pub duration: TimeDelta,
    /// Change of equity from the first to the last point.
    pub return_pct: f64,
    /// Ticker used as benchmark.
    pub benchmark: String,
    /// Change of the benchmark close from start to end.
    pub buy_and_hold_pct: f64,
    /// Last equity point, in cents.
    pub equity_final: i64,
    /// Highest equity point, in cents.
    pub equity_peak: i64,
    /// Last time the equity reached its peak.
    pub equity_peak_time: DateTime<Utc>,
    /// Share of closed trades with a positive P&L.
    pub win_rate_pct: f64,
    /// Best trade return, 0 when no trade won.
    pub best_trade_pct: f64,
    /// Worst trade return, 0 when no trade lost.
    pub worst_trade_pct: f64,
    /// Mean trade return.
    pub avg_trade_pct: f64,
    /// Mean return of winning trades.
    pub avg_win_pct: Option<f64>,
    /// Mean return of losing trades.
    pub avg_loss_pct: Option<f64>,
    /// Mean time in a trade.
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub avg_trade_duration: TimeDelta,
    /// Longest time in a trade.
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub max_trade_duration: TimeDelta,
    /// Deepest decline below a running peak.
    pub max_drawdown_pct: f64,
    /// Peak time that started the deepest drawdown.
    pub max_drawdown_begin: DateTime<Utc>,
    /// Recovery time (or last point) that ended the deepest drawdown.
    pub max_drawdown_end: DateTime<Utc>,
    /// Mean trough-to-peak decline over all drawdowns.
    pub avg_drawdown_pct: f64,
    /// Mean drawdown length.
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub avg_drawdown_duration: TimeDelta,
    /// Longest drawdown length.
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub max_drawdown_duration: TimeDelta,
    /// Name of the algorithm that was run.
    pub algorithm: String,
}

#[cfg(feature = "serde")]
mod seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(delta.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        TimeDelta::try_seconds(secs).ok_or_else(|| D::Error::custom("duration out of range"))
    }
}

/// A contiguous stretch of the equity curve below its latest peak.
#[derive(Debug, Clone, Copy)]
struct Drawdown {
    begin: DateTime<Utc>,
    peak: i64,
    end: DateTime<Utc>,
    trough: i64,
}

impl Drawdown {
    fn duration(&self) -> TimeDelta {
        self.end - self.begin
    }

    fn depth_pct(&self) -> f64 {
        (self.peak as f64).change(self.trough as f64)
    }
}

/// Computes the statistics of a run.
///
/// ### Arguments
/// * `closed_trades` - Trades closed during the run; every one must be closed.
/// * `equity` - Equity curve in cents.
/// * `algorithm` - Name of the algorithm.
/// * `start`, `end` - Requested bounds, snapped on the benchmark series.
/// * `assets` - Price registry holding the benchmark.
/// * `benchmark` - Ticker used for the buy-and-hold comparison.
///
/// ### Returns
/// The statistics, or [`Error::EmptyEquity`], [`Error::NoDrawdowns`],
/// [`Error::TradeNotClosed`] or [`Error::NoClosedTrades`] when a figure cannot
/// be computed.
pub fn generate_statistics<'a>(
    closed_trades: impl IntoIterator<Item = &'a Trade>,
    equity: &BTreeMap<DateTime<Utc>, i64>,
    algorithm: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    assets: &Assets,
    benchmark: &str,
) -> Result<Statistics> {
    let series = assets.get(benchmark)?;
    let start = series.require_at_or_before(start)?;
    let end = series.require_at_or_before(end)?;
    let buy_and_hold_pct = (start.close() as f64).change(end.close() as f64);
    let (start, end) = (start.time(), end.time());

    let mut points = equity.iter().map(|(&time, &value)| (time, value));
    let (first_time, first) = points.next().ok_or(Error::EmptyEquity)?;
    let (last_time, equity_final) = equity
        .iter()
        .next_back()
        .map(|(&time, &value)| (time, value))
        .ok_or(Error::EmptyEquity)?;

    let mut peak = first;
    let mut peak_time = first_time;
    let mut max_drawdown = 0.0;
    let mut max_run = 0;
    let mut current: Option<Drawdown> = None;
    let mut runs = Vec::new();

    for (time, value) in points {
        if value >= peak {
            peak = value;
            peak_time = time;
            if let Some(mut run) = current.take() {
                run.end = time;
                runs.push(run);
            }
        } else {
            let run = current.get_or_insert(Drawdown {
                begin: peak_time,
                peak,
                end: time,
                trough: value,
            });
            run.trough = run.trough.min(value);

            let drawdown = (peak as f64).change(value as f64);
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
                max_run = runs.len();
            }
        }
    }
    if let Some(mut run) = current.take() {
        run.end = last_time;
        runs.push(run);
    }

    let deepest = runs.get(max_run).ok_or(Error::NoDrawdowns)?;
    let avg_drawdown_pct = runs.iter().map(Drawdown::depth_pct).sum::<f64>() / runs.len() as f64;
    let total_drawdown = runs.iter().map(Drawdown::duration).fold(TimeDelta::zero(), |acc, d| acc + d);
    let avg_drawdown_duration = mean_duration(total_drawdown, runs.len()).ok_or(Error::NoDrawdowns)?;
    let max_drawdown_duration = runs.iter().map(Drawdown::duration).max().ok_or(Error::NoDrawdowns)?;

    let trades = TradeSummary::collect(closed_trades)?;

    Ok(Statistics {
        start,
        end,
        duration: end - start,
        return_pct: (first as f64).change(equity_final as f64),
        benchmark: benchmark.to_owned(),
        buy_and_hold_pct,
        equity_final,
        equity_peak: peak,
        equity_peak_time: peak_time,
        win_rate_pct: trades.wins as f64 / trades.count as f64 * 100.0,
        best_trade_pct: trades.best * 100.0,
        worst_trade_pct: trades.worst * 100.0,
        avg_trade_pct: trades.total / trades.count as f64 * 100.0,
        avg_win_pct: (trades.wins > 0).then(|| trades.win_sum / trades.wins as f64 * 100.0),
        avg_loss_pct: (trades.losses > 0).then(|| trades.loss_sum / trades.losses as f64 * 100.0),
        avg_trade_duration: mean_duration(trades.duration, trades.count).ok_or(Error::NoClosedTrades)?,
        max_trade_duration: trades.max_duration,
        max_drawdown_pct: max_drawdown,
        max_drawdown_begin: deepest.begin,
        max_drawdown_end: deepest.end,
        avg_drawdown_pct,
        avg_drawdown_duration,
        max_drawdown_duration,
        algorithm: algorithm.to_owned(),
    })
}

#[derive(Default)]
struct TradeSummary {
    count: usize,
    wins: usize,
    losses: usize,
    total: f64,
    best: f64,
    worst: f64,
    win_sum: f64,
    loss_sum: f64,
    duration: TimeDelta,
    max_duration: TimeDelta,
}

impl TradeSummary {
    fn collect<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> Result<Self> {
        let mut summary = Self::default();
        for trade in trades {
            let fraction = trade.pnl_fraction().ok_or(Error::TradeNotClosed)?;
            let duration = trade.duration().ok_or(Error::TradeNotClosed)?;

            summary.count += 1;
            summary.total += fraction;
            summary.duration += duration;
            summary.max_duration = summary.max_duration.max(duration);

            if fraction > 0.0 {
                summary.wins += 1;
                summary.win_sum += fraction;
                summary.best = summary.best.max(fraction);
            } else if fraction < 0.0 {
                summary.losses += 1;
                summary.loss_sum += fraction;
                summary.worst = summary.worst.min(fraction);
            }
        }

        if summary.count == 0 {
            return Err(Error::NoClosedTrades);
        }
        Ok(summary)
    }
}

fn optional_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.6}"))
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let benchmark = format!("Buy and Hold Return % ({})", self.benchmark);
        let rows = [
            ("Start", format_time(self.start)),
            ("End", format_time(self.end)),
            ("Duration", format_duration(self.duration)),
            ("Return %", format!("{:.6}", self.return_pct)),
            (benchmark.as_str(), format!("{:.6}", self.buy_and_hold_pct)),
            ("Equity Final $", format!("{:.2}", self.equity_final as f64 / 100.0)),
            ("Equity Peak $", format!("{:.2}", self.equity_peak as f64 / 100.0)),
            ("Equity Peak Date", format_time(self.equity_peak_time)),
            ("Win Rate %", format!("{:.6}", self.win_rate_pct)),
            ("Best Trade %", format!("{:.6}", self.best_trade_pct)),
            ("Worst Trade %", format!("{:.6}", self.worst_trade_pct)),
            ("Avg Trade %", format!("{:.6}", self.avg_trade_pct)),
            ("Avg Win %", optional_pct(self.avg_win_pct)),
            ("Avg Loss %", optional_pct(self.avg_loss_pct)),
            ("Avg Trade Duration", format_duration(self.avg_trade_duration)),
            ("Max Trade Duration", format_duration(self.max_trade_duration)),
            ("Max Drawdown %", format!("{:.6}", self.max_drawdown_pct)),
            ("Max Drawdown Begin", format_time(self.max_drawdown_begin)),
            ("Max Drawdown End", format_time(self.max_drawdown_end)),
            ("Avg Drawdown %", format!("{:.6}", self.avg_drawdown_pct)),
            ("Avg Drawdown Duration", format_duration(self.avg_drawdown_duration)),
            ("Max Drawdown Duration", format_duration(self.max_drawdown_duration)),
            ("Algorithm", self.algorithm.clone()),
        ];

        for (label, value) in rows {
            writeln!(f, "{label:<32}{value:>28}")?;
        }
        Ok(())
    }
}
