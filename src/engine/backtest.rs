use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
    algorithm::Algorithm,
    engine::*,
    errors::{Error, Result},
    statistics::{Statistics, generate_statistics},
};

/// Lifecycle of a [`Backtest`]. Transitions only move forward.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestState {
    /// Constructed, `run` not called yet.
    NotStarted,
    /// `run` is in progress, or failed part way.
    Running,
    /// `run` finished; results are readable.
    Completed,
}

/// Replays the bars of a reference ticker through an algorithm and a broker.
///
/// At every reference bar the broker settles pending orders, the algorithm
/// reacts, and the broker's equity is recorded.
#[derive(Debug)]
pub struct Backtest {
    algorithm: Box<dyn Algorithm>,
    broker: Broker,
    reference: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    state: BacktestState,
    equity: BTreeMap<DateTime<Utc>, i64>,
}

impl Backtest {
    /// Creates a new backtest.
    ///
    /// ### Arguments
    /// * `algorithm` - Strategy driven at each bar.
    /// * `broker` - Fresh broker owning cash, positions and orders.
    /// * `reference` - Ticker whose bars set the clock.
    /// * `start` - Requested first bar; defaults to the first bar of the reference series.
    /// * `end` - Requested last bar; defaults to now.
    ///
    /// ### Returns
    /// The backtest, or [`Error::UnknownTicker`] if the reference is not in the broker's assets.
    pub fn new(
        algorithm: Box<dyn Algorithm>,
        broker: Broker,
        reference: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let reference = reference.into();
        broker.assets().get(&reference)?;
        tracing::debug!(algorithm = algorithm.name(), %reference, ?start, ?end, "Creating backtest");
        Ok(Self {
            algorithm,
            broker,
            reference,
            start,
            end,
            state: BacktestState::NotStarted,
            equity: BTreeMap::new(),
        })
    }

    /// Runs the backtest to completion.
    ///
    /// ### Returns
    /// Ok on completion, [`Error::InvalidState`] if the backtest was already
    /// started, or the first error raised by the broker or the algorithm.
    pub fn run(&mut self) -> Result<()> {
        if self.state != BacktestState::NotStarted {
            return Err(Error::InvalidState(format!("cannot run a backtest in state {:?}", self.state)));
        }
        self.state = BacktestState::Running;

        let assets = self.broker.assets_handle();
        self.algorithm.init(&assets)?;

        let reference = assets.get(&self.reference)?;
        let requested = match (self.start, self.algorithm.warmup_floor()) {
            (Some(start), Some(floor)) => Some(start.max(floor)),
            (start, floor) => start.or(floor),
        };
        let start = requested
            .and_then(|time| reference.bar_at_or_before(time))
            .map_or(reference.first_time(), Bar::time);
        let end = reference
            .require_at_or_before(self.end.unwrap_or_else(Utc::now))?
            .time();
        self.start = Some(start);
        self.end = Some(end);

        tracing::info!(algorithm = self.algorithm.name(), %start, %end, "Running backtest");

        let span = (end - start).num_seconds().max(1) as f64;
        let mut last_percent = 0.0;
        let mut next = Some(start);

        while let Some(time) = next.filter(|time| *time <= end) {
            self.broker.process_orders(time)?;
            self.algorithm.next(time, &mut self.broker)?;
            let equity = self.broker.equity(time)?;
            self.equity.insert(time, equity);

            let percent = (time - start).num_seconds() as f64 / span * 100.0;
            if percent >= last_percent + 10.0 {
                last_percent = percent;
                tracing::debug!(percent = percent.round() as u32, equity, "Backtest progress");
            }
            next = reference.next_time_after(time);
        }

        self.state = BacktestState::Completed;
        tracing::info!(
            algorithm = self.algorithm.name(),
            bars = self.equity.len(),
            cash = self.broker.cash(),
            "Backtest completed"
        );
        Ok(())
    }

    fn ensure_completed(&self) -> Result<()> {
        match self.state {
            BacktestState::Completed => Ok(()),
            _ => Err(Error::NotCompleted),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> BacktestState {
        self.state
    }

    /// Whether `run` has finished.
    pub fn completed(&self) -> bool {
        self.state == BacktestState::Completed
    }

    /// Returns the reference ticker.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// First replayed bar time.
    pub fn start_date(&self) -> Result<DateTime<Utc>> {
        self.ensure_completed()?;
        self.start.ok_or(Error::NotCompleted)
    }

    /// Last bar time the replay was allowed to reach.
    pub fn end_date(&self) -> Result<DateTime<Utc>> {
        self.ensure_completed()?;
        self.end.ok_or(Error::NotCompleted)
    }

    /// Equity curve in cents, one point per replayed bar.
    pub fn equity(&self) -> Result<&BTreeMap<DateTime<Utc>, i64>> {
        self.ensure_completed()?;
        Ok(&self.equity)
    }

    /// Last point of the equity curve.
    pub fn final_equity(&self) -> Result<i64> {
        self.equity()?.values().next_back().copied().ok_or(Error::EmptyEquity)
    }

    /// Returns the algorithm that was run.
    pub fn algorithm(&self) -> Result<&dyn Algorithm> {
        self.ensure_completed()?;
        Ok(self.algorithm.as_ref())
    }

    /// Returns the broker in its final state.
    pub fn broker(&self) -> Result<&Broker> {
        self.ensure_completed()?;
        Ok(&self.broker)
    }

    /// Computes the performance statistics, using the reference ticker as benchmark.
    pub fn statistics(&self) -> Result<Statistics> {
        generate_statistics(
            self.broker()?.closed_trades(),
            self.equity()?,
            self.algorithm.name(),
            self.start_date()?,
            self.end_date()?,
            self.broker.assets(),
            &self.reference,
        )
    }
}
