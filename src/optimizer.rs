//! Strategy parameter optimization.
//!
//! The `Optimizer` runs one complete backtest per parameter combination, in
//! parallel. Every run gets its own [`Broker`] and [`Backtest`]; only the
//! read-only price registry is shared. The `ParameterCombination` trait defines
//! which parameter sets are tried.

use std::{marker::PhantomData, sync::Arc};

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::{
    algorithm::Algorithm,
    engine::{Assets, Backtest, Broker, BrokerConfig},
    errors::Result,
};

/// Trait defining how to generate parameter combinations for optimization.
///
/// The associated type `Output` represents a single parameter combination (e.g., a tuple of periods).
pub trait ParameterCombination: Sync {
    /// Type representing a single parameter combination (e.g., `(usize, usize)`).
    type Output: Clone + Send + Sync;

    /// Generates all possible parameter combinations to test.
    fn generate() -> Vec<Self::Output>;
}

/// Runs a backtest for every parameter combination of `PC`.
pub struct Optimizer<PC: ParameterCombination> {
    assets: Arc<Assets>,
    initial_cash: i64,
    config: BrokerConfig,
    reference: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    _marker: PhantomData<PC>,
}

impl<PC: ParameterCombination> Optimizer<PC> {
    /// Creates a new `Optimizer`.
    ///
    /// # Arguments
    /// * `assets` - Price registry shared by every run.
    /// * `initial_cash` - Starting cash of each broker, in cents.
    /// * `config` - Broker configuration of each run.
    /// * `reference` - Ticker whose bars drive each backtest.
    pub fn new(assets: Arc<Assets>, initial_cash: i64, config: BrokerConfig, reference: impl Into<String>) -> Self {
        Self {
            assets,
            initial_cash,
            config,
            reference: reference.into(),
            start: None,
            end: None,
            _marker: PhantomData,
        }
    }

    /// Restricts every run to `[start, end]`.
    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    fn evaluate<F>(&self, factory: &F, parameters: &PC::Output) -> Result<i64>
    where
        F: Fn(&PC::Output) -> Result<Box<dyn Algorithm>>,
    {
        let broker = Broker::new(Arc::clone(&self.assets), self.initial_cash, self.config.clone())?;
        let mut backtest = Backtest::new(factory(parameters)?, broker, &self.reference, self.start, self.end)?;
        backtest.run()?;
        backtest.final_equity()
    }

    /// Backtests every parameter combination.
    ///
    /// # Arguments
    /// * `factory` - Builds the algorithm for one parameter combination.
    ///
    /// # Returns
    /// Each parameter combination with the final equity of its run, in cents.
    ///
    /// # Errors
    /// Returns the first error raised while building or running a backtest.
    pub fn with<F>(&self, factory: F) -> Result<Vec<(PC::Output, i64)>>
    where
        F: Fn(&PC::Output) -> Result<Box<dyn Algorithm>> + Sync,
    {
        let num_cpus = num_cpus::get();
        let combinations = PC::generate();
        let chunk_size = combinations.len().div_ceil(num_cpus).max(1);
        tracing::info!(combinations = combinations.len(), chunk_size, "Optimizing");

        combinations
            .par_chunks(chunk_size)
            .map::<_, Result<_>>(|par_combinations| {
                let mut local_results = Vec::with_capacity(par_combinations.len());
                for param_set in par_combinations {
                    let equity = self.evaluate(&factory, param_set)?;
                    local_results.push((param_set.clone(), equity));
                }
                Ok(local_results)
            })
            .collect::<Result<Vec<_>>>()
            .map(|chunks| chunks.into_iter().flatten().collect())
    }
}

#[cfg(test)]
#[derive(Clone)]
struct Parameters;

#[cfg(test)]
impl ParameterCombination for Parameters {
    type Output = (usize, usize);

    fn generate() -> Vec<Self::Output> {
        (2..=4).flat_map(|fast| (5..=7).map(move |slow| (fast, slow))).collect()
    }
}

#[cfg(test)]
fn get_assets() -> Arc<Assets> {
    use crate::engine::{Bar, PriceSeries};
    use chrono::TimeDelta;

    let start = DateTime::from_timestamp(1_735_862_400, 0).unwrap();
    let bars = (0..60i64)
        .map(|i| {
            // slow oscillation so both crosses happen several times
            let close = 10_000 + ((i as f64 / 6.0).sin() * 1_500.0) as i64;
            Bar::from((start + TimeDelta::days(i), close, close + 120, close - 120, close))
        })
        .collect();
    Arc::new(Assets::new().with(PriceSeries::new("GOOG", bars).unwrap()))
}

#[cfg(test)]
#[test]
fn optimizer_with_sma_crossover() {
    use crate::algorithm::SmaCrossover;

    let assets = get_assets();
    let opt = Optimizer::<Parameters>::new(Arc::clone(&assets), 1_000_000, BrokerConfig::frictionless(), "GOOG");
    let result = opt
        .with(|&(fast, slow)| Ok(Box::new(SmaCrossover::new(["GOOG"], fast, slow)?) as Box<dyn Algorithm>))
        .unwrap();

    assert_eq!(result.len(), 9, "one result per combination");
    assert!(result.iter().all(|(_, equity)| *equity > 0));

    // a run in the sweep is the same as a run on its own
    let (params, equity) = result[0];
    let broker = Broker::new(assets, 1_000_000, BrokerConfig::frictionless()).unwrap();
    let algorithm = Box::new(SmaCrossover::new(["GOOG"], params.0, params.1).unwrap());
    let mut backtest = Backtest::new(algorithm, broker, "GOOG", None, None).unwrap();
    backtest.run().unwrap();
    assert_eq!(backtest.final_equity().unwrap(), equity);
}

#[cfg(test)]
#[test]
fn optimizer_propagates_errors() {
    use crate::algorithm::SmaCrossover;
    use crate::errors::Error;

    let opt = Optimizer::<Parameters>::new(get_assets(), 1_000_000, BrokerConfig::default(), "GOOG");
    let result = opt.with(|&(fast, slow)| Ok(Box::new(SmaCrossover::new(["AAPL"], fast, slow)?) as Box<dyn Algorithm>));
    assert!(matches!(result, Err(Error::UnknownTicker(_))));
}
