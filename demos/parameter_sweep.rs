mod utils;

use std::sync::Arc;

use ledger_bt::prelude::*;

struct Periods;

impl ParameterCombination for Periods {
    type Output = (usize, usize);

    fn generate() -> Vec<Self::Output> {
        (5..=15)
            .flat_map(|fast| (20..=40).step_by(5).map(move |slow| (fast, slow)))
            .collect()
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    utils::init_logging("warn");

    let assets = Arc::new(Assets::new().with(utils::generate_sample_series("GOOG", 1_500, 5, 10_000)));
    let optimizer = Optimizer::<Periods>::new(assets, 1_000_000, BrokerConfig::default(), "GOOG");

    let mut results = optimizer.with(|&(fast, slow)| {
        Ok(Box::new(SmaCrossover::new(["GOOG"], fast, slow)?) as Box<dyn Algorithm>)
    })?;
    results.sort_by_key(|&(_, equity)| std::cmp::Reverse(equity));

    println!("{:>6} {:>6} {:>14}", "fast", "slow", "equity $");
    for ((fast, slow), equity) in results.iter().take(10) {
        println!("{fast:>6} {slow:>6} {:>14.2}", *equity as f64 / 100.0);
    }

    Ok(())
}
