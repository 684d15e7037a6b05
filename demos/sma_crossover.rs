mod utils;

use std::sync::Arc;

use ledger_bt::prelude::*;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    utils::init_logging("info");

    let assets = Arc::new(
        Assets::new()
            .with(utils::generate_sample_series("GOOG", 2_000, 3, 10_000))
            .with(utils::generate_sample_series("AAPL", 2_000, 11, 4_000)),
    );

    let mut registry = AlgorithmRegistry::new();
    registry.register("SmaCrossover", || {
        Ok(Box::new(SmaCrossover::new(["GOOG"], 10, 20)?) as Box<dyn Algorithm>)
    });
    registry.register("MultiSmaCrossover", || {
        let algorithm = SmaCrossover::new(["GOOG", "AAPL"], 10, 20)?
            .allocation(50.0)
            .named("MultiSmaCrossover");
        Ok(Box::new(algorithm) as Box<dyn Algorithm>)
    });

    let config = BrokerConfig::default().spread(0.0);
    for name in ["SmaCrossover", "MultiSmaCrossover"] {
        let broker = Broker::new(Arc::clone(&assets), 1_000_000, config.clone())?;
        let mut backtest = Backtest::new(registry.create(name)?, broker, "GOOG", None, None)?;
        backtest.run()?;

        let broker = backtest.broker()?;
        println!("=== {name} ===");
        println!("Closed trades: {}", broker.closed_trades().count());
        println!("Fees paid: {:.2}", broker.fees_paid() as f64 / 100.0);
        println!("{}", backtest.statistics()?);
    }

    Ok(())
}
