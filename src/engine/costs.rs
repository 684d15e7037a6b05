//! Spread and fee model.
//!
//! Rates are stored in parts per billion so that every price and fee is
//! computed with integer arithmetic and an explicit rounding direction.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

const SCALE: i128 = 1_000_000_000;

/// A non-negative fraction in fixed point (parts per billion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rate(i64);

impl Rate {
    /// Converts a fraction such as `0.05` into a fixed-point rate.
    pub fn from_fraction(fraction: f64) -> Result<Self> {
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(Error::InvalidRate(fraction));
        }
        Ok(Self((fraction * SCALE as f64).round() as i64))
    }

    /// The rate as a fraction.
    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// `ceil(rate * |amount|)`.
    fn ceil_of(self, amount: i64) -> i64 {
        let n = i128::from(self.0) * i128::from(amount.unsigned_abs());
        ((n + SCALE - 1) / SCALE) as i64
    }
}

/// Broker settings: execution price source, spread and regulatory fee rates.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Fill market orders at the previous bar's close instead of the current open.
    pub trade_on_close: bool,
    /// Fraction applied against the trader on market fills (e.g. 0.05 for 5%).
    pub spread: f64,
    /// SEC fee per cent of notional.
    pub sec_fee_rate: f64,
    /// FINRA fee per share.
    pub finra_fee_rate: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            trade_on_close: false,
            spread: 0.05,
            sec_fee_rate: 0.000_027_8,
            finra_fee_rate: 0.000_166,
        }
    }
}

impl BrokerConfig {
    /// Sets the trade-on-close flag.
    pub fn trade_on_close(mut self, trade_on_close: bool) -> Self {
        self.trade_on_close = trade_on_close;
        self
    }

    /// Sets the spread fraction.
    pub fn spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    /// Sets both fee rates.
    pub fn fees(mut self, sec_fee_rate: f64, finra_fee_rate: f64) -> Self {
        self.sec_fee_rate = sec_fee_rate;
        self.finra_fee_rate = finra_fee_rate;
        self
    }

    /// Zero spread, zero fees.
    pub fn frictionless() -> Self {
        Self::default().spread(0.0).fees(0.0, 0.0)
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }
}

/// Validated, fixed-point form of [`BrokerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    spread: Rate,
    sec_fee: Rate,
    finra_fee: Rate,
}

impl TryFrom<&BrokerConfig> for CostModel {
    type Error = Error;

    fn try_from(config: &BrokerConfig) -> Result<Self> {
        if config.spread >= 1.0 {
            return Err(Error::InvalidRate(config.spread));
        }
        Ok(Self {
            spread: Rate::from_fraction(config.spread)?,
            sec_fee: Rate::from_fraction(config.sec_fee_rate)?,
            finra_fee: Rate::from_fraction(config.finra_fee_rate)?,
        })
    }
}

impl CostModel {
    /// Spread rate.
    pub fn spread(&self) -> Rate {
        self.spread
    }

    /// Fee for a fill of `shares` with the given notional, in cents.
    ///
    /// `ceil(SEC * |notional|) + ceil(FINRA * |shares|)`.
    pub fn fee(&self, shares: i64, notional: i64) -> i64 {
        self.sec_fee.ceil_of(notional) + self.finra_fee.ceil_of(shares)
    }

    /// Moves `price` against the trader by the spread and clamps it into `[low, high]`.
    ///
    /// Buys (`shares > 0`) pay `ceil(price * (1 + spread))`, sells receive
    /// `floor(price * (1 - spread))`.
    pub fn adjusted_price(&self, shares: i64, price: i64, high: i64, low: i64) -> i64 {
        let spread = i128::from(self.spread.0);
        let price = i128::from(price);
        let raw = if shares > 0 {
            let n = price * (SCALE + spread);
            n.div_euclid(SCALE) + i128::from(n.rem_euclid(SCALE) != 0)
        } else {
            (price * (SCALE - spread)).div_euclid(SCALE)
        };
        (raw as i64).min(high).max(low)
    }
}
