#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Cash account of a broker, in cents.
///
/// Cash only moves when a trade is closed or reduced: the realized P&L of the
/// closed lot (fees included) is credited in one step.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Wallet {
    // Starting cash
    initial_cash: i64,
    // Current cash
    cash: i64,
    // Cumulative fees paid
    fees: i64,
}

impl Wallet {
    /// Creates a new wallet with the given starting cash.
    /// Zero or negative balances are rejected.
    pub fn new(cash: i64) -> Result<Self> {
        if cash <= 0 {
            return Err(Error::NegZeroBalance(cash));
        }

        Ok(Self {
            cash,
            fees: 0,
            initial_cash: cash,
        })
    }

    /// Returns the starting cash.
    pub fn initial_cash(&self) -> i64 {
        self.initial_cash
    }

    /// Returns the current cash.
    pub fn cash(&self) -> i64 {
        self.cash
    }

    /// Returns the fees paid so far.
    pub fn fees_paid(&self) -> i64 {
        self.fees
    }

    /// Credits a realized P&L (already net of `fee`) and books the fee.
    pub(crate) fn realize(&mut self, pnl: i64, fee: i64) {
        self.cash += pnl;
        self.fees += fee;
    }
}

#[cfg(test)]
#[test]
fn new_wallet_valid_balance() {
    let wallet = Wallet::new(10_000).unwrap();
    assert_eq!(wallet.cash(), 10_000);
    assert_eq!(wallet.initial_cash(), 10_000);
    assert_eq!(wallet.fees_paid(), 0);
}

#[cfg(test)]
#[test]
fn new_wallet_invalid_balance() {
    let result = Wallet::new(0);
    assert!(matches!(result, Err(Error::NegZeroBalance(0))));

    let result = Wallet::new(-10);
    assert!(matches!(result, Err(Error::NegZeroBalance(-10))));
}

#[cfg(test)]
#[test]
fn realize_profit_and_loss() {
    let mut wallet = Wallet::new(10_000).unwrap();

    // profitable close, 2 cents of fees already deducted from the pnl
    wallet.realize(3_448, 2);
    assert_eq!(wallet.cash(), 13_448);
    assert_eq!(wallet.fees_paid(), 2);

    // losing close
    wallet.realize(-1_000, 3);
    assert_eq!(wallet.cash(), 12_448);
    assert_eq!(wallet.fees_paid(), 5);
    assert_eq!(wallet.initial_cash(), 10_000);
}
