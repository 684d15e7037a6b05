use chrono::{DateTime, Utc};

use crate::errors::{Error, Result};

/// One OHLC observation for a ticker, prices in cents.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bar {
    time: DateTime<Utc>,
    open: i64,
    high: i64,
    low: i64,
    close: i64,
}

impl Bar {
    /// Creates a bar, checking that low and high enclose open and close.
    pub fn new(time: DateTime<Utc>, open: i64, high: i64, low: i64, close: i64) -> Result<Self> {
        let bar = Self {
            time,
            open,
            high,
            low,
            close,
        };
        if !bar.is_valid() {
            return Err(Error::InvalidBar(time));
        }
        Ok(bar)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.low <= self.high
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
    }

    /// Bar timestamp.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Open price.
    pub fn open(&self) -> i64 {
        self.open
    }

    /// High price.
    pub fn high(&self) -> i64 {
        self.high
    }

    /// Low price.
    pub fn low(&self) -> i64 {
        self.low
    }

    /// Close price.
    pub fn close(&self) -> i64 {
        self.close
    }
}

type B = (DateTime<Utc>, i64, i64, i64, i64);
impl From<B> for Bar {
    /// Builds a bar from `(time, open, high, low, close)` without validation.
    fn from((time, open, high, low, close): B) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }
}

#[cfg(test)]
#[test]
fn create_valid_bar() {
    let time = DateTime::from_timestamp(1_735_862_400, 0).unwrap();
    let bar = Bar::new(time, 100, 110, 95, 105).unwrap();
    assert_eq!(bar.time(), time);
    assert_eq!(bar.open(), 100);
    assert_eq!(bar.high(), 110);
    assert_eq!(bar.low(), 95);
    assert_eq!(bar.close(), 105);
}

#[cfg(test)]
#[test]
fn reject_bar_with_close_above_high() {
    let time = DateTime::from_timestamp(1_735_862_400, 0).unwrap();
    let result = Bar::new(time, 100, 110, 95, 111);
    assert!(matches!(result, Err(Error::InvalidBar(_))));
}
