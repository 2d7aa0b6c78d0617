// 4.0: open position tracking. long only. pnl = qty * (price - entry).
// 4.1 peak tracking for trailing stops, 4.3 the pnl formulas, 4.4 trade records.

use crate::types::{Money, Price, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    // exit order in flight. a second close attempt is an integrity error.
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub entry_price: Price,
    pub quantity: u64,
    pub entry_time: Timestamp,
    // highest price seen since entry. only moves up.
    pub peak_price: Option<Price>,
    pub status: PositionStatus,
}

impl Position {
    pub fn new(symbol: Symbol, entry_price: Price, quantity: u64, entry_time: Timestamp) -> Self {
        Self {
            symbol,
            entry_price,
            quantity,
            entry_time,
            peak_price: Some(entry_price),
            status: PositionStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    // 4.1: monotone peak. returns the peak after the update
    pub fn update_peak(&mut self, price: Price) -> Price {
        let peak = match self.peak_price {
            Some(peak) if peak >= price => peak,
            _ => price,
        };
        self.peak_price = Some(peak);
        peak
    }

    /// Signed return since entry. 0.003 = +0.3%
    pub fn return_at(&self, price: Price) -> Decimal {
        price.return_from(self.entry_price)
    }

    pub fn unrealized_pnl(&self, price: Price) -> Money {
        calculate_unrealized_pnl(self.quantity, self.entry_price, price)
    }

    pub fn entry_value(&self) -> Money {
        Money::new(Decimal::from(self.quantity) * self.entry_price.value())
    }

    pub fn market_value(&self, price: Price) -> Money {
        Money::new(Decimal::from(self.quantity) * price.value())
    }
}

// 4.3: the pnl formula. qty * (price - entry)
pub fn calculate_unrealized_pnl(quantity: u64, entry_price: Price, price: Price) -> Money {
    Money::new(Decimal::from(quantity) * (price.value() - entry_price.value()))
}

pub fn calculate_realized_pnl(quantity: u64, entry_price: Price, exit_price: Price) -> Money {
    Money::new(Decimal::from(quantity) * (exit_price.value() - entry_price.value()))
}

// 4.4: immutable leg record. realized pnl only on the closing leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub quantity: u64,
    pub timestamp: Timestamp,
    pub realized_pnl: Option<Money>,
}

impl Trade {
    pub fn opening(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: Side::Buy,
            price: position.entry_price,
            quantity: position.quantity,
            timestamp: position.entry_time,
            realized_pnl: None,
        }
    }

    pub fn closing(position: &Position, exit_price: Price, timestamp: Timestamp) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: Side::Sell,
            price: exit_price,
            quantity: position.quantity,
            timestamp,
            realized_pnl: Some(calculate_realized_pnl(
                position.quantity,
                position.entry_price,
                exit_price,
            )),
        }
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl.map(|p| p.is_positive()).unwrap_or(false)
    }
}
