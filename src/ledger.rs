// 5.0 ledger.rs: the single source of truth for positions and trade history.
// at most one position per symbol. close is two phase: begin_close, then close_position or abort_close.
// closes feed the risk aggregate so the next evaluation sees the new numbers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::position::{Position, PositionStatus, Trade};
use crate::risk::RiskState;
use crate::types::{Money, Price, Symbol, Timestamp};

/// Invariant violations. surfaced loudly, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("position already open for {0}")]
    AlreadyOpen(Symbol),

    #[error("no open position for {0}")]
    NoPosition(Symbol),

    #[error("close already in flight for {0}")]
    AlreadyClosing(Symbol),

    #[error("position for {0} is not closing")]
    NotClosing(Symbol),

    #[error("zero quantity for {0}")]
    ZeroQuantity(Symbol),
}

// 5.1: session statistics beyond the risk aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingStats {
    pub total_wins: u32,
    pub total_losses: u32,
    pub consecutive_wins: u32,
    pub largest_win: Money,
    pub largest_loss: Money,
    pub total_realized: Money,
    pub session_start: Timestamp,
    pub last_trade_at: Option<Timestamp>,
}

impl TradingStats {
    pub fn new(session_start: Timestamp) -> Self {
        Self {
            total_wins: 0,
            total_losses: 0,
            consecutive_wins: 0,
            largest_win: Money::zero(),
            largest_loss: Money::zero(),
            total_realized: Money::zero(),
            session_start,
            last_trade_at: None,
        }
    }

    pub fn record(&mut self, pnl: Money, at: Timestamp) {
        self.total_realized = self.total_realized.add(pnl);
        self.last_trade_at = Some(at);

        if pnl.is_positive() {
            self.total_wins += 1;
            self.consecutive_wins += 1;
            if pnl > self.largest_win {
                self.largest_win = pnl;
            }
        } else if pnl.is_negative() {
            self.total_losses += 1;
            self.consecutive_wins = 0;
            if pnl < self.largest_loss {
                self.largest_loss = pnl;
            }
        }
    }

    /// Wins over decided trades. None before the first one.
    pub fn win_rate(&self) -> Option<Decimal> {
        let decided = self.total_wins + self.total_losses;
        if decided == 0 {
            return None;
        }
        Some(Decimal::from(self.total_wins) / Decimal::from(decided))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLedger {
    positions: BTreeMap<Symbol, Position>,
    trades: Vec<Trade>,
    stats: TradingStats,
}

impl PositionLedger {
    pub fn new(session_start: Timestamp) -> Self {
        Self {
            positions: BTreeMap::new(),
            trades: Vec::new(),
            stats: TradingStats::new(session_start),
        }
    }

    // 5.2: open. fails when the symbol already has a position in any status
    pub fn open_position(
        &mut self,
        symbol: &Symbol,
        price: Price,
        quantity: u64,
        at: Timestamp,
        risk: &mut RiskState,
    ) -> Result<&Position, LedgerError> {
        if self.positions.contains_key(symbol) {
            error!(%symbol, "integrity violation: double open");
            return Err(LedgerError::AlreadyOpen(symbol.clone()));
        }
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity(symbol.clone()));
        }

        let position = Position::new(symbol.clone(), price, quantity, at);
        self.trades.push(Trade::opening(&position));
        risk.record_fill(at);
        self.stats.last_trade_at = Some(at);

        info!(%symbol, %price, quantity, "position opened");
        Ok(self.positions.entry(symbol.clone()).or_insert(position))
    }

    /// Mark the position as closing before the exit order goes out.
    pub fn begin_close(&mut self, symbol: &Symbol) -> Result<&Position, LedgerError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoPosition(symbol.clone()))?;
        match position.status {
            PositionStatus::Open => {
                position.status = PositionStatus::Closing;
                Ok(position)
            }
            _ => {
                error!(%symbol, "integrity violation: double close");
                Err(LedgerError::AlreadyClosing(symbol.clone()))
            }
        }
    }

    /// Exit order failed. the position is open again.
    pub fn abort_close(&mut self, symbol: &Symbol) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoPosition(symbol.clone()))?;
        if position.status != PositionStatus::Closing {
            return Err(LedgerError::NotClosing(symbol.clone()));
        }
        position.status = PositionStatus::Open;
        Ok(())
    }

    // 5.3: commit the close. pnl = (exit - entry) * qty, then feed the risk aggregate
    pub fn close_position(
        &mut self,
        symbol: &Symbol,
        exit_price: Price,
        at: Timestamp,
        risk: &mut RiskState,
    ) -> Result<Trade, LedgerError> {
        let mut position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| LedgerError::NoPosition(symbol.clone()))?;
        position.status = PositionStatus::Closed;

        let trade = Trade::closing(&position, exit_price, at);
        let pnl = trade.realized_pnl.unwrap_or_default();
        risk.record_close(pnl, at);
        self.stats.record(pnl, at);
        self.trades.push(trade.clone());

        info!(
            %symbol,
            entry = %position.entry_price,
            exit = %exit_price,
            quantity = position.quantity,
            %pnl,
            consecutive_losses = risk.consecutive_losses,
            "position closed"
        );
        Ok(trade)
    }

    // monotone peak for trailing stops
    pub fn update_peak(&mut self, symbol: &Symbol, price: Price) -> Option<Price> {
        self.positions.get_mut(symbol).map(|p| p.update_peak(price))
    }

    pub fn unrealized_pnl(&self, symbol: &Symbol, price: Price) -> Option<Money> {
        self.positions.get(symbol).map(|p| p.unrealized_pnl(price))
    }

    /// Sum over positions that have a price in `marks`.
    pub fn total_unrealized(&self, marks: &BTreeMap<Symbol, Price>) -> Money {
        self.positions
            .values()
            .filter_map(|p| marks.get(&p.symbol).map(|&m| p.unrealized_pnl(m)))
            .sum()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.positions.keys().cloned().collect()
    }

    // closing positions still count against the limit
    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.realized_pnl.is_some())
    }

    pub fn stats(&self) -> &TradingStats {
        &self.stats
    }

    pub fn reset_stats(&mut self, session_start: Timestamp) {
        self.stats = TradingStats::new(session_start);
    }
}
