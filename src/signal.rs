// 3.0 signal.rs: turns price history into enter/exit intents.
// no balance mutation, no order submission. the engine decides what happens next.
// 3.1 entries buy the dip from the rolling high. 3.2 exits: stop loss > profit target > trailing stop.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::config::StrategyParams;
use crate::position::{Position, PositionStatus};
use crate::types::{Price, Symbol, Timestamp};
use crate::window::{OutOfOrderSample, PriceWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    ProfitTarget,
    TrailingStop,
    // closing blackout with close-at-eod
    EndOfDay,
    // operator close-all
    Manual,
    // loop stopping with close-at-eod
    Shutdown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::EndOfDay => "end_of_day",
            ExitReason::Manual => "manual",
            ExitReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A proposed action waiting for risk approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Enter {
        symbol: Symbol,
        price: Price,
        // drop from the rolling high as a fraction
        drop: Decimal,
    },
    Exit {
        symbol: Symbol,
        price: Price,
        reason: ExitReason,
    },
}

impl Intent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Intent::Enter { symbol, .. } | Intent::Exit { symbol, .. } => symbol,
        }
    }

    pub fn price(&self) -> Price {
        match self {
            Intent::Enter { price, .. } | Intent::Exit { price, .. } => *price,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Intent::Exit { .. })
    }
}

/// Per tick facts the engine already knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalContext {
    pub entries_allowed: bool,
    pub halted: bool,
    pub force_exit: bool,
}

#[derive(Debug, Clone)]
pub struct SignalEngine {
    params: StrategyParams,
    windows: HashMap<Symbol, PriceWindow>,
}

impl SignalEngine {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            params,
            windows: HashMap::new(),
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    // swap thresholds between ticks. history is kept, horizons follow the new lookback
    pub fn reconfigure(&mut self, params: StrategyParams) {
        let horizon = params.lookback_ms();
        for window in self.windows.values_mut() {
            window.set_horizon(horizon);
        }
        self.params = params;
    }

    pub fn window(&self, symbol: &Symbol) -> Option<&PriceWindow> {
        self.windows.get(symbol)
    }

    /// Record a quote in the symbol's window.
    pub fn observe(&mut self, symbol: &Symbol, price: Price, at: Timestamp) -> Result<(), OutOfOrderSample> {
        let horizon = self.params.lookback_ms();
        self.windows
            .entry(symbol.clone())
            .or_insert_with(|| PriceWindow::new(horizon))
            .push(at, price)
    }

    /// Observe the quote then decide. `position` is the ledger's view for the symbol,
    /// with its peak already updated for this price.
    pub fn evaluate(
        &mut self,
        symbol: &Symbol,
        price: Price,
        at: Timestamp,
        position: Option<&Position>,
        ctx: SignalContext,
    ) -> Result<Option<Intent>, OutOfOrderSample> {
        self.observe(symbol, price, at)?;

        let intent = match position {
            Some(pos) => self.exit_signal(pos, price, ctx),
            None => self.entry_signal(symbol, price, ctx),
        };
        Ok(intent)
    }

    // 3.1: (high - price) / high >= entry drop
    pub fn entry_signal(&self, symbol: &Symbol, price: Price, ctx: SignalContext) -> Option<Intent> {
        if !ctx.entries_allowed || ctx.halted {
            return None;
        }
        let high = self.windows.get(symbol)?.rolling_max()?;
        let drop = (high.value() - price.value()) / high.value();

        if drop >= self.params.entry_drop_percent.as_fraction() {
            debug!(%symbol, %price, %high, %drop, "entry signal");
            Some(Intent::Enter {
                symbol: symbol.clone(),
                price,
                drop,
            })
        } else {
            None
        }
    }

    // 3.2: exit checks in priority order
    pub fn exit_signal(&self, position: &Position, price: Price, ctx: SignalContext) -> Option<Intent> {
        if position.status != PositionStatus::Open {
            return None;
        }
        let reason = match ctx.force_exit {
            true => ExitReason::EndOfDay,
            false => self.exit_reason(position, price)?,
        };

        debug!(symbol = %position.symbol, %price, %reason, "exit signal");
        Some(Intent::Exit {
            symbol: position.symbol.clone(),
            price,
            reason,
        })
    }

    pub fn exit_reason(&self, position: &Position, price: Price) -> Option<ExitReason> {
        let ret = position.return_at(price);

        if ret <= -self.params.stop_loss_percent.as_fraction() {
            return Some(ExitReason::StopLoss);
        }
        if ret >= self.params.profit_target_percent.as_fraction() {
            return Some(ExitReason::ProfitTarget);
        }
        if self.params.use_trailing_stop {
            let peak = position.peak_price.unwrap_or(position.entry_price).max(price);
            let retrace = (peak.value() - price.value()) / peak.value();
            if retrace >= self.params.trailing_stop_percent.as_fraction() {
                return Some(ExitReason::TrailingStop);
            }
        }
        None
    }
}
