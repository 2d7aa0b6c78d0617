// 8.0.2: result types and errors for engine operations.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::position::Trade;
use crate::risk::{HaltReason, RiskError, RiskViolation};
use crate::signal::ExitReason;
use crate::types::{Price, Symbol, Timestamp};

/// What happened to one symbol during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SymbolOutcome {
    /// Quote processed, no intent.
    Idle,
    FeedFailed { error: String },
    Opened { price: Price, quantity: u64 },
    Closed { trade: Trade, reason: ExitReason },
    Rejected { violation: RiskViolation },
    Deferred { retry_at: Timestamp },
    /// Non-fatal. retried on a later tick.
    EntryFailed { error: String },
    /// Exit order failed and the position is still open.
    ExitEscalated { reason: ExitReason, error: String },
    IntegrityViolation { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: Timestamp,
    pub outcomes: Vec<(Symbol, SymbolOutcome)>,
    pub halted: bool,
    pub halt_reason: Option<HaltReason>,
}

impl TickReport {
    pub fn new(tick: u64, timestamp: Timestamp) -> Self {
        Self {
            tick,
            timestamp,
            outcomes: Vec::new(),
            halted: false,
            halt_reason: None,
        }
    }

    pub fn push(&mut self, symbol: &Symbol, outcome: SymbolOutcome) {
        self.outcomes.push((symbol.clone(), outcome));
    }

    pub fn outcome(&self, symbol: &Symbol) -> Option<&SymbolOutcome> {
        self.outcomes.iter().find(|(s, _)| s == symbol).map(|(_, o)| o)
    }

    pub fn opened(&self) -> usize {
        self.count(|o| matches!(o, SymbolOutcome::Opened { .. }))
    }

    pub fn closed(&self) -> Vec<&Trade> {
        self.outcomes
            .iter()
            .filter_map(|(_, o)| match o {
                SymbolOutcome::Closed { trade, .. } => Some(trade),
                _ => None,
            })
            .collect()
    }

    pub fn escalations(&self) -> usize {
        self.count(|o| matches!(o, SymbolOutcome::ExitEscalated { .. }))
    }

    pub fn feed_failures(&self) -> usize {
        self.count(|o| matches!(o, SymbolOutcome::FeedFailed { .. }))
    }

    fn count<F: Fn(&SymbolOutcome) -> bool>(&self, f: F) -> usize {
        self.outcomes.iter().filter(|(_, o)| f(o)).count()
    }
}

/// Errors from operator-facing engine calls. Per-symbol feed and broker
/// failures never surface here; they land in the tick report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),
}
