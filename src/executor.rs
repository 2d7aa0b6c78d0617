// Order execution
//
// The loop hands approved intents to an OrderExecutor and gets a fill or an error back.
// Broker protocol, authentication and wire retries live behind this trait. The paper
// executor fills at the reference price plus slippage and is what dry runs use.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::session::Clock;
use crate::types::{Price, Side, Symbol, Timestamp};

/// What the loop asks the broker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: u64,
    // quote that produced the intent
    pub reference_price: Price,
}

/// Broker confirmation. the ledger turns this into a Trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub quantity: u64,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("order for {symbol} rejected: {reason}")]
    Rejected { symbol: Symbol, reason: String },

    #[error("order for {symbol} timed out after {after_ms}ms")]
    Timeout { symbol: Symbol, after_ms: u64 },

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("partial fill for {symbol}: {filled}/{requested}")]
    PartialFill { symbol: Symbol, filled: u64, requested: u64 },
}

#[async_trait]
pub trait OrderExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn is_dry_run(&self) -> bool;

    async fn execute(&self, order: &OrderRequest) -> Result<Fill, ExecutionError>;
}

// Immediate fills at the reference price. buys slip up, sells slip down.
pub struct PaperExecutor {
    clock: Arc<dyn Clock>,
    slippage_bps: u32,
    next_order_id: AtomicU64,
}

impl PaperExecutor {
    pub fn new(clock: Arc<dyn Clock>, slippage_bps: u32) -> Self {
        Self {
            clock,
            slippage_bps,
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn fill_price(&self, side: Side, reference: Price) -> Price {
        let slip = Decimal::from(self.slippage_bps) / Decimal::from(10_000);
        let raw = reference.value() * (Decimal::ONE + side.sign() * slip);
        Price::new(raw.round_dp(4)).unwrap_or(reference)
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    fn name(&self) -> &str {
        "paper"
    }

    fn is_dry_run(&self) -> bool {
        true
    }

    async fn execute(&self, order: &OrderRequest) -> Result<Fill, ExecutionError> {
        if order.quantity == 0 {
            return Err(ExecutionError::Rejected {
                symbol: order.symbol.clone(),
                reason: "zero quantity".to_string(),
            });
        }

        let fill = Fill {
            order_id: self.next_order_id.fetch_add(1, Ordering::Relaxed),
            symbol: order.symbol.clone(),
            side: order.side,
            price: self.fill_price(order.side, order.reference_price),
            quantity: order.quantity,
            timestamp: self.clock.now(),
        };
        debug!(order_id = fill.order_id, symbol = %fill.symbol, side = %fill.side, price = %fill.price, "paper fill");
        Ok(fill)
    }
}
