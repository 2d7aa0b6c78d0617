//! Order submission.

use std::sync::Arc;
use tracing::debug;

use super::core::Engine;
use crate::executor::{ExecutionError, Fill, OrderRequest};

impl Engine {
    /// Submit inside the broker time budget. an expired budget counts as a failed order;
    /// the adapter call is dropped, not retried.
    pub(super) async fn submit_order(&self, order: &OrderRequest) -> Result<Fill, ExecutionError> {
        let executor = Arc::clone(&self.executor);
        let budget = self.settings.broker_timeout;
        debug!(symbol = %order.symbol, side = %order.side, quantity = order.quantity, "submitting order");

        let fill = match tokio::time::timeout(budget, executor.execute(order)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecutionError::Timeout {
                    symbol: order.symbol.clone(),
                    after_ms: budget.as_millis() as u64,
                })
            }
        };

        if fill.symbol != order.symbol || fill.side != order.side {
            return Err(ExecutionError::Rejected {
                symbol: order.symbol.clone(),
                reason: format!("fill does not match order: {} {}", fill.side, fill.symbol),
            });
        }
        if fill.quantity == 0 || fill.quantity > order.quantity {
            return Err(ExecutionError::Rejected {
                symbol: order.symbol.clone(),
                reason: format!("fill quantity {} for order of {}", fill.quantity, order.quantity),
            });
        }
        Ok(fill)
    }
}
