//! Quote refresh.

use std::sync::Arc;
use tracing::warn;

use super::core::Engine;
use crate::events::{EventPayload, FeedFailedEvent};
use crate::price_feed::{FeedError, Quote};
use crate::types::Symbol;

impl Engine {
    /// Fetch one quote inside the feed time budget.
    pub(super) async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FeedError> {
        let feed = Arc::clone(&self.feed);
        let budget = self.settings.feed_timeout;

        match tokio::time::timeout(budget, feed.get_quote(symbol)).await {
            Ok(Ok(quote)) if &quote.symbol == symbol => Ok(quote),
            Ok(Ok(quote)) => Err(FeedError::Unavailable {
                symbol: symbol.clone(),
                reason: format!("feed answered for {}", quote.symbol),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FeedError::Timeout {
                symbol: symbol.clone(),
                after_ms: budget.as_millis() as u64,
            }),
        }
    }

    /// Fetch and remember the latest price. failures are logged and recorded,
    /// the previous mark is kept.
    pub(super) async fn refresh_quote(&mut self, symbol: &Symbol) -> Result<Quote, FeedError> {
        match self.fetch_quote(symbol).await {
            Ok(quote) => {
                self.marks.insert(symbol.clone(), quote.price);
                Ok(quote)
            }
            Err(e) => {
                warn!(%symbol, error = %e, "quote unavailable, skipping symbol");
                self.emit_event(EventPayload::FeedFailed(FeedFailedEvent {
                    symbol: symbol.clone(),
                    error: e.to_string(),
                }));
                Err(e)
            }
        }
    }
}
