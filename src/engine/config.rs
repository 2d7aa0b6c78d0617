//! Engine runtime options.

use std::time::Duration;

use crate::config::TradingConfig;
use crate::events::EventCollector;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of audit events to retain in memory.
    pub max_events: usize,
    /// Budget for one quote request.
    pub feed_timeout: Duration,
    /// Budget for one order submission.
    pub broker_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_trading(&TradingConfig::default())
    }
}

impl EngineConfig {
    pub fn from_trading(config: &TradingConfig) -> Self {
        Self {
            max_events: EventCollector::DEFAULT_CAPACITY,
            feed_timeout: config.execution.feed_timeout(),
            broker_timeout: config.execution.broker_timeout(),
        }
    }
}
