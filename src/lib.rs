// scalp-core: intraday dip-buying scalper for liquid us equities.
// risk-first architecture: every intent passes the governor before it reaches a broker.
// prices and money are decimals. time is always passed in, never read inside the engine.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, Side, Price, Money, Percent, Timestamp
//   2.x  window.rs: rolling price history per symbol
//   3.x  signal.rs: dip entry, stop loss, profit target, trailing stop
//   4.x  position.rs: position struct, pnl, trade records
//   5.x  ledger.rs: open positions, two phase close, trade history, stats
//   6.3  risk.rs: circuit breakers, cooldowns, sizing
//   7.x  config.rs: thresholds, bounds table, layered loading, presets
//   8.x  engine/: core engine: ticks, quotes, orders, positions
//   9.x  price_feed.rs: quote sources (simulated, scripted)
//   9.1  executor.rs: order execution (paper)
//   11.x events.rs: state transition events for audit
//   12.x control.rs: run loop and operator surface
//   13.x session.rs: market hours, blackouts, clocks

// core trading modules
pub mod engine;
pub mod events;
pub mod ledger;
pub mod position;
pub mod signal;
pub mod types;
pub mod window;

// risk and safety modules
pub mod risk;
pub mod session;

// integration modules
pub mod config;
pub mod control;
pub mod executor;
pub mod price_feed;

// re exports for convenience
pub use engine::*;
pub use events::*;
pub use ledger::*;
pub use position::*;
pub use risk::*;
pub use signal::*;
pub use types::*;
pub use window::*;
pub use config::{
    CalendarKind, ConfigError, Environment, ExecutionParams, RiskParams, SessionParams, StrategyParams,
    TradingConfig, TradingMode,
};
pub use control::{ControlError, ControlLoop, RunState, StatusSnapshot};
pub use executor::{ExecutionError, Fill, OrderExecutor, OrderRequest, PaperExecutor};
pub use price_feed::{FeedError, PriceFeed, Quote, ScriptStep, ScriptedFeed, SimulatedFeed};
pub use session::{Clock, ManualClock, MarketSession, SessionPhase, SystemClock};
