// 8.0: core trading engine. coordinates quote refresh, signal evaluation,
// risk gating, order submission and ledger updates for one tick at a time.
// time is always passed in; the control loop owns the clock.

mod config;
mod core;
mod orders;
mod positions;
mod pricing;
mod results;
mod tick;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, SymbolOutcome, TickReport};
