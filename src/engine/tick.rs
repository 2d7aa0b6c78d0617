//! One evaluation cycle.
//!
//! Symbols are processed one after another. A feed or execution failure for one
//! symbol is recorded in the report and the tick moves on to the next symbol.

use tracing::{debug, warn};

use super::core::Engine;
use super::results::{SymbolOutcome, TickReport};
use crate::events::{EventPayload, FeedFailedEvent};
use crate::signal::SignalContext;
use crate::types::{Symbol, Timestamp};

impl Engine {
    /// Run one tick at `now`.
    pub async fn run_tick(&mut self, now: Timestamp) -> TickReport {
        self.current_time = now;
        self.tick_count += 1;
        let mut report = TickReport::new(self.tick_count, now);

        // daily counters follow the trading day
        let day = self.session.session_day(now);
        self.governor.roll_session(&mut self.risk, day);

        // cooldown expiry and breakers, even on a tick with nothing to trade
        let before = self.halt_snapshot();
        self.governor.refresh(&mut self.risk, now);
        self.note_halt_transition(before);

        let force_exit = self.session.is_eod_close_window(now);
        let in_session = self.session.entries_allowed(now);
        if force_exit && self.ledger.open_count() > 0 {
            debug!(open = self.ledger.open_count(), "closing blackout, forcing exits");
        }

        for symbol in self.tick_symbols() {
            let outcome = self.process_symbol(&symbol, now, in_session, force_exit).await;
            report.push(&symbol, outcome);
        }

        report.halted = self.risk.halted;
        report.halt_reason = self.risk.halt_reason;
        debug!(
            tick = report.tick,
            symbols = report.outcomes.len(),
            opened = report.opened(),
            closed = report.closed().len(),
            halted = report.halted,
            "tick complete"
        );
        report
    }

    // configured symbols, plus any symbol still holding a position after a reconfigure
    fn tick_symbols(&self) -> Vec<Symbol> {
        let mut symbols = self.config.symbols.clone();
        for held in self.ledger.symbols() {
            if !symbols.contains(&held) {
                symbols.push(held);
            }
        }
        symbols
    }

    async fn process_symbol(
        &mut self,
        symbol: &Symbol,
        now: Timestamp,
        in_session: bool,
        force_exit: bool,
    ) -> SymbolOutcome {
        let quote = match self.refresh_quote(symbol).await {
            Ok(quote) => quote,
            Err(e) => return SymbolOutcome::FeedFailed { error: e.to_string() },
        };

        self.ledger.update_peak(symbol, quote.price);

        let ctx = SignalContext {
            entries_allowed: in_session && self.config.symbols.contains(symbol),
            halted: self.risk.halted,
            force_exit,
        };
        let evaluated = self.signals.evaluate(
            symbol,
            quote.price,
            quote.timestamp,
            self.ledger.position(symbol),
            ctx,
        );

        let intent = match evaluated {
            Ok(Some(intent)) => intent,
            Ok(None) => return SymbolOutcome::Idle,
            Err(e) => {
                warn!(%symbol, error = %e, "quote rejected");
                self.emit_event(EventPayload::FeedFailed(FeedFailedEvent {
                    symbol: symbol.clone(),
                    error: e.to_string(),
                }));
                return SymbolOutcome::FeedFailed { error: e.to_string() };
            }
        };

        self.apply_intent(intent, now).await
    }
}
