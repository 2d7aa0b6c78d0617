//! Position management for approved intents.

use tracing::{debug, error, warn};

use super::core::Engine;
use super::results::{SymbolOutcome, TickReport};
use crate::events::{
    EntryFailedEvent, EventPayload, ExitEscalatedEvent, IntegrityViolationEvent, IntentDeferredEvent,
    IntentRejectedEvent, PositionClosedEvent, PositionOpenedEvent,
};
use crate::executor::{ExecutionError, OrderRequest};
use crate::ledger::LedgerError;
use crate::position::PositionStatus;
use crate::risk::{BookView, RiskDecision};
use crate::signal::{ExitReason, Intent};
use crate::types::{Price, Side, Symbol, Timestamp};

impl Engine {
    /// Gate an intent through the governor and act on the decision.
    /// The risk read, the decision and the ledger mutation happen under one `&mut self`.
    pub(super) async fn apply_intent(&mut self, intent: Intent, now: Timestamp) -> SymbolOutcome {
        let symbol = intent.symbol().clone();
        let book = BookView {
            open_positions: self.ledger.open_count(),
            exit_quantity: self.ledger.position(&symbol).map(|p| p.quantity).unwrap_or(0),
        };

        let before = self.halt_snapshot();
        let decision = self.governor.evaluate(&mut self.risk, &intent, book, now);
        self.note_halt_transition(before);

        match decision {
            RiskDecision::Approve { quantity } => match intent {
                Intent::Enter { price, .. } => self.enter_position(&symbol, price, quantity).await,
                Intent::Exit { price, reason, .. } => self.exit_position(&symbol, price, reason).await,
            },
            RiskDecision::Reject { violation } => {
                debug!(%symbol, %violation, "intent rejected");
                self.emit_event(EventPayload::IntentRejected(IntentRejectedEvent {
                    symbol,
                    violation: violation.clone(),
                }));
                SymbolOutcome::Rejected { violation }
            }
            RiskDecision::Defer { retry_at } => {
                debug!(%symbol, %retry_at, "intent deferred");
                self.emit_event(EventPayload::IntentDeferred(IntentDeferredEvent { symbol, retry_at }));
                SymbolOutcome::Deferred { retry_at }
            }
        }
    }

    // 8.4: buy, then record. a failed entry is retried by a later tick's signal
    pub(super) async fn enter_position(&mut self, symbol: &Symbol, price: Price, quantity: u64) -> SymbolOutcome {
        let order = OrderRequest {
            symbol: symbol.clone(),
            side: Side::Buy,
            quantity,
            reference_price: price,
        };
        let fill = match self.submit_order(&order).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(%symbol, error = %e, "entry order failed");
                self.emit_event(EventPayload::EntryFailed(EntryFailedEvent {
                    symbol: symbol.clone(),
                    error: e.to_string(),
                }));
                return SymbolOutcome::EntryFailed { error: e.to_string() };
            }
        };

        let now = self.current_time;
        let opened = self
            .ledger
            .open_position(symbol, fill.price, fill.quantity, now, &mut self.risk)
            .map(|p| (p.entry_price, p.quantity));

        match opened {
            Ok((price, quantity)) => {
                self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
                    symbol: symbol.clone(),
                    price,
                    quantity,
                }));
                SymbolOutcome::Opened { price, quantity }
            }
            Err(e) => self.integrity_violation(symbol, e),
        }
    }

    // 8.5: two phase exit. begin_close, sell, then commit or abort
    pub(super) async fn exit_position(&mut self, symbol: &Symbol, price: Price, reason: ExitReason) -> SymbolOutcome {
        let (entry_price, quantity) = match self.ledger.begin_close(symbol) {
            Ok(p) => (p.entry_price, p.quantity),
            Err(e) => return self.integrity_violation(symbol, e),
        };

        let order = OrderRequest {
            symbol: symbol.clone(),
            side: Side::Sell,
            quantity,
            reference_price: price,
        };
        let result = self.submit_order(&order).await.and_then(|fill| {
            if fill.quantity == quantity {
                Ok(fill)
            } else {
                Err(ExecutionError::PartialFill {
                    symbol: symbol.clone(),
                    filled: fill.quantity,
                    requested: quantity,
                })
            }
        });

        let fill = match result {
            Ok(fill) => fill,
            Err(e) => return self.escalate_exit(symbol, reason, e.to_string()),
        };

        let now = self.current_time;
        match self.ledger.close_position(symbol, fill.price, now, &mut self.risk) {
            Ok(trade) => {
                self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
                    symbol: symbol.clone(),
                    entry_price,
                    exit_price: trade.price,
                    quantity: trade.quantity,
                    realized_pnl: trade.realized_pnl.unwrap_or_default(),
                    reason,
                }));

                // surface a breaker the close just crossed
                let before = self.halt_snapshot();
                self.governor.refresh(&mut self.risk, now);
                self.note_halt_transition(before);

                SymbolOutcome::Closed { trade, reason }
            }
            Err(e) => self.integrity_violation(symbol, e),
        }
    }

    // the position stays open and in the ledger. never silently dropped
    fn escalate_exit(&mut self, symbol: &Symbol, reason: ExitReason, error: String) -> SymbolOutcome {
        if let Err(e) = self.ledger.abort_close(symbol) {
            error!(%symbol, error = %e, "could not reopen position after failed exit");
        }
        error!(%symbol, %reason, %error, "exit order failed, operator attention required");
        self.emit_event(EventPayload::ExitEscalated(ExitEscalatedEvent {
            symbol: symbol.clone(),
            reason,
            error: error.clone(),
        }));
        SymbolOutcome::ExitEscalated { reason, error }
    }

    fn integrity_violation(&mut self, symbol: &Symbol, e: LedgerError) -> SymbolOutcome {
        error!(%symbol, error = %e, "ledger integrity violation");
        self.emit_event(EventPayload::IntegrityViolation(IntegrityViolationEvent {
            symbol: symbol.clone(),
            error: e.to_string(),
        }));
        SymbolOutcome::IntegrityViolation { error: e.to_string() }
    }

    /// Exit every open position through the normal exit path. runs between ticks.
    /// A symbol without a fresh quote falls back to its last mark.
    pub async fn close_all_positions(&mut self, now: Timestamp, reason: ExitReason) -> TickReport {
        self.current_time = now;
        let mut report = TickReport::new(self.tick_count, now);

        for symbol in self.ledger.symbols() {
            let is_open = self
                .ledger
                .position(&symbol)
                .map(|p| p.status == PositionStatus::Open)
                .unwrap_or(false);
            if !is_open {
                continue;
            }

            let price = match self.refresh_quote(&symbol).await {
                Ok(quote) => quote.price,
                Err(e) => match self.marks.get(&symbol).copied() {
                    Some(mark) => mark,
                    None => {
                        let outcome = self.escalate_unpriced(&symbol, reason, e.to_string());
                        report.push(&symbol, outcome);
                        continue;
                    }
                },
            };

            let intent = Intent::Exit {
                symbol: symbol.clone(),
                price,
                reason,
            };
            let outcome = self.apply_intent(intent, now).await;
            report.push(&symbol, outcome);
        }

        report.halted = self.risk.halted;
        report.halt_reason = self.risk.halt_reason;
        report
    }

    fn escalate_unpriced(&mut self, symbol: &Symbol, reason: ExitReason, error: String) -> SymbolOutcome {
        error!(%symbol, %reason, %error, "no price to exit with, operator attention required");
        self.emit_event(EventPayload::ExitEscalated(ExitEscalatedEvent {
            symbol: symbol.clone(),
            reason,
            error: error.clone(),
        }));
        SymbolOutcome::ExitEscalated { reason, error }
    }
}
