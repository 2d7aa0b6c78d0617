// 8.0 engine/core.rs: main engine. owns the ledger, the risk aggregate and the audit trail.
// one engine per process. the control loop serializes all access to it.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::config::EngineConfig;
use super::results::EngineError;
use crate::config::TradingConfig;
use crate::events::{
    ConfigAppliedEvent, ConfigRejectedEvent, Event, EventCollector, EventEmitter, EventId, EventPayload,
    HaltClearance, HaltClearedEvent, HaltTriggeredEvent,
};
use crate::executor::OrderExecutor;
use crate::ledger::{PositionLedger, TradingStats};
use crate::position::{Position, Trade};
use crate::price_feed::PriceFeed;
use crate::risk::{HaltReason, RiskGovernor, RiskMode, RiskState};
use crate::session::MarketSession;
use crate::signal::SignalEngine;
use crate::types::{Money, Price, Symbol, Timestamp};

pub(super) type HaltSnapshot = (bool, Option<HaltReason>, Option<Timestamp>);

/** 8.1: main engine struct. all trading state lives here */
pub struct Engine {
    pub(super) config: Arc<TradingConfig>,
    pub(super) settings: EngineConfig,
    pub(super) feed: Arc<dyn PriceFeed>,
    pub(super) executor: Arc<dyn OrderExecutor>,
    pub(super) session: MarketSession,
    pub(super) signals: SignalEngine,
    pub(super) governor: RiskGovernor,
    pub(super) risk: RiskState,
    pub(super) ledger: PositionLedger,
    pub(super) events: EventCollector,
    // last good price per symbol
    pub(super) marks: BTreeMap<Symbol, Price>,
    pub(super) current_time: Timestamp,
    pub(super) tick_count: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("feed", &self.feed.name())
            .field("executor", &self.executor.name())
            .field("risk", &self.risk)
            .field("open_positions", &self.ledger.open_count())
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

impl Engine {
    pub fn new(
        config: Arc<TradingConfig>,
        feed: Arc<dyn PriceFeed>,
        executor: Arc<dyn OrderExecutor>,
        now: Timestamp,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        info!(
            mode = %config.mode,
            feed = feed.name(),
            executor = executor.name(),
            symbols = ?config.symbols,
            balance = %config.starting_balance,
            "engine created"
        );
        let settings = EngineConfig::from_trading(&config);
        Ok(Self {
            events: EventCollector::new(settings.max_events),
            settings,
            session: MarketSession::new(&config.session),
            signals: SignalEngine::new(config.strategy.clone()),
            governor: RiskGovernor::new(config.risk.clone()),
            risk: RiskState::new(config.starting_balance),
            ledger: PositionLedger::new(now),
            marks: BTreeMap::new(),
            current_time: now,
            tick_count: 0,
            feed,
            executor,
            config,
        })
    }

    /// Replace the market session. simulations use an always-on calendar.
    pub fn with_session(mut self, session: MarketSession) -> Self {
        self.session = session;
        self
    }

    /// Resume from persisted state.
    pub fn with_state(mut self, risk: RiskState, ledger: PositionLedger) -> Self {
        self.risk = risk;
        self.ledger = ledger;
        self
    }

    pub fn config(&self) -> &Arc<TradingConfig> {
        &self.config
    }

    // 8.2: atomic snapshot swap. callers make sure no tick is in flight
    pub fn reconfigure(&mut self, config: TradingConfig) -> Result<Arc<TradingConfig>, EngineError> {
        let config = match config.validated() {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!(error = %e, "configuration rejected");
                self.emit_event(EventPayload::ConfigRejected(ConfigRejectedEvent { error: e.to_string() }));
                return Err(e.into());
            }
        };

        self.settings = EngineConfig {
            max_events: self.settings.max_events,
            ..EngineConfig::from_trading(&config)
        };
        self.session = MarketSession::new(&config.session);
        self.signals.reconfigure(config.strategy.clone());
        self.governor.reconfigure(config.risk.clone());

        // a new starting balance only moves an untouched baseline. halts and counters stay
        if self.risk.starting_balance != config.starting_balance {
            if self.risk.is_pristine() && self.ledger.trades().is_empty() && self.ledger.open_count() == 0 {
                self.risk.starting_balance = config.starting_balance;
                self.risk.current_balance = config.starting_balance;
            } else {
                info!(
                    kept = %self.risk.starting_balance,
                    requested = %config.starting_balance,
                    "starting balance change ignored after trading or a halt"
                );
            }
        }

        info!(symbols = ?config.symbols, "configuration applied");
        self.emit_event(EventPayload::ConfigApplied(ConfigAppliedEvent {
            symbols: config.symbols.clone(),
        }));
        self.config = Arc::clone(&config);
        Ok(config)
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.risk
    }

    pub fn risk_mode(&self) -> RiskMode {
        self.governor.mode(&self.risk, self.current_time)
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn positions(&self) -> Vec<Position> {
        self.ledger.positions().cloned().collect()
    }

    pub fn trades(&self) -> &[Trade] {
        self.ledger.trades()
    }

    pub fn stats(&self) -> &TradingStats {
        self.ledger.stats()
    }

    pub fn mark(&self, symbol: &Symbol) -> Option<Price> {
        self.marks.get(symbol).copied()
    }

    pub fn unrealized_pnl(&self) -> Money {
        self.ledger.total_unrealized(&self.marks)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.events()
    }

    pub fn events_since(&self, after: EventId) -> Vec<Event> {
        self.events.since(after)
    }

    pub fn feed_name(&self) -> &str {
        self.feed.name()
    }

    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    // 8.3: operator actions on the risk aggregate
    pub fn acknowledge_halt(&mut self, now: Timestamp) -> Result<(), EngineError> {
        let reason = self.risk.halt_reason;
        let was_halted = self.risk.halted;
        self.governor.acknowledge(&mut self.risk, now)?;
        if was_halted {
            self.emit_event(EventPayload::HaltCleared(HaltClearedEvent {
                reason,
                cleared_by: HaltClearance::Acknowledged,
            }));
        }
        Ok(())
    }

    pub fn reset_halt(&mut self, rebaseline: bool) {
        let reason = self.risk.halt_reason;
        let was_halted = self.risk.halted;
        self.governor.reset_halt(&mut self.risk, rebaseline);
        if was_halted {
            self.emit_event(EventPayload::HaltCleared(HaltClearedEvent {
                reason,
                cleared_by: HaltClearance::Reset,
            }));
        }
    }

    /// Daily counters, timed halts and session statistics. the drawdown halt
    /// and the balance baseline survive.
    pub fn reset_daily_stats(&mut self, now: Timestamp) {
        self.risk.reset_daily();
        let timed_halt = self.risk.halt_reason.filter(|r| !r.is_terminal());
        if timed_halt.is_some() {
            self.risk.clear_halt();
            self.emit_event(EventPayload::HaltCleared(HaltClearedEvent {
                reason: timed_halt,
                cleared_by: HaltClearance::StatsReset,
            }));
        }
        self.ledger.reset_stats(now);
        info!("daily statistics reset");
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        self.events.emit(self.current_time, payload);
    }

    // compare halt state before and after a governor call and record the transition
    pub(super) fn note_halt_transition(&mut self, before: HaltSnapshot) {
        let (was_halted, old_reason, old_until) = before;
        let now_reason = self.risk.halt_reason;
        let changed = !was_halted || old_reason != now_reason || old_until != self.risk.cooldown_until;

        if self.risk.halted && changed {
            if let Some(reason) = now_reason {
                self.emit_event(EventPayload::HaltTriggered(HaltTriggeredEvent {
                    reason,
                    balance: self.risk.current_balance,
                    daily_pnl: self.risk.daily_pnl,
                    consecutive_losses: self.risk.consecutive_losses,
                    cooldown_until: self.risk.cooldown_until,
                }));
            }
        } else if was_halted && !self.risk.halted {
            self.emit_event(EventPayload::HaltCleared(HaltClearedEvent {
                reason: old_reason,
                cleared_by: HaltClearance::CooldownExpired,
            }));
        }
    }

    pub(super) fn halt_snapshot(&self) -> HaltSnapshot {
        (self.risk.halted, self.risk.halt_reason, self.risk.cooldown_until)
    }
}
