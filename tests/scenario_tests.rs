//! End to end scenarios through the engine.
//!
//! Each test scripts a price path, steps a manual clock one second per tick and
//! checks what the engine did with it.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scalp_core::*;
use std::sync::Arc;

const START_MS: i64 = 1_767_000_000_000;

fn tsla() -> Symbol {
    Symbol::new("TSLA")
}

// balance 10,000, entry drop 0.5%, target 0.3%, stop 0.4%, one position, no throttle
fn scenario_config() -> TradingConfig {
    let mut config = TradingConfig::default();
    config.symbols = vec![tsla()];
    config.risk.min_trade_interval_secs = 0;
    config.session.calendar = CalendarKind::AlwaysOn;
    config
}

struct Harness {
    engine: Engine,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(config: TradingConfig, feed: ScriptedFeed, clock: Arc<ManualClock>) -> Self {
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let executor = Arc::new(PaperExecutor::new(dyn_clock, 0));
        let engine = Engine::new(Arc::new(config), Arc::new(feed), executor, clock.now())
            .expect("valid config")
            .with_session(MarketSession::always_on());
        Self { engine, clock }
    }

    fn scripted(config: TradingConfig, prices: &[Decimal]) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
        let feed = ScriptedFeed::new(clock.clone()).with_prices("TSLA", prices);
        Self::new(config, feed, clock)
    }

    async fn tick(&mut self) -> TickReport {
        self.clock.advance_millis(1_000);
        self.engine.run_tick(self.clock.now()).await
    }

    async fn run(&mut self, ticks: usize) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            reports.push(self.tick().await);
        }
        reports
    }
}

#[tokio::test]
async fn dip_entry_then_profit_target() {
    let mut h = Harness::scripted(scenario_config(), &[dec!(100.00), dec!(100.00), dec!(99.50), dec!(99.80)]);

    let reports = h.run(3).await;
    assert_eq!(reports[0].outcome(&tsla()), Some(&SymbolOutcome::Idle));
    assert_eq!(reports[1].outcome(&tsla()), Some(&SymbolOutcome::Idle));
    match reports[2].outcome(&tsla()) {
        Some(SymbolOutcome::Opened { price, quantity }) => {
            assert_eq!(price.value(), dec!(99.50));
            // 10% of 10,000 at 99.50
            assert_eq!(*quantity, 10);
        }
        other => panic!("expected entry, got {:?}", other),
    }

    let report = h.tick().await;
    match report.outcome(&tsla()) {
        Some(SymbolOutcome::Closed { trade, reason }) => {
            assert_eq!(*reason, ExitReason::ProfitTarget);
            assert_eq!(trade.realized_pnl, Some(Money::new(dec!(3.00))));
        }
        other => panic!("expected profit target exit, got {:?}", other),
    }

    let risk = h.engine.risk_state();
    assert_eq!(risk.consecutive_losses, 0);
    assert_eq!(risk.daily_trade_count, 1);
    assert_eq!(risk.current_balance, Money::new(dec!(10_003)));
    assert_eq!(h.engine.ledger().open_count(), 0);
    assert_eq!(h.engine.stats().total_wins, 1);
}

#[tokio::test]
async fn dip_entry_then_stop_loss() {
    let mut h = Harness::scripted(scenario_config(), &[dec!(100.00), dec!(100.00), dec!(99.50), dec!(99.10)]);
    h.run(3).await;
    assert_eq!(h.engine.ledger().open_count(), 1);

    let report = h.tick().await;
    match report.outcome(&tsla()) {
        Some(SymbolOutcome::Closed { trade, reason }) => {
            assert_eq!(*reason, ExitReason::StopLoss);
            assert_eq!(trade.realized_pnl, Some(Money::new(dec!(-4.00))));
        }
        other => panic!("expected stop loss exit, got {:?}", other),
    }
    assert_eq!(h.engine.risk_state().consecutive_losses, 1);
    assert_eq!(h.engine.stats().total_losses, 1);
}

#[tokio::test]
async fn daily_loss_halts_before_the_fifth_entry() {
    let mut config = scenario_config();
    config.risk.max_daily_loss_percent = None;
    config.risk.max_daily_loss_dollars = Some(Money::new(dec!(150)));
    // flat 10 shares per entry so every round trip loses exactly 40
    config.risk.position_size_percent = Percent::new(dec!(50));
    config.risk.max_position_dollars = Some(Money::new(dec!(1_000)));

    let mut prices = vec![dec!(100.00), dec!(100.00)];
    for _ in 0..5 {
        prices.push(dec!(99.50));
        prices.push(dec!(95.50));
    }
    let mut h = Harness::scripted(config, &prices);

    h.run(2).await;
    for round in 1..=4 {
        let entry = h.tick().await;
        assert!(
            matches!(entry.outcome(&tsla()), Some(SymbolOutcome::Opened { quantity: 10, .. })),
            "round {} entry: {:?}",
            round,
            entry
        );
        let exit = h.tick().await;
        match exit.outcome(&tsla()) {
            Some(SymbolOutcome::Closed { trade, .. }) => {
                assert_eq!(trade.realized_pnl, Some(Money::new(dec!(-40))));
            }
            other => panic!("round {} exit: {:?}", round, other),
        }
    }

    // -160 after the fourth close. the halt is already recorded
    let risk = h.engine.risk_state();
    assert_eq!(risk.daily_pnl, Money::new(dec!(-160)));
    assert!(risk.halted);
    assert_eq!(risk.halt_reason, Some(HaltReason::DailyLoss));

    let fifth = h.tick().await;
    assert!(fifth.halted);
    assert_eq!(fifth.opened(), 0);
    assert_eq!(h.engine.ledger().open_count(), 0);

    let halts: Vec<_> = h
        .engine
        .events()
        .filter(|e| matches!(e.payload, EventPayload::HaltTriggered(_)))
        .collect();
    assert_eq!(halts.len(), 1);
}

#[tokio::test]
async fn governor_rejects_entries_after_daily_loss() {
    let mut config = scenario_config();
    config.risk.max_daily_loss_dollars = Some(Money::new(dec!(150)));
    let governor = RiskGovernor::new(config.risk.clone());
    let mut state = RiskState::new(Money::new(dec!(10_000)));
    let now = Timestamp::from_millis(START_MS);

    for _ in 0..4 {
        state.record_close(Money::new(dec!(-40)), now);
    }
    let intent = Intent::Enter {
        symbol: tsla(),
        price: Price::new_unchecked(dec!(99.50)),
        drop: dec!(0.005),
    };
    let decision = governor.evaluate(&mut state, &intent, BookView::default(), now);
    assert_eq!(
        decision,
        RiskDecision::Reject {
            violation: RiskViolation::Halted {
                reason: HaltReason::DailyLoss
            }
        }
    );
    assert!(state.halted);
}

#[tokio::test]
async fn trailing_stop_follows_the_peak() {
    let mut config = scenario_config();
    config.strategy.use_trailing_stop = true;
    config.strategy.trailing_stop_percent = Percent::new(dec!(0.2));
    config.strategy.profit_target_percent = Percent::new(dec!(5));

    let prices = [dec!(100.00), dec!(99.50), dec!(100.50), dec!(101.00), dec!(100.70)];
    let mut h = Harness::scripted(config, &prices);
    h.run(4).await;

    let peak = h.engine.ledger().position(&tsla()).and_then(|p| p.peak_price);
    assert_eq!(peak, Some(Price::new_unchecked(dec!(101.00))));

    // 101.00 -> 100.70 is a 0.297% retrace
    let report = h.tick().await;
    assert!(matches!(
        report.outcome(&tsla()),
        Some(SymbolOutcome::Closed {
            reason: ExitReason::TrailingStop,
            ..
        })
    ));
}

#[tokio::test]
async fn feed_outage_on_one_symbol_does_not_block_another() {
    let mut config = scenario_config();
    config.symbols = vec![Symbol::new("TSLA"), Symbol::new("NVDA")];
    config.risk.max_positions = 2;

    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
    let feed = ScriptedFeed::new(clock.clone())
        .with_steps("TSLA", [Some(dec!(100)), None, Some(dec!(99.50))])
        .with_prices("NVDA", &[dec!(450), dec!(447.75), dec!(447.75)]);
    let mut h = Harness::new(config, feed, clock);

    h.tick().await;
    let second = h.tick().await;
    assert!(matches!(
        second.outcome(&tsla()),
        Some(SymbolOutcome::FeedFailed { .. })
    ));
    assert!(matches!(
        second.outcome(&Symbol::new("NVDA")),
        Some(SymbolOutcome::Opened { .. })
    ));
    assert_eq!(second.feed_failures(), 1);

    // recovers on the next tick
    let third = h.tick().await;
    assert!(matches!(third.outcome(&tsla()), Some(SymbolOutcome::Opened { .. })));
    assert_eq!(h.engine.ledger().open_count(), 2);
}

#[tokio::test]
async fn position_limit_rejects_second_symbol() {
    let mut config = scenario_config();
    config.symbols = vec![Symbol::new("TSLA"), Symbol::new("AMD")];

    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
    let feed = ScriptedFeed::new(clock.clone())
        .with_prices("TSLA", &[dec!(100), dec!(99.50)])
        .with_prices("AMD", &[dec!(150), dec!(149.25)]);
    let mut h = Harness::new(config, feed, clock);

    h.tick().await;
    let report = h.tick().await;
    assert!(matches!(report.outcome(&tsla()), Some(SymbolOutcome::Opened { .. })));
    assert!(matches!(
        report.outcome(&Symbol::new("AMD")),
        Some(SymbolOutcome::Rejected {
            violation: RiskViolation::PositionLimit { open: 1, max: 1 }
        })
    ));
}

#[tokio::test]
async fn closing_blackout_forces_exit() {
    let mut config = scenario_config();
    config.session.calendar = CalendarKind::UsEquities;

    // Monday 2026-03-02, 10:30 New York (EST)
    let open = Utc.with_ymd_and_hms(2026, 3, 2, 15, 30, 0).single().expect("valid time");
    let clock = Arc::new(ManualClock::new(Timestamp::from_datetime(open)));
    let feed = ScriptedFeed::new(clock.clone()).with_prices("TSLA", &[dec!(100), dec!(99.50), dec!(99.60)]);
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let session = MarketSession::new(&config.session);
    let mut engine = Engine::new(
        Arc::new(config),
        Arc::new(feed),
        Arc::new(PaperExecutor::new(dyn_clock, 0)),
        clock.now(),
    )
    .expect("valid config")
    .with_session(session);

    for _ in 0..2 {
        clock.advance_millis(1_000);
        engine.run_tick(clock.now()).await;
    }
    assert_eq!(engine.ledger().open_count(), 1);

    // 15:45 New York, inside the 30 minute closing blackout
    let late = Utc.with_ymd_and_hms(2026, 3, 2, 20, 45, 0).single().expect("valid time");
    clock.set(Timestamp::from_datetime(late));
    let report = engine.run_tick(clock.now()).await;
    assert!(matches!(
        report.outcome(&tsla()),
        Some(SymbolOutcome::Closed {
            reason: ExitReason::EndOfDay,
            ..
        })
    ));
}

#[tokio::test]
async fn zero_closing_blackout_exits_at_the_bell() {
    let mut config = scenario_config();
    config.session.calendar = CalendarKind::UsEquities;
    config.session.closing_blackout_minutes = 0;

    // Monday 2026-03-02, 10:30 New York (EST)
    let open = Utc.with_ymd_and_hms(2026, 3, 2, 15, 30, 0).single().expect("valid time");
    let clock = Arc::new(ManualClock::new(Timestamp::from_datetime(open)));
    let feed = ScriptedFeed::new(clock.clone()).with_prices("TSLA", &[dec!(100), dec!(99.50), dec!(99.60)]);
    let session = MarketSession::new(&config.session);
    let mut h = Harness::new(config, feed, clock);
    h.engine = h.engine.with_session(session);

    h.run(2).await;
    assert_eq!(h.engine.ledger().open_count(), 1);

    // 15:59 New York, still regular trading with no blackout
    let before = Utc.with_ymd_and_hms(2026, 3, 2, 20, 59, 0).single().expect("valid time");
    h.clock.set(Timestamp::from_datetime(before));
    let report = h.engine.run_tick(h.clock.now()).await;
    assert_eq!(report.outcome(&tsla()), Some(&SymbolOutcome::Idle));
    assert_eq!(h.engine.ledger().open_count(), 1);

    // 16:00 New York, the close itself
    let bell = Utc.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).single().expect("valid time");
    h.clock.set(Timestamp::from_datetime(bell));
    let report = h.engine.run_tick(h.clock.now()).await;
    assert!(matches!(
        report.outcome(&tsla()),
        Some(SymbolOutcome::Closed {
            reason: ExitReason::EndOfDay,
            ..
        })
    ));
    assert_eq!(h.engine.ledger().open_count(), 0);
}

#[tokio::test]
async fn close_all_uses_last_mark_when_feed_is_down() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
    let feed = ScriptedFeed::new(clock.clone()).with_steps("TSLA", [Some(dec!(100)), Some(dec!(99.50)), None]);
    let mut h = Harness::new(scenario_config(), feed, clock);
    h.run(2).await;
    assert_eq!(h.engine.ledger().open_count(), 1);

    h.clock.advance_millis(1_000);
    let report = h.engine.close_all_positions(h.clock.now(), ExitReason::Manual).await;
    match report.outcome(&tsla()) {
        Some(SymbolOutcome::Closed { trade, reason }) => {
            assert_eq!(*reason, ExitReason::Manual);
            assert_eq!(trade.price.value(), dec!(99.50));
            assert_eq!(trade.realized_pnl, Some(Money::zero()));
        }
        other => panic!("expected manual close, got {:?}", other),
    }
    // a flat close is neither a win nor a loss
    assert_eq!(h.engine.risk_state().consecutive_losses, 0);
}

#[tokio::test]
async fn rejected_reconfigure_keeps_prior_snapshot() {
    let mut h = Harness::scripted(scenario_config(), &[dec!(100)]);

    let mut bad = scenario_config();
    bad.risk.max_drawdown_percent = Percent::new(dec!(45));
    let err = h.engine.reconfigure(bad).unwrap_err();
    assert!(matches!(err, EngineError::Config(ConfigError::OutOfRange { .. })));
    assert_eq!(h.engine.config().risk.max_drawdown_percent, Percent::new(dec!(10)));
    assert!(h
        .engine
        .events()
        .any(|e| matches!(e.payload, EventPayload::ConfigRejected(_))));

    let mut good = scenario_config();
    good.symbols = vec![Symbol::new("nvda")];
    let applied = h.engine.reconfigure(good).expect("valid config");
    assert_eq!(applied.symbols, vec![Symbol::new("NVDA")]);
}

#[tokio::test]
async fn reconfigure_keeps_a_restored_drawdown_halt() {
    let h = Harness::scripted(scenario_config(), &[dec!(100)]);
    let start = h.clock.now();

    let mut risk = RiskState::new(Money::new(dec!(10_000)));
    risk.trigger_halt(HaltReason::Drawdown, start, 0);
    let mut engine = h.engine.with_state(risk, PositionLedger::new(start));

    let mut update = scenario_config();
    update.starting_balance = Money::new(dec!(8_500));
    engine.reconfigure(update).expect("valid config");

    let risk = engine.risk_state();
    assert!(risk.halted);
    assert_eq!(risk.halt_reason, Some(HaltReason::Drawdown));
    assert_eq!(risk.starting_balance, Money::new(dec!(10_000)));
    assert_eq!(engine.risk_mode(), RiskMode::Halted);
}

#[tokio::test]
async fn reconfigure_moves_an_untouched_baseline() {
    let mut h = Harness::scripted(scenario_config(), &[dec!(100)]);
    let day = h.engine.risk_state().session_day;

    let mut update = scenario_config();
    update.starting_balance = Money::new(dec!(8_500));
    h.engine.reconfigure(update).expect("valid config");

    let risk = h.engine.risk_state();
    assert_eq!(risk.starting_balance, Money::new(dec!(8_500)));
    assert_eq!(risk.current_balance, Money::new(dec!(8_500)));
    assert_eq!(risk.session_day, day);
    assert!(!risk.halted);
}

#[tokio::test]
async fn acknowledging_a_drawdown_halt_needs_a_reset() {
    let h = Harness::scripted(scenario_config(), &[dec!(100)]);
    let now = h.clock.now();

    let mut risk = RiskState::new(Money::new(dec!(10_000)));
    risk.trigger_halt(HaltReason::Drawdown, now, 0);
    let mut engine = h.engine.with_state(risk, PositionLedger::new(now));

    let err = engine.acknowledge_halt(now).unwrap_err();
    assert!(matches!(err, EngineError::Risk(RiskError::ResetRequired)));
    assert!(engine.risk_state().halted);

    engine.reset_halt(false);
    assert!(!engine.risk_state().halted);
}
