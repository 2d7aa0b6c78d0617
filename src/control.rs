// 12.0 control.rs: the run state machine and the operator surface.
// Stopped -> Running -> Stopped, explicit only. ticks run strictly one after another
// under the engine lock; admin operations take the same lock so they land between ticks.
// status reads come from a watch channel and never wait on a tick.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::{TradingConfig, TradingMode};
use crate::engine::{Engine, EngineError, TickReport};
use crate::events::{Event, EventId};
use crate::ledger::TradingStats;
use crate::position::{Position, Trade};
use crate::risk::{HaltReason, RiskMode};
use crate::session::Clock;
use crate::signal::ExitReason;
use crate::types::{Money, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    Running,
}

/// Latest committed view of the engine. published after every tick and admin action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub run_state: RunState,
    pub mode: TradingMode,
    pub dry_run: bool,
    pub starting_balance: Money,
    pub balance: Money,
    pub daily_pnl: Money,
    pub unrealized_pnl: Money,
    pub daily_trade_count: u32,
    pub consecutive_losses: u32,
    pub risk_mode: RiskMode,
    pub halted: bool,
    pub halt_reason: Option<HaltReason>,
    pub positions: Vec<Position>,
    pub stats: TradingStats,
    pub tick_count: u64,
    pub as_of: Timestamp,
}

impl StatusSnapshot {
    fn capture(engine: &Engine, run_state: RunState) -> Self {
        let risk = engine.risk_state();
        Self {
            run_state,
            mode: engine.config().mode,
            dry_run: engine.is_dry_run(),
            starting_balance: risk.starting_balance,
            balance: risk.current_balance,
            daily_pnl: risk.daily_pnl,
            unrealized_pnl: engine.unrealized_pnl(),
            daily_trade_count: risk.daily_trade_count,
            consecutive_losses: risk.consecutive_losses,
            risk_mode: engine.risk_mode(),
            halted: risk.halted,
            halt_reason: risk.halt_reason,
            positions: engine.positions(),
            stats: engine.stats().clone(),
            tick_count: engine.tick_count(),
            as_of: engine.time(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("control loop is already running")]
    AlreadyRunning,

    #[error("control loop is not running")]
    NotRunning,

    #[error("{0} is only allowed while stopped")]
    RequiresStopped(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("control task failed: {0}")]
    Task(String),
}

// shared between the handle and the spawned loop
struct Shared {
    engine: Mutex<Engine>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    wake: Notify,
    status: watch::Sender<StatusSnapshot>,
    config: watch::Sender<Arc<TradingConfig>>,
}

impl Shared {
    fn run_state(&self) -> RunState {
        if self.running.load(Ordering::SeqCst) {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    fn publish(&self, engine: &Engine) {
        self.status.send_replace(StatusSnapshot::capture(engine, self.run_state()));
    }
}

pub struct ControlLoop {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlLoop {
    pub fn new(engine: Engine, clock: Arc<dyn Clock>) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::capture(&engine, RunState::Stopped));
        let (config, _) = watch::channel(Arc::clone(engine.config()));
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                clock,
                running: AtomicBool::new(false),
                wake: Notify::new(),
                status,
                config,
            }),
            task: Mutex::new(None),
        }
    }

    // 12.1: spawn the tick loop
    pub async fn start(&self) -> Result<(), ControlError> {
        let mut task = self.task.lock().await;
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(ControlError::AlreadyRunning);
        }
        // a finished task from an earlier run
        if let Some(old) = task.take() {
            if let Err(e) = old.await {
                warn!(error = %e, "previous control task ended abnormally");
            }
        }

        let shared = Arc::clone(&self.shared);
        {
            let engine = shared.engine.lock().await;
            shared.publish(&engine);
            info!(mode = %engine.config().mode, "control loop started");
        }
        *task = Some(tokio::spawn(run_loop(shared)));
        Ok(())
    }

    /// Ask the loop to stop and wait for it. the in-flight tick runs to completion.
    pub async fn stop(&self) -> Result<(), ControlError> {
        let mut task = self.task.lock().await;
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Err(ControlError::NotRunning);
        }
        self.shared.wake.notify_one();

        if let Some(handle) = task.take() {
            handle.await.map_err(|e| ControlError::Task(e.to_string()))?;
        }
        info!("control loop stopped");
        Ok(())
    }

    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    // 12.2: reads. never wait on the engine lock
    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status.subscribe()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.shared.status.borrow().positions.clone()
    }

    pub fn stats(&self) -> TradingStats {
        self.shared.status.borrow().stats.clone()
    }

    pub fn config(&self) -> Arc<TradingConfig> {
        Arc::clone(&self.shared.config.borrow())
    }

    pub async fn trades(&self) -> Vec<Trade> {
        self.shared.engine.lock().await.trades().to_vec()
    }

    pub async fn events_since(&self, after: EventId) -> Vec<Event> {
        self.shared.engine.lock().await.events_since(after)
    }

    // 12.3: writes
    pub async fn update_config(&self, config: TradingConfig) -> Result<(), ControlError> {
        if self.is_running() {
            warn!("configuration update rejected while running");
            return Err(ControlError::RequiresStopped("configuration update"));
        }
        let mut engine = self.shared.engine.lock().await;
        let applied = engine.reconfigure(config)?;
        self.shared.config.send_replace(applied);
        self.shared.publish(&engine);
        Ok(())
    }

    /// Exit every open position now. waits for an in-flight tick, then runs
    /// before the next one.
    pub async fn close_all(&self) -> TickReport {
        let mut engine = self.shared.engine.lock().await;
        info!(open = engine.ledger().open_count(), "closing all positions");
        let report = engine
            .close_all_positions(self.shared.clock.now(), ExitReason::Manual)
            .await;
        self.shared.publish(&engine);
        report
    }

    pub async fn acknowledge_halt(&self) -> Result<(), ControlError> {
        let mut engine = self.shared.engine.lock().await;
        let result = engine.acknowledge_halt(self.shared.clock.now());
        self.shared.publish(&engine);
        Ok(result?)
    }

    pub async fn reset_halt(&self, rebaseline: bool) {
        let mut engine = self.shared.engine.lock().await;
        engine.reset_halt(rebaseline);
        self.shared.publish(&engine);
    }

    pub async fn reset_daily_stats(&self) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::RequiresStopped("daily statistics reset"));
        }
        let mut engine = self.shared.engine.lock().await;
        engine.reset_daily_stats(self.shared.clock.now());
        self.shared.publish(&engine);
        Ok(())
    }

    /// Run a single tick by hand. backtests and tests drive the engine this way.
    pub async fn step(&self) -> Result<TickReport, ControlError> {
        if self.is_running() {
            return Err(ControlError::RequiresStopped("manual step"));
        }
        let mut engine = self.shared.engine.lock().await;
        let report = engine.run_tick(self.shared.clock.now()).await;
        self.shared.publish(&engine);
        Ok(report)
    }
}

// 12.4: the loop body. the stop flag is checked before every tick and again
// once the engine lock is held, since an admin call may own it when stop lands
async fn run_loop(shared: Arc<Shared>) {
    let period = shared.config.borrow().execution.tick_interval();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                let mut engine = shared.engine.lock().await;
                if !shared.running.load(Ordering::SeqCst) {
                    drop(engine);
                    break;
                }
                let report = engine.run_tick(shared.clock.now()).await;
                if report.escalations() > 0 {
                    error!(tick = report.tick, escalations = report.escalations(), "exit failures this tick");
                }
                shared.publish(&engine);
            }
            _ = shared.wake.notified() => {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    let mut engine = shared.engine.lock().await;
    if engine.config().session.close_at_eod && engine.ledger().open_count() > 0 {
        info!(open = engine.ledger().open_count(), "closing positions on shutdown");
        let report = engine
            .close_all_positions(shared.clock.now(), ExitReason::Shutdown)
            .await;
        if report.escalations() > 0 {
            error!(escalations = report.escalations(), "positions left open after shutdown");
        }
    }
    shared.publish(&engine);
}
