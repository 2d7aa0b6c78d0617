//! Risk governor and circuit breakers.
//!
//! Every intent passes through the governor before it reaches the broker. Checks run
//! in a fixed order and the first breaker that trips decides the recorded halt reason.
//! Drawdown halts are terminal until an operator resets them; daily loss and loss
//! streak halts expire after a cooldown. Exits are never blocked here: a position
//! stranded under a halt is worse than the halt itself.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::config::RiskParams;
use crate::signal::Intent;
use crate::types::{Money, Percent, Price, Timestamp};

/// Process wide risk aggregate. Passed explicitly into every governor call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Baseline for drawdown and percent daily loss. Survives daily resets.
    pub starting_balance: Money,
    /// Starting balance plus every realized P&L since.
    pub current_balance: Money,
    pub daily_pnl: Money,
    /// Completed round trips this session.
    pub daily_trade_count: u32,
    pub consecutive_losses: u32,
    /// Last fill of either side. drives the frequency throttle.
    pub last_trade_at: Option<Timestamp>,
    pub cooldown_until: Option<Timestamp>,
    pub halted: bool,
    pub halt_reason: Option<HaltReason>,
    pub halted_at: Option<Timestamp>,
    /// Trading day the daily counters belong to.
    pub session_day: Option<NaiveDate>,
}

impl RiskState {
    pub fn new(starting_balance: Money) -> Self {
        Self {
            starting_balance,
            current_balance: starting_balance,
            daily_pnl: Money::zero(),
            daily_trade_count: 0,
            consecutive_losses: 0,
            last_trade_at: None,
            cooldown_until: None,
            halted: false,
            halt_reason: None,
            halted_at: None,
            session_day: None,
        }
    }

    /// Drop from the starting balance as a fraction. negative when up.
    pub fn drawdown(&self) -> Decimal {
        if !self.starting_balance.is_positive() {
            return Decimal::ZERO;
        }
        (self.starting_balance.value() - self.current_balance.value()) / self.starting_balance.value()
    }

    pub fn record_fill(&mut self, at: Timestamp) {
        self.last_trade_at = Some(at);
    }

    // a zero pnl close leaves the streak alone
    pub fn record_close(&mut self, pnl: Money, at: Timestamp) {
        self.current_balance = self.current_balance.add(pnl);
        self.daily_pnl = self.daily_pnl.add(pnl);
        self.daily_trade_count += 1;
        self.last_trade_at = Some(at);

        if pnl.is_positive() {
            self.consecutive_losses = 0;
        } else if pnl.is_negative() {
            self.consecutive_losses += 1;
        }
    }

    /// Trigger a halt. A timed halt never overrides a drawdown halt and an
    /// active halt is not extended by a second timed breach.
    pub fn trigger_halt(&mut self, reason: HaltReason, at: Timestamp, cooldown_ms: i64) -> bool {
        if self.halted {
            let escalate = reason == HaltReason::Drawdown && self.halt_reason != Some(HaltReason::Drawdown);
            if !escalate {
                return false;
            }
        }
        self.halted = true;
        self.halt_reason = Some(reason);
        self.halted_at = Some(at);
        self.cooldown_until = match reason {
            HaltReason::Drawdown => None,
            _ => Some(at.plus_millis(cooldown_ms)),
        };
        true
    }

    pub fn cooldown_elapsed(&self, now: Timestamp) -> bool {
        match self.cooldown_until {
            Some(until) => now >= until,
            None => false,
        }
    }

    pub fn clear_halt(&mut self) {
        if self.halt_reason == Some(HaltReason::ConsecutiveLosses) {
            self.consecutive_losses = 0;
        }
        self.halted = false;
        self.halt_reason = None;
        self.halted_at = None;
        self.cooldown_until = None;
    }

    /// Nothing traded and nothing tripped since the baseline was set.
    pub fn is_pristine(&self) -> bool {
        !self.halted
            && self.halt_reason.is_none()
            && self.current_balance == self.starting_balance
            && self.daily_pnl == Money::zero()
            && self.daily_trade_count == 0
            && self.consecutive_losses == 0
            && self.last_trade_at.is_none()
    }

    // daily counters only. baseline and drawdown halt untouched
    pub fn reset_daily(&mut self) {
        self.daily_pnl = Money::zero();
        self.daily_trade_count = 0;
    }
}

/// Why trading was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Terminal. needs an explicit reset.
    Drawdown,
    DailyLoss,
    ConsecutiveLosses,
}

impl HaltReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HaltReason::Drawdown)
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Drawdown => f.write_str("max drawdown reached"),
            HaltReason::DailyLoss => f.write_str("daily loss limit reached"),
            HaltReason::ConsecutiveLosses => f.write_str("consecutive loss limit reached"),
        }
    }
}

/// Governor state as the operator sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RiskMode {
    Active,
    /// Timed suspension. clears itself at `until` unless acknowledgement is required.
    Cooldown { until: Timestamp },
    /// Cooldown is over but the operator has not acknowledged it.
    AwaitingAcknowledgement,
    /// Drawdown kill switch.
    Halted,
}

/// Why an intent was turned down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum RiskViolation {
    Halted { reason: HaltReason },
    DailyTradeLimit { count: u32, max: u32 },
    PositionLimit { open: usize, max: u32 },
    InsufficientSize,
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskViolation::Halted { reason } => write!(f, "halted: {}", reason),
            RiskViolation::DailyTradeLimit { count, max } => write!(f, "daily trades {}/{}", count, max),
            RiskViolation::PositionLimit { open, max } => write!(f, "open positions {}/{}", open, max),
            RiskViolation::InsufficientSize => f.write_str("order size rounds to zero shares"),
        }
    }
}

/// Outcome of a risk evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RiskDecision {
    Approve { quantity: u64 },
    Reject { violation: RiskViolation },
    /// Not a rejection. the same intent may pass on a later tick.
    Defer { retry_at: Timestamp },
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approve { .. })
    }
}

/// Book facts the governor needs next to the aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookView {
    pub open_positions: usize,
    /// Quantity of the position an exit would close.
    pub exit_quantity: u64,
}

/// Errors from operator actions on the governor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("cooldown still active until {until}")]
    CooldownActive { until: Timestamp },

    #[error("drawdown halt requires an explicit reset")]
    ResetRequired,
}

#[derive(Debug, Clone)]
pub struct RiskGovernor {
    params: RiskParams,
}

impl RiskGovernor {
    pub fn new(params: RiskParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn reconfigure(&mut self, params: RiskParams) {
        self.params = params;
    }

    pub fn mode(&self, state: &RiskState, now: Timestamp) -> RiskMode {
        if !state.halted {
            return RiskMode::Active;
        }
        match (state.halt_reason, state.cooldown_until) {
            (Some(HaltReason::Drawdown), _) | (None, _) | (_, None) => RiskMode::Halted,
            (Some(_), Some(until)) if now < until => RiskMode::Cooldown { until },
            (Some(_), Some(_)) => RiskMode::AwaitingAcknowledgement,
        }
    }

    // 6.3: the nine checks in order
    pub fn evaluate(&self, state: &mut RiskState, intent: &Intent, book: BookView, now: Timestamp) -> RiskDecision {
        self.expire_cooldown(state, now);
        let is_exit = intent.is_exit();

        // 1. active halt or cooldown. exits still go through
        // a halt restored without its reason is treated as terminal
        if state.halted && !is_exit {
            let reason = state.halt_reason.unwrap_or(HaltReason::Drawdown);
            return RiskDecision::Reject {
                violation: RiskViolation::Halted { reason },
            };
        }

        // 2-4. breakers. record the halt even when the intent is an exit
        if let Some(reason) = self.check_breakers(state) {
            self.trip(state, reason, now);
            if !is_exit {
                return RiskDecision::Reject {
                    violation: RiskViolation::Halted { reason },
                };
            }
        }

        if is_exit {
            return RiskDecision::Approve {
                quantity: book.exit_quantity,
            };
        }

        // 5. daily trade count
        if state.daily_trade_count >= self.params.max_daily_trades {
            return RiskDecision::Reject {
                violation: RiskViolation::DailyTradeLimit {
                    count: state.daily_trade_count,
                    max: self.params.max_daily_trades,
                },
            };
        }

        // 6. position count
        if book.open_positions >= self.params.max_positions as usize {
            return RiskDecision::Reject {
                violation: RiskViolation::PositionLimit {
                    open: book.open_positions,
                    max: self.params.max_positions,
                },
            };
        }

        // 7. frequency throttle
        if let Some(last) = state.last_trade_at {
            let min_interval = self.params.min_trade_interval_ms();
            if now.millis_since(last) < min_interval {
                return RiskDecision::Defer {
                    retry_at: last.plus_millis(min_interval),
                };
            }
        }

        // 8. sizing
        let quantity = self.size_order(state.current_balance, intent.price());
        if quantity == 0 {
            return RiskDecision::Reject {
                violation: RiskViolation::InsufficientSize,
            };
        }

        // 9.
        RiskDecision::Approve { quantity }
    }

    /// Breakers 2-4 in priority order. Pure read.
    pub fn check_breakers(&self, state: &RiskState) -> Option<HaltReason> {
        let p = &self.params;

        if state.drawdown() >= p.max_drawdown_percent.as_fraction() {
            return Some(HaltReason::Drawdown);
        }

        if let Some(limit) = p.max_daily_loss_percent {
            if state.starting_balance.is_positive() {
                let daily = Percent::from_fraction(state.daily_pnl.value() / state.starting_balance.value());
                if daily.value() <= -limit.value() {
                    return Some(HaltReason::DailyLoss);
                }
            }
        }
        if let Some(limit) = p.max_daily_loss_dollars {
            if state.daily_pnl.value() <= -limit.value() {
                return Some(HaltReason::DailyLoss);
            }
        }

        if state.consecutive_losses >= p.max_consecutive_losses {
            return Some(HaltReason::ConsecutiveLosses);
        }

        None
    }

    /// Run the breakers outside an intent. the loop calls this once per tick
    /// so halts surface even on ticks with nothing to trade.
    pub fn refresh(&self, state: &mut RiskState, now: Timestamp) -> Option<HaltReason> {
        self.expire_cooldown(state, now);
        let reason = self.check_breakers(state)?;
        if self.trip(state, reason, now) {
            Some(reason)
        } else {
            None
        }
    }

    fn trip(&self, state: &mut RiskState, reason: HaltReason, now: Timestamp) -> bool {
        let tripped = state.trigger_halt(reason, now, self.params.cooldown_ms());
        if tripped {
            warn!(
                %reason,
                balance = %state.current_balance,
                daily_pnl = %state.daily_pnl,
                consecutive_losses = state.consecutive_losses,
                cooldown_until = ?state.cooldown_until,
                "trading halted"
            );
        }
        tripped
    }

    // timed halts clear on expiry unless the operator has to acknowledge
    fn expire_cooldown(&self, state: &mut RiskState, now: Timestamp) {
        if !state.halted || self.params.require_manual_restart {
            return;
        }
        if state.cooldown_elapsed(now) {
            info!(reason = ?state.halt_reason, "cooldown expired, trading resumed");
            state.clear_halt();
        }
    }

    /// Operator acknowledgement after a cooldown.
    pub fn acknowledge(&self, state: &mut RiskState, now: Timestamp) -> Result<(), RiskError> {
        if !state.halted {
            return Ok(());
        }
        if state.halt_reason.map(|r| r.is_terminal()).unwrap_or(true) {
            return Err(RiskError::ResetRequired);
        }
        if let Some(until) = state.cooldown_until {
            if now < until {
                return Err(RiskError::CooldownActive { until });
            }
        }
        info!(reason = ?state.halt_reason, "halt acknowledged");
        state.clear_halt();
        Ok(())
    }

    /// Explicit reset of any halt, including drawdown. `rebaseline` moves the
    /// drawdown baseline to the current balance.
    pub fn reset_halt(&self, state: &mut RiskState, rebaseline: bool) {
        info!(reason = ?state.halt_reason, rebaseline, "halt reset");
        state.clear_halt();
        state.consecutive_losses = 0;
        if rebaseline {
            state.starting_balance = state.current_balance;
        }
    }

    /// Roll daily counters when the trading day changes. true on rollover.
    pub fn roll_session(&self, state: &mut RiskState, day: NaiveDate) -> bool {
        match state.session_day {
            Some(current) if current == day => false,
            Some(_) => {
                info!(%day, daily_pnl = %state.daily_pnl, trades = state.daily_trade_count, "session rollover");
                state.reset_daily();
                state.session_day = Some(day);
                true
            }
            None => {
                state.session_day = Some(day);
                false
            }
        }
    }

    // 6.4: notional = min(percent cap, dollar cap), qty = floor(notional / price) capped by shares
    pub fn size_order(&self, balance: Money, price: Price) -> u64 {
        if !balance.is_positive() {
            return 0;
        }
        let mut notional = balance.mul(self.params.position_size_percent.as_fraction());
        if let Some(cap) = self.params.max_position_dollars {
            notional = notional.min(cap);
        }

        let shares = (notional.value() / price.value()).floor().to_u64().unwrap_or(0);
        match self.params.max_shares_per_trade {
            Some(cap) => shares.min(cap),
            None => shares,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ExitReason;
    use crate::types::Symbol;
    use rust_decimal_macros::dec;

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    fn enter(price: Decimal) -> Intent {
        Intent::Enter {
            symbol: Symbol::new("TSLA"),
            price: px(price),
            drop: dec!(0.005),
        }
    }

    fn exit(price: Decimal) -> Intent {
        Intent::Exit {
            symbol: Symbol::new("TSLA"),
            price: px(price),
            reason: ExitReason::StopLoss,
        }
    }

    fn flat() -> BookView {
        BookView {
            open_positions: 0,
            exit_quantity: 0,
        }
    }

    fn holding(qty: u64) -> BookView {
        BookView {
            open_positions: 1,
            exit_quantity: qty,
        }
    }

    fn governor() -> RiskGovernor {
        let mut params = RiskParams::default();
        params.min_trade_interval_secs = 0;
        RiskGovernor::new(params)
    }

    fn state() -> RiskState {
        RiskState::new(Money::new(dec!(10_000)))
    }

    #[test]
    fn test_approve_with_default_sizing() {
        let gov = governor();
        let mut st = state();
        // 10% of 10,000 at 99.50 = 10 shares
        let decision = gov.evaluate(&mut st, &enter(dec!(99.50)), flat(), Timestamp(0));
        assert_eq!(decision, RiskDecision::Approve { quantity: 10 });
    }

    #[test]
    fn test_sizing_caps() {
        let mut params = RiskParams::default();
        params.position_size_percent = Percent::new(dec!(50));
        params.max_position_dollars = Some(Money::new(dec!(1_000)));
        let gov = RiskGovernor::new(params.clone());
        assert_eq!(gov.size_order(Money::new(dec!(10_000)), px(dec!(99))), 10);

        params.max_shares_per_trade = Some(3);
        let gov = RiskGovernor::new(params);
        assert_eq!(gov.size_order(Money::new(dec!(10_000)), px(dec!(99))), 3);
        assert_eq!(gov.size_order(Money::new(dec!(-5)), px(dec!(99))), 0);
    }

    #[test]
    fn test_insufficient_size_rejected() {
        let gov = governor();
        let mut st = state();
        let decision = gov.evaluate(&mut st, &enter(dec!(5000)), flat(), Timestamp(0));
        assert_eq!(
            decision,
            RiskDecision::Reject {
                violation: RiskViolation::InsufficientSize
            }
        );
    }

    #[test]
    fn test_position_limit_blocks_enter_only() {
        let gov = governor();
        let mut st = state();
        let decision = gov.evaluate(&mut st, &enter(dec!(100)), holding(10), Timestamp(0));
        assert!(matches!(
            decision,
            RiskDecision::Reject {
                violation: RiskViolation::PositionLimit { open: 1, max: 1 }
            }
        ));
        let decision = gov.evaluate(&mut st, &exit(dec!(100)), holding(10), Timestamp(0));
        assert_eq!(decision, RiskDecision::Approve { quantity: 10 });
    }

    #[test]
    fn test_daily_trade_limit_allows_exit() {
        let gov = governor();
        let mut st = state();
        st.daily_trade_count = 100;
        assert!(matches!(
            gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(0)),
            RiskDecision::Reject {
                violation: RiskViolation::DailyTradeLimit { .. }
            }
        ));
        assert!(gov
            .evaluate(&mut st, &exit(dec!(100)), holding(5), Timestamp(0))
            .is_approved());
    }

    #[test]
    fn test_frequency_throttle_defers() {
        let gov = RiskGovernor::new(RiskParams::default());
        let mut st = state();
        st.record_fill(Timestamp(10_000));
        let decision = gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(20_000));
        assert_eq!(
            decision,
            RiskDecision::Defer {
                retry_at: Timestamp(40_000)
            }
        );
        assert!(gov
            .evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(40_000))
            .is_approved());
    }

    #[test]
    fn test_drawdown_is_terminal() {
        let mut params = RiskParams::default();
        params.min_trade_interval_secs = 0;
        params.max_daily_loss_percent = None;
        let gov = RiskGovernor::new(params);
        let mut st = state();
        st.record_close(Money::new(dec!(-1_000)), Timestamp(0));
        let decision = gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(1));
        assert_eq!(
            decision,
            RiskDecision::Reject {
                violation: RiskViolation::Halted {
                    reason: HaltReason::Drawdown
                }
            }
        );
        assert_eq!(gov.mode(&st, Timestamp(i64::MAX)), RiskMode::Halted);
        assert_eq!(gov.acknowledge(&mut st, Timestamp(i64::MAX)), Err(RiskError::ResetRequired));

        // reset without rebaseline re-trips on the next check
        gov.reset_halt(&mut st, false);
        assert!(!gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(2)).is_approved());

        gov.reset_halt(&mut st, true);
        assert_eq!(st.starting_balance, Money::new(dec!(9_000)));
        assert!(gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(3)).is_approved());
    }

    #[test]
    fn test_daily_loss_dollars_halts_then_cooldown() {
        let mut params = RiskParams::default();
        params.min_trade_interval_secs = 0;
        params.max_daily_loss_dollars = Some(Money::new(dec!(150)));
        params.require_manual_restart = false;
        params.cooldown_minutes = 10;
        let gov = RiskGovernor::new(params);
        let mut st = state();

        st.record_close(Money::new(dec!(-160)), Timestamp(0));
        let decision = gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(1_000));
        assert!(matches!(
            decision,
            RiskDecision::Reject {
                violation: RiskViolation::Halted {
                    reason: HaltReason::DailyLoss
                }
            }
        ));
        assert_eq!(
            gov.mode(&st, Timestamp(2_000)),
            RiskMode::Cooldown {
                until: Timestamp(601_000)
            }
        );

        // daily pnl is still below the limit, so expiry re-trips
        assert!(!gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(601_000)).is_approved());
        assert!(st.halted);

        // new session clears the daily figure
        st.reset_daily();
        assert!(gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(1_300_000)).is_approved());
    }

    #[test]
    fn test_consecutive_losses_with_manual_restart() {
        let gov = governor();
        let mut st = state();
        for i in 0..5 {
            st.record_close(Money::new(dec!(-1)), Timestamp(i));
        }
        assert_eq!(st.consecutive_losses, 5);
        assert_eq!(gov.refresh(&mut st, Timestamp(10)), Some(HaltReason::ConsecutiveLosses));
        assert_eq!(gov.refresh(&mut st, Timestamp(11)), None);

        let until = Timestamp(10 + 60 * 60_000);
        assert_eq!(gov.acknowledge(&mut st, Timestamp(20)), Err(RiskError::CooldownActive { until }));

        // expired but still held for acknowledgement
        assert!(!gov.evaluate(&mut st, &enter(dec!(100)), flat(), until).is_approved());
        assert_eq!(gov.mode(&st, until), RiskMode::AwaitingAcknowledgement);

        gov.acknowledge(&mut st, until).unwrap();
        assert_eq!(st.consecutive_losses, 0);
        assert!(gov.evaluate(&mut st, &enter(dec!(100)), flat(), until).is_approved());
    }

    #[test]
    fn test_exit_approved_while_halted_and_breaker_recorded() {
        let gov = governor();
        let mut st = state();
        st.consecutive_losses = 5;
        let decision = gov.evaluate(&mut st, &exit(dec!(100)), holding(7), Timestamp(0));
        assert_eq!(decision, RiskDecision::Approve { quantity: 7 });
        assert!(st.halted);
        assert_eq!(st.halt_reason, Some(HaltReason::ConsecutiveLosses));
    }

    #[test]
    fn test_halt_without_reason_blocks_entry() {
        let gov = governor();
        let mut st = state();
        st.halted = true;
        let decision = gov.evaluate(&mut st, &enter(dec!(100)), flat(), Timestamp(0));
        assert_eq!(
            decision,
            RiskDecision::Reject {
                violation: RiskViolation::Halted {
                    reason: HaltReason::Drawdown
                }
            }
        );
        // exits still go through
        let decision = gov.evaluate(&mut st, &exit(dec!(100)), holding(3), Timestamp(1));
        assert_eq!(decision, RiskDecision::Approve { quantity: 3 });
    }

    #[test]
    fn test_pristine_until_first_fill_or_halt() {
        let mut st = state();
        assert!(st.is_pristine());
        st.record_fill(Timestamp(0));
        assert!(!st.is_pristine());

        let mut st = state();
        st.trigger_halt(HaltReason::Drawdown, Timestamp(0), 0);
        assert!(!st.is_pristine());
    }

    #[test]
    fn test_drawdown_escalates_timed_halt() {
        let gov = governor();
        let mut st = state();
        st.trigger_halt(HaltReason::DailyLoss, Timestamp(0), 1_000);
        st.current_balance = Money::new(dec!(8_000));
        assert_eq!(gov.refresh(&mut st, Timestamp(1)), Some(HaltReason::Drawdown));
        assert_eq!(st.cooldown_until, None);
    }

    #[test]
    fn test_zero_pnl_close_keeps_streak() {
        let mut st = state();
        st.record_close(Money::new(dec!(-5)), Timestamp(0));
        st.record_close(Money::zero(), Timestamp(1));
        assert_eq!(st.consecutive_losses, 1);
        st.record_close(Money::new(dec!(5)), Timestamp(2));
        assert_eq!(st.consecutive_losses, 0);
        assert_eq!(st.daily_trade_count, 3);
    }

    #[test]
    fn test_session_rollover() {
        let gov = governor();
        let mut st = state();
        let day1 = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        assert!(!gov.roll_session(&mut st, day1));
        st.record_close(Money::new(dec!(-50)), Timestamp(0));
        assert!(!gov.roll_session(&mut st, day1));
        assert!(gov.roll_session(&mut st, day2));
        assert_eq!(st.daily_pnl, Money::zero());
        assert_eq!(st.daily_trade_count, 0);
        // balance is not a daily figure
        assert_eq!(st.current_balance, Money::new(dec!(9_950)));
    }

    #[test]
    fn test_risk_state_serialization() {
        let mut st = state();
        st.trigger_halt(HaltReason::DailyLoss, Timestamp(5), 100);
        let json = serde_json::to_string(&st).unwrap();
        let back: RiskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, st);
    }
}
