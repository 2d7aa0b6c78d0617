// 7.0 config.rs: all thresholds in one place. strategy, risk, session, execution.
// 7.1 validate() enforces the floor/ceiling table. out of range is rejected, never clamped.
// 7.2 loading layers defaults, toml files and SCALP_ env vars through the config crate.

use config::{Config, Environment as EnvSource, File, FileFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::types::{Money, Percent, Symbol};

/// Where orders go. Reported in status; selects the venue at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    DryRun,
    Live,
    Backtest,
}

impl TradingMode {
    pub fn is_live(&self) -> bool {
        matches!(self, TradingMode::Live)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::DryRun => f.write_str("dry_run"),
            TradingMode::Live => f.write_str("live"),
            TradingMode::Backtest => f.write_str("backtest"),
        }
    }
}

/** 7.3: entry/exit rule thresholds. percents are human units (0.5 = 0.5%) */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    // Buy when price drops this far below the rolling high
    pub entry_drop_percent: Percent,
    // Rolling high horizon
    pub lookback_minutes: u32,
    pub profit_target_percent: Percent,
    pub stop_loss_percent: Percent,
    pub use_trailing_stop: bool,
    // Retrace from the peak since entry that triggers the trailing exit
    pub trailing_stop_percent: Percent,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            entry_drop_percent: Percent::new(dec!(0.5)),
            lookback_minutes: 5,
            profit_target_percent: Percent::new(dec!(0.3)),
            stop_loss_percent: Percent::new(dec!(0.4)),
            use_trailing_stop: false,
            trailing_stop_percent: Percent::new(dec!(0.2)),
        }
    }
}

impl StrategyParams {
    pub fn lookback_ms(&self) -> i64 {
        i64::from(self.lookback_minutes) * 60_000
    }
}

/** 7.4: sizing and circuit breaker limits */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    // Share of current balance committed per entry
    pub position_size_percent: Percent,
    // Dollar cap per entry (lower of this and the percent cap wins)
    pub max_position_dollars: Option<Money>,
    // Fat finger guard
    pub max_shares_per_trade: Option<u64>,
    pub max_positions: u32,
    pub max_daily_trades: u32,
    pub max_daily_loss_percent: Option<Percent>,
    pub max_daily_loss_dollars: Option<Money>,
    pub max_consecutive_losses: u32,
    // Kill switch. drop from the starting balance
    pub max_drawdown_percent: Percent,
    pub min_trade_interval_secs: u64,
    // Timed suspension after a daily loss or loss streak halt
    pub cooldown_minutes: u32,
    // Cooldown expiry also needs an operator acknowledgement
    pub require_manual_restart: bool,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            position_size_percent: Percent::new(dec!(10)),
            max_position_dollars: None,
            max_shares_per_trade: None,
            max_positions: 1,
            max_daily_trades: 100,
            max_daily_loss_percent: Some(Percent::new(dec!(5))),
            max_daily_loss_dollars: None,
            max_consecutive_losses: 5,
            max_drawdown_percent: Percent::new(dec!(10)),
            min_trade_interval_secs: 30,
            cooldown_minutes: 60,
            require_manual_restart: true,
        }
    }
}

impl RiskParams {
    pub fn cooldown_ms(&self) -> i64 {
        i64::from(self.cooldown_minutes) * 60_000
    }

    pub fn min_trade_interval_ms(&self) -> i64 {
        (self.min_trade_interval_secs as i64) * 1_000
    }
}

/// Which clock decides session hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    /// 24/7. no blackouts, no end of day.
    AlwaysOn,
    /// Weekdays 09:30-16:00 America/New_York.
    #[default]
    UsEquities,
}

/** 7.5: session rules. blackout windows and end of day handling */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    pub calendar: CalendarKind,
    // No entries this many minutes after the open
    pub opening_blackout_minutes: u32,
    // No entries this many minutes before the close
    pub closing_blackout_minutes: u32,
    // Inside the closing blackout every open position is forced out
    pub close_at_eod: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            calendar: CalendarKind::UsEquities,
            opening_blackout_minutes: 30,
            closing_blackout_minutes: 30,
            close_at_eod: true,
        }
    }
}

/** 7.6: loop cadence and adapter time budgets */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionParams {
    pub tick_interval_ms: u64,
    pub feed_timeout_ms: u64,
    pub broker_timeout_ms: u64,
    // Paper fills only. buys fill this much higher, sells lower
    pub paper_slippage_bps: u32,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            feed_timeout_ms: 2_000,
            broker_timeout_ms: 5_000,
            paper_slippage_bps: 0,
        }
    }
}

impl ExecutionParams {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }

    pub fn broker_timeout(&self) -> Duration {
        Duration::from_millis(self.broker_timeout_ms)
    }
}

// The complete trading configuration. one immutable snapshot per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: TradingMode,
    pub symbols: Vec<Symbol>,
    pub starting_balance: Money,
    pub strategy: StrategyParams,
    pub risk: RiskParams,
    pub session: SessionParams,
    pub execution: ExecutionParams,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::DryRun,
            symbols: vec![Symbol::new("TSLA")],
            starting_balance: Money::new(dec!(10_000)),
            strategy: StrategyParams::default(),
            risk: RiskParams::default(),
            session: SessionParams::default(),
            execution: ExecutionParams::default(),
        }
    }
}

impl TradingConfig {
    // Tight limits for a first live session
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.risk.position_size_percent = Percent::new(dec!(5));
        config.risk.max_daily_trades = 20;
        config.risk.max_daily_loss_percent = Some(Percent::new(dec!(2)));
        config.risk.max_consecutive_losses = 3;
        config.risk.max_drawdown_percent = Percent::new(dec!(5));
        config.risk.min_trade_interval_secs = 60;
        config
    }

    // Looser limits for paper experiments
    pub fn aggressive() -> Self {
        let mut config = Self::default();
        config.risk.position_size_percent = Percent::new(dec!(25));
        config.risk.max_positions = 3;
        config.risk.max_daily_trades = 300;
        config.risk.max_daily_loss_percent = Some(Percent::new(dec!(10)));
        config.risk.max_consecutive_losses = 8;
        config.risk.min_trade_interval_secs = 5;
        config.risk.require_manual_restart = false;
        config
    }

    /// Load from `<dir>/default.toml`, `<dir>/<SCALP_ENV>.toml` and `SCALP_*`
    /// environment variables (`SCALP_RISK__MAX_POSITIONS=2`), then validate.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let env_name = std::env::var("SCALP_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(env_name)).required(false))
            .add_source(
                EnvSource::with_prefix("SCALP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validated()
    }

    /// Parse a TOML document layered over the defaults, then validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validated()
    }

    /// Normalize symbols and validate. consumes self so a rejected config
    /// never reaches the engine.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.symbols = self
            .symbols
            .iter()
            .map(|s| Symbol::new(s.as_str()))
            .collect();
        self.validate()?;
        Ok(self)
    }

    // 7.1: the bounds table
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.strategy;
        let r = &self.risk;
        let sess = &self.session;
        let x = &self.execution;

        // symbols
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid {
                field: "symbols",
                reason: "at least one symbol is required".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.as_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "symbols",
                    reason: "empty symbol".to_string(),
                });
            }
            if !seen.insert(symbol.clone()) {
                return Err(ConfigError::Invalid {
                    field: "symbols",
                    reason: format!("duplicate symbol {}", symbol),
                });
            }
        }

        if !self.starting_balance.is_positive() {
            return Err(ConfigError::Invalid {
                field: "starting_balance",
                reason: "must be positive".to_string(),
            });
        }

        // strategy
        exclusive_min("strategy.entry_drop_percent", s.entry_drop_percent.value(), dec!(0), dec!(10))?;
        inclusive("strategy.lookback_minutes", s.lookback_minutes.into(), dec!(1), dec!(60))?;
        exclusive_min("strategy.profit_target_percent", s.profit_target_percent.value(), dec!(0), dec!(10))?;
        exclusive_min("strategy.stop_loss_percent", s.stop_loss_percent.value(), dec!(0), dec!(10))?;
        exclusive_min("strategy.trailing_stop_percent", s.trailing_stop_percent.value(), dec!(0), dec!(10))?;

        // risk
        inclusive("risk.position_size_percent", r.position_size_percent.value(), dec!(1), dec!(50))?;
        if let Some(cap) = r.max_position_dollars {
            inclusive("risk.max_position_dollars", cap.value(), dec!(100), dec!(100_000))?;
        }
        if let Some(cap) = r.max_shares_per_trade {
            inclusive("risk.max_shares_per_trade", cap.into(), dec!(1), dec!(10_000))?;
        }
        inclusive("risk.max_positions", r.max_positions.into(), dec!(1), dec!(5))?;
        inclusive("risk.max_daily_trades", r.max_daily_trades.into(), dec!(1), dec!(500))?;
        if let Some(limit) = r.max_daily_loss_percent {
            exclusive_min("risk.max_daily_loss_percent", limit.value(), dec!(0), dec!(20))?;
        }
        if let Some(limit) = r.max_daily_loss_dollars {
            exclusive_min("risk.max_daily_loss_dollars", limit.value(), dec!(0), dec!(50_000))?;
        }
        inclusive("risk.max_consecutive_losses", r.max_consecutive_losses.into(), dec!(1), dec!(20))?;
        inclusive("risk.max_drawdown_percent", r.max_drawdown_percent.value(), dec!(1), dec!(30))?;
        inclusive("risk.min_trade_interval_secs", r.min_trade_interval_secs.into(), dec!(0), dec!(300))?;
        inclusive("risk.cooldown_minutes", r.cooldown_minutes.into(), dec!(0), dec!(1440))?;

        // session
        inclusive("session.opening_blackout_minutes", sess.opening_blackout_minutes.into(), dec!(0), dec!(60))?;
        inclusive("session.closing_blackout_minutes", sess.closing_blackout_minutes.into(), dec!(0), dec!(60))?;

        // execution
        inclusive("execution.tick_interval_ms", x.tick_interval_ms.into(), dec!(100), dec!(60_000))?;
        inclusive("execution.feed_timeout_ms", x.feed_timeout_ms.into(), dec!(100), dec!(60_000))?;
        inclusive("execution.broker_timeout_ms", x.broker_timeout_ms.into(), dec!(100), dec!(60_000))?;
        inclusive("execution.paper_slippage_bps", x.paper_slippage_bps.into(), dec!(0), dec!(100))?;

        Ok(())
    }
}

fn inclusive(field: &'static str, value: Decimal, min: Decimal, max: Decimal) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            bounds: format!("[{}, {}]", min, max),
        });
    }
    Ok(())
}

fn exclusive_min(field: &'static str, value: Decimal, min: Decimal, max: Decimal) -> Result<(), ConfigError> {
    if value <= min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            bounds: format!("({}, {}]", min, max),
        });
    }
    Ok(())
}

// Configuration errors. the prior snapshot stays in force when any of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside {bounds}")]
    OutOfRange {
        field: &'static str,
        value: Decimal,
        bounds: String,
    },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Paper,
    Live,
}

impl Environment {
    pub fn config(&self) -> TradingConfig {
        match self {
            Environment::Development => TradingConfig::aggressive(),
            Environment::Paper => TradingConfig::default(),
            Environment::Live => {
                let mut config = TradingConfig::conservative();
                config.mode = TradingMode::Live;
                config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = TradingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk.max_positions, 1);
        assert_eq!(config.strategy.lookback_ms(), 300_000);
    }

    #[test]
    fn test_presets_valid() {
        assert!(TradingConfig::conservative().validate().is_ok());
        assert!(TradingConfig::aggressive().validate().is_ok());
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Paper.config().validate().is_ok());
        assert!(Environment::Live.config().validate().is_ok());
        assert!(Environment::Live.config().mode.is_live());
    }

    #[test]
    fn test_drawdown_ceiling_rejected() {
        let mut config = TradingConfig::default();
        config.risk.max_drawdown_percent = Percent::new(dec!(30));
        assert!(config.validate().is_ok());

        config.risk.max_drawdown_percent = Percent::new(dec!(30.01));
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { field: "risk.max_drawdown_percent", .. }
        ));
    }

    #[test]
    fn test_daily_loss_ceiling_rejected() {
        let mut config = TradingConfig::default();
        config.risk.max_daily_loss_percent = Some(Percent::new(dec!(25)));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "risk.max_daily_loss_percent", .. })
        ));
    }

    #[test]
    fn test_position_size_ceiling_not_clamped() {
        let mut config = TradingConfig::default();
        config.risk.position_size_percent = Percent::new(dec!(60));
        assert!(config.clone().validated().is_err());
        // the rejected value is untouched
        assert_eq!(config.risk.position_size_percent, Percent::new(dec!(60)));
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let mut config = TradingConfig::default();
        config.strategy.stop_loss_percent = Percent::new(dec!(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_symbols_validation() {
        let mut config = TradingConfig::default();
        config.symbols = vec![];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "symbols", .. })));

        config.symbols = vec![Symbol::new("TSLA"), Symbol::new("tsla")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_overrides_layer_on_defaults() {
        let raw = r#"
            symbols = ["tsla", "nvda"]

            [risk]
            max_positions = 2
            max_daily_loss_dollars = 150

            [strategy]
            entry_drop_percent = 0.75
        "#;
        let config = TradingConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.symbols, vec![Symbol::new("TSLA"), Symbol::new("NVDA")]);
        assert_eq!(config.risk.max_positions, 2);
        assert_eq!(config.risk.max_daily_loss_dollars, Some(Money::new(dec!(150))));
        assert_eq!(config.strategy.entry_drop_percent, Percent::new(dec!(0.75)));
        // untouched fields keep defaults
        assert_eq!(config.strategy.lookback_minutes, 5);
    }

    #[test]
    fn test_toml_out_of_range_rejected() {
        let raw = r#"
            [risk]
            max_positions = 9
        "#;
        assert!(matches!(
            TradingConfig::from_toml_str(raw),
            Err(ConfigError::OutOfRange { field: "risk.max_positions", .. })
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = TradingConfig::aggressive();
        let json = serde_json::to_string(&config).unwrap();
        let back: TradingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
