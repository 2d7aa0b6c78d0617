// Price Feed Integration
//
// This module abstracts how the loop receives quotes. The engine does not care whether
// prices come from a broker API, a market data vendor or a replayed script. Any source
// that can answer "what is SYMBOL trading at now" implements PriceFeed.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::session::Clock;
use crate::types::{Price, Symbol, Timestamp};

/// A single quote. ephemeral, produced each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: Price,
    pub timestamp: Timestamp,
}

/// Quote unavailable for a symbol this tick. the loop skips the symbol and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("no quote source for {0}")]
    UnknownSymbol(Symbol),

    #[error("quote unavailable for {symbol}: {reason}")]
    Unavailable { symbol: Symbol, reason: String },

    #[error("invalid price {price} for {symbol}")]
    InvalidPrice { symbol: Symbol, price: Decimal },

    #[error("quote for {symbol} timed out after {after_ms}ms")]
    Timeout { symbol: Symbol, after_ms: u64 },
}

/// Pull interface for quotes. implementations must be cheap to call once per
/// symbol per tick; the loop wraps every call in a timeout.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, FeedError>;
}

// Random walk around a base price per symbol. used by dry runs and the sim binary.
pub struct SimulatedFeed {
    clock: Arc<dyn Clock>,
    // max move per quote as a fraction. 0.005 = +/-0.5%
    volatility: f64,
    state: Mutex<SimState>,
}

struct SimState {
    rng: StdRng,
    prices: HashMap<Symbol, Decimal>,
}

impl SimulatedFeed {
    pub fn new(clock: Arc<dyn Clock>, seed: u64) -> Self {
        let mut prices = HashMap::new();
        prices.insert(Symbol::new("TSLA"), dec!(250));
        prices.insert(Symbol::new("NVDA"), dec!(450));
        prices.insert(Symbol::new("AMD"), dec!(150));
        Self {
            clock,
            volatility: 0.005,
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                prices,
            }),
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility.abs();
        self
    }

    pub async fn set_base_price(&self, symbol: Symbol, price: Decimal) {
        self.state.lock().await.prices.insert(symbol, price);
    }
}

#[async_trait]
impl PriceFeed for SimulatedFeed {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, FeedError> {
        let mut state = self.state.lock().await;
        let step = if self.volatility > 0.0 {
            state.rng.gen_range(-self.volatility..=self.volatility)
        } else {
            0.0
        };
        let factor = Decimal::ONE + Decimal::from_f64(step).unwrap_or(Decimal::ZERO);

        // unknown symbols start at 100
        let current = state.prices.entry(symbol.clone()).or_insert(dec!(100));
        let next = (*current * factor).round_dp(2);
        let price = Price::new(next).ok_or_else(|| FeedError::InvalidPrice {
            symbol: symbol.clone(),
            price: next,
        })?;
        *current = next;

        Ok(Quote {
            symbol: symbol.clone(),
            price,
            timestamp: self.clock.now(),
        })
    }
}

/// One step of a scripted path. `None` simulates an outage for that tick.
pub type ScriptStep = Option<Decimal>;

// Replays fixed price paths. exhausted scripts keep returning the last price.
pub struct ScriptedFeed {
    clock: Arc<dyn Clock>,
    scripts: Mutex<HashMap<Symbol, Script>>,
}

struct Script {
    steps: VecDeque<ScriptStep>,
    last: Option<Decimal>,
}

impl ScriptedFeed {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_prices(self, symbol: &str, prices: &[Decimal]) -> Self {
        self.with_steps(symbol, prices.iter().copied().map(Some))
    }

    pub fn with_steps<I: IntoIterator<Item = ScriptStep>>(mut self, symbol: &str, steps: I) -> Self {
        self.scripts.get_mut().insert(
            Symbol::new(symbol),
            Script {
                steps: steps.into_iter().collect(),
                last: None,
            },
        );
        self
    }

    /// Append more steps to a running script.
    pub async fn push(&self, symbol: &Symbol, step: ScriptStep) {
        let mut scripts = self.scripts.lock().await;
        let script = scripts.entry(symbol.clone()).or_insert_with(|| Script {
            steps: VecDeque::new(),
            last: None,
        });
        script.steps.push_back(step);
    }

    pub async fn remaining(&self, symbol: &Symbol) -> usize {
        self.scripts
            .lock()
            .await
            .get(symbol)
            .map(|s| s.steps.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PriceFeed for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, FeedError> {
        let mut scripts = self.scripts.lock().await;
        let script = scripts
            .get_mut(symbol)
            .ok_or_else(|| FeedError::UnknownSymbol(symbol.clone()))?;

        let raw = match script.steps.pop_front() {
            Some(Some(price)) => {
                script.last = Some(price);
                price
            }
            Some(None) => {
                return Err(FeedError::Unavailable {
                    symbol: symbol.clone(),
                    reason: "scripted outage".to_string(),
                })
            }
            None => script.last.ok_or_else(|| FeedError::Unavailable {
                symbol: symbol.clone(),
                reason: "script empty".to_string(),
            })?,
        };

        let price = Price::new(raw).ok_or_else(|| FeedError::InvalidPrice {
            symbol: symbol.clone(),
            price: raw,
        })?;
        Ok(Quote {
            symbol: symbol.clone(),
            price,
            timestamp: self.clock.now(),
        })
    }
}
