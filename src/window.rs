// 2.0 window.rs: rolling (timestamp, price) history per symbol.
// timestamps never go backwards. samples older than the horizon are evicted on every push.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{Price, Timestamp};

/// Returned when a sample would break the non-decreasing timestamp order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of order sample at {at}, newest is {newest}")]
pub struct OutOfOrderSample {
    pub at: Timestamp,
    pub newest: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceWindow {
    horizon_ms: i64,
    samples: VecDeque<(Timestamp, Price)>,
}

impl PriceWindow {
    pub fn new(horizon_ms: i64) -> Self {
        Self {
            horizon_ms,
            samples: VecDeque::new(),
        }
    }

    pub fn horizon_ms(&self) -> i64 {
        self.horizon_ms
    }

    /// Change the horizon. takes effect on the next eviction.
    pub fn set_horizon(&mut self, horizon_ms: i64) {
        self.horizon_ms = horizon_ms;
    }

    // 2.1: append then evict. the out of order sample is dropped, window untouched.
    pub fn push(&mut self, at: Timestamp, price: Price) -> Result<(), OutOfOrderSample> {
        if let Some(&(newest, _)) = self.samples.back() {
            if at < newest {
                return Err(OutOfOrderSample { at, newest });
            }
        }
        self.samples.push_back((at, price));
        self.evict(at);
        Ok(())
    }

    // keep samples with t >= now - horizon
    pub fn evict(&mut self, now: Timestamp) {
        let cutoff = now.plus_millis(-self.horizon_ms);
        while let Some(&(t, _)) = self.samples.front() {
            if t < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn rolling_max(&self) -> Option<Price> {
        self.samples.iter().map(|&(_, p)| p).max()
    }

    pub fn latest(&self) -> Option<(Timestamp, Price)> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Timestamp, Price)> {
        self.samples.iter()
    }
}
