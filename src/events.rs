// 11.0: every state change the operator cares about produces an event. used for the audit
// trail the control surface reads. the EventPayload enum lists all event types.

use crate::risk::{HaltReason, RiskViolation};
use crate::signal::ExitReason;
use crate::types::{Money, Price, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    // needs an operator
    pub fn is_alert(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::HaltTriggered(_)
                | EventPayload::ExitEscalated(_)
                | EventPayload::IntegrityViolation(_)
                | EventPayload::ConfigRejected(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionClosed(PositionClosedEvent),

    // Risk events
    IntentRejected(IntentRejectedEvent),
    IntentDeferred(IntentDeferredEvent),
    HaltTriggered(HaltTriggeredEvent),
    HaltCleared(HaltClearedEvent),

    // Failures
    ExitEscalated(ExitEscalatedEvent),
    EntryFailed(EntryFailedEvent),
    FeedFailed(FeedFailedEvent),
    IntegrityViolation(IntegrityViolationEvent),

    // Configuration
    ConfigRejected(ConfigRejectedEvent),
    ConfigApplied(ConfigAppliedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub symbol: Symbol,
    pub entry_price: Price,
    pub exit_price: Price,
    pub quantity: u64,
    pub realized_pnl: Money,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRejectedEvent {
    pub symbol: Symbol,
    pub violation: RiskViolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDeferredEvent {
    pub symbol: Symbol,
    pub retry_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltTriggeredEvent {
    pub reason: HaltReason,
    pub balance: Money,
    pub daily_pnl: Money,
    pub consecutive_losses: u32,
    pub cooldown_until: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltClearedEvent {
    pub reason: Option<HaltReason>,
    pub cleared_by: HaltClearance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltClearance {
    CooldownExpired,
    Acknowledged,
    Reset,
    StatsReset,
}

// exit order failed. the position is still open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEscalatedEvent {
    pub symbol: Symbol,
    pub reason: ExitReason,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFailedEvent {
    pub symbol: Symbol,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFailedEvent {
    pub symbol: Symbol,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityViolationEvent {
    pub symbol: Symbol,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRejectedEvent {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAppliedEvent {
    pub symbols: Vec<Symbol>,
}

pub trait EventEmitter {
    fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId;
}

// bounded in-memory audit trail. oldest events drop first.
#[derive(Debug)]
pub struct EventCollector {
    events: VecDeque<Event>,
    capacity: usize,
    next_id: u64,
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new(EventCollector::DEFAULT_CAPACITY)
    }
}

impl EventCollector {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events with an id greater than `after`.
    pub fn since(&self, after: EventId) -> Vec<Event> {
        self.events.iter().filter(|e| e.id > after).cloned().collect()
    }

    pub fn last_id(&self) -> Option<EventId> {
        self.events.back().map(|e| e.id)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = self.next_id();
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event::new(id, timestamp, payload));
        id
    }
}
