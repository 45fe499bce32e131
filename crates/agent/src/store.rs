//! Activity store: what a UI shows about the bus.
//!
//! Fed by a bus listener, it derives a status per agent from the traffic it
//! sees and keeps a bounded log of recent messages.

use agentbus_core::message::{ActionName, AgentKind, Message, MessageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::bus::{Orchestrator, Subscription};
use crate::runtime::AgentStatus;

/// Characters of message data kept in a log summary.
const SUMMARY_CHARS: usize = 120;

/// One observed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub from: AgentKind,
    pub to: AgentKind,
    pub kind: MessageKind,
    pub action: ActionName,
    pub summary: String,
}

#[derive(Debug, Default)]
struct ActivityState {
    statuses: BTreeMap<AgentKind, AgentStatus>,
    log: VecDeque<LogEntry>,
}

/// Shared, clonable view of bus activity.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    state: Arc<Mutex<ActivityState>>,
    capacity: usize,
}

impl ActivityStore {
    /// A store keeping at most `capacity` log entries (oldest dropped).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ActivityState::default())),
            capacity: capacity.max(1),
        }
    }

    /// Record every message dispatched on `bus` until the subscription drops.
    pub fn attach(&self, bus: &Orchestrator) -> Subscription {
        let store = self.clone();
        bus.subscribe(move |message| store.record(message))
    }

    pub fn record(&self, message: &Message) {
        let entry = LogEntry {
            timestamp: message.timestamp,
            from: message.from,
            to: message.to,
            kind: message.kind,
            action: message.action(),
            summary: summarize(message),
        };

        let mut state = self.lock();
        let transition = match message.kind {
            MessageKind::Request => Some((message.to, AgentStatus::Working)),
            MessageKind::Response => Some((message.from, AgentStatus::Success)),
            MessageKind::Error => Some((message.from, AgentStatus::Error)),
            MessageKind::Notification => Some((message.from, AgentStatus::Working)),
        };
        if let Some((agent, status)) = transition
            && agent != AgentKind::Orchestrator
        {
            state.statuses.insert(agent, status);
        }

        if state.log.len() == self.capacity {
            state.log.pop_front();
        }
        state.log.push_back(entry);
    }

    pub fn status(&self, agent: AgentKind) -> AgentStatus {
        self.lock()
            .statuses
            .get(&agent)
            .copied()
            .unwrap_or(AgentStatus::Idle)
    }

    /// Agents seen so far and their derived status.
    pub fn statuses(&self) -> BTreeMap<AgentKind, AgentStatus> {
        self.lock().statuses.clone()
    }

    /// Log entries, oldest first.
    pub fn log(&self) -> Vec<LogEntry> {
        self.lock().log.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.statuses.clear();
        state.log.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The most telling field of the payload, cut to one short line.
fn summarize(message: &Message) -> String {
    let text = ["error", "prompt", "command", "status", "result"]
        .iter()
        .find_map(|key| message.data_str(key))
        .map(str::to_string)
        .unwrap_or_else(|| message.payload.data.to_string());

    let line = text.lines().next().unwrap_or_default();
    let mut summary: String = line.chars().take(SUMMARY_CHARS).collect();
    if line.chars().count() > SUMMARY_CHARS || text.lines().nth(1).is_some() {
        summary.push_str("...");
    }
    summary
}
