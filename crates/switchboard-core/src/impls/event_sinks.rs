//! EventSink 実装
//!
//! - **TracingEventSink**: 構造化ログに出力
//! - **ChannelEventSink**: tokio mpsc で非同期コンシューマへ渡す（CallbackPublisher 用）
//! - **RecordingEventSink**: テスト用にメモリへ記録
//! - **FanoutEventSink**: 複数の sink へ配る

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Logs every event at `info` (state changes, assignments) or `debug` (definitions).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DomainEvent) {
        match event {
            DomainEvent::TaskAssigned {
                task_id, agent_id, ..
            } => {
                info!(event = event.name(), %task_id, %agent_id, "task assigned");
            }
            DomainEvent::AgentStateChanged { agent_id, from, to } => {
                info!(event = event.name(), %agent_id, %from, %to, "agent state changed");
            }
            DomainEvent::TaskStateChanged {
                task_id, from, to, ..
            } => {
                info!(event = event.name(), %task_id, %from, %to, "task state changed");
            }
            DomainEvent::TaskCreated {
                task_id,
                queue_id,
                priority,
            } => {
                info!(event = event.name(), %task_id, %queue_id, priority, "task created");
            }
            other => {
                debug!(event = other.name(), payload = ?other, "router event");
            }
        }
    }
}

/// Forwards events into an unbounded tokio channel.
///
/// Unbounded so `emit` never blocks the router; a dropped receiver turns the
/// sink into a no-op.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &DomainEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(event = event.name(), "event channel closed, dropping event");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DomainEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &DomainEvent) {
        self.lock().push(event.clone());
    }
}

/// Delivers each event to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &DomainEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
