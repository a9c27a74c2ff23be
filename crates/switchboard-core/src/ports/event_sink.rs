//! EventSink port - イベント記録の抽象化
//!
//! The router calls `emit` while still holding its lock, once per committed
//! event, in commit order. Sinks must not block: anything slow belongs behind a
//! channel (see `ChannelEventSink`).

use crate::domain::DomainEvent;

/// EventSink はドメインイベントを受け取る
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: &DomainEvent) {
        (**self).emit(event)
    }
}
