//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **TracingEventSink / ChannelEventSink / RecordingEventSink / FanoutEventSink**
//! - **LoggingDelivery / ScriptedDelivery**: コールバック配送
//!
//! HTTP でのコールバック配送は別クレートに配置する想定です。

pub mod delivery;
pub mod event_sinks;

pub use self::delivery::{LoggingDelivery, ScriptedDelivery};
pub use self::event_sinks::{
    ChannelEventSink, FanoutEventSink, RecordingEventSink, TracingEventSink,
};
