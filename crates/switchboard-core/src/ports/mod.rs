//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! ルーターのコアは時刻・ID 生成・イベント通知・外部コールバックを
//! trait 越しにしか触りません。
//!
//! # 設計原則
//! - 状態の正本はルーター内のテーブル（永続化は範囲外）
//! - イベントはコミット後に通知する
//! - コールバックの失敗は API 呼び出し元に伝播しない

pub mod callback;
pub mod clock;
pub mod event_sink;
pub mod id_generator;

// 主要な trait を再エクスポート
pub use self::callback::{CallbackDelivery, CallbackNotification, DeliveryError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
