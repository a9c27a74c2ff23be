//! switchboard-core
//!
//! Matching and assignment engine for task routing: agents and tasks with
//! strict state machines, predicate-gated queues, priority plans, and a
//! scheduler that pairs them race-free under one lock per router.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, attributes, state, errors, events, queue, plan, agent, task）
//! - **predicate**: 属性に対するブール式（lexer, parser, evaluator）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, EventSink, CallbackDelivery）
//! - **impls**: 実装（イベント sink、コールバック配送）
//! - **app**: アプリケーション層（Router, MatchingScheduler, builder, publisher loop, status）
//! - **config**: TOML 設定
//! - **observability**: tracing-subscriber の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod predicate;

pub use app::{App, CreatedTask, Router, RouterBuilder, RouterStatus};
pub use config::{ConfigError, SwitchboardConfig};
pub use domain::{ErrorKind, RouterError, RouterResult};
pub use predicate::{Predicate, PredicateError};
