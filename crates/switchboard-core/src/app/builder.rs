//! RouterBuilder - ルーターの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - コールバック配送を使う場合だけ publisher を組み立てる

use std::sync::Arc;


use super::publisher_loop::CallbackPublisher;
use super::retry::RetryPolicy;
use super::router::Router;
use crate::config::SwitchboardConfig;
use crate::impls::{ChannelEventSink, FanoutEventSink, LoggingDelivery, TracingEventSink};
use crate::ports::{CallbackDelivery, Clock, EventSink, IdGenerator, SystemClock, UlidGenerator};

/// RouterBuilder はルーターを構築
///
/// # 使用例
/// ```ignore
/// let app = RouterBuilder::new("support")
///     .clock(FixedClock::new(start))
///     .callbacks(ScriptedDelivery::new(), RetryPolicy::immediate(3))
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に名前とリトライ設定を検証
/// - 不正なら BuildError を返す
pub struct RouterBuilder {
    name: String,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sinks: FanoutEventSink,
    callbacks: Option<CallbackSettings>,
}

struct CallbackSettings {
    delivery: Arc<dyn CallbackDelivery>,
    retry: RetryPolicy,
    cancel_on_failure: bool,
}

/// BuildError はルーター構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("router name must not be empty")]
    EmptyName,
    #[error("callback retry policy needs at least one attempt")]
    NoAttempts,
    #[error("callback backoff multiplier must be >= 1.0, got {0}")]
    ShrinkingBackoff(f64),
}

impl RouterBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock: None,
            ids: None,
            sinks: FanoutEventSink::new(),
            callbacks: None,
        }
    }

    /// Name, logging sink and callback settings from configuration.
    ///
    /// Callbacks go to `LoggingDelivery` until `callbacks()` installs a real one.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        let builder = Self::new(config.router.name.clone()).event_sink(TracingEventSink);
        if config.callbacks.enabled {
            builder
                .callbacks(LoggingDelivery, RetryPolicy::from_config(&config.callbacks))
                .cancel_on_failure(config.callbacks.cancel_on_failure)
        } else {
            builder
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Sinks receive events in the order they were added.
    pub fn event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn callbacks(mut self, delivery: impl CallbackDelivery + 'static, retry: RetryPolicy) -> Self {
        let cancel_on_failure = self
            .callbacks
            .as_ref()
            .is_none_or(|settings| settings.cancel_on_failure);
        self.callbacks = Some(CallbackSettings {
            delivery: Arc::new(delivery),
            retry,
            cancel_on_failure,
        });
        self
    }

    /// Whether an undeliverable assignment is cancelled. Default: true.
    pub fn cancel_on_failure(mut self, enabled: bool) -> Self {
        if let Some(settings) = self.callbacks.as_mut() {
            settings.cancel_on_failure = enabled;
        }
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if self.name.trim().is_empty() {
            return Err(BuildError::EmptyName);
        }
        if let Some(settings) = &self.callbacks {
            if settings.retry.max_attempts < 1 {
                return Err(BuildError::NoAttempts);
            }
            if !(settings.retry.multiplier >= 1.0) {
                return Err(BuildError::ShrinkingBackoff(settings.retry.multiplier));
            }
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        let mut sinks = self.sinks;
        let channel = self.callbacks.map(|settings| {
            let (sink, rx) = ChannelEventSink::new();
            sinks.push(Arc::new(sink));
            (settings, rx)
        });

        let router = Router::from_parts(self.name, clock, ids, Arc::new(sinks));
        let publisher = channel.map(|(settings, rx)| {
            CallbackPublisher::new(
                router.clone(),
                settings.delivery,
                settings.retry,
                settings.cancel_on_failure,
                rx,
            )
        });

        Ok(App { router, publisher })
    }
}

/// App はルーターと（任意の）コールバック publisher の組
pub struct App {
    pub router: Router,
    pub publisher: Option<CallbackPublisher>,
}
