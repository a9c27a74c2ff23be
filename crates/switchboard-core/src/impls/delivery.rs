//! CallbackDelivery 実装
//!
//! HTTP delivery lives outside this crate. What ships here:
//! - **LoggingDelivery**: logs the notification and reports success
//! - **ScriptedDelivery**: records notifications and fails on demand (tests, CLI scenarios)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::ports::{CallbackDelivery, CallbackNotification, DeliveryError};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDelivery;

#[async_trait::async_trait]
impl CallbackDelivery for LoggingDelivery {
    async fn deliver(&self, notification: &CallbackNotification) -> Result<(), DeliveryError> {
        info!(
            url = %notification.url,
            task_id = %notification.task_id,
            state = %notification.state,
            agent_id = ?notification.agent_id,
            "callback delivered"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Script {
    delivered: Vec<CallbackNotification>,
    attempts: usize,
    failing_urls: HashMap<String, FailureMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// Fail this many more attempts, then succeed.
    Times(usize),
    Always,
    Reject,
}

/// Records successful deliveries; fails the URLs it is told to.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDelivery {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt to `url` fails transiently.
    pub fn fail_always(&self, url: impl Into<String>) {
        self.lock()
            .failing_urls
            .insert(url.into(), FailureMode::Always);
    }

    /// The next `times` attempts to `url` fail transiently.
    pub fn fail_times(&self, url: impl Into<String>, times: usize) {
        self.lock()
            .failing_urls
            .insert(url.into(), FailureMode::Times(times));
    }

    /// Every attempt to `url` is rejected (not retryable).
    pub fn reject(&self, url: impl Into<String>) {
        self.lock()
            .failing_urls
            .insert(url.into(), FailureMode::Reject);
    }

    pub fn delivered(&self) -> Vec<CallbackNotification> {
        self.lock().delivered.clone()
    }

    /// Attempts made so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl CallbackDelivery for ScriptedDelivery {
    async fn deliver(&self, notification: &CallbackNotification) -> Result<(), DeliveryError> {
        let mut script = self.lock();
        script.attempts += 1;

        let url = notification.url.clone();
        match script.failing_urls.get_mut(&url) {
            Some(FailureMode::Always) => Err(DeliveryError::Transient {
                url,
                reason: "scripted failure".into(),
            }),
            Some(FailureMode::Reject) => Err(DeliveryError::Rejected {
                url,
                reason: "scripted rejection".into(),
            }),
            Some(FailureMode::Times(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(DeliveryError::Transient {
                    url,
                    reason: "scripted failure".into(),
                })
            }
            _ => {
                script.delivered.push(notification.clone());
                Ok(())
            }
        }
    }
}
