//! CallbackPublisher - コールバック配送ループ
//!
//! # フロー
//! 1. router が commit 後に発行した DomainEvent を channel から受け取る
//! 2. callback_url を持つ割り当て・状態遷移を CallbackNotification に変換
//! 3. CallbackDelivery::deliver() を RetryPolicy に従ってリトライ
//! 4. 割り当ての配送が最終的に失敗したら、タスクがまだ同じエージェントに
//!    割り当てられている場合に限り cancel パス（assigned -> waiting）を実行
//!
//! Delivery never blocks the router: the router only pushes into an unbounded
//! channel. Notifications are delivered one at a time, in commit order.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::router::Router;
use crate::domain::{AgentId, DomainEvent, TaskId, TaskState};
use crate::ports::{CallbackDelivery, CallbackNotification, DeliveryError};

/// Outcome of one notification, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, reason: String },
}

pub struct CallbackPublisher {
    router: Router,
    delivery: Arc<dyn CallbackDelivery>,
    retry: RetryPolicy,
    cancel_on_failure: bool,
    events: mpsc::UnboundedReceiver<DomainEvent>,
}

impl CallbackPublisher {
    pub fn new(
        router: Router,
        delivery: Arc<dyn CallbackDelivery>,
        retry: RetryPolicy,
        cancel_on_failure: bool,
        events: mpsc::UnboundedReceiver<DomainEvent>,
    ) -> Self {
        Self {
            router,
            delivery,
            retry,
            cancel_on_failure,
            events,
        }
    }

    /// Run until shutdown is signalled or every router handle is gone.
    ///
    /// Events already queued when shutdown arrives are not delivered.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(router = %self.router.name(), "callback publisher started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        info!(router = %self.router.name(), "callback publisher stopped");
    }

    /// Deliver everything currently queued, then return. For tests and scenario runs.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle(event).await;
            handled += 1;
        }
        handled
    }

    async fn handle(&self, event: DomainEvent) {
        match event {
            DomainEvent::TaskAssigned {
                task_id,
                agent_id,
                callback_url: Some(url),
                agent_address,
            } => {
                let notification = CallbackNotification {
                    url,
                    task_id: task_id.clone(),
                    state: TaskState::Assigned,
                    agent_id: Some(agent_id.clone()),
                    agent_address,
                };
                if let DeliveryOutcome::Failed { attempts, reason } =
                    self.deliver_with_retry(&notification).await
                {
                    self.on_assignment_undeliverable(&task_id, &agent_id, attempts, &reason)
                        .await;
                }
            }
            DomainEvent::TaskStateChanged {
                task_id,
                to,
                callback_url: Some(url),
                ..
            } => {
                let notification = CallbackNotification {
                    url,
                    task_id,
                    state: to,
                    agent_id: None,
                    agent_address: None,
                };
                self.deliver_with_retry(&notification).await;
            }
            other => {
                debug!(event = other.name(), "no callback for event");
            }
        }
    }

    /// Deliver with backoff. Rejections stop retrying immediately.
    pub async fn deliver_with_retry(&self, notification: &CallbackNotification) -> DeliveryOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.delivery.deliver(notification).await {
                Ok(()) => {
                    debug!(task_id = %notification.task_id, attempts, "callback delivered");
                    return DeliveryOutcome::Delivered { attempts };
                }
                Err(error) => {
                    warn!(
                        task_id = %notification.task_id,
                        url = %notification.url,
                        attempts,
                        %error,
                        "callback delivery failed"
                    );
                    if !self.should_retry(&error, attempts) {
                        return DeliveryOutcome::Failed {
                            attempts,
                            reason: error.to_string(),
                        };
                    }
                    let delay = self.retry.next_delay(attempts);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn should_retry(&self, error: &DeliveryError, attempts: u32) -> bool {
        error.is_retryable() && self.retry.should_retry(attempts)
    }

    async fn on_assignment_undeliverable(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        attempts: u32,
        reason: &str,
    ) {
        if !self.cancel_on_failure {
            warn!(%task_id, %agent_id, attempts, reason, "assignment undeliverable, leaving task assigned");
            return;
        }
        match self.router.cancel_assignment(task_id, agent_id).await {
            Ok(true) => {
                warn!(%task_id, %agent_id, attempts, reason, "assignment undeliverable, task returned to queue");
            }
            Ok(false) => {
                debug!(%task_id, %agent_id, "assignment already moved on, nothing to cancel");
            }
            Err(error) => {
                warn!(%task_id, %agent_id, %error, "could not cancel undeliverable assignment");
            }
        }
    }
}
