//! Fire-and-forget execution of matched automation rules.
//!
//! The orchestrator only enqueues; a fixed pool of workers drains the queue,
//! persisting and sending each rule's action off the acknowledgment path.

use std::sync::{Arc, Mutex};

use parley_core::{
  capability::{Delivery, OutboundBody},
  rule::RuleAction,
  store::EngagementStore,
  tenant::TenantContext,
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
  config::PipelineConfig,
  outbound::{SendOutcome, persist_and_send},
};

/// One matched rule waiting to be executed.
#[derive(Debug, Clone)]
pub struct AutomationJob {
  pub ctx:             TenantContext,
  pub rule_id:         Uuid,
  pub rule_name:       String,
  pub conversation_id: Uuid,
  /// Canonical address of the contact.
  pub to:              String,
  pub body:            OutboundBody,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
  #[error("dispatch queue is full")]
  QueueFull,
  #[error("dispatcher is shut down")]
  Closed,
}

/// Accepts automation jobs without waiting for them to run.
pub trait Dispatch: Send + Sync {
  fn submit(&self, job: AutomationJob) -> Result<(), DispatchError>;
}

/// The outbound payload a rule action produces.
pub fn action_body(action: &RuleAction) -> OutboundBody {
  match action {
    RuleAction::Text { body } => OutboundBody::Text(body.clone()),
    RuleAction::Template { name, language } => OutboundBody::Template {
      name:     name.clone(),
      language: language.clone(),
    },
  }
}

/// Bounded queue plus a fixed set of tokio workers.
pub struct WorkerPool {
  tx:      Mutex<Option<mpsc::Sender<AutomationJob>>>,
  workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
  /// Spawn `config.dispatch_workers` workers on the current runtime.
  pub fn start<S, D>(store: Arc<S>, delivery: Arc<D>, config: &PipelineConfig) -> Self
  where
    S: EngagementStore + 'static,
    D: Delivery + 'static,
  {
    let (tx, rx) = mpsc::channel::<AutomationJob>(config.dispatch_queue.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let timeout = config.delivery_timeout();

    let workers = (0..config.dispatch_workers.max(1))
      .map(|worker| {
        let rx = rx.clone();
        let store = store.clone();
        let delivery = delivery.clone();
        tokio::spawn(async move {
          loop {
            let next = rx.lock().await.recv().await;
            let Some(job) = next else { break };
            run_job(&*store, &*delivery, timeout, job).await;
          }
          tracing::debug!(worker, "dispatch worker stopped");
        })
      })
      .collect();

    Self {
      tx:      Mutex::new(Some(tx)),
      workers: tokio::sync::Mutex::new(workers),
    }
  }

  /// Stop accepting jobs and wait for queued ones to finish.
  pub async fn shutdown(&self) {
    if let Ok(mut tx) = self.tx.lock() {
      tx.take();
    }
    let workers = std::mem::take(&mut *self.workers.lock().await);
    for handle in workers {
      if let Err(e) = handle.await {
        tracing::error!("dispatch worker panicked: {e}");
      }
    }
  }
}

impl Dispatch for WorkerPool {
  fn submit(&self, job: AutomationJob) -> Result<(), DispatchError> {
    let guard = self.tx.lock().map_err(|_| DispatchError::Closed)?;
    let tx = guard.as_ref().ok_or(DispatchError::Closed)?;
    tx.try_send(job).map_err(|e| match e {
      mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
      mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
    })
  }
}

/// Execute one job. Failures are logged, never propagated.
pub async fn run_job<S: EngagementStore, D: Delivery>(
  store: &S,
  delivery: &D,
  timeout: std::time::Duration,
  job: AutomationJob,
) -> Option<SendOutcome> {
  tracing::info!(
    tenant = %job.ctx.tenant_id,
    rule_id = %job.rule_id,
    rule = %job.rule_name,
    conversation_id = %job.conversation_id,
    "running automation"
  );
  match persist_and_send(
    store,
    delivery,
    &job.ctx,
    job.conversation_id,
    &job.to,
    job.body,
    timeout,
  )
  .await
  {
    Ok((_, outcome)) => Some(outcome),
    Err(e) => {
      tracing::warn!(rule_id = %job.rule_id, "automation could not be recorded: {e}");
      None
    }
  }
}
