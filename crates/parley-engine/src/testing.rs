//! Recording fakes for the pipeline's capabilities.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use parley_core::{
  capability::{
    CapabilityError, Delivery, DeliveryReceipt, Inference, InferenceReply, InferenceRequest,
    OutboundBody,
  },
  event::InboundEvent,
  message::ContentKind,
  tenant::TenantContext,
};
use parley_store_sqlite::SqliteStore;

use crate::{
  config::PipelineConfig,
  dispatch::{AutomationJob, Dispatch, DispatchError},
  orchestrator::Pipeline,
};

#[derive(Debug, Clone)]
pub enum InferenceBehavior {
  Reply(InferenceReply),
  Fail,
  Hang,
}

pub struct FakeInference {
  behavior:     InferenceBehavior,
  pub requests: Mutex<Vec<InferenceRequest>>,
}

impl FakeInference {
  pub fn new(behavior: InferenceBehavior) -> Self {
    Self { behavior, requests: Mutex::new(Vec::new()) }
  }

  pub fn calls(&self) -> usize { self.requests.lock().unwrap().len() }
}

impl Inference for FakeInference {
  async fn infer(
    &self,
    _ctx: &TenantContext,
    request: InferenceRequest,
  ) -> Result<InferenceReply, CapabilityError> {
    self.requests.lock().unwrap().push(request);
    match self.behavior.clone() {
      InferenceBehavior::Reply(reply) => Ok(reply),
      InferenceBehavior::Fail => Err(CapabilityError::Transport("connection refused".into())),
      InferenceBehavior::Hang => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(CapabilityError::Timeout(Duration::from_secs(3600)))
      }
    }
  }
}

pub struct FakeDelivery {
  reject:   bool,
  next_id:  AtomicUsize,
  pub sent: Mutex<Vec<(String, OutboundBody)>>,
}

impl FakeDelivery {
  pub fn accepting() -> Self {
    Self { reject: false, next_id: AtomicUsize::new(1), sent: Mutex::new(Vec::new()) }
  }

  pub fn rejecting() -> Self { Self { reject: true, ..Self::accepting() } }

  pub fn sent(&self) -> Vec<(String, OutboundBody)> { self.sent.lock().unwrap().clone() }
}

impl Delivery for FakeDelivery {
  async fn send(
    &self,
    _ctx: &TenantContext,
    to: &str,
    body: OutboundBody,
  ) -> Result<DeliveryReceipt, CapabilityError> {
    self.sent.lock().unwrap().push((to.to_owned(), body));
    if self.reject {
      return Ok(DeliveryReceipt::Rejected { reason: "recipient not reachable".into() });
    }
    let n = self.next_id.fetch_add(1, Ordering::SeqCst);
    Ok(DeliveryReceipt::Accepted { provider_message_id: Some(format!("wamid.out.{n}")) })
  }
}

#[derive(Default)]
pub struct RecordingDispatch {
  pub jobs: Mutex<Vec<AutomationJob>>,
}

impl RecordingDispatch {
  pub fn jobs(&self) -> Vec<AutomationJob> { self.jobs.lock().unwrap().clone() }
}

impl Dispatch for RecordingDispatch {
  fn submit(&self, job: AutomationJob) -> Result<(), DispatchError> {
    self.jobs.lock().unwrap().push(job);
    Ok(())
  }
}

pub fn ctx() -> TenantContext { TenantContext::new("t1", "wa-main", "whatsapp") }

pub fn config() -> PipelineConfig {
  PipelineConfig {
    inference_timeout_ms: 50,
    delivery_timeout_ms: 50,
    dispatch_workers: 2,
    ..PipelineConfig::default()
  }
}

pub fn text_event(address: &str, external_id: &str, text: &str) -> InboundEvent {
  InboundEvent {
    external_address:    address.to_owned(),
    sender_display_name: "Maria".to_owned(),
    external_message_id: external_id.to_owned(),
    content_kind:        ContentKind::Text,
    text:                text.to_owned(),
    received_at:         Utc::now(),
  }
}

pub fn reply(text: &str, needs_human_transfer: bool) -> InferenceBehavior {
  InferenceBehavior::Reply(InferenceReply { text: text.to_owned(), needs_human_transfer })
}

pub type TestPipeline = Pipeline<SqliteStore, FakeInference, FakeDelivery, RecordingDispatch>;

pub struct Harness {
  pub store:     Arc<SqliteStore>,
  pub inference: Arc<FakeInference>,
  pub delivery:  Arc<FakeDelivery>,
  pub dispatch:  Arc<RecordingDispatch>,
  pub pipeline:  Arc<TestPipeline>,
}

pub async fn harness(behavior: InferenceBehavior, delivery: FakeDelivery) -> Harness {
  harness_with(behavior, delivery, config()).await
}

pub async fn harness_with(
  behavior: InferenceBehavior,
  delivery: FakeDelivery,
  config: PipelineConfig,
) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let inference = Arc::new(FakeInference::new(behavior));
  let delivery = Arc::new(delivery);
  let dispatch = Arc::new(RecordingDispatch::default());
  let pipeline = Arc::new(Pipeline::new(
    store.clone(),
    inference.clone(),
    delivery.clone(),
    dispatch.clone(),
    config,
  ));
  Harness { store, inference, delivery, dispatch, pipeline }
}
