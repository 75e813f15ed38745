use std::{sync::Arc, time::Duration};

use chrono::Utc;
use parley_core::{
  capability::OutboundBody,
  contact::NewContact,
  conversation::ConversationStatus,
  event::StatusEvent,
  message::{ContentKind, DeliveryStatus, NewMessage, SenderKind, StatusTransition},
  rule::{NewRule, RuleAction, Trigger},
  store::EngagementStore,
};

use crate::{
  config::PipelineConfig,
  dispatch::{Dispatch, WorkerPool},
  error::PipelineError,
  handoff::{HandoffController, HandoffOutcome},
  orchestrator::{Accepted, EventSink, InboundOutcome, Pipeline, ResponseKind},
  outbound::SendOutcome,
  testing::*,
};

fn accepted(outcome: InboundOutcome) -> Accepted {
  match outcome {
    InboundOutcome::Accepted(a) => a,
    other => panic!("expected an accepted event, got {other:?}"),
  }
}

#[tokio::test]
async fn redelivered_event_is_processed_once() {
  let h = harness(InferenceBehavior::Fail, FakeDelivery::accepting()).await;
  let ctx = ctx();
  let event = text_event("+55 11 99999-0000", "wamid.in.1", "oi");

  let first = accepted(h.pipeline.handle_inbound(&ctx, event.clone()).await.unwrap());
  let second = h.pipeline.handle_inbound(&ctx, event).await.unwrap();
  assert_eq!(second, InboundOutcome::Duplicate { message_id: first.message_id });
  h.pipeline.settle().await;

  let messages = h.store.recent_messages(&ctx, first.conversation_id, 50).await.unwrap();
  assert_eq!(messages.len(), 1);
  let conversation = h.store.get_conversation(&ctx, first.conversation_id).await.unwrap().unwrap();
  assert_eq!(conversation.unread_count, 1);
  assert_eq!(h.inference.calls(), 1);
}

#[tokio::test]
async fn concurrent_first_messages_share_one_conversation() {
  let h = harness(InferenceBehavior::Fail, FakeDelivery::accepting()).await;

  let mut tasks = Vec::new();
  for i in 0..12 {
    let pipeline = h.pipeline.clone();
    tasks.push(tokio::spawn(async move {
      let ctx = ctx();
      let event = text_event("5511999990000", &format!("wamid.in.{i}"), "hello");
      pipeline.handle_inbound(&ctx, event).await
    }));
  }
  let mut outcomes = Vec::new();
  for task in tasks {
    outcomes.push(accepted(task.await.unwrap().unwrap()));
  }

  let contact_id = outcomes[0].contact_id;
  let conversation_id = outcomes[0].conversation_id;
  assert!(outcomes.iter().all(|o| o.contact_id == contact_id));
  assert!(outcomes.iter().all(|o| o.conversation_id == conversation_id));
  assert_eq!(outcomes.iter().filter(|o| o.is_new_contact).count(), 1);
  assert_eq!(outcomes.iter().filter(|o| o.is_new_conversation).count(), 1);

  let open = h.store.list_open_conversations(&ctx(), contact_id).await.unwrap();
  assert_eq!(open.len(), 1);
  assert_eq!(open[0].unread_count, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_change_nothing_twice() {
  let h = harness(InferenceBehavior::Fail, FakeDelivery::accepting()).await;

  let mut tasks = Vec::new();
  for _ in 0..8 {
    let pipeline = h.pipeline.clone();
    tasks.push(tokio::spawn(async move {
      pipeline
        .handle_inbound(&ctx(), text_event("5511999990000", "wamid.dup", "oi"))
        .await
    }));
  }
  let mut outcomes = Vec::new();
  for task in tasks {
    outcomes.push(task.await.unwrap().unwrap());
  }
  h.pipeline.settle().await;

  let message_id = outcomes[0].message_id();
  assert!(outcomes.iter().all(|o| o.message_id() == message_id));
  assert_eq!(outcomes.iter().filter(|o| !o.is_duplicate()).count(), 1);

  let conversation_id = outcomes
    .iter()
    .find_map(|o| match o {
      InboundOutcome::Accepted(a) => Some(a.conversation_id),
      InboundOutcome::Duplicate { .. } => None,
    })
    .unwrap();
  let conversation = h.store.get_conversation(&ctx(), conversation_id).await.unwrap().unwrap();
  assert_eq!(conversation.unread_count, 1);
  let messages = h.store.recent_messages(&ctx(), conversation_id, 50).await.unwrap();
  assert_eq!(messages.iter().filter(|m| m.sender == SenderKind::Contact).count(), 1);
  assert_eq!(h.inference.calls(), 1);
}

#[tokio::test]
async fn redelivery_after_a_lost_insert_still_counts_as_first() {
  let h = harness(reply("should not be used", false), FakeDelivery::accepting()).await;
  let ctx = ctx();
  let rule = h
    .store
    .add_rule(&ctx, NewRule::new("welcome", Trigger::NewContact, RuleAction::Text {
      body: "Bem-vindo!".into(),
    }))
    .await
    .unwrap();

  // What a first attempt leaves behind when it dies between opening the
  // conversation and storing the message.
  let event = text_event("5511999990000", "wamid.in.1", "oi");
  let (contact, _) = h
    .store
    .upsert_contact(&ctx, NewContact {
      address:      "5511999990000".into(),
      display_name: "Maria".into(),
      tags:         vec!["whatsapp".into()],
      seen_at:      event.received_at,
    })
    .await
    .unwrap();
  let (conversation, _) = h
    .store
    .open_conversation(&ctx, contact.contact_id, event.received_at)
    .await
    .unwrap();

  let outcome = accepted(h.pipeline.handle_inbound(&ctx, event).await.unwrap());
  h.pipeline.settle().await;

  assert_eq!(outcome.contact_id, contact.contact_id);
  assert_eq!(outcome.conversation_id, conversation.conversation_id);
  assert!(outcome.is_new_contact);
  assert!(outcome.is_new_conversation);
  assert_eq!(outcome.response, ResponseKind::Automation { rule_id: rule.rule_id, queued: true });
  assert_eq!(h.dispatch.jobs().len(), 1);
  assert_eq!(h.inference.calls(), 0);
}

#[tokio::test]
async fn keyword_rule_preempts_the_assistant() {
  let h = harness(reply("should not be used", false), FakeDelivery::accepting()).await;
  let ctx = ctx();
  let rule = h
    .store
    .add_rule(
      &ctx,
      NewRule::new(
        "cancel",
        Trigger::Keyword { keywords: vec!["cancelar".into()] },
        RuleAction::Text { body: "Seu pedido foi cancelado".into() },
      ),
    )
    .await
    .unwrap();

  let event = text_event("5511999990000", "wamid.in.1", "Quero CANCELAR meu pedido");
  let outcome = accepted(h.pipeline.handle_inbound(&ctx, event).await.unwrap());

  assert!(outcome.is_new_contact);
  assert!(outcome.is_new_conversation);
  assert_eq!(outcome.response, ResponseKind::Automation { rule_id: rule.rule_id, queued: true });
  assert!(!outcome.response.ai_invoked());
  assert_eq!(h.inference.calls(), 0);

  let jobs = h.dispatch.jobs();
  assert_eq!(jobs.len(), 1);
  assert_eq!(jobs[0].to, "5511999990000");
  assert_eq!(jobs[0].conversation_id, outcome.conversation_id);
  assert_eq!(jobs[0].body, OutboundBody::Text("Seu pedido foi cancelado".into()));

  let contact = h.store.get_contact(&ctx, outcome.contact_id).await.unwrap().unwrap();
  assert_eq!(contact.address, "5511999990000");
  assert_eq!(contact.tags, vec!["whatsapp".to_string()]);
}

#[tokio::test]
async fn first_message_rule_fires_when_a_resolved_contact_returns() {
  let h = harness(InferenceBehavior::Fail, FakeDelivery::accepting()).await;
  let ctx = ctx();

  let first = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "oi"))
      .await
      .unwrap(),
  );
  assert_eq!(first.response, ResponseKind::Assistant);
  h.pipeline.settle().await;
  h.store
    .update_conversation_state(&ctx, first.conversation_id, ConversationStatus::Resolved, true)
    .await
    .unwrap();

  let rule = h
    .store
    .add_rule(
      &ctx,
      NewRule::new("welcome back", Trigger::FirstMessage, RuleAction::Template {
        name:     "welcome_back".into(),
        language: "pt_BR".into(),
      }),
    )
    .await
    .unwrap();

  let second = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.2", "oi de novo"))
      .await
      .unwrap(),
  );
  assert!(!second.is_new_contact);
  assert!(second.is_new_conversation);
  assert_ne!(second.conversation_id, first.conversation_id);
  assert_eq!(second.response, ResponseKind::Automation { rule_id: rule.rule_id, queued: true });
}

#[tokio::test]
async fn assistant_transfer_hands_conversation_to_a_human() {
  let h = harness(reply("Vou te transferir para um atendente", true), FakeDelivery::accepting()).await;
  let ctx = ctx();

  let outcome = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "quero falar com alguém"))
      .await
      .unwrap(),
  );
  assert_eq!(outcome.response, ResponseKind::Assistant);
  h.pipeline.settle().await;

  let conversation = h.store.get_conversation(&ctx, outcome.conversation_id).await.unwrap().unwrap();
  assert_eq!(conversation.status, ConversationStatus::WaitingHuman);
  assert!(!conversation.bot_active);

  let messages = h.store.recent_messages(&ctx, outcome.conversation_id, 50).await.unwrap();
  assert_eq!(messages.len(), 2);
  let bot = &messages[1];
  assert_eq!(bot.content, "Vou te transferir para um atendente");
  assert_eq!(bot.sender, SenderKind::Bot);
  assert_eq!(bot.status, DeliveryStatus::Pending);
  assert_eq!(bot.external_id.as_deref(), Some("wamid.out.1"));

  // The bot stays quiet on the same conversation from now on.
  let next = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.2", "alô?"))
      .await
      .unwrap(),
  );
  assert_eq!(next.conversation_id, outcome.conversation_id);
  assert_eq!(next.response, ResponseKind::None);
  assert_eq!(h.inference.calls(), 1);
}

#[tokio::test]
async fn transfer_applies_even_when_delivery_is_rejected() {
  let h = harness(reply("Um momento", true), FakeDelivery::rejecting()).await;
  let ctx = ctx();

  let outcome = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "socorro"))
      .await
      .unwrap(),
  );
  assert_eq!(outcome.response, ResponseKind::Assistant);
  h.pipeline.settle().await;

  let messages = h.store.recent_messages(&ctx, outcome.conversation_id, 50).await.unwrap();
  assert_eq!(messages.len(), 2);
  assert_eq!(messages[1].external_id, None);
  let conversation = h.store.get_conversation(&ctx, outcome.conversation_id).await.unwrap().unwrap();
  assert_eq!(conversation.status, ConversationStatus::WaitingHuman);
  assert!(!conversation.bot_active);
}

#[tokio::test]
async fn inference_timeout_leaves_conversation_untouched() {
  let h = harness(InferenceBehavior::Hang, FakeDelivery::accepting()).await;
  let ctx = ctx();

  let outcome = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "tem alguém aí?"))
      .await
      .unwrap(),
  );
  assert_eq!(outcome.response, ResponseKind::Assistant);
  h.pipeline.settle().await;
  assert_eq!(h.inference.calls(), 1);

  let messages = h.store.recent_messages(&ctx, outcome.conversation_id, 50).await.unwrap();
  assert_eq!(messages.len(), 1);
  assert_eq!(messages[0].sender, SenderKind::Contact);

  let conversation = h.store.get_conversation(&ctx, outcome.conversation_id).await.unwrap().unwrap();
  assert_eq!(conversation.status, ConversationStatus::Active);
  assert!(conversation.bot_active);
  assert!(h.delivery.sent().is_empty());
}

#[tokio::test]
async fn assistant_receives_history_and_context() {
  let h = harness(reply("Olá Maria!", false), FakeDelivery::accepting()).await;
  let ctx = ctx();

  let outcome = accepted(
    h.pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "bom dia"))
      .await
      .unwrap(),
  );
  h.pipeline.settle().await;

  let requests = h.inference.requests.lock().unwrap().clone();
  assert_eq!(requests.len(), 1);
  let last = requests[0].history.last().unwrap();
  assert_eq!(last.content, "bom dia");
  assert_eq!(last.role, parley_core::capability::ChatRole::User);
  assert_eq!(requests[0].context["contact_name"], "Maria");
  assert_eq!(requests[0].context["conversation_id"], outcome.conversation_id.to_string());

  assert_eq!(h.delivery.sent(), vec![(
    "5511999990000".to_string(),
    OutboundBody::Text("Olá Maria!".into())
  )]);
}

#[tokio::test]
async fn media_without_text_gets_no_automated_reply() {
  let h = harness(reply("unused", false), FakeDelivery::accepting()).await;
  let mut event = text_event("5511999990000", "wamid.in.1", "");
  event.content_kind = ContentKind::Image;

  let outcome = accepted(h.pipeline.handle_inbound(&ctx(), event).await.unwrap());
  assert_eq!(outcome.response, ResponseKind::None);
  assert_eq!(h.inference.calls(), 0);
}

#[tokio::test]
async fn sender_without_digits_is_rejected() {
  let h = harness(InferenceBehavior::Fail, FakeDelivery::accepting()).await;
  let err = h
    .pipeline
    .handle_inbound(&ctx(), text_event("unknown", "wamid.in.1", "oi"))
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::InvalidAddress(_)));
  assert!(!err.is_retryable());
}

#[tokio::test]
async fn status_for_unknown_message_is_discarded() {
  let h = harness(InferenceBehavior::Fail, FakeDelivery::accepting()).await;
  let transition = h
    .pipeline
    .apply_status(&ctx(), StatusEvent {
      external_message_id: "wamid.never-sent".into(),
      status:              DeliveryStatus::Read,
      timestamp:           Utc::now(),
    })
    .await
    .unwrap();
  assert_eq!(transition, StatusTransition::Unknown);
}

#[tokio::test]
async fn worker_pool_sends_and_correlates_automation() {
  let store = Arc::new(parley_store_sqlite::SqliteStore::open_in_memory().await.unwrap());
  let delivery = Arc::new(FakeDelivery::accepting());
  let pool = Arc::new(WorkerPool::start(store.clone(), delivery.clone(), &config()));
  let pipeline = Pipeline::new(
    store.clone(),
    Arc::new(FakeInference::new(InferenceBehavior::Fail)),
    delivery.clone(),
    pool.clone(),
    config(),
  );
  let ctx = ctx();
  store
    .add_rule(&ctx, NewRule::new("welcome", Trigger::NewContact, RuleAction::Text {
      body: "Bem-vindo!".into(),
    }))
    .await
    .unwrap();

  let outcome = accepted(
    pipeline
      .handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "oi"))
      .await
      .unwrap(),
  );
  assert!(outcome.response.automation_triggered());

  pool.shutdown().await;
  assert!(pool.submit(crate::dispatch::AutomationJob {
    ctx:             ctx.clone(),
    rule_id:         uuid::Uuid::new_v4(),
    rule_name:       "late".into(),
    conversation_id: outcome.conversation_id,
    to:              "5511999990000".into(),
    body:            OutboundBody::Text("late".into()),
  })
  .is_err());

  let messages = store.recent_messages(&ctx, outcome.conversation_id, 50).await.unwrap();
  assert_eq!(messages.len(), 2);
  assert_eq!(messages[1].content, "Bem-vindo!");
  assert_eq!(messages[1].external_id.as_deref(), Some("wamid.out.1"));

  let transition = pipeline
    .apply_status(&ctx, StatusEvent {
      external_message_id: "wamid.out.1".into(),
      status:              DeliveryStatus::Delivered,
      timestamp:           Utc::now(),
    })
    .await
    .unwrap();
  assert_eq!(transition, StatusTransition::Applied {
    from: DeliveryStatus::Pending,
    to:   DeliveryStatus::Delivered,
  });
}

#[tokio::test]
async fn known_sender_without_rule_match_is_handed_off() {
  let h = harness(reply("Vou chamar um atendente", true), FakeDelivery::accepting()).await;
  let ctx = ctx();
  h.store
    .add_rule(
      &ctx,
      NewRule::new(
        "cancel",
        Trigger::Keyword { keywords: vec!["cancelar".into()] },
        RuleAction::Text { body: "cancelado".into() },
      ),
    )
    .await
    .unwrap();

  let (contact, _) = h
    .store
    .upsert_contact(&ctx, parley_core::contact::NewContact {
      address:      "5511999990000".into(),
      display_name: "Maria".into(),
      tags:         vec!["whatsapp".into()],
      seen_at:      Utc::now(),
    })
    .await
    .unwrap();
  let (conversation, _) = h
    .store
    .open_conversation(&ctx, contact.contact_id, Utc::now())
    .await
    .unwrap();
  h.store
    .insert_message(&ctx, NewMessage {
      conversation_id: conversation.conversation_id,
      content:         "preciso de ajuda".into(),
      sender:          SenderKind::Contact,
      content_kind:    ContentKind::Text,
      external_id:     Some("wamid.in.8".into()),
      status:          DeliveryStatus::Delivered,
      created_at:      Utc::now(),
    })
    .await
    .unwrap();

  let outcome = accepted(
    h.pipeline
      .handle_inbound(
        &ctx,
        text_event("+55 11 99999-0000", "wamid.in.9", "oi, ainda aguardando resposta"),
      )
      .await
      .unwrap(),
  );
  h.pipeline.settle().await;
  assert!(!outcome.is_new_contact);
  assert!(!outcome.is_new_conversation);
  assert_eq!(outcome.conversation_id, conversation.conversation_id);
  assert!(outcome.response.ai_invoked());
  assert!(h.dispatch.jobs().is_empty());

  let after = h.store.get_conversation(&ctx, conversation.conversation_id).await.unwrap().unwrap();
  assert_eq!(after.status, ConversationStatus::WaitingHuman);
  assert!(!after.bot_active);
}

#[tokio::test]
async fn acknowledgment_does_not_wait_for_the_assistant() {
  let config = PipelineConfig { inference_timeout_ms: 60_000, ..config() };
  let h = harness_with(InferenceBehavior::Hang, FakeDelivery::accepting(), config).await;
  let ctx = ctx();

  let outcome = tokio::time::timeout(
    Duration::from_secs(5),
    h.pipeline.handle_inbound(&ctx, text_event("5511999990000", "wamid.in.1", "oi")),
  )
  .await
  .expect("handle_inbound waited on inference")
  .unwrap();
  let outcome = accepted(outcome);
  assert_eq!(outcome.response, ResponseKind::Assistant);

  let messages = h.store.recent_messages(&ctx, outcome.conversation_id, 50).await.unwrap();
  assert_eq!(messages.len(), 1);
  assert!(h.delivery.sent().is_empty());
}

async fn handoff_fixture(
  behavior: InferenceBehavior,
  delivery: FakeDelivery,
) -> (
  HandoffController<parley_store_sqlite::SqliteStore, FakeInference, FakeDelivery>,
  Arc<parley_store_sqlite::SqliteStore>,
  parley_core::contact::Contact,
  uuid::Uuid,
) {
  let store = Arc::new(parley_store_sqlite::SqliteStore::open_in_memory().await.unwrap());
  let (contact, _) = store
    .upsert_contact(&ctx(), NewContact {
      address:      "5511999990000".into(),
      display_name: "Maria".into(),
      tags:         vec!["whatsapp".into()],
      seen_at:      Utc::now(),
    })
    .await
    .unwrap();
  let (conversation, _) = store.open_conversation(&ctx(), contact.contact_id, Utc::now()).await.unwrap();
  let controller = HandoffController::new(
    store.clone(),
    Arc::new(FakeInference::new(behavior)),
    Arc::new(delivery),
    config(),
  );
  (controller, store, contact, conversation.conversation_id)
}

#[tokio::test]
async fn handoff_reports_reply_delivery_and_transfer() {
  let (controller, store, contact, conversation_id) =
    handoff_fixture(reply("Vou te transferir", true), FakeDelivery::accepting()).await;

  let outcome = controller.respond(&ctx(), conversation_id, &contact, "socorro").await;
  let HandoffOutcome::Replied { message_id, delivery, handed_off } = outcome else {
    panic!("expected an assistant reply, got {outcome:?}");
  };
  assert!(handed_off);
  assert_eq!(delivery, Some(SendOutcome::Accepted {
    provider_message_id: Some("wamid.out.1".into()),
  }));

  let messages = store.recent_messages(&ctx(), conversation_id, 50).await.unwrap();
  assert_eq!(messages.last().map(|m| m.message_id), message_id);
}

#[tokio::test]
async fn handoff_with_empty_reply_transfers_silently() {
  let (controller, store, contact, conversation_id) =
    handoff_fixture(reply("   ", true), FakeDelivery::accepting()).await;

  let outcome = controller.respond(&ctx(), conversation_id, &contact, "socorro").await;
  assert_eq!(outcome, HandoffOutcome::HandedOffSilently);

  let conversation = store.get_conversation(&ctx(), conversation_id).await.unwrap().unwrap();
  assert_eq!(conversation.status, ConversationStatus::WaitingHuman);
  assert!(store.recent_messages(&ctx(), conversation_id, 50).await.unwrap().is_empty());
}
