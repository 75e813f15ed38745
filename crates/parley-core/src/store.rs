//! The `EngagementStore` trait.
//!
//! Implemented by storage backends (e.g. `parley-store-sqlite`). The engine
//! and the HTTP layers depend on this abstraction, not on a concrete backend.
//!
//! Every method takes the [`TenantContext`] explicitly; all reads and writes
//! are scoped to `ctx.tenant_id`.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  contact::{Contact, NewContact},
  conversation::{Conversation, ConversationStatus},
  message::{
    DeliveryStatus, InboundPosition, Message, MessageInsert, NewMessage, StatusTransition,
  },
  rule::{AutomationRule, NewRule},
  tenant::TenantContext,
};

/// Error type of an [`EngagementStore`].
///
/// Callers use the classification to tell a uniqueness conflict (a caller
/// mistake or a lost race) from a backend fault.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// True if the write was refused because it would break a uniqueness
  /// guarantee, such as a second open conversation for one contact.
  fn is_conflict(&self) -> bool { false }
}

/// Abstraction over a Parley storage backend.
///
/// The write operations that race under concurrent webhook delivery
/// (`upsert_contact`, `open_conversation`, `insert_message`,
/// `transition_message_status`) must each be atomic in the backend: a
/// uniqueness constraint plus conflict-as-fetch, never a read followed by a
/// separate write.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EngagementStore: Send + Sync {
  type Error: StoreError;

  // ── Contacts ──────────────────────────────────────────────────────────

  /// Insert a contact, or fetch the existing one with the same address.
  ///
  /// On conflict, `last_message_at` is bumped to `input.seen_at`, the
  /// validation flag is set, and an empty display name is filled from the
  /// hint. Returns `(contact, is_new)`.
  fn upsert_contact<'a>(
    &'a self,
    ctx: &'a TenantContext,
    input: NewContact,
  ) -> impl Future<Output = Result<(Contact, bool), Self::Error>> + Send + 'a;

  fn get_contact<'a>(
    &'a self,
    ctx: &'a TenantContext,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + 'a;

  // ── Conversations ─────────────────────────────────────────────────────

  /// Open a conversation for the contact, or reuse its open one.
  ///
  /// A new conversation starts `active`, bot on, nothing unread, with
  /// `last_message_at` set to `at`. A reused one is returned unchanged.
  /// Returns `(conversation, is_new)`.
  fn open_conversation<'a>(
    &'a self,
    ctx: &'a TenantContext,
    contact_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(Conversation, bool), Self::Error>> + Send + 'a;

  /// All open conversations for a contact, oldest first. More than one
  /// result means the single-open invariant was broken.
  fn list_open_conversations<'a>(
    &'a self,
    ctx: &'a TenantContext,
    contact_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Conversation>, Self::Error>> + Send + 'a;

  fn get_conversation<'a>(
    &'a self,
    ctx: &'a TenantContext,
    conversation_id: Uuid,
  ) -> impl Future<Output = Result<Option<Conversation>, Self::Error>> + Send + 'a;

  /// Set both state axes of a conversation. Returns `None` if it does not
  /// exist.
  fn update_conversation_state<'a>(
    &'a self,
    ctx: &'a TenantContext,
    conversation_id: Uuid,
    status: ConversationStatus,
    bot_active: bool,
  ) -> impl Future<Output = Result<Option<Conversation>, Self::Error>> + Send + 'a;

  /// Move every message of `retire` onto `keep` and mark `retire` resolved,
  /// in one transaction.
  fn merge_conversations<'a>(
    &'a self,
    ctx: &'a TenantContext,
    keep: Uuid,
    retire: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Messages ──────────────────────────────────────────────────────────

  fn find_message_by_external_id<'a>(
    &'a self,
    ctx: &'a TenantContext,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + 'a;

  /// Insert a message unless one with the same external id already exists.
  ///
  /// A contact-sent message that is actually inserted also increments its
  /// conversation's unread counter and bumps `last_message_at`, in the same
  /// write. A duplicate changes nothing.
  fn insert_message<'a>(
    &'a self,
    ctx: &'a TenantContext,
    input: NewMessage,
  ) -> impl Future<Output = Result<MessageInsert, Self::Error>> + Send + 'a;

  /// Where a stored contact-sent message falls in its contact's history.
  /// Returns `None` if no message has that id.
  fn inbound_position<'a>(
    &'a self,
    ctx: &'a TenantContext,
    message_id: Uuid,
  ) -> impl Future<Output = Result<Option<InboundPosition>, Self::Error>> + Send + 'a;

  /// The newest `limit` messages of a conversation, returned oldest first.
  fn recent_messages<'a>(
    &'a self,
    ctx: &'a TenantContext,
    conversation_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + 'a;

  /// Record the provider id assigned to an outbound message on acceptance.
  fn set_message_external_id<'a>(
    &'a self,
    ctx: &'a TenantContext,
    message_id: Uuid,
    external_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Apply a status report to the message with `external_id`, following
  /// [`DeliveryStatus::advance`].
  fn transition_message_status<'a>(
    &'a self,
    ctx: &'a TenantContext,
    external_id: &'a str,
    status: DeliveryStatus,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<StatusTransition, Self::Error>> + Send + 'a;

  // ── Rules ─────────────────────────────────────────────────────────────

  fn add_rule<'a>(
    &'a self,
    ctx: &'a TenantContext,
    input: NewRule,
  ) -> impl Future<Output = Result<AutomationRule, Self::Error>> + Send + 'a;

  /// Enabled rules in creation order (ties broken by insertion order).
  fn list_enabled_rules<'a>(
    &'a self,
    ctx: &'a TenantContext,
  ) -> impl Future<Output = Result<Vec<AutomationRule>, Self::Error>> + Send + 'a;
}
