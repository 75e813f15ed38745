//! [`SqliteStore`]: the SQLite implementation of [`EngagementStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use parley_core::{
  contact::{Contact, NewContact},
  conversation::{Conversation, ConversationStatus},
  message::{
    DeliveryStatus, InboundPosition, Message, MessageInsert, NewMessage, SenderKind,
    StatusTransition,
  },
  rule::{AutomationRule, NewRule},
  store::EngagementStore,
  tenant::TenantContext,
};

use crate::{
  encode::{
    CONTACT_COLUMNS, CONVERSATION_COLUMNS, MESSAGE_COLUMNS, RULE_COLUMNS, RawContact,
    RawConversation, RawMessage, RawRule, decode_enum, encode_dt, encode_tags, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Parley engagement store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// funnel through one connection thread, so each `call` closure below runs
/// atomically with respect to every other store operation.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn conversation_by_id(
    &self,
    tenant_id: String,
    conversation_id: Uuid,
  ) -> Result<Option<Conversation>> {
    let id_str = encode_uuid(conversation_id);

    let raw: Option<RawConversation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {CONVERSATION_COLUMNS} FROM conversations
               WHERE tenant_id = ?1 AND conversation_id = ?2"
            ),
            rusqlite::params![tenant_id, id_str],
            RawConversation::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawConversation::into_conversation).transpose()
  }
}

// ─── EngagementStore impl ────────────────────────────────────────────────────

impl EngagementStore for SqliteStore {
  type Error = Error;

  // ── Contacts ──────────────────────────────────────────────────────────────

  async fn upsert_contact(
    &self,
    ctx: &TenantContext,
    input: NewContact,
  ) -> Result<(Contact, bool)> {
    let candidate_id = Uuid::new_v4();

    let id_str    = encode_uuid(candidate_id);
    let tenant    = ctx.tenant_id.clone();
    let tags_str  = encode_tags(&input.tags)?;
    let seen_str  = encode_dt(input.seen_at);
    let address   = input.address;
    let name_hint = input.display_name;

    // Conflict-as-fetch: the loser of a concurrent first contact gets the
    // winner's row back from RETURNING.
    let raw: RawContact = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO contacts (
               contact_id, tenant_id, address, display_name, tags,
               is_valid, created_at, last_message_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
             ON CONFLICT (tenant_id, address) DO UPDATE SET
               last_message_at = max(contacts.last_message_at, excluded.last_message_at),
               is_valid        = 1,
               display_name    = CASE WHEN contacts.display_name = ''
                                      THEN excluded.display_name
                                      ELSE contacts.display_name END
             RETURNING {CONTACT_COLUMNS}"
          ),
          rusqlite::params![id_str, tenant, address, name_hint, tags_str, seen_str],
          RawContact::from_row,
        )?)
      })
      .await?;

    let contact = raw.into_contact()?;
    let is_new = contact.contact_id == candidate_id;
    Ok((contact, is_new))
  }

  async fn get_contact(&self, ctx: &TenantContext, contact_id: Uuid) -> Result<Option<Contact>> {
    let tenant = ctx.tenant_id.clone();
    let id_str = encode_uuid(contact_id);

    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {CONTACT_COLUMNS} FROM contacts
               WHERE tenant_id = ?1 AND contact_id = ?2"
            ),
            rusqlite::params![tenant, id_str],
            RawContact::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  // ── Conversations ─────────────────────────────────────────────────────────

  async fn open_conversation(
    &self,
    ctx: &TenantContext,
    contact_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<(Conversation, bool)> {
    let candidate_id = Uuid::new_v4();

    let id_str      = encode_uuid(candidate_id);
    let tenant      = ctx.tenant_id.clone();
    let contact_str = encode_uuid(contact_id);
    let at_str      = encode_dt(at);

    // The ON CONFLICT target repeats the partial index predicate from
    // schema.rs so that SQLite resolves against conversations_open_idx.
    // The no-op DO UPDATE is there so RETURNING yields the existing row;
    // counters only move when a message lands (see insert_message).
    let raw: RawConversation = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO conversations (
               conversation_id, tenant_id, contact_id, status,
               bot_active, unread_count, created_at, last_message_at
             ) VALUES (?1, ?2, ?3, 'active', 1, 0, ?4, ?4)
             ON CONFLICT (tenant_id, contact_id)
               WHERE status IN ('active', 'waiting_human')
             DO UPDATE SET status = conversations.status
             RETURNING {CONVERSATION_COLUMNS}"
          ),
          rusqlite::params![id_str, tenant, contact_str, at_str],
          RawConversation::from_row,
        )?)
      })
      .await?;

    let conversation = raw.into_conversation()?;
    let is_new = conversation.conversation_id == candidate_id;
    Ok((conversation, is_new))
  }

  async fn list_open_conversations(
    &self,
    ctx: &TenantContext,
    contact_id: Uuid,
  ) -> Result<Vec<Conversation>> {
    let tenant      = ctx.tenant_id.clone();
    let contact_str = encode_uuid(contact_id);

    let raws: Vec<RawConversation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONVERSATION_COLUMNS} FROM conversations
           WHERE tenant_id = ?1 AND contact_id = ?2
             AND status IN ('active', 'waiting_human')
           ORDER BY created_at ASC, conversation_id ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant, contact_str], RawConversation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConversation::into_conversation).collect()
  }

  async fn get_conversation(
    &self,
    ctx: &TenantContext,
    conversation_id: Uuid,
  ) -> Result<Option<Conversation>> {
    self.conversation_by_id(ctx.tenant_id.clone(), conversation_id).await
  }

  async fn update_conversation_state(
    &self,
    ctx: &TenantContext,
    conversation_id: Uuid,
    status: ConversationStatus,
    bot_active: bool,
  ) -> Result<Option<Conversation>> {
    let tenant     = ctx.tenant_id.clone();
    let id_str     = encode_uuid(conversation_id);
    let status_str = status.as_ref().to_owned();

    let raw: Option<RawConversation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "UPDATE conversations SET status = ?3, bot_active = ?4
               WHERE tenant_id = ?1 AND conversation_id = ?2
               RETURNING {CONVERSATION_COLUMNS}"
            ),
            rusqlite::params![tenant, id_str, status_str, bot_active],
            RawConversation::from_row,
          )
          .optional()?)
      })
      .await
      .map_err(|e| {
        Error::from_write(e, &format!("conversation {conversation_id}: contact already has an open conversation"))
      })?;

    raw.map(RawConversation::into_conversation).transpose()
  }

  async fn merge_conversations(&self, ctx: &TenantContext, keep: Uuid, retire: Uuid) -> Result<()> {
    let tenant     = ctx.tenant_id.clone();
    let keep_str   = encode_uuid(keep);
    let retire_str = encode_uuid(retire);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE messages SET conversation_id = ?2
           WHERE tenant_id = ?1 AND conversation_id = ?3",
          rusqlite::params![tenant, keep_str, retire_str],
        )?;
        tx.execute(
          "UPDATE conversations SET
             unread_count = unread_count + (
               SELECT unread_count FROM conversations
               WHERE tenant_id = ?1 AND conversation_id = ?3
             )
           WHERE tenant_id = ?1 AND conversation_id = ?2",
          rusqlite::params![tenant, keep_str, retire_str],
        )?;
        tx.execute(
          "UPDATE conversations SET status = 'resolved', bot_active = 0, unread_count = 0
           WHERE tenant_id = ?1 AND conversation_id = ?2",
          rusqlite::params![tenant, retire_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn find_message_by_external_id(
    &self,
    ctx: &TenantContext,
    external_id: &str,
  ) -> Result<Option<Message>> {
    let tenant      = ctx.tenant_id.clone();
    let external_id = external_id.to_owned();

    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {MESSAGE_COLUMNS} FROM messages
               WHERE tenant_id = ?1 AND external_id = ?2"
            ),
            rusqlite::params![tenant, external_id],
            RawMessage::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn insert_message(&self, ctx: &TenantContext, input: NewMessage) -> Result<MessageInsert> {
    let message = Message {
      message_id:      Uuid::new_v4(),
      tenant_id:       ctx.tenant_id.clone(),
      conversation_id: input.conversation_id,
      content:         input.content,
      sender:          input.sender,
      content_kind:    input.content_kind,
      external_id:     input.external_id,
      status:          input.status,
      created_at:      input.created_at,
      status_at:       None,
    };

    let id_str           = encode_uuid(message.message_id);
    let tenant           = message.tenant_id.clone();
    let conversation_str = encode_uuid(message.conversation_id);
    let content          = message.content.clone();
    let sender_str       = message.sender.as_ref().to_owned();
    let kind_str         = message.content_kind.as_ref().to_owned();
    let external_id      = message.external_id.clone();
    let status_str       = message.status.as_ref().to_owned();
    let created_str      = encode_dt(message.created_at);

    let from_contact     = message.sender == SenderKind::Contact;

    // Insert-if-absent, the conversation counters and the duplicate lookup
    // share one transaction so nothing can interleave between them.
    let existing: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT INTO messages (
             message_id, tenant_id, conversation_id, content, sender,
             content_kind, external_id, status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (tenant_id, external_id) DO NOTHING",
          rusqlite::params![
            id_str,
            tenant,
            conversation_str,
            content,
            sender_str,
            kind_str,
            external_id,
            status_str,
            created_str,
          ],
        )?;
        if inserted == 1 {
          if from_contact {
            tx.execute(
              "UPDATE conversations SET
                 unread_count    = unread_count + 1,
                 last_message_at = max(last_message_at, ?3)
               WHERE tenant_id = ?1 AND conversation_id = ?2",
              rusqlite::params![tenant, conversation_str, created_str],
            )?;
          }
          tx.commit()?;
          return Ok(None);
        }
        let existing = tx.query_row(
          &format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ?1 AND external_id = ?2"
          ),
          rusqlite::params![tenant, external_id],
          RawMessage::from_row,
        )?;
        Ok(Some(existing))
      })
      .await?;

    match existing {
      None => Ok(MessageInsert::Inserted(message)),
      Some(raw) => Ok(MessageInsert::Duplicate(raw.into_message()?)),
    }
  }

  async fn inbound_position(
    &self,
    ctx: &TenantContext,
    message_id: Uuid,
  ) -> Result<Option<InboundPosition>> {
    let tenant = ctx.tenant_id.clone();
    let id_str = encode_uuid(message_id);

    // seq is the insertion order, so exactly one of several concurrent
    // first messages sees nothing before it.
    let position = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT
               NOT EXISTS (
                 SELECT 1 FROM messages p
                 JOIN conversations pc ON pc.conversation_id = p.conversation_id
                 WHERE p.tenant_id = ?1 AND p.sender = 'contact'
                   AND pc.contact_id = c.contact_id AND p.seq < m.seq
               ),
               NOT EXISTS (
                 SELECT 1 FROM messages p
                 WHERE p.tenant_id = ?1 AND p.sender = 'contact'
                   AND p.conversation_id = m.conversation_id AND p.seq < m.seq
               )
             FROM messages m
             JOIN conversations c ON c.conversation_id = m.conversation_id
             WHERE m.tenant_id = ?1 AND m.message_id = ?2",
            rusqlite::params![tenant, id_str],
            |row| {
              Ok(InboundPosition {
                first_for_contact:      row.get(0)?,
                first_for_conversation: row.get(1)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    Ok(position)
  }

  async fn recent_messages(
    &self,
    ctx: &TenantContext,
    conversation_id: Uuid,
    limit: usize,
  ) -> Result<Vec<Message>> {
    let tenant           = ctx.tenant_id.clone();
    let conversation_str = encode_uuid(conversation_id);
    let limit_val        = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM (
             SELECT seq, {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ?1 AND conversation_id = ?2
             ORDER BY seq DESC
             LIMIT ?3
           ) ORDER BY seq ASC"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![tenant, conversation_str, limit_val],
            RawMessage::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn set_message_external_id(
    &self,
    ctx: &TenantContext,
    message_id: Uuid,
    external_id: &str,
  ) -> Result<()> {
    let tenant      = ctx.tenant_id.clone();
    let id_str      = encode_uuid(message_id);
    let external_id = external_id.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE messages SET external_id = ?3 WHERE tenant_id = ?1 AND message_id = ?2",
          rusqlite::params![tenant, id_str, external_id],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| Error::from_write(e, &format!("external id already used (message {message_id})")))?;
    Ok(())
  }

  async fn transition_message_status(
    &self,
    ctx: &TenantContext,
    external_id: &str,
    status: DeliveryStatus,
    at: DateTime<Utc>,
  ) -> Result<StatusTransition> {
    let tenant      = ctx.tenant_id.clone();
    let external_id = external_id.to_owned();
    let at_str      = encode_dt(at);

    let outcome: Option<(String, Option<String>)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<String> = tx
          .query_row(
            "SELECT status FROM messages WHERE tenant_id = ?1 AND external_id = ?2",
            rusqlite::params![tenant, external_id],
            |r| r.get(0),
          )
          .optional()?;

        let Some(current) = current else {
          return Ok(None);
        };

        // An unparseable stored status is left untouched; the decode after
        // the call reports it.
        let next = current
          .parse::<DeliveryStatus>()
          .ok()
          .and_then(|cur| cur.advance(status));

        if let Some(next) = next {
          tx.execute(
            "UPDATE messages SET status = ?3, status_at = ?4
             WHERE tenant_id = ?1 AND external_id = ?2",
            rusqlite::params![tenant, external_id, next.as_ref(), at_str],
          )?;
        }
        tx.commit()?;
        Ok(Some((current, next.map(|n| n.as_ref().to_owned()))))
      })
      .await?;

    let Some((current, applied)) = outcome else {
      return Ok(StatusTransition::Unknown);
    };
    let from: DeliveryStatus = decode_enum("delivery status", &current)?;
    Ok(match applied {
      Some(to) => StatusTransition::Applied { from, to: decode_enum("delivery status", &to)? },
      None => StatusTransition::Stale { current: from },
    })
  }

  // ── Rules ─────────────────────────────────────────────────────────────────

  async fn add_rule(&self, ctx: &TenantContext, input: NewRule) -> Result<AutomationRule> {
    let rule = AutomationRule {
      rule_id:    Uuid::new_v4(),
      tenant_id:  ctx.tenant_id.clone(),
      name:       input.name,
      trigger:    input.trigger,
      action:     input.action,
      enabled:    input.enabled,
      created_at: Utc::now(),
    };

    let id_str       = encode_uuid(rule.rule_id);
    let tenant       = rule.tenant_id.clone();
    let name         = rule.name.clone();
    let kind_str     = rule.trigger.kind().as_ref().to_owned();
    let trigger_json = serde_json::to_string(&rule.trigger)?;
    let action_json  = serde_json::to_string(&rule.action)?;
    let enabled      = rule.enabled;
    let created_str  = encode_dt(rule.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO automation_rules (
             rule_id, tenant_id, name, trigger_kind, trigger_json,
             action_json, enabled, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            tenant,
            name,
            kind_str,
            trigger_json,
            action_json,
            enabled,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(rule)
  }

  async fn list_enabled_rules(&self, ctx: &TenantContext) -> Result<Vec<AutomationRule>> {
    let tenant = ctx.tenant_id.clone();

    let raws: Vec<RawRule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RULE_COLUMNS} FROM automation_rules
           WHERE tenant_id = ?1 AND enabled = 1
           ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant], RawRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRule::into_rule).collect()
  }
}
