//! JSON REST API for the human side of Parley.
//!
//! Exposes an axum [`Router`] backed by any
//! [`parley_core::store::EngagementStore`]: reading conversations, taking
//! them over or handing them back to the bot, and managing automation rules.
//! Every request names its tenant in the [`TENANT_HEADER`] header. Auth and
//! TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", parley_api::api_router(store.clone()))
//! ```

pub mod conversations;
pub mod error;
pub mod rules;
pub mod tenant;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use parley_core::store::EngagementStore;

pub use error::ApiError;
pub use tenant::{TENANT_HEADER, Tenant};

/// Build the API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: EngagementStore + 'static,
{
  Router::new()
    // Conversations
    .route("/conversations/{id}", get(conversations::get_one::<S>))
    .route("/conversations/{id}/messages", get(conversations::messages::<S>))
    .route("/conversations/{id}/state", post(conversations::set_state::<S>))
    // Rules
    .route("/rules", get(rules::list::<S>).post(rules::create::<S>))
    .with_state(store)
}
