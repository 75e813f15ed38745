//! The Parley inbound pipeline.
//!
//! Turns a normalized [`InboundEvent`](parley_core::event::InboundEvent) into a
//! persisted message on the contact's single open conversation, then at most
//! one automated reply: either an automation rule (dispatched to the
//! [`WorkerPool`]) or an assistant reply through the [`HandoffController`],
//! which runs on a background task so acknowledging the event never waits
//! on inference.
//! Status callbacks take the independent [`StatusTracker`] path.
//!
//! Storage faults before the inbound message is persisted are returned to the
//! caller so the transport re-delivers. Everything after that point is logged
//! and swallowed.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handoff;
pub mod matcher;
pub mod orchestrator;
pub mod outbound;
pub mod resolver;
pub mod session;
pub mod status;

pub use config::PipelineConfig;
pub use dispatch::{AutomationJob, Dispatch, DispatchError, WorkerPool};
pub use error::PipelineError;
pub use handoff::{HandoffController, HandoffOutcome};
pub use orchestrator::{Accepted, EventSink, InboundOutcome, Pipeline, ResponseKind};
pub use resolver::ContactResolver;
pub use session::SessionManager;
pub use status::StatusTracker;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;
