//! Core types and trait definitions for the Parley inbound pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! SQLite store, the provider clients and the engine all depend on it.

// Trait methods spell out `Send` futures; implementors write plain `async fn`.
// The lint only matters for traits that do not.
#![allow(async_fn_in_trait)]

pub mod capability;
pub mod contact;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod rule;
pub mod store;
pub mod tenant;

pub use error::{Error, Result};
