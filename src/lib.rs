//! Client core for the Trackitnow habit tracker.
//!
//! Everything here is front-end agnostic: state lives in a [`cell::StateCell`]
//! chosen by the caller and all I/O goes through an [`api::Transport`]. The
//! browser app and the native CLI plug in their own of each.

pub mod api;
pub mod auth;
pub mod cell;
pub mod chats;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod friends;
pub mod models;
pub mod optimistic;
pub mod profile;
pub mod progress;
pub mod session;
pub mod storage;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, Transport};
pub use cell::{Shared, StateCell};
pub use config::ClientConfig;
pub use errors::{ApiError, StorageError, TransportError, ValidationError};
pub use session::{Session, SessionPhase, SessionStore, SignOutReason};
