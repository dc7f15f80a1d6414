//! # Audio Module
//!
//! Per-guild playback: voice connection lifecycle, the ordered play queue,
//! and the stream contract that ties both to songbird.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One [`session::Session`] per guild, created on first use
//! - Destroys sessions individually or all at once on shutdown
//!
//! ### [`session`] - Guild Session
//! - Runs as its own tokio task with a mailbox; commands and stream
//!   completions are handled one at a time, in arrival order
//! - Owns the voice connection (connect / swap / disconnect)
//!
//! ### [`queue`] - Playback Queue
//! - Append-only entries with a cursor on the current track
//! - Advances on natural end or skip, halts on stop
//!
//! ### [`voice`] / [`driver`] - Voice Pipeline
//! - Trait seam between the queue and the audio backend
//! - songbird implementation with exactly-once completion delivery

pub mod driver;
pub mod queue;
pub mod registry;
pub mod request;
pub mod session;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::SessionRegistry;
pub use request::{Request, Requester};
pub use session::{SessionHandle, SessionSettings};
