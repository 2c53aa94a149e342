//! Core chat engine for coral.
//!
//! This crate provides the pieces of the client that hold state and
//! invariants, with no I/O of their own:
//!
//! - **Message model**: messages, conversations, plans and stream chunks
//! - **History store**: ordered finalized messages plus one in-flight slot
//! - **Stream controller**: lifecycle of a single chunked completion stream
//! - **Viewport**: windowed rendering over an unbounded message history
//!
//! The transport lives in `coral-client`; the terminal front end in
//! `coral-tui`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod history;
pub mod message;
pub mod stream;
pub mod viewport;

pub use error::{ChatError, Result};
pub use history::{HistoryStore, ViewRow, STREAMING_ROW_ID};
pub use message::{
    Conversation, Message, MessageStatus, PlanInfo, PlanTier, Role, StreamChunk, UserProfile,
    DEFAULT_MODEL,
};
pub use stream::{
    ChunkStream, StreamController, StreamError, StreamPayload, StreamPhase, StreamUpdate,
};
pub use viewport::Viewport;
