//! Typed HTTP client for the coral chat backend.
//!
//! This crate speaks to the external collaborators at their interface
//! boundary:
//!
//! - `GET /api/me` - user profile with subscription state (strict decode)
//! - `GET /api/conversations` - conversation list
//! - `GET /api/conversations/{id}/messages` - message history
//! - `POST /api/billing/intent` - subscription intent
//! - `POST /api/chat` - chunked completion stream
//!
//! The chat endpoint returns a chunked byte stream; [`ApiClient::stream_chat`]
//! decodes it incrementally as UTF-8 text and yields one
//! [`coral_core::StreamChunk`] per decoded fragment, synthesizing the final
//! `done` chunk when the transport signals end-of-stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod decode;

pub use client::{ApiClient, ChatRequest, ClientError};
pub use decode::{DecodeError, Utf8StreamDecoder};
