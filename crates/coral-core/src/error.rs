//! Common error types for coral.
//!
//! Submission-side refusals live here; transport and stream failures have
//! their own types in `coral-client` and [`crate::stream`].

use crate::message::PlanTier;
use thiserror::Error;

/// A result type using `ChatError`.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors raised before a stream is ever opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The subscription requires payment; submission is refused before any
    /// network call is made.
    #[error("subscription requires payment (tier: {0})")]
    Entitlement(PlanTier),

    /// A response stream is already active for this conversation.
    #[error("a response is already streaming for this conversation")]
    StreamActive,

    /// No conversation is bound yet.
    #[error("no active conversation")]
    NoConversation,
}
