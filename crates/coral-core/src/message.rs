//! Chat data model: messages, conversations, plans and stream chunks.
//!
//! These types mirror the JSON wire format of the backend collaborators
//! (camelCase field names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Model requested for conversations that do not carry their own.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

// =============================================================================
// Messages
// =============================================================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing into the composer.
    User,
    /// The completion service.
    Assistant,
    /// Injected system prompt material.
    System,
}

/// Delivery status of a message.
///
/// Historical messages loaded from the backend carry no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Optimistically appended, not yet confirmed delivered.
    Sending,
    /// The in-flight assistant reply.
    Streaming,
    /// Delivery failed; shown with a "failed to deliver" marker.
    Error,
    /// Finalized.
    Done,
}

/// A single chat message.
///
/// Identity is `id`. Content is immutable once the message is finalized or
/// loaded as historical; only the in-flight accumulator (which is not a
/// `Message` at all, see [`crate::history`]) mutates during streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Message text (markdown).
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Delivery status; absent for historical messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

impl Message {
    /// Create an optimistic user message for a just-submitted draft.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            status: Some(MessageStatus::Sending),
        }
    }

    /// Create a finalized assistant message from completed stream content.
    #[must_use]
    pub fn assistant_done(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            status: Some(MessageStatus::Done),
        }
    }

    /// Whether this message failed to deliver.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == Some(MessageStatus::Error)
    }
}

// =============================================================================
// Conversations
// =============================================================================

/// A conversation as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Model used for completions in this conversation.
    pub model: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp; the display ordering key.
    pub updated_at: DateTime<Utc>,
    /// Pinned conversations sort above everything else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Has activity the user has not seen yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
}

impl Conversation {
    /// Whether the conversation is pinned.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned.unwrap_or(false)
    }

    /// Whether the conversation has unread activity.
    #[must_use]
    pub fn is_unread(&self) -> bool {
        self.unread.unwrap_or(false)
    }
}

/// Sort conversations for display: pinned first, then `updated_at`
/// descending. Ties within timestamp resolution break by reverse insertion
/// order (later-seen first).
pub fn sort_conversations(conversations: &mut Vec<Conversation>) {
    let mut decorated: Vec<(usize, Conversation)> =
        conversations.drain(..).enumerate().collect();
    decorated.sort_by(|(ia, a), (ib, b)| {
        b.is_pinned()
            .cmp(&a.is_pinned())
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| ib.cmp(ia))
    });
    *conversations = decorated.into_iter().map(|(_, c)| c).collect();
}

// =============================================================================
// Plans and profiles
// =============================================================================

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Unpaid tier.
    Free,
    /// Individual paid tier.
    Plus,
    /// Team tier.
    Team,
    /// Enterprise tier.
    Enterprise,
}

impl PlanTier {
    /// Display string for the tier badge.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Plus => "plus",
            Self::Team => "team",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription state attached to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    /// Subscription tier.
    pub tier: PlanTier,
    /// When the current period expires, if bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Seats purchased, for team plans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_count: Option<u32>,
    /// Feature flags enabled for this plan.
    pub features: Vec<String>,
    /// Payment is outstanding; submission must be refused while true.
    pub requires_payment: bool,
}

impl PlanInfo {
    /// Whether submission must be refused with an entitlement error.
    #[must_use]
    pub const fn blocks_submission(&self) -> bool {
        self.requires_payment
    }

    /// Whether the upgrade banner should be shown.
    #[must_use]
    pub fn needs_upgrade(&self) -> bool {
        self.requires_payment || self.tier == PlanTier::Free
    }
}

/// User profile as returned by the backend.
///
/// Decoding is strict: a payload missing any required field is a decode
/// error, never a partially-rendered profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Account email.
    pub email: String,
    /// Avatar image URL, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Subscription state.
    pub plan: PlanInfo,
}

// =============================================================================
// Stream chunks
// =============================================================================

/// One fragment of a chunked completion stream.
///
/// A chunk with `done` set is the sole legitimate terminator of a stream and
/// carries no content; content alongside `done` is undefined input and is
/// ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Decoded text fragment.
    pub content: String,
    /// Terminator marker.
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    /// A content-bearing chunk.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
        }
    }

    /// The terminator chunk synthesized at end-of-stream.
    #[must_use]
    pub fn terminator() -> Self {
        Self {
            content: String::new(),
            done: true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conv(id: &str, pinned: bool, updated_secs: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: format!("conversation {id}"),
            model: DEFAULT_MODEL.to_string(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(updated_secs, 0).unwrap(),
            pinned: pinned.then_some(true),
            unread: None,
        }
    }

    #[test]
    fn message_deserializes_wire_format() {
        let json = r#"{
            "id": "m-1",
            "role": "assistant",
            "content": "Hello there",
            "createdAt": "2026-01-01T00:00:00Z",
            "status": "done"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "m-1");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.status, Some(MessageStatus::Done));
    }

    #[test]
    fn historical_message_without_status() {
        let json = r#"{
            "id": "m-2",
            "role": "user",
            "content": "Hi",
            "createdAt": "2026-01-01T00:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.status, None);
    }

    #[test]
    fn optimistic_user_message_starts_sending() {
        let msg = Message::user("Hi");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.status, Some(MessageStatus::Sending));
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn conversations_sort_pinned_then_recency() {
        let mut items = vec![
            conv("old", false, 100),
            conv("new", false, 300),
            conv("pinned-old", true, 50),
            conv("mid", false, 200),
        ];
        sort_conversations(&mut items);
        let ids: Vec<&str> = items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pinned-old", "new", "mid", "old"]);
    }

    #[test]
    fn conversations_sort_ties_break_by_reverse_insertion() {
        let mut items = vec![conv("first", false, 100), conv("second", false, 100)];
        sort_conversations(&mut items);
        let ids: Vec<&str> = items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn plan_gating() {
        let plan = PlanInfo {
            tier: PlanTier::Free,
            expires_at: None,
            seat_count: None,
            features: vec![],
            requires_payment: true,
        };
        assert!(plan.blocks_submission());
        assert!(plan.needs_upgrade());

        let paid = PlanInfo {
            tier: PlanTier::Plus,
            expires_at: None,
            seat_count: None,
            features: vec!["streaming".to_string()],
            requires_payment: false,
        };
        assert!(!paid.blocks_submission());
        assert!(!paid.needs_upgrade());
    }

    #[test]
    fn free_tier_without_outstanding_payment_can_submit() {
        let plan = PlanInfo {
            tier: PlanTier::Free,
            expires_at: None,
            seat_count: None,
            features: vec![],
            requires_payment: false,
        };
        assert!(!plan.blocks_submission());
        assert!(plan.needs_upgrade());
    }

    #[test]
    fn profile_decode_rejects_missing_plan() {
        let json = r#"{"id":"u-1","name":"Ada","email":"ada@example.com"}"#;
        let result: Result<UserProfile, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn stream_chunk_done_defaults_false() {
        let chunk: StreamChunk = serde_json::from_str(r#"{"content":"he"}"#).unwrap();
        assert!(!chunk.done);
        assert!(StreamChunk::terminator().done);
        assert!(StreamChunk::terminator().content.is_empty());
    }
}
