//! Ordered message history with a single transient in-flight slot.
//!
//! The store keeps two things: the committed sequence of finalized messages,
//! and the accumulator for the one assistant reply currently streaming. The
//! merged render view is a maintained projection of both (finalized rows
//! plus one trailing streaming row), updated in place so a chunk arriving
//! mid-stream touches exactly one row, never the whole list.

use crate::message::{Message, MessageStatus, Role};

/// Fixed row id for the in-flight streaming entry.
///
/// The streaming row is a distinct [`ViewRow`] variant, so this id can never
/// collide with a real message id; it exists so renderers that diff by row id
/// treat stream growth as an in-place update rather than an insertion.
pub const STREAMING_ROW_ID: &str = "streaming";

/// One row of the merged render view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRow {
    /// A finalized (or historical) message.
    Historical(Message),
    /// The in-flight assistant reply accumulated so far.
    Streaming(String),
}

impl ViewRow {
    /// Row identity for diffing.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Historical(message) => &message.id,
            Self::Streaming(_) => STREAMING_ROW_ID,
        }
    }

    /// Row text.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Historical(message) => &message.content,
            Self::Streaming(text) => text,
        }
    }

    /// Author role; the streaming row is always the assistant.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Historical(message) => message.role,
            Self::Streaming(_) => Role::Assistant,
        }
    }

    /// Whether this is the in-flight row.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

/// Ordered finalized messages plus at most one in-flight accumulator.
#[derive(Debug, Default)]
pub struct HistoryStore {
    messages: Vec<Message>,
    in_flight: String,
    view: Vec<ViewRow>,
}

impl HistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from historical messages.
    #[must_use]
    pub fn load(messages: Vec<Message>) -> Self {
        let view = messages.iter().cloned().map(ViewRow::Historical).collect();
        Self {
            messages,
            in_flight: String::new(),
            view,
        }
    }

    /// The committed message sequence.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of finalized messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store holds no finalized messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The in-flight accumulator, if non-empty.
    #[must_use]
    pub fn in_flight(&self) -> Option<&str> {
        if self.in_flight.is_empty() {
            None
        } else {
            Some(&self.in_flight)
        }
    }

    /// The merged render view: finalized rows, then one streaming row iff
    /// the accumulator is non-empty. Repeated reads of an unchanged store
    /// return the same cached slice.
    #[must_use]
    pub fn merged_view(&self) -> &[ViewRow] {
        &self.view
    }

    /// Append a finalized message at the end of the sequence.
    ///
    /// No reordering and no dedup: identity is the caller's concern. The
    /// streaming row, if present, stays trailing.
    pub fn append(&mut self, message: Message) {
        let insert_at = if self.in_flight.is_empty() {
            self.view.len()
        } else {
            self.view.len() - 1
        };
        self.view.insert(insert_at, ViewRow::Historical(message.clone()));
        self.messages.push(message);
    }

    /// Append a fragment to the in-flight accumulator.
    pub fn extend_in_flight(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.in_flight.push_str(fragment);
        match self.view.last_mut() {
            Some(ViewRow::Streaming(text)) => text.push_str(fragment),
            _ => self.view.push(ViewRow::Streaming(self.in_flight.clone())),
        }
    }

    /// Discard the in-flight accumulator (stream error or cancellation).
    pub fn clear_in_flight(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        self.in_flight.clear();
        if matches!(self.view.last(), Some(ViewRow::Streaming(_))) {
            self.view.pop();
        }
    }

    /// Atomically drain the accumulator into a new finalized assistant
    /// message. No-op when the accumulator is empty, which makes a second
    /// call after stream completion harmless.
    pub fn promote_in_flight(&mut self) -> Option<&Message> {
        if self.in_flight.is_empty() {
            return None;
        }
        let content = std::mem::take(&mut self.in_flight);
        if matches!(self.view.last(), Some(ViewRow::Streaming(_))) {
            self.view.pop();
        }
        let message = Message::assistant_done(content);
        self.view.push(ViewRow::Historical(message.clone()));
        self.messages.push(message);
        self.messages.last()
    }

    /// Set the status of the most recent user message (delivery confirmation
    /// on completion, `Error` on transport failure).
    pub fn mark_last_user(&mut self, status: MessageStatus) {
        if let Some(pos) = self.messages.iter().rposition(|m| m.role == Role::User) {
            self.messages[pos].status = Some(status);
            if let Some(ViewRow::Historical(row)) = self.view.get_mut(pos) {
                row.status = Some(status);
            }
        }
    }

    /// Drop everything; used when rebinding to another conversation.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight.clear();
        self.view.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_view_has_no_streaming_row_when_idle() {
        let mut store = HistoryStore::new();
        store.append(Message::user("Hi"));
        assert_eq!(store.merged_view().len(), 1);
        assert!(!store.merged_view()[0].is_streaming());
    }

    #[test]
    fn streaming_row_appears_only_when_accumulator_nonempty() {
        let mut store = HistoryStore::new();
        store.append(Message::user("Hi"));

        store.extend_in_flight("");
        assert_eq!(store.merged_view().len(), 1);

        store.extend_in_flight("Hel");
        assert_eq!(store.merged_view().len(), 2);
        let row = store.merged_view().last().unwrap();
        assert!(row.is_streaming());
        assert_eq!(row.id(), STREAMING_ROW_ID);
        assert_eq!(row.role(), Role::Assistant);
    }

    #[test]
    fn chunk_boundaries_do_not_change_final_content() {
        let mut split = HistoryStore::new();
        split.extend_in_flight("he");
        split.extend_in_flight("llo");
        let split_msg = split.promote_in_flight().unwrap().content.clone();

        let mut whole = HistoryStore::new();
        whole.extend_in_flight("hello");
        let whole_msg = whole.promote_in_flight().unwrap().content.clone();

        assert_eq!(split_msg, whole_msg);
        assert_eq!(split_msg, "hello");
    }

    #[test]
    fn streaming_updates_mutate_one_trailing_row() {
        let mut store = HistoryStore::new();
        store.append(Message::user("Hi"));
        store.extend_in_flight("Hel");
        store.extend_in_flight("lo there");

        let view = store.merged_view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].content(), "Hello there");
        assert_eq!(store.in_flight(), Some("Hello there"));
    }

    #[test]
    fn promote_is_idempotent() {
        let mut store = HistoryStore::new();
        store.extend_in_flight("Hello there");

        assert!(store.promote_in_flight().is_some());
        assert!(store.promote_in_flight().is_none());

        assert_eq!(store.len(), 1);
        assert_eq!(store.merged_view().len(), 1);
        assert_eq!(store.in_flight(), None);
    }

    #[test]
    fn promote_finalizes_with_done_status() {
        let mut store = HistoryStore::new();
        store.append(Message::user("Hi"));
        store.extend_in_flight("Hello there");
        store.promote_in_flight();

        let view = store.merged_view();
        assert_eq!(view.len(), 2);
        assert!(!view[1].is_streaming());
        match &view[1] {
            ViewRow::Historical(msg) => {
                assert_eq!(msg.role, Role::Assistant);
                assert_eq!(msg.content, "Hello there");
                assert_eq!(msg.status, Some(MessageStatus::Done));
                assert_ne!(msg.id, STREAMING_ROW_ID);
            }
            ViewRow::Streaming(_) => unreachable!(),
        }
    }

    #[test]
    fn clear_in_flight_retains_no_partial_reply() {
        let mut store = HistoryStore::new();
        store.append(Message::user("Hi"));
        store.extend_in_flight("partial answ");
        store.clear_in_flight();

        assert_eq!(store.in_flight(), None);
        assert_eq!(store.merged_view().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_during_streaming_keeps_streaming_row_trailing() {
        let mut store = HistoryStore::new();
        store.extend_in_flight("thinking...");
        store.append(Message::user("follow-up"));

        let view = store.merged_view();
        assert_eq!(view.len(), 2);
        assert!(!view[0].is_streaming());
        assert!(view[1].is_streaming());
    }

    #[test]
    fn mark_last_user_flips_status_in_both_projections() {
        let mut store = HistoryStore::new();
        store.append(Message::user("first"));
        store.append(Message::assistant_done("reply"));
        store.append(Message::user("second"));

        store.mark_last_user(MessageStatus::Error);

        assert_eq!(store.messages()[2].status, Some(MessageStatus::Error));
        match &store.merged_view()[2] {
            ViewRow::Historical(msg) => assert!(msg.is_failed()),
            ViewRow::Streaming(_) => unreachable!(),
        }
        // The earlier user message is untouched.
        assert_eq!(store.messages()[0].status, Some(MessageStatus::Sending));
    }

    #[test]
    fn load_builds_matching_view() {
        let store = HistoryStore::load(vec![
            Message::user("a"),
            Message::assistant_done("b"),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.merged_view().len(), 2);
        assert_eq!(store.merged_view()[1].content(), "b");
    }
}
