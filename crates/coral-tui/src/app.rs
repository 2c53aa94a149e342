//! Application state and conversation binding.
//!
//! The `App` is the conversation selector: it owns the workspace cache, the
//! history store and the stream controller, binds them to the active
//! conversation, and enforces the submission invariants (one stream at a
//! time, entitlement before any network call).

use tokio::sync::mpsc;
use tracing::debug;

use coral_client::{ApiClient, ChatRequest};
use coral_core::{
    ChatError, HistoryStore, Message, MessageStatus, StreamController, StreamError, StreamPayload,
    StreamUpdate, Viewport, DEFAULT_MODEL,
};

use crate::cache::WorkspaceCache;

/// Which panel has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    /// Left column: conversation list.
    #[default]
    Conversations,
    /// Right column: chat area with the composer.
    Chat,
}

impl Focus {
    /// Toggle to the other column.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Conversations => Self::Chat,
            Self::Chat => Self::Conversations,
        }
    }
}

/// Application state.
pub struct App {
    /// HTTP client for the backend.
    client: ApiClient,
    /// Owned cache of profile and conversations.
    pub cache: WorkspaceCache,
    /// Id of the conversation the history is bound to.
    pub active_conversation: Option<String>,
    /// Cursor in the (sorted) conversation list.
    pub selected: Option<usize>,
    /// Message history of the active conversation.
    pub history: HistoryStore,
    /// Stream lifecycle state machine.
    controller: StreamController,
    /// Windowed scroll state over the merged view.
    pub viewport: Viewport,
    /// Where consumer tasks deliver their updates.
    updates_tx: mpsc::Sender<StreamUpdate>,

    /// Composer draft.
    pub input: String,
    /// Cursor position in the draft, in characters.
    pub cursor_position: usize,
    /// Which panel has focus.
    pub focus: Focus,
    /// Transient status line.
    pub status_message: Option<String>,
    /// Transient error line.
    pub error_message: Option<String>,
    /// Background refresh failure, shown without blocking.
    pub refresh_error: Option<String>,
    /// Page-blocking failure (profile/history load). Fail-closed: while set,
    /// only quitting is allowed.
    pub fatal_error: Option<String>,
    /// History fetch in progress after a conversation switch.
    pub loading_messages: bool,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for the streaming spinner.
    pub animation_frame: usize,
}

impl App {
    /// Create a new application.
    #[must_use]
    pub fn new(
        client: ApiClient,
        cache: WorkspaceCache,
        updates_tx: mpsc::Sender<StreamUpdate>,
    ) -> Self {
        Self {
            client,
            cache,
            active_conversation: None,
            selected: None,
            history: HistoryStore::new(),
            controller: StreamController::new(),
            viewport: Viewport::new(0),
            updates_tx,
            input: String::new(),
            cursor_position: 0,
            focus: Focus::Conversations,
            status_message: None,
            error_message: None,
            refresh_error: None,
            fatal_error: None,
            loading_messages: false,
            should_quit: false,
            animation_frame: 0,
        }
    }

    /// Initial workspace load: profile and conversations, then bind the
    /// first conversation. Failures block the page: continuing with
    /// unknown entitlement state would bypass the paywall.
    pub async fn bootstrap(&mut self) {
        if let Err(e) = self.cache.refresh_profile().await {
            self.fatal_error = Some(format!("Failed to load workspace: {e}"));
            return;
        }
        if let Err(e) = self.cache.refresh_conversations().await {
            self.fatal_error = Some(format!("Failed to load workspace: {e}"));
            return;
        }
        if !self.cache.conversations().is_empty() {
            self.selected = Some(0);
            self.activate_selected().await;
        }
    }

    // =========================================================================
    // Status lines
    // =========================================================================

    /// API origin, for the header bar.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Current spinner character for the streaming indicator.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    // =========================================================================
    // Conversation list
    // =========================================================================

    /// Move selection up in the conversation list.
    pub fn select_prev_conversation(&mut self) {
        let count = self.cache.conversations().len();
        if count == 0 {
            return;
        }
        self.selected = Some(match self.selected {
            Some(0) | None => count - 1,
            Some(i) => i - 1,
        });
    }

    /// Move selection down in the conversation list.
    pub fn select_next_conversation(&mut self) {
        let count = self.cache.conversations().len();
        if count == 0 {
            return;
        }
        self.selected = Some(match self.selected {
            Some(i) if i + 1 < count => i + 1,
            _ => 0,
        });
    }

    /// The conversation under the list cursor.
    #[must_use]
    pub fn selected_conversation(&self) -> Option<&coral_core::Conversation> {
        self.selected.and_then(|i| self.cache.conversations().get(i))
    }

    /// The active (bound) conversation.
    #[must_use]
    pub fn active_conversation(&self) -> Option<&coral_core::Conversation> {
        self.active_conversation
            .as_deref()
            .and_then(|id| self.cache.conversation(id))
    }

    /// Bind the selected conversation: cancel any in-flight stream for the
    /// previous one, drop its accumulator, then load history before
    /// accepting new submissions.
    pub async fn activate_selected(&mut self) {
        let Some(id) = self.selected_conversation().map(|c| c.id.clone()) else {
            return;
        };
        if self.active_conversation.as_deref() == Some(&id) {
            return;
        }

        // Cancellation is issued before any binding work begins, so a stale
        // stream can never write into the new conversation's slot.
        self.controller.cancel();
        self.history.clear();
        self.active_conversation = None;
        self.loading_messages = true;

        debug!(conversation_id = %id, "binding conversation");

        match self.client.conversation_messages(&id).await {
            Ok(messages) => {
                self.history = HistoryStore::load(messages);
                self.active_conversation = Some(id);
                let rows = self.history.merged_view().len();
                self.viewport.scroll_to_bottom(rows);
            }
            Err(e) => {
                self.fatal_error = Some(format!("Failed to load messages: {e}"));
            }
        }
        self.loading_messages = false;
    }

    /// Refresh the conversation list, preserving the selection and the
    /// active binding.
    pub async fn refresh_conversations(&mut self) {
        match self.cache.refresh_conversations().await {
            Ok(_) => {
                self.refresh_error = None;
                self.sync_selection();
            }
            Err(e) => {
                self.refresh_error = Some(format!("Refresh failed: {e}"));
            }
        }
    }

    /// Drop all cached workspace data and refetch it.
    pub async fn hard_refresh(&mut self) {
        self.cache.invalidate();
        if let Err(e) = self.cache.refresh_profile().await {
            self.fatal_error = Some(format!("Failed to load workspace: {e}"));
            return;
        }
        self.refresh_conversations().await;
    }

    /// Re-point `selected` at the active conversation after the list was
    /// re-sorted, or clamp it into range.
    fn sync_selection(&mut self) {
        let conversations = self.cache.conversations();
        if let Some(active) = self.active_conversation.as_deref() {
            if let Some(pos) = conversations.iter().position(|c| c.id == active) {
                self.selected = Some(pos);
                return;
            }
        }
        match self.selected {
            Some(i) if i >= conversations.len() => {
                self.selected = conversations.len().checked_sub(1);
            }
            _ => {}
        }
    }

    // =========================================================================
    // Composer input
    // =========================================================================

    fn byte_offset(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_offset();
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_offset();
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        let at = self.byte_offset();
        if at < self.input.len() {
            self.input.remove(at);
        }
    }

    /// Delete back to the previous word boundary.
    pub fn delete_word(&mut self) {
        while self.cursor_position > 0 {
            self.delete_char();
            if self.cursor_position > 0 {
                let at = self.byte_offset();
                if self.input[..at].ends_with(' ') {
                    break;
                }
            }
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input.chars().count();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Whether a response stream is active.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.controller.is_streaming()
    }

    /// Whether the composer accepts a submission right now.
    #[must_use]
    pub fn composer_enabled(&self) -> bool {
        self.fatal_error.is_none()
            && self.active_conversation.is_some()
            && !self.is_streaming()
            && !self.loading_messages
    }

    /// Submit the current draft.
    ///
    /// Refused without any network call when the plan requires payment, when
    /// a stream is already active, or when no conversation is bound. On
    /// success the user message is appended optimistically and the stream is
    /// opened.
    ///
    /// # Errors
    ///
    /// Returns the typed refusal; the caller decides how to surface it.
    pub fn submit(&mut self) -> Result<(), ChatError> {
        let draft = self.input.trim().to_string();
        if draft.is_empty() {
            return Ok(());
        }

        let Some(conversation_id) = self.active_conversation.clone() else {
            return Err(ChatError::NoConversation);
        };
        if self.is_streaming() {
            return Err(ChatError::StreamActive);
        }
        let Some(plan) = self.cache.plan() else {
            // Unknown entitlement is treated as blocked (fail-closed).
            return Err(ChatError::Entitlement(coral_core::PlanTier::Free));
        };
        if plan.blocks_submission() {
            return Err(ChatError::Entitlement(plan.tier));
        }

        self.clear_input();
        self.history.append(Message::user(draft.as_str()));
        let rows = self.history.merged_view().len();
        self.viewport.scroll_to_bottom(rows);

        let model = self
            .active_conversation()
            .map_or_else(|| DEFAULT_MODEL.to_string(), |c| c.model.clone());
        let request = ChatRequest {
            conversation_id,
            message: draft,
            model,
            system_prompt: None,
            attachments: None,
        };

        let client = self.client.clone();
        self.controller.start(
            async move {
                client
                    .stream_chat(&request)
                    .await
                    .map_err(StreamError::from)
            },
            self.updates_tx.clone(),
        );
        self.set_status("Responding… (Esc to cancel)");
        Ok(())
    }

    /// Apply one update from the consumer task.
    ///
    /// Returns `true` if the UI should be redrawn. Updates from a superseded
    /// stream are dropped without touching any state.
    pub fn handle_stream_update(&mut self, update: StreamUpdate) -> bool {
        if !self.controller.accepts(update.stream_id) {
            debug!(stream_id = update.stream_id, "dropping stale stream update");
            return false;
        }

        match update.payload {
            StreamPayload::Chunk(fragment) => {
                let rows = self.history.merged_view().len();
                self.viewport.record_anchor(rows);
                self.history.extend_in_flight(&fragment);
                let rows = self.history.merged_view().len();
                self.viewport.follow(rows);
                true
            }
            StreamPayload::Done => {
                self.controller.mark_completed();
                self.history.promote_in_flight();
                self.history.mark_last_user(MessageStatus::Done);
                let rows = self.history.merged_view().len();
                self.viewport.follow(rows);
                self.status_message = None;
                true
            }
            StreamPayload::Failed(error) => {
                self.controller.mark_errored(error.clone());
                // The accumulator is discarded atomically with the error; no
                // partial assistant message is retained.
                self.history.clear_in_flight();
                self.history.mark_last_user(MessageStatus::Error);
                self.status_message = None;
                self.set_error(format!("Failed to deliver: {error}"));
                true
            }
        }
    }

    /// Cancel the current response stream. Not an error: the accumulator is
    /// dropped and no error indicator is shown.
    pub fn cancel_streaming(&mut self) {
        if !self.is_streaming() {
            return;
        }
        self.controller.cancel();
        self.history.clear_in_flight();
        self.status_message = Some("Cancelled".to_string());
    }

    // =========================================================================
    // Billing
    // =========================================================================

    /// Post a subscription intent for the current tier, then refetch the
    /// profile so the gate reflects the updated plan.
    pub async fn upgrade(&mut self) {
        let Some(tier) = self.cache.plan().map(|p| p.tier) else {
            return;
        };
        match self.client.submit_billing_intent(tier).await {
            Ok(plan) => {
                self.cache.set_plan(plan);
                if let Err(e) = self.cache.refresh_profile().await {
                    self.set_error(format!("Billing updated, profile refresh failed: {e}"));
                    return;
                }
                self.set_status("Subscription updated");
            }
            Err(e) => {
                self.set_error(format!("Billing request failed: {e}"));
            }
        }
    }

    // =========================================================================
    // Scrolling
    // =========================================================================

    /// Scroll the chat up (towards older messages).
    pub fn scroll_chat_up(&mut self, lines: usize) {
        self.viewport.scroll_up(lines);
    }

    /// Scroll the chat down (towards newer messages).
    pub fn scroll_chat_down(&mut self, lines: usize) {
        let rows = self.history.merged_view().len();
        self.viewport.scroll_down(lines, rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile_json(requires_payment: bool) -> serde_json::Value {
        json!({
            "id": "u-1",
            "name": "Ada",
            "email": "ada@example.com",
            "plan": {
                "tier": if requires_payment { "free" } else { "plus" },
                "features": [],
                "requiresPayment": requires_payment
            }
        })
    }

    fn conversations_json() -> serde_json::Value {
        json!([{
            "id": "c-1",
            "title": "Rust questions",
            "model": "gpt-4.1",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-02T00:00:00Z"
        }])
    }

    async fn mount_workspace(server: &MockServer, requires_payment: bool) {
        Mock::given(method("GET"))
            .and(path("/api/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_json(requires_payment)))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversations_json()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/conversations/c-1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }

    fn app_for(server: &MockServer) -> (App, mpsc::Receiver<StreamUpdate>) {
        let client = ApiClient::new(server.uri());
        let cache = WorkspaceCache::new(client.clone());
        let (tx, rx) = mpsc::channel(64);
        (App::new(client, cache, tx), rx)
    }

    /// Drive updates from the consumer task into the app until the stream
    /// resolves.
    async fn drain_stream(app: &mut App, rx: &mut mpsc::Receiver<StreamUpdate>) {
        while app.is_streaming() {
            let update = rx.recv().await.expect("stream update");
            app.handle_stream_update(update);
        }
    }

    #[tokio::test]
    async fn submit_streams_and_finalizes_history() {
        let server = MockServer::start().await;
        mount_workspace(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Hello there"))
            .mount(&server)
            .await;

        let (mut app, mut rx) = app_for(&server);
        app.bootstrap().await;
        assert!(app.fatal_error.is_none());
        assert_eq!(app.active_conversation.as_deref(), Some("c-1"));

        app.input = "Hi".to_string();
        app.submit().unwrap();
        assert!(app.is_streaming());

        drain_stream(&mut app, &mut rx).await;

        let messages = app.history.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[0].status, Some(MessageStatus::Done));
        assert_eq!(messages[1].content, "Hello there");
        assert_eq!(messages[1].status, Some(MessageStatus::Done));
        // No synthetic streaming row remains.
        assert_eq!(app.history.merged_view().len(), 2);
        assert_eq!(app.history.in_flight(), None);
    }

    #[tokio::test]
    async fn payment_required_refuses_before_any_network_call() {
        let server = MockServer::start().await;
        mount_workspace(&server, true).await;
        // The chat endpoint must never be hit.
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (mut app, _rx) = app_for(&server);
        app.bootstrap().await;

        app.input = "Hi".to_string();
        let error = app.submit().unwrap_err();
        assert!(matches!(error, ChatError::Entitlement(_)));
        assert!(!app.is_streaming());
        assert!(app.history.is_empty());

        server.verify().await;
    }

    #[tokio::test]
    async fn transport_error_marks_user_message_failed() {
        let server = MockServer::start().await;
        mount_workspace(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let (mut app, mut rx) = app_for(&server);
        app.bootstrap().await;

        app.input = "Hi".to_string();
        app.submit().unwrap();
        drain_stream(&mut app, &mut rx).await;

        let messages = app.history.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, Some(MessageStatus::Error));
        assert_eq!(app.history.in_flight(), None);
        assert!(app.error_message.is_some());
    }

    #[tokio::test]
    async fn second_submission_refused_while_streaming() {
        let server = MockServer::start().await;
        mount_workspace(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow reply")
                    .set_delay(std::time::Duration::from_millis(250)),
            )
            .mount(&server)
            .await;

        let (mut app, mut rx) = app_for(&server);
        app.bootstrap().await;

        app.input = "first".to_string();
        app.submit().unwrap();

        app.input = "second".to_string();
        assert!(matches!(app.submit().unwrap_err(), ChatError::StreamActive));

        drain_stream(&mut app, &mut rx).await;
    }

    #[tokio::test]
    async fn cancel_before_first_chunk_leaves_no_trace() {
        let server = MockServer::start().await;
        mount_workspace(&server, false).await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("never applied")
                    .set_delay(std::time::Duration::from_secs(60)),
            )
            .mount(&server)
            .await;

        let (mut app, mut rx) = app_for(&server);
        app.bootstrap().await;

        app.input = "Hi".to_string();
        app.submit().unwrap();
        app.cancel_streaming();

        assert!(!app.is_streaming());
        // Only the optimistic user message exists; no assistant message, no
        // error indicator.
        assert_eq!(app.history.len(), 1);
        assert_eq!(app.history.in_flight(), None);
        assert!(app.error_message.is_none());

        // Anything a stale consumer might still deliver is dropped.
        if let Ok(update) = rx.try_recv() {
            assert!(!app.handle_stream_update(update));
        }
    }
}
