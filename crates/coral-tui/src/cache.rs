//! Owned cache of workspace data fetched from the backend.
//!
//! There is no ambient client-side query cache: this object is constructed
//! in `main`, handed to the [`crate::app::App`], and refreshed through
//! explicit operations.

use coral_client::{ApiClient, ClientError};
use coral_core::message::sort_conversations;
use coral_core::{Conversation, PlanInfo, UserProfile};

/// Cached profile and conversation list, with explicit refetch.
#[derive(Debug)]
pub struct WorkspaceCache {
    client: ApiClient,
    profile: Option<UserProfile>,
    conversations: Vec<Conversation>,
}

impl WorkspaceCache {
    /// Create an empty cache backed by the given client.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            profile: None,
            conversations: Vec::new(),
        }
    }

    /// The cached profile, if fetched.
    #[must_use]
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// The cached subscription state, if fetched.
    #[must_use]
    pub fn plan(&self) -> Option<&PlanInfo> {
        self.profile.as_ref().map(|p| &p.plan)
    }

    /// Cached conversations in display order (pinned first, then recency).
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Look up a cached conversation by id.
    #[must_use]
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Refetch the profile.
    ///
    /// # Errors
    ///
    /// Returns the client error; the cached profile is left untouched so a
    /// failed refresh never degrades already-known entitlement state.
    pub async fn refresh_profile(&mut self) -> Result<&UserProfile, ClientError> {
        let profile = self.client.fetch_profile().await?;
        Ok(self.profile.insert(profile))
    }

    /// Refetch and re-sort the conversation list.
    ///
    /// # Errors
    ///
    /// Returns the client error; the cached list is left untouched.
    pub async fn refresh_conversations(&mut self) -> Result<&[Conversation], ClientError> {
        let mut conversations = self.client.list_conversations().await?;
        sort_conversations(&mut conversations);
        self.conversations = conversations;
        Ok(&self.conversations)
    }

    /// Replace the cached plan after a billing intent.
    pub fn set_plan(&mut self, plan: PlanInfo) {
        if let Some(profile) = &mut self.profile {
            profile.plan = plan;
        }
    }

    /// Drop everything cached; the next refresh starts from scratch.
    pub fn invalidate(&mut self) {
        self.profile = None;
        self.conversations.clear();
    }
}
