use wayfarer_result::Result;

use crate::{Conversation, MessagePreview, PageCursor, WindowStream};

mod reference;

#[async_trait]
pub trait AbstractConversations: Sync + Send {
    /// Insert a new conversation into the database, assigning its timestamp
    async fn insert_conversation(&self, conversation: &mut Conversation) -> Result<()>;

    /// Fetch a conversation by its id
    async fn fetch_conversation(&self, id: &str) -> Result<Conversation>;

    /// Add a user to a conversation, recording who added them
    async fn add_user_to_conversation(&self, id: &str, user: &str, added_by: &str) -> Result<()>;

    /// Remove a user together with their membership record and unread counter
    async fn remove_user_from_conversation(&self, id: &str, user: &str) -> Result<()>;

    /// Replace the stored preview of the most recent message
    async fn set_last_message(&self, id: &str, preview: &MessagePreview) -> Result<()>;

    /// Increment every recipient's unread counter except the author's
    async fn bump_unreads(&self, id: &str, except_user: &str) -> Result<()>;

    /// Reset one recipient's unread counter to zero
    async fn clear_unread(&self, id: &str, user: &str) -> Result<()>;

    /// Fetch up to `limit` of the user's conversations strictly older
    /// than the cursor, most recent first
    async fn fetch_conversations_before(
        &self,
        user: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Conversation>>;

    /// Open a live window over the user's most recent conversations
    async fn subscribe_inbox(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<WindowStream<Conversation>>;
}
