use async_stream::stream;
use iso8601_timestamp::{Duration, Timestamp};
use tokio::sync::broadcast::error::RecvError;
use wayfarer_result::Result;

use crate::{Conversation, MembershipRecord, MessagePreview, PageCursor, ReferenceDb, WindowStream};

use super::AbstractConversations;

impl ReferenceDb {
    /// Current window of the user's `limit` most recent conversations,
    /// most recent first
    async fn inbox_window(&self, user: &str, limit: usize) -> Vec<Conversation> {
        let conversations = self.conversations.lock().await;
        let mut window: Vec<Conversation> = conversations
            .values()
            .filter(|conversation| conversation.contains_user(user))
            .cloned()
            .collect();

        window.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        window.truncate(limit);
        window
    }
}

#[async_trait]
impl AbstractConversations for ReferenceDb {
    /// Insert a new conversation into the database, assigning its timestamp
    async fn insert_conversation(&self, conversation: &mut Conversation) -> Result<()> {
        {
            let mut conversations = self.conversations.lock().await;
            if conversations.contains_key(&conversation.id) {
                return Err(create_database_error!("insert", "conversations"));
            }

            let now = Timestamp::now_utc();
            let latest = conversations.values().map(|existing| existing.created_at).max();
            conversation.created_at = match latest {
                Some(latest) if now <= latest => latest + Duration::milliseconds(1),
                _ => now,
            };

            conversations.insert(conversation.id.to_string(), conversation.clone());
        }

        self.notify();
        Ok(())
    }

    /// Fetch a conversation by its id
    async fn fetch_conversation(&self, id: &str) -> Result<Conversation> {
        let conversations = self.conversations.lock().await;
        conversations
            .get(id)
            .cloned()
            .ok_or_else(|| create_error!(NotFound))
    }

    /// Add a user to a conversation, recording who added them
    async fn add_user_to_conversation(&self, id: &str, user: &str, added_by: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.lock().await;
            let Some(conversation) = conversations.get_mut(id) else {
                return Err(create_error!(NotFound));
            };

            if conversation.contains_user(user) {
                return Err(create_error!(AlreadyInConversation));
            }

            conversation.recipients.push(user.to_string());
            conversation.added_users.push(MembershipRecord {
                user_id: user.to_string(),
                added_by: added_by.to_string(),
            });
            conversation.unread_counts.entry(user.to_string()).or_insert(0);
        }

        self.notify();
        Ok(())
    }

    /// Remove a user together with their membership record and unread counter
    async fn remove_user_from_conversation(&self, id: &str, user: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.lock().await;
            let Some(conversation) = conversations.get_mut(id) else {
                return Err(create_error!(NotFound));
            };

            if !conversation.contains_user(user) {
                return Err(create_error!(NotInConversation));
            }

            conversation.recipients.retain(|recipient| recipient != user);
            conversation.added_users.retain(|record| record.user_id != user);
            conversation.unread_counts.remove(user);
        }

        self.notify();
        Ok(())
    }

    /// Replace the stored preview of the most recent message
    async fn set_last_message(&self, id: &str, preview: &MessagePreview) -> Result<()> {
        {
            let mut conversations = self.conversations.lock().await;
            let Some(conversation) = conversations.get_mut(id) else {
                return Err(create_error!(NotFound));
            };

            conversation.last_message = Some(preview.clone());
        }

        self.notify();
        Ok(())
    }

    /// Increment every recipient's unread counter except the author's
    async fn bump_unreads(&self, id: &str, except_user: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.lock().await;
            let Some(conversation) = conversations.get_mut(id) else {
                return Err(create_error!(NotFound));
            };

            let recipients = conversation.recipients.clone();
            for recipient in recipients {
                if recipient != except_user {
                    *conversation.unread_counts.entry(recipient).or_insert(0) += 1;
                }
            }
        }

        self.notify();
        Ok(())
    }

    /// Reset one recipient's unread counter to zero
    async fn clear_unread(&self, id: &str, user: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.lock().await;
            let Some(conversation) = conversations.get_mut(id) else {
                return Err(create_error!(NotFound));
            };

            if !conversation.contains_user(user) {
                return Err(create_error!(NotInConversation));
            }

            conversation.unread_counts.insert(user.to_string(), 0);
        }

        self.notify();
        Ok(())
    }

    /// Fetch up to `limit` of the user's conversations strictly older
    /// than the cursor, most recent first
    async fn fetch_conversations_before(
        &self,
        user: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let conversations = self.conversations.lock().await;
        let mut page: Vec<Conversation> = conversations
            .values()
            .filter(|conversation| conversation.contains_user(user))
            .filter(|conversation| cursor.admits(conversation.created_at, &conversation.id))
            .cloned()
            .collect();

        page.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        page.truncate(limit);
        Ok(page)
    }

    /// Open a live window over the user's most recent conversations
    async fn subscribe_inbox(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<WindowStream<Conversation>> {
        let db = self.clone();
        let user = user.to_string();
        let mut rx = self.watch();

        Ok(Box::pin(stream! {
            let mut last: Option<Vec<Conversation>> = None;
            loop {
                let window = db.inbox_window(&user, limit).await;
                if last.as_ref() != Some(&window) {
                    last = Some(window.clone());
                    yield Ok(window);
                }

                match rx.recv().await {
                    Ok(()) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Inbox subscription lagged by {skipped} change signals");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
