use async_stream::stream;
use iso8601_timestamp::{Duration, Timestamp};
use tokio::sync::broadcast::error::RecvError;
use wayfarer_result::Result;

use crate::{Message, PageCursor, ReferenceDb, WindowStream};

use super::AbstractMessages;

impl ReferenceDb {
    /// Current window of the `limit` most recent messages, most recent first
    async fn message_window(&self, conversation: &str, limit: usize) -> Vec<Message> {
        let messages = self.messages.lock().await;
        let mut window: Vec<Message> = messages
            .values()
            .filter(|message| message.conversation == conversation)
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
impl AbstractMessages for ReferenceDb {
    /// Insert a new message into the database, assigning its timestamp
    async fn insert_message(&self, message: &mut Message) -> Result<()> {
        {
            let mut messages = self.messages.lock().await;
            if messages.contains_key(&message.id) {
                return Err(create_database_error!("insert", "messages"));
            }

            // Timestamps are assigned on insert and kept strictly
            // monotonic per conversation even if the clock stalls.
            let now = Timestamp::now_utc();
            let latest = messages
                .values()
                .filter(|existing| existing.conversation == message.conversation)
                .map(|existing| existing.created_at)
                .max();

            message.created_at = match latest {
                Some(latest) if now <= latest => latest + Duration::milliseconds(1),
                _ => now,
            };

            messages.insert(message.id.to_string(), message.clone());
        }

        self.notify();
        Ok(())
    }

    /// Fetch a message by its id
    async fn fetch_message(&self, id: &str) -> Result<Message> {
        let messages = self.messages.lock().await;
        messages
            .get(id)
            .cloned()
            .ok_or_else(|| create_error!(NotFound))
    }

    /// Fetch up to `limit` messages strictly older than the cursor,
    /// most recent first
    async fn fetch_messages_before(
        &self,
        conversation: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let messages = self.messages.lock().await;
        let mut page: Vec<Message> = messages
            .values()
            .filter(|message| message.conversation == conversation)
            .filter(|message| cursor.admits(message.created_at, &message.id))
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

    /// Record that a user has read a message
    async fn add_read_receipt(&self, id: &str, user: &str) -> Result<()> {
        {
            let mut messages = self.messages.lock().await;
            let Some(message) = messages.get_mut(id) else {
                return Err(create_error!(NotFound));
            };

            message.read_by.insert(user.to_string());
        }

        self.notify();
        Ok(())
    }

    /// Open a live window over the most recent messages of a conversation
    async fn subscribe_messages(
        &self,
        conversation: &str,
        limit: usize,
    ) -> Result<WindowStream<Message>> {
        let db = self.clone();
        let conversation = conversation.to_string();
        let mut rx = self.watch();

        Ok(Box::pin(stream! {
            let mut last: Option<Vec<Message>> = None;
            loop {
                let window = db.message_window(&conversation, limit).await;
                if last.as_ref() != Some(&window) {
                    last = Some(window.clone());
                    yield Ok(window);
                }

                match rx.recv().await {
                    Ok(()) => {}
                    // Skipped signals are safe to ignore: the window is
                    // recomputed from current state, not from deltas.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Message subscription lagged by {skipped} change signals");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
