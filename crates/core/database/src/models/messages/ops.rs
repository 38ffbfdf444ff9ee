use futures::stream::BoxStream;
use wayfarer_result::Result;

use crate::{Message, PageCursor};

mod reference;

/// Stream of full live-window snapshots, most recent first.
///
/// Every relevant change redelivers the whole window rather than a diff;
/// an error item means the subscription is dead and must be reopened.
pub type WindowStream<T> = BoxStream<'static, Result<Vec<T>>>;

#[async_trait]
pub trait AbstractMessages: Sync + Send {
    /// Insert a new message into the database, assigning its timestamp
    async fn insert_message(&self, message: &mut Message) -> Result<()>;

    /// Fetch a message by its id
    async fn fetch_message(&self, id: &str) -> Result<Message>;

    /// Fetch up to `limit` messages strictly older than the cursor,
    /// most recent first
    async fn fetch_messages_before(
        &self,
        conversation: &str,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Record that a user has read a message
    async fn add_read_receipt(&self, id: &str, user: &str) -> Result<()>;

    /// Open a live window over the most recent messages of a conversation
    async fn subscribe_messages(
        &self,
        conversation: &str,
        limit: usize,
    ) -> Result<WindowStream<Message>>;
}
