use futures::StreamExt;
use wayfarer_database::{Conversation, Database, Message, PageCursor, WindowStream};
use wayfarer_result::Result;

use crate::FeedEntry;

/// One open live-window subscription over a single feed.
///
/// Wraps the engine stream so the session owns exactly one of these per
/// attached identity and can close it from any state.
pub struct WindowSubscription<T> {
    stream: Option<WindowStream<T>>,
}

impl<T> WindowSubscription<T> {
    pub(crate) fn new(stream: WindowStream<T>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Next full-window snapshot, most recent first.
    ///
    /// `None` once the subscription is closed or the engine stream ended;
    /// an `Err` item means the subscription is dead and must be reopened.
    pub async fn recv(&mut self) -> Option<Result<Vec<T>>> {
        match &mut self.stream {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Close the subscription. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed live window subscription");
        }
    }
}

/// Identity of one feed: what to subscribe to and how to page backwards
/// through it.
#[async_trait]
pub trait FeedQuery: Clone + PartialEq + Send + Sync + 'static {
    type Entry: FeedEntry;

    /// Open the live window over the `limit` most recent entries
    async fn subscribe(
        &self,
        db: &Database,
        limit: usize,
    ) -> Result<WindowSubscription<Self::Entry>>;

    /// Fetch up to `limit` entries strictly older than the cursor,
    /// most recent first
    async fn page_before(
        &self,
        db: &Database,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Self::Entry>>;
}

/// Message feed of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFeed {
    pub conversation: String,
}

/// Conversation-list feed of one viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxFeed {
    pub user: String,
}

#[async_trait]
impl FeedQuery for MessageFeed {
    type Entry = Message;

    async fn subscribe(&self, db: &Database, limit: usize) -> Result<WindowSubscription<Message>> {
        Ok(WindowSubscription::new(
            db.subscribe_messages(&self.conversation, limit).await?,
        ))
    }

    async fn page_before(
        &self,
        db: &Database,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Message>> {
        db.fetch_messages_before(&self.conversation, cursor, limit)
            .await
    }
}

#[async_trait]
impl FeedQuery for InboxFeed {
    type Entry = Conversation;

    async fn subscribe(
        &self,
        db: &Database,
        limit: usize,
    ) -> Result<WindowSubscription<Conversation>> {
        Ok(WindowSubscription::new(
            db.subscribe_inbox(&self.user, limit).await?,
        ))
    }

    async fn page_before(
        &self,
        db: &Database,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        db.fetch_conversations_before(&self.user, cursor, limit).await
    }
}
