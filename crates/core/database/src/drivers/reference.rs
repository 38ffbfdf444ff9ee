use std::{collections::HashMap, sync::Arc};

use futures::lock::Mutex;
use tokio::sync::broadcast;

use crate::{Conversation, ConversationCompositeKey, Message, PresenceWrite};

database_derived!(
    /// Reference implementation
    pub struct ReferenceDb {
        pub messages: Arc<Mutex<HashMap<String, Message>>>,
        pub conversations: Arc<Mutex<HashMap<String, Conversation>>>,
        pub typing: Arc<Mutex<HashMap<ConversationCompositeKey, bool>>>,
        /// Every presence write in order of arrival, so tests can assert
        /// how many writes a signal pattern produced
        pub presence_log: Arc<Mutex<Vec<PresenceWrite>>>,

        changes: broadcast::Sender<()>,
    }
);

impl Default for ReferenceDb {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            messages: Default::default(),
            conversations: Default::default(),
            typing: Default::default(),
            presence_log: Default::default(),
            changes,
        }
    }
}

impl ReferenceDb {
    /// Signal open subscriptions that stored data has changed
    pub(crate) fn notify(&self) {
        // No receiver means no open subscription, which is fine
        let _ = self.changes.send(());
    }

    /// Receiver for change signals
    pub(crate) fn watch(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    /// Remove all stored data, used between tests
    pub async fn wipe(&self) {
        self.messages.lock().await.clear();
        self.conversations.lock().await.clear();
        self.typing.lock().await.clear();
        self.presence_log.lock().await.clear();
        self.notify();
    }
}
