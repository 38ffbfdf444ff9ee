use wayfarer_result::Result;

use crate::{ConversationCompositeKey, PresenceWrite, ReferenceDb};

use super::AbstractPresence;

#[async_trait]
impl AbstractPresence for ReferenceDb {
    /// Record whether a user is typing in a conversation
    async fn set_typing(&self, conversation: &str, user: &str, typing: bool) -> Result<()> {
        let key = ConversationCompositeKey {
            conversation: conversation.to_string(),
            user: user.to_string(),
        };

        let mut map = self.typing.lock().await;
        map.insert(key.clone(), typing);
        drop(map);

        self.presence_log
            .lock()
            .await
            .push(PresenceWrite { key, typing });

        Ok(())
    }

    /// Ids of users currently typing in a conversation
    async fn typing_users(&self, conversation: &str) -> Result<Vec<String>> {
        let map = self.typing.lock().await;
        Ok(map
            .iter()
            .filter(|(key, typing)| key.conversation == conversation && **typing)
            .map(|(key, _)| key.user.clone())
            .collect())
    }
}
