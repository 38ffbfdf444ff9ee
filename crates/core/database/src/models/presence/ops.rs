use wayfarer_result::Result;

mod reference;

#[async_trait]
pub trait AbstractPresence: Sync + Send {
    /// Record whether a user is typing in a conversation
    async fn set_typing(&self, conversation: &str, user: &str, typing: bool) -> Result<()>;

    /// Ids of users currently typing in a conversation
    async fn typing_users(&self, conversation: &str) -> Result<Vec<String>>;
}
