use std::collections::HashMap;

use iso8601_timestamp::Timestamp;

auto_derived!(
    /// Record of who added a member to a conversation.
    ///
    /// Only the recorded adder is authorized to remove the member again.
    pub struct MembershipRecord {
        pub user_id: String,
        pub added_by: String,
    }

    /// Shortened copy of the most recent message in a conversation
    pub struct MessagePreview {
        pub content: String,
        pub author: String,
        pub created_at: Timestamp,
    }

    /// Conversation between matched travelers
    pub struct Conversation {
        /// Unique Id
        #[serde(rename = "_id")]
        pub id: String,

        /// Ids of users participating in this conversation
        pub recipients: Vec<String>,

        /// Who added each recipient
        pub added_users: Vec<MembershipRecord>,

        /// Outstanding unread message count per recipient
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        pub unread_counts: HashMap<String, i64>,

        /// Copy of the most recent message
        #[serde(skip_serializing_if = "Option::is_none")]
        pub last_message: Option<MessagePreview>,

        /// When this conversation was created; assigned by the engine
        pub created_at: Timestamp,
    }
);

impl Default for Conversation {
    fn default() -> Self {
        Self {
            id: Default::default(),
            recipients: Default::default(),
            added_users: Default::default(),
            unread_counts: Default::default(),
            last_message: None,
            created_at: Timestamp::UNIX_EPOCH,
        }
    }
}

impl Conversation {
    /// Check whether a user is a recipient of this conversation
    pub fn contains_user(&self, user_id: &str) -> bool {
        self.recipients.iter().any(|recipient| recipient == user_id)
    }

    /// Who added the given member, if they are one
    pub fn added_by(&self, user_id: &str) -> Option<&str> {
        self.added_users
            .iter()
            .find(|record| record.user_id == user_id)
            .map(|record| record.added_by.as_str())
    }

    /// Outstanding unread count for a member
    pub fn unread_count(&self, user_id: &str) -> i64 {
        self.unread_counts.get(user_id).copied().unwrap_or_default()
    }
}
