use indexmap::IndexSet;
use iso8601_timestamp::Timestamp;

auto_derived!(
    /// Message within a conversation
    pub struct Message {
        /// Unique Id
        #[serde(rename = "_id")]
        pub id: String,

        /// Value generated by the sending client, used to match an
        /// optimistic local echo against the stored message
        #[serde(skip_serializing_if = "Option::is_none")]
        pub nonce: Option<String>,

        /// Id of the conversation this message was sent in
        pub conversation: String,

        /// Id of the user that sent this message
        pub author: String,

        /// Text content, possibly empty when an attachment is present
        pub content: String,

        /// Opaque URL of attached media
        #[serde(skip_serializing_if = "Option::is_none")]
        pub attachment: Option<String>,

        /// When this message was stored; assigned by the engine
        pub created_at: Timestamp,

        /// Ids of users that have read this message
        #[serde(skip_serializing_if = "IndexSet::is_empty", default)]
        pub read_by: IndexSet<String>,
    }
);

impl Default for Message {
    fn default() -> Self {
        Self {
            id: Default::default(),
            nonce: None,
            conversation: Default::default(),
            author: Default::default(),
            content: Default::default(),
            attachment: None,
            created_at: Timestamp::UNIX_EPOCH,
            read_by: Default::default(),
        }
    }
}

impl Message {
    /// Whether the given user has read this message
    pub fn is_read_by(&self, user: &str) -> bool {
        self.read_by.contains(user)
    }
}
